use serde::{Deserialize, Serialize};

/// Unit kind for order and position sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeUnit {
    Shares,
    Contracts,
}

impl std::fmt::Display for VolumeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VolumeUnit::Shares => write!(f, "shares"),
            VolumeUnit::Contracts => write!(f, "contracts"),
        }
    }
}

/// An order/position size: a whole number of shares or contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingVolume {
    units: u64,
    unit_kind: VolumeUnit,
}

impl TradingVolume {
    pub fn new(units: u64, unit_kind: VolumeUnit) -> Self {
        Self { units, unit_kind }
    }

    pub fn shares(units: u64) -> Self {
        Self::new(units, VolumeUnit::Shares)
    }

    pub fn contracts(units: u64) -> Self {
        Self::new(units, VolumeUnit::Contracts)
    }

    pub fn units(&self) -> u64 {
        self.units
    }

    pub fn unit_kind(&self) -> VolumeUnit {
        self.unit_kind
    }
}

impl std::fmt::Display for TradingVolume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.units, self.unit_kind)
    }
}
