use thiserror::Error;

/// Error taxonomy shared by every crate in the workspace.
///
/// Each variant corresponds to one failure kind surfaced at a public
/// boundary; subsystems fail loudly rather than coercing bad inputs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TradingError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Offset out of range: {0}")]
    OffsetOutOfRange(String),

    #[error("Duplicate timestamp: {0}")]
    DuplicateTimestamp(String),

    #[error("Order not executable: {0}")]
    OrderNotExecutable(String),

    #[error("Position state violation: {0}")]
    PositionStateViolation(String),

    #[error("Unsupported timeframe: {0}")]
    UnsupportedTimeframe(String),

    #[error("Permutation algorithm failure: {0}")]
    PermutationFailure(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TradingError {
    fn from(err: std::io::Error) -> Self {
        TradingError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TradingError>;
