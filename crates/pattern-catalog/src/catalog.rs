use std::sync::Arc;

use crate::ast::PricePattern;

/// An ordered catalog of candidate patterns, shared read-only with every
/// strategy instance built from it.
#[derive(Debug, Clone, Default)]
pub struct PatternCatalog {
    patterns: Vec<Arc<PricePattern>>,
}

impl PatternCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pattern: PricePattern) -> Arc<PricePattern> {
        let shared = Arc::new(pattern);
        self.patterns.push(shared.clone());
        shared
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arc<PricePattern>> {
        self.patterns.iter()
    }

    pub fn num_long(&self) -> usize {
        self.patterns.iter().filter(|p| p.is_long()).count()
    }

    pub fn num_short(&self) -> usize {
        self.patterns.iter().filter(|p| p.is_short()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BarReference, PatternExpr, PriceField, TradeDirection};

    fn pattern(name: &str, direction: TradeDirection) -> PricePattern {
        PricePattern::new(
            name,
            PatternExpr::gt(
                BarReference::new(PriceField::Close, 0),
                BarReference::new(PriceField::Open, 0),
            ),
            direction,
            None,
            None,
        )
    }

    #[test]
    fn counts_by_direction() {
        let mut catalog = PatternCatalog::new();
        catalog.add(pattern("l1", TradeDirection::Long));
        catalog.add(pattern("l2", TradeDirection::Long));
        catalog.add(pattern("s1", TradeDirection::Short));
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.num_long(), 2);
        assert_eq!(catalog.num_short(), 1);
    }

    #[test]
    fn shares_patterns_by_handle() {
        let mut catalog = PatternCatalog::new();
        let handle = catalog.add(pattern("l1", TradeDirection::Long));
        let from_iter = catalog.iter().next().unwrap().clone();
        assert!(Arc::ptr_eq(&handle, &from_iter));
    }
}
