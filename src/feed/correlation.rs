//! Pairwise correlation input for the risk guard

use rust_decimal::Decimal;
use std::collections::HashMap;

/// Source of pairwise correlations between symbols.
///
/// Correlation data is best-effort: `None` means the pair is unknown and the
/// check is skipped.
pub trait CorrelationSource: Send + Sync {
    fn correlation(&self, a: &str, b: &str) -> Option<Decimal>;
}

/// Symmetric correlation matrix keyed by symbol pair
#[derive(Debug, Clone, Default)]
pub struct CorrelationMatrix {
    pairs: HashMap<(String, String), Decimal>,
}

impl CorrelationMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(a: &str, b: &str) -> (String, String) {
        if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        }
    }

    /// Set the correlation of a pair (order-independent)
    pub fn set(&mut self, a: &str, b: &str, value: Decimal) {
        self.pairs.insert(Self::key(a, b), value);
    }

    /// Builder form of [`set`](Self::set)
    pub fn with(mut self, a: &str, b: &str, value: Decimal) -> Self {
        self.set(a, b, value);
        self
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl CorrelationSource for CorrelationMatrix {
    fn correlation(&self, a: &str, b: &str) -> Option<Decimal> {
        if a == b {
            return Some(Decimal::ONE);
        }
        self.pairs.get(&Self::key(a, b)).copied()
    }
}
