//! Document-level variant numbering.
//!
//! A document with several variant-producing components has as many unique
//! variants as the product of theirs. A document index is split across the
//! components in mixed radix, the first component in document order being
//! the most significant digit.

/// Unique-variant counts of the variant components of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantPlan {
    counts: Vec<u64>,
}

impl VariantPlan {
    pub fn new(counts: Vec<u64>) -> Self {
        Self { counts }
    }

    /// Number of document variants, or `None` on overflow.
    pub fn total(&self) -> Option<u64> {
        self.counts.iter().try_fold(1u64, |acc, &c| acc.checked_mul(c))
    }

    /// Per-component one-based indices for document variant `index`.
    ///
    /// Indices beyond the total wrap around, so every positive index names
    /// some variant.
    pub fn decode(&self, index: u64) -> Option<Vec<u64>> {
        let total = self.total()?;
        if total == 0 || index == 0 {
            return None;
        }
        let mut rest = (index - 1) % total;
        let mut digits = vec![0u64; self.counts.len()];
        for (digit, &count) in digits.iter_mut().zip(&self.counts).rev() {
            *digit = rest % count + 1;
            rest /= count;
        }
        Some(digits)
    }
}
