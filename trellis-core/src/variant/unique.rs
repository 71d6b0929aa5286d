//! Enumerable variant spaces.
//!
//! Selecting `k` positions out of a domain of `n` with some positions
//! excluded has a finite number of outcomes. [`VariantSpace`] numbers them
//! `1..=count` so a variant can be reproduced from its index alone.
//!
//! The bijection treats an index as a mixed-radix number. Without
//! replacement the radices are `m, m-1, ..., m-k+1` (with `m` eligible
//! positions); digit `j` picks among the positions not yet chosen, most
//! significant digit first. With replacement every radix is `m`. Positions
//! count eligible values only and are shifted past excluded ones.

use std::collections::BTreeSet;

use crate::error::CombinatoricsError;

/// Outcomes of one selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantSpace {
    length: usize,
    excluded: Vec<usize>,
    count: usize,
    with_replacement: bool,
}

impl VariantSpace {
    /// `excluded` holds zero-based positions inside `0..length`.
    pub fn new(length: usize, excluded: &BTreeSet<usize>, count: usize, with_replacement: bool) -> Self {
        Self {
            length,
            excluded: excluded.iter().copied().filter(|&i| i < length).collect(),
            count,
            with_replacement,
        }
    }

    /// Number of eligible positions.
    pub fn available(&self) -> usize {
        self.length - self.excluded.len()
    }

    fn radices(&self) -> impl Iterator<Item = u64> + '_ {
        let m = self.available() as u64;
        (0..self.count as u64).map(move |j| if self.with_replacement { m } else { m - j })
    }

    /// Number of distinct outcomes, or `None` if it does not fit in a `u64`.
    pub fn size(&self) -> Option<u64> {
        if !self.with_replacement && self.count > self.available() {
            return Some(0);
        }
        self.radices().try_fold(1u64, u64::checked_mul)
    }

    /// Positions (zero-based, in selection order) of outcome `index`.
    ///
    /// `index` is one-based.
    pub fn decode(&self, index: u64) -> Result<Vec<usize>, CombinatoricsError> {
        let size = self.size().ok_or_else(|| {
            CombinatoricsError::InvalidDesiredVariant("variant space is too large to index".into())
        })?;
        if index == 0 || index > size {
            return Err(CombinatoricsError::InvalidDesiredVariant(format!(
                "index {index} is outside 1..={size}"
            )));
        }

        let radices: Vec<u64> = self.radices().collect();
        let mut digits = vec![0usize; radices.len()];
        let mut rest = index - 1;
        for (digit, radix) in digits.iter_mut().zip(&radices).rev() {
            *digit = (rest % radix) as usize;
            rest /= radix;
        }

        let mut remaining: Vec<usize> = (0..self.available()).collect();
        let positions = digits
            .into_iter()
            .map(|digit| {
                let eligible = if self.with_replacement {
                    remaining[digit]
                } else {
                    remaining.remove(digit)
                };
                self.shift_past_excluded(eligible)
            })
            .collect();
        Ok(positions)
    }

    /// One-based index of the outcome choosing `positions`, if it is one.
    pub fn encode(&self, positions: &[usize]) -> Option<u64> {
        if positions.len() != self.count || self.size() == Some(0) {
            return None;
        }
        let mut remaining: Vec<usize> = (0..self.available()).collect();
        let mut index = 0u64;
        for (&position, radix) in positions.iter().zip(self.radices()) {
            let eligible = self.eligible_rank(position)?;
            let digit = remaining.iter().position(|&p| p == eligible)?;
            if !self.with_replacement {
                remaining.remove(digit);
            }
            index = index.checked_mul(radix)?.checked_add(digit as u64)?;
        }
        index.checked_add(1)
    }

    fn shift_past_excluded(&self, eligible: usize) -> usize {
        let mut position = eligible;
        for &excluded in &self.excluded {
            if excluded <= position {
                position += 1;
            } else {
                break;
            }
        }
        position
    }

    fn eligible_rank(&self, position: usize) -> Option<usize> {
        if position >= self.length || self.excluded.binary_search(&position).is_ok() {
            return None;
        }
        Some(position - self.excluded.iter().take_while(|&&e| e < position).count())
    }
}
