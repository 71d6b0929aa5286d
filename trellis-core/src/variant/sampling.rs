//! Seeded selection from a sequence domain.
//!
//! Two strategies produce the same distribution:
//!
//! - Rejection: draw positions uniformly and redraw on an excluded or
//!   already-chosen position. The draw budget is derived from the rejection
//!   rate so that running out is negligible; running out is still reported.
//! - Enumeration: list the eligible positions and shuffle the first `k`
//!   into place (partial Fisher-Yates).
//!
//! Rejection is used while the estimated rejection rate is low. Estimates
//! near the threshold are confirmed by counting eligible positions.

use std::collections::BTreeSet;

use super::rng::VariantRng;
use super::sequence::{SequenceDomain, SequenceKind};
use super::unique::VariantSpace;
use super::DesiredVariant;
use crate::config::SamplingConfig;
use crate::error::CombinatoricsError;
use crate::value::Value;

/// What to select.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionSpec {
    pub domain: SequenceDomain,
    /// Zero-based positions that may not be chosen.
    pub excluded: BTreeSet<usize>,
    /// Number of exclusions as the author listed them. Used to estimate the
    /// rejection rate before positions are matched.
    pub listed_exclusions: usize,
    pub count: usize,
    pub with_replacement: bool,
    /// The selected values must have no common divisor above one.
    pub coprime: bool,
}

impl SelectionSpec {
    pub fn new(domain: SequenceDomain, count: usize) -> Self {
        Self {
            domain,
            excluded: BTreeSet::new(),
            listed_exclusions: 0,
            count,
            with_replacement: false,
            coprime: false,
        }
    }

    pub fn excluding(mut self, values: &[Value]) -> Self {
        self.excluded = self.domain.excluded_indices(values);
        self.listed_exclusions = values.len();
        self
    }

    pub fn with_replacement(mut self, with_replacement: bool) -> Self {
        self.with_replacement = with_replacement;
        self
    }

    pub fn coprime(mut self, coprime: bool) -> Self {
        self.coprime = coprime;
        self
    }

    pub fn space(&self) -> VariantSpace {
        VariantSpace::new(self.domain.length, &self.excluded, self.count, self.with_replacement)
    }

    fn coprime_applies(&self) -> bool {
        self.coprime && self.count >= 2 && self.domain.kind == SequenceKind::Number
    }
}

/// Select positions (zero-based, in selection order).
///
/// A desired variant bypasses sampling but is checked against the same
/// constraints.
pub fn select_indices(
    spec: &SelectionSpec,
    rng: &mut VariantRng,
    config: &SamplingConfig,
    desired: Option<&DesiredVariant>,
) -> Result<Vec<usize>, CombinatoricsError> {
    if let Some(desired) = desired {
        return forced(spec, desired);
    }
    if spec.count == 0 {
        return Ok(Vec::new());
    }
    let available = spec.domain.length.saturating_sub(spec.excluded.len());
    if available == 0 || (!spec.with_replacement && spec.count > available) {
        return Err(CombinatoricsError::OverExcluded {
            requested: spec.count,
            available,
        });
    }

    if !spec.coprime_applies() {
        return draw(spec, rng, config);
    }

    check_coprime_possible(&spec.domain)?;
    for _ in 0..config.coprime_attempts {
        let selection = draw(spec, rng, config)?;
        if values_coprime(&spec.domain, &selection) {
            return Ok(selection);
        }
    }
    Err(CombinatoricsError::Exhausted {
        attempts: config.coprime_attempts,
    })
}

fn forced(spec: &SelectionSpec, desired: &DesiredVariant) -> Result<Vec<usize>, CombinatoricsError> {
    let invalid = |message: String| Err(CombinatoricsError::InvalidDesiredVariant(message));
    if desired.indices.len() != spec.count {
        return invalid(format!(
            "expected {} indices, got {}",
            spec.count,
            desired.indices.len()
        ));
    }
    let mut seen = BTreeSet::new();
    let mut positions = Vec::with_capacity(spec.count);
    for &index in &desired.indices {
        if index == 0 || index > spec.domain.length {
            return invalid(format!("index {index} is outside 1..={}", spec.domain.length));
        }
        let position = index - 1;
        if spec.excluded.contains(&position) {
            return invalid(format!("index {index} is excluded"));
        }
        if !spec.with_replacement && !seen.insert(position) {
            return invalid(format!("index {index} is repeated"));
        }
        positions.push(position);
    }
    if spec.coprime_applies() && !values_coprime(&spec.domain, &positions) {
        return invalid("selected values are not coprime".to_string());
    }
    Ok(positions)
}

fn draw(spec: &SelectionSpec, rng: &mut VariantRng, config: &SamplingConfig) -> Result<Vec<usize>, CombinatoricsError> {
    let n = spec.domain.length;
    let rate = |excluded: usize| {
        let blocked = if spec.with_replacement {
            excluded
        } else {
            excluded + spec.count - 1
        };
        (blocked as f64 / n as f64).min(1.0)
    };

    let estimate = rate(spec.listed_exclusions);
    if estimate <= config.rejection_threshold {
        return by_rejection(spec, rng, config, rate(spec.excluded.len()));
    }
    let eligible: Vec<usize> = (0..n).filter(|i| !spec.excluded.contains(i)).collect();
    if estimate - config.rejection_threshold <= config.ambiguity_threshold {
        let exact = rate(n - eligible.len());
        if exact <= config.rejection_threshold {
            return by_rejection(spec, rng, config, exact);
        }
    }
    tracing::trace!(eligible = eligible.len(), "sampling by enumeration");
    Ok(by_enumeration(spec, eligible, rng))
}

fn by_rejection(
    spec: &SelectionSpec,
    rng: &mut VariantRng,
    config: &SamplingConfig,
    rate: f64,
) -> Result<Vec<usize>, CombinatoricsError> {
    let n = spec.domain.length;
    let bound = config.rejection_bound(rate);
    let mut chosen = Vec::with_capacity(spec.count);
    let mut taken = BTreeSet::new();
    for _ in 0..spec.count {
        let mut accepted = None;
        for _ in 0..bound {
            let candidate = rng.index(n);
            if spec.excluded.contains(&candidate) {
                continue;
            }
            if !spec.with_replacement && taken.contains(&candidate) {
                continue;
            }
            accepted = Some(candidate);
            break;
        }
        let Some(position) = accepted else {
            return Err(CombinatoricsError::Exhausted { attempts: bound });
        };
        taken.insert(position);
        chosen.push(position);
    }
    Ok(chosen)
}

fn by_enumeration(spec: &SelectionSpec, mut eligible: Vec<usize>, rng: &mut VariantRng) -> Vec<usize> {
    if spec.with_replacement {
        return (0..spec.count)
            .map(|_| eligible[rng.index(eligible.len())])
            .collect();
    }
    for i in 0..spec.count {
        let j = i + rng.index(eligible.len() - i);
        eligible.swap(i, j);
    }
    eligible.truncate(spec.count);
    eligible
}

fn gcd(mut a: i64, mut b: i64) -> i64 {
    a = a.abs();
    b = b.abs();
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn check_coprime_possible(domain: &SequenceDomain) -> Result<(), CombinatoricsError> {
    if domain.from.fract() != 0.0 || domain.step.fract() != 0.0 {
        return Err(CombinatoricsError::CoprimeNonInteger);
    }
    // Every value is from + i*step, so gcd(from, step) divides all of them.
    let divisor = gcd(domain.from as i64, domain.step as i64);
    if divisor > 1 {
        return Err(CombinatoricsError::CoprimeImpossible { divisor });
    }
    Ok(())
}

fn values_coprime(domain: &SequenceDomain, positions: &[usize]) -> bool {
    positions
        .iter()
        .map(|&p| domain.number_at(p).round() as i64)
        .fold(0, gcd)
        == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(from: f64, length: usize) -> SequenceDomain {
        SequenceDomain {
            kind: SequenceKind::Number,
            from,
            step: 1.0,
            length,
        }
    }

    #[test]
    fn without_replacement_positions_are_distinct_and_eligible() {
        let config = SamplingConfig::default();
        let spec = SelectionSpec::new(numbers(1.0, 10), 4).excluding(&[Value::Integer(3)]);
        for seed in 0..50 {
            let mut rng = VariantRng::from_seed(seed);
            let picked = select_indices(&spec, &mut rng, &config, None).unwrap();
            let unique: BTreeSet<_> = picked.iter().collect();
            assert_eq!(unique.len(), 4);
            assert!(!picked.contains(&2));
        }
    }

    #[test]
    fn heavy_exclusion_switches_to_enumeration() {
        let config = SamplingConfig::default();
        let excluded: Vec<Value> = (1..=98).map(Value::from).collect();
        let spec = SelectionSpec::new(numbers(1.0, 100), 2).excluding(&excluded);
        let mut rng = VariantRng::from_seed(9);
        let mut picked = select_indices(&spec, &mut rng, &config, None).unwrap();
        picked.sort_unstable();
        assert_eq!(picked, vec![98, 99]);
    }

    #[test]
    fn over_excluded_domain_fails() {
        let config = SamplingConfig::default();
        let spec = SelectionSpec::new(numbers(1.0, 3), 3).excluding(&[Value::Integer(2)]);
        let mut rng = VariantRng::from_seed(1);
        assert_eq!(
            select_indices(&spec, &mut rng, &config, None),
            Err(CombinatoricsError::OverExcluded { requested: 3, available: 2 })
        );
    }

    #[test]
    fn coprime_is_checked_analytically() {
        let config = SamplingConfig::default();
        let even = SequenceDomain {
            kind: SequenceKind::Number,
            from: 2.0,
            step: 2.0,
            length: 10,
        };
        let spec = SelectionSpec::new(even, 2).coprime(true);
        let mut rng = VariantRng::from_seed(1);
        assert_eq!(
            select_indices(&spec, &mut rng, &config, None),
            Err(CombinatoricsError::CoprimeImpossible { divisor: 2 })
        );

        let halves = SequenceDomain { step: 0.5, ..numbers(1.0, 10) };
        let spec = SelectionSpec::new(halves, 2).coprime(true);
        assert_eq!(
            select_indices(&spec, &mut rng, &config, None),
            Err(CombinatoricsError::CoprimeNonInteger)
        );
    }

    #[test]
    fn coprime_selection_is_enforced_by_rejection() {
        let config = SamplingConfig::default();
        let spec = SelectionSpec::new(numbers(2.0, 9), 2).coprime(true);
        for seed in 0..30 {
            let mut rng = VariantRng::from_seed(seed);
            let picked = select_indices(&spec, &mut rng, &config, None).unwrap();
            assert!(values_coprime(&spec.domain, &picked));
        }
    }

    #[test]
    fn desired_variant_is_validated() {
        let config = SamplingConfig::default();
        let spec = SelectionSpec::new(numbers(1.0, 5), 2).excluding(&[Value::Integer(5)]);
        let mut rng = VariantRng::from_seed(0);
        let ok = DesiredVariant::new(vec![3, 1]);
        assert_eq!(select_indices(&spec, &mut rng, &config, Some(&ok)), Ok(vec![2, 0]));

        for bad in [vec![5, 1], vec![2, 2], vec![0, 1], vec![1]] {
            let bad = DesiredVariant::new(bad);
            assert!(matches!(
                select_indices(&spec, &mut rng, &config, Some(&bad)),
                Err(CombinatoricsError::InvalidDesiredVariant(_))
            ));
        }
    }
}
