//! Arithmetic sequence domains.
//!
//! A sequence is described by any consistent subset of `from`, `to`, `step`
//! and `length`. [`calculate_sequence_parameters`] fills in the rest:
//!
//! | given                    | derived                                   |
//! |--------------------------|-------------------------------------------|
//! | nothing                  | from 1, step 1, length 10                  |
//! | `to`                     | from 1, step 1, length to fit             |
//! | `to`, `length`           | step 1, `from` counted back from `to`     |
//! | `from`, `to`, `length`   | step spread evenly                        |
//! | all four                 | `length` is ignored with a warning        |
//!
//! Letter sequences count `a, b, ..., z, aa, ab, ...` and use the same rules
//! on the letters' positions.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::Warning;
use crate::value::Value;

const ROUNDING_SLACK: f64 = 1e-10;

/// What a sequence enumerates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequenceKind {
    #[default]
    Number,
    Letters,
}

impl SequenceKind {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "number" | "math" => Some(SequenceKind::Number),
            "letters" => Some(SequenceKind::Letters),
            _ => None,
        }
    }
}

/// A fully specified sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceDomain {
    pub kind: SequenceKind,
    pub from: f64,
    pub step: f64,
    pub length: usize,
}

impl SequenceDomain {
    /// Position `index` (zero-based) as a number.
    pub fn number_at(&self, index: usize) -> f64 {
        self.from + self.step * index as f64
    }

    /// Position `index` (zero-based) as a value of the sequence's kind.
    pub fn value_at(&self, index: usize) -> Value {
        let n = self.number_at(index);
        match self.kind {
            SequenceKind::Number => Value::Number(n),
            SequenceKind::Letters => Value::text(number_to_letters(n.round() as i64)),
        }
    }

    pub fn values(&self) -> Vec<Value> {
        (0..self.length).map(|i| self.value_at(i)).collect()
    }

    /// Positions whose value appears in `exclude`.
    pub fn excluded_indices(&self, exclude: &[Value]) -> BTreeSet<usize> {
        (0..self.length)
            .filter(|&i| exclude.iter().any(|e| self.matches(i, e)))
            .collect()
    }

    fn matches(&self, index: usize, candidate: &Value) -> bool {
        match self.kind {
            SequenceKind::Number => candidate
                .as_f64()
                .is_some_and(|c| (c - self.number_at(index)).abs() < ROUNDING_SLACK),
            SequenceKind::Letters => candidate
                .as_str()
                .and_then(letters_to_number)
                .is_some_and(|c| c as f64 == self.number_at(index).round()),
        }
    }
}

/// Parameters as written by the author.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequenceInputs {
    pub kind: SequenceKind,
    pub from: Option<Value>,
    pub to: Option<Value>,
    pub step: Option<Value>,
    pub length: Option<Value>,
}

/// A completed domain plus any notes raised while completing it.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceParameters {
    pub domain: SequenceDomain,
    pub warnings: Vec<Warning>,
}

/// Fill in missing sequence parameters.
///
/// Fails with a human-readable message when the inputs are malformed.
pub fn calculate_sequence_parameters(inputs: &SequenceInputs) -> Result<SequenceParameters, String> {
    let kind = inputs.kind;
    let bound = |value: &Option<Value>, name: &str| -> Result<Option<f64>, String> {
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(v) => parse_bound(kind, v)
                .map(Some)
                .ok_or_else(|| format!("invalid {name}: {v}")),
        }
    };
    let from = bound(&inputs.from, "from")?;
    let to = bound(&inputs.to, "to")?;
    let mut step = match &inputs.step {
        None | Some(Value::Null) => None,
        Some(v) => Some(v.as_f64().ok_or_else(|| format!("invalid step: {v}"))?),
    };
    let mut length = match &inputs.length {
        None | Some(Value::Null) => None,
        Some(v) => Some(
            v.as_f64()
                .filter(|n| *n >= 0.0)
                .map(|n| n.round() as usize)
                .ok_or_else(|| format!("invalid length: {v}"))?,
        ),
    };

    if step == Some(0.0) {
        return Err("sequence step cannot be zero".to_string());
    }
    if kind == SequenceKind::Letters {
        step = step.map(f64::round);
        if step == Some(0.0) {
            return Err("letter sequence step must be a nonzero integer".to_string());
        }
    }

    let mut warnings = Vec::new();
    if from.is_some() && to.is_some() && step.is_some() && length.is_some() {
        warnings.push(
            Warning::new("cannot specify from, to, step and length together; ignoring length")
                .with_level(2),
        );
        length = None;
    }

    let domain = match (to, length) {
        (Some(to), None) => {
            let from = from.unwrap_or(1.0);
            let step = step.unwrap_or(1.0);
            let span = (to - from) / step + ROUNDING_SLACK;
            let length = if span < 0.0 { 0 } else { span.floor() as usize + 1 };
            SequenceDomain { kind, from, step, length }
        }
        (Some(to), Some(length)) => match (from, step) {
            (Some(from), None) => {
                let step = if length > 1 {
                    (to - from) / (length - 1) as f64
                } else {
                    1.0
                };
                SequenceDomain { kind, from, step, length }
            }
            (_, step) => {
                let step = step.unwrap_or(1.0);
                let from = to - step * length.saturating_sub(1) as f64;
                SequenceDomain { kind, from, step, length }
            }
        },
        (None, length) => SequenceDomain {
            kind,
            from: from.unwrap_or(1.0),
            step: step.unwrap_or(1.0),
            length: length.unwrap_or(10),
        },
    };

    if kind == SequenceKind::Letters && domain.step.fract() != 0.0 {
        return Err("letter sequence step must be an integer".to_string());
    }
    Ok(SequenceParameters { domain, warnings })
}

fn parse_bound(kind: SequenceKind, value: &Value) -> Option<f64> {
    match kind {
        SequenceKind::Number => value.as_f64(),
        SequenceKind::Letters => match value {
            Value::Text(s) => letters_to_number(s).map(|n| n as f64),
            other => other.as_f64(),
        },
    }
}

/// `a` → 1, `z` → 26, `aa` → 27. Case-insensitive.
pub fn letters_to_number(letters: &str) -> Option<i64> {
    let letters = letters.trim();
    if letters.is_empty() {
        return None;
    }
    letters.chars().try_fold(0i64, |acc, c| {
        let c = c.to_ascii_lowercase();
        c.is_ascii_lowercase()
            .then(|| acc * 26 + i64::from(c as u8 - b'a') + 1)
    })
}

/// Inverse of [`letters_to_number`]. Non-positive numbers give an empty string.
pub fn number_to_letters(mut number: i64) -> String {
    let mut letters = Vec::new();
    while number > 0 {
        let rem = ((number - 1) % 26) as u8;
        letters.push((b'a' + rem) as char);
        number = (number - 1) / 26;
    }
    letters.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(from: Option<f64>, to: Option<f64>, step: Option<f64>, length: Option<usize>) -> SequenceInputs {
        SequenceInputs {
            kind: SequenceKind::Number,
            from: from.map(Value::Number),
            to: to.map(Value::Number),
            step: step.map(Value::Number),
            length: length.map(Value::from),
        }
    }

    fn domain(i: SequenceInputs) -> SequenceDomain {
        calculate_sequence_parameters(&i).unwrap().domain
    }

    #[test]
    fn defaults_to_one_through_ten() {
        let d = domain(SequenceInputs::default());
        assert_eq!((d.from, d.step, d.length), (1.0, 1.0, 10));
    }

    #[test]
    fn length_from_to_and_step() {
        let d = domain(inputs(Some(1.0), Some(5.0), None, None));
        assert_eq!(d.length, 5);
        let d = domain(inputs(Some(0.0), Some(1.0), Some(0.1), None));
        assert_eq!(d.length, 11);
        let d = domain(inputs(Some(5.0), Some(1.0), None, None));
        assert_eq!(d.length, 0);
    }

    #[test]
    fn step_spread_over_length() {
        let d = domain(inputs(Some(0.0), Some(10.0), None, Some(5)));
        assert_eq!(d.step, 2.5);
        assert_eq!(d.value_at(4), Value::Number(10.0));
    }

    #[test]
    fn from_counted_back_from_to() {
        let d = domain(inputs(None, Some(10.0), Some(2.0), Some(3)));
        assert_eq!(d.from, 6.0);
    }

    #[test]
    fn overspecified_ignores_length() {
        let params = calculate_sequence_parameters(&inputs(Some(1.0), Some(5.0), Some(1.0), Some(99))).unwrap();
        assert_eq!(params.domain.length, 5);
        assert_eq!(params.warnings.len(), 1);
    }

    #[test]
    fn zero_step_is_an_error() {
        assert!(calculate_sequence_parameters(&inputs(Some(1.0), None, Some(0.0), None)).is_err());
    }

    #[test]
    fn letter_conversion() {
        assert_eq!(letters_to_number("a"), Some(1));
        assert_eq!(letters_to_number("Z"), Some(26));
        assert_eq!(letters_to_number("aa"), Some(27));
        assert_eq!(letters_to_number("a1"), None);
        assert_eq!(number_to_letters(28), "ab");
        assert_eq!(number_to_letters(0), "");
        for n in 1..800 {
            assert_eq!(letters_to_number(&number_to_letters(n)), Some(n));
        }
    }

    #[test]
    fn letter_sequences() {
        let params = calculate_sequence_parameters(&SequenceInputs {
            kind: SequenceKind::Letters,
            from: Some(Value::text("c")),
            to: Some(Value::text("g")),
            step: Some(Value::Integer(2)),
            length: None,
        })
        .unwrap();
        assert_eq!(
            params.domain.values(),
            vec![Value::text("c"), Value::text("e"), Value::text("g")]
        );
    }

    #[test]
    fn exclusions_match_by_value() {
        let d = domain(inputs(Some(1.0), Some(5.0), None, None));
        let excluded = d.excluded_indices(&[Value::Integer(2), Value::Number(5.0), Value::Integer(9)]);
        assert_eq!(excluded.into_iter().collect::<Vec<_>>(), vec![1, 4]);
    }
}
