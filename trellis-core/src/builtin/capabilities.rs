//! Capabilities shared by several builtin types.

use crate::component::{AttributeSpec, Capability};
use crate::state::{Dependency, InverseInstruction, Resolution, StaleSignal, StateVariableDefinition};
use crate::value::{Value, ValueKind};

const DEFAULT_DIGITS: i64 = 10;

/// Display text of a numeric `value`.
///
/// `displayDecimals` rounds to a number of decimal places and wins over
/// `displayDigits`, which rounds to significant digits. Editing `text`
/// parses it back into `value`.
pub fn rounding() -> Capability {
    Capability::new()
        .attribute("displayDigits", AttributeSpec::new(ValueKind::Integer, DEFAULT_DIGITS))
        .attribute("displayDecimals", AttributeSpec::new(ValueKind::Integer, Value::Null))
        .state_variable(
            "text",
            StateVariableDefinition::computed(
                [
                    ("value", Dependency::state("value")),
                    ("digits", Dependency::attribute("displayDigits")),
                    ("decimals", Dependency::attribute("displayDecimals")),
                ],
                |deps| {
                    let value = deps.get("value");
                    let Some(number) = value.as_f64() else {
                        return Resolution::value(Value::text(value.to_string()));
                    };
                    let text = match deps.get("decimals").as_usize() {
                        Some(decimals) if !deps.used_default("decimals") => format!("{number:.decimals$}"),
                        _ => {
                            let digits = deps.get("digits").as_i64().unwrap_or(DEFAULT_DIGITS).max(1);
                            round_to_digits(number, digits as i32).to_string()
                        }
                    };
                    Resolution::value(Value::text(text))
                },
            )
            .with_inverse(|req| {
                let text = req.desired.to_string();
                let number: f64 = text
                    .trim()
                    .parse()
                    .map_err(|_| format!("'{text}' is not a number"))?;
                Ok(vec![InverseInstruction::SetDependency {
                    dependency: "value".to_string(),
                    desired: Value::Number(number),
                }])
            })
            .marks_stale(StaleSignal::UpdateRenderer),
        )
}

/// A `fixed` flag. Types that want it honored lock their editable
/// variables with `locked_by("fixed")`.
pub fn fixed() -> Capability {
    Capability::new().attribute("fixed", AttributeSpec::new(ValueKind::Boolean, false).creating_variable())
}

fn round_to_digits(x: f64, digits: i32) -> f64 {
    if x == 0.0 || !x.is_finite() {
        return x;
    }
    let magnitude = x.abs().log10().floor() as i32;
    let exponent = digits - 1 - magnitude;
    let factor = 10f64.powi(exponent.abs());
    if !factor.is_finite() {
        return x;
    }
    if exponent >= 0 {
        (x * factor).round() / factor
    } else {
        (x / factor).round() * factor
    }
}
