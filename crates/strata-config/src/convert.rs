//! Conversion of raw source values into the format a property declares.

use crate::schema::Format;
use crate::{ConfigError, Result};
use serde_json::{Number, Value};

/// Examples included in number conversion errors.
const NUMBER_EXAMPLES: &str = "123, 45.67 or -89";

/// Convert `raw` into the semantic type declared by `format`.
///
/// `null` passes through untouched for every format. `path` is only used to
/// label errors.
pub fn convert(raw: &Value, format: &Format, path: &str) -> Result<Value> {
    if raw.is_null() {
        return Ok(Value::Null);
    }
    match format {
        Format::String => to_string_value(raw, path).map(Value::String),
        Format::Number => to_number(raw, path),
        Format::Boolean => to_boolean(raw, path),
        Format::Json => to_json(raw, path),
        Format::Pattern(regex) => {
            let text = to_string_value(raw, path)?;
            if regex.is_match(&text) {
                Ok(Value::String(text))
            } else {
                Err(ConfigError::validation(
                    path,
                    Some(raw),
                    format!(
                        "Value '{text}' for property '{path}' does not match pattern /{}/",
                        regex.as_str()
                    ),
                ))
            }
        }
    }
}

/// True when `convert` would succeed.
pub fn can_convert(raw: &Value, format: &Format) -> bool {
    convert(raw, format, "").is_ok()
}

fn to_string_value(raw: &Value, path: &str) -> Result<String> {
    match raw {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number_text(number)),
        Value::Bool(flag) => Ok(flag.to_string()),
        Value::Null => Ok("null".to_string()),
        // Owned trees cannot be cyclic, so structures serialise directly.
        Value::Array(_) | Value::Object(_) => {
            serde_json::to_string(raw).map_err(|err| {
                ConfigError::conversion(
                    path,
                    raw,
                    format!("Cannot serialize value for property '{path}': {err}"),
                )
            })
        }
    }
}

fn to_number(raw: &Value, path: &str) -> Result<Value> {
    match raw {
        Value::Number(number) => match number.as_f64() {
            Some(float) if number.is_f64() => canonical_number(float, raw, path),
            _ => Ok(raw.clone()),
        },
        Value::Bool(flag) => Ok(Value::from(u8::from(*flag))),
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Err(ConfigError::conversion(
                    path,
                    raw,
                    format!(
                        "Cannot convert empty string to number for property '{path}'. \
                         Expected a numeric value such as {NUMBER_EXAMPLES}"
                    ),
                ));
            }
            if let Ok(int) = trimmed.parse::<i64>() {
                return Ok(Value::from(int));
            }
            if let Ok(int) = trimmed.parse::<u64>() {
                return Ok(Value::from(int));
            }
            match trimmed.parse::<f64>() {
                Ok(float) if looks_numeric(trimmed) => canonical_number(float, raw, path),
                _ => Err(ConfigError::conversion(
                    path,
                    raw,
                    format!(
                        "Cannot convert '{text}' to number for property '{path}'. \
                         Expected a numeric value such as {NUMBER_EXAMPLES}"
                    ),
                )),
            }
        }
        other => Err(ConfigError::conversion(
            path,
            raw,
            format!(
                "Cannot convert {} to number for property '{path}'",
                type_name(other)
            ),
        )),
    }
}

/// `f64::from_str` also accepts `inf`, `infinity` and `nan`; keep those
/// apart so they get dedicated messages.
fn looks_numeric(text: &str) -> bool {
    let unsigned = text.trim_start_matches(['+', '-']);
    unsigned.starts_with(|c: char| c.is_ascii_digit() || c == '.')
        || unsigned.eq_ignore_ascii_case("nan")
        || unsigned.eq_ignore_ascii_case("inf")
        || unsigned.eq_ignore_ascii_case("infinity")
}

fn canonical_number(float: f64, raw: &Value, path: &str) -> Result<Value> {
    if float.is_nan() {
        return Err(ConfigError::conversion(
            path,
            raw,
            format!("NaN cannot be used as a number for property '{path}'"),
        ));
    }
    if float.is_infinite() {
        return Err(ConfigError::conversion(
            path,
            raw,
            format!("Infinite values cannot be used as a number for property '{path}'"),
        ));
    }
    // 2^53: beyond this integral floats no longer map one-to-one onto i64.
    if float.fract() == 0.0 && float.abs() < 9_007_199_254_740_992.0 {
        return Ok(Value::from(float as i64));
    }
    Number::from_f64(float).map(Value::Number).ok_or_else(|| {
        ConfigError::conversion(path, raw, format!("Invalid number for property '{path}'"))
    })
}

fn to_boolean(raw: &Value, path: &str) -> Result<Value> {
    match raw {
        Value::Bool(_) => Ok(raw.clone()),
        Value::String(text) => match text.trim().to_lowercase().as_str() {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            _ => Err(ConfigError::conversion(
                path,
                raw,
                format!(
                    "Cannot convert '{text}' to boolean for property '{path}'. \
                     Expected true, false, 1 or 0"
                ),
            )),
        },
        Value::Number(number) => match number.as_f64() {
            Some(float) if float == 1.0 => Ok(Value::Bool(true)),
            Some(float) if float == 0.0 => Ok(Value::Bool(false)),
            _ => Err(ConfigError::conversion(
                path,
                raw,
                format!(
                    "Cannot convert number {} to boolean for property '{path}'. \
                     Only 1 and 0 are accepted",
                    number_text(number)
                ),
            )),
        },
        other => Err(ConfigError::conversion(
            path,
            raw,
            format!(
                "Cannot convert {} to boolean for property '{path}'",
                type_name(other)
            ),
        )),
    }
}

fn to_json(raw: &Value, path: &str) -> Result<Value> {
    let Value::String(text) = raw else {
        return Err(ConfigError::conversion(
            path,
            raw,
            format!(
                "JSON format for property '{path}' expects a string, got {}",
                type_name(raw)
            ),
        ));
    };
    if text.trim().is_empty() {
        return Err(ConfigError::conversion(
            path,
            raw,
            format!("Invalid JSON for property '{path}': cannot parse empty string"),
        ));
    }
    serde_json::from_str(text).map_err(|err| {
        ConfigError::conversion(path, raw, format!("Invalid JSON for property '{path}': {err}"))
    })
}

/// Canonical text of a number: integral values print without a fraction.
pub(crate) fn number_text(number: &Number) -> String {
    if number.is_f64() {
        if let Some(float) = number.as_f64() {
            if float.fract() == 0.0 && float.abs() < 9_007_199_254_740_992.0 {
                return (float as i64).to_string();
            }
            return float.to_string();
        }
    }
    number.to_string()
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
