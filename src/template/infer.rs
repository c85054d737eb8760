//! Type inference for rendered template output.

use serde_json::{Number, Value};

const TRUE_WORDS: [&str; 3] = ["true", "yes", "yeah"];
const FALSE_WORDS: [&str; 3] = ["false", "no", "nope"];

/// Convert a rendered string into the most specific JSON value it spells.
///
/// Quote characters are stripped from both ends first. Booleans are
/// recognized case-insensitively, then integers, then finite floats.
/// Anything else comes back as the stripped string.
pub fn str_to_type(s: &str) -> Value {
    let trimmed = s.trim_matches(|c| c == '"' || c == '\'');
    let lower = trimmed.to_ascii_lowercase();

    if TRUE_WORDS.contains(&lower.as_str()) {
        return Value::Bool(true);
    }
    if FALSE_WORDS.contains(&lower.as_str()) {
        return Value::Bool(false);
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        if let Some(n) = Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(trimmed.to_string())
}
