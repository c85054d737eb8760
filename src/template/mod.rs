//! Template rendering and value typing.

pub mod infer;
pub mod renderer;

pub use infer::str_to_type;
pub use renderer::{Rendered, Renderer, SoftFailure};

use serde_json::{Map, Value};

/// Parse `KEY=VALUE` pairs into a mapping, typing each value.
///
/// Returns the first malformed entry as the error.
pub fn parse_key_value_pairs<S: AsRef<str>>(pairs: &[S]) -> Result<Map<String, Value>, String> {
    let mut map = Map::new();
    for pair in pairs {
        let pair = pair.as_ref();
        let Some((key, value)) = pair.split_once('=') else {
            return Err(pair.to_string());
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(pair.to_string());
        }
        map.insert(key.to_string(), str_to_type(value));
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_key_value_pairs() {
        let map = parse_key_value_pairs(&["a=1", "b=yes", "path=/x=y"]).unwrap();
        assert_eq!(map.get("a"), Some(&json!(1)));
        assert_eq!(map.get("b"), Some(&json!(true)));
        assert_eq!(map.get("path"), Some(&json!("/x=y")));
    }

    #[test]
    fn test_parse_key_value_pairs_rejects_bare_word() {
        assert_eq!(parse_key_value_pairs(&["oops"]).unwrap_err(), "oops");
    }
}
