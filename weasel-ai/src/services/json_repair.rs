//! Best-effort repair of JSON emitted by a language model
//!
//! Repairs are cosmetic: stripping code fences and surrounding prose, dropping
//! trailing commas, and inserting commas between values split across lines.
//! Text with no JSON object in it stays unparseable.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

static JSON_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```json\s*").expect("Invalid regex"));
static ANY_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```\s*").expect("Invalid regex"));
static TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",(\s*[}\]])").expect("Invalid regex"));
static ADJACENT_STRINGS: Lazy<Regex> = Lazy::new(|| Regex::new(r#""\s*\n\s*""#).expect("Invalid regex"));
static ADJACENT_OBJECTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\}\s*\n\s*\{").expect("Invalid regex"));

/// Apply the cosmetic repairs to `text`
pub fn repair_json(text: &str) -> String {
    let mut repaired = text.trim().to_string();

    repaired = JSON_FENCE.replace_all(&repaired, "").into_owned();
    repaired = ANY_FENCE.replace_all(&repaired, "").into_owned();

    if let (Some(first), Some(last)) = (repaired.find('{'), repaired.rfind('}')) {
        if first <= last {
            repaired = repaired[first..=last].to_string();
        }
    }

    repaired = TRAILING_COMMA.replace_all(&repaired, "$1").into_owned();
    repaired = ADJACENT_STRINGS.replace_all(&repaired, "\",\n\"").into_owned();
    repaired = ADJACENT_OBJECTS.replace_all(&repaired, "},\n{").into_owned();

    repaired
}

/// Parse `text` into `T`, accepting only values that pass `accept`
///
/// The text is tried as-is first, then after [`repair_json`]. When both fail
/// the error from the first attempt is returned, since it describes what the
/// model actually produced.
pub fn parse_with_repair<T, F>(text: &str, accept: F) -> Result<T, String>
where
    T: DeserializeOwned,
    F: Fn(&Value) -> bool,
{
    let decode = |candidate: &str| -> Result<T, String> {
        let value: Value = serde_json::from_str(candidate).map_err(|e| e.to_string())?;
        if !accept(&value) {
            return Err("Invalid JSON structure".to_string());
        }
        serde_json::from_value(value).map_err(|e| e.to_string())
    };

    let first_error = match decode(text) {
        Ok(parsed) => {
            tracing::debug!("Model JSON parsed on first attempt");
            return Ok(parsed);
        }
        Err(e) => e,
    };

    tracing::debug!(error = %first_error, "Initial JSON parse failed, attempting repair");

    match decode(&repair_json(text)) {
        Ok(parsed) => {
            tracing::debug!("Model JSON parsed after repair");
            Ok(parsed)
        }
        Err(repair_error) => {
            let preview: String = text.chars().take(500).collect();
            tracing::warn!(
                original_error = %first_error,
                repair_error = %repair_error,
                preview = %preview,
                "Model JSON unparseable even after repair"
            );
            Err(first_error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn any(_: &Value) -> bool {
        true
    }

    #[test]
    fn test_strips_fences_and_prose() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nThanks!";
        assert_eq!(repair_json(text), "{\"a\": 1}");
    }

    #[test]
    fn test_removes_trailing_commas() {
        let repaired = repair_json("{\"a\": [1, 2,], \"b\": {\"c\": 3,},}");
        let value: Value = serde_json::from_str(&repaired).unwrap();
        assert_eq!(value, json!({"a": [1, 2], "b": {"c": 3}}));
    }

    #[test]
    fn test_inserts_missing_commas() {
        let text = "{\"recommendations\": [\n  \"one\"\n  \"two\"\n], \"items\": [\n{\"x\": 1}\n{\"x\": 2}\n]}";
        let value: Value = serde_json::from_str(&repair_json(text)).unwrap();
        assert_eq!(value["recommendations"], json!(["one", "two"]));
        assert_eq!(value["items"], json!([{"x": 1}, {"x": 2}]));
    }

    #[test]
    fn test_parse_returns_original_error() {
        let direct_error = serde_json::from_str::<Value>("no json here").unwrap_err().to_string();
        let err = parse_with_repair::<Value, _>("no json here", any).unwrap_err();
        assert_eq!(err, direct_error);
    }

    #[test]
    fn test_rejected_shape_is_an_error() {
        let err = parse_with_repair::<Value, _>("{\"a\": 1}", |v| v.get("b").is_some()).unwrap_err();
        assert_eq!(err, "Invalid JSON structure");
    }
}
