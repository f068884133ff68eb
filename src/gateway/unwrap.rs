//! Completion text unwrapping: Markdown fence removal and JSON parsing.

use serde_json::Value;

/// Strip an optional Markdown code fence around a completion.
///
/// Handles a leading ```` ```json ```` (any info string) or bare ```` ``` ```` and a trailing
/// ```` ``` ````, with whitespace around either. Text without a leading fence is only trimmed.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string (`json`, `JSON`, ...) up to the first line break. A single-line
    // fence like ```{"a":1}``` has no info string.
    let body = match rest.find('\n') {
        Some(nl) if is_info_string(&rest[..nl]) => &rest[nl + 1..],
        _ if rest.get(..4).is_some_and(|tag| tag.eq_ignore_ascii_case("json")) => &rest[4..],
        _ => rest,
    };

    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

fn is_info_string(s: &str) -> bool {
    s.trim()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Parse a completion as JSON after fence stripping.
pub fn parse_completion(raw: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(strip_code_fence(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unfenced_is_trimmed_only() {
        assert_eq!(strip_code_fence("  {\"a\": 1}\n"), "{\"a\": 1}");
    }

    #[test]
    fn json_fence_is_removed() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fence(raw), "{\"a\": 1}");
    }

    #[test]
    fn bare_fence_with_surrounding_whitespace() {
        let raw = "\n\n  ```\n{\"a\": [1, 2]}\n```  \n";
        assert_eq!(strip_code_fence(raw), "{\"a\": [1, 2]}");
    }

    #[test]
    fn single_line_fence() {
        assert_eq!(strip_code_fence("```json {\"a\": 1} ```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```{\"a\": 1}```"), "{\"a\": 1}");
    }

    #[test]
    fn single_line_fence_tag_ignores_case() {
        assert_eq!(strip_code_fence("```JSON {\"a\": 1}```"), "{\"a\": 1}");
        assert_eq!(parse_completion("```Json {\"a\": 1} ```").unwrap(), json!({"a": 1}));
    }

    #[test]
    fn fenced_and_unfenced_parse_identically() {
        let plain = parse_completion(r#"{"reply": "ok", "n": [1]}"#).unwrap();
        let fenced = parse_completion("```json\n{\"reply\": \"ok\", \"n\": [1]}\n```").unwrap();
        let bare = parse_completion("```\n{\"reply\": \"ok\", \"n\": [1]}\n```").unwrap();
        assert_eq!(plain, json!({"reply": "ok", "n": [1]}));
        assert_eq!(plain, fenced);
        assert_eq!(plain, bare);
    }

    #[test]
    fn backticks_inside_strings_survive() {
        let raw = "```json\n{\"code\": \"use ``` fences\"}\n```";
        let v = parse_completion(raw).unwrap();
        assert_eq!(v["code"], "use ``` fences");
    }

    #[test]
    fn prose_is_not_json() {
        assert!(parse_completion("Claro! Aqui está o resultado.").is_err());
    }
}
