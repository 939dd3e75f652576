use serde_json::Value;

/// Browser global the client reads its bootstrap cache from.
pub const STATE_GLOBAL: &str = "APOLLO_STATE";

/// Serialize cache state for inline embedding inside a `<script>` element.
///
/// Characters that could close the element or break the surrounding script
/// are emitted as `\u` escapes, which keeps the output valid JSON.
pub fn serialize_state(state: &Value) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(state)?;
    let mut escaped = String::with_capacity(json.len());
    for ch in json.chars() {
        match ch {
            '<' => escaped.push_str("\\u003c"),
            '>' => escaped.push_str("\\u003e"),
            '&' => escaped.push_str("\\u0026"),
            '\u{2028}' => escaped.push_str("\\u2028"),
            '\u{2029}' => escaped.push_str("\\u2029"),
            other => escaped.push(other),
        }
    }
    Ok(escaped)
}

/// Collected CSS goes inside `<style>`; keep it from closing the element.
pub fn inline_css(css: &str) -> String {
    css.replace("</", "<\\/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn escapes_script_terminators() {
        let state = json!({ "Post:1": { "body": "</script><script>alert(1)</script>" } });
        let serialized = serialize_state(&state).expect("serialize");
        assert!(!serialized.contains("</script>"));
        assert!(!serialized.contains('<'));
    }

    #[test]
    fn escaped_output_parses_back_to_the_same_value() {
        let state = json!({
            "ROOT_QUERY": { "note": "a & b <c> \u{2028} \u{2029}", "n": 3 }
        });
        let serialized = serialize_state(&state).expect("serialize");
        let parsed: Value = serde_json::from_str(&serialized).expect("parse");
        assert_eq!(parsed, state);
    }

    #[test]
    fn inline_css_cannot_close_the_style_element() {
        assert_eq!(inline_css("a{}</style>"), "a{}<\\/style>");
    }
}
