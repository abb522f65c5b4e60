//! Lenient recovery of JSON objects from model output.
//!
//! Models wrap JSON in markdown fences, leak chat-template prologue, or
//! append commentary. Recovery order: strip fences, try a full parse,
//! then fall back to the last syntactically balanced object or array
//! that does not contain schema placeholders. If nothing is
//! recoverable, callers issue a single repair reprompt and only then
//! give up.

/// Placeholder tokens that mark an echoed schema template rather than a
/// real answer.
const PLACEHOLDERS: &[&str] = &["<int>", "<string>", "<float>", "<bool>", "<number>", "..."];

/// Try to pull one JSON object or array out of raw model output.
pub fn recover_json(raw: &str) -> Option<serde_json::Value> {
    let stripped = strip_fences(raw);

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(stripped.trim()) {
        if value.is_object() || value.is_array() {
            return Some(value);
        }
    }

    for candidate in balanced_candidates(&stripped).into_iter().rev() {
        if PLACEHOLDERS.iter().any(|p| candidate.contains(p)) {
            continue;
        }
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(candidate) {
            if value.is_object() || value.is_array() {
                return Some(value);
            }
        }
    }

    None
}

/// Remove markdown code-fence lines, keeping their contents.
fn strip_fences(raw: &str) -> String {
    if !raw.contains("```") {
        return raw.to_string();
    }
    raw.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Top-level balanced `{...}` / `[...]` spans, in order of appearance.
fn balanced_candidates(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut candidates = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' if depth > 0 => in_string = true,
            b'{' | b'[' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            b'}' | b']' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        candidates.push(&text[start..=i]);
                    }
                }
            }
            _ => {}
        }
    }
    candidates
}

/// The single repair reprompt: quote the malformed output and restate
/// the expected shape.
pub fn repair_prompt(schema_hint: &str, malformed: &str) -> String {
    let truncated: String = malformed.chars().take(1500).collect();
    format!(
        "Your previous reply could not be parsed as JSON. Reply again with \
         a single JSON object matching this schema and nothing else.\n\n\
         Schema:\n{schema_hint}\n\nPrevious reply (truncated):\n{truncated}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_object() {
        let value = recover_json(r#"{"answer": "yes", "need_more": false}"#).unwrap();
        assert_eq!(value["answer"], "yes");
    }

    #[test]
    fn test_fenced_object() {
        let raw = "```json\n{\"chunks\":[{\"first\":\"Hello world.\",\"last\":\"This is a test.\"}]}\n```";
        let value = recover_json(raw).unwrap();
        assert_eq!(value["chunks"][0]["first"], "Hello world.");
        assert_eq!(value["chunks"][0]["last"], "This is a test.");
    }

    #[test]
    fn test_prologue_and_commentary() {
        let raw = "Sure! Here is the plan you asked for:\n\
                   {\"need_more\": true, \"next_query\": \"budget 2024\"}\n\
                   Let me know if you need anything else.";
        let value = recover_json(raw).unwrap();
        assert_eq!(value["next_query"], "budget 2024");
    }

    #[test]
    fn test_skips_schema_template_echo() {
        let raw = "The format is {\"count\": <int>, \"name\": <string>} and my answer is\n\
                   {\"count\": 3, \"name\": \"alpha\"}";
        let value = recover_json(raw).unwrap();
        assert_eq!(value["count"], 3);
    }

    #[test]
    fn test_takes_last_balanced_object() {
        let raw = r#"{"draft": 1} some thinking {"final": 2}"#;
        let value = recover_json(raw).unwrap();
        assert_eq!(value, json!({"final": 2}));
    }

    #[test]
    fn test_braces_inside_strings_do_not_confuse_scanner() {
        let raw = r#"note {"text": "a } inside \" quotes", "n": 1} done"#;
        let value = recover_json(raw).unwrap();
        assert_eq!(value["n"], 1);
    }

    #[test]
    fn test_unrecoverable_returns_none() {
        assert!(recover_json("no json here at all").is_none());
        assert!(recover_json("{\"broken\": ").is_none());
        assert!(recover_json("42").is_none());
    }

    #[test]
    fn test_array_is_recoverable() {
        let value = recover_json("prefix [1, 2, 3] suffix").unwrap();
        assert_eq!(value, json!([1, 2, 3]));
    }

    #[test]
    fn test_repair_prompt_truncates() {
        let long = "x".repeat(5000);
        let prompt = repair_prompt("{\"a\": 1}", &long);
        assert!(prompt.len() < 2000);
        assert!(prompt.contains("could not be parsed"));
    }
}
