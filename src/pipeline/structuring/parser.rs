use serde::Deserialize;

use super::types::{ExtractionOutcome, StructuredField};

/// Interpret the model's message content as a field list.
///
/// Accepts the bare JSON document, the same wrapped in a Markdown code
/// fence, or surrounded by stray prose. Entries missing a string `name` or
/// a `value` are skipped and reported as degradation; non-string values
/// are stringified.
pub fn parse_fields(content: &str) -> ExtractionOutcome {
    let json_str = strip_code_fence(content);
    let root: serde_json::Value = match serde_json::from_str(json_str) {
        Ok(v) => v,
        Err(first) => match outermost_object(json_str).map(serde_json::from_str::<serde_json::Value>) {
            Some(Ok(v)) => v,
            _ => {
                return ExtractionOutcome::Failure {
                    reason: format!("content is not JSON: {first}"),
                }
            }
        },
    };

    let Some(entries) = root.get("fields").and_then(|f| f.as_array()) else {
        return ExtractionOutcome::Failure {
            reason: "response has no \"fields\" array".into(),
        };
    };

    let fields = parse_field_entries(entries);
    let skipped = entries.len() - fields.len();
    if skipped > 0 {
        ExtractionOutcome::Degraded {
            fields,
            reason: format!("skipped {skipped} malformed field entries"),
        }
    } else {
        ExtractionOutcome::Success { fields }
    }
}

#[derive(Deserialize)]
struct RawField {
    name: String,
    value: serde_json::Value,
}

/// Parse leniently, dropping entries that fail to deserialize.
fn parse_field_entries(entries: &[serde_json::Value]) -> Vec<StructuredField> {
    entries
        .iter()
        .filter_map(|v| serde_json::from_value::<RawField>(v.clone()).ok())
        .filter_map(|raw| {
            let value = match raw.value {
                serde_json::Value::Null => return None,
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            Some(StructuredField::new(raw.name, value))
        })
        .collect()
}

/// Inner text of a ```` ```json ```` (or bare ```` ``` ````) fence, else the input trimmed.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after_ticks = &trimmed[start + 3..];
    // Skip the info string (`json`, `JSON`, ...) up to the end of the line.
    let body_start = after_ticks.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_ticks[body_start..];
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

fn outermost_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    (end > start).then(|| &s[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_output_is_returned_verbatim() {
        let content = r#"{"fields":[{"name":"Aorta","value":"32 mm"},{"name":"FE Simpson","value":"62%"}]}"#;
        match parse_fields(content) {
            ExtractionOutcome::Success { fields } => {
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[0], StructuredField::new("Aorta", "32 mm"));
                assert_eq!(fields[1].value, "62%");
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn fenced_json_is_accepted() {
        let content = "```json\n{\"fields\":[{\"name\":\"VDF\",\"value\":\"110 ml\"}]}\n```";
        assert_eq!(parse_fields(content).fields().len(), 1);
    }

    #[test]
    fn prose_around_json_is_tolerated() {
        let content = "Aqui está:\n{\"fields\":[{\"name\":\"VSF\",\"value\":\"40 ml\"}]}\nObrigado.";
        assert_eq!(parse_fields(content).fields()[0].name, "VSF");
    }

    #[test]
    fn non_json_is_failure() {
        let outcome = parse_fields("Desculpe, não encontrei valores.");
        assert!(outcome.is_failure());
    }

    #[test]
    fn missing_fields_key_is_failure() {
        assert!(parse_fields(r#"{"data":[]}"#).is_failure());
    }

    #[test]
    fn empty_field_list_is_success() {
        assert_eq!(
            parse_fields(r#"{"fields":[]}"#),
            ExtractionOutcome::Success { fields: vec![] }
        );
    }

    #[test]
    fn malformed_entries_are_skipped_and_reported() {
        let content = r#"{"fields":[
            {"name":"Aorta","value":"32 mm"},
            {"value":"orphan"},
            {"name":"Massa do VE","value":null},
            "loose string"
        ]}"#;
        match parse_fields(content) {
            ExtractionOutcome::Degraded { fields, reason } => {
                assert_eq!(fields.len(), 1);
                assert!(reason.contains('3'));
            }
            other => panic!("expected degraded, got {other:?}"),
        }
    }

    #[test]
    fn non_string_values_are_stringified() {
        let content = r#"{"fields":[{"name":"Aorta","value":32},{"name":"Normal","value":true}]}"#;
        let fields = parse_fields(content).into_fields();
        assert_eq!(fields[0].value, "32");
        assert_eq!(fields[1].value, "true");
    }

    #[test]
    fn accents_survive() {
        let content = r#"{"fields":[{"name":"Átrio esquerdo","value":"38 mm"}]}"#;
        assert_eq!(parse_fields(content).fields()[0].name, "Átrio esquerdo");
    }
}
