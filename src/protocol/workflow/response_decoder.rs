//! Workflow-shape decoder.
//!
//! Workflow runs answer with one JSON document whose useful text may live
//! under several field paths. The paths are tried in the fixed order of
//! [`WORKFLOW_TEXT_PRECEDENCE`]; the first present, non-empty string wins.

use serde_json::Value;

use crate::protocol::canonical::NormalizedEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathSegment {
    Key(&'static str),
    Index(usize),
}

use PathSegment::{Index, Key};

/// One typed rule for locating the answer text in a workflow response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionRule {
    /// `output.response`, then `answer`.
    AnswerText,
    /// `output.text`, then `text`, then `output_text`.
    GenericText,
    /// `output.message.content`, then `message.content`, then `choices[0].message.content`.
    MessageContent,
    /// The whole payload as text.
    RawFallback,
}

/// Precedence used when several rules match the same response.
///
/// Chosen without real upstream samples; revisit against recorded workflow
/// responses before relying on multi-field payloads.
pub const WORKFLOW_TEXT_PRECEDENCE: [ExtractionRule; 4] = [
    ExtractionRule::AnswerText,
    ExtractionRule::GenericText,
    ExtractionRule::MessageContent,
    ExtractionRule::RawFallback,
];

const ANSWER_TEXT_PATHS: &[&[PathSegment]] = &[&[Key("output"), Key("response")], &[Key("answer")]];
const GENERIC_TEXT_PATHS: &[&[PathSegment]] = &[
    &[Key("output"), Key("text")],
    &[Key("text")],
    &[Key("output_text")],
];
const MESSAGE_CONTENT_PATHS: &[&[PathSegment]] = &[
    &[Key("output"), Key("message"), Key("content")],
    &[Key("message"), Key("content")],
    &[Key("choices"), Index(0), Key("message"), Key("content")],
];

impl ExtractionRule {
    fn paths(self) -> &'static [&'static [PathSegment]] {
        match self {
            ExtractionRule::AnswerText => ANSWER_TEXT_PATHS,
            ExtractionRule::GenericText => GENERIC_TEXT_PATHS,
            ExtractionRule::MessageContent => MESSAGE_CONTENT_PATHS,
            ExtractionRule::RawFallback => &[],
        }
    }

    fn apply(self, payload: &Value) -> Option<String> {
        if self == ExtractionRule::RawFallback {
            let text = match payload {
                Value::String(text) => text.clone(),
                Value::Null => return None,
                other => other.to_string(),
            };
            return (!text.is_empty()).then_some(text);
        }

        self.paths().iter().find_map(|path| {
            lookup(payload, path)
                .and_then(Value::as_str)
                .filter(|text| !text.is_empty())
                .map(ToString::to_string)
        })
    }
}

fn lookup<'v>(value: &'v Value, path: &[PathSegment]) -> Option<&'v Value> {
    path.iter().try_fold(value, |current, segment| match segment {
        Key(key) => current.get(key),
        Index(index) => current.get(index),
    })
}

/// Run the precedence list and report which rule produced the text.
#[must_use]
pub fn extract_workflow_text(payload: &Value) -> Option<(ExtractionRule, String)> {
    WORKFLOW_TEXT_PRECEDENCE
        .iter()
        .find_map(|rule| rule.apply(payload).map(|text| (*rule, text)))
}

/// Decode a workflow response into at most one `Content` event.
#[must_use]
pub fn decode_workflow_response(payload: &Value) -> Option<NormalizedEvent> {
    extract_workflow_text(payload).map(|(_, text)| NormalizedEvent::content(text))
}

/// Split text into slices of at most `max_chars` characters for paced
/// emission. The slices concatenate back to the input; `0` disables slicing.
#[must_use]
pub fn pace_text(text: &str, max_chars: usize) -> Vec<&str> {
    if max_chars == 0 || text.is_empty() {
        return vec![text];
    }
    let mut slices = Vec::with_capacity(text.len() / max_chars + 1);
    let mut start = 0;
    let mut count = 0;
    for (offset, _) in text.char_indices() {
        if count == max_chars {
            slices.push(&text[start..offset]);
            start = offset;
            count = 0;
        }
        count += 1;
    }
    slices.push(&text[start..]);
    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule_and_text(payload: &Value) -> (ExtractionRule, String) {
        extract_workflow_text(payload).expect("text")
    }

    #[test]
    fn test_answer_text_wins_over_everything() {
        let payload = json!({
            "output": {"response": "answer", "text": "generic"},
            "message": {"content": "nested"}
        });
        assert_eq!(
            rule_and_text(&payload),
            (ExtractionRule::AnswerText, "answer".to_string())
        );
    }

    #[test]
    fn test_generic_text_beats_message_content() {
        let payload = json!({"text": "generic", "choices": [{"message": {"content": "nested"}}]});
        assert_eq!(
            rule_and_text(&payload),
            (ExtractionRule::GenericText, "generic".to_string())
        );
    }

    #[test]
    fn test_empty_field_is_skipped() {
        let payload = json!({"output": {"response": ""}, "output_text": "later"});
        assert_eq!(
            rule_and_text(&payload),
            (ExtractionRule::GenericText, "later".to_string())
        );
    }

    #[test]
    fn test_chat_completion_shape() {
        let payload = json!({"choices": [{"message": {"role": "assistant", "content": "hi"}}]});
        assert_eq!(
            rule_and_text(&payload),
            (ExtractionRule::MessageContent, "hi".to_string())
        );
    }

    #[test]
    fn test_non_string_fields_fall_through_to_raw() {
        let payload = json!({"output": {"response": 42}});
        assert_eq!(
            rule_and_text(&payload),
            (
                ExtractionRule::RawFallback,
                r#"{"output":{"response":42}}"#.to_string()
            )
        );
    }

    #[test]
    fn test_raw_string_payload() {
        let payload = json!("plain text reply");
        let event = decode_workflow_response(&payload).expect("event");
        assert_eq!(event.text.as_deref(), Some("plain text reply"));
    }

    #[test]
    fn test_null_and_empty_yield_nothing() {
        assert!(decode_workflow_response(&Value::Null).is_none());
        assert!(decode_workflow_response(&json!("")).is_none());
    }

    #[test]
    fn test_precedence_is_fixed() {
        assert_eq!(
            WORKFLOW_TEXT_PRECEDENCE,
            [
                ExtractionRule::AnswerText,
                ExtractionRule::GenericText,
                ExtractionRule::MessageContent,
                ExtractionRule::RawFallback,
            ]
        );
    }

    #[test]
    fn test_pace_text_preserves_content() {
        let text = "héllo wörld";
        let slices = pace_text(text, 4);
        assert_eq!(slices, vec!["héll", "o wö", "rld"]);
        assert_eq!(slices.concat(), text);
        assert_eq!(pace_text(text, 0), vec![text]);
        assert_eq!(pace_text("abcd", 4), vec!["abcd"]);
    }
}
