//! Output classification: ok output vs. error payload.
//!
//! Kernels report errors in-band as JSON objects (`name`, `message`,
//! optional `stack`). Each language variant has its own idea of what a valid
//! error payload looks like, so classification is a capability injected into
//! the streaming executor rather than a fixed rule.
//!
//! ```text
//!   RawOutputItem ──▶ classify() ──▶ is_error? ──no──▶ ExecutionOutput::Output
//!                                        │
//!                                       yes
//!                                        ▼
//!                                  parse_error() ──▶ ExecutionOutput::Error
//!                                        │
//!                                  (contract broken)
//!                                        ▼
//!                                  ClassifyError
//! ```
//!
//! Contract: `is_error` returns true only when `parse_error` is guaranteed
//! to succeed for the same input. A failure inside `parse_error` after
//! `is_error` claimed the chunk is a fault, not a "not an error" outcome.

use std::sync::LazyLock;

use inline_repl_types::{ExecutionOutput, RawOutputItem};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::ClassifyError;

/// Classifies raw kernel output chunks.
pub trait OutputClassifier: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Whether the decoded chunk is an error payload.
    fn is_error(&self, raw: &str) -> bool;

    /// Extract the display form of an error payload.
    fn parse_error(&self, raw: &str) -> Result<ExecutionOutput, ClassifyError>;

    /// Classify one raw item.
    fn classify(&self, item: &RawOutputItem) -> Result<ExecutionOutput, ClassifyError> {
        let content = item.decode();
        debug!(classifier = self.name(), mime = %item.mime, %content, "kernel output");

        if self.is_error(&content) {
            self.parse_error(&content)
        } else {
            Ok(ExecutionOutput::output(content, item))
        }
    }
}

/// Error payload shape shared by the language variants.
#[derive(Debug, Deserialize)]
struct ErrorPayload {
    name: String,
    message: String,
    #[serde(default)]
    stack: Option<String>,
}

impl ErrorPayload {
    /// Stack when present and non-empty, otherwise the message.
    fn display(self) -> String {
        match self.stack {
            Some(stack) if !stack.is_empty() => stack,
            _ => self.message,
        }
    }
}

/// Parse `raw` as an error payload and run the variant's name check.
fn validated_payload(
    raw: &str,
    name_ok: impl Fn(&str) -> bool,
) -> Result<ErrorPayload, ClassifyError> {
    // serde also accepts a struct as a sequence; only objects are payloads.
    let map = match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => map,
        other => {
            return Err(ClassifyError::Schema(format!(
                "expected an object, got {}",
                json_kind(&other)
            )));
        }
    };
    if matches!(map.get("stack"), Some(Value::Null)) {
        return Err(ClassifyError::Schema("stack is null".into()));
    }
    let payload: ErrorPayload = serde_json::from_value(Value::Object(map))?;
    if !name_ok(&payload.name) {
        return Err(ClassifyError::Schema(format!(
            "unexpected error name {:?}",
            payload.name
        )));
    }
    Ok(payload)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ============================================================================
// Generic
// ============================================================================

/// Default classifier: a JSON object whose `name` is exactly `"Error"`.
///
/// Extraction prefers `stack` and falls back to the raw text.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericClassifier;

impl GenericClassifier {
    fn error_object(raw: &str) -> Option<serde_json::Map<String, Value>> {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        }
    }
}

impl OutputClassifier for GenericClassifier {
    fn name(&self) -> &str {
        "generic"
    }

    fn is_error(&self, raw: &str) -> bool {
        Self::error_object(raw)
            .is_some_and(|map| map.get("name").and_then(|v| v.as_str()) == Some("Error"))
    }

    fn parse_error(&self, raw: &str) -> Result<ExecutionOutput, ClassifyError> {
        let map = match serde_json::from_str::<Value>(raw)? {
            Value::Object(map) => map,
            other => {
                return Err(ClassifyError::Schema(format!(
                    "expected a JSON object, got {other}"
                )));
            }
        };

        let content = match map.get("stack").and_then(|v| v.as_str()) {
            Some(stack) if !stack.is_empty() => stack.to_string(),
            _ => raw.to_string(),
        };
        Ok(ExecutionOutput::error(content, raw))
    }
}

// ============================================================================
// Ruby
// ============================================================================

static RUBY_ERROR_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:Errno::.+|.+Error)$").expect("ruby error name pattern is valid")
});

/// Ruby kernels: `name` is `Errno::*` or `*Error`, `message` required.
#[derive(Debug, Default, Clone, Copy)]
pub struct RubyClassifier;

impl RubyClassifier {
    fn name_ok(name: &str) -> bool {
        RUBY_ERROR_NAME.is_match(name)
    }
}

impl OutputClassifier for RubyClassifier {
    fn name(&self) -> &str {
        "ruby"
    }

    fn is_error(&self, raw: &str) -> bool {
        validated_payload(raw, Self::name_ok).is_ok()
    }

    fn parse_error(&self, raw: &str) -> Result<ExecutionOutput, ClassifyError> {
        let payload = validated_payload(raw, Self::name_ok)?;
        Ok(ExecutionOutput::error(payload.display(), raw))
    }
}

// ============================================================================
// Rust
// ============================================================================

/// Rust kernels: `name` is exactly `"Error"`, `message` required.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustClassifier;

impl RustClassifier {
    fn name_ok(name: &str) -> bool {
        name == "Error"
    }
}

impl OutputClassifier for RustClassifier {
    fn name(&self) -> &str {
        "rust"
    }

    fn is_error(&self, raw: &str) -> bool {
        validated_payload(raw, Self::name_ok).is_ok()
    }

    fn parse_error(&self, raw: &str) -> Result<ExecutionOutput, ClassifyError> {
        let payload = validated_payload(raw, Self::name_ok)?;
        Ok(ExecutionOutput::error(payload.display(), raw))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use inline_repl_types::OutputKind;

    fn classify(classifier: &dyn OutputClassifier, text: &str) -> ExecutionOutput {
        classifier.classify(&RawOutputItem::text(text)).unwrap()
    }

    #[test]
    fn test_generic_prefers_stack() {
        let out = classify(
            &GenericClassifier,
            r#"{"name":"Error","message":"boom","stack":"trace"}"#,
        );
        assert_eq!(out.kind, OutputKind::Error);
        assert_eq!(out.content, "trace");
        assert_eq!(out.mime_type, "text/plain");
    }

    #[test]
    fn test_generic_falls_back_to_raw_text() {
        let raw = r#"{"name":"Error","message":"boom"}"#;
        let out = classify(&GenericClassifier, raw);
        assert_eq!(out.kind, OutputKind::Error);
        assert_eq!(out.content, raw);
    }

    #[test]
    fn test_generic_other_names_are_output() {
        let out = classify(&GenericClassifier, r#"{"name":"TypeError","message":"x"}"#);
        assert_eq!(out.kind, OutputKind::Output);
    }

    #[test]
    fn test_plain_text_is_output() {
        for classifier in [
            &GenericClassifier as &dyn OutputClassifier,
            &RubyClassifier,
            &RustClassifier,
        ] {
            let out = classify(classifier, "42");
            assert_eq!(out.kind, OutputKind::Output);
            assert_eq!(out.content, "42");
            assert_eq!(out.raw, b"42".to_vec());
        }
    }

    #[test]
    fn test_ruby_error_suffix_without_stack() {
        let out = classify(&RubyClassifier, r#"{"name":"FooError","message":"m"}"#);
        assert_eq!(out.kind, OutputKind::Error);
        assert_eq!(out.content, "m");
    }

    #[test]
    fn test_ruby_errno_prefix() {
        let out = classify(
            &RubyClassifier,
            r#"{"name":"Errno::ENOENT","message":"No such file","stack":"a.rb:1"}"#,
        );
        assert_eq!(out.kind, OutputKind::Error);
        assert_eq!(out.content, "a.rb:1");
    }

    #[test]
    fn test_ruby_rejects_bare_error_and_missing_message() {
        assert!(!RubyClassifier.is_error(r#"{"name":"Error","message":"m"}"#));
        assert!(!RubyClassifier.is_error(r#"{"name":"FooError"}"#));
        assert!(!RubyClassifier.is_error(r#"{"name":"Exception","message":"m"}"#));
        assert!(!RubyClassifier.is_error("not json"));
    }

    #[test]
    fn test_rust_requires_exact_name() {
        assert!(RustClassifier.is_error(r#"{"name":"Error","message":"m"}"#));
        assert!(!RustClassifier.is_error(r#"{"name":"FooError","message":"m"}"#));
        assert!(!RustClassifier.is_error(r#"{"name":"Error"}"#));
    }

    #[test]
    fn test_rust_empty_stack_falls_back_to_message() {
        let out = classify(
            &RustClassifier,
            r#"{"name":"Error","message":"overflow","stack":""}"#,
        );
        assert_eq!(out.content, "overflow");
    }

    #[test]
    fn test_array_payloads_are_output() {
        let out = classify(&RustClassifier, r#"["Error","oops"]"#);
        assert_eq!(out.kind, OutputKind::Output);
        let out = classify(&RubyClassifier, r#"["KeyError","missing"]"#);
        assert_eq!(out.kind, OutputKind::Output);
        assert!(matches!(
            RustClassifier.parse_error(r#"["Error","oops"]"#),
            Err(ClassifyError::Schema(_))
        ));
    }

    #[test]
    fn test_null_stack_is_not_an_error_payload() {
        let raw = r#"{"name":"Error","message":"m","stack":null}"#;
        assert!(!RustClassifier.is_error(raw));
        assert_eq!(classify(&RustClassifier, raw).kind, OutputKind::Output);

        let raw = r#"{"name":"KeyError","message":"m","stack":null}"#;
        assert!(!RubyClassifier.is_error(raw));
        assert!(matches!(
            RubyClassifier.parse_error(raw),
            Err(ClassifyError::Schema(_))
        ));
    }

    #[test]
    fn test_parse_error_without_claim_is_fault() {
        assert!(matches!(
            RustClassifier.parse_error("{not json"),
            Err(ClassifyError::InvalidJson(_))
        ));
        assert!(matches!(
            RubyClassifier.parse_error(r#"{"name":"Oops","message":"m"}"#),
            Err(ClassifyError::Schema(_))
        ));
        assert!(matches!(
            GenericClassifier.parse_error("[1,2]"),
            Err(ClassifyError::Schema(_))
        ));
    }

    #[test]
    fn test_is_error_implies_parse_succeeds() {
        let samples = [
            r#"{"name":"Error","message":"boom","stack":"trace"}"#,
            r#"{"name":"Error"}"#,
            r#"{"name":"FooError","message":"m"}"#,
            r#"{"name":"Errno::EPIPE","message":"m","stack":null}"#,
            r#"{"name":"Error","message":"m","stack":""}"#,
            "42",
            "[]",
            r#"["Error","oops"]"#,
        ];
        for classifier in [
            &GenericClassifier as &dyn OutputClassifier,
            &RubyClassifier,
            &RustClassifier,
        ] {
            for raw in samples {
                if classifier.is_error(raw) {
                    assert!(
                        classifier.parse_error(raw).is_ok(),
                        "{} claimed {raw} but failed to parse it",
                        classifier.name()
                    );
                }
            }
        }
    }
}
