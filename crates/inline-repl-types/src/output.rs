//! Kernel output: raw items as streamed, and classified results.

use serde::{Deserialize, Serialize};

/// MIME type used for error payloads and plain text.
pub const TEXT_PLAIN: &str = "text/plain";

/// One raw item of kernel output (mime type + bytes).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOutputItem {
    pub mime: String,
    pub data: Vec<u8>,
}

impl RawOutputItem {
    pub fn new(mime: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            mime: mime.into(),
            data: data.into(),
        }
    }

    /// A `text/plain` item.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(TEXT_PLAIN, text.into().into_bytes())
    }

    /// Data decoded as UTF-8 (lossy).
    pub fn decode(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// One message streamed by a kernel session: an ordered group of items.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOutput {
    pub items: Vec<RawOutputItem>,
}

impl RawOutput {
    pub fn new(items: Vec<RawOutputItem>) -> Self {
        Self { items }
    }

    /// A message with a single `text/plain` item.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(vec![RawOutputItem::text(text)])
    }
}

/// Classification of a result chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Output,
    Error,
}

/// A classified result chunk ready for presentation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    pub kind: OutputKind,
    /// Display text (decoded output, or the extracted error trace).
    pub content: String,
    pub mime_type: String,
    /// Undecoded bytes, for binary mime types such as images.
    pub raw: Vec<u8>,
}

impl ExecutionOutput {
    /// Ok output carrying the item's mime type and bytes.
    pub fn output(content: impl Into<String>, item: &RawOutputItem) -> Self {
        Self {
            kind: OutputKind::Output,
            content: content.into(),
            mime_type: item.mime.clone(),
            raw: item.data.clone(),
        }
    }

    /// Error output. `raw` keeps the original payload text.
    pub fn error(content: impl Into<String>, payload: &str) -> Self {
        Self {
            kind: OutputKind::Error,
            content: content.into(),
            mime_type: TEXT_PLAIN.to_string(),
            raw: payload.as_bytes().to_vec(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == OutputKind::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_lossy() {
        let item = RawOutputItem::new("text/plain", vec![0x34, 0x32, 0xff]);
        assert_eq!(item.decode(), "42\u{fffd}");
    }

    #[test]
    fn test_output_keeps_mime_and_bytes() {
        let item = RawOutputItem::new("image/png", vec![1, 2, 3]);
        let out = ExecutionOutput::output("", &item);
        assert_eq!(out.kind, OutputKind::Output);
        assert_eq!(out.mime_type, "image/png");
        assert_eq!(out.raw, vec![1, 2, 3]);
    }

    #[test]
    fn test_error_is_plain_text() {
        let out = ExecutionOutput::error("trace", "{\"name\":\"Error\"}");
        assert!(out.is_error());
        assert_eq!(out.mime_type, TEXT_PLAIN);
        assert_eq!(out.raw, b"{\"name\":\"Error\"}".to_vec());
    }
}
