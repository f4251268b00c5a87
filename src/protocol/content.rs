//! Message content: plain text or a list of typed blocks.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The content of a [`Message`](super::Message).
///
/// The CLI sometimes reports content as a bare string and sometimes as a list
/// of blocks. The shape is resolved once, at ingestion, into this variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    /// Simple string content.
    Text(String),
    /// Structured content with multiple blocks.
    Blocks(Vec<ContentBlock>),
}

impl Default for Content {
    fn default() -> Self {
        Content::Text(String::new())
    }
}

impl Content {
    /// Get the content as a string (text blocks joined by newlines).
    pub fn as_text(&self) -> String {
        match self {
            Content::Text(s) => s.clone(),
            Content::Blocks(blocks) => blocks
                .iter()
                .filter_map(ContentBlock::text)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// True when there is no text and no blocks.
    pub fn is_empty(&self) -> bool {
        match self {
            Content::Text(s) => s.is_empty(),
            Content::Blocks(blocks) => blocks.is_empty(),
        }
    }

    /// Resolve an arbitrary JSON value into content.
    ///
    /// Strings and block lists map directly; anything else is kept as its
    /// compact JSON text so nothing is lost.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(s) => Content::Text(s),
            Value::Null => Content::default(),
            other => serde_json::from_value::<Vec<ContentBlock>>(other.clone())
                .map(Content::Blocks)
                .unwrap_or_else(|_| Content::Text(other.to_string())),
        }
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Text(s)
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Text(s.to_string())
    }
}

/// A content block within structured content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text content.
    Text {
        text: String,
    },
    /// A tool use request embedded in content.
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    /// Image content (base64 encoded).
    Image {
        source: ImageSource,
    },
}

impl ContentBlock {
    /// Text of a text block.
    pub fn text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Image source data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSource {
    /// Source type (usually "base64").
    #[serde(rename = "type")]
    pub source_type: String,
    /// Media type (e.g., "image/png").
    pub media_type: String,
    /// Encoded image data.
    pub data: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_content_resolves_to_text() {
        let content: Content = serde_json::from_value(json!("file not found")).unwrap();
        assert_eq!(content, Content::Text("file not found".into()));
    }

    #[test]
    fn block_list_resolves_to_blocks() {
        let content = Content::from_value(json!([
            {"type": "text", "text": "line one"},
            {"type": "image", "source": {"type": "base64", "media_type": "image/png", "data": "AA=="}},
            {"type": "text", "text": "line two"}
        ]));
        assert!(matches!(content, Content::Blocks(ref b) if b.len() == 3));
        assert_eq!(content.as_text(), "line one\nline two");
    }

    #[test]
    fn unrecognised_json_is_kept_as_text() {
        let content = Content::from_value(json!({"rows": 3}));
        assert_eq!(content, Content::Text(r#"{"rows":3}"#.into()));

        assert!(Content::from_value(Value::Null).is_empty());
    }

    #[test]
    fn tool_use_block_defaults_input() {
        let block: ContentBlock =
            serde_json::from_value(json!({"type": "tool_use", "id": "t1", "name": "Read"})).unwrap();
        assert!(matches!(block, ContentBlock::ToolUse { input: Value::Null, .. }));
        assert!(block.text().is_none());
    }
}
