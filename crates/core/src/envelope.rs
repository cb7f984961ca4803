//! Completion response envelopes and reply extraction.
//!
//! The Responses API has returned its text in two shapes over time:
//!
//! - flat: `{ "output_text": "..." }`
//! - nested: `{ "output": [ { "content": [ { "type": "output_text", "text": ... } ] } ] }`
//!   where `text` is either a string or `{ "value": "..." }`
//!
//! Real payloads can carry both, plus items that have nothing to do with
//! text (reasoning, tool calls). Decoding is lenient: unknown fields and
//! unexpected value types are ignored rather than rejected.

use serde::Deserialize;
use serde::de::IgnoredAny;
use tracing::debug;

/// Content block types that carry display text.
const TEXT_BLOCK_TYPES: &[&str] = &["output_text", "text"];

/// The raw response of a completion call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(default, deserialize_with = "lenient::string")]
    output_text: Option<String>,
    #[serde(default, deserialize_with = "lenient::seq")]
    output: Vec<OutputItem>,
}

/// One entry of the nested `output` array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OutputItem {
    #[serde(default, deserialize_with = "lenient::seq")]
    pub content: Vec<ContentBlock>,
}

/// One entry of an item's `content` array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type", default, deserialize_with = "lenient::string")]
    pub kind: Option<String>,
    #[serde(default)]
    pub text: Option<TextValue>,
}

/// The polymorphic `text` field of a content block.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TextValue {
    Plain(String),
    Wrapped { value: String },
    Unsupported(serde_json::Value),
}

impl TextValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TextValue::Plain(s) => Some(s),
            TextValue::Wrapped { value } => Some(value),
            TextValue::Unsupported(_) => None,
        }
    }
}

/// The documented envelope shapes, in extraction priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeShape<'a> {
    Flat(&'a str),
    Nested(&'a [OutputItem]),
}

impl ResponseEnvelope {
    /// A flat envelope.
    pub fn flat(text: impl Into<String>) -> Self {
        Self {
            output_text: Some(text.into()),
            output: Vec::new(),
        }
    }

    /// A nested envelope.
    pub fn nested(output: Vec<OutputItem>) -> Self {
        Self {
            output_text: None,
            output,
        }
    }

    /// Decode a raw response body. A body that is not a JSON object yields
    /// the empty envelope.
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<Self>(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(error = %e, "Response body is not a recognizable envelope");
                Self::default()
            }
        }
    }

    /// The shapes present in this envelope, flat first.
    pub fn shapes(&self) -> Vec<EnvelopeShape<'_>> {
        let mut shapes = Vec::with_capacity(2);
        if let Some(text) = self.output_text.as_deref() {
            shapes.push(EnvelopeShape::Flat(text));
        }
        if !self.output.is_empty() {
            shapes.push(EnvelopeShape::Nested(&self.output));
        }
        shapes
    }
}

impl ContentBlock {
    /// Build a textual output block.
    pub fn output_text(text: TextValue) -> Self {
        Self {
            kind: Some("output_text".into()),
            text: Some(text),
        }
    }

    fn is_textual(&self) -> bool {
        self.kind
            .as_deref()
            .is_some_and(|k| TEXT_BLOCK_TYPES.contains(&k))
    }
}

/// Extract the assistant's display text from an envelope.
///
/// The flat field wins if it has any non-whitespace content. Otherwise the
/// first textual content block with non-empty text, in document order.
/// Returns `""` when nothing matches. Result is trimmed.
pub fn extract_reply(envelope: &ResponseEnvelope) -> String {
    for shape in envelope.shapes() {
        let found = match shape {
            EnvelopeShape::Flat(text) => non_empty(text),
            EnvelopeShape::Nested(items) => items
                .iter()
                .flat_map(|item| item.content.iter())
                .filter(|block| block.is_textual())
                .filter_map(|block| block.text.as_ref().and_then(TextValue::as_str))
                .find_map(non_empty),
        };
        if let Some(text) = found {
            return text.to_string();
        }
    }
    String::new()
}

fn non_empty(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Field deserializers that fall back to the default on a type mismatch.
mod lenient {
    use super::IgnoredAny;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Maybe<T> {
        Value(T),
        Other(IgnoredAny),
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Maybe::<String>::deserialize(d)? {
            Maybe::Value(s) => Some(s),
            Maybe::Other(_) => None,
        })
    }

    pub fn seq<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Ok(match Maybe::<Vec<Maybe<T>>>::deserialize(d)? {
            Maybe::Value(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Maybe::Value(v) => Some(v),
                    Maybe::Other(_) => None,
                })
                .collect(),
            Maybe::Other(_) => Vec::new(),
        })
    }
}
