use futures::future::BoxFuture;
use serde_json::{Map, Value};

use crate::content::StreamedContent;

#[derive(Debug, Clone)]
/// The value carried by a message, tagged by kind so serializers never inspect its shape
pub enum Content {
    /// An immediate string
    Text(String),
    /// An immediate structured document
    Json(Value),
    /// Text that may still be generated, streamed as a single JSON string
    StreamedText(StreamedContent<String>),
    /// A structured value where only the final result matters
    StreamedJson(StreamedContent<Value>),
    /// A document whose fields may themselves be streamed, kept in insertion order
    Object(Vec<(String, Content)>),
}

impl Content {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Content::Text(text.into())
    }

    pub fn json(value: Value) -> Self {
        Content::Json(value)
    }

    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Content)>,
    {
        Content::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Drain every stream and build the equivalent JSON value.
    pub fn resolve(&self) -> BoxFuture<'_, Value> {
        Box::pin(async move {
            match self {
                Content::Text(text) => Value::String(text.clone()),
                Content::Json(value) => value.clone(),
                Content::StreamedText(streamed) => Value::String(streamed.get().await),
                Content::StreamedJson(streamed) => streamed.get().await,
                Content::Object(fields) => {
                    let mut map = Map::new();
                    for (key, value) in fields {
                        map.insert(key.clone(), value.resolve().await);
                    }
                    Value::Object(map)
                }
            }
        })
    }

    /// Drain every stream and flatten the content into plain text for the model-replay view.
    pub async fn resolve_text(&self) -> String {
        match self {
            Content::Text(text) => text.clone(),
            Content::StreamedText(streamed) => streamed.get().await,
            other => match other.resolve().await {
                Value::String(text) => text,
                value => value.to_string(),
            },
        }
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<Value> for Content {
    fn from(value: Value) -> Self {
        Content::Json(value)
    }
}

impl From<StreamedContent<String>> for Content {
    fn from(streamed: StreamedContent<String>) -> Self {
        Content::StreamedText(streamed)
    }
}

impl From<StreamedContent<Value>> for Content {
    fn from(streamed: StreamedContent<Value>) -> Self {
        Content::StreamedJson(streamed)
    }
}
