//! Incremental JSON encoding of a message stream.
//!
//! Messages are written as a JSON array of `{type, value}` objects while their content is
//! still being generated. Text streams are emitted inside a quoted string, one escaped
//! fragment at a time, so each token can be flushed to the client as soon as it arrives.
//! Once complete, the output parses to the same document as resolving every stream first.
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde_json::Value;

use crate::models::content::Content;
use crate::models::message::Message;

/// Encode `messages` as a JSON array, skipping messages hidden from the user
pub fn encode_messages<'a, S>(messages: S) -> BoxStream<'a, String>
where
    S: Stream<Item = Message> + Send + 'a,
{
    Box::pin(async_stream::stream! {
        let mut messages = Box::pin(messages);
        let mut first = true;

        yield "[".to_string();
        while let Some(message) = messages.next().await {
            if !message.show_user {
                continue;
            }
            if !first {
                yield ",".to_string();
            }
            first = false;

            let wire = message.to_wire();
            let mut fragments = encode_content(&wire);
            while let Some(fragment) = fragments.next().await {
                yield fragment;
            }
        }
        yield "]".to_string();
    })
}

/// Encode one piece of content, draining its streams as it goes
pub fn encode_content(content: &Content) -> BoxStream<'_, String> {
    match content {
        Content::Text(text) => once(Value::String(text.clone()).to_string()),
        Content::Json(value) => once(value.to_string()),
        Content::StreamedText(streamed) => Box::pin(async_stream::stream! {
            yield "\"".to_string();
            let mut fragments = streamed.iterate();
            while let Some(fragment) = fragments.next().await {
                if !fragment.is_empty() {
                    yield escape_fragment(&fragment);
                }
            }
            yield "\"".to_string();
        }),
        // Only the final value of a structured stream is meaningful
        Content::StreamedJson(streamed) => {
            Box::pin(stream::once(async move { streamed.get().await.to_string() }))
        }
        Content::Object(fields) => Box::pin(async_stream::stream! {
            yield "{".to_string();
            for (i, (key, value)) in fields.iter().enumerate() {
                let separator = if i == 0 { "" } else { "," };
                yield format!("{}{}:", separator, Value::String(key.clone()));
                let mut fragments = encode_content(value);
                while let Some(fragment) = fragments.next().await {
                    yield fragment;
                }
            }
            yield "}".to_string();
        }),
    }
}

/// Collect the whole encoding, for consumers that cannot stream
pub async fn encode_to_string<'a, S>(messages: S) -> String
where
    S: Stream<Item = Message> + Send + 'a,
{
    encode_messages(messages).collect::<Vec<_>>().await.concat()
}

fn once(fragment: String) -> BoxStream<'static, String> {
    Box::pin(stream::once(async move { fragment }))
}

/// Escape a piece of text for use inside a JSON string, without the surrounding quotes
fn escape_fragment(fragment: &str) -> String {
    let quoted = Value::String(fragment.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}
