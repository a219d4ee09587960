//! Multi-step work run by a tool on behalf of the user.
//!
//! A [`Process`] streams user-visible progress while it works and keeps internal notes on
//! the side. The notes become the thoughts of the processing message, so the model sees what
//! was done on later turns even when the user only saw a short summary.
use futures::stream::{self, Stream};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};

use crate::content::StreamedContent;
use crate::models::message::Message;

/// Handed to the job so it can leave notes and store its results
#[derive(Clone, Default)]
pub struct ProcessHandle {
    notes: Arc<Mutex<Vec<String>>>,
    results: Arc<Mutex<Option<Value>>>,
}

impl ProcessHandle {
    /// Record a note for the model. Returns the text so it can also be shown to the user.
    pub fn note<S: Into<String>>(&self, text: S) -> String {
        let text = text.into();
        self.notes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text.trim().to_string());
        text
    }

    pub fn set_results(&self, results: Value) {
        *self.results.lock().unwrap_or_else(PoisonError::into_inner) = Some(results);
    }
}

#[derive(Clone)]
pub struct Process {
    summary: String,
    content: StreamedContent<String>,
    handle: ProcessHandle,
}

impl Process {
    /// Wrap a job. Nothing runs until the process content is first pulled.
    pub fn new<F, S>(summary: impl Into<String>, job: F) -> Self
    where
        F: FnOnce(ProcessHandle) -> S,
        S: Stream<Item = String> + Send + 'static,
    {
        let handle = ProcessHandle::default();
        Self {
            summary: summary.into(),
            content: StreamedContent::text(job(handle.clone())),
            handle,
        }
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// The user-visible progress text
    pub fn content(&self) -> StreamedContent<String> {
        self.content.clone()
    }

    /// Run the job to completion and return what it stored
    pub async fn results(&self) -> Option<Value> {
        self.content.get().await;
        self.handle
            .results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run the job to completion and join its notes
    pub async fn summarize(&self) -> String {
        self.content.get().await;
        self.handle
            .notes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .join("\n\n")
    }

    /// A processing message showing the progress, with the notes as its thoughts
    pub fn make_message(&self) -> Message {
        let process = self.clone();
        let thoughts =
            StreamedContent::text(stream::once(async move { process.summarize().await }));
        Message::ai_processing(self.summary.clone(), self.content()).with_thoughts(thoughts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::role::ReplayEntry;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn search() -> Process {
        Process::new("Searching...", |p| {
            async_stream::stream! {
                yield p.note("Generated search parameters: {\"genus\": \"Carex\"}  ");
                p.note("Sent the query to the records API");
                p.set_results(json!({"record_count": 12}));
                yield "\n\n[View 12 matching records](https://example.org)".to_string();
            }
        })
    }

    #[tokio::test]
    async fn test_results_drain_the_job() {
        let process = search();
        assert_eq!(process.results().await, Some(json!({"record_count": 12})));
        assert_eq!(
            process.content().get().await,
            "Generated search parameters: {\"genus\": \"Carex\"}  \n\n[View 12 matching records](https://example.org)"
        );
    }

    #[tokio::test]
    async fn test_summarize_joins_trimmed_notes() {
        let process = search();
        assert_eq!(
            process.summarize().await,
            "Generated search parameters: {\"genus\": \"Carex\"}\n\nSent the query to the records API"
        );
    }

    #[tokio::test]
    async fn test_make_message_replays_notes_as_thoughts() {
        let message = search().make_message().with_tool_name("search_records");
        let entries = message.to_role_and_content().await;
        assert_eq!(
            entries[0],
            ReplayEntry::assistant("Searching...").with_name("search_records")
        );
        assert!(entries[1].content.ends_with("Sent the query to the records API"));

        let wire = message.to_wire().resolve().await;
        assert_eq!(wire["value"]["summary"], "Searching...");
        assert!(wire["value"]["content"]
            .as_str()
            .unwrap()
            .contains("View 12 matching records"));
    }

    #[tokio::test]
    async fn test_job_is_lazy() {
        let started = Arc::new(AtomicBool::new(false));
        let flag = started.clone();
        let process = Process::new("Working", move |_| {
            async_stream::stream! {
                flag.store(true, Ordering::SeqCst);
                yield "done".to_string();
            }
        });
        let _message = process.make_message();
        assert!(!started.load(Ordering::SeqCst));
        assert_eq!(process.results().await, None);
        assert!(started.load(Ordering::SeqCst));
    }
}
