//! Durable storage for conversation history.
//!
//! A [`Recorder`] is called once for every message appended to a conversation. The
//! [`JsonlStore`] keeps one JSON-lines file per conversation and can load it back.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::errors::StorageError;
use crate::models::cold::ColdMessage;

/// Receives every frozen message at the moment it is appended.
///
/// Runs inline with the turn, so implementations must not block indefinitely.
#[async_trait]
pub trait Recorder: Send + Sync {
    async fn record(&self, message: &ColdMessage, conversation_id: &str)
        -> Result<(), StorageError>;
}

/// Keeps history in memory only
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

#[async_trait]
impl Recorder for NoopRecorder {
    async fn record(&self, _: &ColdMessage, _: &str) -> Result<(), StorageError> {
        Ok(())
    }
}

/// A recorded conversation as listed to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct TitleRecord {
    title: String,
}

/// One `{id}.jsonl` file per conversation, one frozen message per line
pub struct JsonlStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn path_for(&self, conversation_id: &str) -> Result<PathBuf, StorageError> {
        validate_conversation_id(conversation_id)?;
        Ok(self.dir.join(format!("{}.jsonl", conversation_id)))
    }

    fn title_path_for(&self, conversation_id: &str) -> Result<PathBuf, StorageError> {
        validate_conversation_id(conversation_id)?;
        Ok(self.dir.join(format!("{}.title.json", conversation_id)))
    }

    pub async fn save_title(
        &self,
        conversation_id: &str,
        title: &str,
    ) -> Result<(), StorageError> {
        let path = self.title_path_for(conversation_id)?;
        let record = serde_json::to_vec(&TitleRecord {
            title: title.to_string(),
        })?;

        let _guard = self.write_lock.lock().await;
        fs::create_dir_all(&self.dir).await?;
        fs::write(&path, record).await?;
        Ok(())
    }

    /// The stored title, if one was generated and is still readable
    pub async fn title(&self, conversation_id: &str) -> Result<Option<String>, StorageError> {
        let path = self.title_path_for(conversation_id)?;
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice::<TitleRecord>(&bytes) {
            Ok(record) => Ok(Some(record.title)),
            Err(e) => {
                tracing::warn!(conversation_id, error = %e, "Ignoring unreadable title");
                Ok(None)
            }
        }
    }

    /// Every recorded conversation, most recently written first
    pub async fn list(&self) -> Result<Vec<ConversationSummary>, StorageError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("jsonl") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if validate_conversation_id(id).is_err() {
                continue;
            }
            let modified = entry.metadata().await?.modified()?;
            found.push((modified, id.to_string()));
        }
        found.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        let mut summaries = Vec::with_capacity(found.len());
        for (_, id) in found {
            let title = self.title(&id).await?;
            summaries.push(ConversationSummary { id, title });
        }
        Ok(summaries)
    }

    /// Load the history of a conversation, oldest first.
    ///
    /// A conversation that was never recorded loads as empty. Lines that cannot be parsed
    /// are replaced by an error message rather than failing the whole load.
    pub async fn load(&self, conversation_id: &str) -> Result<Vec<ColdMessage>, StorageError> {
        let path = self.path_for(conversation_id)?;
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let history = bytes
            .split(|byte| *byte == b'\n')
            .enumerate()
            .filter(|(_, line)| !line.trim_ascii().is_empty())
            .map(|(index, line)| match parse_record(line) {
                Ok(message) => message,
                Err(reason) => {
                    tracing::warn!(
                        conversation_id,
                        line = index + 1,
                        error = %reason,
                        "Skipping unreadable history record"
                    );
                    ColdMessage::corrupt(format!(
                        "This message could not be loaded from history ({})",
                        reason
                    ))
                }
            })
            .collect();
        Ok(history)
    }
}

#[async_trait]
impl Recorder for JsonlStore {
    async fn record(
        &self,
        message: &ColdMessage,
        conversation_id: &str,
    ) -> Result<(), StorageError> {
        let path = self.path_for(conversation_id)?;
        let mut line = serde_json::to_string(message)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        fs::create_dir_all(&self.dir).await?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// One line of a history file, which may be torn or not even text
fn parse_record(line: &[u8]) -> Result<ColdMessage, String> {
    let line = std::str::from_utf8(line).map_err(|e| e.to_string())?;
    serde_json::from_str(line).map_err(|e| e.to_string())
}

/// Conversation ids become file names, so they must not be able to name anything else
pub fn validate_conversation_id(conversation_id: &str) -> Result<(), StorageError> {
    let valid = !conversation_id.is_empty()
        && conversation_id.len() <= 128
        && conversation_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidConversationId(
            conversation_id.to_string(),
        ))
    }
}
