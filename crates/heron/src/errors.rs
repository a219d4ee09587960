use std::fmt;

use thiserror::Error;

/// One failed check on a field of a structured model output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    /// Terminal errors mean another attempt cannot help, e.g. the user asked for something unsupported
    pub terminal: bool,
}

impl FieldError {
    pub fn retry<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            terminal: false,
        }
    }

    pub fn terminal<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            terminal: true,
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum GenerationError {
    /// The model never produced output that passed validation
    #[error("{}", render_validation(.errors, .attempts))]
    Validation {
        errors: Vec<FieldError>,
        attempts: u32,
    },

    #[error("Generation request failed: {0}")]
    Provider(#[from] anyhow::Error),
}

fn render_validation(errors: &[FieldError], attempts: &u32) -> String {
    let terminal: Vec<String> = errors
        .iter()
        .filter(|e| e.terminal)
        .map(|e| format!("Error: {}", e.message))
        .collect();
    if terminal.is_empty() {
        format!(
            "Error: AI failed to generate valid output after {} attempts.",
            attempts
        )
    } else {
        terminal.join("\n\n")
    }
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid conversation id: {0}")]
    InvalidConversationId(String),

    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not serialize message: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type GenerationResult<T> = Result<T, GenerationError>;
