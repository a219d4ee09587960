//! Schema-constrained generation with validation and bounded retries.
//!
//! The model's output is deserialized into a typed value and validated field by field. A
//! non-terminal failure is sent back to the model as a correction request; a terminal one
//! ends generation immediately because another attempt cannot fix it.
use serde::de::DeserializeOwned;

use crate::errors::{FieldError, GenerationError, GenerationResult};
use crate::models::function::ResponseSchema;
use crate::models::role::ReplayEntry;
use crate::providers::base::Provider;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Checks that go beyond what the JSON schema can express
pub trait Validate {
    fn validate(&self) -> Vec<FieldError> {
        Vec::new()
    }
}

/// A typed model output with its schema
pub trait StructuredOutput: DeserializeOwned + Validate + Send {
    fn schema() -> ResponseSchema;
}

/// Generate a `T` from `messages`, retrying up to `max_attempts` times.
///
/// Provider failures are returned as they happen and are not retried.
pub async fn generate<T: StructuredOutput>(
    provider: &dyn Provider,
    mut messages: Vec<ReplayEntry>,
    max_attempts: u32,
) -> GenerationResult<T> {
    let max_attempts = max_attempts.max(1);
    let schema = T::schema();
    let mut errors = Vec::new();

    for attempt in 1..=max_attempts {
        let raw = provider.complete_structured(&messages, &schema).await?;

        errors = match serde_json::from_value::<T>(raw.clone()) {
            Ok(output) => {
                let errors = output.validate();
                if errors.is_empty() {
                    return Ok(output);
                }
                errors
            }
            Err(e) => vec![FieldError::retry(schema.name.as_str(), e.to_string())],
        };

        if errors.iter().any(|e| e.terminal) {
            return Err(GenerationError::Validation { errors, attempts: attempt });
        }

        tracing::warn!(
            schema = %schema.name,
            attempt,
            max_attempts,
            errors = %describe(&errors),
            "Model output failed validation"
        );
        messages.push(ReplayEntry::assistant(raw.to_string()));
        messages.push(ReplayEntry::user(format!(
            "Your response had the following problems, please correct them:\n{}",
            describe(&errors)
        )));
    }

    Err(GenerationError::Validation {
        errors,
        attempts: max_attempts,
    })
}

fn describe(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("- {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::{MockCall, MockProvider};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Query {
        genus: String,
    }

    impl Validate for Query {
        fn validate(&self) -> Vec<FieldError> {
            match self.genus.as_str() {
                "" => vec![FieldError::retry("genus", "must not be empty")],
                "Dragon" => vec![FieldError::terminal("genus", "Dragons are not a real genus")],
                _ => Vec::new(),
            }
        }
    }

    impl StructuredOutput for Query {
        fn schema() -> ResponseSchema {
            ResponseSchema::new(
                "query",
                json!({"type": "object", "properties": {"genus": {"type": "string"}}}),
            )
        }
    }

    fn messages() -> Vec<ReplayEntry> {
        vec![ReplayEntry::system("sys"), ReplayEntry::user("Find Carex")]
    }

    #[tokio::test]
    async fn test_valid_on_first_attempt() {
        let provider = MockProvider::new().with_structured(json!({"genus": "Carex"}));
        let query: Query = generate(&provider, messages(), 3).await.unwrap();
        assert_eq!(query.genus, "Carex");
        assert_eq!(provider.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_retries_with_correction_request() {
        let provider = MockProvider::new()
            .with_structured(json!({"genus": ""}))
            .with_structured(json!({"species": "x"}))
            .with_structured(json!({"genus": "Carex"}));

        let query: Query = generate(&provider, messages(), 3).await.unwrap();
        assert_eq!(query.genus, "Carex");

        let calls = provider.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[0].0,
            MockCall::Structured {
                schema: "query".to_string()
            }
        );
        let retry_messages = &calls[1].1;
        assert_eq!(retry_messages.len(), 4);
        assert_eq!(retry_messages[2], ReplayEntry::assistant(r#"{"genus":""}"#));
        assert!(retry_messages[3].content.contains("genus: must not be empty"));
        assert_eq!(calls[2].1.len(), 6);
    }

    #[tokio::test]
    async fn test_terminal_error_stops_immediately() {
        let provider = MockProvider::new()
            .with_structured(json!({"genus": "Dragon"}))
            .with_structured(json!({"genus": "Carex"}));

        let err = generate::<Query>(&provider, messages(), 3).await.unwrap_err();
        assert_eq!(err.to_string(), "Error: Dragons are not a real genus");
        assert_eq!(provider.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let provider = MockProvider::new()
            .with_structured(json!({"genus": ""}))
            .with_structured(json!({"genus": ""}));

        let err = generate::<Query>(&provider, messages(), 2).await.unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Validation { attempts: 2, .. }
        ));
        assert_eq!(
            err.to_string(),
            "Error: AI failed to generate valid output after 2 attempts."
        );
    }

    #[tokio::test]
    async fn test_provider_errors_are_not_retried() {
        let provider = MockProvider::new()
            .with_structured_error("connection reset")
            .with_structured(json!({"genus": "Carex"}));

        let err = generate::<Query>(&provider, messages(), 3).await.unwrap_err();
        assert!(matches!(err, GenerationError::Provider(_)));
        assert_eq!(provider.calls().len(), 1);
    }
}
