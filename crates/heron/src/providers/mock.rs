use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::models::function::{FunctionCall, FunctionSpec, ResponseSchema};
use crate::models::role::ReplayEntry;
use crate::providers::base::{Provider, TextStream};

#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Structured { schema: String },
    ChooseFunction { functions: Vec<String> },
    StreamText,
}

/// A mock provider that returns pre-configured responses for testing
#[derive(Default)]
pub struct MockProvider {
    structured: Mutex<VecDeque<Result<Value, String>>>,
    choices: Mutex<VecDeque<Result<Option<FunctionCall>, String>>>,
    streams: Mutex<VecDeque<Result<Vec<Result<String, String>>, String>>>,
    calls: Mutex<Vec<(MockCall, Vec<ReplayEntry>)>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_structured(self, value: Value) -> Self {
        self.structured.lock().unwrap().push_back(Ok(value));
        self
    }

    pub fn with_structured_error(self, error: &str) -> Self {
        self.structured
            .lock()
            .unwrap()
            .push_back(Err(error.to_string()));
        self
    }

    pub fn with_choice(self, name: &str) -> Self {
        self.choices
            .lock()
            .unwrap()
            .push_back(Ok(Some(FunctionCall::new(name, Value::Null))));
        self
    }

    pub fn with_no_choice(self) -> Self {
        self.choices.lock().unwrap().push_back(Ok(None));
        self
    }

    pub fn with_choice_error(self, error: &str) -> Self {
        self.choices.lock().unwrap().push_back(Err(error.to_string()));
        self
    }

    pub fn with_stream(self, tokens: &[&str]) -> Self {
        self.streams
            .lock()
            .unwrap()
            .push_back(Ok(tokens.iter().map(|t| Ok(t.to_string())).collect()));
        self
    }

    /// A stream that fails after yielding `tokens`
    pub fn with_broken_stream(self, tokens: &[&str], error: &str) -> Self {
        let mut items: Vec<Result<String, String>> =
            tokens.iter().map(|t| Ok(t.to_string())).collect();
        items.push(Err(error.to_string()));
        self.streams.lock().unwrap().push_back(Ok(items));
        self
    }

    pub fn with_stream_error(self, error: &str) -> Self {
        self.streams.lock().unwrap().push_back(Err(error.to_string()));
        self
    }

    /// Every call made so far, with the messages it was given
    pub fn calls(&self) -> Vec<(MockCall, Vec<ReplayEntry>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&MockCall) -> bool) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(call, _)| predicate(call))
            .count()
    }

    fn log(&self, call: MockCall, messages: &[ReplayEntry]) {
        self.calls.lock().unwrap().push((call, messages.to_vec()));
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete_structured(
        &self,
        messages: &[ReplayEntry],
        schema: &ResponseSchema,
    ) -> Result<Value> {
        self.log(
            MockCall::Structured {
                schema: schema.name.clone(),
            },
            messages,
        );
        match self.structured.lock().unwrap().pop_front() {
            Some(Ok(value)) => Ok(value),
            Some(Err(e)) => Err(anyhow!(e)),
            None => Err(anyhow!("No structured response configured")),
        }
    }

    async fn choose_function(
        &self,
        messages: &[ReplayEntry],
        functions: &[FunctionSpec],
    ) -> Result<Option<FunctionCall>> {
        self.log(
            MockCall::ChooseFunction {
                functions: functions.iter().map(|f| f.name.clone()).collect(),
            },
            messages,
        );
        match self.choices.lock().unwrap().pop_front() {
            Some(Ok(choice)) => Ok(choice),
            Some(Err(e)) => Err(anyhow!(e)),
            None => Ok(None),
        }
    }

    async fn stream_text(&self, messages: &[ReplayEntry]) -> Result<TextStream> {
        self.log(MockCall::StreamText, messages);
        match self.streams.lock().unwrap().pop_front() {
            Some(Ok(items)) => Ok(Box::pin(stream::iter(
                items.into_iter().map(|item| item.map_err(|e| anyhow!(e))),
            ))),
            Some(Err(e)) => Err(anyhow!(e)),
            None => Ok(Box::pin(stream::empty())),
        }
    }
}
