use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A function the model may be asked to choose, described by a JSON schema
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionSpec {
    /// The name of the function
    pub name: String,
    /// A description of when to use it, shown to the model verbatim
    pub description: String,
    /// JSON schema of the arguments
    pub parameters: Value,
}

impl FunctionSpec {
    pub fn new<N, D>(name: N, description: D, parameters: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        FunctionSpec {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// The function the model selected, with the arguments it produced
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: Value,
}

impl FunctionCall {
    pub fn new<S: Into<String>>(name: S, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// A named JSON schema the model's structured output must follow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: Value,
}

impl ResponseSchema {
    pub fn new<S: Into<String>>(name: S, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}
