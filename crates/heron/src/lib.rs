pub mod content;
pub mod conversation;
pub mod decompose;
pub mod encoder;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod plan;
pub mod process;
pub mod prompt_template;
pub mod providers;
pub mod storage;
pub mod structured;
pub mod tools;
