//! These models represent the objects passed around by the orchestrator
//!
//! There are several different related formats we need to interact with:
//! - live messages produced by tools, whose content may still be streaming
//! - frozen messages, the immutable snapshot recorded in a conversation's history
//! - the model-replay view (role + content), resubmitted to the generation service
//! - the wire view (type + value), streamed to the client as incremental JSON
//!
//! Live messages are converted into the other forms through projections on [`message::Message`];
//! the frozen form carries both views pre-serialized so history renders never touch a stream.
pub mod cold;
pub mod content;
pub mod function;
pub mod message;
pub mod role;
