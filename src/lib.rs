//! Backend for a retrieval-augmented insurance policy assistant.
//!
//! Questions come in over HTTP, get routed by a bounded agent loop to the
//! policy document index, a web search fallback, or a clause drafting
//! pipeline, and the answer is streamed back token by token while the
//! conversation is persisted per session.

pub mod agent;
pub mod core;
pub mod llm;
pub mod logging;
pub mod memory;
pub mod retrieval;
pub mod server;
pub mod state;
pub mod stream;
pub mod tools;
