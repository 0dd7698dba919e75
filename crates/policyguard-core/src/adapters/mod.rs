//! Backend Adapters
//!
//! Wire-format helpers for talking to LLM and embedding backends.

pub mod openai;

pub use openai::{ChatCompletionRequest, ChatMessage, EmbeddingRequest, ResponseFormat};
