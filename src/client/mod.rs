//! Client side of the Ollama API.
//!
//! - `ollama`: HTTP transport and model resolution
//! - `stream`: NDJSON decoding of streamed responses

pub mod ollama;
pub mod stream;

pub use ollama::OllamaClient;
