//! Error types shared by the transport, decoder, renderer and session.

use thiserror::Error;

/// Errors surfaced to the user.
///
/// Decoding noise inside a response stream never shows up here; the stream
/// decoder drops those lines on its own.
#[derive(Debug, Error)]
pub enum Error {
    /// The server could not be reached at all.
    #[error("Failed to reach Ollama server at {url}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("Ollama request to {url} failed with status {status}: {body}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },

    /// The model listing did not have the expected shape.
    #[error("Unexpected response format from {url}")]
    MalformedPayload { url: String },

    /// The model listing was empty.
    #[error("No models available to pick")]
    NoModels,

    /// Neither a positional prompt nor standard input gave any text.
    #[error("No prompt supplied")]
    MissingPrompt,

    /// The response body broke off mid-stream.
    #[error("Stream read error: {0}")]
    Stream(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Terminal read or write failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error means the server was unreachable or refused the call.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Error::Unreachable { .. } | Error::Status { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is_connectivity() {
        let err = Error::Status {
            url: "http://localhost:11434/api/tags".to_string(),
            status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            body: "boom".to_string(),
        };
        assert!(err.is_connectivity());
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn test_payload_errors_are_not_connectivity() {
        assert!(!Error::NoModels.is_connectivity());
        assert!(!Error::MalformedPayload {
            url: "x".to_string()
        }
        .is_connectivity());
        assert_eq!(Error::MissingPrompt.to_string(), "No prompt supplied");
    }
}
