//! Error types for the Elpis client.
//!
//! # Design
//! Callers need to tell "could not reach the service" apart from "the
//! service rejected the request". Connection, URL and bare HTTP status
//! failures are transport errors; a message the server put in the `error`
//! field of its reply is a `Server` error. Everything else is a local
//! problem: a reply of the wrong shape, or a file that could not be read.

use thiserror::Error;

/// Errors returned by `ElpisClient` operations and the request/response layer.
#[derive(Debug, Error)]
pub enum ElpisError {
    /// The request never completed: connection refused, DNS, read/write failure.
    #[error("transport failed: {0}")]
    Transport(String),

    /// The base URL or a resource path could not be turned into a URL.
    #[error("could not construct request URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Non-2xx status with no server-supplied error message.
    #[error("HTTP {status}: {reason}")]
    HttpStatus { status: u16, reason: String },

    /// The server answered and reported an application failure.
    #[error("Elpis error: {message}")]
    Server { status: u16, message: String },

    /// The response did not carry the field, or the type, the endpoint expects.
    #[error("unexpected response: field `{field}` is not {expected}")]
    UnexpectedShape { field: String, expected: &'static str },

    /// A local file could not be read or written.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The request body could not be encoded as JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl ElpisError {
    pub(crate) fn shape(field: impl Into<String>, expected: &'static str) -> Self {
        ElpisError::UnexpectedShape {
            field: field.into(),
            expected,
        }
    }

    /// True when the service could not be reached or did not answer usefully.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ElpisError::Transport(_) | ElpisError::InvalidUrl(_) | ElpisError::HttpStatus { .. }
        )
    }

    /// True when the service answered and rejected the request.
    pub fn is_domain(&self) -> bool {
        matches!(self, ElpisError::Server { .. })
    }

    /// The server's message for domain errors.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ElpisError::Server { message, .. } => Some(message),
            _ => None,
        }
    }
}
