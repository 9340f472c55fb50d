//! Error types for the RedForester client.
//!
//! # Design
//! `NotFound` gets a dedicated variant because callers frequently distinguish
//! "the object does not exist" from "the server refused the call." All other
//! non-2xx responses land in `HttpError` with the status and whatever
//! `{code, message}` the server put in the body. `Forbidden` never comes from
//! the network: it is raised locally before a request is built.

use thiserror::Error;

/// Result alias used across the crate.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors returned by requests, actions and repository operations.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The server returned 404.
    #[error("resource not found: {message}")]
    NotFound { message: String },

    /// The server returned a non-2xx status other than 404.
    #[error("HTTP {status} ({code}): {message}")]
    HttpError {
        status: u16,
        code: String,
        message: String,
    },

    /// The operation was rejected locally and never reached the server.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Connection, DNS or timeout failure reported by the transport.
    #[error("transport failed: {0}")]
    Transport(String),

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    SerializationError(String),

    /// The blocking adapter could not start its runtime.
    #[error("runtime unavailable: {0}")]
    Runtime(String),
}

impl ApiError {
    /// Build the error for a non-success response.
    ///
    /// The body is expected to be `{code, message}`; anything else is kept
    /// verbatim as the message.
    pub fn from_status(status: u16, body: &str) -> Self {
        let (code, message) = match serde_json::from_str::<serde_json::Value>(body) {
            Ok(value) => {
                let code = match value.get("code") {
                    Some(serde_json::Value::String(code)) => code.clone(),
                    Some(other) if !other.is_null() => other.to_string(),
                    _ => String::new(),
                };
                let message = value
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| body.to_string());
                (code, message)
            }
            Err(_) => (String::new(), body.to_string()),
        };

        if status == 404 {
            ApiError::NotFound { message }
        } else {
            ApiError::HttpError {
                status,
                code,
                message,
            }
        }
    }

    /// HTTP status carried by this error, if it came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::NotFound { .. } => Some(404),
            ApiError::HttpError { status, .. } => Some(*status),
            _ => None,
        }
    }
}
