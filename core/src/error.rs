//! Error types for the feather client.
//!
//! # Design
//! Every failure a request can meet ends up in a single `Error` value stored
//! on the `Outcome`. `Status` gets its own payload type because the status
//! policy rejects responses that did arrive: callers usually want the status
//! code and body of the rejected response, so `StatusError` keeps them.
//!
//! `Error` is `Clone` so `PendingRequest::then` can hand the outcome's error
//! back to the caller while the outcome keeps its own copy. Foreign sources
//! sit behind `Arc` for that reason.

use std::fmt;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;

/// Errors surfaced by requests, outcomes and callbacks.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Network, DNS or TLS failure. No response is available.
    #[error("transport error: {0}")]
    Transport(#[source] Arc<ureq::Error>),

    /// The response arrived but its status was rejected by the status policy.
    #[error(transparent)]
    Status(StatusError),

    /// The body could not be decoded into the requested type.
    #[error("decode error: {0}")]
    Decode(#[source] Arc<serde_json::Error>),

    /// Reading the body or writing it to a sink failed.
    #[error("io error: {0}")]
    Io(#[source] Arc<io::Error>),

    /// Decoding was requested on an outcome that carries no response.
    #[error("no response to decode")]
    NoResponse,

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("invalid proxy: {0}")]
    InvalidProxy(String),

    /// The request worker panicked; the payload message is kept.
    #[error("request worker panicked: {0}")]
    Panic(String),
}

impl Error {
    /// The rejected response, when this is a status-policy error.
    pub fn as_status(&self) -> Option<&StatusError> {
        match self {
            Error::Status(status) => Some(status),
            _ => None,
        }
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        Error::Transport(Arc::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Decode(Arc::new(err))
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::InvalidUrl(err.to_string())
    }
}

/// A response rejected by the status policy.
///
/// Holds the status line, headers and the buffered body of the response so
/// a `catch` handler can inspect or decode it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusError {
    status: u16,
    headers: Vec<(String, String)>,
    content: Bytes,
}

impl StatusError {
    pub fn new(status: u16, headers: Vec<(String, String)>, content: Bytes) -> Self {
        Self {
            status,
            headers,
            content,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn content_string(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }

    /// Decode the rejected body, typically a JSON error document.
    pub fn unmarshal<T: DeserializeOwned>(&self) -> Result<T, Error> {
        Ok(serde_json::from_slice(&self.content)?)
    }
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = ureq::http::StatusCode::from_u16(self.status)
            .ok()
            .and_then(|code| code.canonical_reason());
        match reason {
            Some(reason) => f.write_str(reason),
            None => write!(f, "HTTP status {}", self.status),
        }
    }
}

impl std::error::Error for StatusError {}
