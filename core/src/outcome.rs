//! The envelope delivered for every request.
//!
//! # Design
//! An `Outcome` carries a response, an error, or both: the status policy
//! rejects responses that were transported fine, so an error does not imply
//! a missing response. The body is read lazily and at most once. The first
//! `content()` call drains the stream, memoizes the bytes and puts an
//! in-memory reader over the same bytes back into the response, which keeps
//! the response readable for anyone who looks at it later. A read that fails
//! partway is final too: the error is memoized and the half-read stream is
//! replaced by an empty body, so no later call can serve a truncated tail.

use std::io::Read;

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::error::Error;
use crate::http::{Body, Response};

/// Outcome of one request attempt.
#[derive(Debug)]
pub struct Outcome {
    response: Option<Response>,
    error: Option<Error>,
    content: Option<Result<Bytes, Error>>,
}

impl Outcome {
    pub fn from_response(response: Response) -> Self {
        Self {
            response: Some(response),
            error: None,
            content: None,
        }
    }

    /// An outcome for a request that never produced a response.
    pub fn failed(error: Error) -> Self {
        Self {
            response: None,
            error: Some(error),
            content: None,
        }
    }

    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    pub fn response_mut(&mut self) -> Option<&mut Response> {
        self.response.as_mut()
    }

    pub fn into_response(self) -> Option<Response> {
        self.response
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Mark the outcome as failed while keeping any response it carries.
    pub fn set_error(&mut self, error: Error) {
        self.error = Some(error);
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn status(&self) -> Option<u16> {
        self.response.as_ref().map(|r| r.status)
    }

    /// The full response body.
    ///
    /// Empty when there is no response. Repeated calls return the memoized
    /// result, bytes or read error, without touching the stream again.
    pub fn content(&mut self) -> Result<Bytes, Error> {
        if let Some(content) = &self.content {
            return content.clone();
        }
        let Some(response) = self.response.as_mut() else {
            return Ok(Bytes::new());
        };

        let mut buf = Vec::new();
        let content = match response.body.read_to_end(&mut buf) {
            Ok(_) => {
                let content = Bytes::from(buf);
                response.body = Body::from_bytes(content.clone());
                Ok(content)
            }
            Err(err) => {
                response.body = Body::empty();
                Err(Error::from(err))
            }
        };
        self.content.insert(content).clone()
    }

    pub fn content_string(&mut self) -> Result<String, Error> {
        let content = self.content()?;
        Ok(String::from_utf8_lossy(&content).into_owned())
    }

    /// Decode the body as JSON into `T`, whatever the declared content type.
    pub fn unmarshal<T: DeserializeOwned>(&mut self) -> Result<T, Error> {
        if self.response.is_none() {
            return Err(Error::NoResponse);
        }
        let content = self.content()?;
        Ok(serde_json::from_slice(&content)?)
    }
}

impl From<Result<Response, Error>> for Outcome {
    fn from(result: Result<Response, Error>) -> Self {
        match result {
            Ok(response) => Outcome::from_response(response),
            Err(err) => Outcome::failed(err),
        }
    }
}
