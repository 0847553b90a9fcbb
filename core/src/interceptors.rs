//! Built-in interceptors.
//!
//! - `logger` logs each request and how it ended.
//! - `status_policy` turns rejected status codes into `Error::Status`.
//! - `sink` streams the response body into a writer, reporting progress.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use bytes::Bytes;
use log::{debug, info, warn};

use crate::error::{Error, StatusError};
use crate::http::{HttpMethod, Request};
use crate::outcome::Outcome;
use crate::pipeline::Next;

/// Download progress callback: bytes written so far and the expected total,
/// when known.
pub type ProgressHandler = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// Destination for a streamed response body.
pub type Sink = Box<dyn Write + Send>;

/// Which status codes count as success.
#[derive(Clone)]
pub struct StatusPolicy {
    accept: Arc<dyn Fn(u16) -> bool + Send + Sync>,
}

impl StatusPolicy {
    /// Accept any 2xx status.
    pub fn success() -> Self {
        Self::accept(|status| (200..300).contains(&status))
    }

    /// Accept only `expected`.
    pub fn exactly(expected: u16) -> Self {
        Self::accept(move |status| status == expected)
    }

    pub fn accept(predicate: impl Fn(u16) -> bool + Send + Sync + 'static) -> Self {
        Self {
            accept: Arc::new(predicate),
        }
    }

    pub fn accepts(&self, status: u16) -> bool {
        (self.accept)(status)
    }
}

impl Default for StatusPolicy {
    fn default() -> Self {
        Self::success()
    }
}

impl fmt::Debug for StatusPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusPolicy").finish_non_exhaustive()
    }
}

pub fn logger() -> impl Fn(Request, Next<'_>) -> Outcome + Send + Sync + 'static {
    |req: Request, next: Next<'_>| {
        let method = req.method;
        let url = req.url.clone();
        info!("--> {method} {url}");
        debug!("request headers: {:?}", req.headers);

        let started = Instant::now();
        let outcome = next.run(req);
        let elapsed = started.elapsed();

        match (outcome.status(), outcome.error()) {
            (Some(status), None) => info!("<-- {method} {url} {status} ({elapsed:?})"),
            (status, Some(err)) => {
                warn!("<-- {method} {url} failed: {err} status={status:?} ({elapsed:?})")
            }
            (None, None) => info!("<-- {method} {url} ({elapsed:?})"),
        }
        outcome
    }
}

/// Reject responses whose status `policy` does not accept.
///
/// The rejected body is buffered into the error; the outcome keeps its
/// response so it can still be read. A body that cannot be read leaves the
/// error with empty content.
pub fn status_policy(
    policy: StatusPolicy,
) -> impl Fn(Request, Next<'_>) -> Outcome + Send + Sync + 'static {
    move |req: Request, next: Next<'_>| {
        let mut outcome = next.run(req);
        if !outcome.is_ok() {
            return outcome;
        }
        let Some(response) = outcome.response() else {
            return outcome;
        };
        if policy.accepts(response.status) {
            return outcome;
        }

        let status = response.status;
        let headers = response.headers.clone();
        let content = outcome.content().unwrap_or_else(|err| {
            warn!("rejected {status} response body unreadable: {err}");
            Bytes::new()
        });
        outcome.set_error(Error::Status(StatusError::new(status, headers, content)));
        outcome
    }
}

/// Stream successful response bodies into `sink`.
///
/// The expected length comes from `Content-Length`; when the response has
/// none, a HEAD request is sent through the rest of the chain to ask for it.
pub fn sink(
    sink: Sink,
    on_progress: Option<ProgressHandler>,
) -> impl Fn(Request, Next<'_>) -> Outcome + Send + Sync + 'static {
    let sink = Mutex::new(sink);
    move |req: Request, next: Next<'_>| {
        let preflight = Request {
            method: HttpMethod::Head,
            body: None,
            ..req.clone()
        };
        let mut outcome = next.run(req);
        if !outcome.is_ok() {
            return outcome;
        }
        let Some(response) = outcome.response_mut() else {
            return outcome;
        };

        let total = response
            .content_length()
            .or_else(|| next.run(preflight).response().and_then(|r| r.content_length()));

        let mut sink = match sink.lock() {
            Ok(sink) => sink,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut writer = ProgressWriter {
            inner: &mut **sink,
            on_progress: on_progress.as_deref(),
            total,
            written: 0,
        };
        let copied = io::copy(&mut response.body, &mut writer)
            .and_then(|n| writer.flush().map(|_| n));
        match copied {
            Ok(n) => debug!("sank {n} bytes (expected {total:?})"),
            Err(err) => {
                warn!("failed to sink response body: {err}");
                outcome.set_error(err.into());
            }
        }
        outcome
    }
}

struct ProgressWriter<'a, W: Write + ?Sized> {
    inner: &'a mut W,
    on_progress: Option<&'a (dyn Fn(u64, Option<u64>) + Send + Sync)>,
    total: Option<u64>,
    written: u64,
}

impl<W: Write + ?Sized> Write for ProgressWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        if let Some(on_progress) = self.on_progress {
            on_progress(self.written, self.total);
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
