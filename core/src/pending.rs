//! Asynchronous request handle.
//!
//! # Design
//! A `PendingRequest` moves through `Idle -> Pending -> {Success, Failed}`.
//! `dispatch` spawns one worker thread that runs the resolved handler and
//! sends exactly one `Outcome` into a channel with room for one value, so the
//! worker never blocks even when nobody waits. Panics inside the handler are
//! caught at the worker boundary and delivered as failed outcomes.
//!
//! `wait` is the only blocking call: the first call receives and caches,
//! later calls return the cached outcome. `then`, `catch` and `is_success`
//! all go through it.
//!
//! Callbacks are an explicit closed set (`Callback`) rather than arbitrary
//! functions inspected at runtime: raw outcome access, a no-argument
//! continuation, or decoding the JSON body into a caller-supplied type.
//! Decoding only happens for JSON responses; any other body leaves the
//! decode target alone and the callback still runs.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread;

use log::{debug, warn};
use serde::de::DeserializeOwned;

use crate::error::Error;
use crate::http::Request;
use crate::outcome::Outcome;
use crate::pipeline::Handler;

/// Lifecycle of a `PendingRequest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Pending,
    Success,
    Failed,
}

/// Continuation accepted by `PendingRequest::then`.
pub enum Callback<'a> {
    /// Runs without looking at the outcome.
    NoArg(Box<dyn FnOnce() + 'a>),
    /// Receives the live outcome.
    WithOutcome(Box<dyn FnOnce(&mut Outcome) + 'a>),
    /// Decodes a JSON body; may fail.
    Decode(Box<dyn FnOnce(&mut Outcome) -> Result<(), Error> + 'a>),
}

impl<'a> Callback<'a> {
    pub fn no_arg(f: impl FnOnce() + 'a) -> Self {
        Callback::NoArg(Box::new(f))
    }

    pub fn on_outcome(f: impl FnOnce(&mut Outcome) + 'a) -> Self {
        Callback::WithOutcome(Box::new(f))
    }

    /// Decode a JSON body into `target`. Non-JSON bodies leave it untouched.
    pub fn decode_into<T>(target: &'a mut T) -> Self
    where
        T: DeserializeOwned + 'a,
    {
        Callback::Decode(Box::new(move |outcome| {
            if let Some(decoded) = decode_json(outcome)? {
                *target = decoded;
            }
            Ok(())
        }))
    }

    /// Hand `f` the outcome and, for JSON responses, the body decoded as `T`.
    pub fn on_decoded<T, F>(f: F) -> Self
    where
        T: DeserializeOwned + 'a,
        F: FnOnce(&mut Outcome, Option<T>) + 'a,
    {
        Callback::Decode(Box::new(move |outcome| {
            let decoded = decode_json::<T>(outcome)?;
            f(outcome, decoded);
            Ok(())
        }))
    }

    fn invoke(self, outcome: &mut Outcome) -> Result<(), Error> {
        match self {
            Callback::NoArg(f) => {
                f();
                Ok(())
            }
            Callback::WithOutcome(f) => {
                f(outcome);
                Ok(())
            }
            Callback::Decode(f) => f(outcome),
        }
    }
}

impl fmt::Debug for Callback<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Callback::NoArg(_) => "NoArg",
            Callback::WithOutcome(_) => "WithOutcome",
            Callback::Decode(_) => "Decode",
        };
        f.debug_tuple("Callback").field(&kind).finish()
    }
}

/// `None` unless the response declares a JSON content type.
fn decode_json<T: DeserializeOwned>(outcome: &mut Outcome) -> Result<Option<T>, Error> {
    let response = outcome.response().ok_or(Error::NoResponse)?;
    if !response.is_json() {
        debug!(
            "skipping decode of {:?} body",
            response.content_type().unwrap_or_default()
        );
        return Ok(None);
    }
    outcome.unmarshal().map(Some)
}

/// One in-flight request and its eventual outcome.
pub struct PendingRequest {
    state: State,
    job: Option<(Request, Handler)>,
    sender: Option<SyncSender<Outcome>>,
    receiver: Receiver<Outcome>,
    outcome: Option<Outcome>,
}

impl PendingRequest {
    /// An idle request; nothing runs until `dispatch` or `wait`.
    pub fn new(request: Request, handler: Handler) -> Self {
        let (sender, receiver) = mpsc::sync_channel(1);
        Self {
            state: State::Idle,
            job: Some((request, handler)),
            sender: Some(sender),
            receiver,
            outcome: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Start the worker. Does nothing unless the request is idle.
    pub fn dispatch(&mut self) -> &mut Self {
        if self.state != State::Idle {
            return self;
        }
        let (Some((request, handler)), Some(sender)) = (self.job.take(), self.sender.take()) else {
            return self;
        };
        self.state = State::Pending;
        debug!("dispatching {} {}", request.method, request.url);

        let worker_sender = sender.clone();
        let spawned = thread::Builder::new()
            .name("feather-worker".to_string())
            .spawn(move || {
                let outcome = run_guarded(&handler, request);
                // Capacity one: never blocks, and a dropped receiver is fine.
                let _ = worker_sender.send(outcome);
            });
        if let Err(err) = spawned {
            warn!("failed to spawn request worker: {err}");
            let _ = sender.try_send(Outcome::failed(err.into()));
        }
        self
    }

    /// Block until the outcome is delivered. Later calls return the cached value.
    pub fn wait(&mut self) -> &mut Outcome {
        let outcome = match self.outcome.take() {
            Some(outcome) => outcome,
            None => self.receive(),
        };
        self.outcome.insert(outcome)
    }

    /// Run `callback` if the request succeeded, otherwise return its error.
    pub fn then(&mut self, callback: Callback<'_>) -> Result<(), Error> {
        let outcome = self.wait();
        if let Some(err) = outcome.error() {
            return Err(err.clone());
        }
        callback.invoke(outcome)
    }

    /// Run `f` with the error if the request failed.
    pub fn catch<F>(&mut self, f: F) -> &mut Self
    where
        F: FnOnce(&Error),
    {
        if let Some(err) = self.wait().error() {
            f(err);
        }
        self
    }

    pub fn is_success(&mut self) -> bool {
        self.wait();
        self.state == State::Success
    }

    /// Wait and take ownership of the outcome.
    pub fn into_outcome(mut self) -> Outcome {
        match self.outcome.take() {
            Some(outcome) => outcome,
            None => self.receive(),
        }
    }

    fn receive(&mut self) -> Outcome {
        self.dispatch();
        let outcome = self.receiver.recv().unwrap_or_else(|_| {
            Outcome::failed(Error::Panic(
                "worker exited without delivering an outcome".to_string(),
            ))
        });
        self.state = if outcome.is_ok() {
            State::Success
        } else {
            State::Failed
        };
        debug!("request finished: {:?} status={:?}", self.state, outcome.status());
        outcome
    }
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("state", &self.state)
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}

fn run_guarded(handler: &Handler, request: Request) -> Outcome {
    match panic::catch_unwind(AssertUnwindSafe(|| handler(request))) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let err = panic_error(payload);
            warn!("request worker recovered from panic: {err}");
            Outcome::failed(err)
        }
    }
}

fn panic_error(payload: Box<dyn Any + Send>) -> Error {
    let payload = match payload.downcast::<Error>() {
        Ok(err) => return *err,
        Err(payload) => payload,
    };
    if let Some(msg) = payload.downcast_ref::<String>() {
        return Error::Panic(msg.clone());
    }
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        return Error::Panic((*msg).to_string());
    }
    Error::Panic("unknown panic payload".to_string())
}
