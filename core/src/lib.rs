//! Asynchronous HTTP client with an interceptor pipeline.
//!
//! # Overview
//! `Client` dispatches each request on its own worker thread and returns a
//! `PendingRequest` right away. The request runs through the client's
//! interceptors, then the terminal handler (a `ureq` transport by default),
//! and exactly one `Outcome` is delivered back.
//!
//! # Design
//! - `Pipeline` is immutable: pushing an interceptor yields a new pipeline,
//!   and `Client::interceptor` yields a new client.
//! - `PendingRequest` exposes `wait`, `then` and `catch`; `then` takes an
//!   explicit `Callback` variant instead of inspecting closures at runtime.
//! - `Outcome` reads the body lazily and once, then keeps it re-readable.
//! - Non-2xx handling is an interceptor driven by a `StatusPolicy`; rejected
//!   responses stay available through `Error::Status`.

pub mod client;
pub mod default_client;
pub mod error;
pub mod http;
pub mod interceptors;
pub mod outcome;
pub mod pending;
pub mod pipeline;
pub mod transport;

pub use client::{Client, Options, RequestOptions, DEFAULT_TIMEOUT, NO_PROXY};
pub use default_client::{
    default_client, delete, download, get, patch, post, put, request, set_default_client,
};
pub use error::{Error, StatusError};
pub use http::{Body, HttpMethod, Request, Response};
pub use interceptors::{ProgressHandler, Sink, StatusPolicy};
pub use outcome::Outcome;
pub use pending::{Callback, PendingRequest, State};
pub use pipeline::{Handler, Interceptor, Next, Pipeline};
