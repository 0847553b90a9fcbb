//! Client configuration and request dispatch.
//!
//! # Design
//! A `Client` is an immutable value: `interceptor` and `config` return new
//! clients, so a pipeline captured by a dispatched request never changes.
//! Each request gets its own dispatch pipeline built from, outermost first:
//! the sink interceptor (when a sink is set), the client's interceptors, and
//! the status policy (when enabled). The terminal handler is the `ureq`
//! transport unless the request options supply one.

use std::fmt;
use std::fs::File;
use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use log::warn;

use crate::error::Error;
use crate::http::{HttpMethod, Request};
use crate::interceptors::{self, ProgressHandler, Sink, StatusPolicy};
use crate::outcome::Outcome;
use crate::pending::PendingRequest;
use crate::pipeline::{Handler, Next, Pipeline};
use crate::transport;

/// Proxy setting that disables proxies, including environment proxies.
pub const NO_PROXY: &str = "none";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection options shared by every request of a `Client`.
#[derive(Debug, Clone)]
pub struct Options {
    /// Prefix joined in front of every request path.
    pub base_uri: Option<String>,
    /// Deadline for the whole transport call. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Proxy URL, or `NO_PROXY`. `None` uses the environment.
    pub proxy: Option<String>,
    /// When set, responses rejected by the policy become `Error::Status`.
    pub http_errors: Option<StatusPolicy>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            base_uri: None,
            timeout: Some(DEFAULT_TIMEOUT),
            proxy: None,
            http_errors: None,
        }
    }
}

impl Options {
    /// Defaults overridden by `FEATHER_BASE_URI`, `FEATHER_TIMEOUT_SECS`,
    /// `FEATHER_PROXY` and `FEATHER_HTTP_ERRORS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = Options::default();
        if let Some(base_uri) = lookup("FEATHER_BASE_URI") {
            options.base_uri = Some(base_uri);
        }
        if let Some(secs) = lookup("FEATHER_TIMEOUT_SECS") {
            match secs.trim().parse::<u64>() {
                Ok(0) => options.timeout = None,
                Ok(secs) => options.timeout = Some(Duration::from_secs(secs)),
                Err(err) => warn!("ignoring FEATHER_TIMEOUT_SECS={secs:?}: {err}"),
            }
        }
        if let Some(proxy) = lookup("FEATHER_PROXY") {
            options.proxy = Some(proxy);
        }
        if let Some(flag) = lookup("FEATHER_HTTP_ERRORS") {
            if matches!(flag.trim(), "1" | "true" | "yes") {
                options.http_errors = Some(StatusPolicy::success());
            }
        }
        options
    }
}

/// Per-call options. Bodies are passed already encoded.
#[derive(Default)]
pub struct RequestOptions {
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    /// Overrides the verb the request was issued with.
    pub method: Option<HttpMethod>,
    /// Replaces the transport as terminal handler.
    pub handler: Option<Handler>,
    /// Streams the response body here instead of buffering it.
    pub sink: Option<Sink>,
    /// Progress of the sink copy; ignored without a sink.
    pub on_progress: Option<ProgressHandler>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = Some(method);
        self
    }

    pub fn handler(mut self, handler: Handler) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn sink(mut self, sink: impl std::io::Write + Send + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn on_progress(
        mut self,
        on_progress: impl Fn(u64, Option<u64>) + Send + Sync + 'static,
    ) -> Self {
        self.on_progress = Some(std::sync::Arc::new(on_progress));
        self
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("headers", &self.headers)
            .field("body", &self.body.as_ref().map(Bytes::len))
            .field("method", &self.method)
            .field("handler", &self.handler.is_some())
            .field("sink", &self.sink.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// Issues requests through an interceptor pipeline.
#[derive(Clone)]
pub struct Client {
    pipeline: Pipeline,
    options: Options,
    transport: Result<Handler, Error>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl Client {
    /// A client without interceptors.
    ///
    /// An unusable proxy setting is reported by every request made with
    /// this client rather than here.
    pub fn new(options: Options) -> Self {
        let transport = transport::agent(&options).map(transport::handler);
        Self {
            pipeline: Pipeline::new(),
            options,
            transport,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// A client with `interceptor` appended to this client's pipeline.
    pub fn interceptor<F>(&self, interceptor: F) -> Client
    where
        F: Fn(Request, Next<'_>) -> Outcome + Send + Sync + 'static,
    {
        Client {
            pipeline: self.pipeline.push(interceptor),
            ..self.clone()
        }
    }

    /// A fresh client with `options` and no interceptors. Nothing carries
    /// over from any existing client.
    pub fn config(options: Options) -> Client {
        Client::new(options)
    }

    pub fn get(&self, url: &str) -> Result<PendingRequest, Error> {
        self.request(HttpMethod::Get, url, RequestOptions::default())
    }

    pub fn post(&self, url: &str, options: RequestOptions) -> Result<PendingRequest, Error> {
        self.request(HttpMethod::Post, url, options)
    }

    pub fn put(&self, url: &str, options: RequestOptions) -> Result<PendingRequest, Error> {
        self.request(HttpMethod::Put, url, options)
    }

    pub fn patch(&self, url: &str, options: RequestOptions) -> Result<PendingRequest, Error> {
        self.request(HttpMethod::Patch, url, options)
    }

    pub fn delete(&self, url: &str) -> Result<PendingRequest, Error> {
        self.request(HttpMethod::Delete, url, RequestOptions::default())
    }

    pub fn head(&self, url: &str) -> Result<PendingRequest, Error> {
        self.request(HttpMethod::Head, url, RequestOptions::default())
    }

    /// Dispatch a request; the returned handle is already running.
    pub fn request(
        &self,
        method: HttpMethod,
        url: &str,
        options: RequestOptions,
    ) -> Result<PendingRequest, Error> {
        let RequestOptions {
            headers,
            body,
            method: method_override,
            handler,
            sink,
            on_progress,
        } = options;

        let mut request = Request::new(method_override.unwrap_or(method), self.url_for(url)?);
        request.headers = headers;
        request.body = body;

        let terminal = match handler {
            Some(handler) => handler,
            None => self.transport.clone()?,
        };

        let mut pipeline = match sink {
            Some(sink) => Pipeline::new()
                .push(interceptors::sink(sink, on_progress))
                .chain(&self.pipeline),
            None => self.pipeline.clone(),
        };
        if let Some(policy) = &self.options.http_errors {
            pipeline = pipeline.push(interceptors::status_policy(policy.clone()));
        }

        let mut pending = PendingRequest::new(request, pipeline.into_handler(terminal));
        pending.dispatch();
        Ok(pending)
    }

    /// Dispatch a request and wait for its outcome.
    pub fn sync_request(
        &self,
        method: HttpMethod,
        url: &str,
        options: RequestOptions,
    ) -> Result<Outcome, Error> {
        Ok(self.request(method, url, options)?.into_outcome())
    }

    /// GET `url` and stream the body into the file at `path`, created or
    /// truncated first.
    pub fn download(
        &self,
        url: &str,
        path: impl AsRef<Path>,
        options: RequestOptions,
    ) -> Result<PendingRequest, Error> {
        let file = File::create(path)?;
        self.request(HttpMethod::Get, url, options.sink(file))
    }

    /// `path` joined onto the base URI, validated as an absolute URL.
    pub fn url_for(&self, path: &str) -> Result<String, Error> {
        let url = match self.options.base_uri.as_deref() {
            Some(base) if !base.is_empty() => {
                format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
            }
            _ => path.to_string(),
        };
        url::Url::parse(&url)?;
        Ok(url)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("pipeline", &self.pipeline)
            .field("options", &self.options)
            .field("transport", &self.transport.as_ref().map(|_| "ureq"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::http::Response;

    fn client_with_base(base: &str) -> Client {
        Client::new(Options {
            base_uri: Some(base.to_string()),
            ..Options::default()
        })
    }

    fn echo_method() -> Handler {
        Arc::new(|req: Request| {
            Outcome::from_response(
                Response::new(200)
                    .with_header("x-method", req.method.as_str())
                    .with_header("x-url", req.url.clone()),
            )
        })
    }

    #[test]
    fn base_uri_is_joined_once() {
        let client = client_with_base("http://localhost:3000/api/");
        assert_eq!(client.url_for("/users").unwrap(), "http://localhost:3000/api/users");
        assert_eq!(client.url_for("users").unwrap(), "http://localhost:3000/api/users");
    }

    #[test]
    fn relative_url_without_base_is_rejected() {
        let err = Client::default().url_for("/users").unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(_)));
    }

    #[test]
    fn defaults_use_thirty_second_timeout() {
        let options = Options::default();
        assert_eq!(options.timeout, Some(DEFAULT_TIMEOUT));
        assert!(options.http_errors.is_none());
    }

    #[test]
    fn env_lookup_overrides_defaults() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("FEATHER_BASE_URI", "http://example.test"),
            ("FEATHER_TIMEOUT_SECS", "5"),
            ("FEATHER_PROXY", "none"),
            ("FEATHER_HTTP_ERRORS", "true"),
        ]);
        let options = Options::from_lookup(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(options.base_uri.as_deref(), Some("http://example.test"));
        assert_eq!(options.timeout, Some(Duration::from_secs(5)));
        assert_eq!(options.proxy.as_deref(), Some(NO_PROXY));
        assert!(options.http_errors.is_some());
    }

    #[test]
    fn bad_env_timeout_keeps_default() {
        let options =
            Options::from_lookup(|key| (key == "FEATHER_TIMEOUT_SECS").then(|| "soon".to_string()));
        assert_eq!(options.timeout, Some(DEFAULT_TIMEOUT));
    }

    #[test]
    fn method_override_and_handler_override() {
        let client = client_with_base("http://localhost");
        let outcome = client
            .sync_request(
                HttpMethod::Get,
                "/anything",
                RequestOptions::new().method(HttpMethod::Patch).handler(echo_method()),
            )
            .unwrap();
        let response = outcome.response().unwrap();
        assert_eq!(response.header("x-method"), Some("PATCH"));
        assert_eq!(response.header("x-url"), Some("http://localhost/anything"));
    }

    #[test]
    fn interceptor_returns_new_client() {
        let base = client_with_base("http://localhost");
        let extended = base.interceptor(|req, next: Next<'_>| next.run(req));
        assert_eq!(base.pipeline().len(), 0);
        assert_eq!(extended.pipeline().len(), 1);
    }

    #[test]
    fn status_policy_runs_inside_client_interceptors() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = seen.clone();
        let client = Client::new(Options {
            base_uri: Some("http://localhost".to_string()),
            http_errors: Some(StatusPolicy::success()),
            ..Options::default()
        })
        .interceptor(move |req, next: Next<'_>| {
            let outcome = next.run(req);
            recorded.lock().unwrap().push(outcome.is_ok());
            outcome
        });
        let not_found: Handler =
            Arc::new(|_req: Request| Outcome::from_response(Response::new(404)));

        let mut pending = client
            .request(HttpMethod::Get, "/missing", RequestOptions::new().handler(not_found))
            .unwrap();

        assert!(!pending.is_success());
        // The user interceptor already saw the policy error on the way out.
        assert_eq!(*seen.lock().unwrap(), vec![false]);
    }

    #[test]
    fn bad_proxy_fails_requests() {
        let client = Client::new(Options {
            proxy: Some("::not a proxy::".to_string()),
            ..Options::default()
        });
        let err = client.get("http://localhost/").unwrap_err();
        assert!(matches!(err, Error::InvalidProxy(_)));
    }

    #[test]
    fn config_builds_a_fresh_client() {
        let client = Client::default().interceptor(|req, next: Next<'_>| next.run(req));
        let fresh = Client::config(Options {
            timeout: None,
            ..Options::default()
        });
        assert!(fresh.pipeline().is_empty());
        assert_eq!(fresh.options().timeout, None);
        assert_eq!(client.pipeline().len(), 1);
    }
}
