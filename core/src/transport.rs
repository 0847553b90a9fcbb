//! Default terminal handler backed by `ureq`.
//!
//! # Design
//! The agent is configured once per `Client` from its `Options`: the timeout
//! applies to the whole call, and status codes are never turned into
//! transport errors here, since the status policy interceptor decides that.
//! The response body is handed over as a live reader and only read when
//! somebody asks for the content.

use std::sync::Arc;

use log::trace;

use crate::client::{Options, NO_PROXY};
use crate::error::Error;
use crate::http::{Body, HttpMethod, Request, Response};
use crate::outcome::Outcome;
use crate::pipeline::Handler;

/// Build a `ureq` agent honouring `options`' timeout and proxy settings.
///
/// Without a proxy setting the agent falls back to the environment
/// (`HTTP_PROXY`, `HTTPS_PROXY`, ...). `NO_PROXY` disables proxies entirely.
pub fn agent(options: &Options) -> Result<ureq::Agent, Error> {
    let mut config = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(options.timeout);
    match options.proxy.as_deref() {
        None => {}
        Some(NO_PROXY) => config = config.proxy(None),
        Some(url) => {
            let proxy = ureq::Proxy::new(url)
                .map_err(|e| Error::InvalidProxy(format!("{url}: {e}")))?;
            config = config.proxy(Some(proxy));
        }
    }
    Ok(config.build().new_agent())
}

/// The terminal handler sending requests through `agent`.
pub fn handler(agent: ureq::Agent) -> Handler {
    Arc::new(move |request: Request| Outcome::from(send(&agent, request)))
}

/// Execute `request` and return the response with its body still unread.
pub fn send(agent: &ureq::Agent, request: Request) -> Result<Response, Error> {
    trace!("sending {} {}", request.method, request.url);
    let url = request.url.as_str();
    let body = request.body.as_deref();

    let response = match request.method {
        HttpMethod::Get => with_headers(agent.get(url), &request.headers).call(),
        HttpMethod::Head => with_headers(agent.head(url), &request.headers).call(),
        HttpMethod::Delete => with_headers(agent.delete(url), &request.headers).call(),
        HttpMethod::Post => send_body(with_headers(agent.post(url), &request.headers), body),
        HttpMethod::Put => send_body(with_headers(agent.put(url), &request.headers), body),
        HttpMethod::Patch => send_body(with_headers(agent.patch(url), &request.headers), body),
    }?;

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    let body = Body::from_reader(response.into_body().into_reader());

    Ok(Response {
        status,
        headers,
        body,
    })
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

fn send_body(
    builder: ureq::RequestBuilder<ureq::typestate::WithBody>,
    body: Option<&[u8]>,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match body {
        Some(body) => builder.send(body),
        None => builder.send_empty(),
    }
}
