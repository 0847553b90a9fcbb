//! Process-wide convenience client.
//!
//! The client is created on first use from `Options::from_env()`. Call
//! `set_default_client` before any request to install a configured one;
//! once initialised it cannot be replaced.

use std::path::Path;
use std::sync::OnceLock;

use crate::client::{Client, Options, RequestOptions};
use crate::error::Error;
use crate::http::HttpMethod;
use crate::pending::PendingRequest;

static DEFAULT_CLIENT: OnceLock<Client> = OnceLock::new();

pub fn default_client() -> &'static Client {
    DEFAULT_CLIENT.get_or_init(|| Client::new(Options::from_env()))
}

/// Install `client` as the default. Fails, handing it back, if a default
/// client already exists.
pub fn set_default_client(client: Client) -> Result<(), Client> {
    DEFAULT_CLIENT.set(client)
}

pub fn get(url: &str) -> Result<PendingRequest, Error> {
    default_client().get(url)
}

pub fn post(url: &str, options: RequestOptions) -> Result<PendingRequest, Error> {
    default_client().post(url, options)
}

pub fn put(url: &str, options: RequestOptions) -> Result<PendingRequest, Error> {
    default_client().put(url, options)
}

pub fn patch(url: &str, options: RequestOptions) -> Result<PendingRequest, Error> {
    default_client().patch(url, options)
}

pub fn delete(url: &str) -> Result<PendingRequest, Error> {
    default_client().delete(url)
}

pub fn request(
    method: HttpMethod,
    url: &str,
    options: RequestOptions,
) -> Result<PendingRequest, Error> {
    default_client().request(method, url, options)
}

pub fn download(
    url: &str,
    path: impl AsRef<Path>,
    options: RequestOptions,
) -> Result<PendingRequest, Error> {
    default_client().download(url, path, options)
}
