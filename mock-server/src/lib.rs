use std::{collections::BTreeMap, time::Duration};

use axum::{
    extract::{Path, Query},
    http::{header, HeaderMap, Method, StatusCode},
    response::IntoResponse,
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

/// Size of the `/download` payload.
pub const DOWNLOAD_SIZE: usize = 64 * 1024;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Reply {
    pub code: u16,
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Echo {
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

#[derive(Deserialize)]
pub struct SlowParams {
    #[serde(default)]
    pub ms: u64,
}

pub fn app() -> Router {
    Router::new()
        .route("/ok", get(ok))
        .route("/status/{code}", get(status))
        .route("/echo", any(echo))
        .route("/text", get(text))
        .route("/download", get(download))
        .route("/slow", get(slow))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Deterministic bytes served by `/download`.
pub fn download_payload() -> Vec<u8> {
    (0..DOWNLOAD_SIZE).map(|i| (i % 251) as u8).collect()
}

async fn ok() -> Json<Reply> {
    Json(Reply {
        code: 0,
        message: "ok".to_string(),
    })
}

async fn status(Path(code): Path<u16>) -> Result<(StatusCode, Json<Reply>), StatusCode> {
    let status = StatusCode::from_u16(code).map_err(|_| StatusCode::BAD_REQUEST)?;
    let reply = Reply {
        code,
        message: status.canonical_reason().unwrap_or("unknown").to_string(),
    };
    Ok((status, Json(reply)))
}

async fn echo(method: Method, headers: HeaderMap, body: String) -> Json<Echo> {
    let headers = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    Json(Echo {
        method: method.to_string(),
        headers,
        body,
    })
}

async fn text() -> &'static str {
    "hello, feather"
}

async fn download() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/octet-stream")],
        download_payload(),
    )
}

async fn slow(Query(params): Query<SlowParams>) -> Json<Reply> {
    tokio::time::sleep(Duration::from_millis(params.ms)).await;
    Json(Reply {
        code: 0,
        message: "slow".to_string(),
    })
}
