//! Shared helpers for the integration tests.
//!
//! Drive a `Router` in-process, or talk plain HTTP/1.1 to a bound server
//! without pulling in an HTTP client.

#![allow(dead_code)]

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tower::ServiceExt;

/// Send one request through `router` and return status and body text.
///
/// # Panics
///
/// Panics if the request cannot be built or the body is not UTF-8. This
/// indicates a test configuration issue.
pub async fn send(router: &Router, method: Method, uri: &str) -> (StatusCode, String) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap_or_else(|e| panic!("invalid test request {uri}: {e}"));

    let response = router
        .clone()
        .oneshot(request)
        .await
        .unwrap_or_else(|e| match e {});
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .unwrap_or_else(|e| panic!("failed to read body for {uri}: {e}"))
        .to_bytes();

    let text = String::from_utf8(bytes.to_vec())
        .unwrap_or_else(|e| panic!("non UTF-8 body for {uri}: {e}"));
    (status, text)
}

/// `GET` shorthand for [`send`].
pub async fn get(router: &Router, uri: &str) -> (StatusCode, String) {
    send(router, Method::GET, uri).await
}

/// Issue a raw `GET` over TCP and return the full response text.
pub async fn raw_get(addr: SocketAddr, path: &str) -> std::io::Result<String> {
    let mut stream = TcpStream::connect(addr).await?;
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;

    let mut response = String::new();
    stream.read_to_string(&mut response).await?;
    Ok(response)
}

