//! Route handlers.
//!
//! All three handlers are infallible and write fixed bodies with status 200.
//! `/metrics` lives in [`crate::metrics`] and bypasses instrumentation.

use axum::http::Uri;
use axum::Extension;

use crate::context::RequestContext;

/// Build identifier served by `/version`.
///
/// Taken from `SG_BUILD_VERSION` at compile time, falling back to the crate version.
pub const VERSION: &str = match option_env!("SG_BUILD_VERSION") {
    Some(version) => version,
    None => env!("CARGO_PKG_VERSION"),
};

/// Liveness body served by `/healthz`.
pub const HEALTH_OK: &str = "ok";

/// Greeting served by `/` and every unmatched path.
pub const GREETING: &str = "Hello!";

/// Handler for `/version`.
pub async fn version_handler() -> &'static str {
    VERSION
}

/// Liveness probe handler for `/healthz`.
///
/// Reports that the process is up. No dependency is probed.
pub async fn health_handler() -> &'static str {
    HEALTH_OK
}

/// Catch-all handler for `/` and unmatched paths.
pub async fn catch_all_handler(
    Extension(ctx): Extension<RequestContext>,
    uri: Uri,
) -> &'static str {
    ctx.span().in_scope(|| tracing::debug!(path = %uri.path(), "catch-all"));
    GREETING
}
