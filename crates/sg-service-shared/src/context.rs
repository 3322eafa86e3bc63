//! Per-request correlation context.
//!
//! Every instrumented request gets a [`RequestContext`]: a freshly generated
//! [`RequestId`] plus a `request` span carrying it as the `u` field. The span
//! is a child of the server's root span, so fields recorded on the root
//! (version, listener address) remain visible on every request log line.
//!
//! Handlers reach the context through axum's `Extension` extractor:
//!
//! ```no_run
//! use axum::Extension;
//! use sg_service_shared::RequestContext;
//!
//! async fn handler(Extension(ctx): Extension<RequestContext>) -> &'static str {
//!     let _enter = ctx.span().enter();
//!     tracing::info!("inside request {}", ctx.id());
//!     "ok"
//! }
//! ```

use tracing::{info_span, Span};
use uuid::Uuid;

/// Newtype wrapper for request correlation IDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a new random (UUID v4) request ID.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the request ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlation context attached to a single request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    id: RequestId,
    span: Span,
}

impl RequestContext {
    /// Derive a request context from `parent`.
    ///
    /// The returned span is a child of `parent` and records the new id under
    /// the `u` field.
    pub fn derive(parent: &Span) -> Self {
        let id = RequestId::generate();
        let span = info_span!(parent: parent, "request", u = %id);
        Self { id, span }
    }

    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Span bound to this request's id.
    pub fn span(&self) -> &Span {
        &self.span
    }
}
