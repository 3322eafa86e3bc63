//! HTTP instrumentation middleware for the SG service.
//!
//! This module provides:
//! - [`InstrumentLayer`]: Tower layer wrapping a single route
//! - [`Instrumented`]: The service produced by the layer
//! - [`RecordingBody`]: Response body shim that counts written bytes
//!
//! # Per-request flow
//!
//! 1. A [`RequestContext`] is derived from the server's root span.
//! 2. `[REQ] <route>` is logged inside the request span before the handler runs.
//! 3. The context is inserted into the request extensions and the handler is called.
//! 4. When the handler's future resolves, `sg_http_calls` and `sg_http_latency`
//!    are recorded with the route and final status code.
//! 5. The response body is wrapped in a [`RecordingBody`], which records
//!    `sg_response_size_bytes` once, when the body is finished or dropped.
//!
//! The layer is applied per route at table construction time, so only the
//! route name varies between routes.

use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Instant;

use bytes::Buf;
use http::{Request, Response};
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use tower::{Layer, Service};
use tracing::Span;

use crate::context::RequestContext;
use crate::metrics::{record_http_call, record_response_size};

/// Status code recorded when the wrapped service fails instead of responding.
const FAILED_CALL_STATUS: u16 = 500;

/// Status code recorded when the handler future is dropped before it resolves.
const ABANDONED_CALL_STATUS: u16 = 499;

// =============================================================================
// InstrumentLayer - Tower middleware for a single route
// =============================================================================

/// Tower layer attaching correlation logging and metrics to one route.
#[derive(Debug, Clone)]
pub struct InstrumentLayer {
    route: &'static str,
    root: Span,
}

impl InstrumentLayer {
    /// Create a layer for `route`, deriving request spans from `root`.
    pub fn new(route: &'static str, root: Span) -> Self {
        Self { route, root }
    }
}

impl<S> Layer<S> for InstrumentLayer {
    type Service = Instrumented<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Instrumented {
            inner,
            route: self.route,
            root: self.root.clone(),
        }
    }
}

/// Middleware service produced by [`InstrumentLayer`].
#[derive(Debug, Clone)]
pub struct Instrumented<S> {
    inner: S,
    route: &'static str,
    root: Span,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for Instrumented<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    ResBody: Body,
{
    type Response = Response<RecordingBody<ResBody>>;
    type Error = S::Error;
    type Future = InstrumentedFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let ctx = RequestContext::derive(&self.root);
        let span = ctx.span().clone();
        let route = self.route;
        let start = Instant::now();

        let inner = span.in_scope(|| {
            tracing::info!("[REQ] {}", route);
            req.extensions_mut().insert(ctx);
            self.inner.call(req)
        });

        InstrumentedFuture {
            inner,
            route,
            start,
            span,
            completed: false,
        }
    }
}

pin_project! {
    /// Future wrapper that records call metrics on completion.
    ///
    /// If the future is dropped before the handler resolves (client went
    /// away), the call is recorded with status 499 and a response size of 0.
    pub struct InstrumentedFuture<F> {
        #[pin]
        inner: F,
        route: &'static str,
        start: Instant,
        span: Span,
        completed: bool,
    }

    impl<F> PinnedDrop for InstrumentedFuture<F> {
        fn drop(this: Pin<&mut Self>) {
            let this = this.project();
            if !*this.completed {
                record_http_call(*this.route, ABANDONED_CALL_STATUS, this.start.elapsed());
                record_response_size(0);
                this.span.in_scope(|| tracing::debug!("request abandoned"));
            }
        }
    }
}

impl<F, ResBody, E> Future for InstrumentedFuture<F>
where
    F: Future<Output = Result<Response<ResBody>, E>>,
    ResBody: Body,
{
    type Output = Result<Response<RecordingBody<ResBody>>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _enter = this.span.enter();

        let result = ready!(this.inner.poll(cx));
        *this.completed = true;
        let elapsed = this.start.elapsed();
        let latency_ms = elapsed.as_secs_f64() * 1000.0;

        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                record_http_call(*this.route, status, elapsed);
                tracing::debug!(status, latency_ms, "request completed");

                Poll::Ready(Ok(response.map(RecordingBody::new)))
            }
            Err(err) => {
                record_http_call(*this.route, FAILED_CALL_STATUS, elapsed);
                record_response_size(0);
                tracing::error!(latency_ms, "request failed");

                Poll::Ready(Err(err))
            }
        }
    }
}

// =============================================================================
// RecordingBody - counts bytes written to the client
// =============================================================================

pin_project! {
    /// Response body that observes `sg_response_size_bytes` exactly once.
    ///
    /// The observation happens when the inner body reports end of stream or
    /// errors, or on drop if the body was abandoned before that.
    pub struct RecordingBody<B> {
        #[pin]
        inner: B,
        written: u64,
        recorded: bool,
    }

    impl<B> PinnedDrop for RecordingBody<B> {
        fn drop(this: Pin<&mut Self>) {
            let this = this.project();
            finish(this.recorded, *this.written);
        }
    }
}

impl<B> RecordingBody<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            written: 0,
            recorded: false,
        }
    }

    /// Bytes yielded so far.
    pub fn written(&self) -> u64 {
        self.written
    }
}

fn finish(recorded: &mut bool, written: u64) {
    if !*recorded {
        *recorded = true;
        record_response_size(written);
    }
}

impl<B> Body for RecordingBody<B>
where
    B: Body,
{
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();
        let frame = ready!(this.inner.as_mut().poll_frame(cx));

        match &frame {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    *this.written += data.remaining() as u64;
                }
                if this.inner.is_end_stream() {
                    finish(this.recorded, *this.written);
                }
            }
            Some(Err(_)) | None => finish(this.recorded, *this.written),
        }

        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
