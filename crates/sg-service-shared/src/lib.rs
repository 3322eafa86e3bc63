//! Shared infrastructure for the SG HTTP service.
//!
//! This crate provides everything the service binary wires together:
//!
//! - [`logging`]: Process-wide tracing subscriber, console or JSON
//! - [`RequestContext`]: Per-request correlation id and span
//! - [`middleware`]: Instrumentation layer (logging + three metric series)
//! - [`metrics`]: Prometheus recorder and `/metrics` exposition handler
//! - [`handlers`]: `/version`, `/healthz` and the catch-all greeting
//! - [`server`]: Route table and server lifecycle with graceful shutdown
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  InstrumentLayer (per route)                                 │
//! │  - derive RequestContext from the root span                  │
//! │  - log "[REQ] <route>"                                       │
//! │  - record sg_http_calls / sg_http_latency on completion      │
//! │  - RecordingBody records sg_response_size_bytes              │
//! │   ┌───────────────────────────────────────────────────────┐  │
//! │   │  Route handler (fixed body, status 200)               │  │
//! │   └───────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

#![deny(warnings)]

pub mod config;
mod context;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod server;

pub use config::{ServerConfig, DEFAULT_PORT};
pub use context::{RequestContext, RequestId};
pub use error::{Result, ServiceError};
pub use handlers::{catch_all_handler, health_handler, version_handler, VERSION};
pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use metrics::{init_metrics, metrics_handler, MetricsError};
pub use middleware::{InstrumentLayer, RecordingBody};
pub use server::{
    build_router, root_span, wait_for_shutdown, Server, ServerState, ShutdownReason,
    ShutdownSignals,
};
