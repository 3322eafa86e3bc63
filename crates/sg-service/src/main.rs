//! SG minimal HTTP service.
//!
//! # Endpoints
//!
//! - `/version` - Build identifier
//! - `/healthz` - Liveness probe, always `ok`
//! - `/metrics` - Prometheus exposition
//! - anything else - `Hello!`
//!
//! Every endpoint answers any HTTP method.
//!
//! # Configuration
//!
//! - `--port` / `SERVICE_PORT` - HTTP port (default: 4001)
//! - `--pretty-log <bool>` - Console (true) or JSON (false) logging
//! - `--json-log` - Shorthand for `--pretty-log false`
//! - `LOG_FORMAT` - `text` or `json`, used when neither flag is given
//! - `RUST_LOG` - Log level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Span};

use sg_service_shared::{
    init_logging, init_metrics, root_span, LogFormat, LoggingConfig, Server, ServerConfig,
    DEFAULT_PORT, VERSION,
};

#[derive(Parser, Debug)]
#[command(name = "sg-service", version = VERSION, about = "Minimal instrumented HTTP service")]
struct Cli {
    /// The port to run the server on.
    #[arg(long, env = "SERVICE_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Log human-readable lines (true) or JSON records (false).
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_name = "BOOL")]
    pretty_log: Option<bool>,

    /// Log JSON records. Same as `--pretty-log false`.
    #[arg(long, conflicts_with = "pretty_log")]
    json_log: bool,
}

impl Cli {
    fn logging_config(&self) -> LoggingConfig {
        let config = LoggingConfig::from_env();
        if self.json_log {
            return config.with_format(LogFormat::Json);
        }
        match self.pretty_log {
            Some(pretty) => config.with_format(LogFormat::from_pretty(pretty)),
            None => config,
        }
    }

    fn server_config(&self) -> ServerConfig {
        ServerConfig::new(self.port)
    }
}

/// Application hooks run between logger setup and serving.
struct App {
    root: Span,
}

impl App {
    fn new(root: Span) -> Self {
        Self { root }
    }

    fn init(&self) {
        self.root.in_scope(|| info!("Init called"));
    }

    async fn run(self, config: ServerConfig) -> Result<()> {
        let server = Server::bind(&config, self.root.clone())
            .await
            .map_err(|e| {
                self.root.in_scope(|| error!(error = %e, "failed to start server"));
                e
            })?;

        server
            .run(CancellationToken::new())
            .await
            .context("server terminated with an error")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.logging_config()).context("failed to initialize logging")?;

    init_metrics().context("failed to install metrics recorder")?;

    let root = root_span(VERSION);
    root.in_scope(|| info!("Starting up: {}", VERSION));

    let app = App::new(root);
    app.init();
    app.run(cli.server_config()).await
}
