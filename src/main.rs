use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use axum::{
    Router,
    routing::{get, post},
};
use clap::{Parser, Subcommand};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

mod config;
mod dispatch;
mod langfuse;
mod mapper;
mod middleware;
mod observability;
mod otlp;
mod routes;
mod session;

#[cfg(test)]
mod tests;

use config::BridgeConfig;
use langfuse::{TelemetrySink, client::LangfuseClient};
use session::registry::SessionRegistry;

/// Ingest request/error counters surfaced by `/health`.
#[derive(Debug, Default)]
pub struct IngestStats {
    requests: AtomicU64,
    errors: AtomicU64,
}

impl IngestStats {
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BridgeConfig>,
    pub registry: Arc<SessionRegistry>,
    pub stats: Arc<IngestStats>,
    pub started_at: Instant,
    /// Tracker for background tasks (sweeper), waited on during
    /// graceful shutdown.
    pub task_tracker: TaskTracker,
}

impl AppState {
    /// Build the production state with a Langfuse-backed sink. The client
    /// is returned separately so the caller can drive its worker.
    pub fn new(
        config: BridgeConfig,
    ) -> Result<(Self, Arc<LangfuseClient>), Box<dyn std::error::Error>> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {e}"))?;

        let client = Arc::new(LangfuseClient::new(&config.langfuse, http));
        let sink: Arc<dyn TelemetrySink> = Arc::clone(&client) as Arc<dyn TelemetrySink>;
        Ok((Self::with_sink(config, sink), client))
    }

    /// Build state over an arbitrary sink. Tests use this with an
    /// in-memory recording sink.
    pub fn with_sink(config: BridgeConfig, sink: Arc<dyn TelemetrySink>) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(SessionRegistry::new(sink, config.session.idle_timeout()));
        Self {
            config,
            registry,
            stats: Arc::new(IngestStats::default()),
            started_at: Instant::now(),
            task_tracker: TaskTracker::new(),
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    let ingest = Router::new()
        .route("/v1/logs", post(routes::ingest::ingest_logs))
        .route("/v1/metrics", post(routes::ingest::ingest_metrics))
        .route("/v1/traces", post(routes::ingest::ingest_traces))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::api_key_middleware,
        ));

    Router::new()
        .route("/health", get(routes::health::health_check))
        .merge(ingest)
        // The OTLP contract is 404 for anything unrecognized, including
        // wrong methods on known paths.
        .method_not_allowed_fallback(|| async { http::StatusCode::NOT_FOUND })
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(
            state.config.server.max_request_size_bytes,
        ))
        .with_state(state)
}

#[derive(Parser)]
#[command(
    name = "telemetry-bridge",
    about = "OTLP receiver that bridges AI coding-assistant telemetry into Langfuse",
    version
)]
struct Args {
    /// Path to the configuration file. Omit to run from environment
    /// variables alone.
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the OTLP receiver (default)
    Serve,
    /// Write a default configuration file
    Init {
        /// Output path for the config file
        #[arg(short, long)]
        output: Option<String>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Some(Command::Init { output, force }) => run_init(output, force),
        Some(Command::Serve) | None => run_server(args.config.as_deref()).await,
    }
}

const DEFAULT_CONFIG_TOML: &str = r#"# Telemetry bridge configuration.
# Every value here can also be set through the flat environment variables
# noted alongside it; the environment wins over the file.

[server]
host = "0.0.0.0"
port = 4318                         # OTLP_RECEIVER_PORT
max_request_size_bytes = 10485760   # MAX_REQUEST_SIZE

[session]
idle_timeout_ms = 3600000           # SESSION_TIMEOUT
sweep_interval_secs = 60

[langfuse]
host = "https://cloud.langfuse.com" # LANGFUSE_HOST
public_key = "${LANGFUSE_PUBLIC_KEY}"
secret_key = "${LANGFUSE_SECRET_KEY}"

[auth]
# api_key = "..."                   # API_KEY; bearer token for POST /v1/*

[observability.logging]
level = "info"                      # LOG_LEVEL
format = "compact"                  # pretty | compact | json
"#;

fn run_init(output: Option<String>, force: bool) {
    let path = PathBuf::from(output.unwrap_or_else(|| "telemetry-bridge.toml".to_string()));

    if path.exists() && !force {
        eprintln!(
            "Config file already exists: {}\nUse --force to overwrite.",
            path.display()
        );
        std::process::exit(1);
    }

    if let Err(e) = std::fs::write(&path, DEFAULT_CONFIG_TOML) {
        eprintln!("Failed to write config file: {}", e);
        std::process::exit(1);
    }

    println!("Created config file: {}", path.display());
    println!();
    println!("To start the bridge, run:");
    println!("  telemetry-bridge serve --config {}", path.display());
}

async fn run_server(config_path: Option<&str>) {
    let config = match BridgeConfig::load(config_path.map(std::path::Path::new)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    observability::init_tracing(&config.observability.logging);

    tracing::info!(
        langfuse_host = %config.langfuse.host,
        idle_timeout_ms = config.session.idle_timeout_ms,
        "Starting telemetry bridge"
    );
    if config.auth.api_key.is_none() {
        tracing::warn!(
            "No ingress API key configured — the OTLP endpoints accept unauthenticated \
             requests. Set API_KEY to require a bearer token."
        );
    }

    let (state, langfuse) =
        AppState::new(config.clone()).expect("Failed to initialize application state");

    let delivery_worker = langfuse.start_worker();
    tracing::info!("Langfuse delivery worker started");

    let sweeper_shutdown = CancellationToken::new();
    state.task_tracker.spawn(session::registry::start_sweeper(
        Arc::clone(&state.registry),
        config.session.sweep_interval(),
        sweeper_shutdown.clone(),
    ));

    let shutdown = shutdown_signal(
        state.clone(),
        sweeper_shutdown,
        langfuse,
        delivery_worker,
    );
    let app = build_app(state);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("OTLP receiver listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .unwrap();
}

/// Wait for SIGINT/SIGTERM, then finalize all sessions and flush the
/// Langfuse queue within the configured bound.
async fn shutdown_signal(
    state: AppState,
    sweeper_shutdown: CancellationToken,
    langfuse: Arc<LangfuseClient>,
    delivery_worker: tokio::task::JoinHandle<()>,
) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, finalizing sessions...");

    sweeper_shutdown.cancel();
    state.task_tracker.close();

    // Finalize every session (emitting summaries), then wait for the
    // delivery queue to drain within the flush bound.
    state
        .registry
        .shutdown(state.config.langfuse.flush_timeout())
        .await;

    langfuse.stop_worker();
    if tokio::time::timeout(Duration::from_secs(5), delivery_worker)
        .await
        .is_err()
    {
        tracing::warn!("Timeout waiting for Langfuse delivery worker to stop");
    }

    if tokio::time::timeout(Duration::from_secs(5), state.task_tracker.wait())
        .await
        .is_err()
    {
        tracing::warn!("Timeout waiting for background tasks to complete");
    }
}
