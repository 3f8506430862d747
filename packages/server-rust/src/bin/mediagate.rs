//! `mediagate` binary: runs the gateway or one of the provider services.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use mediagate_server::app::{gateway_state, provider_state, GATEWAY_SERVICE};
use mediagate_server::network::{
    gateway_router, provider_router, NetworkConfig, NetworkModule, RuntimeState,
};
use mediagate_server::service::domain::{GoogleBooksProvider, ITunesProvider};
use mediagate_server::service::{
    operation_names, GatewayConfig, ProviderConfig, ResilienceSettings,
};
use mediagate_server::telemetry;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::signal;

/// MediaGate - one query, books and albums together
#[derive(Parser)]
#[command(name = "mediagate")]
#[command(about = "Fan-out media search gateway and its provider services")]
#[command(version)]
struct Cli {
    /// Emit logs as JSON objects
    #[arg(long, global = true, env = "MEDIAGATE_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the search gateway
    Gateway(GatewayArgs),
    /// Run the book provider (Google Books)
    Books(ProviderArgs),
    /// Run the album provider (iTunes)
    Albums(ProviderArgs),
}

#[derive(Args)]
struct ListenArgs {
    /// Bind address
    #[arg(long, env = "MEDIAGATE_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Listen port (defaults: gateway 8080, books 8081, albums 8082)
    #[arg(short, long, env = "MEDIAGATE_PORT")]
    port: Option<u16>,
}

impl ListenArgs {
    fn network(&self, default_port: u16) -> NetworkConfig {
        NetworkConfig {
            host: self.host.clone(),
            port: self.port.unwrap_or(default_port),
            ..NetworkConfig::default()
        }
    }
}

#[derive(Args)]
struct GatewayArgs {
    #[command(flatten)]
    listen: ListenArgs,

    /// Base URL of the book provider
    #[arg(long, env = "MEDIAGATE_BOOKS_URL", default_value = "http://127.0.0.1:8081")]
    books_url: String,

    /// Base URL of the album provider
    #[arg(long, env = "MEDIAGATE_ALBUMS_URL", default_value = "http://127.0.0.1:8082")]
    albums_url: String,

    /// JSON file with resilience defaults and per-operation overrides
    #[arg(long, env = "MEDIAGATE_RESILIENCE_CONFIG")]
    resilience_config: Option<PathBuf>,

    /// Deadline for one whole fan-out, in milliseconds
    #[arg(long, env = "MEDIAGATE_SEARCH_TIMEOUT_MS", default_value_t = 60_000)]
    search_timeout_ms: u64,

    /// Connect timeout for provider connections, in milliseconds
    #[arg(long, env = "MEDIAGATE_CONNECT_TIMEOUT_MS", default_value_t = 1_000)]
    connect_timeout_ms: u64,
}

impl GatewayArgs {
    fn config(&self) -> Result<GatewayConfig> {
        let resilience = match &self.resilience_config {
            Some(path) => ResilienceSettings::load(path)?,
            None => ResilienceSettings::default(),
        };
        Ok(GatewayConfig {
            book_backend: self.books_url.clone(),
            album_backend: self.albums_url.clone(),
            search_timeout: Duration::from_millis(self.search_timeout_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            resilience,
        })
    }
}

#[derive(Args)]
struct ProviderArgs {
    #[command(flatten)]
    listen: ListenArgs,

    /// Upstream search API (defaults to the public Google Books / iTunes endpoint)
    #[arg(long, env = "MEDIAGATE_API_ENDPOINT")]
    api_endpoint: Option<String>,

    /// Maximum hits requested from the upstream API
    #[arg(long, env = "MEDIAGATE_RESULT_LIMIT", default_value_t = ProviderConfig::DEFAULT_RESULT_LIMIT)]
    result_limit: u32,

    /// Cap on the per-call budget a caller may request, in milliseconds
    #[arg(long, env = "MEDIAGATE_MAX_CALL_TIMEOUT_MS", default_value_t = 60_000)]
    max_call_timeout_ms: u64,
}

impl ProviderArgs {
    fn config(&self, default_endpoint: &str) -> ProviderConfig {
        ProviderConfig {
            api_endpoint: self
                .api_endpoint
                .clone()
                .unwrap_or_else(|| default_endpoint.to_string()),
            result_limit: self.result_limit,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.log_json)?;
    let metrics = telemetry::install_prometheus()?;

    match cli.command {
        Commands::Gateway(args) => run_gateway(&args, metrics).await,
        Commands::Books(args) => {
            let provider =
                GoogleBooksProvider::new(args.config(ProviderConfig::GOOGLE_BOOKS_ENDPOINT))?;
            run_provider(provider, operation_names::BOOKS, 8081, &args, metrics).await
        }
        Commands::Albums(args) => {
            let provider = ITunesProvider::new(args.config(ProviderConfig::ITUNES_ENDPOINT))?;
            run_provider(provider, operation_names::ALBUMS, 8082, &args, metrics).await
        }
    }
}

async fn run_gateway(args: &GatewayArgs, metrics: PrometheusHandle) -> Result<()> {
    let config = args.config()?;
    let mut module = NetworkModule::new(args.listen.network(8080));
    let runtime = Arc::new(RuntimeState::new(
        GATEWAY_SERVICE,
        module.shutdown_controller(),
        Some(metrics),
    ));
    let state = gateway_state(&config, runtime)?;

    module.start().await?;
    let router = gateway_router(state, module.config());
    module.serve(router, wait_for_shutdown()).await
}

async fn run_provider<S, T>(
    provider: S,
    service: &'static str,
    default_port: u16,
    args: &ProviderArgs,
    metrics: PrometheusHandle,
) -> Result<()>
where
    S: mediagate_server::service::SearchService<Output = Vec<T>>,
    T: serde::Serialize + Send + Sync + 'static,
{
    let mut module = NetworkModule::new(args.listen.network(default_port));
    let runtime = Arc::new(RuntimeState::new(
        service,
        module.shutdown_controller(),
        Some(metrics),
    ));
    let state = provider_state(
        provider,
        service,
        runtime,
        Duration::from_millis(args.max_call_timeout_ms),
    );

    module.start().await?;
    let router = provider_router(state, module.config());
    module.serve(router, wait_for_shutdown()).await
}

/// Resolves on Ctrl+C or SIGTERM. A signal handler that cannot be installed
/// is logged and treated as a shutdown request.
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(%e, "failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => tracing::error!(%e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}
