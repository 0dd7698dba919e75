//! PolicyGuard Server
//!
//! HTTP moderation service. Each submitted item is classified, matched
//! against the policy corpus, and adjudicated into an allow, flag, or block
//! decision that is appended to a hash-chained audit trail.
//!
//! The `eval` subcommand runs a labelled CSV through the same pipeline
//! offline and reports accuracy and a confusion matrix.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

mod backend;
mod config;
mod eval;
mod guardrails;
mod routes;
mod state;

use config::ServerConfig;
use eval::{EvalMode, EvalOptions};
use state::AppState;

#[derive(Parser, Debug)]
#[command(name = "policyguard-server")]
#[command(about = "PolicyGuard content moderation service", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        global = true,
        default_value = "policyguard.yaml",
        env = "POLICYGUARD_CONFIG"
    )]
    config: PathBuf,

    /// Policy corpus, overriding the configured path
    #[arg(long, global = true)]
    corpus: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,

    /// Server options when no subcommand is given
    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service (default)
    Serve(ServeArgs),

    /// Evaluate the pipeline against a labelled CSV
    Eval(EvalArgs),
}

#[derive(Args, Debug, Clone)]
struct ServeArgs {
    /// Listen address
    #[arg(short = 'l', long, default_value = "0.0.0.0")]
    listen: String,

    /// Listen port
    #[arg(short = 'P', long, default_value = "8080")]
    port: u16,
}

#[derive(Args, Debug)]
struct EvalArgs {
    /// CSV with `id`, `text` and optional `expected_label` columns
    samples: PathBuf,

    /// Results CSV; defaults to `<samples>_results.csv`
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Only evaluate the first N rows
    #[arg(short = 'n', long)]
    max_samples: Option<usize>,

    /// Map classifier verdicts to labels without retrieval or adjudication
    #[arg(long)]
    classifier_only: bool,

    /// Pause between rows, in milliseconds
    #[arg(long, default_value = "0")]
    delay_ms: u64,
}

impl From<EvalArgs> for EvalOptions {
    fn from(args: EvalArgs) -> Self {
        Self {
            samples: args.samples,
            output: args.output,
            max_samples: args.max_samples,
            mode: if args.classifier_only {
                EvalMode::ClassifierOnly
            } else {
                EvalMode::Pipeline
            },
            delay: Duration::from_millis(args.delay_ms),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    let config = ServerConfig::load(&cli.config, cli.corpus.as_deref())?;
    info!("Configuration loaded from {}", cli.config.display());
    info!("Corpus: {}", config.corpus_path.display());
    info!("Embedding provider: {:?}", config.embedding.provider);

    match cli.command {
        Some(Command::Eval(args)) => run_eval(&config, args.into()).await,
        Some(Command::Serve(args)) => serve(&config, &args).await,
        None => serve(&config, &cli.serve).await,
    }
}

async fn serve(config: &ServerConfig, args: &ServeArgs) -> Result<()> {
    info!("Starting PolicyGuard server");
    let metrics_handle = init_metrics()?;

    let state = AppState::build(config).await?.with_metrics(metrics_handle);
    let audit = state.audit.clone();
    info!("Application state initialized");

    let app = routes::create_router(state, config.max_body_bytes);

    let addr: SocketAddr = format!("{}:{}", args.listen, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    audit.flush().await;
    info!("Server shutdown complete");
    Ok(())
}

async fn run_eval(config: &ServerConfig, options: EvalOptions) -> Result<()> {
    info!("Evaluating {} ({:?})", options.samples.display(), options.mode);
    let summary = eval::run(config, &options).await?;
    println!("{}", summary);
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    warn!("Shutdown signal received, stopping server...");
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("policyguard=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("policyguard=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Install the Prometheus recorder and describe the pipeline metrics
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    policyguard_telemetry::metrics::describe_metrics();

    info!("Metrics exporter initialized");
    Ok(handle)
}
