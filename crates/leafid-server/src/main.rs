//! LeafID
//!
//! Real-time medicinal leaf identification server.
//!
//! Loads a MobileNetV2 classifier and the plant metadata database once at
//! startup, then serves an upload form, a webcam capture page and a JSON API.

use anyhow::Result;
use clap::Parser;
use leafid_classifiers::LabelMap;
use leafid_server::cli::{Cli, Commands, ServeArgs};
use leafid_server::{run_server, AppState, ServerConfig};
use leafid_store::SqlitePlantStore;
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => serve(args).await,

        Commands::InitDb {
            database,
            no_seed,
            verbose,
        } => {
            init_tracing(verbose);
            leafid_store::initialize_database(&database)?;
            if !no_seed {
                let inserted = leafid_store::seed_defaults(&database)?;
                println!("Seeded {} sample record(s)", inserted);
            }
            println!("Database initialized: {}", database.display());
            Ok(())
        }

        Commands::Import {
            database,
            file,
            verbose,
        } => {
            init_tracing(verbose);
            let written = leafid_store::import_records(&database, &file)?;
            println!(
                "Imported {} record(s) from {} into {}",
                written,
                file.display(),
                database.display()
            );
            Ok(())
        }

        Commands::CheckLabels {
            config,
            labels,
            database,
            verbose,
        } => {
            init_tracing(verbose);
            check_labels(config, labels, database)
        }
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    init_tracing(args.verbose);

    info!("Starting LeafID");

    let config = ServerConfig::load(&args.config, &args)?;
    info!("Configuration loaded successfully");
    info!("Labels: {}", config.model.labels.display());
    info!("Plant database: {}", config.database.display());
    info!("Device: {}", config.model.device);

    let metrics_handle = init_metrics()?;

    // Classifier and database are loaded before the listener is bound
    let state = AppState::from_config(&config, Some(metrics_handle))?;
    info!("Application state initialized successfully");

    let addr: SocketAddr = config.bind_address().parse()?;

    let shutdown = async {
        shutdown_signal().await;
        warn!("Shutdown signal received, stopping server...");
    };

    run_server(state, addr, shutdown).await
}

fn check_labels(
    config_path: PathBuf,
    labels: Option<PathBuf>,
    database: Option<PathBuf>,
) -> Result<()> {
    let config = ServerConfig::from_file(&config_path)?;
    let labels_path = labels.unwrap_or(config.model.labels);
    let database = database.unwrap_or(config.database);

    let labels = LabelMap::from_file(&labels_path)?;
    let store = SqlitePlantStore::open(&database)?;
    let missing = leafid_store::missing_labels(&store, labels.iter())?;

    if missing.is_empty() {
        println!(
            "All {} labels in {} have a plant record",
            labels.len(),
            labels_path.display()
        );
        return Ok(());
    }

    for label in &missing {
        println!("missing: {}", label);
    }
    anyhow::bail!(
        "{} of {} labels have no plant record in {}",
        missing.len(),
        labels.len(),
        database.display()
    )
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
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
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("leafid=debug,leafid_server=debug,leafid_classifiers=debug,leafid_store=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("leafid=info,leafid_server=info,leafid_classifiers=info,leafid_store=info")
        })
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "leafid_requests_total",
        "Total number of identification requests by capture source"
    );
    metrics::describe_counter!(
        "leafid_predictions_total",
        "Total number of predictions by label"
    );
    metrics::describe_counter!(
        "leafid_lookups_total",
        "Plant metadata lookups by outcome"
    );
    metrics::describe_histogram!(
        "leafid_inference_latency_us",
        metrics::Unit::Microseconds,
        "Forward pass latency in microseconds"
    );
    metrics::describe_counter!("leafid_errors_total", "Total number of errors by kind");

    info!("Metrics exporter initialized");
    Ok(handle)
}
