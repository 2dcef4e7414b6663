//! CodeTutor - two-stage LLM tutor for student code
//!
//! An HTTP service that takes a student's code and question, has one
//! model produce a structured diagnosis, and streams Socratic guidance
//! from a second model back to the student. Every exchange is recorded
//! per session.
//!
//! Exit codes:
//!   0 - Clean shutdown
//!   1 - Startup or runtime error (config, database, bind, etc.)

mod agent;
mod cli;
mod config;
mod error;
mod llm;
mod models;
mod pipeline;
mod server;
mod store;

use anyhow::{Context, Result};
use cli::Args;
use config::{Config, StoreBackend, StoreConfig, DEFAULT_CONFIG_FILE};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // No logging needed for --init-config
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("CodeTutor v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    if let Err(e) = run_server(args).await {
        error!("Server failed: {:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default .codetutor.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "{} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("Edit it to customize models, prompt options, and storage.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Build every component from configuration and serve until Ctrl-C.
async fn run_server(args: Args) -> Result<()> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config.validate()?;

    let store = open_store(&config.store)?;

    info!(
        "Analyser: {} at {}",
        config.analyser.model.model, config.analyser.model.ollama_url
    );
    info!(
        "Teacher: {} at {}",
        config.teacher.model, config.teacher.ollama_url
    );
    debug!("Analysis options: {:?}", config.analyser.prompt);

    let analyser_provider = llm::OllamaProvider::new(config.analyser.model.to_ollama_config())?;
    let teacher_provider = llm::OllamaProvider::new(config.teacher.to_ollama_config())?;

    let orchestrator = pipeline::Orchestrator::new(
        store,
        agent::CodeAnalyser::new(Arc::new(analyser_provider), config.analyser.prompt),
        agent::Teacher::new(Arc::new(teacher_provider)),
        config.server.channel_capacity,
    );

    let router = server::create_router(server::AppState {
        orchestrator: Arc::new(orchestrator),
    });

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Shut down cleanly");
    Ok(())
}

/// Open the configured session store.
fn open_store(config: &StoreConfig) -> Result<Arc<dyn store::SessionStore>> {
    match config.backend {
        StoreBackend::Memory => {
            warn!("Using in-memory session store; history is lost on restart");
            Ok(Arc::new(store::MemoryStore::new()))
        }
        StoreBackend::Sqlite => {
            let sqlite = store::SqliteStore::open(&config.path).with_context(|| {
                format!("Failed to open database: {}", config.path.display())
            })?;
            Ok(Arc::new(sqlite))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {:#}", e);
            Ok(Config::default())
        }
    }
}
