//! docsync: mirror a local folder of markdown documents with a document
//! server.
//!
//! With no subcommand it runs the sync daemon in the foreground.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sync_core::pull::PullOptions;
use sync_daemon::config::{self, ConfigStore};
use sync_daemon::engine::{Engine, StopHandle};
use sync_daemon::http::HttpGateway;
use sync_daemon::native_fs::NativeFs;
use sync_daemon::{init, service};

#[derive(Parser, Debug)]
#[command(name = "docsync")]
#[command(about = "Bidirectional sync between a local folder and a document server")]
struct Args {
    /// Path to the config file (default: $DOCSYNC_CONFIG, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Configure the sync root, server and credentials
    Init,
    /// Install the daemon as a per-user OS service
    Install,
    /// Check that the installed daemon is running
    Verify,
}

/// Load the config, running interactive setup when it is incomplete.
async fn load_or_init(path: PathBuf) -> Result<ConfigStore> {
    let mut store = ConfigStore::open(path)?;
    if !store.config().is_complete() {
        println!("Config not found. Enter your sync settings:");
        init::run_init(&mut store).await.context("Setup failed")?;
        if !store.config().is_complete() {
            bail!("Config still invalid after setup");
        }
    }
    Ok(store)
}

/// Stop the engine on Ctrl+C (and SIGTERM on Unix).
fn stop_on_signal(handle: StopHandle) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = term.recv() => {}
                    }
                }
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        info!("Shutdown signal received");
        handle.stop();
    });
}

async fn run_daemon(store: ConfigStore) -> Result<()> {
    let config = store.config().clone();
    let root = config.sync_root_path();
    std::fs::create_dir_all(&root)
        .with_context(|| format!("Failed to create sync root {}", root.display()))?;

    info!("Sync root: {}", root.display());
    info!("Server: {}", config.server_url);

    let gateway = HttpGateway::new(&config.server_url, config.auth_token.clone())?;
    let pull_options = PullOptions {
        blob_host: config.blob_host(),
    };
    let mut engine = Engine::new(root.clone(), NativeFs::new(root), gateway, store, pull_options)
        .with_auth(config.has_auth());

    stop_on_signal(engine.stop_handle());
    info!("Daemon running. Press Ctrl+C to stop.");
    engine.run().await?;

    info!("Shutting down");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,sync_daemon=debug,sync_core=debug"
    } else {
        "info,sync_daemon=info,sync_core=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = match args.config {
        Some(path) => path,
        None => config::default_path()?,
    };

    match args.command {
        Some(Command::Init) => {
            let mut store = ConfigStore::open(config_path)?;
            init::run_init(&mut store).await.context("Init failed")?;
        }
        Some(Command::Install) => {
            let store = load_or_init(config_path).await?;
            service::install(store.path()).context("Install failed")?;
            println!("Daemon installed successfully.");
        }
        Some(Command::Verify) => {
            service::verify().context("Verify failed")?;
            println!("Daemon is installed and running.");
        }
        None => {
            let store = load_or_init(config_path).await?;
            run_daemon(store).await?;
        }
    }

    Ok(())
}
