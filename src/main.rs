use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

use newsdesk::{Config, Database, Engine, EngineHandle, FileItemStore, SourceRepository};

const DEFAULT_CONFIG: &str = "config.toml";

struct Args {
    once: bool,
    config_path: String,
}

fn parse_args() -> Args {
    let mut once = false;
    let mut config_path = DEFAULT_CONFIG.to_string();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--once" => once = true,
            path => config_path = path.to_string(),
        }
    }
    Args { once, config_path }
}

#[tokio::main]
async fn main() {
    let args = parse_args();

    // Load configuration
    let config = match Config::load_with_env(&args.config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {e}", args.config_path);
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = newsdesk::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        newsdesk::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(2);
    }

    if let Err(e) = run(config, args.once).await {
        error!("newsdesk stopped: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config, once: bool) -> newsdesk::Result<()> {
    info!("newsdesk starting");

    let db = Database::open(&config.database.path).await?;
    let sources = Arc::new(SourceRepository::new(db.pool()));
    let items = Arc::new(FileItemStore::open(&config.items.path).await?);
    info!(
        "Item store at {} ({} items)",
        config.items.path,
        items.len().await
    );

    let engine = Engine::new(config.discovery.clone(), sources, items)?;

    if once {
        let runs = engine.run_once().await?;
        let new_items: usize = runs.iter().map(|run| run.outcome.new_items()).sum();
        let failed = runs.iter().filter(|run| !run.outcome.is_success()).count();
        info!(
            "Cycle complete: {} source(s) fetched, {} new items, {} failed",
            runs.len(),
            new_items,
            failed
        );
        return Ok(());
    }

    listen_for_signals(engine.handle())?;
    engine.run().await?;
    db.close().await;
    Ok(())
}

/// SIGINT/SIGTERM drain the engine; SIGHUP re-lists sources.
fn listen_for_signals(handle: EngineHandle) -> newsdesk::Result<()> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = interrupt.recv() => {
                    info!("Received SIGINT, shutting down");
                    handle.shutdown();
                }
                _ = terminate.recv() => {
                    info!("Received SIGTERM, shutting down");
                    handle.shutdown();
                }
                _ = hangup.recv() => {
                    if handle.is_shutting_down() {
                        warn!("Ignoring SIGHUP during shutdown");
                    } else {
                        info!("Received SIGHUP, reloading sources");
                        handle.reload();
                    }
                }
            }
        }
    });
    Ok(())
}
