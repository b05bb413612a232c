use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use netpulse_service::Orchestrator;
use netpulse_service::config::{Backend, Config};
use netpulse_service::database::seed::seed_demo;
use netpulse_service::database::{Database, DatabaseImpl, MemoryDatabase, initialize_database};
use netpulse_service::pool::open_pool;

#[derive(Parser, Debug)]
#[command(name = "netpulse", version, about = "Scheduled health checks for network devices")]
struct Cli {
    /// Config file (defaults to $XDG_CONFIG_HOME/netpulse/config.toml)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Populate an empty store with demo devices and monitors
    #[arg(long)]
    seed_demo: bool,
}

async fn open_database(config: &Config) -> Result<Arc<dyn Database>> {
    match config.database.backend {
        Backend::Memory => Ok(Arc::new(MemoryDatabase::with_capacity(
            config.engine.max_results_per_monitor,
        ))),
        Backend::Libsql => {
            let path = &config.database.path;
            let pool = open_pool(path)
                .await
                .with_context(|| format!("opening {}", path.display()))?;
            let conn = pool.get().await?;
            initialize_database(&conn).await?;
            drop(conn);
            info!("Using libsql store at {}", path.display());
            Ok(Arc::new(DatabaseImpl::new_from_pool(pool)))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_config(cli.config.as_ref())?;

    if cli.print_config {
        print!("{config}");
        return Ok(());
    }

    logger::init_tracing(config.logging.level_filter(), config.logging.log_format())?;

    let database = open_database(&config).await?;
    if cli.seed_demo {
        let seeded = seed_demo(database.as_ref()).await?;
        info!("Seeded {} demo monitors", seeded);
    }

    let orchestrator = Orchestrator::new(&config, database)?;

    let mut events = orchestrator.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => debug!(kind = event.kind().as_str(), "{}", json),
                    Err(e) => warn!("Failed to serialize event: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event log fell behind, {} events dropped", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let scheduled = orchestrator.start().await?;
    info!("Monitoring {} monitors, press Ctrl+C to stop", scheduled);

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");
    let aborted = orchestrator.shutdown(config.engine.shutdown_grace()).await;
    if aborted > 0 {
        warn!("{} checks did not finish before shutdown", aborted);
    }

    Ok(())
}
