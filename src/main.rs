use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use sqlpooler::config::Config;
use sqlpooler::pool::{
    Backend, MessageBufferCache, PeriodicDriver, Route, RouteId, RoutePool, RouteScheme,
    TaskRegistry, TcpBackend,
};
use sqlpooler::telemetry::TelemetryHistory;
use sqlpooler::{PoolError, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "sqlpoolerd")]
#[command(about = "Pool maintenance engine for an advanced SQL connection pooler", long_about = None)]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Generate example configuration file
    #[arg(long, value_name = "FILE")]
    generate_config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(config_path) = args.generate_config {
        println!("Generating example configuration file: {:?}", config_path);
        Config::create_example(&config_path)?;
        println!("Example configuration file created successfully!");
        println!("Edit the file and run: sqlpoolerd --config {:?}", config_path);
        return Ok(());
    }

    init_logging(&args.log_level)?;

    info!("sqlpoolerd v{} starting", env!("CARGO_PKG_VERSION"));

    let config = if let Some(config_path) = args.config {
        info!("loading configuration from: {:?}", config_path);
        Config::from_file(config_path)?
    } else {
        info!("no configuration file specified, using defaults");
        Config::default()
    };

    // Route/client/server acceptance is out of scope for this crate; seed
    // the route pool from config so the maintenance engine has something to
    // act on. A real deployment wires this pool into the listener/resolver
    // instead.
    let routes = Arc::new(RoutePool::new());
    for route_cfg in &config.pool.routes {
        let route = Route::new(
            RouteId {
                database: route_cfg.database.clone(),
                user: route_cfg.user.clone(),
                version: 1,
            },
            RouteScheme::new(route_cfg.pool_ttl, route_cfg.is_obsolete, 1),
        );
        routes.insert(route);
    }

    let backend: Arc<dyn Backend> = Arc::new(TcpBackend);
    let buffers = Arc::new(MessageBufferCache::new());
    let tasks = Arc::new(TaskRegistry::new());
    let telemetry = Arc::new(TelemetryHistory::new(1024, 24));

    let driver = PeriodicDriver::new(
        routes.clone(),
        backend,
        buffers,
        tasks,
        telemetry,
        config.pool.stats_interval,
        config.pool.log_stats,
        config.pool.is_shared,
    );
    let stop = driver.stop_handle();
    let handle = driver.start()?;

    info!("periodic driver started, stats_interval={} ticks", config.pool.stats_interval);

    tokio::signal::ctrl_c()
        .await
        .map_err(PoolError::Io)?;
    info!("received ctrl-c, stopping periodic driver");
    stop.notify_one();
    let _ = handle.await;

    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_new(level).map_err(|e| PoolError::Config(format!("invalid log level: {}", e)))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .init();

    Ok(())
}
