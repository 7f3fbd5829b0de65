use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

use mps_threshold_server::common::logging::{init_logger, LogLevel};
use mps_threshold_server::data::{SqliteConfigurationStore, SqliteRuntimeStore};
use mps_threshold_server::hardware::LoopbackHardware;
use mps_threshold_server::protocol::PROTOCOL_VERSION;
use mps_threshold_server::server::{ServerConfig, ServerContext, ThresholdServer};

#[derive(Parser, Debug)]
struct Args {
    config_file: std::path::PathBuf,
    #[arg(long = "log-level", value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
    /// Rolls the log daily next to this file instead of printing to stdout
    #[arg(long = "log-file")]
    log_file: Option<std::path::PathBuf>,
    /// Overrides the port from the config file
    #[arg(long = "port")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    //We must keep the worker guard alive
    let _worker_guard = init_logger(args.log_level, args.log_file);

    let config = std::fs::read_to_string(&args.config_file).unwrap_or_else(|e| {
        error!("Couldn't read config file: {}", e);
        std::process::exit(1);
    });

    let mut config: ServerConfig = serde_json::from_str(&config).unwrap_or_else(|e| {
        error!("Couldn't parse config file: {}", e);
        std::process::exit(1);
    });

    if let Some(port) = args.port {
        config.port = port;
    }

    if let Err(err) = config.validate() {
        error!("Wrong config:\n{}", err);
        std::process::exit(1);
    }

    let config_store = SqliteConfigurationStore::open(config.config_db.clone()).unwrap_or_else(|e| {
        error!("Couldn't open config db: {}", e);
        std::process::exit(1);
    });

    let runtime_store = SqliteRuntimeStore::open(config.runtime_db_path()).unwrap_or_else(|e| {
        error!("Couldn't open runtime db: {}", e);
        std::process::exit(1);
    });

    let hardware = LoopbackHardware::from_seed(&config.hardware);

    info!(
        "Using config db {} and runtime db {}",
        config_store.path().display(),
        runtime_store.path().display()
    );

    let context = ServerContext::new(
        &config,
        Arc::new(config_store),
        Arc::new(runtime_store),
        Arc::new(hardware),
    );

    let server = ThresholdServer::bind(&config, context)
        .await
        .unwrap_or_else(|e| {
            error!("Couldn't bind {}: {}", config.bind_address(), e);
            std::process::exit(1);
        });

    match server.local_addr() {
        Ok(addr) => info!(
            "Threshold server listening on {} (protocol version {})",
            addr, PROTOCOL_VERSION
        ),
        Err(err) => error!("Couldn't read listening address: {}", err),
    }

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Couldn't listen for ctrl-c: {}", err);
            std::future::pending::<()>().await;
        }
        info!("Interrupted by user, stopping server");
    };

    if let Err(err) = server.run_until(shutdown).await {
        error!("Server failed: {}", err);
        std::process::exit(1);
    }
}
