// src/main.rs

//! The main entry point for the amfd director.

use amfd::config::Config;
use amfd::server;
use anyhow::Result;
use std::env;
use tracing::error;
use tracing_subscriber::filter::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    run_app().await
}

async fn run_app() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("amfd version {VERSION}");
        return Ok(());
    }

    // Determine the configuration path. It can be provided via a --config
    // flag; otherwise defaults are used when no file exists.
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let mut config = match config_path {
        Some(path) => match Config::from_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load configuration from \"{path}\": {e}");
                std::process::exit(1);
            }
        },
        None => {
            let mut cfg = Config::default();
            cfg.apply_env_fallbacks();
            cfg
        }
    };

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .compact()
        .with_ansi(true)
        .init();

    // --import runs the file through the live CCB validation path and exits.
    if let Some(i) = args.iter().position(|arg| arg == "--import") {
        let Some(file) = args.get(i + 1) else {
            eprintln!("Usage: amfd --import /path/to/model.xml");
            std::process::exit(1);
        };
        config.model_file = Some(file.clone());
        return import_and_exit(config).await;
    }

    // --admin <dn> <opId> boots the configured model and invokes one
    // operation.
    if let Some(i) = args.iter().position(|arg| arg == "--admin") {
        let (Some(dn), Some(op)) = (args.get(i + 1), args.get(i + 2)) else {
            eprintln!("Usage: amfd --admin <object-dn> <numeric-op-id>");
            std::process::exit(1);
        };
        return admin_and_exit(config, dn, op).await;
    }

    if let Err(e) = server::run(config).await {
        error!("Server runtime error: {}", e);
        return Err(e);
    }
    Ok(())
}

async fn import_and_exit(config: Config) -> Result<()> {
    use amfd::core::alarm::AlarmService;
    use amfd::core::bus::local::LocalBus;
    use amfd::core::imm::store::ObjectStore;
    use std::sync::Arc;
    use tokio::sync::broadcast;

    let bus: Arc<dyn amfd::core::bus::MessageBus> = Arc::new(LocalBus::new());
    let store = Arc::new(ObjectStore::new());
    let path = config.model_file.clone().expect("import path set above");
    let count = server::preload_model(&store, &path)?;
    let (shutdown_tx, _) = broadcast::channel(1);
    let (_handle, _tasks) = server::spawn_director(
        config,
        bus,
        store,
        AlarmService::new(),
        &shutdown_tx,
    )
    .await?;
    println!("Imported {count} objects from {path}");
    let _ = shutdown_tx.send(());
    Ok(())
}

async fn admin_and_exit(config: Config, dn: &str, op: &str) -> Result<()> {
    use amfd::core::admin::AdminOpId;
    use amfd::core::alarm::AlarmService;
    use amfd::core::bus::local::LocalBus;
    use amfd::core::imm::store::ObjectStore;
    use amfd::core::model::dn::Dn;
    use std::sync::Arc;
    use tokio::sync::broadcast;

    let code: u32 = op.parse()?;
    let op = AdminOpId::from_op_code(code)
        .ok_or_else(|| anyhow::anyhow!("unknown admin operation id {code}"))?;
    let target = Dn::new(dn).map_err(|e| anyhow::anyhow!(e))?;

    let bus: Arc<dyn amfd::core::bus::MessageBus> = Arc::new(LocalBus::new());
    let store = Arc::new(ObjectStore::new());
    if let Some(path) = &config.model_file {
        server::preload_model(&store, path)?;
    }
    let (shutdown_tx, _) = broadcast::channel(1);
    let node = Dn::new(config.node_name.clone()).map_err(|e| anyhow::anyhow!(e))?;
    let (handle, _tasks) = server::spawn_director(
        config,
        bus.clone(),
        store,
        AlarmService::new(),
        &shutdown_tx,
    )
    .await?;
    amfd::core::avnd::spawn_node_director(node, bus, shutdown_tx.subscribe()).await?;

    match handle.admin(target, op).await {
        Ok(()) => println!("Admin operation {op} completed"),
        Err(e) => {
            eprintln!("Admin operation failed: {e}");
            std::process::exit(1);
        }
    }
    let _ = shutdown_tx.send(());
    Ok(())
}
