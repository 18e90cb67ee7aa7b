use clap::Parser;
use eap_aka_server::{
    AkaEngine, AuditEntry, AuditEventType, AuditLogger, Config, EapServer, SessionRegistry,
    StaticVectorSource,
};
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// EAP-AKA / EAP-AKA' authentication server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "eap-aka-server")]
struct Cli {
    /// Path to configuration file
    #[arg(value_name = "CONFIG", default_value = "config.json")]
    config_path: String,

    /// Validate configuration and exit (doesn't start server)
    #[arg(short, long)]
    validate: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load or create configuration (without logging first)
    let config = match Config::from_file(&cli.config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing_subscriber::registry()
                .with(EnvFilter::new("info"))
                .with(tracing_subscriber::fmt::layer())
                .init();

            if cli.validate {
                eprintln!("Configuration validation failed: {}", e);
                process::exit(1);
            }

            warn!("Could not load config file from {}: {}", cli.config_path, e);
            if std::path::Path::new(&cli.config_path).exists() {
                process::exit(1);
            }

            info!("Creating example configuration at: {}", cli.config_path);
            if let Err(e) = Config::example().to_file(&cli.config_path) {
                error!("Error creating example config: {}", e);
                process::exit(1);
            }

            info!("Please edit {} and restart the server", cli.config_path);
            process::exit(0);
        }
    };

    if cli.validate {
        println!("Configuration validated successfully");
        println!();
        println!("  Listen: {}:{}", config.listen_address, config.listen_port);
        println!("  Methods: {:?}", config.methods);
        println!("  Access network: {}", config.access_network_name);
        if config.plmn_ids.is_empty() {
            println!("  PLMNs: any");
        } else {
            println!("  PLMNs: {}", config.plmn_ids.join(", "));
        }
        println!("  Subscribers: {}", config.subscribers.len());
        println!("  Log level: {}", config.log_level.as_deref().unwrap_or("info"));
        if let Some(ref path) = config.audit_log_path {
            println!("  Audit log: {}", path);
        }
        process::exit(0);
    }

    let log_level = config.log_level.as_deref().unwrap_or("info");
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("EAP-AKA server v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded configuration from: {}", cli.config_path);

    if config.plmn_ids.is_empty() {
        warn!("No PLMN IDs configured, every home network is accepted");
    }

    let vectors = match StaticVectorSource::from_config(&config.subscribers) {
        Ok(source) => source,
        Err(e) => {
            error!("Invalid subscriber configuration: {}", e);
            process::exit(1);
        }
    };
    info!("Provisioned {} subscribers", vectors.len());

    let audit = match AuditLogger::new(config.audit_log_path.clone()) {
        Ok(logger) => Arc::new(logger),
        Err(e) => {
            error!("Failed to open audit log: {}", e);
            process::exit(1);
        }
    };
    if let Some(path) = audit.file_path() {
        info!("Audit logging enabled: {}", path);
    }

    let engine = AkaEngine::new(&config, SessionRegistry::new(), Arc::new(vectors))
        .with_audit(Arc::clone(&audit));

    let bind_addr = match config.socket_addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Invalid listen address: {}", e);
            process::exit(1);
        }
    };

    let server = match EapServer::new(bind_addr, Arc::new(engine)).await {
        Ok(srv) => srv,
        Err(e) => {
            error!("Failed to create server: {}", e);
            process::exit(1);
        }
    };

    audit
        .log(AuditEntry::new(AuditEventType::ServerStart).with_details(bind_addr.to_string()))
        .await;
    info!("Server started, press Ctrl+C to stop");

    let result = tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    };

    audit.log(AuditEntry::new(AuditEventType::ServerStop)).await;

    if let Err(e) = result {
        error!("Server error: {}", e);
        process::exit(1);
    }
}
