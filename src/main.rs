//! # Walrus Server
//!
//! Serves the `walrus.seal.io/v1` extension API over Namespaces, Secrets and
//! RBAC objects of a Kubernetes cluster, and optionally runs the walruscore
//! controllers next to it.
//!
//! ## Usage
//!
//! ```bash
//! # Against the cluster of the current kubeconfig context
//! walrus-server --serve-address 0.0.0.0:8080
//!
//! # Without a cluster, over in-memory stores
//! walrus-server --in-memory --log-format text
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use kube::Client;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use walrus::client::{AlignRetry, Clients};
use walrus::config::ServerConfig;
use walrus::context::AppContext;
use walrus::server::{start_server, ServerState};
use walrus::systemsetting::SettingRegistry;
use walrus::{controllers, extensionapis, observability};

/// Walrus extension API server
#[derive(Debug, Parser)]
#[command(name = "walrus-server", version, about)]
struct Args {
    /// Address the HTTP server binds to
    #[arg(long)]
    serve_address: Option<String>,

    /// Namespace holding Projects, Settings and global Variables
    #[arg(long)]
    system_namespace: Option<String>,

    /// Log level (ERROR, WARN, INFO, DEBUG, TRACE)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    log_format: Option<String>,

    /// Directory of FileExample YAML documents
    #[arg(long)]
    file_examples_dir: Option<PathBuf>,

    /// Run the walruscore controllers
    #[arg(long)]
    enable_controllers: Option<bool>,

    /// Serve from in-memory stores instead of a cluster
    #[arg(long)]
    in_memory: bool,
}

impl Args {
    fn apply(&self, mut config: ServerConfig) -> ServerConfig {
        if let Some(v) = &self.serve_address {
            config.serve_address.clone_from(v);
        }
        if let Some(v) = &self.system_namespace {
            config.system_namespace.clone_from(v);
        }
        if let Some(v) = &self.log_level {
            config.log_level.clone_from(v);
        }
        if let Some(v) = &self.log_format {
            config.log_format.clone_from(v);
        }
        if let Some(v) = &self.file_examples_dir {
            config.file_examples_dir = Some(v.clone());
        }
        if let Some(v) = self.enable_controllers {
            config.enable_controllers = v;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Configure rustls crypto provider before any Kubernetes connection
    let provider_installed = rustls::crypto::ring::default_provider()
        .install_default()
        .is_ok();

    let args = Args::parse();
    let config = args.apply(ServerConfig::from_env());
    observability::init_tracing(&config);
    if !provider_installed {
        warn!("rustls crypto provider already installed");
    }

    info!("Starting Walrus server v{}", env!("CARGO_PKG_VERSION"));
    observability::metrics::register_metrics()?;

    let (ctx, cluster) = if args.in_memory {
        info!("serving from in-memory stores");
        (AppContext::in_memory(config), None)
    } else {
        let client = Client::try_default()
            .await
            .context("Failed to create Kubernetes client")?;
        let clients = Clients::kube(client.clone(), AlignRetry::from(&config));
        (AppContext::new(config, clients, SettingRegistry::builtin()), Some(client))
    };
    ctx.bootstrap().await.context("Failed to bootstrap system namespace")?;

    let api = extensionapis::setup(&ctx.setup_options()).context("Failed to set up extension APIs")?;
    let shutdown = CancellationToken::new();
    let server_state = Arc::new(ServerState::new(api, shutdown.clone()));

    let server_address = ctx.config.serve_address.clone();
    let server_state_clone = Arc::clone(&server_state);
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(&server_address, server_state_clone).await {
            error!("HTTP server error: {:#}", e);
        }
    });
    server_state.is_ready.store(true, Ordering::Relaxed);

    let controllers_handle = match cluster {
        Some(client) if ctx.config.enable_controllers => {
            Some(tokio::spawn(controllers::run(client, ctx.config.clone())))
        }
        _ => None,
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("shutting down");
    server_state.is_ready.store(false, Ordering::Relaxed);
    shutdown.cancel();

    if let Err(e) = server_handle.await {
        warn!("HTTP server task failed: {}", e);
    }
    if let Some(handle) = controllers_handle {
        if let Err(e) = handle.await {
            warn!("controllers task failed: {}", e);
        }
    }
    info!("Walrus server stopped");
    Ok(())
}
