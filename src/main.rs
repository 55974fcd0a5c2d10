mod agent;
mod collectors;
mod config;
mod http;
mod metrics;
mod normalize;
mod store;

use axum::serve;
use clap::Parser;
use config::{Config, DEFAULT_INGEST_SECRET};
use metrics::Metrics;
use std::net::SocketAddr;
use std::sync::Arc;
use store::AgentStore;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fleetd")]
#[command(version)]
struct Cli {
    #[arg(long, default_value = "./config.yaml")]
    config: String,
    #[arg(long)]
    print_default_config: bool,
    #[arg(long)]
    agent: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let cfg = match Config::load_from_file(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let ingest_secret = resolve_ingest_secret(&cfg);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if cli.agent {
        let agent_task = tokio::spawn(agent::run_agent(
            cfg.agent.clone(),
            ingest_secret,
            shutdown_rx.clone(),
        ));

        wait_for_ctrl_c().await;
        let _ = shutdown_tx.send(true);
        let _ = agent_task.await;
        return;
    }

    info!(listen = %cfg.listen, "starting fleetd server");

    let store = Arc::new(AgentStore::new());
    let metrics = match Metrics::new() {
        Ok(m) => m,
        Err(err) => {
            error!(error = %err, "failed to initialize metrics");
            std::process::exit(1);
        }
    };

    let http_task = {
        let cfg = cfg.clone();
        let metrics = metrics.clone();
        let store = store.clone();
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let app = http::build_router(metrics, store, ingest_secret);
            let addr: SocketAddr = match cfg.listen.parse() {
                Ok(addr) => addr,
                Err(err) => {
                    error!(error = %err, listen = %cfg.listen, "listen address is not valid");
                    return;
                }
            };

            let listener = match TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(err) => {
                    error!(error = %err, "failed to start the HTTP server");
                    return;
                }
            };

            let server = serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            });

            if let Err(err) = server.await {
                error!(error = %err, "HTTP server error");
            }
        })
    };

    wait_for_ctrl_c().await;
    let _ = shutdown_tx.send(true);
    let _ = http_task.await;
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn wait_for_ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to wait for Ctrl+C");
    }
    info!("Ctrl+C received, shutting down");
}

fn resolve_secret_from_env(env_name: &str) -> Option<String> {
    if let Ok(v) = std::env::var(env_name) {
        if !v.trim().is_empty() {
            return Some(v);
        }
    }
    None
}

fn resolve_ingest_secret(cfg: &Config) -> String {
    if let Some(v) = resolve_secret_from_env(&cfg.ingest_secret_env) {
        return v;
    }

    let inline = cfg
        .ingest_secret
        .as_ref()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    if let Some(v) = inline {
        return v;
    }

    warn!(
        env = %cfg.ingest_secret_env,
        "no ingest secret configured, falling back to the insecure default"
    );
    DEFAULT_INGEST_SECRET.to_string()
}
