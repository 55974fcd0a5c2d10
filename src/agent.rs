use crate::collectors::system::collect_host;
use crate::config::AgentConfig;
use crate::store::{DiskUsage, EventEntry, MemoryUsage, ProcessInfo};
use reqwest::Client;
use std::time::{Duration, SystemTime};
use sysinfo::{System, SystemExt};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, serde::Serialize)]
struct ReportPayload {
    agent_id: String,
    hostname: Option<String>,
    collected_at: String,
    metrics: ReportMetrics,
    processes: Vec<ProcessInfo>,
    events: Vec<EventEntry>,
}

#[derive(Debug, serde::Serialize)]
struct ReportMetrics {
    cpu_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    memory: Option<MemoryUsage>,
    disks: Vec<DiskUsage>,
}

pub async fn run_agent(cfg: AgentConfig, secret: String, mut shutdown: watch::Receiver<bool>) {
    let client = Client::builder()
        .user_agent("fleetd/0.1.0")
        .build()
        .unwrap_or_else(|_| Client::new());
    let mut system = System::new_all();
    let mut ticker = tokio::time::interval(Duration::from_secs(cfg.interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        server_url = %cfg.server_url,
        interval_secs = cfg.interval_secs,
        "reporting agent started"
    );

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("shutdown signal received, stopping agent loop");
                break;
            }
            _ = ticker.tick() => {
                let snapshot = collect_host(&mut system, cfg.max_processes, cfg.max_events);
                let agent_id = cfg
                    .agent_id
                    .clone()
                    .or_else(|| snapshot.host_name.clone())
                    .unwrap_or_else(|| "unknown-host".to_string());

                let payload = ReportPayload {
                    agent_id,
                    hostname: snapshot.host_name,
                    collected_at: humantime::format_rfc3339_seconds(SystemTime::now())
                        .to_string(),
                    metrics: ReportMetrics {
                        cpu_percent: snapshot.cpu_percent,
                        memory: snapshot.memory,
                        disks: snapshot.disks,
                    },
                    processes: snapshot.processes,
                    events: snapshot.events,
                };

                let response = client
                    .post(&cfg.server_url)
                    .header(crate::http::INGEST_SECRET_HEADER, secret.as_str())
                    .timeout(Duration::from_secs(10))
                    .json(&payload)
                    .send()
                    .await;

                match response {
                    Ok(resp) if resp.status().is_success() => {
                        debug!(agent = %payload.agent_id, "report delivered");
                    }
                    Ok(resp) => {
                        warn!(
                            status = resp.status().as_u16(),
                            url = %cfg.server_url,
                            "server rejected report"
                        );
                    }
                    Err(err) => {
                        warn!(error = %err, url = %cfg.server_url, "report delivery failed");
                    }
                }
            }
        }
    }
}
