use crate::store::StoreStats;
use prometheus::core::Collector;
use prometheus::{opts, Counter, CounterVec, Encoder, Gauge, Registry, TextEncoder};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    started_at_unix: i64,
    pub fleetd_ingest_requests_total: CounterVec,
    pub fleetd_ingest_samples_total: Counter,
    pub fleetd_agents_tracked: Gauge,
    pub fleetd_samples_stored: Gauge,
    pub fleetd_last_ingest_timestamp_seconds: Gauge,
    pub fleetd_uptime_seconds: Gauge,
    pub fleetd_scrape_count_total: Counter,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let fleetd_ingest_requests_total = CounterVec::new(
            opts!(
                "fleetd_ingest_requests_total",
                "Ingest requests total by outcome"
            ),
            &["outcome"],
        )?;
        let fleetd_ingest_samples_total = Counter::with_opts(opts!(
            "fleetd_ingest_samples_total",
            "Accepted telemetry samples total"
        ))?;
        let fleetd_agents_tracked = Gauge::with_opts(opts!(
            "fleetd_agents_tracked",
            "Number of distinct agents in the store"
        ))?;
        let fleetd_samples_stored = Gauge::with_opts(opts!(
            "fleetd_samples_stored",
            "Number of samples currently retained across all agents"
        ))?;
        let fleetd_last_ingest_timestamp_seconds = Gauge::with_opts(opts!(
            "fleetd_last_ingest_timestamp_seconds",
            "Unix timestamp of the last accepted ingest"
        ))?;
        let fleetd_uptime_seconds =
            Gauge::with_opts(opts!("fleetd_uptime_seconds", "Server uptime in seconds"))?;
        let fleetd_scrape_count_total = Counter::with_opts(opts!(
            "fleetd_scrape_count_total",
            "Number of /metrics scrapes"
        ))?;

        register(&registry, &fleetd_ingest_requests_total)?;
        register(&registry, &fleetd_ingest_samples_total)?;
        register(&registry, &fleetd_agents_tracked)?;
        register(&registry, &fleetd_samples_stored)?;
        register(&registry, &fleetd_last_ingest_timestamp_seconds)?;
        register(&registry, &fleetd_uptime_seconds)?;
        register(&registry, &fleetd_scrape_count_total)?;

        Ok(Arc::new(Self {
            registry,
            started_at_unix: now_unix(),
            fleetd_ingest_requests_total,
            fleetd_ingest_samples_total,
            fleetd_agents_tracked,
            fleetd_samples_stored,
            fleetd_last_ingest_timestamp_seconds,
            fleetd_uptime_seconds,
            fleetd_scrape_count_total,
        }))
    }

    pub fn observe_ingest(&self, outcome: &str) {
        self.fleetd_ingest_requests_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn inc_samples_stored(&self) {
        self.fleetd_ingest_samples_total.inc();
    }

    pub fn set_last_ingest(&self, ts_unix: i64) {
        self.fleetd_last_ingest_timestamp_seconds.set(ts_unix as f64);
    }

    pub fn update_gauges(&self, stats: &StoreStats) {
        self.fleetd_agents_tracked.set(stats.agents as f64);
        self.fleetd_samples_stored.set(stats.samples as f64);
        let uptime = now_unix().saturating_sub(self.started_at_unix) as f64;
        self.fleetd_uptime_seconds.set(uptime);
    }

    pub fn inc_scrape_count(&self) {
        self.fleetd_scrape_count_total.inc();
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
