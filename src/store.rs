use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

pub const RETENTION_CAPACITY: usize = 60;

#[derive(Debug, Clone, Default)]
pub struct AgentIdentity {
    pub agent_id: String,
    pub hostname: Option<String>,
    pub ip: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AgentRecord {
    pub agent_id: String,
    pub hostname: Option<String>,
    pub ip: Option<String>,
    pub last_seen_unix: i64,
    pub samples: VecDeque<Sample>,
}

#[derive(Debug, Clone)]
pub struct Sample {
    pub collected_at_unix: i64,
    pub cpu_percent: Option<f64>,
    pub memory: Option<MemoryUsage>,
    pub disks: Vec<DiskUsage>,
    pub processes: Vec<ProcessInfo>,
    pub events: Vec<EventEntry>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MemoryUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DiskUsage {
    pub device: String,
    pub total_bytes: u64,
    pub free_bytes: u64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ProcessInfo {
    pub pid: i64,
    pub name: String,
    pub cpu_percent: Option<f64>,
    pub memory_mb: Option<f64>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct EventEntry {
    pub id: Option<String>,
    pub level: Option<String>,
    pub timestamp: Option<String>,
    pub source: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct StoreStats {
    pub agents: usize,
    pub samples: usize,
}

impl AgentRecord {
    fn new(agent_id: String) -> Self {
        Self {
            agent_id,
            hostname: None,
            ip: None,
            last_seen_unix: 0,
            samples: VecDeque::with_capacity(RETENTION_CAPACITY),
        }
    }
}

#[derive(Default)]
pub struct AgentStore {
    records: RwLock<HashMap<String, AgentRecord>>,
}

impl AgentStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    pub async fn upsert(&self, identity: AgentIdentity, sample: Sample) {
        let AgentIdentity {
            agent_id,
            hostname,
            ip,
        } = identity;

        let mut records = self.records.write().await;
        let record = records
            .entry(agent_id.clone())
            .or_insert_with(|| AgentRecord::new(agent_id));

        if hostname.is_some() {
            record.hostname = hostname;
        }
        if ip.is_some() {
            record.ip = ip;
        }
        record.last_seen_unix = sample.collected_at_unix;
        // Samples are kept in arrival order: a late sample with an older
        // collected_at still lands at the front.
        record.samples.push_front(sample);
        record.samples.truncate(RETENTION_CAPACITY);
    }

    pub async fn snapshot(&self) -> Vec<AgentRecord> {
        let records = self.records.read().await;
        let mut out: Vec<AgentRecord> = records.values().cloned().collect();
        out.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        out
    }

    pub async fn stats(&self) -> StoreStats {
        let records = self.records.read().await;
        StoreStats {
            agents: records.len(),
            samples: records.values().map(|r| r.samples.len()).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn identity(agent_id: &str) -> AgentIdentity {
        AgentIdentity {
            agent_id: agent_id.to_string(),
            hostname: None,
            ip: None,
        }
    }

    fn sample_at(ts: i64) -> Sample {
        Sample {
            collected_at_unix: ts,
            cpu_percent: None,
            memory: None,
            disks: Vec::new(),
            processes: Vec::new(),
            events: Vec::new(),
        }
    }

    #[tokio::test]
    async fn upsert_creates_record_and_tracks_last_seen() {
        let store = AgentStore::new();
        let mut who = identity("web-01");
        who.hostname = Some("web-01.lan".to_string());
        store.upsert(who, sample_at(100)).await;

        let records = store.snapshot().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].agent_id, "web-01");
        assert_eq!(records[0].hostname.as_deref(), Some("web-01.lan"));
        assert_eq!(records[0].last_seen_unix, 100);
        assert_eq!(records[0].samples.len(), 1);
        assert_eq!(records[0].samples[0].collected_at_unix, 100);
    }

    #[tokio::test]
    async fn retention_keeps_newest_sixty_samples() {
        let store = AgentStore::new();
        for ts in 1..=61 {
            store.upsert(identity("h2"), sample_at(ts)).await;
        }

        let records = store.snapshot().await;
        assert_eq!(records[0].samples.len(), RETENTION_CAPACITY);
        assert_eq!(records[0].samples[0].collected_at_unix, 61);
        assert_eq!(
            records[0].samples[RETENTION_CAPACITY - 1].collected_at_unix,
            2,
            "the oldest of the 61 samples must be evicted"
        );
    }

    #[tokio::test]
    async fn samples_keep_arrival_order_not_collected_at_order() {
        let store = AgentStore::new();
        store.upsert(identity("h3"), sample_at(50)).await;
        store.upsert(identity("h3"), sample_at(10)).await;

        let records = store.snapshot().await;
        assert_eq!(records[0].samples[0].collected_at_unix, 10);
        assert_eq!(records[0].samples[1].collected_at_unix, 50);
        assert_eq!(records[0].last_seen_unix, 10);
    }

    #[tokio::test]
    async fn identity_fields_are_sticky() {
        let store = AgentStore::new();
        let mut who = identity("db-01");
        who.hostname = Some("db-01.lan".to_string());
        who.ip = Some("10.0.0.5".to_string());
        store.upsert(who, sample_at(1)).await;

        store.upsert(identity("db-01"), sample_at(2)).await;
        let records = store.snapshot().await;
        assert_eq!(records[0].hostname.as_deref(), Some("db-01.lan"));
        assert_eq!(records[0].ip.as_deref(), Some("10.0.0.5"));

        let mut renamed = identity("db-01");
        renamed.hostname = Some("db-01.internal".to_string());
        store.upsert(renamed, sample_at(3)).await;
        let records = store.snapshot().await;
        assert_eq!(records[0].hostname.as_deref(), Some("db-01.internal"));
        assert_eq!(records[0].ip.as_deref(), Some("10.0.0.5"));
    }

    #[tokio::test]
    async fn snapshot_is_an_isolated_copy() {
        let store = AgentStore::new();
        store.upsert(identity("h1"), sample_at(1)).await;

        let before = store.snapshot().await;
        store.upsert(identity("h1"), sample_at(2)).await;

        assert_eq!(before[0].samples.len(), 1);
        assert_eq!(store.snapshot().await[0].samples.len(), 2);
    }

    #[tokio::test]
    async fn snapshot_is_sorted_by_agent_id() {
        let store = AgentStore::new();
        store.upsert(identity("bravo"), sample_at(1)).await;
        store.upsert(identity("alpha"), sample_at(1)).await;
        store.upsert(identity("charlie"), sample_at(1)).await;

        let records = store.snapshot().await;
        let ids: Vec<&str> = records.iter().map(|r| r.agent_id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "bravo", "charlie"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_upserts_do_not_lose_writes() {
        let store = Arc::new(AgentStore::new());
        let mut tasks = Vec::new();
        for agent in 0..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                for ts in 0..10 {
                    store
                        .upsert(identity(&format!("agent-{agent}")), sample_at(ts))
                        .await;
                }
            }));
        }
        for task in tasks {
            task.await.expect("upsert task");
        }

        let stats = store.stats().await;
        assert_eq!(stats.agents, 8);
        assert_eq!(stats.samples, 80);
    }
}
