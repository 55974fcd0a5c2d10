pub mod system;

use crate::store::{DiskUsage, EventEntry, MemoryUsage, ProcessInfo};

#[derive(Debug, Clone)]
pub struct HostSnapshot {
    pub host_name: Option<String>,
    pub cpu_percent: f64,
    pub memory: Option<MemoryUsage>,
    pub disks: Vec<DiskUsage>,
    pub processes: Vec<ProcessInfo>,
    pub events: Vec<EventEntry>,
}
