use crate::store::{AgentIdentity, DiskUsage, EventEntry, MemoryUsage, ProcessInfo, Sample};
use serde_json::Value;
use std::time::UNIX_EPOCH;

pub const MAX_EVENT_MESSAGE_CHARS: usize = 4000;

#[derive(Debug, Clone)]
pub struct NormalizedPayload {
    pub identity: AgentIdentity,
    pub sample: Sample,
}

// Returns None only when the payload carries no usable agent identifier.
// Every other malformed field degrades to absent instead of failing the
// whole request.
pub fn normalize_payload(payload: &Value, now_unix: i64) -> Option<NormalizedPayload> {
    let agent_id = ["agent_id", "agentId", "hostname"]
        .into_iter()
        .find_map(|key| payload.get(key).and_then(coerce_string))?;

    let identity = AgentIdentity {
        agent_id,
        hostname: payload.get("hostname").and_then(coerce_string),
        ip: payload.get("ip").and_then(coerce_string),
    };

    let metrics = payload.get("metrics");
    let sample = Sample {
        collected_at_unix: parse_collected_at(payload.get("collected_at"), now_unix),
        cpu_percent: metrics
            .and_then(|m| m.get("cpu_percent"))
            .and_then(coerce_number),
        memory: metrics.and_then(|m| m.get("memory")).and_then(normalize_memory),
        disks: normalize_disk_list(metrics.and_then(|m| m.get("disks"))),
        processes: normalize_process_list(payload.get("processes")),
        events: normalize_event_list(payload.get("events")),
    };

    Some(NormalizedPayload { identity, sample })
}

pub fn coerce_number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

pub fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        _ => None,
    }
}

fn coerce_bytes(value: &Value) -> Option<u64> {
    coerce_number(value).filter(|v| *v >= 0.0).map(|v| v as u64)
}

fn parse_collected_at(value: Option<&Value>, now_unix: i64) -> i64 {
    value
        .and_then(coerce_string)
        // The weak form also accepts a space separator and a missing zone.
        .and_then(|s| humantime::parse_rfc3339_weak(&s).ok())
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(now_unix)
}

fn normalize_memory(value: &Value) -> Option<MemoryUsage> {
    let total_bytes = coerce_bytes(value.get("total_bytes")?)?;
    let used_bytes = coerce_bytes(value.get("used_bytes")?)?;
    Some(MemoryUsage {
        total_bytes,
        used_bytes,
    })
}

pub fn normalize_disk_list(value: Option<&Value>) -> Vec<DiskUsage> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items.iter().filter_map(normalize_disk).collect()
}

fn normalize_disk(item: &Value) -> Option<DiskUsage> {
    let device = coerce_string(item.get("device")?)?;
    let total_bytes = coerce_bytes(item.get("total_bytes")?)?;
    let free_bytes = coerce_bytes(item.get("free_bytes")?)?;
    Some(DiskUsage {
        device,
        total_bytes,
        free_bytes,
    })
}

pub fn normalize_process_list(value: Option<&Value>) -> Vec<ProcessInfo> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items.iter().filter_map(normalize_process).collect()
}

fn normalize_process(item: &Value) -> Option<ProcessInfo> {
    let pid = coerce_number(item.get("pid")?)? as i64;
    let name = coerce_string(item.get("name")?)?;
    Some(ProcessInfo {
        pid,
        name,
        cpu_percent: item.get("cpu_percent").and_then(coerce_number),
        memory_mb: item.get("memory_mb").and_then(coerce_number),
    })
}

pub fn normalize_event_list(value: Option<&Value>) -> Vec<EventEntry> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items.iter().filter_map(normalize_event).collect()
}

fn normalize_event(item: &Value) -> Option<EventEntry> {
    if !item.is_object() {
        return None;
    }
    Some(EventEntry {
        id: item.get("id").and_then(coerce_string),
        level: item.get("level").and_then(coerce_string),
        timestamp: item.get("timestamp").and_then(coerce_string),
        source: item.get("source").and_then(coerce_string),
        message: item
            .get("message")
            .and_then(coerce_string)
            .map(truncate_message),
    })
}

fn truncate_message(message: String) -> String {
    if message.chars().count() <= MAX_EVENT_MESSAGE_CHARS {
        return message;
    }
    message.chars().take(MAX_EVENT_MESSAGE_CHARS).collect()
}
