use crate::collectors::HostSnapshot;
use crate::store::{DiskUsage, EventEntry, MemoryUsage, ProcessInfo};
use sysinfo::{CpuExt, DiskExt, PidExt, ProcessExt, System, SystemExt};

pub fn collect_host(system: &mut System, max_processes: usize, max_events: usize) -> HostSnapshot {
    system.refresh_cpu();
    system.refresh_memory();
    system.refresh_processes();
    system.refresh_disks_list();
    system.refresh_disks();

    let host_name = system.host_name();

    let cpu_percent = if system.cpus().is_empty() {
        0.0
    } else {
        let sum: f32 = system.cpus().iter().map(|c| c.cpu_usage()).sum();
        (sum / system.cpus().len() as f32) as f64
    };

    // sysinfo 0.29 reports memory in bytes.
    let total_bytes = system.total_memory();
    let used_bytes = system.used_memory();
    let memory = (total_bytes > 0).then_some(MemoryUsage {
        total_bytes,
        used_bytes,
    });

    let disks: Vec<DiskUsage> = system
        .disks()
        .iter()
        .map(|d| {
            let name = d.name().to_string_lossy().to_string();
            let device = if name.is_empty() {
                d.mount_point().to_string_lossy().to_string()
            } else {
                name
            };
            DiskUsage {
                device,
                total_bytes: d.total_space(),
                free_bytes: d.available_space(),
            }
        })
        .collect();

    let mut processes: Vec<ProcessInfo> = system
        .processes()
        .values()
        .map(|p| ProcessInfo {
            pid: p.pid().as_u32() as i64,
            name: p.name().to_string(),
            cpu_percent: Some(p.cpu_usage() as f64),
            memory_mb: Some(p.memory() as f64 / (1024.0 * 1024.0)),
        })
        .collect();
    processes.sort_by(|a, b| {
        b.cpu_percent
            .unwrap_or(0.0)
            .total_cmp(&a.cpu_percent.unwrap_or(0.0))
    });
    processes.truncate(max_processes);

    HostSnapshot {
        host_name,
        cpu_percent,
        memory,
        disks,
        processes,
        events: collect_events(max_events),
    }
}

#[cfg(target_os = "windows")]
fn collect_events(max_events: usize) -> Vec<EventEntry> {
    let script = format!(
        "Get-WinEvent -LogName System -MaxEvents {max_events} | \
         Select-Object TimeCreated,Id,LevelDisplayName,ProviderName,Message | \
         ConvertTo-Json -Depth 4"
    );
    let Some(output) = run_powershell(&script) else {
        tracing::warn!("event log collection skipped: powershell unavailable");
        return Vec::new();
    };
    if !output.status.success() {
        tracing::warn!("event log collection skipped: Get-WinEvent failed");
        return Vec::new();
    }

    parse_winevent_json(&decode_cmd_stdout(&output.stdout))
}

#[cfg(not(target_os = "windows"))]
fn collect_events(_max_events: usize) -> Vec<EventEntry> {
    Vec::new()
}

// ConvertTo-Json emits a bare object for a single event and an array
// otherwise; accept both.
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn parse_winevent_json(text: &str) -> Vec<EventEntry> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
        return Vec::new();
    };

    let events: Vec<&serde_json::Value> = match &value {
        serde_json::Value::Object(_) => vec![&value],
        serde_json::Value::Array(items) => items.iter().collect(),
        _ => return Vec::new(),
    };

    events
        .into_iter()
        .map(|event| EventEntry {
            id: match &event["Id"] {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            },
            level: event["LevelDisplayName"].as_str().map(str::to_string),
            timestamp: event["TimeCreated"].as_str().map(str::to_string),
            source: event["ProviderName"].as_str().map(str::to_string),
            message: event["Message"].as_str().map(str::to_string),
        })
        .collect()
}

#[cfg(target_os = "windows")]
fn run_powershell(script: &str) -> Option<std::process::Output> {
    use std::process::Command;

    let wrapped = format!(
        "[Console]::OutputEncoding=[System.Text.UTF8Encoding]::new($false); {script}"
    );
    if let Ok(output) = Command::new("powershell")
        .args(["-NoProfile", "-Command", &wrapped])
        .output()
    {
        return Some(output);
    }

    Command::new(r"C:\Windows\System32\WindowsPowerShell\v1.0\powershell.exe")
        .args(["-NoProfile", "-Command", &wrapped])
        .output()
        .ok()
}

#[cfg(target_os = "windows")]
fn decode_cmd_stdout(bytes: &[u8]) -> String {
    if let Ok(utf8) = std::str::from_utf8(bytes) {
        return utf8.to_string();
    }
    String::from_utf8_lossy(bytes).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn winevent_json_accepts_single_object_and_array() {
        let single = r#"{"TimeCreated":"2024-01-01T00:00:00Z","Id":7001,"LevelDisplayName":"Information","ProviderName":"Service Control Manager","Message":"started"}"#;
        let events = parse_winevent_json(single);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id.as_deref(), Some("7001"));
        assert_eq!(events[0].level.as_deref(), Some("Information"));
        assert_eq!(events[0].source.as_deref(), Some("Service Control Manager"));

        let array = r#"[{"Id":"1"},{"Id":2}]"#;
        let events = parse_winevent_json(array);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id.as_deref(), Some("1"));
        assert_eq!(events[1].id.as_deref(), Some("2"));
    }

    #[test]
    fn winevent_json_tolerates_garbage_output() {
        assert!(parse_winevent_json("not json").is_empty());
        assert!(parse_winevent_json("42").is_empty());
        assert!(parse_winevent_json("").is_empty());
    }
}
