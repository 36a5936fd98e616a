// Shared test helpers
#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use safetytwin_agent::models::*;
use safetytwin_agent::sources::{SourceCollector, SourceError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 2024-03-01T12:00:00Z plus `offset_secs`.
pub fn at(offset_secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(offset_secs)
}

pub fn hardware() -> Hardware {
    Hardware {
        hostname: "node-1".into(),
        platform: "ubuntu".into(),
        platform_version: "22.04".into(),
        kernel_version: "6.5.0".into(),
        os: "linux".into(),
        uptime_secs: 3600,
        cpu: CpuInfo {
            model: "test cpu".into(),
            physical_cores: 4,
            logical_cores: 8,
            usage_percent: 12.5,
            per_cpu: vec![10.0, 15.0],
        },
        memory: MemoryInfo {
            total_bytes: 16 << 30,
            available_bytes: 8 << 30,
            used_bytes: 8 << 30,
            free_bytes: 4 << 30,
            usage_percent: 50.0,
            swap_total_bytes: 0,
            swap_used_bytes: 0,
            swap_percent: 0.0,
        },
        disks: vec![Disk {
            device: "/dev/sda1".into(),
            mountpoint: "/".into(),
            fstype: "ext4".into(),
            total_bytes: 100,
            used_bytes: 40,
            free_bytes: 60,
            usage_percent: 40.0,
        }],
        network: vec![NetworkInterface {
            name: "eth0".into(),
            mac: "00:11:22:33:44:55".into(),
            addresses: vec!["10.0.0.2/24".into()],
            bytes_sent: 1,
            bytes_recv: 2,
            packets_sent: 3,
            packets_recv: 4,
            errors_in: 0,
            errors_out: 0,
        }],
        gpus: vec![],
    }
}

pub fn process(pid: u32, name: &str, cmdline: &[&str]) -> ProcessRecord {
    ProcessRecord {
        pid,
        ppid: Some(1),
        name: name.into(),
        cmdline: cmdline.iter().map(|s| s.to_string()).collect(),
        status: "running".into(),
        username: Some("svc".into()),
        start_time: 1_700_000_000,
        cpu_percent: 1.5,
        memory_percent: 0.5,
        memory: ProcessMemory {
            rss: 1024,
            vms: 4096,
        },
        num_threads: Some(2),
        cwd: Some("/srv".into()),
        environment: vec![],
        open_files: vec![],
        io_counters: Some(IoCounters {
            read_bytes: 10,
            write_bytes: 20,
        }),
        is_related: false,
    }
}

pub fn container(name: &str, image: &str) -> ServiceRecord {
    let mut s = ServiceRecord::new(name, ServiceKind::Docker, "running");
    s.id = Some(format!("{}-id", name));
    s.image = Some(image.into());
    s
}

pub fn snapshot(offset_secs: i64) -> Snapshot {
    let mut llm = process(200, "llama-server", &["./llama-server", "-m", "model.gguf"]);
    llm.is_related = true;
    Snapshot {
        timestamp: at(offset_secs),
        hardware: Some(hardware()),
        processes: vec![process(100, "nginx", &["nginx", "-g", "daemon off;"]), llm],
        services: vec![container("web", "nginx:1.25")],
    }
}

/// Source returning a fixed result and counting calls.
pub struct FakeSource<T> {
    name: &'static str,
    result: Result<T, String>,
    calls: Arc<AtomicUsize>,
}

impl<T> FakeSource<T> {
    pub fn ok(name: &'static str, value: T) -> Self {
        Self {
            name,
            result: Ok(value),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(name: &'static str, error: &str) -> Self {
        Self {
            name,
            result: Err(error.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl<T: Clone + Send + Sync> SourceCollector for FakeSource<T> {
    type Output = T;

    fn name(&self) -> &'static str {
        self.name
    }

    async fn collect(&self) -> Result<T, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone().map_err(SourceError::Unavailable)
    }
}

pub type FakeHardware = FakeSource<Hardware>;
pub type FakeProcesses = FakeSource<Vec<ProcessRecord>>;
pub type FakeServices = FakeSource<Vec<ServiceRecord>>;
