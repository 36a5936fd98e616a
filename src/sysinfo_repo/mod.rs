// Host and process facts via sysinfo

pub mod gpu;
mod linux;

use crate::models::*;
use crate::sources::SourceError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use sysinfo::{Disks, Networks, ProcessRefreshKind, ProcessesToUpdate, System, Users};
use tracing::instrument;

/// Upper bound on open file paths recorded per process.
pub const MAX_OPEN_FILES: usize = 64;

/// Resource usage of one pid, used to enrich service manager records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessUsage {
    pub command: String,
    pub cpu_percent: f64,
    pub memory_bytes: u64,
}

pub struct SysinfoRepo {
    sys: Arc<Mutex<System>>,
    disks: Arc<Mutex<Disks>>,
    networks: Arc<Mutex<Networks>>,
    users: Arc<Mutex<Users>>,
}

impl Default for SysinfoRepo {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(what: &str, e: std::sync::PoisonError<T>) -> SourceError {
    SourceError::Task(format!("sysinfo {} lock poisoned: {}", what, e))
}

fn join_error(e: tokio::task::JoinError) -> SourceError {
    SourceError::Task(format!("sysinfo task join: {}", e))
}

fn percent(part: u64, total: u64) -> f64 {
    if total > 0 {
        (part as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}

impl SysinfoRepo {
    pub fn new() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();
        Self {
            sys: Arc::new(Mutex::new(sys)),
            disks: Arc::new(Mutex::new(Disks::new_with_refreshed_list())),
            networks: Arc::new(Mutex::new(Networks::new_with_refreshed_list())),
            users: Arc::new(Mutex::new(Users::new_with_refreshed_list())),
        }
    }

    /// Host identity, CPU, memory, disks and interfaces. GPUs are filled in
    /// separately by the hardware source.
    #[instrument(skip(self), fields(repo = "sysinfo", operation = "get_hardware"))]
    pub async fn get_hardware(&self) -> Result<Hardware, SourceError> {
        let sys = self.sys.clone();
        let disks = self.disks.clone();
        let networks = self.networks.clone();
        tokio::task::spawn_blocking(move || {
            let mut sys = sys.lock().map_err(|e| poisoned("system", e))?;
            sys.refresh_cpu_all();
            sys.refresh_memory();

            let model = linux::read_cpu_model_linux()
                .or_else(|| {
                    sys.cpus()
                        .first()
                        .map(|c| c.brand().trim().to_string())
                        .filter(|s| !s.is_empty() && s != "cpu0")
                })
                .unwrap_or_else(|| "Unknown".into());
            let cpu = CpuInfo {
                model,
                physical_cores: System::physical_core_count().unwrap_or(0) as u32,
                logical_cores: sys.cpus().len() as u32,
                usage_percent: (sys.global_cpu_usage() as f64).clamp(0.0, 100.0),
                per_cpu: sys.cpus().iter().map(|c| c.cpu_usage() as f64).collect(),
            };

            let total = sys.total_memory();
            let available = sys.available_memory();
            let used = total.saturating_sub(available);
            let memory = MemoryInfo {
                total_bytes: total,
                available_bytes: available,
                used_bytes: used,
                free_bytes: sys.free_memory(),
                usage_percent: percent(used, total),
                swap_total_bytes: sys.total_swap(),
                swap_used_bytes: sys.used_swap(),
                swap_percent: percent(sys.used_swap(), sys.total_swap()),
            };
            drop(sys);

            let mut disks = disks.lock().map_err(|e| poisoned("disks", e))?;
            disks.refresh(true);
            let disks = disks
                .list()
                .iter()
                .map(|d| {
                    let total = d.total_space();
                    let free = d.available_space();
                    let used = total.saturating_sub(free);
                    Disk {
                        device: d.name().to_string_lossy().into_owned(),
                        mountpoint: d.mount_point().to_string_lossy().into_owned(),
                        fstype: d.file_system().to_string_lossy().into_owned(),
                        total_bytes: total,
                        used_bytes: used,
                        free_bytes: free,
                        usage_percent: percent(used, total),
                    }
                })
                .collect();

            let mut networks = networks.lock().map_err(|e| poisoned("networks", e))?;
            networks.refresh(true);
            let mut network: Vec<NetworkInterface> = networks
                .list()
                .iter()
                .map(|(name, data)| NetworkInterface {
                    name: name.clone(),
                    mac: data.mac_address().to_string(),
                    addresses: data
                        .ip_networks()
                        .iter()
                        .map(|n| format!("{}/{}", n.addr, n.prefix))
                        .collect(),
                    bytes_sent: data.total_transmitted(),
                    bytes_recv: data.total_received(),
                    packets_sent: data.total_packets_transmitted(),
                    packets_recv: data.total_packets_received(),
                    errors_in: data.total_errors_on_received(),
                    errors_out: data.total_errors_on_transmitted(),
                })
                .collect();
            network.sort_by(|a, b| a.name.cmp(&b.name));

            Ok(Hardware {
                hostname: System::host_name().unwrap_or_default(),
                platform: System::distribution_id(),
                platform_version: System::os_version().unwrap_or_default(),
                kernel_version: System::kernel_version().unwrap_or_default(),
                os: std::env::consts::OS.to_string(),
                uptime_secs: System::uptime(),
                cpu,
                memory,
                disks,
                network,
                gpus: Vec::new(),
            })
        })
        .await
        .map_err(join_error)?
    }

    /// Every visible process, ordered by pid. Environment and open files are
    /// read raw here and trimmed by the aggregator after classification.
    #[instrument(skip(self), fields(repo = "sysinfo", operation = "get_processes"))]
    pub async fn get_processes(&self) -> Result<Vec<ProcessRecord>, SourceError> {
        let sys = self.sys.clone();
        let users = self.users.clone();
        tokio::task::spawn_blocking(move || {
            let mut sys = sys.lock().map_err(|e| poisoned("system", e))?;
            sys.refresh_memory();
            sys.refresh_processes_specifics(
                ProcessesToUpdate::All,
                true,
                ProcessRefreshKind::everything(),
            );
            let mut users = users.lock().map_err(|e| poisoned("users", e))?;
            users.refresh();

            let total_memory = sys.total_memory();
            let mut records: Vec<ProcessRecord> = sys
                .processes()
                .values()
                // Linux lists threads as processes too
                .filter(|p| p.thread_kind() != Some(sysinfo::ThreadKind::Userland))
                .map(|p| {
                    let pid = p.pid().as_u32();
                    let disk = p.disk_usage();
                    ProcessRecord {
                        pid,
                        ppid: p.parent().map(|pp| pp.as_u32()),
                        name: p.name().to_string_lossy().into_owned(),
                        cmdline: p
                            .cmd()
                            .iter()
                            .map(|a| a.to_string_lossy().into_owned())
                            .collect(),
                        status: p.status().to_string().to_lowercase(),
                        username: p
                            .user_id()
                            .and_then(|uid| users.get_user_by_id(uid))
                            .map(|u| u.name().to_string()),
                        start_time: p.start_time(),
                        cpu_percent: p.cpu_usage() as f64,
                        memory_percent: percent(p.memory(), total_memory),
                        memory: ProcessMemory {
                            rss: p.memory(),
                            vms: p.virtual_memory(),
                        },
                        num_threads: p.tasks().map(|t| t.len() as u32),
                        cwd: p.cwd().map(|c| c.to_string_lossy().into_owned()),
                        environment: p
                            .environ()
                            .iter()
                            .map(|e| e.to_string_lossy().into_owned())
                            .collect(),
                        open_files: linux::read_open_files(pid, MAX_OPEN_FILES),
                        io_counters: Some(IoCounters {
                            read_bytes: disk.total_read_bytes,
                            write_bytes: disk.total_written_bytes,
                        }),
                        is_related: false,
                    }
                })
                .collect();
            records.sort_by_key(|p| p.pid);
            Ok(records)
        })
        .await
        .map_err(join_error)?
    }

    /// Command line and resource usage for the given pids, refreshed on demand.
    /// Pids that no longer exist are absent from the result.
    #[instrument(skip(self, pids), fields(repo = "sysinfo", operation = "get_process_usage"))]
    pub async fn get_process_usage(
        &self,
        pids: Vec<u32>,
    ) -> Result<HashMap<u32, ProcessUsage>, SourceError> {
        if pids.is_empty() {
            return Ok(HashMap::new());
        }
        let sys = self.sys.clone();
        tokio::task::spawn_blocking(move || {
            let mut sys = sys.lock().map_err(|e| poisoned("system", e))?;
            let wanted: Vec<sysinfo::Pid> = pids.iter().map(|p| sysinfo::Pid::from_u32(*p)).collect();
            sys.refresh_processes_specifics(
                ProcessesToUpdate::Some(&wanted),
                false,
                ProcessRefreshKind::nothing()
                    .with_cpu()
                    .with_memory()
                    .with_cmd(sysinfo::UpdateKind::OnlyIfNotSet),
            );
            Ok(wanted
                .iter()
                .filter_map(|pid| {
                    let p = sys.process(*pid)?;
                    let command = p
                        .cmd()
                        .iter()
                        .map(|a| a.to_string_lossy())
                        .collect::<Vec<_>>()
                        .join(" ");
                    Some((
                        pid.as_u32(),
                        ProcessUsage {
                            command,
                            cpu_percent: p.cpu_usage() as f64,
                            memory_bytes: p.memory(),
                        },
                    ))
                })
                .collect())
        })
        .await
        .map_err(join_error)?
    }
}
