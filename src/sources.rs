// Uniform "produce a record or fail" capability over every fact source.

use crate::docker_repo::DockerRepo;
use crate::models::{Hardware, ProcessRecord, ServiceRecord};
use crate::sysinfo_repo::{ProcessUsage, SysinfoRepo};
use crate::systemd_repo::SystemdRepo;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("`{program}` exited with {status}: {stderr}")]
    Command {
        program: &'static str,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("collector task failed: {0}")]
    Task(String),

    #[error("{0}")]
    Unavailable(String),
}

/// Run an external tool and return its stdout. A non-zero exit is an error
/// carrying the trimmed stderr.
pub(crate) async fn run_command(program: &'static str, args: &[&str]) -> Result<String, SourceError> {
    let output = tokio::process::Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await?;
    if !output.status.success() {
        return Err(SourceError::Command {
            program,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// One category of host facts. Each call is independent and one-shot.
pub trait SourceCollector: Send + Sync {
    type Output: Send;

    /// Stable name used in logs and failure reports.
    fn name(&self) -> &'static str;

    fn collect(&self) -> impl Future<Output = Result<Self::Output, SourceError>> + Send;
}

pub struct HardwareSource {
    repo: Arc<SysinfoRepo>,
    include_gpu: bool,
}

impl HardwareSource {
    pub fn new(repo: Arc<SysinfoRepo>, include_gpu: bool) -> Self {
        Self { repo, include_gpu }
    }
}

impl SourceCollector for HardwareSource {
    type Output = Hardware;

    fn name(&self) -> &'static str {
        "hardware"
    }

    async fn collect(&self) -> Result<Hardware, SourceError> {
        let mut hardware = self.repo.get_hardware().await?;
        if self.include_gpu {
            hardware.gpus = crate::sysinfo_repo::gpu::query_nvidia_gpus().await;
        }
        Ok(hardware)
    }
}

pub struct ProcessSource {
    repo: Arc<SysinfoRepo>,
}

impl ProcessSource {
    pub fn new(repo: Arc<SysinfoRepo>) -> Self {
        Self { repo }
    }
}

impl SourceCollector for ProcessSource {
    type Output = Vec<ProcessRecord>;

    fn name(&self) -> &'static str {
        "processes"
    }

    async fn collect(&self) -> Result<Vec<ProcessRecord>, SourceError> {
        self.repo.get_processes().await
    }
}

/// Systemd units followed by containers. Fails only when every enabled
/// backend fails; a single backend failure is logged and skipped.
pub struct ServiceSource {
    systemd: Option<SystemdRepo>,
    docker: Option<DockerRepo>,
    sysinfo: Arc<SysinfoRepo>,
}

impl ServiceSource {
    pub fn new(
        systemd: Option<SystemdRepo>,
        docker: Option<DockerRepo>,
        sysinfo: Arc<SysinfoRepo>,
    ) -> Self {
        Self {
            systemd,
            docker,
            sysinfo,
        }
    }

    async fn enrich_units(&self, units: &mut [ServiceRecord]) {
        let pids: Vec<u32> = units.iter().filter_map(|u| u.pid).collect();
        match self.sysinfo.get_process_usage(pids).await {
            Ok(usage) => apply_usage(units, &usage),
            Err(e) => warn!(error = %e, backend = "systemd", "main pid enrichment failed"),
        }
    }
}

impl SourceCollector for ServiceSource {
    type Output = Vec<ServiceRecord>;

    fn name(&self) -> &'static str {
        "services"
    }

    async fn collect(&self) -> Result<Vec<ServiceRecord>, SourceError> {
        let mut results = Vec::with_capacity(2);
        if let Some(systemd) = &self.systemd {
            let units = match systemd.list_services().await {
                Ok(mut units) => {
                    self.enrich_units(&mut units).await;
                    Ok(units)
                }
                Err(e) => Err(e),
            };
            results.push(("systemd", units));
        }
        if let Some(docker) = &self.docker {
            let containers = docker.list_containers().await.map_err(SourceError::from);
            results.push(("docker", containers));
        }
        merge_backends(results)
    }
}

/// Copy command line, CPU and memory of each unit's main PID onto the unit.
fn apply_usage(units: &mut [ServiceRecord], usage: &HashMap<u32, ProcessUsage>) {
    for unit in units {
        if let Some(u) = unit.pid.and_then(|pid| usage.get(&pid)) {
            unit.command = Some(u.command.clone()).filter(|c| !c.is_empty());
            unit.cpu_percent = u.cpu_percent;
            unit.memory_bytes = u.memory_bytes;
        }
    }
}

/// Concatenate backend results in order. A failed backend is logged and
/// skipped; the merge errors only when every enabled backend failed.
fn merge_backends(
    results: Vec<(&'static str, Result<Vec<ServiceRecord>, SourceError>)>,
) -> Result<Vec<ServiceRecord>, SourceError> {
    let backends = results.len();
    let mut services = Vec::new();
    let mut errors = Vec::new();
    for (backend, result) in results {
        match result {
            Ok(records) => services.extend(records),
            Err(e) => {
                warn!(error = %e, backend, "service backend failed");
                errors.push(e);
            }
        }
    }

    if backends > 0 && errors.len() == backends {
        if backends == 1
            && let Some(e) = errors.pop()
        {
            return Err(e);
        }
        let joined: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        return Err(SourceError::Unavailable(format!(
            "all service backends failed: {}",
            joined.join("; ")
        )));
    }
    Ok(services)
}
