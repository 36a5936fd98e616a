// Docker containers as service records via bollard

mod stats;

use crate::models::{PortMapping, ServiceKind, ServiceRecord, Volume};
use bollard::Docker;
use bollard::errors::Error;
use bollard::query_parameters::{InspectContainerOptions, ListContainersOptions, StatsOptions};
use futures_util::StreamExt;
use futures_util::future::join_all;
use tracing::{debug, instrument, warn};

pub struct DockerRepo {
    docker: Docker,
}

impl DockerRepo {
    /// Connects lazily; an absent daemon surfaces on the first call.
    pub fn connect() -> Result<Self, Error> {
        let docker = Docker::connect_with_unix_defaults()?;
        Ok(Self { docker })
    }

    /// True when the daemon answers a ping.
    pub async fn is_available(&self) -> bool {
        self.docker.ping().await.is_ok()
    }

    /// All containers, running or not. Running containers carry a one-shot
    /// usage sample; inspect and stats failures for a single container are
    /// logged and leave that container's details empty.
    #[instrument(skip(self), fields(repo = "docker", operation = "list_containers"))]
    pub async fn list_containers(&self) -> Result<Vec<ServiceRecord>, Error> {
        let options = ListContainersOptions {
            all: true,
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(options)).await?;

        let records = containers.into_iter().map(|c| {
            let id = c.id.clone().unwrap_or_default();
            let name = c
                .names
                .as_ref()
                .and_then(|n| n.first())
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_else(|| id.clone());
            let status = container_status(c.status.as_deref().unwrap_or(""));

            let mut record = ServiceRecord::new(name, ServiceKind::Docker, status);
            record.image = c.image.clone();
            record.command = c.command.clone().filter(|s| !s.is_empty());
            record.labels = c.labels.clone().unwrap_or_default().into_iter().collect();
            record.ports = c
                .ports
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(|p| PortMapping {
                    container_port: p.private_port,
                    host_ip: p.ip.clone(),
                    host_port: p.public_port,
                })
                .collect();
            record.volumes = c
                .mounts
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(|m| Volume {
                    source: m.source.clone().unwrap_or_default(),
                    destination: m.destination.clone().unwrap_or_default(),
                    read_only: !m.rw.unwrap_or(true),
                })
                .collect();
            record.id = Some(id);
            self.enrich(record)
        });

        Ok(join_all(records).await)
    }

    async fn enrich(&self, mut record: ServiceRecord) -> ServiceRecord {
        let Some(id) = record.id.clone() else {
            return record;
        };

        match self
            .docker
            .inspect_container(&id, None::<InspectContainerOptions>)
            .await
        {
            Ok(info) => {
                if let Some(env) = info.config.and_then(|c| c.env) {
                    record.environment = env;
                }
                record.pid = info
                    .state
                    .and_then(|s| s.pid)
                    .filter(|pid| *pid > 0)
                    .and_then(|pid| u32::try_from(pid).ok());
            }
            Err(e) => warn!(error = %e, container = %record.name, "inspect failed"),
        }

        if record.status != "running" {
            return record;
        }

        let options = StatsOptions {
            stream: false,
            one_shot: false,
        };
        match self.docker.stats(&id, Some(options)).next().await {
            Some(Ok(s)) => {
                if let Some(usage) = stats::container_usage(&s) {
                    record.cpu_percent = usage.cpu_percent;
                    record.memory_bytes = usage.memory_usage_bytes;
                    record.memory_limit_bytes =
                        Some(usage.memory_limit_bytes).filter(|l| *l > 0);
                }
            }
            Some(Err(e)) => warn!(error = %e, container = %record.name, "stats failed"),
            None => debug!(container = %record.name, "stats stream ended without a sample"),
        }
        record
    }
}

/// Normalise the human status Docker reports ("Up 2 hours", "Exited (0) 3
/// days ago") to a single lowercase word.
pub fn container_status(status: &str) -> String {
    let status = status.trim();
    if status.starts_with("Up") {
        if status.contains("(Paused)") {
            return "paused".into();
        }
        return "running".into();
    }
    status
        .split_whitespace()
        .next()
        .map(str::to_lowercase)
        .unwrap_or_else(|| "unknown".into())
}
