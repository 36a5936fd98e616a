// One cycle: aggregate, persist, deliver. Wires the concrete collaborators from config.

use crate::aggregator::Aggregator;
use crate::classifier::Classifier;
use crate::config::AppConfig;
use crate::delivery::{BackoffPolicy, DeliveryClient, HttpTransport, Sleeper, TokioSleeper, Transport};
use crate::docker_repo::DockerRepo;
use crate::history_repo::HistoryRepo;
use crate::models::{Hardware, ProcessRecord, ServiceRecord};
use crate::sources::{HardwareSource, ProcessSource, ServiceSource, SourceCollector};
use crate::sysinfo_repo::SysinfoRepo;
use crate::systemd_repo::SystemdRepo;
use crate::worker::{CycleReport, CycleRunner};
use std::sync::Arc;
use tracing::{error, info, warn};

pub type HostAggregator = Aggregator<HardwareSource, ProcessSource, ServiceSource>;

pub struct Pipeline<H, P, S, T = HttpTransport, Z = TokioSleeper> {
    aggregator: Aggregator<H, P, S>,
    history: HistoryRepo,
    delivery: DeliveryClient<T, Z>,
}

impl<H, P, S, T, Z> Pipeline<H, P, S, T, Z> {
    pub fn new(
        aggregator: Aggregator<H, P, S>,
        history: HistoryRepo,
        delivery: DeliveryClient<T, Z>,
    ) -> Self {
        Self {
            aggregator,
            history,
            delivery,
        }
    }
}

impl<H, P, S, T, Z> CycleRunner for Pipeline<H, P, S, T, Z>
where
    H: SourceCollector<Output = Hardware> + 'static,
    P: SourceCollector<Output = Vec<ProcessRecord>> + 'static,
    S: SourceCollector<Output = Vec<ServiceRecord>> + 'static,
    T: Transport + 'static,
    Z: Sleeper + 'static,
{
    async fn run_cycle(&mut self) -> CycleReport {
        let (snapshot, failures) = self.aggregator.build_snapshot().await;
        let mut report = CycleReport {
            source_failures: failures.len(),
            ..Default::default()
        };

        match self.history.persist(&snapshot).await {
            Ok(path) => {
                report.persisted = true;
                tracing::debug!(path = %path.display(), "snapshot persisted");
            }
            Err(e) if e.is_fatal() => {
                error!(error = %e, "snapshot cannot be encoded, skipping persist and delivery");
                report.aborted = true;
                return report;
            }
            Err(e) => {
                warn!(error = %e, path = %self.history.dir().display(), "persist failed");
            }
        }

        match self.delivery.send(&snapshot).await {
            Ok(r) => {
                report.delivered = true;
                tracing::debug!(attempts = r.attempts, status = r.status, "delivery succeeded");
            }
            Err(e) => warn!(error = %e, "delivery failed"),
        }

        info!(
            processes = snapshot.processes.len(),
            related_processes = snapshot.related_process_count(),
            services = snapshot.services.len(),
            related_services = snapshot.related_service_count(),
            source_failures = report.source_failures,
            persisted = report.persisted,
            delivered = report.delivered,
            "cycle complete"
        );
        report
    }
}

/// Aggregator over the host's real sources, each gated by `[sources]`.
pub fn build_aggregator(config: &AppConfig) -> anyhow::Result<HostAggregator> {
    let sources = &config.sources;
    let classifier = Classifier::new(
        &config.classifier.extra_keywords,
        &config.classifier.extra_patterns,
    )?;
    let sysinfo = Arc::new(SysinfoRepo::new());

    let docker = if sources.services && sources.docker {
        match DockerRepo::connect() {
            Ok(d) => Some(d),
            Err(e) => {
                warn!(error = %e, "docker client unavailable, containers not collected");
                None
            }
        }
    } else {
        None
    };
    let systemd = (sources.services && sources.systemd).then(SystemdRepo::new);

    Ok(Aggregator::new(
        sources
            .hardware
            .then(|| HardwareSource::new(sysinfo.clone(), sources.gpu)),
        sources.processes.then(|| ProcessSource::new(sysinfo.clone())),
        sources
            .services
            .then(|| ServiceSource::new(systemd, docker, sysinfo.clone())),
        classifier,
    ))
}

pub fn build_pipeline(
    config: &AppConfig,
) -> anyhow::Result<Pipeline<HardwareSource, ProcessSource, ServiceSource>> {
    let aggregator = build_aggregator(config)?;
    let history = HistoryRepo::new(&config.retention.state_dir, config.retention.capacity);
    let transport = HttpTransport::new(&config.delivery.endpoint, config.delivery.timeout())?;
    let delivery = DeliveryClient::new(
        transport,
        BackoffPolicy::new(config.delivery.backoff_base(), config.delivery.max_retries),
        config.delivery.timeout(),
    );
    Ok(Pipeline::new(aggregator, history, delivery))
}
