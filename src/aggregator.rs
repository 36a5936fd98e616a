// Builds one snapshot from every enabled source, tolerating partial failure.

use crate::classifier::{Classifier, Classify};
use crate::models::{Hardware, ProcessRecord, ServiceRecord, Snapshot};
use crate::sources::{SourceCollector, SourceError};
use chrono::Utc;
use tracing::{debug, instrument, warn};

/// Substrings (upper-case) that mark an environment key as secret.
pub const SENSITIVE_KEY_MARKERS: &[&str] =
    &["PASSWORD", "SECRET", "KEY", "TOKEN", "CREDENTIAL", "AUTH"];

pub const FILTERED_VALUE: &str = "***FILTERED***";

/// A source that failed during one build. At most one per source.
#[derive(Debug)]
pub struct SourceFailure {
    pub source: &'static str,
    pub error: SourceError,
}

pub struct Aggregator<H, P, S> {
    hardware: Option<H>,
    processes: Option<P>,
    services: Option<S>,
    classifier: Classifier,
}

impl<H, P, S> Aggregator<H, P, S>
where
    H: SourceCollector<Output = Hardware>,
    P: SourceCollector<Output = Vec<ProcessRecord>>,
    S: SourceCollector<Output = Vec<ServiceRecord>>,
{
    /// `None` disables a source; its snapshot field stays absent or empty
    /// without being reported as a failure.
    pub fn new(
        hardware: Option<H>,
        processes: Option<P>,
        services: Option<S>,
        classifier: Classifier,
    ) -> Self {
        Self {
            hardware,
            processes,
            services,
            classifier,
        }
    }

    /// Run each enabled source once, classify, then stamp the snapshot.
    /// Never fails: a failing source leaves its field empty and is returned
    /// in the failure list.
    #[instrument(skip(self), fields(operation = "build_snapshot"))]
    pub async fn build_snapshot(&self) -> (Snapshot, Vec<SourceFailure>) {
        let mut failures = Vec::new();

        let hardware = collect(self.hardware.as_ref(), &mut failures).await;
        let mut processes = collect(self.processes.as_ref(), &mut failures)
            .await
            .unwrap_or_default();
        let mut services = collect(self.services.as_ref(), &mut failures)
            .await
            .unwrap_or_default();

        for p in &mut processes {
            p.is_related = p.is_related_by(&self.classifier);
            if p.is_related {
                p.environment = filter_environment(&p.environment);
            } else {
                p.environment.clear();
                p.open_files.clear();
            }
        }
        for s in &mut services {
            s.is_related = s.is_related_by(&self.classifier);
            s.environment = filter_environment(&s.environment);
        }

        let snapshot = Snapshot {
            timestamp: Utc::now(),
            hardware,
            processes,
            services,
        };
        debug!(
            processes = snapshot.processes.len(),
            services = snapshot.services.len(),
            related_processes = snapshot.related_process_count(),
            related_services = snapshot.related_service_count(),
            failures = failures.len(),
            "snapshot built"
        );
        (snapshot, failures)
    }
}

async fn collect<C: SourceCollector>(
    source: Option<&C>,
    failures: &mut Vec<SourceFailure>,
) -> Option<C::Output> {
    let source = source?;
    match source.collect().await {
        Ok(out) => Some(out),
        Err(error) => {
            warn!(source = source.name(), error = %error, "source collection failed");
            failures.push(SourceFailure {
                source: source.name(),
                error,
            });
            None
        }
    }
}

/// Mask values of secret-looking keys and drop entries that are not
/// `KEY=value`.
pub fn filter_environment(env: &[String]) -> Vec<String> {
    env.iter()
        .filter_map(|entry| {
            let (key, _) = entry.split_once('=')?;
            let upper = key.to_uppercase();
            if SENSITIVE_KEY_MARKERS.iter().any(|m| upper.contains(m)) {
                Some(format!("{}={}", key, FILTERED_VALUE))
            } else {
                Some(entry.clone())
            }
        })
        .collect()
}
