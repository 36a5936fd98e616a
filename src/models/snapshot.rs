// The unit of telemetry produced by one pipeline cycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Hardware, ProcessRecord, ServiceRecord};

/// One timestamped record of the host. Built once by the aggregator and only
/// ever handed out by shared reference afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// When the snapshot became valid (after every source returned).
    pub timestamp: DateTime<Utc>,
    /// `None` only when the hardware source failed or is disabled.
    pub hardware: Option<Hardware>,
    #[serde(default)]
    pub processes: Vec<ProcessRecord>,
    #[serde(default)]
    pub services: Vec<ServiceRecord>,
}

impl Snapshot {
    pub fn related_process_count(&self) -> usize {
        self.processes.iter().filter(|p| p.is_related).count()
    }

    pub fn related_service_count(&self) -> usize {
        self.services.iter().filter(|s| s.is_related).count()
    }
}
