// Snapshot data model: one record per cycle, serialized as snake_case JSON.

mod hardware;
mod process;
mod service;
mod snapshot;

pub use hardware::{CpuInfo, Disk, GpuDevice, Hardware, MemoryInfo, NetworkInterface};
pub use process::{IoCounters, ProcessMemory, ProcessRecord};
pub use service::{PortMapping, ServiceKind, ServiceRecord, Volume};
pub use snapshot::Snapshot;
