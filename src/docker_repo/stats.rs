// Reduce a raw Docker stats response to the usage figures a service record carries.

use bollard::models::ContainerStatsResponse;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) struct ContainerUsage {
    pub cpu_percent: f64,
    pub memory_usage_bytes: u64,
    pub memory_limit_bytes: u64,
}

/// CPU percent is the container's share of host CPU time between the two
/// samples, scaled by online CPUs. Returns None without both samples.
pub(crate) fn container_usage(s: &ContainerStatsResponse) -> Option<ContainerUsage> {
    let cpu_stats = s.cpu_stats.as_ref()?;
    let precpu_stats = s.precpu_stats.as_ref()?;

    let cpu_usage = cpu_stats.cpu_usage.as_ref()?;
    let precpu_usage = precpu_stats.cpu_usage.as_ref()?;

    let cpu_delta =
        cpu_usage.total_usage.unwrap_or(0) as i64 - precpu_usage.total_usage.unwrap_or(0) as i64;
    let system_delta = cpu_stats.system_cpu_usage.unwrap_or(0) as i64
        - precpu_stats.system_cpu_usage.unwrap_or(0) as i64;
    let online = cpu_stats.online_cpus.unwrap_or(1) as f64;
    let cpu_percent = if system_delta > 0 && cpu_delta > 0 && online > 0.0 {
        (cpu_delta as f64 / system_delta as f64) * online * 100.0
    } else {
        0.0
    };

    let memory = s.memory_stats.as_ref();
    Some(ContainerUsage {
        cpu_percent,
        memory_usage_bytes: memory.and_then(|m| m.usage).unwrap_or(0),
        memory_limit_bytes: memory.and_then(|m| m.limit).unwrap_or(0),
    })
}
