// NVIDIA GPU inventory via nvidia-smi

use crate::models::GpuDevice;
use crate::sources::run_command;
use tracing::debug;

const QUERY: &str =
    "--query-gpu=index,name,temperature.gpu,utilization.gpu,memory.used,memory.total";

/// GPUs reported by `nvidia-smi`. A host without the tool, or where it
/// fails, has no GPUs; this never fails the hardware source.
pub async fn query_nvidia_gpus() -> Vec<GpuDevice> {
    match run_command("nvidia-smi", &[QUERY, "--format=csv,noheader,nounits"]).await {
        Ok(out) => parse_nvidia_smi(&out),
        Err(e) => {
            debug!(error = %e, operation = "query_nvidia_gpus", "nvidia-smi unavailable");
            Vec::new()
        }
    }
}

/// Parse `index, name, temp, util, mem used, mem total` CSV rows. Malformed
/// rows are skipped; "[N/A]" numeric fields read as 0.
pub fn parse_nvidia_smi(output: &str) -> Vec<GpuDevice> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() < 6 {
                return None;
            }
            let num = |s: &str| s.parse::<f64>().unwrap_or(0.0);
            Some(GpuDevice {
                vendor: "nvidia".into(),
                index: fields[0].parse().ok()?,
                name: fields[1].to_string(),
                temperature_c: num(fields[2]),
                utilization_percent: num(fields[3]),
                memory_used_mb: num(fields[4]),
                memory_total_mb: num(fields[5]),
            })
        })
        .collect()
}
