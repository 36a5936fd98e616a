// Linux-specific helpers: /proc reads that sysinfo does not cover.

/// Read first "model name" from /proc/cpuinfo (Linux). Prefer over sysinfo when it returns "cpu0" etc.
pub(super) fn read_cpu_model_linux() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        let content = std::fs::read_to_string("/proc/cpuinfo").ok()?;
        parse_cpu_model(&content)
    }
    #[cfg(not(target_os = "linux"))]
    None
}

fn parse_cpu_model(cpuinfo: &str) -> Option<String> {
    cpuinfo
        .lines()
        .find(|l| l.starts_with("model name"))
        .and_then(|l| l.split_once(':'))
        .map(|(_, v)| v.trim())
        .filter(|s| !s.is_empty() && *s != "cpu0")
        .map(str::to_string)
}

/// Paths of regular files held open by `pid`, read from /proc/<pid>/fd.
/// Sockets, pipes and anonymous inodes are skipped. Unreadable directories
/// (other users' processes) yield an empty list.
pub(super) fn read_open_files(pid: u32, limit: usize) -> Vec<String> {
    #[cfg(target_os = "linux")]
    {
        let Ok(entries) = std::fs::read_dir(format!("/proc/{}/fd", pid)) else {
            return Vec::new();
        };
        let mut files: Vec<String> = entries
            .flatten()
            .filter_map(|e| std::fs::read_link(e.path()).ok())
            .map(|t| t.to_string_lossy().into_owned())
            .filter(|t| is_file_target(t))
            .take(limit)
            .collect();
        files.sort();
        files.dedup();
        files
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = (pid, limit);
        Vec::new()
    }
}

fn is_file_target(target: &str) -> bool {
    target.starts_with('/') && !target.starts_with("/dev/") && !target.ends_with(" (deleted)")
}
