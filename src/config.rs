use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

const MAX_INTERVAL_SECS: u64 = 86_400;
const MAX_STATS_LOG_INTERVAL_SECS: u64 = 7 * 86_400;
const MAX_SHUTDOWN_GRACE_MS: u64 = 60_000;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub delivery: DeliveryConfig,
    pub retention: RetentionConfig,
    pub sources: SourcesConfig,
    pub classifier: ClassifierConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Seconds between cycle starts.
    pub interval_secs: u64,
    /// Pause after a stop request so in-flight log lines and I/O can flush.
    pub shutdown_grace_ms: u64,
    /// How often to log scheduler stats (cycles, persisted, delivered) at INFO level.
    pub stats_log_interval_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            shutdown_grace_ms: 500,
            stats_log_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub endpoint: String,
    /// Per-attempt timeout.
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:5678/api/v1/update_state".into(),
            timeout_secs: 10,
            max_retries: 3,
            backoff_base_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub state_dir: PathBuf,
    /// Snapshot files kept on disk; older ones are evicted.
    pub capacity: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("/var/lib/safetytwin/states"),
            capacity: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub hardware: bool,
    pub processes: bool,
    pub services: bool,
    pub gpu: bool,
    pub systemd: bool,
    pub docker: bool,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            hardware: true,
            processes: true,
            services: true,
            gpu: true,
            systemd: true,
            docker: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub extra_keywords: Vec<String>,
    pub extra_patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub verbose: bool,
}

impl AgentConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn stats_log_interval(&self) -> Duration {
        Duration::from_secs(self.stats_log_interval_secs)
    }
}

impl DeliveryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

impl AppConfig {
    /// Load from `path`, else `CONFIG_FILE`, else `config.toml`. Only the
    /// implicit default may be missing, in which case defaults apply.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match std::env::var("CONFIG_FILE") {
                Ok(p) => (PathBuf::from(p), true),
                Err(_) => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
            },
        };
        match std::fs::read_to_string(&path) {
            Ok(s) => Self::load_from_str(&s)
                .map_err(|e| anyhow::anyhow!("config {}: {}", path.display(), e)),
            Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
            Err(e) => Err(anyhow::anyhow!("read config {}: {}", path.display(), e)),
        }
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            (1..=MAX_INTERVAL_SECS).contains(&self.agent.interval_secs),
            "agent.interval_secs must be in 1..={}, got {}",
            MAX_INTERVAL_SECS,
            self.agent.interval_secs
        );
        anyhow::ensure!(
            (1..=MAX_STATS_LOG_INTERVAL_SECS).contains(&self.agent.stats_log_interval_secs),
            "agent.stats_log_interval_secs must be in 1..={}, got {}",
            MAX_STATS_LOG_INTERVAL_SECS,
            self.agent.stats_log_interval_secs
        );
        anyhow::ensure!(
            self.agent.shutdown_grace_ms <= MAX_SHUTDOWN_GRACE_MS,
            "agent.shutdown_grace_ms must be <= {}, got {}",
            MAX_SHUTDOWN_GRACE_MS,
            self.agent.shutdown_grace_ms
        );
        let url = reqwest::Url::parse(&self.delivery.endpoint).map_err(|e| {
            anyhow::anyhow!(
                "delivery.endpoint must be a valid URL, got {:?}: {}",
                self.delivery.endpoint,
                e
            )
        })?;
        anyhow::ensure!(
            matches!(url.scheme(), "http" | "https"),
            "delivery.endpoint must be http or https, got {}",
            url.scheme()
        );
        anyhow::ensure!(
            self.delivery.timeout_secs > 0,
            "delivery.timeout_secs must be > 0, got {}",
            self.delivery.timeout_secs
        );
        anyhow::ensure!(
            self.delivery.max_retries <= 16,
            "delivery.max_retries must be <= 16, got {}",
            self.delivery.max_retries
        );
        anyhow::ensure!(
            !self.retention.state_dir.as_os_str().is_empty(),
            "retention.state_dir must be non-empty"
        );
        anyhow::ensure!(
            self.retention.capacity > 0,
            "retention.capacity must be > 0, got {}",
            self.retention.capacity
        );
        crate::classifier::Classifier::new(
            &self.classifier.extra_keywords,
            &self.classifier.extra_patterns,
        )
        .map_err(|e| anyhow::anyhow!("classifier.extra_patterns: {}", e))?;
        Ok(())
    }
}
