use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration for the Meridian broker layer.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub node: NodeConfig,
    pub storage: StorageConfig,
    pub listeners: ListenerConfig,
    pub reaper: ReaperConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Node identifier; used as the requester id on zombie check requests.
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory for the file-backed metadata store.
    pub data_dir: PathBuf,
}

/// Externally reachable endpoints; only surfaced in the readiness notice
/// and validated for conflicts. The listener sockets themselves belong to
/// the transport core.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenerConfig {
    pub client_bind: String,
    pub admin_bind: String,
}

/// Zombie reaper timing knobs. All four are mandatory: there are no safe
/// universal defaults for grace windows and scan cadence, so deployments
/// must choose them explicitly.
#[derive(Debug, Clone, Deserialize)]
pub struct ReaperConfig {
    /// Idle time after which an active connection becomes suspect.
    pub grace_window_seconds: u64,
    /// Idle time after which a suspect connection becomes a zombie candidate.
    pub zombie_threshold_seconds: u64,
    /// Cadence of the killer loop.
    pub scan_interval_seconds: u64,
    /// Upper bound on the peer-confirmation round trip.
    pub confirm_timeout_millis: u64,
}

impl ReaperConfig {
    pub fn grace_window(&self) -> Duration {
        Duration::from_secs(self.grace_window_seconds)
    }

    pub fn zombie_threshold(&self) -> Duration {
        Duration::from_secs(self.zombie_threshold_seconds)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_seconds)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_timeout_millis)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelemetryConfig {
    /// Tracing filter directive, e.g. "info" or "meridian=debug".
    #[serde(default)]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default = "default_analytics_enabled")]
    pub enabled: bool,
    /// Optional reporting endpoint; must be an http(s) URL when set.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
        }
    }
}

fn default_analytics_enabled() -> bool {
    true
}

impl Config {
    /// Resolve and load configuration. An explicit path wins; otherwise the
    /// path comes from MERIDIAN_CONFIG, falling back to
    /// `config/meridian.toml`. Environment overrides apply in all cases.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let path = config_path(path);
        let mut cfg = Self::load(&path)?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Load configuration from a specific file (TOML or JSON based on extension).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let data = fs::read_to_string(path_ref)
            .with_context(|| format!("unable to read config {}", path_ref.display()))?;
        if is_json(path_ref) {
            Ok(serde_json::from_str(&data)
                .with_context(|| format!("invalid JSON config {}", path_ref.display()))?)
        } else {
            Ok(toml::from_str(&data)
                .with_context(|| format!("invalid TOML config {}", path_ref.display()))?)
        }
    }

    /// Validate schema-level invariants before startup.
    pub fn validate(&self) -> Result<()> {
        if self.node.name.is_empty() {
            bail!("node.name must be non-empty");
        }
        if self.storage.data_dir.as_os_str().is_empty() {
            bail!("storage.data_dir must be non-empty");
        }
        if self.listeners.client_bind == self.listeners.admin_bind {
            bail!("listeners.client_bind must differ from listeners.admin_bind");
        }
        if self.reaper.grace_window_seconds == 0 {
            bail!("reaper.grace_window_seconds must be > 0");
        }
        if self.reaper.zombie_threshold_seconds < self.reaper.grace_window_seconds {
            bail!("reaper.zombie_threshold_seconds must be >= reaper.grace_window_seconds");
        }
        if self.reaper.scan_interval_seconds == 0 {
            bail!("reaper.scan_interval_seconds must be > 0");
        }
        if self.reaper.confirm_timeout_millis == 0 {
            bail!("reaper.confirm_timeout_millis must be > 0");
        }
        if let Some(endpoint) = &self.analytics.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                bail!("analytics.endpoint must be an http(s) URL");
            }
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("MERIDIAN_LOG_LEVEL") {
            self.telemetry.log_level = Some(level);
        }
        if let Ok(flag) = std::env::var("MERIDIAN_ANALYTICS") {
            if flag.eq_ignore_ascii_case("false") || flag == "0" {
                self.analytics.enabled = false;
            }
        }
    }
}

/// Path the configuration will be loaded from: an explicit path when given,
/// otherwise MERIDIAN_CONFIG, otherwise `config/meridian.toml`.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit.map_or_else(env_config_path, Path::to_path_buf)
}

fn env_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("MERIDIAN_CONFIG") {
        PathBuf::from(path)
    } else {
        PathBuf::from("config/meridian.toml")
    }
}

fn is_json(path: &Path) -> bool {
    matches!(path.extension().and_then(|s| s.to_str()), Some("json"))
}
