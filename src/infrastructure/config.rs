use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub api: ApiSettings,
    pub live: LiveConfig,
    #[serde(default)]
    pub session: SessionSettings,
    pub server: ServerSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub timeout_secs: u64,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LiveConfig {
    pub poll_interval_secs: u64,
    /// Points per device used for the tracking error mean
    pub tracking_window: usize,
    /// Points per device exposed as chart history
    pub history_points: usize,
    /// Upper bound on samples requested per refresh
    pub telemetry_limit: usize,
    /// Mean tracking error, as a fraction of rated power, above which a feeder is degraded
    pub tracking_tolerance: f64,
    pub fetch_timeout_secs: u64,
}

impl LiveConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn retained_points(&self) -> usize {
        self.tracking_window.max(self.history_points)
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            tracking_window: 60,
            history_points: 120,
            telemetry_limit: 500,
            tracking_tolerance: 0.1,
            fetch_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SessionSettings {
    /// File-backed session when set, in-memory otherwise
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub listen_addr: String,
}

impl ServerSettings {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listen_addr
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid server.listen_addr {:?}: {}", self.listen_addr, e))
    }
}

pub fn load_dashboard_config() -> anyhow::Result<DashboardConfig> {
    load_with_file(config::File::with_name("config/dashboard").required(false))
}

pub fn load_dashboard_config_from(path: &Path) -> anyhow::Result<DashboardConfig> {
    load_with_file(config::File::from(path))
}

fn load_with_file<S>(file: S) -> anyhow::Result<DashboardConfig>
where
    S: config::Source + Send + Sync + 'static,
{
    let defaults = LiveConfig::default();
    let settings = config::Config::builder()
        .set_default("api.base_url", "http://localhost:4000")?
        .set_default("api.timeout_secs", 10)?
        .set_default("live.poll_interval_secs", defaults.poll_interval_secs)?
        .set_default("live.tracking_window", defaults.tracking_window as u64)?
        .set_default("live.history_points", defaults.history_points as u64)?
        .set_default("live.telemetry_limit", defaults.telemetry_limit as u64)?
        .set_default("live.tracking_tolerance", defaults.tracking_tolerance)?
        .set_default("live.fetch_timeout_secs", defaults.fetch_timeout_secs)?
        .set_default("server.listen_addr", "0.0.0.0:8080")?
        .add_source(file)
        .add_source(
            config::Environment::with_prefix("DERMS")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config: DashboardConfig = settings.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

impl DashboardConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api.base_url.trim().is_empty() {
            anyhow::bail!("api.base_url must not be empty");
        }
        if self.api.timeout_secs == 0 {
            anyhow::bail!("api.timeout_secs must be at least 1");
        }
        if self.live.poll_interval_secs == 0 {
            anyhow::bail!("live.poll_interval_secs must be at least 1");
        }
        if self.live.fetch_timeout_secs == 0 {
            anyhow::bail!("live.fetch_timeout_secs must be at least 1");
        }
        for (name, value) in [
            ("live.tracking_window", self.live.tracking_window),
            ("live.history_points", self.live.history_points),
            ("live.telemetry_limit", self.live.telemetry_limit),
        ] {
            if value == 0 {
                anyhow::bail!("{} must be at least 1", name);
            }
        }
        if !self.live.tracking_tolerance.is_finite() || self.live.tracking_tolerance < 0.0 {
            anyhow::bail!(
                "live.tracking_tolerance must be a non-negative number, got {}",
                self.live.tracking_tolerance
            );
        }
        self.server.socket_addr()?;
        Ok(())
    }
}
