// Repository trait for catalog and telemetry access
use crate::domain::device::DeviceCatalog;
use crate::domain::sample::RawSample;
use async_trait::async_trait;

/// Scope of a telemetry fetch. Unset fields are not filtered on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryQuery {
    pub feeder_id: Option<String>,
    /// Only samples newer than this ISO-8601 time
    pub since: Option<String>,
    pub limit: Option<usize>,
}

impl TelemetryQuery {
    pub fn for_feeder(feeder_id: Option<String>, limit: usize) -> Self {
        Self {
            feeder_id,
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn since(mut self, since: Option<String>) -> Self {
        self.since = since;
        self
    }
}

#[async_trait]
pub trait TelemetryRepository: Send + Sync {
    /// Feeders and devices known to the platform
    async fn fetch_catalog(&self) -> anyhow::Result<DeviceCatalog>;

    /// Recent device samples; each carries its `device_id`
    async fn fetch_telemetry(&self, query: &TelemetryQuery) -> anyhow::Result<Vec<RawSample>>;
}
