// Application state for HTTP handlers
use crate::application::live_metrics_service::LiveMetricsService;
use crate::application::session_store::Session;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub live_service: LiveMetricsService,
    pub session: Session,
    /// How long `/live` waits for a settled snapshot
    pub snapshot_timeout: Duration,
}
