// HTTP request handlers
use crate::domain::live_view::LiveMetricsView;
use crate::domain::normalizer::normalize_detailed;
use crate::domain::sample::{NormalizedPoint, RawSample};
use crate::infrastructure::wire::WireSample;
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    Json,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeederQuery {
    pub feeder_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizeRequest {
    pub samples: Vec<WireSample>,
    #[serde(default)]
    pub max_points: Option<usize>,
}

#[derive(Deserialize)]
pub struct SignInRequest {
    pub token: String,
    pub user: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub signed_in: bool,
    pub user: Option<String>,
}

impl SessionStatus {
    fn of(state: &AppState) -> Self {
        Self {
            signed_in: state.session.token().is_some(),
            user: state.session.user(),
        }
    }
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Normalize an ad-hoc batch of samples into a chart series
pub async fn normalize_samples(Json(request): Json<NormalizeRequest>) -> Json<Vec<NormalizedPoint>> {
    let samples: Vec<RawSample> = request.samples.into_iter().map(RawSample::from).collect();
    let series = normalize_detailed(&samples, request.max_points);

    for fault in &series.faults {
        tracing::debug!(%fault, "dropped malformed sample");
    }

    Json(series.points)
}

/// One settled live view for a feeder (all feeders when `feederId` is absent)
pub async fn live_snapshot(
    Query(query): Query<FeederQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let mut subscription = state.live_service.observe(query.feeder_id);
    let settled = tokio::time::timeout(
        state.snapshot_timeout,
        subscription.wait_for(LiveMetricsView::is_settled),
    )
    .await;

    match settled {
        Ok(Some(view)) => Json(view.as_ref()).into_response(),
        Ok(None) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        Err(_) => {
            tracing::warn!("live snapshot did not settle in time");
            let view = subscription.view();
            (StatusCode::GATEWAY_TIMEOUT, Json(view.as_ref())).into_response()
        }
    }
}

/// Current operator session; the token itself is never returned
pub async fn session_status(State(state): State<Arc<AppState>>) -> Json<SessionStatus> {
    Json(SessionStatus::of(&state))
}

pub async fn sign_in(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SignInRequest>,
) -> Response {
    match state.session.sign_in(&request.token, &request.user) {
        Ok(()) => {
            tracing::info!(user = %request.user, "operator signed in");
            Json(SessionStatus::of(&state)).into_response()
        }
        Err(e) => {
            tracing::error!("Failed to store session: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn sign_out(State(state): State<Arc<AppState>>) -> Response {
    match state.session.sign_out() {
        Ok(()) => Json(SessionStatus::of(&state)).into_response(),
        Err(e) => {
            tracing::error!("Failed to clear session: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Stream every live view update as Server-Sent Events.
/// The subscription ends when the client disconnects.
pub async fn live_stream(
    Query(query): Query<FeederQuery>,
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut subscription = state.live_service.observe(query.feeder_id);

    let stream = async_stream::stream! {
        let mut view = subscription.view();
        loop {
            match Event::default().event("live").json_data(view.as_ref()) {
                Ok(event) => yield Ok::<_, Infallible>(event),
                Err(e) => tracing::warn!("Failed to encode live view: {}", e),
            }
            match subscription.changed().await {
                Some(next) => view = next,
                None => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::live_metrics_service::LiveMetricsService;
    use crate::application::session_store::Session;
    use crate::application::telemetry_repository::{TelemetryQuery, TelemetryRepository};
    use crate::domain::device::{Device, DeviceCatalog, DeviceType};
    use crate::infrastructure::config::LiveConfig;
    use crate::infrastructure::session_store::InMemorySessionStore;
    use async_trait::async_trait;
    use std::time::Duration;

    struct StaticRepository;

    #[async_trait]
    impl TelemetryRepository for StaticRepository {
        async fn fetch_catalog(&self) -> anyhow::Result<DeviceCatalog> {
            Ok(DeviceCatalog::new(
                vec![],
                vec![
                    Device::new("pv-001", DeviceType::Pv, "house-01", "feeder-a", 5.0),
                    Device::new("ev-003", DeviceType::Ev, "house-02", "feeder-b", 3.6),
                ],
            ))
        }

        async fn fetch_telemetry(&self, _query: &TelemetryQuery) -> anyhow::Result<Vec<RawSample>> {
            Ok(vec![])
        }
    }

    fn state() -> Arc<AppState> {
        Arc::new(AppState {
            live_service: LiveMetricsService::new(Arc::new(StaticRepository), LiveConfig::default()),
            session: Session::new(Arc::new(InMemorySessionStore::default())),
            snapshot_timeout: Duration::from_secs(5),
        })
    }

    #[tokio::test]
    async fn test_normalize_endpoint() {
        let request: NormalizeRequest = serde_json::from_value(serde_json::json!({
            "samples": [
                {"timestamp": "2024-05-01T10:00:05Z", "p_actual_kw": 7200, "p_setpoint_kw": 7},
                {"sim_ts": "2024-05-01T10:00:00Z", "p_actual_kw": 5, "p_setpoint_kw": null},
                {"p_actual_kw": 1},
                {"timestamp": 1714564805, "p_actual_kw": 2}
            ],
            "maxPoints": 5
        }))
        .unwrap();

        let Json(points) = normalize_samples(Json(request)).await;
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].ts_iso, "2024-05-01T10:00:00Z");
        assert_eq!(points[0].setpoint_plot_kw, None);
        assert_eq!(points[1].p_actual_kw, 7.2);
        assert_eq!(points[1].setpoint_plot_kw, Some(7.0));
    }

    #[tokio::test]
    async fn test_live_snapshot_filters_feeder() {
        let response = live_snapshot(
            Query(FeederQuery {
                feeder_id: Some("feeder-b".to_string()),
            }),
            State(state()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["feederId"], "feeder-b");
        assert_eq!(json["devices"].as_array().unwrap().len(), 1);
        assert_eq!(json["devices"][0]["id"], "ev-003");
        assert_eq!(json["loading"], false);
        assert_eq!(json["health"]["status"], "critical");
    }

    #[tokio::test]
    async fn test_session_sign_in_and_out() {
        let state = state();

        let Json(status) = session_status(State(state.clone())).await;
        assert!(!status.signed_in);

        let response = sign_in(
            State(state.clone()),
            Json(SignInRequest {
                token: "abc123".to_string(),
                user: "operator".to_string(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({"signedIn": true, "user": "operator"}));
        assert_eq!(state.session.token().as_deref(), Some("abc123"));

        let response = sign_out(State(state.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let Json(status) = session_status(State(state)).await;
        assert!(!status.signed_in);
        assert_eq!(status.user, None);
    }
}
