// Platform API repository implementation
use crate::application::session_store::Session;
use crate::application::telemetry_repository::{TelemetryQuery, TelemetryRepository};
use crate::domain::device::{Device, DeviceCatalog, Feeder};
use crate::domain::sample::RawSample;
use crate::infrastructure::wire::WireSample;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;

#[derive(Clone)]
pub struct HttpRepository {
    base_url: String,
    client: reqwest::Client,
    session: Session,
}

impl HttpRepository {
    pub fn new(base_url: String, timeout: Duration, session: Session) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            session,
        })
    }

    fn build_telemetry_url(&self, query: &TelemetryQuery) -> String {
        let mut params = Vec::new();
        if let Some(feeder_id) = &query.feeder_id {
            params.push(format!("feederId={}", urlencoding::encode(feeder_id)));
        }
        if let Some(since) = &query.since {
            params.push(format!("since={}", urlencoding::encode(since)));
        }
        if let Some(limit) = query.limit {
            params.push(format!("limit={}", limit));
        }

        if params.is_empty() {
            format!("{}/api/telemetry", self.base_url)
        } else {
            format!("{}/api/telemetry?{}", self.base_url, params.join("&"))
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut request = self.client.get(url).header("Accept", "application/json");
        if let Some(token) = self.session.token() {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("GET {} failed with status {}: {}", url, status, body);
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }
}

#[async_trait]
impl TelemetryRepository for HttpRepository {
    async fn fetch_catalog(&self) -> Result<DeviceCatalog> {
        let feeders_url = format!("{}/api/feeders", self.base_url);
        let devices_url = format!("{}/api/devices", self.base_url);

        let (feeders, devices) = tokio::try_join!(
            self.get_json::<Vec<Feeder>>(&feeders_url),
            self.get_json::<Vec<Device>>(&devices_url),
        )?;

        tracing::debug!(
            feeders = feeders.len(),
            devices = devices.len(),
            "fetched device catalog"
        );
        Ok(DeviceCatalog::new(feeders, devices))
    }

    async fn fetch_telemetry(&self, query: &TelemetryQuery) -> Result<Vec<RawSample>> {
        let url = self.build_telemetry_url(query);
        let samples: Vec<WireSample> = self.get_json(&url).await?;

        tracing::debug!(samples = samples.len(), ?query, "fetched telemetry");
        Ok(samples.into_iter().map(RawSample::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::session_store::InMemorySessionStore;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn repository(base_url: &str) -> HttpRepository {
        let session = Session::new(Arc::new(InMemorySessionStore::default()));
        HttpRepository::new(base_url.to_string(), Duration::from_secs(5), session).unwrap()
    }

    #[test]
    fn test_build_telemetry_url() {
        let repo = repository("http://derms.local:4000/");

        assert_eq!(
            repo.build_telemetry_url(&TelemetryQuery::default()),
            "http://derms.local:4000/api/telemetry"
        );

        let query = TelemetryQuery {
            feeder_id: Some("feeder a".to_string()),
            since: Some("2024-05-01T10:00:00+02:00".to_string()),
            limit: Some(50),
        };
        assert_eq!(
            repo.build_telemetry_url(&query),
            "http://derms.local:4000/api/telemetry?feederId=feeder%20a&since=2024-05-01T10%3A00%3A00%2B02%3A00&limit=50"
        );
    }

    async fn devices(headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == "Bearer secret");
        if !authorized {
            return Err(StatusCode::UNAUTHORIZED);
        }
        Ok(Json(json!([
            {"id": "ev-001", "type": "ev", "siteId": "house-01", "feederId": "feeder-a", "pMaxKw": 7.2, "priority": 3}
        ])))
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn platform() -> Router {
        Router::new()
            .route(
                "/api/feeders",
                get(|| async { Json(json!([{"feederId": "feeder-a", "name": "North"}])) }),
            )
            .route("/api/devices", get(devices))
            .route(
                "/api/telemetry",
                get(|| async {
                    Json(json!([
                        {"deviceId": "ev-001", "timestamp": "2024-05-01T12:00:00Z", "p_actual_kw": 3.0, "p_setpoint_kw": null},
                        {"deviceId": "ev-001", "timestampMs": 1714564805000i64, "payload": {"readings": {"powerKw": 3.5}}}
                    ]))
                }),
            )
    }

    #[tokio::test]
    async fn test_fetch_with_bearer_token() {
        let base_url = serve(platform()).await;
        let repo = repository(&base_url);
        repo.session.sign_in("secret", "operator").unwrap();

        let catalog = repo.fetch_catalog().await.unwrap();
        assert_eq!(catalog.feeders.len(), 1);
        assert_eq!(catalog.devices[0].id, "ev-001");

        let samples = repo
            .fetch_telemetry(&TelemetryQuery::for_feeder(Some("feeder-a".to_string()), 10))
            .await
            .unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].timestamp.as_deref(), Some("2024-05-01T12:00:05.000Z"));
        assert_eq!(samples[1].p_actual_kw, 3.5);
    }

    #[tokio::test]
    async fn test_unauthorized_is_an_error() {
        let base_url = serve(platform()).await;
        let repo = repository(&base_url);

        let err = repo.fetch_catalog().await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }
}
