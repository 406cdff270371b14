// Live metrics service - polls the platform and publishes feeder snapshots
use crate::application::telemetry_repository::{TelemetryQuery, TelemetryRepository};
use crate::domain::device::DeviceCatalog;
use crate::domain::live_view::{
    aggregate, assess_health, summarize, DeviceSeries, FetchFailure, FetchStage, LiveMetricsView,
};
use crate::domain::sample::RawSample;
use crate::domain::tracking::{DeviceTrackingRecord, TrackingWindow};
use crate::infrastructure::config::LiveConfig;
use chrono::{SecondsFormat, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Clone)]
pub struct LiveMetricsService {
    repository: Arc<dyn TelemetryRepository>,
    config: LiveConfig,
}

impl LiveMetricsService {
    pub fn new(repository: Arc<dyn TelemetryRepository>, config: LiveConfig) -> Self {
        Self { repository, config }
    }

    /// Start a live view for one feeder (all feeders for `None`).
    ///
    /// The view refreshes on the polling interval, on filter changes and on
    /// catalog notifications until the subscription is dropped.
    pub fn observe(&self, feeder_id: Option<String>) -> Subscription {
        let (view_tx, view_rx) = watch::channel(Arc::new(LiveMetricsView::idle(feeder_id.clone())));
        let (feeder_tx, feeder_rx) = watch::channel(feeder_id);
        let catalog_changed = Arc::new(Notify::new());

        let worker = RefreshWorker {
            repository: self.repository.clone(),
            config: self.config.clone(),
            view_tx,
            feeder_rx,
            catalog_changed: catalog_changed.clone(),
            windows: HashMap::new(),
            settled_feeder: None,
        };

        Subscription {
            view_rx,
            feeder_tx,
            catalog_changed,
            task: tokio::spawn(worker.run()),
        }
    }
}

/// Handle to one live view. Dropping it tears the refresh task down.
pub struct Subscription {
    view_rx: watch::Receiver<Arc<LiveMetricsView>>,
    feeder_tx: watch::Sender<Option<String>>,
    catalog_changed: Arc<Notify>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Latest published snapshot
    pub fn view(&self) -> Arc<LiveMetricsView> {
        self.view_rx.borrow().clone()
    }

    pub fn feeder_id(&self) -> Option<String> {
        self.feeder_tx.borrow().clone()
    }

    /// Wait for the next snapshot. `None` once the refresh task has stopped.
    pub async fn changed(&mut self) -> Option<Arc<LiveMetricsView>> {
        self.view_rx.changed().await.ok()?;
        Some(self.view_rx.borrow_and_update().clone())
    }

    /// Wait until a snapshot satisfies `predicate`, checking the current one first.
    pub async fn wait_for<F>(&mut self, mut predicate: F) -> Option<Arc<LiveMetricsView>>
    where
        F: FnMut(&LiveMetricsView) -> bool,
    {
        let view = self.view_rx.wait_for(|view| predicate(view.as_ref())).await.ok()?;
        Some(Arc::clone(&view))
    }

    /// Switch the feeder filter; any refresh in flight for the old filter is abandoned.
    pub fn set_feeder(&self, feeder_id: Option<String>) {
        self.feeder_tx.send_if_modified(|current| {
            if *current == feeder_id {
                false
            } else {
                *current = feeder_id;
                true
            }
        });
    }

    /// Trigger a refresh without waiting for the next poll.
    pub fn notify_catalog_changed(&self) {
        self.catalog_changed.notify_one();
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Fetched {
    catalog: DeviceCatalog,
    samples: Vec<RawSample>,
}

struct RefreshWorker {
    repository: Arc<dyn TelemetryRepository>,
    config: LiveConfig,
    view_tx: watch::Sender<Arc<LiveMetricsView>>,
    feeder_rx: watch::Receiver<Option<String>>,
    catalog_changed: Arc<Notify>,
    windows: HashMap<String, TrackingWindow>,
    /// Filter of the last successful refresh
    settled_feeder: Option<Option<String>>,
}

impl RefreshWorker {
    async fn run(mut self) {
        let period = self.config.poll_interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let feeder_id = self.feeder_rx.borrow_and_update().clone();
            self.publish(LiveMetricsView::loading);

            let query = TelemetryQuery::for_feeder(feeder_id.clone(), self.config.telemetry_limit)
                .since(self.since(&feeder_id));
            let fetch = fetch_snapshot(self.repository.clone(), query, self.config.fetch_timeout());

            tokio::select! {
                biased;
                changed = self.feeder_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    tracing::debug!(?feeder_id, "feeder filter changed, abandoning refresh");
                    self.refilter();
                    continue;
                }
                result = fetch => self.apply(feeder_id, result),
            }

            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.catalog_changed.notified() => {
                    tracing::debug!("catalog changed, refreshing early");
                }
                changed = self.feeder_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    self.refilter();
                }
            }
        }
    }

    /// Oldest of the newest retained timestamps across the devices in view.
    /// `None` until a refresh for this filter has settled.
    fn since(&self, feeder_id: &Option<String>) -> Option<String> {
        if self.settled_feeder.as_ref() != Some(feeder_id) {
            return None;
        }

        let view = self.view_tx.borrow();
        view.devices
            .iter()
            .filter_map(|d| self.windows.get(&d.id)?.latest())
            .map(|p| p.ts_iso.clone())
            .min()
    }

    fn publish<F>(&self, next: F)
    where
        F: FnOnce(&LiveMetricsView) -> LiveMetricsView,
    {
        let view = {
            let current = self.view_tx.borrow();
            next(current.as_ref())
        };
        self.view_tx.send_replace(Arc::new(view));
    }

    fn refilter(&self) {
        let feeder_id = self.feeder_rx.borrow().clone();
        self.publish(|view| view.refiltered(feeder_id));
    }

    fn apply(&mut self, feeder_id: Option<String>, result: Result<Fetched, FetchFailure>) {
        // A filter change that raced the fetch wins; the next loop turn handles it.
        if self.feeder_rx.has_changed().unwrap_or(true) {
            return;
        }

        match result {
            Ok(fetched) => {
                self.settled_feeder = Some(feeder_id.clone());
                let view = self.build_view(feeder_id, fetched);
                tracing::debug!(
                    feeder_id = ?view.feeder_id,
                    devices = view.devices.len(),
                    "live view refreshed"
                );
                self.publish(move |_| view);
            }
            Err(failure) => {
                tracing::warn!(?feeder_id, error = %failure, "live view refresh failed");
                self.publish(move |view| view.errored(failure));
            }
        }
    }

    fn build_view(&mut self, feeder_id: Option<String>, fetched: Fetched) -> LiveMetricsView {
        let Fetched { catalog, samples } = fetched;
        let devices = catalog.for_feeder(feeder_id.as_deref());

        let mut by_device: HashMap<String, Vec<RawSample>> = HashMap::new();
        for sample in samples {
            match sample.device_id.clone() {
                Some(device_id) => by_device.entry(device_id).or_default().push(sample),
                None => tracing::debug!("ignoring telemetry sample without deviceId"),
            }
        }

        self.windows
            .retain(|id, _| catalog.devices.iter().any(|d| &d.id == id));

        let capacity = self.config.retained_points();
        for device in &devices {
            let mut batch: Vec<RawSample> = device.latest_telemetry.iter().cloned().collect();
            batch.extend(by_device.remove(&device.id).unwrap_or_default());
            if batch.is_empty() {
                continue;
            }

            let window = self
                .windows
                .entry(device.id.clone())
                .or_insert_with(|| TrackingWindow::new(capacity));
            for fault in window.merge(&batch) {
                tracing::debug!(device_id = %device.id, %fault, "dropped malformed sample");
            }
        }

        let tracking: Vec<DeviceTrackingRecord> = devices
            .iter()
            .map(|d| DeviceTrackingRecord::build(d, self.windows.get(&d.id), self.config.tracking_window))
            .collect();

        let history: Vec<DeviceSeries> = devices
            .iter()
            .filter_map(|d| {
                let window = self.windows.get(&d.id)?;
                Some(DeviceSeries {
                    device_id: d.id.clone(),
                    feeder_id: d.feeder_id.clone(),
                    points: window.series(self.config.history_points),
                })
            })
            .collect();

        LiveMetricsView {
            summary: Some(summarize(&catalog, feeder_id.as_deref(), &devices, &tracking)),
            health: Some(assess_health(&devices, &tracking, self.config.tracking_tolerance)),
            aggregated: Some(aggregate(&tracking)),
            feeder_id,
            devices,
            history,
            tracking,
            loading: false,
            error: None,
            refreshed_at: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }
}

async fn fetch_snapshot(
    repository: Arc<dyn TelemetryRepository>,
    query: TelemetryQuery,
    timeout: Duration,
) -> Result<Fetched, FetchFailure> {
    let work = async {
        let (catalog, samples) =
            tokio::join!(repository.fetch_catalog(), repository.fetch_telemetry(&query));
        let catalog =
            catalog.map_err(|e| FetchFailure::new(FetchStage::Catalog, format!("{:#}", e)))?;
        let samples =
            samples.map_err(|e| FetchFailure::new(FetchStage::Telemetry, format!("{:#}", e)))?;
        Ok(Fetched { catalog, samples })
    };

    match tokio::time::timeout(timeout, work).await {
        Ok(result) => result,
        Err(_) => Err(FetchFailure::new(
            FetchStage::Timeout,
            format!("refresh did not complete within {}s", timeout.as_secs()),
        )),
    }
}
