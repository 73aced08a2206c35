use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use reqwest::Client;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{PollState, SensorSnapshot};
use crate::config::{Settings, DEFAULT_REFRESH_MS};
use crate::error::SensorError;

#[derive(Default)]
struct InFlight {
    generation: u64,
    token: Option<CancellationToken>,
}

/// Keeps a near-real-time view of the cabinet sensor endpoint.
///
/// At most one request is in flight: every fetch cancels the one before it, and a
/// generation check guarantees a stale response can never overwrite newer state.
/// Consumers observe [`PollState`] through [`SensorPoller::subscribe`].
pub struct SensorPoller {
    client: Client,
    endpoint: String,
    refresh: Duration,
    state: watch::Sender<PollState>,
    inflight: Mutex<InFlight>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl SensorPoller {
    pub fn new(endpoint: impl Into<String>, refresh: Duration) -> Self {
        Self::with_client(Client::new(), endpoint, refresh)
    }

    /// A zero `refresh` falls back to [`DEFAULT_REFRESH_MS`].
    pub fn with_client(client: Client, endpoint: impl Into<String>, refresh: Duration) -> Self {
        let refresh = if refresh.is_zero() {
            warn!("zero sensor refresh interval, using default");
            Duration::from_millis(DEFAULT_REFRESH_MS)
        } else {
            refresh
        };
        let (state, _) = watch::channel(PollState::default());
        Self {
            client,
            endpoint: endpoint.into(),
            refresh,
            state,
            inflight: Mutex::new(InFlight::default()),
            ticker: Mutex::new(None),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.sensor_url.clone(), settings.refresh)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh
    }

    /// Current state snapshot.
    pub fn state(&self) -> PollState {
        self.state.borrow().clone()
    }

    /// Observe state changes. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.state.subscribe()
    }

    /// Fetch the latest snapshot, superseding any request still in flight.
    /// Never fails: the outcome is recorded in [`PollState`].
    pub async fn fetch_latest(&self) {
        let (generation, token) = self.begin_request();

        let outcome = tokio::select! {
            _ = token.cancelled() => {
                debug!(generation, "sensor request superseded");
                return;
            }
            outcome = self.request() => outcome,
        };

        self.finish_request(generation, outcome);
    }

    /// Manual refresh trigger.
    pub async fn refetch(&self) {
        self.fetch_latest().await
    }

    /// Fetch now, then every refresh interval until [`SensorPoller::stop_polling`]
    /// or until the last handle is dropped. Restarts the timer when already polling.
    /// Must be called from within a tokio runtime.
    pub fn start_polling(self: &Arc<Self>) {
        let poller = Arc::downgrade(self);
        let refresh = self.refresh;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(refresh);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(poller) = poller.upgrade() else {
                    break;
                };
                // Own task per tick so a hung request is superseded by the next one
                tokio::spawn(async move { poller.fetch_latest().await });
            }
        });

        if let Some(previous) = lock(&self.ticker).replace(handle) {
            previous.abort();
        }
        info!(endpoint = %self.endpoint, refresh_ms = self.refresh.as_millis() as u64, "sensor polling started");
    }

    /// Stop the timer and cancel any pending request.
    pub fn stop_polling(&self) {
        if let Some(handle) = lock(&self.ticker).take() {
            handle.abort();
            info!(endpoint = %self.endpoint, "sensor polling stopped");
        }

        let mut inflight = lock(&self.inflight);
        if let Some(token) = inflight.token.take() {
            token.cancel();
        }
        // Responses already past the cancellation point are discarded too
        inflight.generation += 1;
        self.state.send_modify(|state| state.is_loading = false);
    }

    pub fn is_polling(&self) -> bool {
        lock(&self.ticker).as_ref().is_some_and(|handle| !handle.is_finished())
    }

    fn begin_request(&self) -> (u64, CancellationToken) {
        let mut inflight = lock(&self.inflight);
        if let Some(previous) = inflight.token.take() {
            previous.cancel();
        }
        inflight.generation += 1;
        let token = CancellationToken::new();
        inflight.token = Some(token.clone());
        self.state.send_modify(|state| state.is_loading = true);
        (inflight.generation, token)
    }

    fn finish_request(&self, generation: u64, outcome: Result<SensorSnapshot, SensorError>) {
        let mut inflight = lock(&self.inflight);
        if inflight.generation != generation {
            debug!(generation, current = inflight.generation, "discarding stale sensor response");
            return;
        }
        inflight.token = None;
        self.state.send_modify(|state| apply_outcome(state, outcome));
    }

    async fn request(&self) -> Result<SensorSnapshot, SensorError> {
        let cache_buster = Utc::now().timestamp_millis().to_string();
        debug!(endpoint = %self.endpoint, "fetching sensor snapshot");

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("_", cache_buster)])
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SensorError::Network {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown Status").to_string(),
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

impl Drop for SensorPoller {
    fn drop(&mut self) {
        let ticker = self.ticker.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = ticker.take() {
            handle.abort();
        }
        let inflight = self.inflight.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = inflight.token.take() {
            token.cancel();
        }
    }
}

/// Fold one fetch outcome into the state. Prior data survives every failure.
fn apply_outcome(state: &mut PollState, outcome: Result<SensorSnapshot, SensorError>) {
    match outcome {
        Ok(snapshot) => {
            if snapshot.ok {
                state.error = None;
                state.last_success_at = match snapshot.parsed_timestamp() {
                    Some(ts) => Some(ts),
                    None => {
                        warn!(timestamp = %snapshot.timestamp, "sensor timestamp is not RFC 3339, using receipt time");
                        Some(Utc::now())
                    }
                };
            } else {
                state.error = snapshot.error.clone();
            }
            state.data = Some(snapshot);
        }
        Err(err) => {
            warn!(error = %err, "sensor fetch failed");
            state.error = Some(err.to_string());
        }
    }
    state.is_loading = false;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
