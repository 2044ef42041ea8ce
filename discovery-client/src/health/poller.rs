use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use shared::protocol::FETCH_ERROR_STATUS;
use shared::types::{Address, HealthErrorResponse};
use crate::store::PollResult;
use super::transport::HealthTransport;

/// Cadence used until a caller configures one
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Upper bound on each individual health request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub struct PollerConfig {
    pub list: Arc<Vec<Address>>,
    /// `None` keeps whatever interval was configured before
    pub interval: Option<Duration>,
}

/// Something that polls a list of addresses on an interval.
pub trait HealthPoller {
    /// Replace the poll list (and optionally the interval), cancelling any
    /// pending tick.
    fn start(&mut self, config: PollerConfig);

    fn stop(&mut self);
}

/// Polls every address of its list once per tick, concurrently, and sends
/// each outcome to `results` as soon as it completes.
///
/// Restarting or stopping only cancels future ticks. Checks already in flight
/// run to completion and still report.
pub struct TokioHealthPoller<T> {
    transport: Arc<T>,
    results: mpsc::Sender<PollResult>,
    interval: Duration,
    request_timeout: Duration,
    task: Option<JoinHandle<()>>,
}

impl<T: HealthTransport> TokioHealthPoller<T> {
    pub fn new(transport: T, results: mpsc::Sender<PollResult>, request_timeout: Duration) -> Self {
        Self {
            transport: Arc::new(transport),
            results,
            interval: DEFAULT_POLL_INTERVAL,
            request_timeout,
            task: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_polling(&self) -> bool {
        self.task.is_some()
    }
}

impl<T: HealthTransport> HealthPoller for TokioHealthPoller<T> {
    fn start(&mut self, config: PollerConfig) {
        if let Some(interval) = config.interval {
            self.interval = interval;
        }

        self.stop();

        if config.list.is_empty() {
            tracing::debug!("Poll list is empty, health poller idle");
            return;
        }

        tracing::debug!(
            "Polling {} addresses every {}ms",
            config.list.len(),
            self.interval.as_millis()
        );

        self.task = Some(tokio::spawn(run_poll_loop(
            Arc::clone(&self.transport),
            config.list,
            self.interval,
            self.request_timeout,
            self.results.clone(),
        )));
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl<T> Drop for TokioHealthPoller<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run_poll_loop<T: HealthTransport>(
    transport: Arc<T>,
    list: Arc<Vec<Address>>,
    interval: Duration,
    request_timeout: Duration,
    results: mpsc::Sender<PollResult>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        if results.is_closed() {
            tracing::debug!("Poll result receiver dropped, health poller exiting");
            break;
        }

        tokio::spawn(poll_all(
            Arc::clone(&transport),
            Arc::clone(&list),
            request_timeout,
            results.clone(),
        ));
    }
}

async fn poll_all<T: HealthTransport>(
    transport: Arc<T>,
    list: Arc<Vec<Address>>,
    request_timeout: Duration,
    results: mpsc::Sender<PollResult>,
) {
    let mut checks: FuturesUnordered<_> = list
        .iter()
        .cloned()
        .map(|address| poll_address(transport.as_ref(), address, request_timeout))
        .collect();

    while let Some(result) = checks.next().await {
        if results.send(result).await.is_err() {
            tracing::debug!("Poll result receiver dropped mid-cycle");
            break;
        }
    }
}

/// Check both health endpoints of `address` concurrently.
pub async fn poll_address<T: HealthTransport>(
    transport: &T,
    address: Address,
    request_timeout: Duration,
) -> PollResult {
    let (health, server_health) = tokio::join!(
        with_timeout(request_timeout, transport.fetch_health(&address)),
        with_timeout(request_timeout, transport.fetch_server_health(&address)),
    );

    let (health, health_error) = match health {
        Ok(body) => (Some(body), None),
        Err(e) => (None, Some(e)),
    };
    let (server_health, server_health_error) = match server_health {
        Ok(body) => (Some(body), None),
        Err(e) => (None, Some(e)),
    };

    PollResult {
        ip: address.ip,
        port: address.port,
        health,
        server_health,
        health_error,
        server_health_error,
    }
}

async fn with_timeout<R>(
    limit: Duration,
    request: impl Future<Output = Result<R, HealthErrorResponse>>,
) -> Result<R, HealthErrorResponse> {
    match tokio::time::timeout(limit, request).await {
        Ok(result) => result,
        Err(_) => Err(HealthErrorResponse {
            status: FETCH_ERROR_STATUS,
            body: Value::String(format!("Request timed out after {}ms", limit.as_millis())),
        }),
    }
}
