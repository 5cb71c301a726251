use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::ResourceFetcher;
use crate::models::Sep2Document;
use crate::{Sep2Error, MIN_POLL_RATE};

const FETCH_FAILURES: &str = "der_sep2_fetch_failures_total";

/// How one resource is retrieved and how often the server wants it polled.
#[async_trait]
pub trait FetchStrategy: Send + Sync + 'static {
    type Output: Send + Sync + 'static;

    async fn fetch(&self, url: &str) -> Result<Self::Output, Sep2Error>;

    fn poll_rate(&self, output: &Self::Output) -> Option<Duration>;
}

/// Fetches a document over a [`ResourceFetcher`] and parses it as `T`.
pub struct XmlFetch<T> {
    fetcher: Arc<dyn ResourceFetcher>,
    _document: PhantomData<fn() -> T>,
}

impl<T> XmlFetch<T> {
    pub fn new(fetcher: Arc<dyn ResourceFetcher>) -> Self {
        Self {
            fetcher,
            _document: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Sep2Document> FetchStrategy for XmlFetch<T> {
    type Output = T;

    async fn fetch(&self, url: &str) -> Result<T, Sep2Error> {
        let xml = self.fetcher.get(url, T::QUERY).await?;
        T::parse(&xml)
    }

    fn poll_rate(&self, output: &T) -> Option<Duration> {
        output
            .poll_rate()
            .map(|seconds| Duration::from_secs(u64::from(seconds)))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollSchedule {
    pub default_rate: Duration,
    pub floor: Duration,
}

impl PollSchedule {
    pub fn new(default_rate: Duration) -> Self {
        Self {
            default_rate,
            floor: MIN_POLL_RATE,
        }
    }

    fn clamp(&self, rate: Duration) -> Duration {
        rate.max(self.floor)
    }
}

pub type ResourceListener<T> = Arc<dyn Fn(&str, Arc<T>) + Send + Sync>;

#[derive(Debug)]
pub struct Fetched<T> {
    pub value: Arc<T>,
    pub fetched_at: DateTime<Utc>,
}

impl<T> Clone for Fetched<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            fetched_at: self.fetched_at,
        }
    }
}

/// A server resource refreshed on its own task.
///
/// Each successful fetch replaces the cache and is handed to the listener. Failures are logged
/// and retried on the next tick; the cache keeps the last good value. The effective poll rate
/// starts at the default and follows the server's `pollRate`, never dropping below the floor.
pub struct PollableResource<T> {
    url: String,
    cache: watch::Receiver<Option<Fetched<T>>>,
    poll_rate_ms: Arc<AtomicU64>,
    cancel: CancellationToken,
}

impl<T: Send + Sync + 'static> PollableResource<T> {
    pub fn spawn<S>(
        url: impl Into<String>,
        schedule: PollSchedule,
        strategy: S,
        listener: ResourceListener<T>,
    ) -> Self
    where
        S: FetchStrategy<Output = T>,
    {
        let url = url.into();
        let (sender, cache) = watch::channel(None);
        let initial_rate = schedule.clamp(schedule.default_rate);
        let poll_rate_ms = Arc::new(AtomicU64::new(initial_rate.as_millis() as u64));
        let cancel = CancellationToken::new();

        tokio::spawn(poll_loop(
            url.clone(),
            schedule,
            strategy,
            listener,
            sender,
            Arc::clone(&poll_rate_ms),
            cancel.clone(),
        ));

        Self {
            url,
            cache,
            poll_rate_ms,
            cancel,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn cached(&self) -> Option<Arc<T>> {
        self.cache.borrow().as_ref().map(|fetched| Arc::clone(&fetched.value))
    }

    pub fn last_fetched_at(&self) -> Option<DateTime<Utc>> {
        self.cache.borrow().as_ref().map(|fetched| fetched.fetched_at)
    }

    pub fn effective_poll_rate(&self) -> Duration {
        Duration::from_millis(self.poll_rate_ms.load(Ordering::Relaxed))
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Fetched<T>>> {
        self.cache.clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stops polling, aborting any in-flight fetch. Safe to call more than once.
    pub fn destroy(&self) {
        if !self.cancel.is_cancelled() {
            debug!(url = %self.url, "resource destroyed");
            self.cancel.cancel();
        }
    }
}

impl<T> Drop for PollableResource<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn poll_loop<S: FetchStrategy>(
    url: String,
    schedule: PollSchedule,
    strategy: S,
    listener: ResourceListener<S::Output>,
    sender: watch::Sender<Option<Fetched<S::Output>>>,
    poll_rate_ms: Arc<AtomicU64>,
    cancel: CancellationToken,
) {
    let mut rate = schedule.clamp(schedule.default_rate);

    loop {
        let started = Instant::now();
        let result = tokio::select! {
            result = strategy.fetch(&url) => result,
            _ = cancel.cancelled() => break,
        };

        match result {
            Ok(value) => {
                if let Some(server_rate) = strategy.poll_rate(&value) {
                    rate = schedule.clamp(server_rate);
                    poll_rate_ms.store(rate.as_millis() as u64, Ordering::Relaxed);
                }
                let value = Arc::new(value);
                sender.send_replace(Some(Fetched {
                    value: Arc::clone(&value),
                    fetched_at: Utc::now(),
                }));
                listener(&url, value);
            }
            Err(err) => {
                counter!(FETCH_FAILURES).increment(1);
                warn!(url = %url, error = %err, "resource fetch failed");
            }
        }

        let delay = rate.saturating_sub(started.elapsed());
        tokio::select! {
            _ = sleep(delay) => {},
            _ = cancel.cancelled() => break,
        }
    }
}
