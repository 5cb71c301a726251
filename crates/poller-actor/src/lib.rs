pub mod aggregate;
pub mod external;
pub mod inverter;
pub mod meter;

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use metrics::{counter, histogram};
use sunspec_codec::{CodecError, SunSpecConnection};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use types::DeviceIdentity;

pub use external::{ExternalSiteFeed, ExternalSiteSource};
pub use inverter::{InverterPoller, InverterSnapshot, InvertersSample, NameplateTotals};
pub use meter::MeterPoller;

/// Polling faster than this only queues requests behind the fieldbus.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// A SunSpec device shared between a poller and the controller.
pub struct SunSpecDevice<T> {
    pub identity: DeviceIdentity,
    pub connection: Arc<SunSpecConnection<T>>,
}

impl<T> Clone for SunSpecDevice<T> {
    fn clone(&self) -> Self {
        Self {
            identity: self.identity.clone(),
            connection: Arc::clone(&self.connection),
        }
    }
}

const POLL_CYCLE_SECONDS: &str = "der_poll_cycle_seconds";
const POLL_FAILURES: &str = "der_poll_failures_total";

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub poll_interval: Duration,
    pub jitter_ms: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            jitter_ms: 0,
        }
    }
}

impl PollerConfig {
    pub fn effective_interval(&self) -> Duration {
        self.poll_interval.max(MIN_POLL_INTERVAL)
    }
}

#[derive(Debug, Error)]
pub enum PollerError {
    #[error("device {device}: {source}")]
    Device {
        device: DeviceIdentity,
        #[source]
        source: CodecError,
    },
    #[error("device {device} did not report {value}")]
    MissingValue {
        device: DeviceIdentity,
        value: &'static str,
    },
    #[error("sample is missing {0}")]
    Incomplete(&'static str),
    #[error("no devices configured")]
    NoDevices,
    #[error("no sample received yet")]
    NoData,
}

/// One tick of a data poller. Implementations read every device and either produce a complete
/// sample or fail the whole tick.
#[async_trait]
pub trait SampleSource: Send + Sync + 'static {
    type Sample: Send + Sync + 'static;

    fn name(&self) -> &'static str;

    async fn poll(&self) -> Result<Self::Sample, PollerError>;
}

/// Latest published sample. `None` until the first successful tick.
pub type SampleReceiver<S> = watch::Receiver<Option<Arc<S>>>;

/// Drives a [`SampleSource`] on a fixed cadence and publishes each sample atomically.
pub struct PollerActor<S: SampleSource> {
    source: S,
    config: PollerConfig,
    sender: watch::Sender<Option<Arc<S::Sample>>>,
    cancel: CancellationToken,
}

impl<S: SampleSource> PollerActor<S> {
    pub fn new(
        source: S,
        config: PollerConfig,
        cancel: CancellationToken,
    ) -> (Self, SampleReceiver<S::Sample>) {
        let (sender, receiver) = watch::channel(None);
        (
            Self {
                source,
                config,
                sender,
                cancel,
            },
            receiver,
        )
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        let name = self.source.name();
        let interval = self.config.effective_interval();
        let mut iteration = 0u64;
        info!(poller = name, interval_ms = interval.as_millis(), "poller started");

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let cycle_start = Instant::now();
            let outcome = tokio::select! {
                outcome = self.source.poll() => outcome,
                _ = self.cancel.cancelled() => break,
            };
            let elapsed = cycle_start.elapsed();
            histogram!(POLL_CYCLE_SECONDS, "poller" => name).record(elapsed.as_secs_f64());

            match outcome {
                Ok(sample) => {
                    self.sender.send_replace(Some(Arc::new(sample)));
                    debug!(poller = name, elapsed_ms = elapsed.as_millis(), "poll cycle complete");
                }
                Err(PollerError::NoData) => {
                    debug!(poller = name, "poll cycle skipped, no data");
                }
                Err(err) => {
                    counter!(POLL_FAILURES, "poller" => name).increment(1);
                    warn!(poller = name, error = %err, "poll cycle failed");
                }
            }

            iteration = iteration.wrapping_add(1);
            let delay = jittered_delay(
                interval.saturating_sub(elapsed),
                self.config.jitter_ms,
                iteration,
            );

            tokio::select! {
                _ = sleep(delay) => {},
                _ = self.cancel.cancelled() => break,
            }
        }

        info!(poller = name, "poller stopped");
    }
}

fn jittered_delay(base: Duration, jitter_ms: u64, iteration: u64) -> Duration {
    if jitter_ms == 0 {
        return base;
    }

    let seed = unix_ms().wrapping_add(iteration.wrapping_mul(1_664_525));
    base + Duration::from_millis(seed % jitter_ms)
}

fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_has_a_floor() {
        let config = PollerConfig {
            poll_interval: Duration::from_millis(50),
            jitter_ms: 0,
        };
        assert_eq!(config.effective_interval(), MIN_POLL_INTERVAL);
        assert_eq!(PollerConfig::default().effective_interval(), Duration::from_secs(1));
    }

    #[test]
    fn jitter_stays_within_window() {
        let base = Duration::from_millis(500);
        assert_eq!(jittered_delay(base, 0, 3), base);
        let delay = jittered_delay(base, 100, 7);
        assert!(delay >= base && delay < base + Duration::from_millis(100));
    }
}
