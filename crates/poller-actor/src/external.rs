//! Site telemetry pushed by an external provider instead of polled over Modbus.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use types::{SampleError, SiteSample, SiteSampleData};

use crate::{PollerError, SampleSource};

/// Write side: validates provider payloads and keeps the last valid one.
#[derive(Clone)]
pub struct ExternalSiteFeed {
    latest: watch::Sender<Option<SiteSampleData>>,
}

/// Read side: republishes the last valid payload with a fresh timestamp on every tick.
pub struct ExternalSiteSource {
    latest: watch::Receiver<Option<SiteSampleData>>,
}

impl ExternalSiteSource {
    pub fn channel() -> (ExternalSiteFeed, ExternalSiteSource) {
        let (latest, receiver) = watch::channel(None);
        (
            ExternalSiteFeed { latest },
            ExternalSiteSource { latest: receiver },
        )
    }
}

impl ExternalSiteFeed {
    /// Malformed payloads are rejected and leave the previous sample in place.
    pub fn push_json(&self, payload: &str) -> Result<(), SampleError> {
        let data = SiteSampleData::from_json(payload)?;
        self.latest.send_replace(Some(data));
        Ok(())
    }

    /// Consumes raw payloads until the channel closes or `cancel` fires.
    pub async fn run(self, mut payloads: mpsc::Receiver<String>, cancel: CancellationToken) {
        loop {
            let payload = tokio::select! {
                payload = payloads.recv() => payload,
                _ = cancel.cancelled() => break,
            };
            let Some(payload) = payload else {
                debug!("external site feed closed");
                break;
            };
            if let Err(err) = self.push_json(&payload) {
                warn!(error = %err, "rejected external site sample");
            }
        }
    }
}

#[async_trait]
impl SampleSource for ExternalSiteSource {
    type Sample = SiteSample;

    fn name(&self) -> &'static str {
        "external_site"
    }

    async fn poll(&self) -> Result<SiteSample, PollerError> {
        let latest = self.latest.borrow().clone();
        latest
            .map(|data| data.into_sample(Utc::now()))
            .ok_or(PollerError::NoData)
    }
}
