use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use types::{DerSample, SiteSample};

use crate::client::ResourceFetcher;
use crate::report::{
    der_capability, der_measurements, der_status, mirror_meter_reading_list,
    mirror_meter_readings, mirror_usage_point, site_measurements, DerRatings, DerStatusInput,
    Measurement, MirrorRole, Sep2Body,
};
use crate::session::Sep2State;
use crate::Sep2Error;

const REPORT_FAILURES: &str = "der_sep2_report_failures_total";
const READINGS_POSTED: &str = "der_sep2_readings_posted_total";

pub const DEFAULT_POST_RATE: Duration = Duration::from_secs(60);

/// Latest measurements to mirror to the utility server.
pub trait TelemetrySource: Send + Sync + 'static {
    fn site(&self) -> Option<SiteSample>;
    fn der(&self) -> Option<DerTelemetry>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DerTelemetry {
    pub sample: DerSample,
    pub status: DerStatusInput,
    pub ratings: DerRatings,
}

#[derive(Debug, Clone)]
pub struct ReporterConfig {
    pub lfdi: String,
    pub post_rate: Duration,
}

impl ReporterConfig {
    pub fn new(lfdi: impl Into<String>) -> Self {
        Self {
            lfdi: lfdi.into(),
            post_rate: DEFAULT_POST_RATE,
        }
    }
}

/// What one reporting cycle delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub readings_posted: usize,
    pub status_sent: bool,
    pub capability_sent: bool,
    pub failures: usize,
}

/// Posts site and DER readings to MirrorUsagePoints and keeps the DER's status and capability
/// current on the utility server.
///
/// The first cycle creates a MirrorUsagePoint per role under the advertised list; later cycles
/// post readings to the location the server returned. Targets come from the session state, so
/// reporting follows the resource graph as it changes. Failed requests are retried next cycle.
pub struct TelemetryReporter {
    fetcher: Arc<dyn ResourceFetcher>,
    source: Arc<dyn TelemetrySource>,
    state: watch::Receiver<Sep2State>,
    config: ReporterConfig,
    mirror_list_href: Option<String>,
    mirrors: HashMap<MirrorRole, String>,
    capability_sent: Option<(String, DerRatings)>,
}

impl TelemetryReporter {
    pub fn new(
        fetcher: Arc<dyn ResourceFetcher>,
        source: Arc<dyn TelemetrySource>,
        state: watch::Receiver<Sep2State>,
        config: ReporterConfig,
    ) -> Self {
        Self {
            fetcher,
            source,
            state,
            config,
            mirror_list_href: None,
            mirrors: HashMap::new(),
            capability_sent: None,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            lfdi = %self.config.lfdi,
            post_rate_secs = self.config.post_rate.as_secs(),
            "telemetry reporting started"
        );
        loop {
            let started = Instant::now();
            tokio::select! {
                summary = self.report_once(Utc::now()) => {
                    debug!(?summary, "telemetry reported");
                }
                _ = cancel.cancelled() => break,
            }

            let delay = self.config.post_rate.saturating_sub(started.elapsed());
            tokio::select! {
                _ = sleep(delay) => {},
                _ = cancel.cancelled() => break,
            }
        }
    }

    pub async fn report_once(&mut self, now: DateTime<Utc>) -> ReportSummary {
        let (list_href, status_href, capability_href) = {
            let state = self.state.borrow();
            (
                state.mirror_usage_point_list_href.clone(),
                state.der_status_href.clone(),
                state.der_capability_href.clone(),
            )
        };
        if list_href != self.mirror_list_href {
            self.mirrors.clear();
            self.mirror_list_href = list_href.clone();
        }

        let mut summary = ReportSummary::default();
        let der = self.source.der();

        if let Some(list_href) = &list_href {
            if let Some(site) = self.source.site() {
                let measurements = site_measurements(&site);
                self.mirror(list_href, MirrorRole::Site, &measurements, now, &mut summary)
                    .await;
            }
            if let Some(der) = &der {
                let measurements = der_measurements(&der.sample);
                self.mirror(list_href, MirrorRole::Der, &measurements, now, &mut summary)
                    .await;
            }
        }

        let Some(der) = der else {
            return summary;
        };
        if let Some(href) = &status_href {
            match self.put(href, &der_status(der.status, now)).await {
                Ok(()) => summary.status_sent = true,
                Err(err) => self.failed(href, "DERStatus", &err, &mut summary),
            }
        }
        // capability only changes with the nameplate, so it is sent once per target
        if let Some(href) = capability_href {
            let current = (href, der.ratings);
            if self.capability_sent.as_ref() != Some(&current) {
                match self.put(&current.0, &der_capability(der.ratings)).await {
                    Ok(()) => {
                        summary.capability_sent = true;
                        self.capability_sent = Some(current);
                    }
                    Err(err) => self.failed(&current.0, "DERCapability", &err, &mut summary),
                }
            }
        }
        summary
    }

    async fn mirror(
        &mut self,
        list_href: &str,
        role: MirrorRole,
        measurements: &[Measurement],
        now: DateTime<Utc>,
        summary: &mut ReportSummary,
    ) {
        if measurements.is_empty() {
            return;
        }
        let readings = mirror_meter_readings(
            &self.config.lfdi,
            role,
            measurements,
            now,
            self.config.post_rate,
        );
        let count = readings.len();

        let (href, result) = match self.mirrors.get(&role) {
            Some(location) => {
                let result = self
                    .post(location, &mirror_meter_reading_list(readings))
                    .await
                    .map(|_| None);
                (location.clone(), result)
            }
            None => {
                let point = mirror_usage_point(&self.config.lfdi, role, readings);
                (list_href.to_string(), self.post(list_href, &point).await)
            }
        };

        match result {
            Ok(location) => {
                if let Some(location) = location {
                    debug!(?role, %location, "mirror usage point created");
                    self.mirrors.insert(role, location);
                }
                counter!(READINGS_POSTED).increment(count as u64);
                summary.readings_posted += count;
            }
            Err(err) => self.failed(&href, "MirrorMeterReading", &err, summary),
        }
    }

    async fn post<B: Sep2Body + Sync>(
        &self,
        href: &str,
        body: &B,
    ) -> Result<Option<String>, Sep2Error> {
        let xml = body.to_xml()?;
        self.fetcher.post(href, xml).await
    }

    async fn put<B: Sep2Body + Sync>(&self, href: &str, body: &B) -> Result<(), Sep2Error> {
        let xml = body.to_xml()?;
        self.fetcher.put(href, xml).await
    }

    fn failed(&self, href: &str, resource: &str, err: &Sep2Error, summary: &mut ReportSummary) {
        counter!(REPORT_FAILURES).increment(1);
        warn!(href, resource, error = %err, "report to utility server failed");
        summary.failures += 1;
    }
}
