use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use metrics::{counter, histogram};
use modbus_client::RegisterTransport;
use poller_actor::{InvertersSample, NameplateTotals, SampleReceiver, SunSpecDevice};
use serde::Serialize;
use sunspec_codec::models::controls::{conn, w_max_lim_ena};
use sunspec_codec::models::ControlsWrite;
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use types::{
    ActiveInverterControlLimit, ControlLimit, InverterConfiguration, LimiterKind, SiteSample,
};

use crate::fusion::fuse;
use crate::limiters::LimiterHandle;
use crate::ControlError;

pub const MIN_CONTROL_INTERVAL: Duration = Duration::from_millis(200);
pub const MAX_CONTROL_INTERVAL: Duration = Duration::from_secs(1);

const CONTROL_CYCLE_SECONDS: &str = "der_control_cycle_seconds";
const CONTROL_SKIPS: &str = "der_control_skips_total";
const CONTROL_WRITES: &str = "der_control_writes_total";
const CONTROL_WRITE_FAILURES: &str = "der_control_write_failures_total";

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            interval: MAX_CONTROL_INTERVAL,
        }
    }
}

impl ControllerConfig {
    pub fn effective_interval(&self) -> Duration {
        self.interval.clamp(MIN_CONTROL_INTERVAL, MAX_CONTROL_INTERVAL)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    /// No inverter sample, so the fleet capability is unknown.
    NoNameplate,
    /// An export limit applies but the site has not been measured yet.
    NoSiteSample,
    Unchanged,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::NoNameplate => "no_nameplate",
            SkipReason::NoSiteSample => "no_site_sample",
            SkipReason::Unchanged => "unchanged",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CycleOutcome {
    Skipped {
        reason: SkipReason,
    },
    #[serde(rename_all = "camelCase")]
    Applied {
        configuration: InverterConfiguration,
        written: usize,
        failed: usize,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerStatus {
    pub limits: Vec<(LimiterKind, ControlLimit)>,
    pub fused: ActiveInverterControlLimit,
    pub configuration: Option<InverterConfiguration>,
    pub last_outcome: Option<CycleOutcome>,
    pub last_applied_at: Option<DateTime<Utc>>,
}

/// Bounds a fleet target to what the nameplate allows.
pub fn clamp_to_nameplate(target_watts: f64, nameplate: &NameplateTotals) -> f64 {
    let ceiling = nameplate.max_w.min(nameplate.max_va).max(0.0);
    if target_watts.is_nan() {
        return 0.0;
    }
    target_watts.clamp(0.0, ceiling)
}

/// Turns the fused limit and the latest samples into a fleet configuration.
///
/// Connect and energize default to on; either one off yields a zero target. An export limit is
/// enforced against the site meter: generation is reduced by however much export exceeds the
/// limit. The generation cap applies next, then the nameplate bound.
pub fn derive_configuration(
    fused: &ActiveInverterControlLimit,
    inverters: Option<&InvertersSample>,
    site: Option<&SiteSample>,
) -> Result<InverterConfiguration, SkipReason> {
    let inverters = inverters.ok_or(SkipReason::NoNameplate)?;
    let nameplate = &inverters.nameplate;
    if nameplate.max_w <= 0.0 {
        return Err(SkipReason::NoNameplate);
    }

    let connect = fused.op_mod_connect.map_or(true, |connect| connect.value);
    let energize = fused.op_mod_energize.map_or(true, |energize| energize.value);
    let ramp_tms = fused.ramp_tms.map(|ramp| ramp.value);

    if !connect || !energize {
        return Ok(InverterConfiguration {
            connect,
            energize,
            target_solar_watts: 0.0,
            target_solar_power_ratio: 0.0,
            ramp_tms,
        });
    }

    let mut target = f64::INFINITY;
    if let Some(export_limit) = fused.op_mod_exp_lim_w {
        let site = site.ok_or(SkipReason::NoSiteSample)?;
        let solar = inverters.der.real_power.net();
        let export = -site.real_power.net();
        target = (solar - (export - export_limit.value)).max(0.0);
    }
    if let Some(generation_limit) = fused.op_mod_gen_lim_w {
        target = target.min(generation_limit.value);
    }

    let target = clamp_to_nameplate(target, nameplate);
    Ok(InverterConfiguration {
        connect,
        energize,
        target_solar_watts: target,
        target_solar_power_ratio: (target / nameplate.max_w).clamp(0.0, 1.0),
        ramp_tms,
    })
}

/// Register values for one inverter. `WMaxLimPct` is expressed in the device's own scale.
pub fn controls_write(configuration: &InverterConfiguration, scale_factor: i16) -> ControlsWrite {
    let scale_factor = if scale_factor == i16::MIN { 0 } else { scale_factor };
    let percent = configuration.target_solar_power_ratio * 100.0;
    let raw_percent = (percent / 10f64.powi(i32::from(scale_factor)))
        .round()
        .clamp(0.0, f64::from(u16::MAX)) as u16;
    // hundredths of a second on the utility side, whole seconds on the device
    let ramp_seconds = configuration
        .ramp_tms
        .map_or(0, |tms| u16::try_from(tms / 100).unwrap_or(u16::MAX));

    ControlsWrite {
        conn: if configuration.is_generating() {
            conn::CONNECT
        } else {
            conn::DISCONNECT
        },
        w_max_lim_pct: raw_percent,
        w_max_lim_pct_rmp_tms: ramp_seconds,
        w_max_lim_ena: w_max_lim_ena::ENABLED,
        ..ControlsWrite::default()
    }
}

/// Samples every limiter, fuses the limits and writes the result to the fleet.
///
/// A configuration is written only when it differs from the last one every inverter accepted.
/// A failed inverter does not block the others; it is retried on a later cycle.
pub struct InverterController<T> {
    devices: Vec<SunSpecDevice<T>>,
    limiters: Vec<LimiterHandle>,
    inverters: SampleReceiver<InvertersSample>,
    site: SampleReceiver<SiteSample>,
    config: ControllerConfig,
    last_applied: Option<InverterConfiguration>,
    status: watch::Sender<ControllerStatus>,
}

impl<T> InverterController<T>
where
    T: RegisterTransport + 'static,
{
    /// `limiters` are given in priority order.
    pub fn new(
        devices: Vec<SunSpecDevice<T>>,
        limiters: Vec<LimiterHandle>,
        inverters: SampleReceiver<InvertersSample>,
        site: SampleReceiver<SiteSample>,
        config: ControllerConfig,
    ) -> Self {
        let (status, _) = watch::channel(ControllerStatus::default());
        Self {
            devices,
            limiters,
            inverters,
            site,
            config,
            last_applied: None,
            status,
        }
    }

    pub fn status(&self) -> watch::Receiver<ControllerStatus> {
        self.status.subscribe()
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        let interval = self.config.effective_interval();
        info!(
            interval_ms = interval.as_millis(),
            inverters = self.devices.len(),
            limiters = self.limiters.len(),
            "inverter controller started"
        );

        loop {
            let cycle_start = Instant::now();
            tokio::select! {
                _ = self.tick() => {},
                _ = cancel.cancelled() => break,
            }
            let elapsed = cycle_start.elapsed();
            histogram!(CONTROL_CYCLE_SECONDS).record(elapsed.as_secs_f64());

            tokio::select! {
                _ = sleep(interval.saturating_sub(elapsed)) => {},
                _ = cancel.cancelled() => break,
            }
        }

        info!("inverter controller stopped");
    }

    pub async fn tick(&mut self) -> CycleOutcome {
        let limits: Vec<(LimiterKind, ControlLimit)> = self
            .limiters
            .iter()
            .map(|limiter| (limiter.kind(), limiter.current()))
            .collect();
        let fused = fuse(&limits);
        let inverters = self.inverters.borrow().clone();
        let site = self.site.borrow().clone();

        let derived = derive_configuration(&fused, inverters.as_deref(), site.as_deref());
        let outcome = match derived {
            Ok(configuration) if self.last_applied == Some(configuration) => {
                CycleOutcome::Skipped {
                    reason: SkipReason::Unchanged,
                }
            }
            Ok(configuration) => self.apply(configuration, inverters.as_deref()).await,
            Err(reason) => CycleOutcome::Skipped { reason },
        };

        match &outcome {
            CycleOutcome::Skipped { reason } => {
                counter!(CONTROL_SKIPS, "reason" => reason.as_str()).increment(1);
                debug!(reason = reason.as_str(), "control cycle skipped");
            }
            CycleOutcome::Applied {
                configuration,
                written,
                failed,
            } => {
                info!(
                    target_watts = configuration.target_solar_watts,
                    ratio = configuration.target_solar_power_ratio,
                    connect = configuration.connect,
                    energize = configuration.energize,
                    written,
                    failed,
                    "inverter configuration applied"
                );
            }
        }

        let applied_at = matches!(outcome, CycleOutcome::Applied { .. }).then(Utc::now);
        let configuration = derived.ok();
        self.status.send_modify(|status| {
            status.limits = limits;
            status.fused = fused;
            if configuration.is_some() {
                status.configuration = configuration;
            }
            if applied_at.is_some() {
                status.last_applied_at = applied_at;
            }
            status.last_outcome = Some(outcome.clone());
        });

        outcome
    }

    async fn apply(
        &mut self,
        configuration: InverterConfiguration,
        sample: Option<&InvertersSample>,
    ) -> CycleOutcome {
        let writes = self.devices.iter().map(|device| async move {
            let scale_factor = sample
                .and_then(|sample| sample.device(&device.identity))
                .map(|snapshot| snapshot.controls.w_max_lim_pct_sf)
                .ok_or_else(|| ControlError::MissingScaleFactor(device.identity.clone()))?;
            device
                .connection
                .write_controls(&controls_write(&configuration, scale_factor))
                .await
                .map_err(|source| ControlError::Write {
                    device: device.identity.clone(),
                    source,
                })
        });

        let mut written = 0;
        let mut failed = 0;
        for result in join_all(writes).await {
            match result {
                Ok(()) => {
                    written += 1;
                    counter!(CONTROL_WRITES).increment(1);
                }
                Err(err) => {
                    failed += 1;
                    counter!(CONTROL_WRITE_FAILURES).increment(1);
                    warn!(error = %err, "inverter control write failed");
                }
            }
        }

        if failed == 0 {
            self.last_applied = Some(configuration);
        }
        CycleOutcome::Applied {
            configuration,
            written,
            failed,
        }
    }
}
