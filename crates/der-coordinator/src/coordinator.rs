use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use csip_client::{
    ReporterConfig, ResourceFetcher, Sep2Client, Sep2Error, Sep2Session, Sep2State,
    SessionConfig, TelemetryReporter,
};
use limit_control::{
    ControllerStatus, ExternalLimiter, FixedLimiter, InverterController, LimiterHandle,
    NegativeFeedInLimiter, TwoWayTariffLimiter,
};
use metrics::counter;
use modbus_client::{ClientConfig, ModbusClient, RegisterTransport};
use poller_actor::{
    ExternalSiteSource, InverterPoller, InvertersSample, MeterPoller, PollerActor, SampleReceiver,
    SunSpecDevice,
};
use serde::Serialize;
use sunspec_codec::SunSpecConnection;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use types::{DerSample, DeviceIdentity, LimiterKind, SiteSample};

use crate::config::{CoordinatorConfig, SiteSource};
use crate::telemetry::PolledTelemetry;

const TARIFF_EVALUATION_INTERVAL: Duration = Duration::from_secs(1);
const TASK_FAILURES: &str = "der_coordinator_task_failures_total";

/// Bounded feeds for data pushed in by external providers. Only the inputs enabled in
/// configuration are present. Site samples and limits are JSON payloads; malformed ones are
/// logged and dropped.
#[derive(Clone, Default)]
pub struct CoordinatorInputs {
    pub site_samples: Option<mpsc::Sender<String>>,
    pub external_limits: Option<mpsc::Sender<String>>,
    pub feed_in_prices: Option<mpsc::Sender<f64>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorStatus {
    pub running: bool,
    pub inverters: Option<InvertersSample>,
    pub der_sample: Option<DerSample>,
    pub site_sample: Option<SiteSample>,
    pub controller: ControllerStatus,
    pub sep2: Option<Sep2State>,
}

/// Owns every long-running task of one site and the channels between them.
pub struct Coordinator {
    cancel: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    session: Option<JoinHandle<Result<(), Sep2Error>>>,
    inverters: SampleReceiver<InvertersSample>,
    site: SampleReceiver<SiteSample>,
    controller: watch::Receiver<ControllerStatus>,
    sep2: Option<watch::Receiver<Sep2State>>,
    inputs: CoordinatorInputs,
}

impl Coordinator {
    /// Starts against real devices: Modbus TCP for SunSpec and HTTP for the utility server.
    pub fn start(config: &CoordinatorConfig) -> Result<Self> {
        let fetcher = match &config.sep2 {
            Some(sep2) => {
                let http = reqwest::Client::builder()
                    .timeout(Duration::from_millis(sep2.request_timeout_ms))
                    .build()
                    .context("build http client")?;
                let client = Sep2Client::new(http, sep2.host.clone()).context("sep2 client")?;
                Some(Arc::new(client) as Arc<dyn ResourceFetcher>)
            }
            None => None,
        };

        let timeout_ms = config.modbus_timeout_ms;
        Self::start_with(
            config,
            |device| {
                ModbusClient::new(ClientConfig {
                    host: device.ip.clone(),
                    port: device.port,
                    unit_id: device.unit_id,
                    timeout_ms,
                })
                .with_context(|| format!("modbus client for {device}"))
            },
            fetcher,
        )
    }

    /// Starts with caller-supplied transports. Must run inside a tokio runtime.
    pub fn start_with<T, F>(
        config: &CoordinatorConfig,
        mut connect: F,
        fetcher: Option<Arc<dyn ResourceFetcher>>,
    ) -> Result<Self>
    where
        T: RegisterTransport + 'static,
        F: FnMut(&DeviceIdentity) -> Result<T>,
    {
        if config.sep2.is_some() && fetcher.is_none() {
            anyhow::bail!("sep2 is configured but no resource fetcher was supplied");
        }

        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();
        let mut inputs = CoordinatorInputs::default();

        let mut devices = |identities: &[DeviceIdentity]| -> Result<Vec<SunSpecDevice<T>>> {
            identities
                .iter()
                .map(|identity| {
                    Ok(SunSpecDevice {
                        identity: identity.clone(),
                        connection: Arc::new(SunSpecConnection::new(
                            connect(identity)?,
                            config.base_address,
                        )),
                    })
                })
                .collect()
        };

        let inverter_devices = devices(&config.inverters)?;
        let (actor, inverters) = PollerActor::new(
            InverterPoller::new(inverter_devices.clone()),
            config.poller.clone(),
            cancel.child_token(),
        );
        tasks.push(("inverters", actor.spawn()));

        let site = match config.site_source {
            SiteSource::Sunspec => {
                let (actor, site) = PollerActor::new(
                    MeterPoller::new(devices(&config.meters)?),
                    config.poller.clone(),
                    cancel.child_token(),
                );
                tasks.push(("meters", actor.spawn()));
                site
            }
            SiteSource::External => {
                let (feed, source) = ExternalSiteSource::channel();
                let (sender, receiver) = mpsc::channel(config.feed_capacity.max(1));
                inputs.site_samples = Some(sender);
                tasks.push(("site_feed", tokio::spawn(feed.run(receiver, cancel.child_token()))));
                let (actor, site) =
                    PollerActor::new(source, config.poller.clone(), cancel.child_token());
                tasks.push(("external_site", actor.spawn()));
                site
            }
        };

        let mut limiters = Vec::new();
        let mut session = None;
        let mut sep2 = None;
        for kind in config.enabled_limiters() {
            match kind {
                LimiterKind::Sep2 => {
                    let (Some(settings), Some(fetcher)) = (&config.sep2, &fetcher) else {
                        continue;
                    };
                    let sep2_session = Sep2Session::new(
                        Arc::clone(fetcher),
                        SessionConfig::new(
                            settings.device_capability_uri.clone(),
                            settings.lfdi.clone(),
                        ),
                    );
                    limiters.push(LimiterHandle::new(kind, sep2_session.limits()));
                    let reporter = TelemetryReporter::new(
                        Arc::clone(fetcher),
                        Arc::new(PolledTelemetry::new(inverters.clone(), site.clone())),
                        sep2_session.state(),
                        ReporterConfig {
                            post_rate: Duration::from_secs(settings.post_rate_seconds),
                            ..ReporterConfig::new(settings.lfdi.clone())
                        },
                    );
                    tasks.push((
                        "sep2_reporter",
                        tokio::spawn(reporter.run(cancel.child_token())),
                    ));
                    sep2 = Some(sep2_session.state());
                    session = Some(tokio::spawn(sep2_session.run(cancel.child_token())));
                }
                LimiterKind::Fixed => {
                    if let Some(limit) = config.fixed_limit {
                        limiters.push(FixedLimiter::handle(limit).context("fixed limiter")?);
                    }
                }
                LimiterKind::TwoWayTariff => {
                    if let Some(tariff) = &config.two_way_tariff {
                        let (handle, task) = TwoWayTariffLimiter::new(tariff)
                            .context("two-way tariff limiter")?
                            .spawn(TARIFF_EVALUATION_INTERVAL, cancel.child_token());
                        tasks.push(("two_way_tariff", task));
                        limiters.push(handle);
                    }
                }
                LimiterKind::NegativeFeedIn => {
                    let (limiter, handle) = NegativeFeedInLimiter::channel();
                    let (sender, receiver) = mpsc::channel(config.feed_capacity.max(1));
                    inputs.feed_in_prices = Some(sender);
                    tasks.push((
                        "feed_in_prices",
                        tokio::spawn(limiter.run(receiver, cancel.child_token())),
                    ));
                    limiters.push(handle);
                }
                LimiterKind::Mqtt => {
                    let (limiter, handle) = ExternalLimiter::channel();
                    let (sender, receiver) = mpsc::channel(config.feed_capacity.max(1));
                    inputs.external_limits = Some(sender);
                    tasks.push((
                        "external_limits",
                        tokio::spawn(limiter.run(receiver, cancel.child_token())),
                    ));
                    limiters.push(handle);
                }
            }
        }

        let order: Vec<&str> = limiters.iter().map(|limiter| limiter.kind().as_str()).collect();
        let controller = InverterController::new(
            inverter_devices,
            limiters,
            inverters.clone(),
            site.clone(),
            config.controller.clone(),
        );
        let controller_status = controller.status();
        tasks.push(("controller", tokio::spawn(controller.run(cancel.child_token()))));

        info!(
            inverters = config.inverters.len(),
            meters = config.meters.len(),
            limiters = ?order,
            "coordinator started"
        );

        Ok(Self {
            cancel,
            tasks,
            session,
            inverters,
            site,
            controller: controller_status,
            sep2,
            inputs,
        })
    }

    pub fn inputs(&self) -> &CoordinatorInputs {
        &self.inputs
    }

    pub fn status(&self) -> CoordinatorStatus {
        let inverters = self.inverters.borrow().as_deref().cloned();
        CoordinatorStatus {
            running: !self.cancel.is_cancelled(),
            der_sample: inverters.as_ref().map(|sample| sample.der.clone()),
            inverters,
            site_sample: self.site.borrow().as_deref().cloned(),
            controller: self.controller.borrow().clone(),
            sep2: self.sep2.as_ref().map(|state| state.borrow().clone()),
        }
    }

    /// Runs until `shutdown` resolves or the utility session fails, then stops every task.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let session_result = match self.session.as_mut() {
            Some(session) => tokio::select! {
                _ = shutdown => None,
                joined = session => Some(joined),
            },
            None => {
                shutdown.await;
                None
            }
        };
        if session_result.is_some() {
            self.session = None;
        }

        self.stop().await;
        match session_result {
            None | Some(Ok(Ok(()))) => Ok(()),
            Some(Ok(Err(err))) => {
                error!(error = %err, "utility session failed");
                Err(err).context("sep2 session failed")
            }
            Some(Err(err)) => Err(err).context("sep2 session task failed"),
        }
    }

    /// Cancels every task and waits for them to finish.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        for (name, task) in self.tasks.drain(..) {
            if let Err(err) = task.await {
                counter!(TASK_FAILURES, "task" => name).increment(1);
                warn!(task = name, error = %err, "task join failed");
            }
        }
        if let Some(session) = self.session.take() {
            match session.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(error = %err, "utility session ended with error"),
                Err(err) => warn!(error = %err, "utility session join failed"),
            }
        }
        info!("coordinator stopped");
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
