use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use types::ControlLimit;

use crate::client::ResourceFetcher;
use crate::clock::check_clock;
use crate::default_poll_rates;
use crate::models::{
    DefaultDerControl, Der, DerControlList, DerList, DerProgramList, DeviceCapability,
    EndDeviceList, FunctionSetAssignmentsList, Link, Sep2Document, Time,
};
use crate::resource::{PollSchedule, PollableResource, ResourceListener, XmlFetch};
use crate::schedule::{active_control, ActiveControl, ProgramSchedule, Scheduler};
use crate::{Sep2Error, MIN_POLL_RATE};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub device_capability_href: String,
    /// Long-form device identifier of this site's end device.
    pub lfdi: String,
    pub poll_floor: Duration,
    /// How often the active control is re-evaluated between fetches.
    pub evaluation_interval: Duration,
}

impl SessionConfig {
    pub fn new(device_capability_href: impl Into<String>, lfdi: impl Into<String>) -> Self {
        Self {
            device_capability_href: device_capability_href.into(),
            lfdi: lfdi.into(),
            poll_floor: MIN_POLL_RATE,
            evaluation_interval: Duration::from_secs(1),
        }
    }
}

/// Read-only view of the session for status reporting.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sep2State {
    pub clock_delta_ms: Option<i64>,
    pub end_device_href: Option<String>,
    pub mirror_usage_point_list_href: Option<String>,
    pub der_href: Option<String>,
    pub der_status_href: Option<String>,
    pub der_capability_href: Option<String>,
    pub programs: Vec<ProgramSchedule>,
    pub active: Option<ActiveControl>,
}

enum GraphEvent {
    DeviceCapability(Arc<DeviceCapability>),
    Time(Arc<Time>),
    EndDeviceList(Arc<EndDeviceList>),
    DerList(Arc<DerList>),
    FunctionSetAssignmentsList(Arc<FunctionSetAssignmentsList>),
    DerProgramList(String, Arc<DerProgramList>),
    DerControlList(String, Arc<DerControlList>),
    DefaultDerControl(String, Arc<DefaultDerControl>),
}

struct ResourceFactory {
    fetcher: Arc<dyn ResourceFetcher>,
    events: mpsc::UnboundedSender<GraphEvent>,
    floor: Duration,
}

impl ResourceFactory {
    fn spawn<T: Sep2Document>(
        &self,
        href: &str,
        default_rate: Duration,
        wrap: fn(String, Arc<T>) -> GraphEvent,
    ) -> PollableResource<T> {
        let events = self.events.clone();
        let listener: ResourceListener<T> = Arc::new(move |url: &str, value: Arc<T>| {
            if events.send(wrap(url.to_string(), value)).is_err() {
                debug!(url, "session stopped, dropping resource update");
            }
        });
        PollableResource::spawn(
            href,
            PollSchedule {
                default_rate,
                floor: self.floor,
            },
            XmlFetch::<T>::new(Arc::clone(&self.fetcher)),
            listener,
        )
    }

    /// Keeps the resource when the href is unchanged, otherwise destroys it and starts over.
    fn reconcile<T: Sep2Document>(
        &self,
        slot: &mut Option<PollableResource<T>>,
        href: Option<&str>,
        default_rate: Duration,
        wrap: fn(String, Arc<T>) -> GraphEvent,
    ) {
        if slot.as_ref().map(PollableResource::url) == href {
            return;
        }
        if let Some(previous) = slot.take() {
            previous.destroy();
        }
        *slot = href.map(|href| {
            debug!(href, resource = T::NAME, "resource linked");
            self.spawn(href, default_rate, wrap)
        });
    }

    /// Returns the hrefs that were dropped.
    fn reconcile_set<T: Sep2Document>(
        &self,
        resources: &mut HashMap<String, PollableResource<T>>,
        hrefs: &BTreeSet<String>,
        default_rate: Duration,
        wrap: fn(String, Arc<T>) -> GraphEvent,
    ) -> Vec<String> {
        let removed: Vec<String> = resources
            .keys()
            .filter(|href| !hrefs.contains(*href))
            .cloned()
            .collect();
        for href in &removed {
            if let Some(resource) = resources.remove(href) {
                resource.destroy();
            }
        }
        for href in hrefs {
            if !resources.contains_key(href) {
                debug!(href = %href, resource = T::NAME, "resource linked");
                resources.insert(href.clone(), self.spawn(href, default_rate, wrap));
            }
        }
        removed
    }
}

/// The live resource graph rooted at DeviceCapability.
///
/// Every node is a [`PollableResource`]; when a parent document changes an href the child is
/// destroyed and recreated. The control in force is re-derived after each update and on a
/// short interval, and published as a [`ControlLimit`].
pub struct Sep2Session {
    config: SessionConfig,
    factory: ResourceFactory,
    events: mpsc::UnboundedReceiver<GraphEvent>,
    limit: watch::Sender<ControlLimit>,
    state: watch::Sender<Sep2State>,
    device_capability: Option<PollableResource<DeviceCapability>>,
    time: Option<PollableResource<Time>>,
    end_device_list: Option<PollableResource<EndDeviceList>>,
    der_list: Option<PollableResource<DerList>>,
    function_set_assignments: Option<PollableResource<FunctionSetAssignmentsList>>,
    program_lists: HashMap<String, PollableResource<DerProgramList>>,
    control_lists: HashMap<String, PollableResource<DerControlList>>,
    default_controls: HashMap<String, PollableResource<DefaultDerControl>>,
    programs: BTreeMap<String, Arc<DerProgramList>>,
    controls: HashMap<String, Arc<DerControlList>>,
    defaults: HashMap<String, Arc<DefaultDerControl>>,
    scheduler: Scheduler,
    snapshot: Sep2State,
}

impl Sep2Session {
    pub fn new(fetcher: Arc<dyn ResourceFetcher>, config: SessionConfig) -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (limit, _) = watch::channel(ControlLimit::default());
        let (state, _) = watch::channel(Sep2State::default());
        Self {
            factory: ResourceFactory {
                fetcher,
                events: events_tx,
                floor: config.poll_floor,
            },
            config,
            events,
            limit,
            state,
            device_capability: None,
            time: None,
            end_device_list: None,
            der_list: None,
            function_set_assignments: None,
            program_lists: HashMap::new(),
            control_lists: HashMap::new(),
            default_controls: HashMap::new(),
            programs: BTreeMap::new(),
            controls: HashMap::new(),
            defaults: HashMap::new(),
            scheduler: Scheduler::default(),
            snapshot: Sep2State::default(),
        }
    }

    /// The utility-commanded limit. Empty until a control applies.
    pub fn limits(&self) -> watch::Receiver<ControlLimit> {
        self.limit.subscribe()
    }

    pub fn state(&self) -> watch::Receiver<Sep2State> {
        self.state.subscribe()
    }

    /// Runs until cancelled. A clock skew beyond tolerance ends the session with an error.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), Sep2Error> {
        info!(
            href = %self.config.device_capability_href,
            lfdi = %self.config.lfdi,
            "sep2 session starting"
        );
        self.device_capability = Some(self.factory.spawn(
            &self.config.device_capability_href,
            default_poll_rates::DEVICE_CAPABILITY,
            |_, doc| GraphEvent::DeviceCapability(doc),
        ));

        let result = self.event_loop(&cancel).await;
        self.destroy();
        if let Err(err) = &result {
            warn!(error = %err, "sep2 session terminated");
        }
        result
    }

    async fn event_loop(&mut self, cancel: &CancellationToken) -> Result<(), Sep2Error> {
        let mut ticker = tokio::time::interval(self.config.evaluation_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                event = self.events.recv() => {
                    let event = event.ok_or(Sep2Error::ChannelClosed)?;
                    self.handle(event)?;
                }
                _ = ticker.tick() => {}
            }
            self.publish(Utc::now());
        }
    }

    fn handle(&mut self, event: GraphEvent) -> Result<(), Sep2Error> {
        match event {
            GraphEvent::DeviceCapability(dcap) => {
                self.factory.reconcile(
                    &mut self.time,
                    dcap.time_link.as_ref().map(|link| link.href.as_str()),
                    default_poll_rates::TIME,
                    |_, doc| GraphEvent::Time(doc),
                );
                self.factory.reconcile(
                    &mut self.end_device_list,
                    dcap.end_device_list_link
                        .as_ref()
                        .map(|link| link.href.as_str()),
                    default_poll_rates::END_DEVICE_LIST,
                    |_, doc| GraphEvent::EndDeviceList(doc),
                );
                self.snapshot.mirror_usage_point_list_href = dcap
                    .mirror_usage_point_list_link
                    .as_ref()
                    .map(|link| link.href.clone());
            }
            GraphEvent::Time(time) => {
                let Some(server_time) = time.current_time() else {
                    warn!(current_time = time.current_time, "server time out of range");
                    return Ok(());
                };
                let delta_ms = check_clock(server_time, Utc::now())?;
                self.snapshot.clock_delta_ms = Some(delta_ms);
            }
            GraphEvent::EndDeviceList(list) => {
                let device = list.find_by_lfdi(&self.config.lfdi);
                if device.is_none() {
                    warn!(lfdi = %self.config.lfdi, "end device not registered with utility server");
                }
                self.snapshot.end_device_href = device.map(|device| device.href.clone());
                let der_list_href = device
                    .and_then(|device| device.der_list_link.as_ref())
                    .map(|link| link.href.as_str());
                self.factory.reconcile(
                    &mut self.der_list,
                    der_list_href,
                    default_poll_rates::DER_LIST,
                    |_, doc| GraphEvent::DerList(doc),
                );
                if der_list_href.is_none() {
                    self.link_der(None);
                }
                let fsa_href = device
                    .and_then(|device| device.function_set_assignments_list_link.as_ref())
                    .map(|link| link.href.as_str());
                self.factory.reconcile(
                    &mut self.function_set_assignments,
                    fsa_href,
                    default_poll_rates::FUNCTION_SET_ASSIGNMENTS_LIST,
                    |_, doc| GraphEvent::FunctionSetAssignmentsList(doc),
                );
                if fsa_href.is_none() {
                    self.relink_programs(&BTreeSet::new());
                }
            }
            GraphEvent::DerList(list) => {
                if list.ders.len() > 1 {
                    debug!(count = list.ders.len(), "several DERs listed, using the first");
                }
                self.link_der(list.ders.first());
            }
            GraphEvent::FunctionSetAssignmentsList(list) => {
                let hrefs: BTreeSet<String> = list
                    .function_set_assignments
                    .iter()
                    .filter_map(|fsa| fsa.der_program_list_link.as_ref())
                    .map(|link| link.href.clone())
                    .collect();
                self.relink_programs(&hrefs);
            }
            GraphEvent::DerProgramList(href, list) => {
                if self.program_lists.contains_key(&href) {
                    self.programs.insert(href, list);
                    self.relink_controls();
                }
            }
            GraphEvent::DerControlList(href, list) => {
                if self.control_lists.contains_key(&href) {
                    self.controls.insert(href, list);
                }
            }
            GraphEvent::DefaultDerControl(href, control) => {
                if self.default_controls.contains_key(&href) {
                    self.defaults.insert(href, control);
                }
            }
        }
        Ok(())
    }

    /// Records where DER status and capability are reported. The site is one aggregated DER.
    fn link_der(&mut self, der: Option<&Der>) {
        let href = |link: Option<&Link>| link.map(|link| link.href.clone());
        self.snapshot.der_href = der.map(|der| der.href.clone());
        self.snapshot.der_status_href = der.and_then(|der| href(der.der_status_link.as_ref()));
        self.snapshot.der_capability_href =
            der.and_then(|der| href(der.der_capability_link.as_ref()));
    }

    fn relink_programs(&mut self, hrefs: &BTreeSet<String>) {
        let removed = self.factory.reconcile_set(
            &mut self.program_lists,
            hrefs,
            default_poll_rates::DER_PROGRAM_LIST,
            GraphEvent::DerProgramList,
        );
        for href in removed {
            self.programs.remove(&href);
        }
        self.relink_controls();
    }

    fn relink_controls(&mut self) {
        let programs = self.programs.values().flat_map(|list| list.programs.iter());
        let mut control_hrefs = BTreeSet::new();
        let mut default_hrefs = BTreeSet::new();
        for program in programs {
            if let Some(link) = &program.der_control_list_link {
                control_hrefs.insert(link.href.clone());
            }
            if let Some(link) = &program.default_der_control_link {
                default_hrefs.insert(link.href.clone());
            }
        }

        for href in self.factory.reconcile_set(
            &mut self.control_lists,
            &control_hrefs,
            default_poll_rates::DER_CONTROL_LIST,
            GraphEvent::DerControlList,
        ) {
            self.controls.remove(&href);
        }
        for href in self.factory.reconcile_set(
            &mut self.default_controls,
            &default_hrefs,
            default_poll_rates::DEFAULT_DER_CONTROL,
            GraphEvent::DefaultDerControl,
        ) {
            self.defaults.remove(&href);
        }
    }

    fn program_schedules(&mut self) -> Vec<ProgramSchedule> {
        let mut schedules = Vec::new();
        let mut live_mrids = HashSet::new();

        for program in self.programs.values().flat_map(|list| list.programs.iter()) {
            let controls = program
                .der_control_list_link
                .as_ref()
                .and_then(|link| self.controls.get(&link.href))
                .map(|list| {
                    list.controls
                        .iter()
                        .filter_map(|control| {
                            live_mrids.insert(control.mrid.clone());
                            self.scheduler.schedule(&program.href, program.primacy, control)
                        })
                        .collect()
                })
                .unwrap_or_default();
            let default_control = program
                .default_der_control_link
                .as_ref()
                .and_then(|link| self.defaults.get(&link.href))
                .map(|control| control.der_control_base.to_limit());

            schedules.push(ProgramSchedule {
                href: program.href.clone(),
                primacy: program.primacy,
                controls,
                default_control,
            });
        }

        self.scheduler.retain(&live_mrids);
        schedules
    }

    fn publish(&mut self, now: DateTime<Utc>) {
        let programs = self.program_schedules();
        let active = active_control(&programs, now);
        let limit = active
            .as_ref()
            .map(|active| active.limit)
            .unwrap_or_default();

        let changed = self.limit.send_if_modified(|current| {
            if *current == limit {
                return false;
            }
            *current = limit;
            true
        });
        if changed {
            info!(source = ?active.as_ref().map(|active| &active.source), ?limit, "sep2 control changed");
        }

        self.snapshot.programs = programs;
        self.snapshot.active = active;
        self.state.send_replace(self.snapshot.clone());
    }

    fn destroy(&mut self) {
        if let Some(resource) = self.device_capability.take() {
            resource.destroy();
        }
        if let Some(resource) = self.time.take() {
            resource.destroy();
        }
        if let Some(resource) = self.end_device_list.take() {
            resource.destroy();
        }
        if let Some(resource) = self.der_list.take() {
            resource.destroy();
        }
        if let Some(resource) = self.function_set_assignments.take() {
            resource.destroy();
        }
        for (_, resource) in self.program_lists.drain() {
            resource.destroy();
        }
        for (_, resource) in self.control_lists.drain() {
            resource.destroy();
        }
        for (_, resource) in self.default_controls.drain() {
            resource.destroy();
        }
    }
}
