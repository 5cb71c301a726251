//! Utility server documents. Only the elements the resource graph and the schedule need are
//! mapped; everything else in the payload is ignored.
//!
//! CSIP-AUS extension elements carry a `csipaus:` prefix on the wire. Each is mapped under its
//! prefixed name with the bare name as an alias.

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use types::{ControlLimit, ScaledValue};

use crate::Sep2Error;

/// Query that requests every entry of a list resource in one page.
pub const FULL_LIST_QUERY: &[(&str, &str)] = &[("s", "0"), ("l", "255")];

/// A document that can be fetched and polled.
pub trait Sep2Document: DeserializeOwned + Send + Sync + 'static {
    const NAME: &'static str;
    const QUERY: &'static [(&'static str, &'static str)] = &[];

    fn parse(xml: &str) -> Result<Self, Sep2Error> {
        quick_xml::de::from_str(xml).map_err(|err| Sep2Error::Parse {
            resource: Self::NAME,
            message: err.to_string(),
        })
    }

    /// Server-advertised poll rate in seconds.
    fn poll_rate(&self) -> Option<u32>;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Link {
    #[serde(rename = "@href")]
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ListLink {
    #[serde(rename = "@href")]
    pub href: String,
    #[serde(rename = "@all", default)]
    pub all: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeviceCapability {
    #[serde(rename = "@href", default)]
    pub href: Option<String>,
    #[serde(rename = "@pollRate", default)]
    pub poll_rate: Option<u32>,
    #[serde(rename = "TimeLink", default)]
    pub time_link: Option<Link>,
    #[serde(rename = "EndDeviceListLink", default)]
    pub end_device_list_link: Option<ListLink>,
    #[serde(rename = "MirrorUsagePointListLink", default)]
    pub mirror_usage_point_list_link: Option<ListLink>,
}

impl Sep2Document for DeviceCapability {
    const NAME: &'static str = "DeviceCapability";

    fn poll_rate(&self) -> Option<u32> {
        self.poll_rate
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Time {
    #[serde(rename = "@pollRate", default)]
    pub poll_rate: Option<u32>,
    /// Seconds since the Unix epoch.
    #[serde(rename = "currentTime")]
    pub current_time: i64,
    #[serde(rename = "tzOffset", default)]
    pub tz_offset: Option<i32>,
    #[serde(default)]
    pub quality: Option<u8>,
}

impl Time {
    pub fn current_time(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.current_time, 0).single()
    }
}

impl Sep2Document for Time {
    const NAME: &'static str = "Time";

    fn poll_rate(&self) -> Option<u32> {
        self.poll_rate
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EndDevice {
    #[serde(rename = "@href")]
    pub href: String,
    #[serde(rename = "lFDI", default)]
    pub lfdi: Option<String>,
    #[serde(rename = "sFDI", default)]
    pub sfdi: Option<u64>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(rename = "FunctionSetAssignmentsListLink", default)]
    pub function_set_assignments_list_link: Option<ListLink>,
    #[serde(rename = "DERListLink", default)]
    pub der_list_link: Option<ListLink>,
    #[serde(rename = "ConnectionPointLink", default)]
    pub connection_point_link: Option<Link>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EndDeviceList {
    #[serde(rename = "@pollRate", default)]
    pub poll_rate: Option<u32>,
    #[serde(rename = "@all", default)]
    pub all: Option<u32>,
    #[serde(rename = "@results", default)]
    pub results: Option<u32>,
    #[serde(rename = "EndDevice", default)]
    pub end_devices: Vec<EndDevice>,
}

impl EndDeviceList {
    /// The end device registered under `lfdi`, compared case-insensitively.
    pub fn find_by_lfdi(&self, lfdi: &str) -> Option<&EndDevice> {
        self.end_devices.iter().find(|device| {
            device
                .lfdi
                .as_deref()
                .is_some_and(|value| value.eq_ignore_ascii_case(lfdi))
        })
    }
}

impl Sep2Document for EndDeviceList {
    const NAME: &'static str = "EndDeviceList";
    const QUERY: &'static [(&'static str, &'static str)] = FULL_LIST_QUERY;

    fn poll_rate(&self) -> Option<u32> {
        self.poll_rate
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FunctionSetAssignments {
    #[serde(rename = "@href", default)]
    pub href: Option<String>,
    #[serde(rename = "mRID", default)]
    pub mrid: Option<String>,
    #[serde(rename = "DERProgramListLink", default)]
    pub der_program_list_link: Option<ListLink>,
    #[serde(rename = "TimeLink", default)]
    pub time_link: Option<Link>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FunctionSetAssignmentsList {
    #[serde(rename = "@pollRate", default)]
    pub poll_rate: Option<u32>,
    #[serde(rename = "FunctionSetAssignments", default)]
    pub function_set_assignments: Vec<FunctionSetAssignments>,
}

impl Sep2Document for FunctionSetAssignmentsList {
    const NAME: &'static str = "FunctionSetAssignmentsList";
    const QUERY: &'static [(&'static str, &'static str)] = FULL_LIST_QUERY;

    fn poll_rate(&self) -> Option<u32> {
        self.poll_rate
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DerProgram {
    #[serde(rename = "@href")]
    pub href: String,
    #[serde(rename = "mRID", default)]
    pub mrid: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Lower values take precedence.
    pub primacy: u8,
    #[serde(rename = "DefaultDERControlLink", default)]
    pub default_der_control_link: Option<Link>,
    #[serde(rename = "DERControlListLink", default)]
    pub der_control_list_link: Option<ListLink>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DerProgramList {
    #[serde(rename = "@pollRate", default)]
    pub poll_rate: Option<u32>,
    #[serde(rename = "DERProgram", default)]
    pub programs: Vec<DerProgram>,
}

impl Sep2Document for DerProgramList {
    const NAME: &'static str = "DERProgramList";
    const QUERY: &'static [(&'static str, &'static str)] = FULL_LIST_QUERY;

    fn poll_rate(&self) -> Option<u32> {
        self.poll_rate
    }
}

/// Power with a power-of-ten multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ActivePower {
    pub multiplier: i8,
    pub value: i32,
}

impl ActivePower {
    pub fn watts(&self) -> f64 {
        ScaledValue::new(i64::from(self.value), self.multiplier).to_f64()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DerControlBase {
    #[serde(rename = "opModConnect", default)]
    pub op_mod_connect: Option<bool>,
    #[serde(rename = "opModEnergize", default)]
    pub op_mod_energize: Option<bool>,
    #[serde(rename = "csipaus:opModExpLimW", alias = "opModExpLimW", default)]
    pub op_mod_exp_lim_w: Option<ActivePower>,
    #[serde(rename = "csipaus:opModGenLimW", alias = "opModGenLimW", default)]
    pub op_mod_gen_lim_w: Option<ActivePower>,
    #[serde(rename = "csipaus:opModImpLimW", alias = "opModImpLimW", default)]
    pub op_mod_imp_lim_w: Option<ActivePower>,
    #[serde(rename = "csipaus:opModLoadLimW", alias = "opModLoadLimW", default)]
    pub op_mod_load_lim_w: Option<ActivePower>,
    /// Hundredths of a second.
    #[serde(rename = "rampTms", default)]
    pub ramp_tms: Option<u32>,
}

impl DerControlBase {
    pub fn to_limit(&self) -> ControlLimit {
        ControlLimit {
            op_mod_connect: self.op_mod_connect,
            op_mod_energize: self.op_mod_energize,
            op_mod_exp_lim_w: self.op_mod_exp_lim_w.map(|power| power.watts()),
            op_mod_gen_lim_w: self.op_mod_gen_lim_w.map(|power| power.watts()),
            op_mod_imp_lim_w: self.op_mod_imp_lim_w.map(|power| power.watts()),
            op_mod_load_lim_w: self.op_mod_load_lim_w.map(|power| power.watts()),
            ramp_tms: self.ramp_tms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DateTimeInterval {
    /// Seconds.
    pub duration: u32,
    /// Seconds since the Unix epoch.
    pub start: i64,
}

/// `currentStatus` values of an event.
pub mod event_status {
    pub const SCHEDULED: u8 = 0;
    pub const ACTIVE: u8 = 1;
    pub const CANCELLED: u8 = 2;
    pub const CANCELLED_WITH_RANDOMIZATION: u8 = 3;
    pub const SUPERSEDED: u8 = 4;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct EventStatus {
    #[serde(rename = "currentStatus")]
    pub current_status: u8,
    #[serde(rename = "dateTime", default)]
    pub date_time: Option<i64>,
    #[serde(rename = "potentiallySuperseded", default)]
    pub potentially_superseded: Option<bool>,
}

impl EventStatus {
    pub fn is_live(&self) -> bool {
        matches!(
            self.current_status,
            event_status::SCHEDULED | event_status::ACTIVE
        )
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DerControl {
    #[serde(rename = "@href", default)]
    pub href: Option<String>,
    #[serde(rename = "mRID")]
    pub mrid: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "creationTime")]
    pub creation_time: i64,
    #[serde(rename = "EventStatus", default)]
    pub event_status: Option<EventStatus>,
    pub interval: DateTimeInterval,
    /// Seconds; negative values move the start earlier.
    #[serde(rename = "randomizeStart", default)]
    pub randomize_start: Option<i32>,
    #[serde(rename = "randomizeDuration", default)]
    pub randomize_duration: Option<i32>,
    #[serde(rename = "DERControlBase")]
    pub der_control_base: DerControlBase,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DerControlList {
    #[serde(rename = "@pollRate", default)]
    pub poll_rate: Option<u32>,
    #[serde(rename = "DERControl", default)]
    pub controls: Vec<DerControl>,
}

impl Sep2Document for DerControlList {
    const NAME: &'static str = "DERControlList";
    const QUERY: &'static [(&'static str, &'static str)] = FULL_LIST_QUERY;

    fn poll_rate(&self) -> Option<u32> {
        self.poll_rate
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DefaultDerControl {
    #[serde(rename = "@href", default)]
    pub href: Option<String>,
    #[serde(rename = "@pollRate", default)]
    pub poll_rate: Option<u32>,
    #[serde(rename = "mRID", default)]
    pub mrid: Option<String>,
    #[serde(rename = "DERControlBase")]
    pub der_control_base: DerControlBase,
}

impl Sep2Document for DefaultDerControl {
    const NAME: &'static str = "DefaultDERControl";

    fn poll_rate(&self) -> Option<u32> {
        self.poll_rate
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Der {
    #[serde(rename = "@href")]
    pub href: String,
    #[serde(rename = "DERCapabilityLink", default)]
    pub der_capability_link: Option<Link>,
    #[serde(rename = "DERSettingsLink", default)]
    pub der_settings_link: Option<Link>,
    #[serde(rename = "DERStatusLink", default)]
    pub der_status_link: Option<Link>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DerList {
    #[serde(rename = "@pollRate", default)]
    pub poll_rate: Option<u32>,
    #[serde(rename = "DER", default)]
    pub ders: Vec<Der>,
}

impl Sep2Document for DerList {
    const NAME: &'static str = "DERList";
    const QUERY: &'static [(&'static str, &'static str)] = FULL_LIST_QUERY;

    fn poll_rate(&self) -> Option<u32> {
        self.poll_rate
    }
}
