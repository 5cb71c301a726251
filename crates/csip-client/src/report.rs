//! Documents sent to the utility server: site and DER readings mirrored through
//! MirrorUsagePoints, DER status and DER capability.
//!
//! Elements are declared in schema order; quick-xml writes them as declared.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use types::{DerSample, PowerReading, SiteSample, VoltageReading};

use crate::Sep2Error;

pub const SEP2_NAMESPACE: &str = "urn:ieee:std:2030.5:ns";
pub const CSIPAUS_NAMESPACE: &str = "https://csipaus.org/ns";

const COMMODITY_ELECTRICITY_SECONDARY_METERED: u8 = 1;
const DATA_QUALIFIER_AVERAGE: u8 = 2;
const FLOW_FORWARD: u8 = 1;
const FLOW_REVERSE: u8 = 19;
const KIND_POWER: u8 = 37;
const QUALITY_VALID: u16 = 0x0001;
const SERVICE_CATEGORY_ELECTRICITY: u8 = 0;
const STATUS_ON: u8 = 1;

// DERControlType bits
const MODE_CONNECT: u32 = 1 << 2;
const MODE_ENERGIZE: u32 = 1 << 3;
const MODE_MAX_LIM_W: u32 = 1 << 20;

// csipaus DOEModesSupportedType bits
const DOE_EXP_LIM_W: u32 = 1 << 0;
const DOE_GEN_LIM_W: u32 = 1 << 2;

const DER_TYPE_PV: u8 = 4;

/// Which side of the connection point a MirrorUsagePoint describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MirrorRole {
    Site,
    Der,
}

impl MirrorRole {
    /// RoleFlagsType: site is isMirror | isPremisesAggregationPoint, DER is
    /// isMirror | isDER | isSubmeter.
    pub fn role_flags(self) -> u16 {
        match self {
            MirrorRole::Site => 0x0003,
            MirrorRole::Der => 0x0049,
        }
    }

    fn code(self) -> u8 {
        match self {
            MirrorRole::Site => 0x01,
            MirrorRole::Der => 0x02,
        }
    }

    fn label(self) -> &'static str {
        match self {
            MirrorRole::Site => "Site",
            MirrorRole::Der => "DER",
        }
    }

    /// Site power is signed import-positive; DER power is generation-positive.
    fn power_flow(self) -> u8 {
        match self {
            MirrorRole::Site => FLOW_FORWARD,
            MirrorRole::Der => FLOW_REVERSE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    RealPower,
    ReactivePower,
    Voltage,
    Frequency,
}

impl Quantity {
    fn code(self) -> u8 {
        match self {
            Quantity::RealPower => 1,
            Quantity::ReactivePower => 2,
            Quantity::Voltage => 3,
            Quantity::Frequency => 4,
        }
    }

    /// UomType code.
    fn uom(self) -> u8 {
        match self {
            Quantity::RealPower => 38,
            Quantity::ReactivePower => 63,
            Quantity::Voltage => 29,
            Quantity::Frequency => 33,
        }
    }

    fn unit(self) -> &'static str {
        match self {
            Quantity::RealPower => "W",
            Quantity::ReactivePower => "VAr",
            Quantity::Voltage => "V",
            Quantity::Frequency => "Hz",
        }
    }

    /// Power of ten applied to reported values.
    fn multiplier(self) -> i8 {
        match self {
            Quantity::RealPower | Quantity::ReactivePower => 0,
            Quantity::Voltage => -1,
            Quantity::Frequency => -2,
        }
    }

    fn is_power(self) -> bool {
        matches!(self, Quantity::RealPower | Quantity::ReactivePower)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Net,
    A,
    B,
    C,
}

impl Phase {
    /// PhaseCode. Net readings omit the element; servers reject phase 0.
    fn code(self) -> Option<u8> {
        match self {
            Phase::Net => None,
            Phase::A => Some(128),
            Phase::B => Some(64),
            Phase::C => Some(32),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Phase::Net => "Net",
            Phase::A => "Phase A",
            Phase::B => "Phase B",
            Phase::C => "Phase C",
        }
    }
}

/// One measured value before it is shaped into a MirrorMeterReading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub quantity: Quantity,
    pub phase: Phase,
    pub value: f64,
}

fn power_measurements(quantity: Quantity, reading: &PowerReading, out: &mut Vec<Measurement>) {
    let mut push = |phase, value| {
        out.push(Measurement {
            quantity,
            phase,
            value,
        })
    };
    match *reading {
        PowerReading::PerPhaseNet {
            phase_a,
            phase_b,
            phase_c,
            net,
        } => {
            push(Phase::A, phase_a);
            if let Some(value) = phase_b {
                push(Phase::B, value);
            }
            if let Some(value) = phase_c {
                push(Phase::C, value);
            }
            push(Phase::Net, net);
        }
        PowerReading::NoPhase { net } => push(Phase::Net, net),
    }
}

fn voltage_measurements(reading: &VoltageReading, out: &mut Vec<Measurement>) {
    let phases = [
        (Phase::A, Some(reading.phase_a)),
        (Phase::B, reading.phase_b),
        (Phase::C, reading.phase_c),
    ];
    for (phase, value) in phases {
        if let Some(value) = value {
            out.push(Measurement {
                quantity: Quantity::Voltage,
                phase,
                value,
            });
        }
    }
}

fn frequency_measurement(frequency: Option<f64>, out: &mut Vec<Measurement>) {
    if let Some(value) = frequency {
        out.push(Measurement {
            quantity: Quantity::Frequency,
            phase: Phase::Net,
            value,
        });
    }
}

pub fn site_measurements(sample: &SiteSample) -> Vec<Measurement> {
    let mut out = Vec::new();
    power_measurements(Quantity::RealPower, &sample.real_power, &mut out);
    power_measurements(Quantity::ReactivePower, &sample.reactive_power, &mut out);
    voltage_measurements(&sample.voltage, &mut out);
    frequency_measurement(sample.frequency, &mut out);
    out
}

pub fn der_measurements(sample: &DerSample) -> Vec<Measurement> {
    let mut out = Vec::new();
    power_measurements(Quantity::RealPower, &sample.real_power, &mut out);
    power_measurements(Quantity::ReactivePower, &sample.reactive_power, &mut out);
    if let Some(voltage) = &sample.voltage {
        voltage_measurements(voltage, &mut out);
    }
    frequency_measurement(sample.frequency, &mut out);
    out
}

/// Uppercase hex padded to `width` digits, the HexBinary encoding used on the wire.
fn hex(value: u32, width: usize) -> String {
    format!("{value:0width$X}")
}

/// Stable 128-bit mRID so a re-sent MirrorUsagePoint updates rather than duplicates.
fn mrid(lfdi: &str, role: MirrorRole, reading: u16) -> String {
    let device: String = lfdi
        .chars()
        .filter(char::is_ascii_hexdigit)
        .map(|c| c.to_ascii_uppercase())
        .chain(std::iter::repeat('0'))
        .take(26)
        .collect();
    format!("{:02X}{reading:04X}{device}", role.code())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimePeriod {
    pub start: i64,
    pub duration: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    #[serde(rename = "qualityFlags")]
    pub quality_flags: String,
    #[serde(rename = "timePeriod", skip_serializing_if = "Option::is_none")]
    pub time_period: Option<TimePeriod>,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingType {
    pub commodity: u8,
    #[serde(rename = "dataQualifier")]
    pub data_qualifier: u8,
    #[serde(rename = "flowDirection")]
    pub flow_direction: u8,
    #[serde(rename = "intervalLength")]
    pub interval_length: u32,
    pub kind: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<u8>,
    #[serde(rename = "powerOfTenMultiplier")]
    pub power_of_ten_multiplier: i8,
    pub uom: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MirrorMeterReading {
    #[serde(rename = "@xmlns", skip_serializing_if = "Option::is_none")]
    pub xmlns: Option<&'static str>,
    #[serde(rename = "mRID")]
    pub mrid: String,
    pub description: String,
    #[serde(rename = "lastUpdateTime")]
    pub last_update_time: i64,
    #[serde(rename = "nextUpdateTime")]
    pub next_update_time: i64,
    #[serde(rename = "Reading")]
    pub reading: Reading,
    #[serde(rename = "ReadingType")]
    pub reading_type: ReadingType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MirrorUsagePoint {
    #[serde(rename = "@xmlns")]
    pub xmlns: &'static str,
    #[serde(rename = "mRID")]
    pub mrid: String,
    pub description: String,
    #[serde(rename = "roleFlags")]
    pub role_flags: String,
    #[serde(rename = "serviceCategoryKind")]
    pub service_category_kind: u8,
    pub status: u8,
    #[serde(rename = "deviceLFDI")]
    pub device_lfdi: String,
    #[serde(rename = "MirrorMeterReading")]
    pub readings: Vec<MirrorMeterReading>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MirrorMeterReadingList {
    #[serde(rename = "@xmlns")]
    pub xmlns: &'static str,
    #[serde(rename = "@all")]
    pub all: usize,
    #[serde(rename = "@results")]
    pub results: usize,
    #[serde(rename = "MirrorMeterReading")]
    pub readings: Vec<MirrorMeterReading>,
}

/// Shapes measurements into MirrorMeterReadings for one mirror.
pub fn mirror_meter_readings(
    lfdi: &str,
    role: MirrorRole,
    measurements: &[Measurement],
    at: DateTime<Utc>,
    interval: Duration,
) -> Vec<MirrorMeterReading> {
    let interval_length = u32::try_from(interval.as_secs()).unwrap_or(u32::MAX);
    let last_update_time = at.timestamp();
    measurements
        .iter()
        .map(|measurement| {
            let quantity = measurement.quantity;
            let reading_code = (u16::from(quantity.code()) << 8)
                | u16::from(measurement.phase.code().unwrap_or(0));
            let scaled = measurement.value * 10f64.powi(-i32::from(quantity.multiplier()));
            MirrorMeterReading {
                xmlns: None,
                mrid: mrid(lfdi, role, reading_code),
                description: format!(
                    "Average {} Reading - {} ({})",
                    quantity.unit(),
                    measurement.phase.label(),
                    role.label()
                ),
                last_update_time,
                next_update_time: last_update_time + i64::from(interval_length),
                reading: Reading {
                    quality_flags: hex(u32::from(QUALITY_VALID), 4),
                    time_period: Some(TimePeriod {
                        start: last_update_time,
                        duration: interval_length,
                    }),
                    value: scaled.round() as i64,
                },
                reading_type: ReadingType {
                    commodity: COMMODITY_ELECTRICITY_SECONDARY_METERED,
                    data_qualifier: DATA_QUALIFIER_AVERAGE,
                    flow_direction: if quantity.is_power() {
                        role.power_flow()
                    } else {
                        0
                    },
                    interval_length,
                    kind: if quantity.is_power() { KIND_POWER } else { 0 },
                    phase: measurement.phase.code(),
                    power_of_ten_multiplier: quantity.multiplier(),
                    uom: quantity.uom(),
                },
            }
        })
        .collect()
}

pub fn mirror_usage_point(
    lfdi: &str,
    role: MirrorRole,
    readings: Vec<MirrorMeterReading>,
) -> MirrorUsagePoint {
    MirrorUsagePoint {
        xmlns: SEP2_NAMESPACE,
        mrid: mrid(lfdi, role, 0),
        description: format!("{} measurements", role.label()),
        role_flags: hex(u32::from(role.role_flags()), 2),
        service_category_kind: SERVICE_CATEGORY_ELECTRICITY,
        status: STATUS_ON,
        device_lfdi: lfdi.to_ascii_uppercase(),
        readings,
    }
}

pub fn mirror_meter_reading_list(readings: Vec<MirrorMeterReading>) -> MirrorMeterReadingList {
    MirrorMeterReadingList {
        xmlns: SEP2_NAMESPACE,
        all: readings.len(),
        results: readings.len(),
        readings,
    }
}

/// ConnectStatusType bit set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectStatus(pub u8);

impl ConnectStatus {
    pub const CONNECTED: ConnectStatus = ConnectStatus(1);
    pub const AVAILABLE: ConnectStatus = ConnectStatus(2);
    pub const OPERATING: ConnectStatus = ConnectStatus(4);
    pub const TEST: ConnectStatus = ConnectStatus(8);
    pub const FAULT: ConnectStatus = ConnectStatus(16);

    pub fn contains(self, other: ConnectStatus) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for ConnectStatus {
    type Output = ConnectStatus;

    fn bitor(self, rhs: ConnectStatus) -> ConnectStatus {
        ConnectStatus(self.0 | rhs.0)
    }
}

impl fmt::Display for ConnectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OperationalModeStatus {
    #[default]
    NotApplicable,
    Off,
    Operational,
    Test,
}

impl OperationalModeStatus {
    fn code(self) -> u8 {
        match self {
            OperationalModeStatus::NotApplicable => 0,
            OperationalModeStatus::Off => 1,
            OperationalModeStatus::Operational => 2,
            OperationalModeStatus::Test => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DerStatusInput {
    pub gen_connect: ConnectStatus,
    pub operational_mode: OperationalModeStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusValue {
    #[serde(rename = "dateTime")]
    pub date_time: i64,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerStatus {
    #[serde(rename = "@xmlns")]
    pub xmlns: &'static str,
    #[serde(rename = "genConnectStatus")]
    pub gen_connect_status: StatusValue,
    #[serde(rename = "operationalModeStatus")]
    pub operational_mode_status: StatusValue,
    #[serde(rename = "readingTime")]
    pub reading_time: i64,
}

pub fn der_status(input: DerStatusInput, at: DateTime<Utc>) -> DerStatus {
    let date_time = at.timestamp();
    DerStatus {
        xmlns: SEP2_NAMESPACE,
        gen_connect_status: StatusValue {
            date_time,
            value: input.gen_connect.to_string(),
        },
        operational_mode_status: StatusValue {
            date_time,
            value: input.operational_mode.code().to_string(),
        },
        reading_time: date_time,
    }
}

/// Fleet nameplate ratings.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DerRatings {
    pub max_w: f64,
    pub max_va: f64,
    pub max_var: f64,
    pub v_nom: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rating {
    pub multiplier: i8,
    pub value: i16,
}

impl Rating {
    /// Smallest non-negative power of ten that keeps the value within an i16.
    pub fn from_f64(value: f64) -> Rating {
        let value = if value.is_finite() { value } else { 0.0 };
        let mut multiplier = 0i8;
        let mut scaled = value.round();
        while scaled.abs() > f64::from(i16::MAX) && multiplier < 9 {
            multiplier += 1;
            scaled = (value / 10f64.powi(i32::from(multiplier))).round();
        }
        Rating {
            multiplier,
            value: scaled.clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerCapability {
    #[serde(rename = "@xmlns")]
    pub xmlns: &'static str,
    #[serde(rename = "@xmlns:csipaus")]
    pub xmlns_csipaus: &'static str,
    #[serde(rename = "modesSupported")]
    pub modes_supported: String,
    #[serde(rename = "rtgMaxVA")]
    pub rtg_max_va: Rating,
    #[serde(rename = "rtgMaxVar")]
    pub rtg_max_var: Rating,
    #[serde(rename = "rtgMaxW")]
    pub rtg_max_w: Rating,
    #[serde(rename = "rtgVNom", skip_serializing_if = "Option::is_none")]
    pub rtg_v_nom: Option<Rating>,
    #[serde(rename = "type")]
    pub der_type: u8,
    #[serde(rename = "csipaus:doeModesSupported")]
    pub doe_modes_supported: String,
}

/// Capabilities of the fleet: connect, energize and a maximum-output limit, which cover the
/// export and generation limits the controller enforces.
pub fn der_capability(ratings: DerRatings) -> DerCapability {
    DerCapability {
        xmlns: SEP2_NAMESPACE,
        xmlns_csipaus: CSIPAUS_NAMESPACE,
        modes_supported: hex(MODE_CONNECT | MODE_ENERGIZE | MODE_MAX_LIM_W, 8),
        rtg_max_va: Rating::from_f64(ratings.max_va),
        rtg_max_var: Rating::from_f64(ratings.max_var),
        rtg_max_w: Rating::from_f64(ratings.max_w),
        rtg_v_nom: ratings.v_nom.map(Rating::from_f64),
        der_type: DER_TYPE_PV,
        doe_modes_supported: hex(DOE_EXP_LIM_W | DOE_GEN_LIM_W, 8),
    }
}

/// A document that can be written to the utility server.
pub trait Sep2Body: Serialize + Sized {
    const NAME: &'static str;

    fn to_xml(&self) -> Result<String, Sep2Error> {
        quick_xml::se::to_string_with_root(Self::NAME, self).map_err(|err| Sep2Error::Encode {
            resource: Self::NAME,
            message: err.to_string(),
        })
    }
}

impl Sep2Body for MirrorUsagePoint {
    const NAME: &'static str = "MirrorUsagePoint";
}

impl Sep2Body for MirrorMeterReadingList {
    const NAME: &'static str = "MirrorMeterReadingList";
}

impl Sep2Body for DerStatus {
    const NAME: &'static str = "DERStatus";
}

impl Sep2Body for DerCapability {
    const NAME: &'static str = "DERCapability";
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const LFDI: &str = "3e4f45ab31edfe5b67e343e5e4562e31984e23e5";

    fn at() -> DateTime<Utc> {
        Utc.timestamp_opt(1_659_656_880, 0).single().expect("timestamp")
    }

    fn site_sample() -> SiteSample {
        SiteSample {
            date: at(),
            real_power: PowerReading::PerPhaseNet {
                phase_a: 1_500.0,
                phase_b: None,
                phase_c: None,
                net: 1_500.0,
            },
            reactive_power: PowerReading::NoPhase { net: -20.0 },
            voltage: VoltageReading {
                phase_a: 240.2,
                phase_b: None,
                phase_c: None,
            },
            frequency: Some(49.987),
        }
    }

    #[test]
    fn role_flags_encode_as_hex() {
        assert_eq!(hex(u32::from(MirrorRole::Site.role_flags()), 2), "03");
        assert_eq!(hex(u32::from(MirrorRole::Der.role_flags()), 2), "49");
    }

    #[test]
    fn site_sample_becomes_one_reading_per_phase_and_quantity() {
        let measurements = site_measurements(&site_sample());
        let readings = mirror_meter_readings(
            LFDI,
            MirrorRole::Site,
            &measurements,
            at(),
            Duration::from_secs(300),
        );
        assert_eq!(readings.len(), 5);

        let phase_a = &readings[0];
        assert_eq!(phase_a.description, "Average W Reading - Phase A (Site)");
        assert_eq!(phase_a.last_update_time, 1_659_656_880);
        assert_eq!(phase_a.next_update_time, 1_659_657_180);
        assert_eq!(phase_a.reading.value, 1_500);
        assert_eq!(phase_a.reading.quality_flags, "0001");
        assert_eq!(phase_a.reading_type.kind, 37);
        assert_eq!(phase_a.reading_type.uom, 38);
        assert_eq!(phase_a.reading_type.phase, Some(128));
        assert_eq!(phase_a.reading_type.interval_length, 300);
        assert_eq!(phase_a.mrid.len(), 32);

        let voltage = &readings[3];
        assert_eq!(voltage.reading.value, 2_402);
        assert_eq!(voltage.reading_type.power_of_ten_multiplier, -1);
        let frequency = &readings[4];
        assert_eq!(frequency.reading.value, 4_999);
        assert_eq!(frequency.reading_type.phase, None);

        let mut mrids: Vec<&str> = readings.iter().map(|reading| reading.mrid.as_str()).collect();
        mrids.sort_unstable();
        mrids.dedup();
        assert_eq!(mrids.len(), readings.len());
    }

    #[test]
    fn mirror_usage_point_xml() {
        let measurements = [Measurement {
            quantity: Quantity::RealPower,
            phase: Phase::Net,
            value: 3_000.0,
        }];
        let readings = mirror_meter_readings(
            LFDI,
            MirrorRole::Der,
            &measurements,
            at(),
            Duration::from_secs(60),
        );
        let xml = mirror_usage_point(LFDI, MirrorRole::Der, readings)
            .to_xml()
            .expect("xml");

        assert!(xml.starts_with(r#"<MirrorUsagePoint xmlns="urn:ieee:std:2030.5:ns">"#));
        assert!(xml.contains("<roleFlags>49</roleFlags>"));
        assert!(xml.contains("<deviceLFDI>3E4F45AB31EDFE5B67E343E5E4562E31984E23E5</deviceLFDI>"));
        assert!(xml.contains("<mRID>0201003E4F45AB31EDFE5B67E343E5E4</mRID>"));
        assert!(xml.contains("<value>3000</value>"));
        assert!(xml.contains("<flowDirection>19</flowDirection>"));
        // net readings carry no phase
        assert!(!xml.contains("<phase>"));
        assert!(!xml.contains("<MirrorMeterReading xmlns"));
    }

    #[test]
    fn der_status_xml() {
        let xml = der_status(
            DerStatusInput {
                gen_connect: ConnectStatus::CONNECTED
                    | ConnectStatus::AVAILABLE
                    | ConnectStatus::OPERATING,
                operational_mode: OperationalModeStatus::Operational,
            },
            at(),
        )
        .to_xml()
        .expect("xml");

        assert_eq!(
            xml,
            concat!(
                r#"<DERStatus xmlns="urn:ieee:std:2030.5:ns">"#,
                "<genConnectStatus><dateTime>1659656880</dateTime><value>07</value></genConnectStatus>",
                "<operationalModeStatus><dateTime>1659656880</dateTime><value>2</value></operationalModeStatus>",
                "<readingTime>1659656880</readingTime>",
                "</DERStatus>"
            )
        );
    }

    #[test]
    fn der_capability_xml() {
        let capability = der_capability(DerRatings {
            max_w: 52_500.0,
            max_va: 5_000.0,
            max_var: 2_500.0,
            v_nom: None,
        });
        assert_eq!(capability.modes_supported, "0010000C");
        assert_eq!(capability.doe_modes_supported, "00000005");
        assert_eq!(
            capability.rtg_max_w,
            Rating {
                multiplier: 1,
                value: 5_250
            }
        );

        let xml = capability.to_xml().expect("xml");
        assert!(xml.starts_with(
            r#"<DERCapability xmlns="urn:ieee:std:2030.5:ns" xmlns:csipaus="https://csipaus.org/ns">"#
        ));
        assert!(xml.contains("<rtgMaxVA><multiplier>0</multiplier><value>5000</value></rtgMaxVA>"));
        assert!(xml.contains("<csipaus:doeModesSupported>00000005</csipaus:doeModesSupported>"));
        assert!(!xml.contains("rtgVNom"));
    }

    #[test]
    fn ratings_pick_the_smallest_multiplier() {
        assert_eq!(Rating::from_f64(0.0), Rating { multiplier: 0, value: 0 });
        assert_eq!(Rating::from_f64(32_767.0), Rating { multiplier: 0, value: 32_767 });
        assert_eq!(Rating::from_f64(32_768.0), Rating { multiplier: 1, value: 3_277 });
        assert_eq!(Rating::from_f64(f64::NAN), Rating { multiplier: 0, value: 0 });
    }
}
