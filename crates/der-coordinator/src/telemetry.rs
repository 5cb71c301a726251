use csip_client::{
    ConnectStatus, DerRatings, DerStatusInput, DerTelemetry, OperationalModeStatus,
    TelemetrySource,
};
use poller_actor::{InverterSnapshot, InvertersSample, SampleReceiver};
use sunspec_codec::models::status::pv_conn;
use types::SiteSample;

/// Inverter `St` value while faulted.
const ST_FAULT: u16 = 7;

/// Feeds the utility reporter from the latest polled samples.
pub struct PolledTelemetry {
    inverters: SampleReceiver<InvertersSample>,
    site: SampleReceiver<SiteSample>,
}

impl PolledTelemetry {
    pub fn new(
        inverters: SampleReceiver<InvertersSample>,
        site: SampleReceiver<SiteSample>,
    ) -> Self {
        Self { inverters, site }
    }
}

impl TelemetrySource for PolledTelemetry {
    fn site(&self) -> Option<SiteSample> {
        self.site.borrow().as_deref().cloned()
    }

    fn der(&self) -> Option<DerTelemetry> {
        self.inverters.borrow().as_deref().map(der_telemetry)
    }
}

pub fn der_telemetry(sample: &InvertersSample) -> DerTelemetry {
    DerTelemetry {
        sample: sample.der.clone(),
        status: der_status(&sample.devices),
        ratings: DerRatings {
            max_w: sample.nameplate.max_w,
            max_va: sample.nameplate.max_va,
            max_var: sample.nameplate.max_var,
            v_nom: nominal_voltage(&sample.devices),
        },
    }
}

/// The fleet is connected or operating when any inverter is.
fn der_status(devices: &[InverterSnapshot]) -> DerStatusInput {
    if devices.is_empty() {
        return DerStatusInput::default();
    }
    let bits = devices
        .iter()
        .fold(0u16, |bits, device| bits | device.status.pv_conn);
    let known = pv_conn::CONNECTED | pv_conn::AVAILABLE | pv_conn::OPERATING | pv_conn::TEST;
    let mut gen_connect = ConnectStatus((bits & known) as u8);
    if devices.iter().any(|device| device.inverter.st == ST_FAULT) {
        gen_connect = gen_connect | ConnectStatus::FAULT;
    }

    let operational_mode = if bits & pv_conn::TEST != 0 {
        OperationalModeStatus::Test
    } else if bits & pv_conn::OPERATING != 0 {
        OperationalModeStatus::Operational
    } else {
        OperationalModeStatus::Off
    };

    DerStatusInput {
        gen_connect,
        operational_mode,
    }
}

fn nominal_voltage(devices: &[InverterSnapshot]) -> Option<f64> {
    let readings: Vec<f64> = devices
        .iter()
        .filter_map(|device| device.settings.v_ref())
        .filter(|volts| *volts > 0.0)
        .collect();
    if readings.is_empty() {
        return None;
    }
    Some(readings.iter().sum::<f64>() / readings.len() as f64)
}
