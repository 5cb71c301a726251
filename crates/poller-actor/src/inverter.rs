use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use modbus_client::RegisterTransport;
use serde::Serialize;
use sunspec_codec::models::{
    CommonModel, ControlsModel, InverterModel, NameplateModel, SettingsModel, StatusModel,
};
use sunspec_codec::CodecError;
use tracing::debug;
use types::{DerSample, DeviceIdentity, PowerReading};

use crate::aggregate::{average, average_voltage, sum_power, voltage_from_phases};
use crate::{PollerError, SampleSource, SunSpecDevice};

/// Everything read from one inverter in one tick.
#[derive(Debug, Clone, Serialize)]
pub struct InverterSnapshot {
    pub identity: DeviceIdentity,
    pub common: CommonModel,
    pub inverter: InverterModel,
    pub nameplate: NameplateModel,
    pub settings: SettingsModel,
    pub status: StatusModel,
    pub controls: ControlsModel,
}

/// Rated capability of the whole fleet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NameplateTotals {
    pub max_w: f64,
    pub max_va: f64,
    pub max_var: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvertersSample {
    pub date: DateTime<Utc>,
    pub devices: Vec<InverterSnapshot>,
    pub der: DerSample,
    pub nameplate: NameplateTotals,
}

impl InvertersSample {
    pub fn device(&self, identity: &DeviceIdentity) -> Option<&InverterSnapshot> {
        self.devices.iter().find(|device| &device.identity == identity)
    }
}

/// Reads every inverter concurrently; the models of one inverter are read in sequence.
pub struct InverterPoller<T> {
    devices: Vec<SunSpecDevice<T>>,
}

impl<T> InverterPoller<T>
where
    T: RegisterTransport + 'static,
{
    pub fn new(devices: Vec<SunSpecDevice<T>>) -> Self {
        Self { devices }
    }

    async fn read_device(device: &SunSpecDevice<T>) -> Result<InverterSnapshot, PollerError> {
        let connection = &device.connection;
        let wrap = |source: CodecError| PollerError::Device {
            device: device.identity.clone(),
            source,
        };

        let common = connection.get_common().await.map_err(wrap)?;
        let inverter = connection.get_inverter().await.map_err(wrap)?;
        let nameplate = connection.get_nameplate().await.map_err(wrap)?;
        let settings = connection.get_settings().await.map_err(wrap)?;
        let status = connection.get_status().await.map_err(wrap)?;
        let controls = connection.get_controls().await.map_err(wrap)?;

        debug!(device = %device.identity, watts = ?inverter.watts(), "inverter read");
        Ok(InverterSnapshot {
            identity: device.identity.clone(),
            common,
            inverter,
            nameplate,
            settings,
            status,
            controls,
        })
    }
}

#[async_trait]
impl<T> SampleSource for InverterPoller<T>
where
    T: RegisterTransport + 'static,
{
    type Sample = InvertersSample;

    fn name(&self) -> &'static str {
        "inverters"
    }

    async fn poll(&self) -> Result<InvertersSample, PollerError> {
        if self.devices.is_empty() {
            return Err(PollerError::NoDevices);
        }

        let results = join_all(self.devices.iter().map(Self::read_device)).await;
        let devices = results.into_iter().collect::<Result<Vec<_>, _>>()?;
        summarize(devices, Utc::now())
    }
}

pub fn summarize(
    devices: Vec<InverterSnapshot>,
    date: DateTime<Utc>,
) -> Result<InvertersSample, PollerError> {
    let mut real = Vec::with_capacity(devices.len());
    let mut totals = NameplateTotals {
        max_w: 0.0,
        max_va: 0.0,
        max_var: 0.0,
    };

    for device in &devices {
        let watts = device.inverter.watts().ok_or_else(|| PollerError::MissingValue {
            device: device.identity.clone(),
            value: "W",
        })?;
        real.push(PowerReading::NoPhase { net: watts });

        let max_w = device.nameplate.max_w().ok_or_else(|| PollerError::MissingValue {
            device: device.identity.clone(),
            value: "WRtg",
        })?;
        totals.max_w += max_w;
        totals.max_va += device.nameplate.max_va().unwrap_or(max_w);
        totals.max_var += device.nameplate.max_var().unwrap_or_default();
    }

    let reactive = devices
        .iter()
        .filter_map(|device| device.inverter.vars())
        .map(|net| PowerReading::NoPhase { net });
    let voltage = average_voltage(
        devices
            .iter()
            .filter_map(|device| voltage_from_phases(device.inverter.phase_voltages())),
    );

    let der = DerSample {
        date,
        real_power: sum_power(real).unwrap_or(PowerReading::NoPhase { net: 0.0 }),
        reactive_power: sum_power(reactive).unwrap_or(PowerReading::NoPhase { net: 0.0 }),
        voltage,
        frequency: average(devices.iter().map(|device| device.inverter.frequency())),
    };

    Ok(InvertersSample {
        date,
        devices,
        der,
        nameplate: totals,
    })
}
