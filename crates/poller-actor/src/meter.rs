use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use modbus_client::RegisterTransport;
use sunspec_codec::models::MeterModel;
use tracing::debug;
use types::{DeviceIdentity, PowerReading, SiteSample};

use crate::aggregate::{average, average_voltage, sum_power, voltage_from_phases};
use crate::{PollerError, SampleSource, SunSpecDevice};

/// Reads the connection-point meters and publishes them as one site sample.
pub struct MeterPoller<T> {
    devices: Vec<SunSpecDevice<T>>,
}

impl<T> MeterPoller<T>
where
    T: RegisterTransport + 'static,
{
    pub fn new(devices: Vec<SunSpecDevice<T>>) -> Self {
        Self { devices }
    }

    async fn read_device(
        device: &SunSpecDevice<T>,
    ) -> Result<(DeviceIdentity, MeterModel), PollerError> {
        let meter = device
            .connection
            .get_meter()
            .await
            .map_err(|source| PollerError::Device {
                device: device.identity.clone(),
                source,
            })?;
        debug!(device = %device.identity, watts = ?meter.watts(), "meter read");
        Ok((device.identity.clone(), meter))
    }
}

#[async_trait]
impl<T> SampleSource for MeterPoller<T>
where
    T: RegisterTransport + 'static,
{
    type Sample = SiteSample;

    fn name(&self) -> &'static str {
        "meters"
    }

    async fn poll(&self) -> Result<SiteSample, PollerError> {
        if self.devices.is_empty() {
            return Err(PollerError::NoDevices);
        }

        let results = join_all(self.devices.iter().map(Self::read_device)).await;
        let meters = results.into_iter().collect::<Result<Vec<_>, _>>()?;
        site_sample(&meters, Utc::now())
    }
}

fn power(
    identity: &DeviceIdentity,
    net: Option<f64>,
    [phase_a, phase_b, phase_c]: [Option<f64>; 3],
    value: &'static str,
) -> Result<PowerReading, PollerError> {
    let net = net.ok_or_else(|| PollerError::MissingValue {
        device: identity.clone(),
        value,
    })?;
    Ok(match phase_a {
        Some(phase_a) => PowerReading::PerPhaseNet {
            phase_a,
            phase_b,
            phase_c,
            net,
        },
        None => PowerReading::NoPhase { net },
    })
}

pub fn site_sample(
    meters: &[(DeviceIdentity, MeterModel)],
    date: DateTime<Utc>,
) -> Result<SiteSample, PollerError> {
    let mut real = Vec::with_capacity(meters.len());
    let mut reactive = Vec::with_capacity(meters.len());
    let mut voltages = Vec::with_capacity(meters.len());

    for (identity, meter) in meters {
        real.push(power(identity, meter.watts(), meter.phase_watts(), "W")?);
        if let Some(vars) = meter.vars() {
            reactive.push(power(identity, Some(vars), meter.phase_vars(), "VAR")?);
        }
        if let Some(voltage) = voltage_from_phases(meter.phase_voltages()) {
            voltages.push(voltage);
        }
    }

    let voltage =
        average_voltage(voltages).ok_or(PollerError::Incomplete("phase A voltage"))?;

    Ok(SiteSample {
        date,
        real_power: sum_power(real).unwrap_or(PowerReading::NoPhase { net: 0.0 }),
        reactive_power: sum_power(reactive).unwrap_or(PowerReading::NoPhase { net: 0.0 }),
        voltage,
        frequency: average(meters.iter().map(|(_, meter)| meter.frequency())),
    })
}
