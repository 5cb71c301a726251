//! Fleet aggregation of per-device readings.
//!
//! Power is summed per phase and a phase is present when at least one device reports it.
//! Voltage and frequency are averaged over the devices that report them.

use types::{PowerReading, VoltageReading};

pub fn sum_power<I>(readings: I) -> Option<PowerReading>
where
    I: IntoIterator<Item = PowerReading>,
{
    let mut any = false;
    let mut net = 0.0;
    let mut phases: [Option<f64>; 3] = [None; 3];

    for reading in readings {
        any = true;
        net += reading.net();
        if let PowerReading::PerPhaseNet {
            phase_a,
            phase_b,
            phase_c,
            ..
        } = reading
        {
            for (total, value) in phases.iter_mut().zip([Some(phase_a), phase_b, phase_c]) {
                if let Some(value) = value {
                    *total = Some(total.unwrap_or(0.0) + value);
                }
            }
        }
    }

    if !any {
        return None;
    }

    Some(match phases {
        [Some(phase_a), phase_b, phase_c] => PowerReading::PerPhaseNet {
            phase_a,
            phase_b,
            phase_c,
            net,
        },
        _ => PowerReading::NoPhase { net },
    })
}

pub fn average_voltage<I>(readings: I) -> Option<VoltageReading>
where
    I: IntoIterator<Item = VoltageReading>,
{
    let mut sums = [(0.0, 0u32); 3];
    for reading in readings {
        for (sum, value) in sums
            .iter_mut()
            .zip([Some(reading.phase_a), reading.phase_b, reading.phase_c])
        {
            if let Some(value) = value {
                sum.0 += value;
                sum.1 += 1;
            }
        }
    }

    let [phase_a, phase_b, phase_c] =
        sums.map(|(sum, count)| (count > 0).then(|| sum / f64::from(count)));
    Some(VoltageReading {
        phase_a: phase_a?,
        phase_b,
        phase_c,
    })
}

pub fn average<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let (sum, count) = values
        .into_iter()
        .flatten()
        .fold((0.0, 0u32), |(sum, count), value| (sum + value, count + 1));
    (count > 0).then(|| sum / f64::from(count))
}

/// Builds a voltage reading from raw phase values; phase A is mandatory.
pub fn voltage_from_phases([phase_a, phase_b, phase_c]: [Option<f64>; 3]) -> Option<VoltageReading> {
    Some(VoltageReading {
        phase_a: phase_a?,
        phase_b,
        phase_c,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_power_per_phase() {
        let total = sum_power([
            PowerReading::PerPhaseNet {
                phase_a: 100.0,
                phase_b: None,
                phase_c: Some(50.0),
                net: 150.0,
            },
            PowerReading::PerPhaseNet {
                phase_a: 20.0,
                phase_b: Some(30.0),
                phase_c: None,
                net: 50.0,
            },
        ]);
        assert_eq!(
            total,
            Some(PowerReading::PerPhaseNet {
                phase_a: 120.0,
                phase_b: Some(30.0),
                phase_c: Some(50.0),
                net: 200.0,
            })
        );
    }

    #[test]
    fn no_phase_devices_only_add_to_net() {
        let total = sum_power([
            PowerReading::NoPhase { net: 1_000.0 },
            PowerReading::NoPhase { net: 2_500.0 },
        ]);
        assert_eq!(total, Some(PowerReading::NoPhase { net: 3_500.0 }));
        assert_eq!(sum_power(Vec::new()), None);
    }

    #[test]
    fn averages_only_reporting_phases() {
        let voltage = average_voltage([
            VoltageReading {
                phase_a: 240.0,
                phase_b: None,
                phase_c: Some(230.0),
            },
            VoltageReading {
                phase_a: 242.0,
                phase_b: None,
                phase_c: None,
            },
        ])
        .expect("voltage");
        assert_eq!(voltage.phase_a, 241.0);
        assert_eq!(voltage.phase_b, None);
        assert_eq!(voltage.phase_c, Some(230.0));
        assert_eq!(average([Some(49.5), None, Some(50.5)]), Some(50.0));
    }
}
