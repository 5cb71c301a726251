use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("invalid sample json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid sample value: {0}")]
    InvalidValue(String),
}

/// Real or reactive power, either split per phase with a net total or net only.
///
/// Phases B and C stay nullable so single-phase sites are representable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PowerReading {
    #[serde(rename_all = "camelCase")]
    PerPhaseNet {
        phase_a: f64,
        phase_b: Option<f64>,
        phase_c: Option<f64>,
        net: f64,
    },
    #[serde(rename_all = "camelCase")]
    NoPhase { net: f64 },
}

impl PowerReading {
    pub fn net(&self) -> f64 {
        match self {
            PowerReading::PerPhaseNet { net, .. } | PowerReading::NoPhase { net } => *net,
        }
    }

    fn validate(&self, name: &str) -> Result<(), SampleError> {
        let values = match self {
            PowerReading::PerPhaseNet {
                phase_a,
                phase_b,
                phase_c,
                net,
            } => vec![Some(*phase_a), *phase_b, *phase_c, Some(*net)],
            PowerReading::NoPhase { net } => vec![Some(*net)],
        };
        if values.into_iter().flatten().any(|value| !value.is_finite()) {
            return Err(SampleError::InvalidValue(format!("{name} is not finite")));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "perPhase", rename_all = "camelCase")]
pub struct VoltageReading {
    pub phase_a: f64,
    pub phase_b: Option<f64>,
    pub phase_c: Option<f64>,
}

/// Site (connection point) measurements. Positive power is import, negative is export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSample {
    pub date: DateTime<Utc>,
    pub real_power: PowerReading,
    pub reactive_power: PowerReading,
    pub voltage: VoltageReading,
    pub frequency: Option<f64>,
}

/// Aggregated measurements of the inverter fleet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerSample {
    pub date: DateTime<Utc>,
    pub real_power: PowerReading,
    pub reactive_power: PowerReading,
    pub voltage: Option<VoltageReading>,
    pub frequency: Option<f64>,
}

/// Site sample as delivered by an external telemetry provider, before it is timestamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSampleData {
    pub real_power: PowerReading,
    pub reactive_power: PowerReading,
    pub voltage: VoltageReading,
    pub frequency: Option<f64>,
}

impl SiteSampleData {
    pub fn from_json(data: &str) -> Result<Self, SampleError> {
        let parsed: SiteSampleData = serde_json::from_str(data)?;
        parsed.real_power.validate("realPower")?;
        parsed.reactive_power.validate("reactivePower")?;
        let voltages = [
            Some(parsed.voltage.phase_a),
            parsed.voltage.phase_b,
            parsed.voltage.phase_c,
        ];
        if voltages
            .into_iter()
            .flatten()
            .any(|value| !value.is_finite() || value < 0.0)
        {
            return Err(SampleError::InvalidValue("voltage".to_string()));
        }
        if let Some(frequency) = parsed.frequency {
            if !frequency.is_finite() || frequency <= 0.0 {
                return Err(SampleError::InvalidValue("frequency".to_string()));
            }
        }
        Ok(parsed)
    }

    pub fn into_sample(self, date: DateTime<Utc>) -> SiteSample {
        SiteSample {
            date,
            real_power: self.real_power,
            reactive_power: self.reactive_power,
            voltage: self.voltage,
            frequency: self.frequency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_per_phase_site_sample() {
        let data = r#"{
            "realPower": {"type": "perPhaseNet", "phaseA": 100, "phaseB": null, "phaseC": -50, "net": 50},
            "reactivePower": {"type": "noPhase", "net": 12.5},
            "voltage": {"type": "perPhase", "phaseA": 240.1, "phaseB": null, "phaseC": 239.8},
            "frequency": 50.01
        }"#;

        let sample = SiteSampleData::from_json(data).expect("parse");
        assert_eq!(
            sample.real_power,
            PowerReading::PerPhaseNet {
                phase_a: 100.0,
                phase_b: None,
                phase_c: Some(-50.0),
                net: 50.0,
            }
        );
        assert_eq!(sample.reactive_power.net(), 12.5);
        assert_eq!(sample.voltage.phase_b, None);
    }

    #[test]
    fn rejects_malformed_site_sample() {
        assert!(SiteSampleData::from_json("{\"realPower\": 3}").is_err());

        let negative_voltage = r#"{
            "realPower": {"type": "noPhase", "net": 1},
            "reactivePower": {"type": "noPhase", "net": 0},
            "voltage": {"type": "perPhase", "phaseA": -1, "phaseB": null, "phaseC": null},
            "frequency": null
        }"#;
        assert!(matches!(
            SiteSampleData::from_json(negative_voltage),
            Err(SampleError::InvalidValue(_))
        ));
    }
}
