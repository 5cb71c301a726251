mod limit;
mod sample;

use serde::{Deserialize, Serialize};

pub use limit::{
    ActiveInverterControlLimit, Attributed, ControlLimit, InverterConfiguration, LimiterKind,
};
pub use sample::{
    DerSample, PowerReading, SampleError, SiteSample, SiteSampleData, VoltageReading,
};

/// Raw point values before SunSpec scale factors are applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PointValue {
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    U64(u64),
}

/// A SunSpec value paired with its power-of-ten scale factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaledValue {
    pub value: i64,
    pub multiplier: i8,
}

impl ScaledValue {
    pub fn new(value: i64, multiplier: i8) -> Self {
        Self { value, multiplier }
    }

    pub fn to_f64(self) -> f64 {
        (self.value as f64) * 10f64.powi(i32::from(self.multiplier))
    }
}

/// Basic identity for an inverter or meter endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub ip: String,
    pub port: u16,
    pub unit_id: u8,
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}#{}", self.ip, self.port, self.unit_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_value_applies_exponent() {
        assert_eq!(ScaledValue::new(52, 3).to_f64(), 52_000.0);
        assert!((ScaledValue::new(2305, -1).to_f64() - 230.5).abs() < 1e-9);
    }
}
