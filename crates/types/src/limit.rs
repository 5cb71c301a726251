use std::fmt;

use serde::{Deserialize, Serialize};

/// Every source able to assert a control limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LimiterKind {
    Sep2,
    Fixed,
    NegativeFeedIn,
    TwoWayTariff,
    Mqtt,
}

impl LimiterKind {
    pub const ALL: [LimiterKind; 5] = [
        LimiterKind::Sep2,
        LimiterKind::Fixed,
        LimiterKind::NegativeFeedIn,
        LimiterKind::TwoWayTariff,
        LimiterKind::Mqtt,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LimiterKind::Sep2 => "sep2",
            LimiterKind::Fixed => "fixed",
            LimiterKind::NegativeFeedIn => "negativeFeedIn",
            LimiterKind::TwoWayTariff => "twoWayTariff",
            LimiterKind::Mqtt => "mqtt",
        }
    }
}

impl fmt::Display for LimiterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LimiterKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        LimiterKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| format!("unknown limiter {value}"))
    }
}

/// The limits one source currently asserts. `None` means "no opinion", never zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlLimit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_mod_connect: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_mod_energize: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_mod_exp_lim_w: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_mod_gen_lim_w: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_mod_imp_lim_w: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_mod_load_lim_w: Option<f64>,
    /// Ramp time in hundredths of a second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ramp_tms: Option<u32>,
}

impl ControlLimit {
    pub fn is_empty(&self) -> bool {
        *self == ControlLimit::default()
    }

    /// Rejects values no real source can assert: negative or non-finite watt caps.
    pub fn validate(&self) -> Result<(), String> {
        let caps = [
            ("opModExpLimW", self.op_mod_exp_lim_w),
            ("opModGenLimW", self.op_mod_gen_lim_w),
            ("opModImpLimW", self.op_mod_imp_lim_w),
            ("opModLoadLimW", self.op_mod_load_lim_w),
        ];
        for (name, value) in caps {
            if let Some(value) = value {
                if !value.is_finite() || value < 0.0 {
                    return Err(format!("{name} must be a non-negative number"));
                }
            }
        }
        Ok(())
    }
}

/// A merged value and the source that won it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Attributed<T> {
    pub value: T,
    pub source: LimiterKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveInverterControlLimit {
    pub op_mod_connect: Option<Attributed<bool>>,
    pub op_mod_energize: Option<Attributed<bool>>,
    pub op_mod_exp_lim_w: Option<Attributed<f64>>,
    pub op_mod_gen_lim_w: Option<Attributed<f64>>,
    pub op_mod_imp_lim_w: Option<Attributed<f64>>,
    pub op_mod_load_lim_w: Option<Attributed<f64>>,
    pub ramp_tms: Option<Attributed<u32>>,
}

/// Fully resolved command for the inverter fleet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InverterConfiguration {
    pub connect: bool,
    pub energize: bool,
    /// Fleet-wide real power target, within `[0, nameplate]`.
    pub target_solar_watts: f64,
    /// `target_solar_watts` over rated fleet power, within `[0, 1]`.
    pub target_solar_power_ratio: f64,
    /// Ramp time in hundredths of a second.
    pub ramp_tms: Option<u32>,
}

impl InverterConfiguration {
    pub fn is_generating(&self) -> bool {
        self.connect && self.energize
    }
}
