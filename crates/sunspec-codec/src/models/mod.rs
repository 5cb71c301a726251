//! SunSpec information models used by the pollers and the controller.
//!
//! Offsets are relative to the model header, so `ID` is always register 0 and `L` register 1.

pub mod common;
pub mod controls;
pub mod inverter;
pub mod meter;
pub mod nameplate;
pub mod settings;
pub mod status;

pub use common::{CommonModel, COMMON_MODEL};
pub use controls::{ControlsModel, ControlsWrite, CONTROLS_MODEL};
pub use inverter::{InverterModel, INVERTER_MODEL};
pub use meter::{MeterModel, METER_MODEL};
pub use nameplate::{NameplateModel, NAMEPLATE_MODEL};
pub use settings::{SettingsModel, SETTINGS_MODEL};
pub use status::{StatusModel, STATUS_MODEL};

/// Model ids accepted for each role, in preference order.
pub const COMMON_IDS: &[u16] = &[1];
pub const INVERTER_IDS: &[u16] = &[103, 102, 101];
pub const NAMEPLATE_IDS: &[u16] = &[120];
pub const SETTINGS_IDS: &[u16] = &[121];
pub const STATUS_IDS: &[u16] = &[122];
pub const CONTROLS_IDS: &[u16] = &[123];
pub const METER_IDS: &[u16] = &[203, 202, 201, 204];
