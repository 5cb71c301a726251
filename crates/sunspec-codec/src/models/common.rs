use serde::Serialize;

use crate::converters::{registers_to_string, registers_to_u16};
use crate::model::RegisterModel;
use crate::read_field;

/// Device identity block (model 1).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommonModel {
    pub id: u16,
    pub l: u16,
    /// Manufacturer.
    pub mn: String,
    /// Model.
    pub md: String,
    pub opt: String,
    /// Firmware version.
    pub vr: String,
    /// Serial number.
    pub sn: String,
    /// Modbus device address.
    pub da: u16,
}

pub const COMMON_MODEL: RegisterModel<CommonModel> = RegisterModel {
    name: "common",
    address_length: 67,
    fields: &[
        read_field!("ID", 0, 1, id, registers_to_u16),
        read_field!("L", 1, 2, l, registers_to_u16),
        read_field!("Mn", 2, 18, mn, registers_to_string),
        read_field!("Md", 18, 34, md, registers_to_string),
        read_field!("Opt", 34, 42, opt, registers_to_string),
        read_field!("Vr", 42, 50, vr, registers_to_string),
        read_field!("SN", 50, 66, sn, registers_to_string),
        read_field!("DA", 66, 67, da, registers_to_u16),
    ],
};
