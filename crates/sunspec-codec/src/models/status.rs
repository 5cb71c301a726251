use serde::Serialize;

use crate::converters::{
    registers_to_string, registers_to_sunssf, registers_to_u16, registers_to_u32,
    registers_to_u64,
};
use crate::model::RegisterModel;
use crate::read_field;

/// `PVConn` bits.
pub mod pv_conn {
    pub const CONNECTED: u16 = 1 << 0;
    pub const AVAILABLE: u16 = 1 << 1;
    pub const OPERATING: u16 = 1 << 2;
    pub const TEST: u16 = 1 << 3;
}

/// Extended status (model 122).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusModel {
    pub id: u16,
    pub l: u16,
    pub pv_conn: u16,
    pub stor_conn: u16,
    pub ecp_conn: u16,
    pub act_wh: u64,
    pub act_vah: u64,
    pub act_varh_q1: u64,
    pub act_varh_q2: u64,
    pub act_varh_q3: u64,
    pub act_varh_q4: u64,
    pub var_aval: u16,
    pub var_aval_sf: i16,
    pub w_aval: u16,
    pub w_aval_sf: i16,
    pub st_set_lim_msk: u32,
    pub st_act_ctl: u32,
    pub tm_src: String,
    pub tms: u32,
    pub rt_st: u16,
    pub ris: u16,
    pub ris_sf: i16,
}

pub const STATUS_MODEL: RegisterModel<StatusModel> = RegisterModel {
    name: "status",
    address_length: 46,
    fields: &[
        read_field!("ID", 0, 1, id, registers_to_u16),
        read_field!("L", 1, 2, l, registers_to_u16),
        read_field!("PVConn", 2, 3, pv_conn, registers_to_u16),
        read_field!("StorConn", 3, 4, stor_conn, registers_to_u16),
        read_field!("ECPConn", 4, 5, ecp_conn, registers_to_u16),
        read_field!("ActWh", 5, 9, act_wh, registers_to_u64),
        read_field!("ActVAh", 9, 13, act_vah, registers_to_u64),
        read_field!("ActVArhQ1", 13, 17, act_varh_q1, registers_to_u64),
        read_field!("ActVArhQ2", 17, 21, act_varh_q2, registers_to_u64),
        read_field!("ActVArhQ3", 21, 25, act_varh_q3, registers_to_u64),
        read_field!("ActVArhQ4", 25, 29, act_varh_q4, registers_to_u64),
        read_field!("VArAval", 29, 30, var_aval, registers_to_u16),
        read_field!("VArAval_SF", 30, 31, var_aval_sf, registers_to_sunssf),
        read_field!("WAval", 31, 32, w_aval, registers_to_u16),
        read_field!("WAval_SF", 32, 33, w_aval_sf, registers_to_sunssf),
        read_field!("StSetLimMsk", 33, 35, st_set_lim_msk, registers_to_u32),
        read_field!("StActCtl", 35, 37, st_act_ctl, registers_to_u32),
        read_field!("TmSrc", 37, 41, tm_src, registers_to_string),
        read_field!("Tms", 41, 43, tms, registers_to_u32),
        read_field!("RtSt", 43, 44, rt_st, registers_to_u16),
        read_field!("Ris", 44, 45, ris, registers_to_u16),
        read_field!("Ris_SF", 45, 46, ris_sf, registers_to_sunssf),
    ],
};

impl StatusModel {
    pub fn is_connected(&self) -> bool {
        self.pv_conn & pv_conn::CONNECTED != 0
    }
}
