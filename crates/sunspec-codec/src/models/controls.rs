use serde::Serialize;

use crate::converters::{
    registers_to_i16, registers_to_sunssf, registers_to_u16, u16_to_registers,
};
use crate::model::RegisterModel;
use crate::{read_field, write_field};

/// `Conn` values.
pub mod conn {
    pub const DISCONNECT: u16 = 0;
    pub const CONNECT: u16 = 1;
}

/// `WMaxLim_Ena` values.
pub mod w_max_lim_ena {
    pub const DISABLED: u16 = 0;
    pub const ENABLED: u16 = 1;
}

/// Immediate controls (model 123).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ControlsModel {
    pub id: u16,
    pub l: u16,
    /// Time window for connect/disconnect, seconds.
    pub conn_win_tms: u16,
    /// Timeout for connect/disconnect, seconds.
    pub conn_rvrt_tms: u16,
    pub conn: u16,
    /// Output limit as a percent of WMax, scaled by `w_max_lim_pct_sf`.
    pub w_max_lim_pct: u16,
    pub w_max_lim_pct_win_tms: u16,
    pub w_max_lim_pct_rvrt_tms: u16,
    pub w_max_lim_pct_rmp_tms: u16,
    pub w_max_lim_ena: u16,
    pub out_pf_set: i16,
    pub out_pf_set_win_tms: u16,
    pub out_pf_set_rvrt_tms: u16,
    pub out_pf_set_rmp_tms: u16,
    pub out_pf_set_ena: u16,
    pub var_w_max_pct: i16,
    pub var_max_pct: i16,
    pub var_aval_pct: i16,
    pub var_pct_win_tms: u16,
    pub var_pct_rvrt_tms: u16,
    pub var_pct_rmp_tms: u16,
    pub var_pct_mod: u16,
    pub var_pct_ena: u16,
    pub w_max_lim_pct_sf: i16,
    pub out_pf_set_sf: i16,
    pub var_pct_sf: i16,
}

/// The connect and output-limit registers this controller writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ControlsWrite {
    pub conn_win_tms: u16,
    pub conn_rvrt_tms: u16,
    pub conn: u16,
    pub w_max_lim_pct: u16,
    pub w_max_lim_pct_win_tms: u16,
    pub w_max_lim_pct_rvrt_tms: u16,
    pub w_max_lim_pct_rmp_tms: u16,
    pub w_max_lim_ena: u16,
}

pub const CONTROLS_MODEL: RegisterModel<ControlsModel, ControlsWrite> = RegisterModel {
    name: "controls",
    address_length: 26,
    fields: &[
        read_field!("ID", 0, 1, id, registers_to_u16),
        read_field!("L", 1, 2, l, registers_to_u16),
        write_field!("Conn_WinTms", 2, 3, conn_win_tms, registers_to_u16, u16_to_registers),
        write_field!("Conn_RvrtTms", 3, 4, conn_rvrt_tms, registers_to_u16, u16_to_registers),
        write_field!("Conn", 4, 5, conn, registers_to_u16, u16_to_registers),
        write_field!("WMaxLimPct", 5, 6, w_max_lim_pct, registers_to_u16, u16_to_registers),
        write_field!(
            "WMaxLimPct_WinTms",
            6,
            7,
            w_max_lim_pct_win_tms,
            registers_to_u16,
            u16_to_registers
        ),
        write_field!(
            "WMaxLimPct_RvrtTms",
            7,
            8,
            w_max_lim_pct_rvrt_tms,
            registers_to_u16,
            u16_to_registers
        ),
        write_field!(
            "WMaxLimPct_RmpTms",
            8,
            9,
            w_max_lim_pct_rmp_tms,
            registers_to_u16,
            u16_to_registers
        ),
        write_field!("WMaxLim_Ena", 9, 10, w_max_lim_ena, registers_to_u16, u16_to_registers),
        read_field!("OutPFSet", 10, 11, out_pf_set, registers_to_i16),
        read_field!("OutPFSet_WinTms", 11, 12, out_pf_set_win_tms, registers_to_u16),
        read_field!("OutPFSet_RvrtTms", 12, 13, out_pf_set_rvrt_tms, registers_to_u16),
        read_field!("OutPFSet_RmpTms", 13, 14, out_pf_set_rmp_tms, registers_to_u16),
        read_field!("OutPFSet_Ena", 14, 15, out_pf_set_ena, registers_to_u16),
        read_field!("VArWMaxPct", 15, 16, var_w_max_pct, registers_to_i16),
        read_field!("VArMaxPct", 16, 17, var_max_pct, registers_to_i16),
        read_field!("VArAvalPct", 17, 18, var_aval_pct, registers_to_i16),
        read_field!("VArPct_WinTms", 18, 19, var_pct_win_tms, registers_to_u16),
        read_field!("VArPct_RvrtTms", 19, 20, var_pct_rvrt_tms, registers_to_u16),
        read_field!("VArPct_RmpTms", 20, 21, var_pct_rmp_tms, registers_to_u16),
        read_field!("VArPct_Mod", 21, 22, var_pct_mod, registers_to_u16),
        read_field!("VArPct_Ena", 22, 23, var_pct_ena, registers_to_u16),
        read_field!("WMaxLimPct_SF", 23, 24, w_max_lim_pct_sf, registers_to_sunssf),
        read_field!("OutPFSet_SF", 24, 25, out_pf_set_sf, registers_to_sunssf),
        read_field!("VArPct_SF", 25, 26, var_pct_sf, registers_to_sunssf),
    ],
};
