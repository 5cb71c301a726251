use serde::Serialize;
use types::PointValue;

use crate::apply_scale;
use crate::converters::{registers_to_i16, registers_to_sunssf, registers_to_u16};
use crate::model::RegisterModel;
use crate::read_field;

/// Basic settings (model 121).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SettingsModel {
    pub id: u16,
    pub l: u16,
    /// Maximum power output setting.
    pub w_max: u16,
    pub v_ref: u16,
    pub v_ref_ofs: i16,
    pub v_max: u16,
    pub v_min: u16,
    pub va_max: u16,
    pub var_max_q1: i16,
    pub var_max_q2: i16,
    pub var_max_q3: i16,
    pub var_max_q4: i16,
    /// Default ramp rate, % WMax per second.
    pub w_gra: u16,
    pub pf_min_q1: i16,
    pub pf_min_q2: i16,
    pub pf_min_q3: i16,
    pub pf_min_q4: i16,
    pub var_act: u16,
    pub clc_tot_va: u16,
    pub max_rmp_rte: u16,
    pub ecp_nom_hz: u16,
    pub conn_ph: u16,
    pub w_max_sf: i16,
    pub v_ref_sf: i16,
    pub v_ref_ofs_sf: i16,
    pub v_min_max_sf: i16,
    pub va_max_sf: i16,
    pub var_max_sf: i16,
    pub w_gra_sf: i16,
    pub pf_min_sf: i16,
    pub max_rmp_rte_sf: i16,
    pub ecp_nom_hz_sf: i16,
}

pub const SETTINGS_MODEL: RegisterModel<SettingsModel> = RegisterModel {
    name: "settings",
    address_length: 32,
    fields: &[
        read_field!("ID", 0, 1, id, registers_to_u16),
        read_field!("L", 1, 2, l, registers_to_u16),
        read_field!("WMax", 2, 3, w_max, registers_to_u16),
        read_field!("VRef", 3, 4, v_ref, registers_to_u16),
        read_field!("VRefOfs", 4, 5, v_ref_ofs, registers_to_i16),
        read_field!("VMax", 5, 6, v_max, registers_to_u16),
        read_field!("VMin", 6, 7, v_min, registers_to_u16),
        read_field!("VAMax", 7, 8, va_max, registers_to_u16),
        read_field!("VArMaxQ1", 8, 9, var_max_q1, registers_to_i16),
        read_field!("VArMaxQ2", 9, 10, var_max_q2, registers_to_i16),
        read_field!("VArMaxQ3", 10, 11, var_max_q3, registers_to_i16),
        read_field!("VArMaxQ4", 11, 12, var_max_q4, registers_to_i16),
        read_field!("WGra", 12, 13, w_gra, registers_to_u16),
        read_field!("PFMinQ1", 13, 14, pf_min_q1, registers_to_i16),
        read_field!("PFMinQ2", 14, 15, pf_min_q2, registers_to_i16),
        read_field!("PFMinQ3", 15, 16, pf_min_q3, registers_to_i16),
        read_field!("PFMinQ4", 16, 17, pf_min_q4, registers_to_i16),
        read_field!("VArAct", 17, 18, var_act, registers_to_u16),
        read_field!("ClcTotVA", 18, 19, clc_tot_va, registers_to_u16),
        read_field!("MaxRmpRte", 19, 20, max_rmp_rte, registers_to_u16),
        read_field!("ECPNomHz", 20, 21, ecp_nom_hz, registers_to_u16),
        read_field!("ConnPh", 21, 22, conn_ph, registers_to_u16),
        read_field!("WMax_SF", 22, 23, w_max_sf, registers_to_sunssf),
        read_field!("VRef_SF", 23, 24, v_ref_sf, registers_to_sunssf),
        read_field!("VRefOfs_SF", 24, 25, v_ref_ofs_sf, registers_to_sunssf),
        read_field!("VMinMax_SF", 25, 26, v_min_max_sf, registers_to_sunssf),
        read_field!("VAMax_SF", 26, 27, va_max_sf, registers_to_sunssf),
        read_field!("VArMax_SF", 27, 28, var_max_sf, registers_to_sunssf),
        read_field!("WGra_SF", 28, 29, w_gra_sf, registers_to_sunssf),
        read_field!("PFMin_SF", 29, 30, pf_min_sf, registers_to_sunssf),
        read_field!("MaxRmpRte_SF", 30, 31, max_rmp_rte_sf, registers_to_sunssf),
        read_field!("ECPNomHz_SF", 31, 32, ecp_nom_hz_sf, registers_to_sunssf),
    ],
};

impl SettingsModel {
    /// Configured output ceiling, which may sit below the nameplate rating.
    pub fn max_w(&self) -> Option<f64> {
        apply_scale(PointValue::U16(self.w_max), self.w_max_sf)
    }

    /// Nominal voltage at the point of common coupling.
    pub fn v_ref(&self) -> Option<f64> {
        apply_scale(PointValue::U16(self.v_ref), self.v_ref_sf)
    }
}
