use serde::Serialize;
use types::PointValue;

use crate::apply_scale;
use crate::converters::{
    registers_to_i16, registers_to_sunssf, registers_to_u16, registers_to_u32,
};
use crate::model::RegisterModel;
use crate::read_field;

/// Inverter measurements (models 101, 102 and 103 share this layout).
///
/// Single and split phase inverters report the unused phases as "not implemented".
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InverterModel {
    pub id: u16,
    pub l: u16,
    pub a: u16,
    pub aph_a: u16,
    pub aph_b: u16,
    pub aph_c: u16,
    pub a_sf: i16,
    pub ppv_ph_ab: u16,
    pub ppv_ph_bc: u16,
    pub ppv_ph_ca: u16,
    pub ph_v_ph_a: u16,
    pub ph_v_ph_b: u16,
    pub ph_v_ph_c: u16,
    pub v_sf: i16,
    pub w: i16,
    pub w_sf: i16,
    pub hz: u16,
    pub hz_sf: i16,
    pub va: i16,
    pub va_sf: i16,
    pub var: i16,
    pub var_sf: i16,
    pub pf: i16,
    pub pf_sf: i16,
    /// Lifetime energy, acc32.
    pub wh: u32,
    pub wh_sf: i16,
    pub dca: u16,
    pub dca_sf: i16,
    pub dcv: u16,
    pub dcv_sf: i16,
    pub dcw: i16,
    pub dcw_sf: i16,
    pub tmp_cab: i16,
    pub tmp_snk: i16,
    pub tmp_trns: i16,
    pub tmp_ot: i16,
    pub tmp_sf: i16,
    /// Operating state.
    pub st: u16,
    pub st_vnd: u16,
    pub evt1: u32,
    pub evt2: u32,
}

pub const INVERTER_MODEL: RegisterModel<InverterModel> = RegisterModel {
    name: "inverter",
    address_length: 44,
    fields: &[
        read_field!("ID", 0, 1, id, registers_to_u16),
        read_field!("L", 1, 2, l, registers_to_u16),
        read_field!("A", 2, 3, a, registers_to_u16),
        read_field!("AphA", 3, 4, aph_a, registers_to_u16),
        read_field!("AphB", 4, 5, aph_b, registers_to_u16),
        read_field!("AphC", 5, 6, aph_c, registers_to_u16),
        read_field!("A_SF", 6, 7, a_sf, registers_to_sunssf),
        read_field!("PPVphAB", 7, 8, ppv_ph_ab, registers_to_u16),
        read_field!("PPVphBC", 8, 9, ppv_ph_bc, registers_to_u16),
        read_field!("PPVphCA", 9, 10, ppv_ph_ca, registers_to_u16),
        read_field!("PhVphA", 10, 11, ph_v_ph_a, registers_to_u16),
        read_field!("PhVphB", 11, 12, ph_v_ph_b, registers_to_u16),
        read_field!("PhVphC", 12, 13, ph_v_ph_c, registers_to_u16),
        read_field!("V_SF", 13, 14, v_sf, registers_to_sunssf),
        read_field!("W", 14, 15, w, registers_to_i16),
        read_field!("W_SF", 15, 16, w_sf, registers_to_sunssf),
        read_field!("Hz", 16, 17, hz, registers_to_u16),
        read_field!("Hz_SF", 17, 18, hz_sf, registers_to_sunssf),
        read_field!("VA", 18, 19, va, registers_to_i16),
        read_field!("VA_SF", 19, 20, va_sf, registers_to_sunssf),
        read_field!("VAr", 20, 21, var, registers_to_i16),
        read_field!("VAr_SF", 21, 22, var_sf, registers_to_sunssf),
        read_field!("PF", 22, 23, pf, registers_to_i16),
        read_field!("PF_SF", 23, 24, pf_sf, registers_to_sunssf),
        read_field!("WH", 24, 26, wh, registers_to_u32),
        read_field!("WH_SF", 26, 27, wh_sf, registers_to_sunssf),
        read_field!("DCA", 27, 28, dca, registers_to_u16),
        read_field!("DCA_SF", 28, 29, dca_sf, registers_to_sunssf),
        read_field!("DCV", 29, 30, dcv, registers_to_u16),
        read_field!("DCV_SF", 30, 31, dcv_sf, registers_to_sunssf),
        read_field!("DCW", 31, 32, dcw, registers_to_i16),
        read_field!("DCW_SF", 32, 33, dcw_sf, registers_to_sunssf),
        read_field!("TmpCab", 33, 34, tmp_cab, registers_to_i16),
        read_field!("TmpSnk", 34, 35, tmp_snk, registers_to_i16),
        read_field!("TmpTrns", 35, 36, tmp_trns, registers_to_i16),
        read_field!("TmpOt", 36, 37, tmp_ot, registers_to_i16),
        read_field!("Tmp_SF", 37, 38, tmp_sf, registers_to_sunssf),
        read_field!("St", 38, 39, st, registers_to_u16),
        read_field!("StVnd", 39, 40, st_vnd, registers_to_u16),
        read_field!("Evt1", 40, 42, evt1, registers_to_u32),
        read_field!("Evt2", 42, 44, evt2, registers_to_u32),
    ],
};

impl InverterModel {
    pub fn watts(&self) -> Option<f64> {
        apply_scale(PointValue::I16(self.w), self.w_sf)
    }

    pub fn vars(&self) -> Option<f64> {
        apply_scale(PointValue::I16(self.var), self.var_sf)
    }

    pub fn frequency(&self) -> Option<f64> {
        apply_scale(PointValue::U16(self.hz), self.hz_sf)
    }

    pub fn phase_voltages(&self) -> [Option<f64>; 3] {
        [self.ph_v_ph_a, self.ph_v_ph_b, self.ph_v_ph_c]
            .map(|raw| apply_scale(PointValue::U16(raw), self.v_sf))
    }
}
