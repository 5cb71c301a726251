use serde::Serialize;
use types::PointValue;

use crate::apply_scale;
use crate::converters::{registers_to_i16, registers_to_sunssf, registers_to_u16};
use crate::model::RegisterModel;
use crate::read_field;

/// Rated capability of the DER (model 120).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NameplateModel {
    pub id: u16,
    pub l: u16,
    /// 4 = PV, 82 = PV with storage.
    pub der_typ: u16,
    /// Continuous real power capability.
    pub w_rtg: u16,
    pub w_rtg_sf: i16,
    /// Continuous apparent power capability.
    pub va_rtg: u16,
    pub va_rtg_sf: i16,
    pub var_rtg_q1: i16,
    pub var_rtg_q2: i16,
    pub var_rtg_q3: i16,
    pub var_rtg_q4: i16,
    pub var_rtg_sf: i16,
    pub a_rtg: u16,
    pub a_rtg_sf: i16,
    pub pf_rtg_q1: i16,
    pub pf_rtg_q2: i16,
    pub pf_rtg_q3: i16,
    pub pf_rtg_q4: i16,
    pub pf_rtg_sf: i16,
    pub wh_rtg: u16,
    pub wh_rtg_sf: i16,
    pub ahr_rtg: u16,
    pub ahr_rtg_sf: i16,
    pub max_cha_rte: u16,
    pub max_cha_rte_sf: i16,
    pub max_dis_cha_rte: u16,
    pub max_dis_cha_rte_sf: i16,
}

pub const NAMEPLATE_MODEL: RegisterModel<NameplateModel> = RegisterModel {
    name: "nameplate",
    address_length: 27,
    fields: &[
        read_field!("ID", 0, 1, id, registers_to_u16),
        read_field!("L", 1, 2, l, registers_to_u16),
        read_field!("DERTyp", 2, 3, der_typ, registers_to_u16),
        read_field!("WRtg", 3, 4, w_rtg, registers_to_u16),
        read_field!("WRtg_SF", 4, 5, w_rtg_sf, registers_to_sunssf),
        read_field!("VARtg", 5, 6, va_rtg, registers_to_u16),
        read_field!("VARtg_SF", 6, 7, va_rtg_sf, registers_to_sunssf),
        read_field!("VArRtgQ1", 7, 8, var_rtg_q1, registers_to_i16),
        read_field!("VArRtgQ2", 8, 9, var_rtg_q2, registers_to_i16),
        read_field!("VArRtgQ3", 9, 10, var_rtg_q3, registers_to_i16),
        read_field!("VArRtgQ4", 10, 11, var_rtg_q4, registers_to_i16),
        read_field!("VArRtg_SF", 11, 12, var_rtg_sf, registers_to_sunssf),
        read_field!("ARtg", 12, 13, a_rtg, registers_to_u16),
        read_field!("ARtg_SF", 13, 14, a_rtg_sf, registers_to_sunssf),
        read_field!("PFRtgQ1", 14, 15, pf_rtg_q1, registers_to_i16),
        read_field!("PFRtgQ2", 15, 16, pf_rtg_q2, registers_to_i16),
        read_field!("PFRtgQ3", 16, 17, pf_rtg_q3, registers_to_i16),
        read_field!("PFRtgQ4", 17, 18, pf_rtg_q4, registers_to_i16),
        read_field!("PFRtg_SF", 18, 19, pf_rtg_sf, registers_to_sunssf),
        read_field!("WHRtg", 19, 20, wh_rtg, registers_to_u16),
        read_field!("WHRtg_SF", 20, 21, wh_rtg_sf, registers_to_sunssf),
        read_field!("AhrRtg", 21, 22, ahr_rtg, registers_to_u16),
        read_field!("AhrRtg_SF", 22, 23, ahr_rtg_sf, registers_to_sunssf),
        read_field!("MaxChaRte", 23, 24, max_cha_rte, registers_to_u16),
        read_field!("MaxChaRte_SF", 24, 25, max_cha_rte_sf, registers_to_sunssf),
        read_field!("MaxDisChaRte", 25, 26, max_dis_cha_rte, registers_to_u16),
        read_field!("MaxDisChaRte_SF", 26, 27, max_dis_cha_rte_sf, registers_to_sunssf),
    ],
};

impl NameplateModel {
    pub fn max_w(&self) -> Option<f64> {
        apply_scale(PointValue::U16(self.w_rtg), self.w_rtg_sf)
    }

    pub fn max_va(&self) -> Option<f64> {
        apply_scale(PointValue::U16(self.va_rtg), self.va_rtg_sf)
    }

    /// Reactive capability, taken from quadrant 1 (injecting VAr while generating).
    pub fn max_var(&self) -> Option<f64> {
        apply_scale(PointValue::I16(self.var_rtg_q1), self.var_rtg_sf).map(f64::abs)
    }
}
