use serde::Serialize;
use types::PointValue;

use crate::apply_scale;
use crate::converters::{
    registers_to_i16, registers_to_sunssf, registers_to_u16, registers_to_u32,
};
use crate::model::RegisterModel;
use crate::read_field;

/// AC meter (models 201 to 204 share this layout). Positive power is import at the meter.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MeterModel {
    pub id: u16,
    pub l: u16,
    pub a: i16,
    pub aph_a: i16,
    pub aph_b: i16,
    pub aph_c: i16,
    pub a_sf: i16,
    pub ph_v: i16,
    pub ph_v_ph_a: i16,
    pub ph_v_ph_b: i16,
    pub ph_v_ph_c: i16,
    pub ppv: i16,
    pub ppv_ph_ab: i16,
    pub ppv_ph_bc: i16,
    pub ppv_ph_ca: i16,
    pub v_sf: i16,
    pub hz: i16,
    pub hz_sf: i16,
    pub w: i16,
    pub w_ph_a: i16,
    pub w_ph_b: i16,
    pub w_ph_c: i16,
    pub w_sf: i16,
    pub va: i16,
    pub va_ph_a: i16,
    pub va_ph_b: i16,
    pub va_ph_c: i16,
    pub va_sf: i16,
    pub var: i16,
    pub var_ph_a: i16,
    pub var_ph_b: i16,
    pub var_ph_c: i16,
    pub var_sf: i16,
    pub pf: i16,
    pub pf_ph_a: i16,
    pub pf_ph_b: i16,
    pub pf_ph_c: i16,
    pub pf_sf: i16,
    pub tot_wh_exp: u32,
    pub tot_wh_exp_ph_a: u32,
    pub tot_wh_exp_ph_b: u32,
    pub tot_wh_exp_ph_c: u32,
    pub tot_wh_imp: u32,
    pub tot_wh_imp_ph_a: u32,
    pub tot_wh_imp_ph_b: u32,
    pub tot_wh_imp_ph_c: u32,
    pub tot_wh_sf: i16,
}

pub const METER_MODEL: RegisterModel<MeterModel> = RegisterModel {
    name: "meter",
    address_length: 55,
    fields: &[
        read_field!("ID", 0, 1, id, registers_to_u16),
        read_field!("L", 1, 2, l, registers_to_u16),
        read_field!("A", 2, 3, a, registers_to_i16),
        read_field!("AphA", 3, 4, aph_a, registers_to_i16),
        read_field!("AphB", 4, 5, aph_b, registers_to_i16),
        read_field!("AphC", 5, 6, aph_c, registers_to_i16),
        read_field!("A_SF", 6, 7, a_sf, registers_to_sunssf),
        read_field!("PhV", 7, 8, ph_v, registers_to_i16),
        read_field!("PhVphA", 8, 9, ph_v_ph_a, registers_to_i16),
        read_field!("PhVphB", 9, 10, ph_v_ph_b, registers_to_i16),
        read_field!("PhVphC", 10, 11, ph_v_ph_c, registers_to_i16),
        read_field!("PPV", 11, 12, ppv, registers_to_i16),
        read_field!("PPVphAB", 12, 13, ppv_ph_ab, registers_to_i16),
        read_field!("PPVphBC", 13, 14, ppv_ph_bc, registers_to_i16),
        read_field!("PPVphCA", 14, 15, ppv_ph_ca, registers_to_i16),
        read_field!("V_SF", 15, 16, v_sf, registers_to_sunssf),
        read_field!("Hz", 16, 17, hz, registers_to_i16),
        read_field!("Hz_SF", 17, 18, hz_sf, registers_to_sunssf),
        read_field!("W", 18, 19, w, registers_to_i16),
        read_field!("WphA", 19, 20, w_ph_a, registers_to_i16),
        read_field!("WphB", 20, 21, w_ph_b, registers_to_i16),
        read_field!("WphC", 21, 22, w_ph_c, registers_to_i16),
        read_field!("W_SF", 22, 23, w_sf, registers_to_sunssf),
        read_field!("VA", 23, 24, va, registers_to_i16),
        read_field!("VAphA", 24, 25, va_ph_a, registers_to_i16),
        read_field!("VAphB", 25, 26, va_ph_b, registers_to_i16),
        read_field!("VAphC", 26, 27, va_ph_c, registers_to_i16),
        read_field!("VA_SF", 27, 28, va_sf, registers_to_sunssf),
        read_field!("VAR", 28, 29, var, registers_to_i16),
        read_field!("VARphA", 29, 30, var_ph_a, registers_to_i16),
        read_field!("VARphB", 30, 31, var_ph_b, registers_to_i16),
        read_field!("VARphC", 31, 32, var_ph_c, registers_to_i16),
        read_field!("VAR_SF", 32, 33, var_sf, registers_to_sunssf),
        read_field!("PF", 33, 34, pf, registers_to_i16),
        read_field!("PFphA", 34, 35, pf_ph_a, registers_to_i16),
        read_field!("PFphB", 35, 36, pf_ph_b, registers_to_i16),
        read_field!("PFphC", 36, 37, pf_ph_c, registers_to_i16),
        read_field!("PF_SF", 37, 38, pf_sf, registers_to_sunssf),
        read_field!("TotWhExp", 38, 40, tot_wh_exp, registers_to_u32),
        read_field!("TotWhExpPhA", 40, 42, tot_wh_exp_ph_a, registers_to_u32),
        read_field!("TotWhExpPhB", 42, 44, tot_wh_exp_ph_b, registers_to_u32),
        read_field!("TotWhExpPhC", 44, 46, tot_wh_exp_ph_c, registers_to_u32),
        read_field!("TotWhImp", 46, 48, tot_wh_imp, registers_to_u32),
        read_field!("TotWhImpPhA", 48, 50, tot_wh_imp_ph_a, registers_to_u32),
        read_field!("TotWhImpPhB", 50, 52, tot_wh_imp_ph_b, registers_to_u32),
        read_field!("TotWhImpPhC", 52, 54, tot_wh_imp_ph_c, registers_to_u32),
        read_field!("TotWh_SF", 54, 55, tot_wh_sf, registers_to_sunssf),
    ],
};

fn scaled(raw: i16, sf: i16) -> Option<f64> {
    apply_scale(PointValue::I16(raw), sf)
}

impl MeterModel {
    pub fn watts(&self) -> Option<f64> {
        scaled(self.w, self.w_sf)
    }

    pub fn phase_watts(&self) -> [Option<f64>; 3] {
        [self.w_ph_a, self.w_ph_b, self.w_ph_c].map(|raw| scaled(raw, self.w_sf))
    }

    pub fn vars(&self) -> Option<f64> {
        scaled(self.var, self.var_sf)
    }

    pub fn phase_vars(&self) -> [Option<f64>; 3] {
        [self.var_ph_a, self.var_ph_b, self.var_ph_c].map(|raw| scaled(raw, self.var_sf))
    }

    pub fn phase_voltages(&self) -> [Option<f64>; 3] {
        [self.ph_v_ph_a, self.ph_v_ph_b, self.ph_v_ph_c].map(|raw| scaled(raw, self.v_sf))
    }

    pub fn frequency(&self) -> Option<f64> {
        scaled(self.hz, self.hz_sf)
    }
}
