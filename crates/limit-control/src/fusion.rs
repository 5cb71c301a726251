use types::{ActiveInverterControlLimit, Attributed, ControlLimit, LimiterKind};

/// Merges the limits of every source, given in priority order.
///
/// A present `false` wins for the boolean modes, watt caps take the smallest value and the
/// ramp time the longest. On a tie the earlier source keeps the attribution.
pub fn fuse(limits: &[(LimiterKind, ControlLimit)]) -> ActiveInverterControlLimit {
    let mut fused = ActiveInverterControlLimit::default();

    for (source, limit) in limits {
        let source = *source;
        merge_bool(&mut fused.op_mod_connect, limit.op_mod_connect, source);
        merge_bool(&mut fused.op_mod_energize, limit.op_mod_energize, source);
        merge_min(&mut fused.op_mod_exp_lim_w, limit.op_mod_exp_lim_w, source);
        merge_min(&mut fused.op_mod_gen_lim_w, limit.op_mod_gen_lim_w, source);
        merge_min(&mut fused.op_mod_imp_lim_w, limit.op_mod_imp_lim_w, source);
        merge_min(&mut fused.op_mod_load_lim_w, limit.op_mod_load_lim_w, source);
        merge_max(&mut fused.ramp_tms, limit.ramp_tms, source);
    }

    fused
}

fn merge_bool(current: &mut Option<Attributed<bool>>, value: Option<bool>, source: LimiterKind) {
    let Some(value) = value else { return };
    match current {
        None => *current = Some(Attributed { value, source }),
        Some(existing) if existing.value && !value => *existing = Attributed { value, source },
        Some(_) => {}
    }
}

fn merge_min(current: &mut Option<Attributed<f64>>, value: Option<f64>, source: LimiterKind) {
    let Some(value) = value else { return };
    match current {
        Some(existing) if existing.value <= value => {}
        _ => *current = Some(Attributed { value, source }),
    }
}

fn merge_max(current: &mut Option<Attributed<u32>>, value: Option<u32>, source: LimiterKind) {
    let Some(value) = value else { return };
    match current {
        Some(existing) if existing.value >= value => {}
        _ => *current = Some(Attributed { value, source }),
    }
}
