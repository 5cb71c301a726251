use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::Rng;
use serde::Serialize;
use tracing::warn;
use types::ControlLimit;

use crate::models::DerControl;

/// One DER control event placed on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlSchedule {
    pub mrid: String,
    pub program_href: String,
    pub primacy: u8,
    pub creation_time: DateTime<Utc>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub randomize_start: Option<i32>,
    pub randomize_duration: Option<i32>,
    pub effective_start: DateTime<Utc>,
    pub effective_end: DateTime<Utc>,
    pub control: ControlLimit,
}

impl ControlSchedule {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.effective_start <= now && now < self.effective_end
    }
}

/// Events and the fallback control of one DER program.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramSchedule {
    pub href: String,
    pub primacy: u8,
    pub controls: Vec<ControlSchedule>,
    pub default_control: Option<ControlLimit>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControlSource {
    Event { mrid: String },
    Default { program_href: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveControl {
    pub source: ControlSource,
    pub primacy: u8,
    pub limit: ControlLimit,
}

/// Picks the control in force at `now`.
///
/// An active event wins over any default. Among active events the lowest primacy wins, then the
/// most recently created. Without an active event the default control of the lowest-primacy
/// program that has one applies.
pub fn active_control(programs: &[ProgramSchedule], now: DateTime<Utc>) -> Option<ActiveControl> {
    let event = programs
        .iter()
        .flat_map(|program| program.controls.iter())
        .filter(|control| control.is_active(now))
        .min_by(|a, b| {
            a.primacy
                .cmp(&b.primacy)
                .then_with(|| b.creation_time.cmp(&a.creation_time))
        });

    if let Some(event) = event {
        return Some(ActiveControl {
            source: ControlSource::Event {
                mrid: event.mrid.clone(),
            },
            primacy: event.primacy,
            limit: event.control,
        });
    }

    programs
        .iter()
        .filter_map(|program| {
            program
                .default_control
                .map(|limit| (program.primacy, &program.href, limit))
        })
        .min_by_key(|(primacy, _, _)| *primacy)
        .map(|(primacy, href, limit)| ActiveControl {
            source: ControlSource::Default {
                program_href: href.clone(),
            },
            primacy,
            limit,
        })
}

/// Places events on the timeline. Randomization offsets are drawn once per event and reused
/// on every refetch so a re-polled event does not move.
#[derive(Debug, Default)]
pub struct Scheduler {
    offsets: HashMap<String, (i64, i64)>,
}

impl Scheduler {
    /// `None` for cancelled or superseded events and for timestamps out of range.
    pub fn schedule(
        &mut self,
        program_href: &str,
        primacy: u8,
        control: &DerControl,
    ) -> Option<ControlSchedule> {
        if control
            .event_status
            .is_some_and(|status| !status.is_live())
        {
            return None;
        }

        let start = Utc.timestamp_opt(control.interval.start, 0).single()?;
        let creation_time = Utc.timestamp_opt(control.creation_time, 0).single()?;
        let Some(end) =
            start.checked_add_signed(Duration::seconds(i64::from(control.interval.duration)))
        else {
            warn!(mrid = %control.mrid, "control interval out of range, skipping event");
            return None;
        };

        let (start_offset, duration_offset) = *self
            .offsets
            .entry(control.mrid.clone())
            .or_insert_with(|| {
                (
                    random_offset(control.randomize_start),
                    random_offset(control.randomize_duration),
                )
            });
        let effective = start
            .checked_add_signed(Duration::seconds(start_offset))
            .zip(end.checked_add_signed(Duration::seconds(start_offset + duration_offset)));
        let Some((effective_start, effective_end)) = effective else {
            warn!(mrid = %control.mrid, "randomized interval out of range, skipping event");
            return None;
        };

        Some(ControlSchedule {
            mrid: control.mrid.clone(),
            program_href: program_href.to_string(),
            primacy,
            creation_time,
            start,
            end,
            randomize_start: control.randomize_start,
            randomize_duration: control.randomize_duration,
            effective_start,
            effective_end,
            control: control.der_control_base.to_limit(),
        })
    }

    /// Forgets offsets of events no longer listed by the server.
    pub fn retain(&mut self, mrids: &HashSet<String>) {
        self.offsets.retain(|mrid, _| mrids.contains(mrid));
    }
}

fn random_offset(bound: Option<i32>) -> i64 {
    match bound {
        Some(bound) if bound > 0 => rand::thread_rng().gen_range(0..=i64::from(bound)),
        Some(bound) if bound < 0 => rand::thread_rng().gen_range(i64::from(bound)..=0),
        _ => 0,
    }
}
