//! Sources of control limits. Each publishes its current [`ControlLimit`] on a watch channel
//! that the controller samples every cycle.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use types::{ControlLimit, LimiterKind};

use crate::ControlError;

/// Read side of one limiter.
#[derive(Debug, Clone)]
pub struct LimiterHandle {
    kind: LimiterKind,
    limit: watch::Receiver<ControlLimit>,
}

impl LimiterHandle {
    pub fn new(kind: LimiterKind, limit: watch::Receiver<ControlLimit>) -> Self {
        Self { kind, limit }
    }

    pub fn kind(&self) -> LimiterKind {
        self.kind
    }

    /// The last published limit. Still readable after the limiter has stopped.
    pub fn current(&self) -> ControlLimit {
        *self.limit.borrow()
    }
}

fn publish(sender: &watch::Sender<ControlLimit>, kind: LimiterKind, limit: ControlLimit) {
    let changed = sender.send_if_modified(|current| {
        if *current == limit {
            return false;
        }
        *current = limit;
        true
    });
    if changed {
        info!(limiter = %kind, ?limit, "limiter changed");
    }
}

/// A constant limit from configuration.
pub struct FixedLimiter;

impl FixedLimiter {
    pub fn handle(limit: ControlLimit) -> Result<LimiterHandle, ControlError> {
        limit.validate().map_err(ControlError::InvalidLimit)?;
        let (_, receiver) = watch::channel(limit);
        Ok(LimiterHandle::new(LimiterKind::Fixed, receiver))
    }
}

/// One export window, times as `HH:MM` in the tariff's offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TariffWindow {
    pub start: String,
    pub end: String,
    pub export_limit_watts: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TariffConfig {
    /// Offset of tariff local time from UTC.
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default)]
    pub windows: Vec<TariffWindow>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ParsedWindow {
    start: NaiveTime,
    end: NaiveTime,
    export_limit_watts: f64,
}

impl ParsedWindow {
    /// `start == end` covers the whole day; `end < start` wraps past midnight.
    fn contains(&self, time: NaiveTime) -> bool {
        if self.start < self.end {
            self.start <= time && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }
}

/// Caps export during the configured tariff windows.
#[derive(Debug, Clone)]
pub struct TwoWayTariffLimiter {
    offset: FixedOffset,
    windows: Vec<ParsedWindow>,
}

impl TwoWayTariffLimiter {
    pub fn new(config: &TariffConfig) -> Result<Self, ControlError> {
        let offset = FixedOffset::east_opt(config.utc_offset_minutes.saturating_mul(60))
            .ok_or(ControlError::UtcOffset(config.utc_offset_minutes))?;
        let windows = config
            .windows
            .iter()
            .map(parse_window)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { offset, windows })
    }

    /// The limit in force at `now`. Overlapping windows assert the smaller cap.
    pub fn limit_at(&self, now: DateTime<Utc>) -> ControlLimit {
        let local = now.with_timezone(&self.offset).time();
        let cap = self
            .windows
            .iter()
            .filter(|window| window.contains(local))
            .map(|window| window.export_limit_watts)
            .reduce(f64::min);
        ControlLimit {
            op_mod_exp_lim_w: cap,
            ..ControlLimit::default()
        }
    }

    /// Re-evaluates the windows every `interval` until cancelled.
    pub fn spawn(self, interval: Duration, cancel: CancellationToken) -> (LimiterHandle, JoinHandle<()>) {
        let (sender, receiver) = watch::channel(self.limit_at(Utc::now()));
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => publish(&sender, LimiterKind::TwoWayTariff, self.limit_at(Utc::now())),
                    _ = cancel.cancelled() => break,
                }
            }
            debug!("tariff limiter stopped");
        });
        (LimiterHandle::new(LimiterKind::TwoWayTariff, receiver), task)
    }
}

fn parse_window(window: &TariffWindow) -> Result<ParsedWindow, ControlError> {
    let parse = |value: &str| {
        NaiveTime::parse_from_str(value, "%H:%M").map_err(|err| ControlError::TariffWindow {
            window: format!("{}-{}", window.start, window.end),
            reason: format!("{value}: {err}"),
        })
    };
    if !window.export_limit_watts.is_finite() || window.export_limit_watts < 0.0 {
        return Err(ControlError::TariffWindow {
            window: format!("{}-{}", window.start, window.end),
            reason: "export limit must be a non-negative number".to_string(),
        });
    }
    Ok(ParsedWindow {
        start: parse(&window.start)?,
        end: parse(&window.end)?,
        export_limit_watts: window.export_limit_watts,
    })
}

/// Stops export while the feed-in price is negative.
#[derive(Clone)]
pub struct NegativeFeedInLimiter {
    sender: watch::Sender<ControlLimit>,
}

impl NegativeFeedInLimiter {
    pub fn channel() -> (NegativeFeedInLimiter, LimiterHandle) {
        let (sender, receiver) = watch::channel(ControlLimit::default());
        (
            NegativeFeedInLimiter { sender },
            LimiterHandle::new(LimiterKind::NegativeFeedIn, receiver),
        )
    }

    pub fn limit_for_price(price: f64) -> ControlLimit {
        if price < 0.0 {
            ControlLimit {
                op_mod_exp_lim_w: Some(0.0),
                ..ControlLimit::default()
            }
        } else {
            ControlLimit::default()
        }
    }

    /// Non-finite prices are ignored and leave the current limit in place.
    pub fn update_price(&self, price: f64) {
        if !price.is_finite() {
            warn!(price, "ignoring feed-in price");
            return;
        }
        publish(&self.sender, LimiterKind::NegativeFeedIn, Self::limit_for_price(price));
    }

    pub async fn run(self, mut prices: mpsc::Receiver<f64>, cancel: CancellationToken) {
        loop {
            let price = tokio::select! {
                price = prices.recv() => price,
                _ = cancel.cancelled() => break,
            };
            let Some(price) = price else {
                debug!("feed-in price feed closed");
                break;
            };
            self.update_price(price);
        }
    }
}

/// Limits pushed as JSON by an external controller, e.g. over an MQTT bridge.
#[derive(Clone)]
pub struct ExternalLimiter {
    sender: watch::Sender<ControlLimit>,
}

impl ExternalLimiter {
    pub fn channel() -> (ExternalLimiter, LimiterHandle) {
        let (sender, receiver) = watch::channel(ControlLimit::default());
        (
            ExternalLimiter { sender },
            LimiterHandle::new(LimiterKind::Mqtt, receiver),
        )
    }

    /// Replaces the limit wholesale. Malformed payloads leave the previous limit in place.
    pub fn push_json(&self, payload: &str) -> Result<(), ControlError> {
        let limit: ControlLimit = serde_json::from_str(payload)?;
        limit.validate().map_err(ControlError::InvalidLimit)?;
        publish(&self.sender, LimiterKind::Mqtt, limit);
        Ok(())
    }

    pub async fn run(self, mut payloads: mpsc::Receiver<String>, cancel: CancellationToken) {
        loop {
            let payload = tokio::select! {
                payload = payloads.recv() => payload,
                _ = cancel.cancelled() => break,
            };
            let Some(payload) = payload else {
                debug!("external limit feed closed");
                break;
            };
            if let Err(err) = self.push_json(&payload) {
                warn!(error = %err, "rejected external control limit");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, hour, minute, 0)
            .single()
            .expect("timestamp")
    }

    fn window(start: &str, end: &str, watts: f64) -> TariffWindow {
        TariffWindow {
            start: start.to_string(),
            end: end.to_string(),
            export_limit_watts: watts,
        }
    }

    #[test]
    fn tariff_applies_only_inside_windows() {
        let limiter = TwoWayTariffLimiter::new(&TariffConfig {
            utc_offset_minutes: 600,
            windows: vec![window("10:00", "15:00", 3_000.0)],
        })
        .expect("tariff");

        // 01:30 UTC is 11:30 at +10:00
        assert_eq!(limiter.limit_at(utc(1, 30)).op_mod_exp_lim_w, Some(3_000.0));
        assert_eq!(limiter.limit_at(utc(5, 0)).op_mod_exp_lim_w, None);
        assert_eq!(limiter.limit_at(utc(23, 59)).op_mod_exp_lim_w, None);
    }

    #[test]
    fn tariff_windows_wrap_midnight_and_overlap_to_the_minimum() {
        let limiter = TwoWayTariffLimiter::new(&TariffConfig {
            utc_offset_minutes: 0,
            windows: vec![window("22:00", "02:00", 2_000.0), window("01:00", "03:00", 500.0)],
        })
        .expect("tariff");

        assert_eq!(limiter.limit_at(utc(23, 0)).op_mod_exp_lim_w, Some(2_000.0));
        assert_eq!(limiter.limit_at(utc(1, 30)).op_mod_exp_lim_w, Some(500.0));
        assert_eq!(limiter.limit_at(utc(2, 30)).op_mod_exp_lim_w, Some(500.0));
        assert_eq!(limiter.limit_at(utc(12, 0)).op_mod_exp_lim_w, None);
    }

    #[test]
    fn malformed_tariff_windows_are_rejected() {
        let bad_time = TariffConfig {
            utc_offset_minutes: 0,
            windows: vec![window("25:00", "02:00", 1.0)],
        };
        assert!(matches!(
            TwoWayTariffLimiter::new(&bad_time),
            Err(ControlError::TariffWindow { .. })
        ));

        let negative = TariffConfig {
            utc_offset_minutes: 0,
            windows: vec![window("01:00", "02:00", -1.0)],
        };
        assert!(TwoWayTariffLimiter::new(&negative).is_err());
    }

    #[test]
    fn negative_price_stops_export() {
        let (limiter, handle) = NegativeFeedInLimiter::channel();
        assert!(handle.current().is_empty());

        limiter.update_price(-0.02);
        assert_eq!(handle.current().op_mod_exp_lim_w, Some(0.0));

        limiter.update_price(f64::NAN);
        assert_eq!(handle.current().op_mod_exp_lim_w, Some(0.0));

        limiter.update_price(0.0);
        assert!(handle.current().is_empty());
    }

    #[test]
    fn external_limits_are_validated() {
        let (limiter, handle) = ExternalLimiter::channel();
        limiter
            .push_json(r#"{"opModExpLimW": 1500, "opModConnect": true}"#)
            .expect("valid");
        assert_eq!(handle.current().op_mod_exp_lim_w, Some(1_500.0));
        assert_eq!(handle.kind(), LimiterKind::Mqtt);

        assert!(matches!(
            limiter.push_json(r#"{"opModGenLimW": -5}"#),
            Err(ControlError::InvalidLimit(_))
        ));
        assert!(matches!(limiter.push_json("not json"), Err(ControlError::Json(_))));
        assert_eq!(handle.current().op_mod_connect, Some(true));
    }

    #[test]
    fn fixed_limit_is_constant() {
        let handle = FixedLimiter::handle(ControlLimit {
            op_mod_exp_lim_w: Some(5_000.0),
            ..ControlLimit::default()
        })
        .expect("fixed");
        assert_eq!(handle.kind(), LimiterKind::Fixed);
        assert_eq!(handle.current().op_mod_exp_lim_w, Some(5_000.0));
    }
}
