use chrono::{DateTime, Utc};
use tracing::info;

use crate::{Sep2Error, CLOCK_TOLERANCE_MS};

/// Compares the server's `currentTime` with the local clock. Returns the delta (local minus
/// server) in milliseconds, or `ClockSkew` when it exceeds the tolerance.
pub fn check_clock(server: DateTime<Utc>, local: DateTime<Utc>) -> Result<i64, Sep2Error> {
    let delta_ms = (local - server).num_milliseconds();
    if delta_ms.abs() > CLOCK_TOLERANCE_MS {
        return Err(Sep2Error::ClockSkew { delta_ms });
    }
    info!(delta_ms, "clock is synced with utility server");
    Ok(delta_ms)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn skew_beyond_tolerance_is_fatal() {
        let local = Utc::now();
        let server = local - Duration::milliseconds(90_000);

        let err = check_clock(server, local).expect_err("skewed");
        assert!(matches!(err, Sep2Error::ClockSkew { delta_ms: 90_000 }));
        assert_eq!(
            err.to_string(),
            "Clock is not synced with Utility Server, delta 90000ms"
        );
    }

    #[test]
    fn skew_within_tolerance_passes() {
        let local = Utc::now();
        assert_eq!(check_clock(local + Duration::seconds(60), local).expect("synced"), -60_000);
        assert_eq!(check_clock(local, local).expect("synced"), 0);
    }
}
