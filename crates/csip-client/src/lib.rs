//! CSIP-AUS (IEEE 2030.5) client: polled utility resources, the resource graph rooted at
//! DeviceCapability, and the control schedule derived from it.

pub mod client;
pub mod clock;
pub mod models;
pub mod report;
pub mod reporter;
pub mod resource;
pub mod schedule;
pub mod session;

use std::time::Duration;

use thiserror::Error;

pub use client::{ResourceFetcher, Sep2Client};
pub use report::{ConnectStatus, DerRatings, DerStatusInput, MirrorRole, OperationalModeStatus};
pub use reporter::{DerTelemetry, ReportSummary, ReporterConfig, TelemetryReporter, TelemetrySource};
pub use resource::{FetchStrategy, PollSchedule, PollableResource, XmlFetch};
pub use schedule::{ActiveControl, ControlSchedule, ControlSource, ProgramSchedule};
pub use session::{Sep2Session, Sep2State, SessionConfig};

/// Server-advertised poll rates below this are raised to it.
pub const MIN_POLL_RATE: Duration = Duration::from_secs(5);

/// Largest tolerated difference between the utility server clock and ours.
pub const CLOCK_TOLERANCE_MS: i64 = 60_000;

/// Poll rates used until a resource advertises its own.
pub mod default_poll_rates {
    use std::time::Duration;

    pub const DEVICE_CAPABILITY: Duration = Duration::from_secs(300);
    pub const TIME: Duration = Duration::from_secs(300);
    pub const END_DEVICE_LIST: Duration = Duration::from_secs(300);
    pub const FUNCTION_SET_ASSIGNMENTS_LIST: Duration = Duration::from_secs(300);
    pub const DER_PROGRAM_LIST: Duration = Duration::from_secs(300);
    pub const DER_CONTROL_LIST: Duration = Duration::from_secs(60);
    pub const DEFAULT_DER_CONTROL: Duration = Duration::from_secs(300);
    pub const DER_LIST: Duration = Duration::from_secs(300);
}

#[derive(Debug, Error)]
pub enum Sep2Error {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid url {0}")]
    InvalidUrl(String),
    #[error("malformed {resource} document: {message}")]
    Parse {
        resource: &'static str,
        message: String,
    },
    #[error("cannot encode {resource}: {message}")]
    Encode {
        resource: &'static str,
        message: String,
    },
    #[error("Clock is not synced with Utility Server, delta {delta_ms}ms")]
    ClockSkew { delta_ms: i64 },
    #[error("session event channel closed")]
    ChannelClosed,
}
