//! Merges the limits asserted by every source into one fleet configuration and pushes it to
//! the inverters.

pub mod controller;
pub mod fusion;
pub mod limiters;

use sunspec_codec::CodecError;
use thiserror::Error;
use types::DeviceIdentity;

pub use controller::{
    clamp_to_nameplate, derive_configuration, ControllerConfig, ControllerStatus, CycleOutcome,
    InverterController, SkipReason,
};
pub use fusion::fuse;
pub use limiters::{
    ExternalLimiter, FixedLimiter, LimiterHandle, NegativeFeedInLimiter, TariffConfig,
    TariffWindow, TwoWayTariffLimiter,
};

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("invalid control limit: {0}")]
    InvalidLimit(String),
    #[error("invalid control limit json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid tariff window {window}: {reason}")]
    TariffWindow { window: String, reason: String },
    #[error("invalid utc offset of {0} minutes")]
    UtcOffset(i32),
    #[error("write to {device} failed: {source}")]
    Write {
        device: DeviceIdentity,
        #[source]
        source: CodecError,
    },
    #[error("no controls scale factor read from {0} yet")]
    MissingScaleFactor(DeviceIdentity),
}
