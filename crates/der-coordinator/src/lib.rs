pub mod config;
pub mod coordinator;
pub mod telemetry;

pub use config::{CoordinatorConfig, Sep2Config, SiteSource};
pub use coordinator::{Coordinator, CoordinatorInputs, CoordinatorStatus};
