pub mod poller;
pub mod report;

pub use poller::{PollerConfig, SettingsPoller};
pub use report::{CycleReport, CycleStatus, PostReport, PostResult};
