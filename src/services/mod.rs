pub mod tracker;

pub use tracker::{CountTracker, RelogSummary, TickSummary, TrackerError};
