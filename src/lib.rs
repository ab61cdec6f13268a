//! Vehicle counting from per-frame object detections.
//!
//! The pipeline turns raw detector output (or pre-decoded detections) into
//! persistent tracks and counts each vehicle exactly once, by line crossing
//! or zone traversal. A rolling-window stability gate provides a secondary
//! stable/unstable signal for an object of interest.

pub mod config;
pub mod counter;
pub mod detection;
pub mod error;
pub mod filter;
pub mod pipeline;
pub mod stability;
pub mod tracker;
pub mod utils;

// Re-export main types
pub use config::Config;
pub use counter::{CountEvent, StrategyKind, VehicleCounter};
pub use detection::{decode, Detection, Letterbox};
pub use error::{Error, Result};
pub use filter::ClassZoneFilter;
pub use pipeline::{FrameSummary, Pipeline};
pub use stability::{FeatureScorer, NoopScorer, StabilityGate, StabilityStatus};
pub use tracker::{CentroidTracker, Track};
