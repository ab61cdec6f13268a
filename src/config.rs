use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::counter::StrategyKind;

/// Top-level configuration, loaded from a JSON file.
///
/// Every field has a default, so a partial (or empty) config file is valid.
/// All values are passed explicitly into component constructors; there is no
/// process-global configuration state.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub detector: DetectorConfig,
    pub tracker: TrackerConfig,
    pub counter: CounterConfig,
    pub stability: StabilityConfig,
    /// Zone polygon in image pixels. Fewer than 3 points disables zone
    /// filtering (with a warning, not an error).
    pub zone_points: Vec<[i64; 2]>,
}

impl Config {
    /// Load from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let cfg: Config = serde_json::from_str(&data)?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Minimum max-class score for an anchor to survive decoding.
    pub conf_threshold: f32,
    /// IoU threshold for greedy NMS.
    pub nms_threshold: f32,
    /// Number of class scores per anchor row.
    pub num_classes: usize,
    /// Raw class ids collapsed into the "vehicle" label.
    /// COCO: car(2), motorcycle(3), bus(5), truck(7); 4 covers auto-rickshaw
    /// in models trained with it.
    pub vehicle_classes: Vec<i64>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            conf_threshold: 0.25,
            nms_threshold: 0.45,
            num_classes: 80,
            vehicle_classes: vec![2, 3, 4, 5, 7],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Consecutive unmatched frames a track survives before removal.
    pub max_disappeared: u32,
    /// Maximum centroid distance (pixels) for a valid match.
    pub max_distance: f32,
    /// Exponential smoothing factor applied to matched bounding boxes.
    pub smoothing_factor: f32,
    /// Bounded trajectory length; the oldest point is evicted on overflow.
    pub max_trajectory_len: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_disappeared: 30,
            max_distance: 100.0,
            smoothing_factor: 0.65,
            max_trajectory_len: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CounterConfig {
    pub strategy: StrategyKind,
    /// Horizontal counting line for the line-crossing strategy, typically
    /// set to two thirds of the frame height.
    pub line_y: f32,
    /// Minimum forward (downward) progress for the zone-traversal strategy.
    pub min_movement: f32,
    /// Trajectory points required before zone traversal is evaluated.
    pub min_trajectory_len: usize,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::LineCrossing,
            line_y: 400.0,
            min_movement: 50.0,
            min_trajectory_len: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    /// Rolling window capacity.
    pub window_len: usize,
    /// Samples required before the gate can ever report stable.
    pub min_fill: usize,
    /// Required fraction of detected frames in the window.
    pub stability_ratio: f32,
    /// Floor on the mean confidence of detected samples.
    pub min_confidence: f32,
    /// Ceiling on the variance of detected-sample confidences.
    pub max_confidence_variance: f32,
    /// Ceiling on var(x) + var(y) of detected-sample centroids.
    pub max_position_variance: f32,
    /// Base acceptance threshold; relaxed while stable, tightened while
    /// unstable (hysteresis).
    pub accept_threshold: f32,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            window_len: 20,
            min_fill: 3,
            stability_ratio: 0.6,
            min_confidence: 0.04,
            max_confidence_variance: 0.0625,
            max_position_variance: 50_000.0,
            accept_threshold: 0.08,
        }
    }
}
