use nalgebra::Point2;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{Config, DetectorConfig};
use crate::detection::Detection;
use crate::utils;

/// Class id that is always dropped, even if someone lists it in the
/// allow-list. Pedestrians near the roadway must never be counted.
pub const NON_TARGET_CLASS: i64 = 0;

/// Counters for detections removed by the filter, reported per frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    pub dropped_non_target: u64,
    pub dropped_unknown: u64,
    pub dropped_zone: u64,
}

/// Reduces raw-class detections to labeled vehicle candidates.
///
/// Ids in the allow-list are collapsed to the single `"vehicle"` label;
/// class 0 and any id outside the list are dropped. When a zone polygon is
/// configured, candidates whose bbox center falls outside it are dropped as
/// well (points on the boundary count as inside).
#[derive(Debug, Clone)]
pub struct ClassZoneFilter {
    vehicle_classes: Vec<i64>,
    zone: Option<Vec<Point2<f32>>>,
}

impl ClassZoneFilter {
    pub fn new(detector: &DetectorConfig, zone_points: &[[i64; 2]]) -> Self {
        let zone = if zone_points.is_empty() {
            None
        } else if zone_points.len() < 3 {
            warn!(
                points = zone_points.len(),
                "zone polygon needs at least 3 points, zone filtering disabled"
            );
            None
        } else {
            Some(
                zone_points
                    .iter()
                    .map(|p| Point2::new(p[0] as f32, p[1] as f32))
                    .collect(),
            )
        };
        Self {
            vehicle_classes: detector.vehicle_classes.clone(),
            zone,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(&cfg.detector, &cfg.zone_points)
    }

    /// Whether zone filtering is active.
    pub fn has_zone(&self) -> bool {
        self.zone.is_some()
    }

    /// Filter one frame of candidates, labeling survivors.
    pub fn apply(&self, detections: Vec<Detection>, stats: &mut FilterStats) -> Vec<Detection> {
        let kept: Vec<Detection> = detections
            .into_iter()
            .filter_map(|mut det| {
                if det.class_id == NON_TARGET_CLASS {
                    stats.dropped_non_target += 1;
                    return None;
                }
                if !self.vehicle_classes.contains(&det.class_id) {
                    stats.dropped_unknown += 1;
                    return None;
                }
                if let Some(zone) = &self.zone {
                    if !utils::point_in_polygon(det.center(), zone) {
                        stats.dropped_zone += 1;
                        return None;
                    }
                }
                det.class_name = Some("vehicle".to_string());
                Some(det)
            })
            .collect();
        debug!(kept = kept.len(), ?stats, "class/zone filter");
        kept
    }
}
