use std::collections::{BTreeMap, VecDeque};

use nalgebra::Point2;
use tracing::debug;

use crate::config::TrackerConfig;
use crate::detection::Detection;

/// A persistent identity for one vehicle across frames.
///
/// The bounding box is exponentially smoothed; the trajectory records the raw
/// (unsmoothed) candidate centroids so counting reacts to actual motion, not
/// the smoothing lag.
#[derive(Debug, Clone)]
pub struct Track {
    id: u32,
    bbox: [f32; 4],
    label: Option<String>,
    confidence: f32,
    disappeared: u32,
    trajectory: VecDeque<Point2<f32>>,
    entry_centroid: Point2<f32>,
}

impl Track {
    fn new(id: u32, det: &Detection, max_trajectory_len: usize) -> Self {
        let centroid = det.center();
        let mut trajectory = VecDeque::with_capacity(max_trajectory_len);
        trajectory.push_back(centroid);
        Self {
            id,
            bbox: det.bbox,
            label: det.class_name.clone(),
            confidence: det.confidence,
            disappeared: 0,
            trajectory,
            entry_centroid: centroid,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Smoothed bounding box.
    pub fn bbox(&self) -> [f32; 4] {
        self.bbox
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Consecutive frames without a matching detection.
    pub fn disappeared(&self) -> u32 {
        self.disappeared
    }

    /// Most recent observed centroid.
    pub fn centroid(&self) -> Point2<f32> {
        // Invariant: the trajectory is never empty after registration.
        *self.trajectory.back().unwrap_or(&self.entry_centroid)
    }

    /// Bounded history of observed centroids, oldest first.
    pub fn trajectory(&self) -> &VecDeque<Point2<f32>> {
        &self.trajectory
    }

    /// Centroid at registration time, kept for zone traversal measurement.
    pub fn entry_centroid(&self) -> Point2<f32> {
        self.entry_centroid
    }

    fn observe(&mut self, det: &Detection, alpha: f32, max_trajectory_len: usize) {
        for i in 0..4 {
            self.bbox[i] = alpha * det.bbox[i] + (1.0 - alpha) * self.bbox[i];
        }
        self.confidence = det.confidence;
        if det.class_name.is_some() {
            self.label = det.class_name.clone();
        }
        self.disappeared = 0;
        if self.trajectory.len() == max_trajectory_len {
            self.trajectory.pop_front();
        }
        self.trajectory.push_back(det.center());
    }
}

/// Greedy centroid tracker.
///
/// Matching walks tracks in ascending id order and assigns each the nearest
/// unclaimed detection within `max_distance`. Greedy assignment can swap
/// identities when two vehicles cross paths closer than `max_distance`; the
/// counted-id set downstream keeps the total from inflating when that
/// happens.
#[derive(Debug)]
pub struct CentroidTracker {
    tracks: BTreeMap<u32, Track>,
    next_id: u32,
    cfg: TrackerConfig,
}

impl CentroidTracker {
    pub fn new(cfg: TrackerConfig) -> Self {
        Self {
            tracks: BTreeMap::new(),
            next_id: 0,
            cfg,
        }
    }

    /// Live tracks, keyed by id in ascending order.
    pub fn tracks(&self) -> &BTreeMap<u32, Track> {
        &self.tracks
    }

    /// Advance the tracker by one frame of filtered detections.
    ///
    /// Frames with no detections still age every live track; a track is
    /// removed once it has been unmatched for more than
    /// `max_disappeared` consecutive frames.
    pub fn update(&mut self, detections: &[Detection]) {
        if detections.is_empty() {
            let expired: Vec<u32> = self
                .tracks
                .values_mut()
                .filter_map(|track| {
                    track.disappeared += 1;
                    (track.disappeared > self.cfg.max_disappeared).then_some(track.id)
                })
                .collect();
            for id in expired {
                self.deregister(id);
            }
            return;
        }

        let centroids: Vec<Point2<f32>> = detections.iter().map(|d| d.center()).collect();
        let mut claimed = vec![false; detections.len()];
        let mut unmatched_tracks = Vec::new();

        // Ascending id order makes the greedy assignment deterministic.
        let ids: Vec<u32> = self.tracks.keys().copied().collect();
        for id in ids {
            let track = &self.tracks[&id];
            let pos = track.centroid();
            let nearest = centroids
                .iter()
                .enumerate()
                .filter(|&(j, _)| !claimed[j])
                .map(|(j, c)| (j, (c - pos).norm()))
                .min_by(|a, b| a.1.total_cmp(&b.1));
            match nearest {
                Some((j, dist)) if dist < self.cfg.max_distance => {
                    claimed[j] = true;
                    let track = self.tracks.get_mut(&id).expect("track present");
                    track.observe(
                        &detections[j],
                        self.cfg.smoothing_factor,
                        self.cfg.max_trajectory_len,
                    );
                }
                _ => unmatched_tracks.push(id),
            }
        }

        let mut expired = Vec::new();
        for id in unmatched_tracks {
            let track = self.tracks.get_mut(&id).expect("track present");
            track.disappeared += 1;
            if track.disappeared > self.cfg.max_disappeared {
                expired.push(id);
            }
        }
        for id in expired {
            self.deregister(id);
        }

        for (j, det) in detections.iter().enumerate() {
            if !claimed[j] {
                self.register(det);
            }
        }
    }

    fn register(&mut self, det: &Detection) {
        let id = self.next_id;
        // Ids are monotone and never reused, even after deregistration.
        self.next_id += 1;
        debug!(track_id = id, "register track");
        self.tracks
            .insert(id, Track::new(id, det, self.cfg.max_trajectory_len));
    }

    fn deregister(&mut self, id: u32) {
        debug!(track_id = id, "deregister track");
        self.tracks.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn det_at(cx: f32, cy: f32) -> Detection {
        let mut d = Detection::new([cx - 20.0, cy - 20.0, cx + 20.0, cy + 20.0], 0.9, 2);
        d.class_name = Some("vehicle".to_string());
        d
    }

    fn tracker() -> CentroidTracker {
        CentroidTracker::new(TrackerConfig::default())
    }

    #[test]
    fn test_register_assigns_monotone_ids() {
        let mut t = tracker();
        t.update(&[det_at(100.0, 100.0), det_at(500.0, 100.0)]);
        let ids: Vec<u32> = t.tracks().keys().copied().collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_ids_never_reused() {
        let mut t = tracker();
        t.update(&[det_at(100.0, 100.0)]);
        // Expire track 0.
        for _ in 0..=TrackerConfig::default().max_disappeared {
            t.update(&[]);
        }
        assert!(t.tracks().is_empty());
        t.update(&[det_at(100.0, 100.0)]);
        let ids: Vec<u32> = t.tracks().keys().copied().collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn test_track_survives_max_disappeared_misses() {
        let mut t = tracker();
        t.update(&[det_at(100.0, 100.0)]);
        for _ in 0..TrackerConfig::default().max_disappeared {
            t.update(&[]);
        }
        assert_eq!(t.tracks().len(), 1);
        assert_eq!(t.tracks()[&0].disappeared(), 30);
        // One more empty frame removes it.
        t.update(&[]);
        assert!(t.tracks().is_empty());
    }

    #[test]
    fn test_nearest_detection_matches() {
        let mut t = tracker();
        t.update(&[det_at(100.0, 100.0)]);
        t.update(&[det_at(400.0, 100.0), det_at(130.0, 100.0)]);
        // The near detection extends track 0, the far one becomes track 1.
        assert_eq!(t.tracks().len(), 2);
        assert_relative_eq!(t.tracks()[&0].centroid().x, 130.0);
        assert_relative_eq!(t.tracks()[&1].centroid().x, 400.0);
    }

    #[test]
    fn test_match_beyond_max_distance_registers_new_track() {
        let mut t = tracker();
        t.update(&[det_at(100.0, 100.0)]);
        t.update(&[det_at(300.0, 100.0)]);
        assert_eq!(t.tracks().len(), 2);
        assert_eq!(t.tracks()[&0].disappeared(), 1);
        assert_eq!(t.tracks()[&1].disappeared(), 0);
    }

    #[test]
    fn test_bbox_smoothing() {
        let mut t = tracker();
        t.update(&[det_at(100.0, 100.0)]);
        t.update(&[det_at(110.0, 100.0)]);
        // x1: 0.65 * 90 + 0.35 * 80 = 86.5
        assert_relative_eq!(t.tracks()[&0].bbox()[0], 86.5);
    }

    #[test]
    fn test_trajectory_records_raw_centroids_and_is_bounded() {
        let cfg = TrackerConfig::default();
        let mut t = CentroidTracker::new(cfg.clone());
        for i in 0..25 {
            t.update(&[det_at(100.0, 100.0 + i as f32 * 10.0)]);
        }
        let track = &t.tracks()[&0];
        assert_eq!(track.trajectory().len(), cfg.max_trajectory_len);
        // Latest point is the raw detection centroid, not the smoothed box
        // center.
        assert_relative_eq!(track.centroid().y, 340.0);
        // Oldest surviving point is from frame 5.
        assert_relative_eq!(track.trajectory().front().unwrap().y, 150.0);
    }

    #[test]
    fn test_match_resets_disappearance() {
        let mut t = tracker();
        t.update(&[det_at(100.0, 100.0)]);
        t.update(&[]);
        t.update(&[]);
        assert_eq!(t.tracks()[&0].disappeared(), 2);
        t.update(&[det_at(105.0, 100.0)]);
        assert_eq!(t.tracks()[&0].disappeared(), 0);
    }

    #[test]
    fn test_entry_centroid_is_stable() {
        let mut t = tracker();
        t.update(&[det_at(100.0, 100.0)]);
        t.update(&[det_at(100.0, 160.0)]);
        let track = &t.tracks()[&0];
        assert_relative_eq!(track.entry_centroid().y, 100.0);
        assert_relative_eq!(track.centroid().y, 160.0);
    }
}
