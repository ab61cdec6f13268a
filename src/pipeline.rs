use std::collections::BTreeMap;

use nalgebra::Point2;
use serde::Serialize;
use tracing::debug;

use crate::config::{Config, DetectorConfig};
use crate::counter::{CountEvent, VehicleCounter};
use crate::detection::{self, Detection, Letterbox};
use crate::error::{Error, Result};
use crate::filter::{ClassZoneFilter, FilterStats};
use crate::stability::{StabilityGate, StabilityStatus};
use crate::tracker::CentroidTracker;

/// Owned snapshot of one track for a frame summary.
#[derive(Debug, Clone, Serialize)]
pub struct TrackSnapshot {
    pub bbox: [f32; 4],
    pub centroid: [f32; 2],
    pub label: Option<String>,
    pub confidence: f32,
}

/// Per-frame drop accounting.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FrameDiagnostics {
    /// Candidates entering the filter stage.
    pub candidates: usize,
    /// Boxes discarded by the inverse letterbox for non-positive area.
    pub degenerate_discarded: usize,
    pub filter: FilterStats,
}

/// Everything the pipeline reports for one frame. The snapshot is owned;
/// callers never observe live tracker state.
#[derive(Debug, Clone, Serialize)]
pub struct FrameSummary {
    pub frame_index: u64,
    pub tracks: BTreeMap<u32, TrackSnapshot>,
    pub events: Vec<CountEvent>,
    pub total_count: u64,
    pub stability: StabilityStatus,
    pub diagnostics: FrameDiagnostics,
}

/// The full counting pipeline: decode, remap, filter, track, count, plus the
/// stability gate fed with the strongest surviving candidate each frame.
#[derive(Debug)]
pub struct Pipeline {
    detector: DetectorConfig,
    filter: ClassZoneFilter,
    tracker: CentroidTracker,
    counter: VehicleCounter,
    stability: StabilityGate,
    frame_index: u64,
}

impl Pipeline {
    pub fn new(cfg: &Config) -> Result<Self> {
        let alpha = cfg.tracker.smoothing_factor;
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(Error::Config(format!(
                "smoothing_factor must be in (0, 1], got {alpha}"
            )));
        }
        if cfg.tracker.max_trajectory_len < 2 {
            return Err(Error::Config(
                "max_trajectory_len must be at least 2 for crossing detection".into(),
            ));
        }
        if cfg.stability.window_len < cfg.stability.min_fill {
            return Err(Error::Config(
                "stability window_len must be at least min_fill".into(),
            ));
        }
        Ok(Self {
            detector: cfg.detector.clone(),
            filter: ClassZoneFilter::from_config(cfg),
            tracker: CentroidTracker::new(cfg.tracker.clone()),
            counter: VehicleCounter::new(cfg.counter.clone()),
            stability: StabilityGate::new(cfg.stability.clone()),
            frame_index: 0,
        })
    }

    /// Process a raw detector output tensor for one frame.
    ///
    /// `letterbox` describes the preprocessing transform; `width`/`height`
    /// are the original image dimensions the boxes are mapped back into.
    pub fn process_raw(
        &mut self,
        raw: &[f32],
        letterbox: Letterbox,
        width: f32,
        height: f32,
    ) -> Result<FrameSummary> {
        let decoded = detection::decode(
            raw,
            self.detector.num_classes,
            self.detector.conf_threshold,
            self.detector.nms_threshold,
        )?;
        let before = decoded.len();
        let remapped = letterbox.remap(decoded, width, height);
        let degenerate = before - remapped.len();
        let mut summary = self.process_detections(remapped);
        summary.diagnostics.degenerate_discarded = degenerate;
        Ok(summary)
    }

    /// Process pre-decoded detections (already in original-image pixels) for
    /// one frame. Empty frames are valid and still age live tracks.
    pub fn process_detections(&mut self, detections: Vec<Detection>) -> FrameSummary {
        let mut diagnostics = FrameDiagnostics {
            candidates: detections.len(),
            ..FrameDiagnostics::default()
        };
        let filtered = self.filter.apply(detections, &mut diagnostics.filter);

        self.tracker.update(&filtered);
        let events = self.counter.evaluate(self.tracker.tracks());

        let best = filtered
            .iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
            .map(|d| (d.confidence, d.center()));
        let stability = self.stability.observe(best);

        let tracks = self
            .tracker
            .tracks()
            .iter()
            .map(|(&id, track)| {
                let c = track.centroid();
                (
                    id,
                    TrackSnapshot {
                        bbox: track.bbox(),
                        centroid: [c.x, c.y],
                        label: track.label().map(str::to_owned),
                        confidence: track.confidence(),
                    },
                )
            })
            .collect();

        let summary = FrameSummary {
            frame_index: self.frame_index,
            tracks,
            events,
            total_count: self.counter.total(),
            stability,
            diagnostics,
        };
        debug!(
            frame = summary.frame_index,
            tracks = summary.tracks.len(),
            total = summary.total_count,
            "frame processed"
        );
        self.frame_index += 1;
        summary
    }

    /// Running count, identical to the last summary's `total_count`.
    pub fn total_count(&self) -> u64 {
        self.counter.total()
    }

    /// Centroid history of a live track, oldest first.
    pub fn trajectory(&self, track_id: u32) -> Option<Vec<Point2<f32>>> {
        self.tracker
            .tracks()
            .get(&track_id)
            .map(|t| t.trajectory().iter().copied().collect())
    }
}
