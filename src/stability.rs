use std::collections::VecDeque;

use nalgebra::Point2;
use serde::Serialize;
use tracing::debug;

use crate::config::StabilityConfig;

/// Hard ceiling on the tightened acceptance threshold, so a long unstable
/// stretch can still recover.
const MAX_STRICT_THRESHOLD: f32 = 0.25;

/// Pluggable scorer for auxiliary visual evidence (e.g. flashing emergency
/// lights) in a candidate's image region. Scores are in `[0, 1]` and are
/// added to the detector confidence before gating.
pub trait FeatureScorer: Send {
    fn score(&self, region: &[u8], width: u32, height: u32) -> f32;
}

/// Scorer that contributes nothing; gating then depends on detector
/// confidence alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopScorer;

impl FeatureScorer for NoopScorer {
    fn score(&self, _region: &[u8], _width: u32, _height: u32) -> f32 {
        0.0
    }
}

/// One frame's observation of the gated object.
#[derive(Debug, Clone, Copy)]
struct Sample {
    detected: bool,
    confidence: f32,
    centroid: Point2<f32>,
}

/// Verdict for the current window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StabilityStatus {
    pub stable: bool,
    /// Mean confidence over detected samples in the window; 0 when the
    /// window holds no detections.
    pub confidence: f32,
}

/// Rolling-window stability gate for a single object of interest.
///
/// Each frame's candidate is first gated against a hysteresis acceptance
/// threshold: relaxed while the window is judged stable, tightened while it
/// is not, so the verdict does not flap on borderline confidences. Rejected
/// or missing candidates are recorded as non-detections. The verdict then
/// requires a minimum detection rate, confidence floor, and bounded
/// confidence and positional variance across the window.
pub struct StabilityGate {
    cfg: StabilityConfig,
    window: VecDeque<Sample>,
    stable: bool,
    scorer: Box<dyn FeatureScorer>,
}

impl std::fmt::Debug for StabilityGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StabilityGate")
            .field("window", &self.window.len())
            .field("stable", &self.stable)
            .finish()
    }
}

impl StabilityGate {
    pub fn new(cfg: StabilityConfig) -> Self {
        Self::with_scorer(cfg, Box::new(NoopScorer))
    }

    pub fn with_scorer(cfg: StabilityConfig, scorer: Box<dyn FeatureScorer>) -> Self {
        Self {
            cfg,
            window: VecDeque::new(),
            stable: false,
            scorer,
        }
    }

    /// Acceptance threshold for the next candidate, after hysteresis.
    pub fn accept_threshold(&self) -> f32 {
        if self.stable {
            self.cfg.accept_threshold * 0.8
        } else {
            (self.cfg.accept_threshold * 1.5).min(MAX_STRICT_THRESHOLD)
        }
    }

    /// Record one frame's candidate (confidence and centroid), or `None`
    /// when the object was not detected this frame.
    pub fn observe(&mut self, candidate: Option<(f32, Point2<f32>)>) -> StabilityStatus {
        let sample = match candidate {
            Some((confidence, centroid)) if confidence >= self.accept_threshold() => Sample {
                detected: true,
                confidence,
                centroid,
            },
            _ => Sample {
                detected: false,
                confidence: 0.0,
                centroid: Point2::origin(),
            },
        };
        if self.window.len() == self.cfg.window_len {
            self.window.pop_front();
        }
        self.window.push_back(sample);

        let status = self.evaluate();
        self.stable = status.stable;
        debug!(
            stable = status.stable,
            confidence = status.confidence,
            window = self.window.len(),
            "stability gate"
        );
        status
    }

    /// Like [`observe`](Self::observe), with the candidate's image region
    /// scored for auxiliary evidence and the score added to the confidence.
    pub fn observe_with_region(
        &mut self,
        confidence: f32,
        centroid: Point2<f32>,
        region: &[u8],
        width: u32,
        height: u32,
    ) -> StabilityStatus {
        let boosted = (confidence + self.scorer.score(region, width, height)).min(1.0);
        self.observe(Some((boosted, centroid)))
    }

    fn evaluate(&self) -> StabilityStatus {
        let detected: Vec<&Sample> = self.window.iter().filter(|s| s.detected).collect();
        let confidence = if detected.is_empty() {
            0.0
        } else {
            detected.iter().map(|s| s.confidence).sum::<f32>() / detected.len() as f32
        };

        if self.window.len() < self.cfg.min_fill || detected.is_empty() {
            return StabilityStatus {
                stable: false,
                confidence,
            };
        }

        let rate = detected.len() as f32 / self.window.len() as f32;
        let n = detected.len() as f32;
        let conf_var = detected
            .iter()
            .map(|s| (s.confidence - confidence).powi(2))
            .sum::<f32>()
            / n;

        let mean_x = detected.iter().map(|s| s.centroid.x).sum::<f32>() / n;
        let mean_y = detected.iter().map(|s| s.centroid.y).sum::<f32>() / n;
        let pos_var = detected
            .iter()
            .map(|s| (s.centroid.x - mean_x).powi(2) + (s.centroid.y - mean_y).powi(2))
            .sum::<f32>()
            / n;

        let stable = rate >= self.cfg.stability_ratio
            && confidence >= self.cfg.min_confidence
            && conf_var <= self.cfg.max_confidence_variance
            && pos_var <= self.cfg.max_position_variance;
        StabilityStatus { stable, confidence }
    }
}
