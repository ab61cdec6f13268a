use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::utils;

/// A single detection candidate, in original-image pixel coordinates.
///
/// This is the shape accepted on the pre-decoded entry point: a JSON object
/// with `bbox` as `[x1, y1, x2, y2]`, a confidence score and a raw class id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: [f32; 4],
    pub confidence: f32,
    pub class_id: i64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub class_name: Option<String>,
}

impl Detection {
    pub fn new(bbox: [f32; 4], confidence: f32, class_id: i64) -> Self {
        Self {
            bbox,
            confidence,
            class_id,
            class_name: None,
        }
    }

    /// Center of the bounding box, used as the tracking position.
    pub fn center(&self) -> Point2<f32> {
        utils::centroid(&self.bbox)
    }
}

/// Decode a raw per-anchor prediction tensor into suppressed detections.
///
/// `raw` is a row-major slice of shape `(anchors, 4 + num_classes)` where
/// each row is `[cx, cy, w, h, class_0_score, class_1_score, ...]` in
/// model-input pixel space. Rows below `conf_threshold` (taking the max
/// class score) are dropped, boxes are converted to corner form, and greedy
/// NMS is applied with `nms_threshold`.
///
/// A slice whose length is not a multiple of the row stride is a hard
/// decode failure, not something that can be recovered locally.
pub fn decode(
    raw: &[f32],
    num_classes: usize,
    conf_threshold: f32,
    nms_threshold: f32,
) -> Result<Vec<Detection>> {
    if num_classes == 0 {
        return Err(Error::Decode("num_classes must be at least 1".into()));
    }
    let stride = 4 + num_classes;
    if raw.len() % stride != 0 {
        return Err(Error::Decode(format!(
            "tensor length {} is not a multiple of row stride {}",
            raw.len(),
            stride
        )));
    }

    let mut candidates = Vec::new();
    for row in raw.chunks_exact(stride) {
        let scores = &row[4..];
        let (class_id, score) = scores
            .iter()
            .copied()
            .enumerate()
            .fold((0usize, f32::MIN), |best, (i, s)| {
                if s > best.1 {
                    (i, s)
                } else {
                    best
                }
            });
        if score < conf_threshold {
            continue;
        }

        let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
        let bbox = [
            cx - w / 2.0,
            cy - h / 2.0,
            cx + w / 2.0,
            cy + h / 2.0,
        ];
        candidates.push(Detection::new(bbox, score, class_id as i64));
    }

    if candidates.len() > 1 {
        let boxes: Vec<[f32; 4]> = candidates.iter().map(|d| d.bbox).collect();
        let scores: Vec<f32> = candidates.iter().map(|d| d.confidence).collect();
        let keep = utils::nms(&boxes, &scores, nms_threshold);
        candidates = keep.into_iter().map(|i| candidates[i].clone()).collect();
    }

    Ok(candidates)
}

/// Inverse letterbox transform used during preprocessing.
///
/// The preprocessing stage scales the source image by `ratio` (preserving
/// aspect) and pads it to the model input size with offset `(dx, dy)`; this
/// maps model-space boxes back into source-image pixels.
#[derive(Debug, Clone, Copy)]
pub struct Letterbox {
    pub ratio: f32,
    pub dx: f32,
    pub dy: f32,
}

impl Letterbox {
    pub fn new(ratio: f32, dx: f32, dy: f32) -> Self {
        Self { ratio, dx, dy }
    }

    /// Map detections from model-input space back into original-image space,
    /// clipping to `[0, width] x [0, height]`.
    ///
    /// Boxes left with non-positive area after clipping (collapsed against an
    /// image edge) are discarded; the caller reads the discard count from the
    /// difference in lengths.
    pub fn remap(&self, detections: Vec<Detection>, width: f32, height: f32) -> Vec<Detection> {
        detections
            .into_iter()
            .filter_map(|mut det| {
                let [x1, y1, x2, y2] = det.bbox;
                let x1 = ((x1 - self.dx) / self.ratio).clamp(0.0, width);
                let y1 = ((y1 - self.dy) / self.ratio).clamp(0.0, height);
                let x2 = ((x2 - self.dx) / self.ratio).clamp(0.0, width);
                let y2 = ((y2 - self.dy) / self.ratio).clamp(0.0, height);
                if x2 <= x1 || y2 <= y1 {
                    return None;
                }
                det.bbox = [x1, y1, x2, y2];
                Some(det)
            })
            .collect()
    }
}
