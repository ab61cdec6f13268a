//! Geometry helpers shared by the decoder, filter and tracker.

use nalgebra::Point2;

const IOU_EPS: f32 = 1e-6;

/// Center point of a corner-form box `[x1, y1, x2, y2]`.
pub fn centroid(bbox: &[f32; 4]) -> Point2<f32> {
    Point2::new((bbox[0] + bbox[2]) / 2.0, (bbox[1] + bbox[3]) / 2.0)
}

/// Intersection-over-union of two corner-form boxes.
pub fn compute_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter_area = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let a_area = (a[2] - a[0]) * (a[3] - a[1]);
    let b_area = (b[2] - b[0]) * (b[3] - b[1]);

    inter_area / (a_area + b_area - inter_area + IOU_EPS)
}

/// Perform greedy non-max suppression on boxes & scores, return indices to keep.
///
/// The sort is stable, so equal scores keep their original order and the
/// first-seen box wins ties.
pub fn nms(boxes: &[[f32; 4]], scores: &[f32], iou_thresh: f32) -> Vec<usize> {
    let mut idxs: Vec<usize> = (0..boxes.len()).collect();
    idxs.sort_by(|&i, &j| scores[j].total_cmp(&scores[i]));
    let mut keep = Vec::new();
    while let Some(&i) = idxs.first() {
        keep.push(i);
        idxs = idxs
            .into_iter()
            .skip(1)
            .filter(|&j| compute_iou(&boxes[i], &boxes[j]) <= iou_thresh)
            .collect();
    }
    keep
}

/// Boundary-inclusive point-in-polygon test (ray casting).
///
/// Returns `true` when the point lies strictly inside the polygon or on one
/// of its edges. Polygons with fewer than 3 vertices never contain anything.
pub fn point_in_polygon(pt: Point2<f32>, polygon: &[Point2<f32>]) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    // On-edge check first; the crossing count below treats edge points
    // inconsistently depending on winding.
    for i in 0..polygon.len() {
        let a = polygon[i];
        let b = polygon[(i + 1) % polygon.len()];
        if on_segment(pt, a, b) {
            return true;
        }
    }

    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let pi = polygon[i];
        let pj = polygon[j];
        if (pi.y > pt.y) != (pj.y > pt.y) {
            let x_cross = pj.x + (pt.y - pj.y) / (pi.y - pj.y) * (pi.x - pj.x);
            if pt.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn on_segment(pt: Point2<f32>, a: Point2<f32>, b: Point2<f32>) -> bool {
    let cross = (b.x - a.x) * (pt.y - a.y) - (b.y - a.y) * (pt.x - a.x);
    if cross.abs() > 1e-4 {
        return false;
    }
    pt.x >= a.x.min(b.x) && pt.x <= a.x.max(b.x) && pt.y >= a.y.min(b.y) && pt.y <= a.y.max(b.y)
}
