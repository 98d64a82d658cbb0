//! Decodes YOLO-style detection heads into scored candidates.
//!
//! Accepts `[1, features, candidates]` (the usual ultralytics export),
//! `[1, candidates, features]`, or the same without the batch axis.

use std::cmp::Ordering;

use ndarray::{ArrayD, ArrayView2, Axis, Ix2};

use crate::detection::domain::detector_config::OutputFormat;
use crate::detection::domain::detector_error::DetectorError;

/// Box plus at least one class score (v8) or objectness (v5).
const MIN_FEATURES: usize = 5;

/// A candidate box in model-input coordinates, corner form.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub class_index: Option<usize>,
    pub score: f64,
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl Candidate {
    fn corners(&self) -> [f64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// Decodes every candidate scoring at least `score_threshold`, in output order.
///
/// `num_classes` disambiguates the layout when known (from the label table);
/// otherwise the shorter axis is taken as the feature axis. Non-finite scores
/// or coordinates are dropped, as are rows whose class scores are all
/// non-finite. Scores are clamped to `[0, 1]`.
pub fn decode(
    output: &ArrayD<f32>,
    format: OutputFormat,
    num_classes: Option<usize>,
    score_threshold: f64,
) -> Result<Vec<Candidate>, DetectorError> {
    let rows = candidate_rows(output, format, num_classes)?;
    let offset = format.class_offset();
    let has_class_columns = rows.ncols() > offset;

    let mut candidates = Vec::new();
    for row in rows.axis_iter(Axis(0)) {
        let (class_index, class_score) = argmax(row.iter().skip(offset).copied());
        if has_class_columns && class_index.is_none() {
            continue;
        }
        let score = match format {
            OutputFormat::Yolov8 => class_score,
            OutputFormat::Yolov5 => {
                let objectness = row[4] as f64;
                if class_index.is_some() {
                    objectness * class_score
                } else {
                    objectness
                }
            }
        };
        if !score.is_finite() {
            continue;
        }
        let score = score.clamp(0.0, 1.0);
        if score < score_threshold {
            continue;
        }

        let (cx, cy, w, h) = (row[0] as f64, row[1] as f64, row[2] as f64, row[3] as f64);
        if ![cx, cy, w, h].iter().all(|v| v.is_finite()) {
            continue;
        }
        candidates.push(Candidate {
            class_index,
            score,
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
        });
    }
    Ok(candidates)
}

/// Greedy per-class suppression inside one region.
///
/// Visits candidates by descending score and drops any whose IoU with an
/// already-kept one of the same class exceeds `iou_thresh`. Survivors keep
/// their decode order.
pub fn suppress(candidates: Vec<Candidate>, iou_thresh: f64) -> Vec<Candidate> {
    let mut by_score: Vec<usize> = (0..candidates.len()).collect();
    by_score.sort_by(|&a, &b| {
        candidates[b]
            .score
            .partial_cmp(&candidates[a].score)
            .unwrap_or(Ordering::Equal)
    });

    let mut suppressed = vec![false; candidates.len()];
    for (pos, &i) in by_score.iter().enumerate() {
        if suppressed[i] {
            continue;
        }
        for &j in &by_score[pos + 1..] {
            if !suppressed[j]
                && candidates[i].class_index == candidates[j].class_index
                && bbox_iou(&candidates[i].corners(), &candidates[j].corners()) > iou_thresh
            {
                suppressed[j] = true;
            }
        }
    }

    candidates
        .into_iter()
        .zip(suppressed)
        .filter_map(|(c, s)| (!s).then_some(c))
        .collect()
}

/// Returns the output as `[candidates, features]`.
fn candidate_rows(
    output: &ArrayD<f32>,
    format: OutputFormat,
    num_classes: Option<usize>,
) -> Result<ArrayView2<'_, f32>, DetectorError> {
    let shape = output.shape().to_vec();
    let matrix = match shape.len() {
        3 if shape[0] == 1 => output.index_axis(Axis(0), 0),
        2 => output.view(),
        _ => {
            return Err(DetectorError::OutputShape {
                shape,
                reason: "expected [1, a, b] or [a, b]",
            })
        }
    };
    let matrix = matrix
        .into_dimensionality::<Ix2>()
        .map_err(|_| DetectorError::OutputShape {
            shape: shape.clone(),
            reason: "output is not two-dimensional",
        })?;

    let (a, b) = matrix.dim();
    let features_first = match num_classes.map(|n| format.class_offset() + n) {
        Some(f) if a == f && b != f => true,
        Some(f) if b == f && a != f => false,
        _ => a < b,
    };
    let rows = if features_first {
        matrix.reversed_axes()
    } else {
        matrix
    };

    if rows.ncols() < MIN_FEATURES {
        return Err(DetectorError::OutputShape {
            shape,
            reason: "too few features per candidate",
        });
    }
    Ok(rows)
}

/// Index and value of the largest finite score; `(None, NaN)` when there is none.
fn argmax(scores: impl Iterator<Item = f32>) -> (Option<usize>, f64) {
    scores
        .enumerate()
        .filter(|(_, s)| s.is_finite())
        .fold((None, f64::NAN), |(best_i, best_s), (i, s)| {
            let s = s as f64;
            if best_i.is_none() || s > best_s {
                (Some(i), s)
            } else {
                (best_i, best_s)
            }
        })
}

fn bbox_iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter)
}
