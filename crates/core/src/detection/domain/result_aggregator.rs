use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::detection::domain::detection_result::{Detection, RawDetection};
use crate::detection::domain::detector_config::{DetectorConfig, LabelTable};

/// Merges per-region candidates into the final, ordered result list.
///
/// Order is region declaration order, then decode order within each region.
/// No deduplication happens across regions; regions are expected not to overlap.
pub struct ResultAggregator<'a> {
    expected_classes: &'a BTreeSet<usize>,
    label_table: &'a LabelTable,
}

impl<'a> ResultAggregator<'a> {
    pub fn new(expected_classes: &'a BTreeSet<usize>, label_table: &'a LabelTable) -> Self {
        Self {
            expected_classes,
            label_table,
        }
    }

    pub fn from_config(config: &'a DetectorConfig) -> Self {
        Self::new(&config.expected_classes, &config.label_table)
    }

    /// Concatenates, class-filters and labels the candidates.
    pub fn aggregate(&self, per_roi: &[Vec<RawDetection>]) -> Vec<Detection> {
        per_roi
            .iter()
            .flatten()
            .filter(|raw| self.accepts(raw.class_index))
            .map(|raw| self.resolve(raw))
            .collect()
    }

    /// Labels every candidate without applying the class filter.
    pub fn resolve_all(&self, per_roi: &[Vec<RawDetection>]) -> Vec<Detection> {
        per_roi.iter().flatten().map(|raw| self.resolve(raw)).collect()
    }

    /// An empty allow-list accepts everything; an unknown class never matches a non-empty one.
    pub fn accepts(&self, class_index: Option<usize>) -> bool {
        self.expected_classes.is_empty()
            || class_index.is_some_and(|c| self.expected_classes.contains(&c))
    }

    fn resolve(&self, raw: &RawDetection) -> Detection {
        Detection {
            class_index: raw.class_index,
            label: self
                .label_table
                .get(raw.class_index)
                .unwrap_or_default()
                .to_string(),
            rect: raw.rect,
            score: raw.score,
        }
    }
}

/// Detections before and after the class filter.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub all: Vec<Detection>,
    pub filtered: Vec<Detection>,
}

impl DetectionReport {
    /// Highest-scoring filtered detection; the earliest wins ties.
    pub fn best(&self) -> Option<&Detection> {
        self.filtered.iter().reduce(|best, d| {
            if d.score > best.score {
                d
            } else {
                best
            }
        })
    }
}

/// Explicit re-orderings callers may apply on top of declaration order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultOrder {
    /// Region declaration order, then decode order (what the detector returns).
    #[default]
    Declaration,
    /// Left to right, then top to bottom.
    Horizontal,
    /// Top to bottom, then left to right.
    Vertical,
    /// Highest score first.
    Score,
    /// Largest box first.
    Area,
}

impl std::str::FromStr for ResultOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "declaration" => Ok(ResultOrder::Declaration),
            "horizontal" => Ok(ResultOrder::Horizontal),
            "vertical" => Ok(ResultOrder::Vertical),
            "score" => Ok(ResultOrder::Score),
            "area" => Ok(ResultOrder::Area),
            other => Err(format!("unknown result order: {other}")),
        }
    }
}

/// Stable re-sort; equal keys keep their declaration order.
pub fn sort_results(results: &mut [Detection], order: ResultOrder) {
    match order {
        ResultOrder::Declaration => {}
        ResultOrder::Horizontal => {
            results.sort_by_key(|d| (d.rect.x, d.rect.y));
        }
        ResultOrder::Vertical => {
            results.sort_by_key(|d| (d.rect.y, d.rect.x));
        }
        ResultOrder::Score => {
            results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        }
        ResultOrder::Area => {
            results.sort_by_key(|d| std::cmp::Reverse(d.rect.area()));
        }
    }
}
