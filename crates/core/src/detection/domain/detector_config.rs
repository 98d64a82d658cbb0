use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::constants::{
    DEFAULT_NMS_IOU_THRESHOLD, DEFAULT_PAD_VALUE, DEFAULT_SCORE_THRESHOLD,
};
use crate::shared::rect::Rect;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Class-index → human-readable name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelTable(Vec<String>);

impl LabelTable {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(labels.into_iter().map(Into::into).collect())
    }

    /// Label for `class_index`, or `None` when the index is unknown or unmapped.
    pub fn get(&self, class_index: Option<usize>) -> Option<&str> {
        class_index.and_then(|i| self.0.get(i)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// How a region is fitted into the model input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMode {
    /// Uniform scale with centered padding.
    #[default]
    Letterbox,
    /// Independent x/y scale filling the whole input.
    Stretch,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

/// Layout of one candidate row in the model output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `[cx, cy, w, h, class_0 .. class_n]`
    #[default]
    Yolov8,
    /// `[cx, cy, w, h, objectness, class_0 .. class_n]`
    Yolov5,
}

impl OutputFormat {
    /// Index of the first class-score column.
    pub fn class_offset(self) -> usize {
        match self {
            OutputFormat::Yolov8 => 4,
            OutputFormat::Yolov5 => 5,
        }
    }
}

/// Pixel normalization: `(pixel / 255 - mean) / std` per channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
    pub channel_order: ChannelOrder,
    /// Letterbox fill value, in the normalized `[0, 1]` range before mean/std.
    pub pad_value: f32,
}

impl Default for Normalization {
    fn default() -> Self {
        Self {
            mean: [0.0; 3],
            std: [1.0; 3],
            channel_order: ChannelOrder::Rgb,
            pad_value: DEFAULT_PAD_VALUE,
        }
    }
}

/// Parameters for one neural-network detector.
///
/// Set once and reused across analyses; swapping it between calls is allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Empty means the whole image is a single region.
    pub regions_of_interest: Vec<Rect>,
    /// Empty means every class is kept.
    pub expected_classes: BTreeSet<usize>,
    pub score_threshold: f64,
    pub label_table: LabelTable,
    /// Suppression inside one region; `None` disables it. Never applied across regions.
    pub nms_iou_threshold: Option<f64>,
    /// `[width, height]`; overrides the size advertised by the model.
    pub input_size: Option<[u32; 2]>,
    pub resize_mode: ResizeMode,
    pub normalization: Normalization,
    pub output_format: OutputFormat,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            regions_of_interest: Vec::new(),
            expected_classes: BTreeSet::new(),
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            label_table: LabelTable::default(),
            nms_iou_threshold: Some(DEFAULT_NMS_IOU_THRESHOLD),
            input_size: None,
            resize_mode: ResizeMode::default(),
            normalization: Normalization::default(),
            output_format: OutputFormat::default(),
        }
    }
}

impl DetectorConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.score_threshold) {
            return Err(ConfigError::Invalid(format!(
                "score_threshold must be within [0, 1], got {}",
                self.score_threshold
            )));
        }
        if let Some(iou) = self.nms_iou_threshold {
            if !(0.0..=1.0).contains(&iou) {
                return Err(ConfigError::Invalid(format!(
                    "nms_iou_threshold must be within [0, 1], got {iou}"
                )));
            }
        }
        if let Some([w, h]) = self.input_size {
            if w == 0 || h == 0 {
                return Err(ConfigError::Invalid(format!(
                    "input_size must be positive, got {w}x{h}"
                )));
            }
        }
        if self.normalization.std.iter().any(|s| s.is_nan() || *s <= 0.0) {
            return Err(ConfigError::Invalid(
                "normalization std must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Regions to analyze in declaration order; the whole image when none are configured.
    pub fn effective_rois(&self, image_width: u32, image_height: u32) -> Vec<Rect> {
        if self.regions_of_interest.is_empty() {
            vec![Rect::full(image_width, image_height)]
        } else {
            self.regions_of_interest.clone()
        }
    }
}
