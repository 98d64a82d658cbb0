use std::fmt;

use serde::{Deserialize, Serialize};

use crate::shared::rect::Rect;

/// A candidate decoded from model output, already in full-image coordinates
/// but not yet filtered or labelled.
#[derive(Clone, Debug, PartialEq)]
pub struct RawDetection {
    /// `None` when the model output carried no resolvable class.
    pub class_index: Option<usize>,
    pub score: f64,
    pub rect: Rect,
}

/// A labelled, scored detection as returned to callers.
///
/// Serializes to `{"class_index", "label", "box": [x, y, w, h], "score"}`;
/// an unknown class serializes as `"class_index": null` with an empty label.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_index: Option<usize>,
    pub label: String,
    #[serde(rename = "box")]
    pub rect: Rect,
    pub score: f64,
}

impl Detection {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}
