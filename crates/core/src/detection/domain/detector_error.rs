use thiserror::Error;

use crate::detection::domain::inference_session::SessionError;

/// Failures that abort an analysis.
///
/// Soft conditions (no session, malformed ROI, NaN scores) never show up here;
/// they yield empty or partial results instead.
#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("inference failed: {0}")]
    Inference(#[from] SessionError),
    #[error("unexpected model output shape {shape:?}: {reason}")]
    OutputShape {
        shape: Vec<usize>,
        reason: &'static str,
    },
}
