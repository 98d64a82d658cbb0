use crate::detection::domain::detector_error::DetectorError;
use crate::shared::frame::Frame;

/// Common contract for recognition strategies (neural network, template
/// matching, OCR ...): one frame in, an ordered list of results out.
///
/// Each strategy owns its own configuration type. An empty vector is a normal
/// outcome; `Err` is reserved for conditions the caller must act on.
pub trait VisionDetector: Send + Sync {
    type Output;

    fn analyze(&self, frame: &Frame) -> Result<Vec<Self::Output>, DetectorError>;
}
