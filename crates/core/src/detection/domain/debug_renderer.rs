use crate::detection::domain::detection_result::Detection;
use crate::shared::frame::Frame;
use crate::shared::rect::Rect;

/// Diagnostic sink for detections found in one region.
///
/// Receives only results that survived filtering, in full-image coordinates.
/// Implementations must not touch `frame`; any failure is reported back and
/// logged by the caller without affecting the analysis result.
pub trait DebugRenderer: Send + Sync {
    fn render(
        &self,
        frame: &Frame,
        roi: &Rect,
        results: &[Detection],
    ) -> Result<(), Box<dyn std::error::Error>>;
}
