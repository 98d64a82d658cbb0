//! Region-scoped neural-network detector.
//!
//! Runs the shared inference session once per configured region, merges the
//! candidates in region declaration order, applies the class allow-list and
//! resolves labels. An unset session is a valid "detector disabled" state and
//! yields no results rather than an error.

use std::sync::Arc;
use std::time::Instant;

use crate::detection::domain::debug_renderer::DebugRenderer;
use crate::detection::domain::detection_result::{Detection, RawDetection};
use crate::detection::domain::detector_config::DetectorConfig;
use crate::detection::domain::detector_error::DetectorError;
use crate::detection::domain::inference_session::InferenceSession;
use crate::detection::domain::result_aggregator::{DetectionReport, ResultAggregator};
use crate::detection::domain::vision_detector::VisionDetector;
use crate::shared::frame::Frame;
use crate::shared::rect::Rect;

use super::region_processor::RegionProcessor;

pub struct NeuralNetworkDetector {
    config: DetectorConfig,
    session: Option<Arc<dyn InferenceSession>>,
    renderer: Option<Box<dyn DebugRenderer>>,
}

impl NeuralNetworkDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            session: None,
            renderer: None,
        }
    }

    /// Shares an externally owned session; the detector never reloads or drops the model.
    pub fn set_session(&mut self, session: Arc<dyn InferenceSession>) {
        self.session = Some(session);
    }

    pub fn clear_session(&mut self) {
        self.session = None;
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn set_config(&mut self, config: DetectorConfig) {
        self.config = config;
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn set_debug_renderer(&mut self, renderer: Box<dyn DebugRenderer>) {
        self.renderer = Some(renderer);
    }

    pub fn clear_debug_renderer(&mut self) {
        self.renderer = None;
    }

    /// Detections that pass the class filter, in region declaration order.
    pub fn analyze(&self, frame: &Frame) -> Result<Vec<Detection>, DetectorError> {
        Ok(self.analyze_report(frame)?.filtered)
    }

    /// Like [`analyze`](Self::analyze), but also returns the unfiltered detections.
    pub fn analyze_report(&self, frame: &Frame) -> Result<DetectionReport, DetectorError> {
        let Some(session) = self.session.as_deref() else {
            log::debug!("No inference session set; skipping detection");
            return Ok(DetectionReport::default());
        };

        let start = Instant::now();
        let rois = self.config.effective_rois(frame.width(), frame.height());
        let processor = RegionProcessor::new(session, &self.config);

        let per_roi = rois
            .iter()
            .map(|roi| processor.process(frame, roi))
            .collect::<Result<Vec<_>, _>>()?;

        let aggregator = ResultAggregator::from_config(&self.config);
        let report = DetectionReport {
            all: aggregator.resolve_all(&per_roi),
            filtered: aggregator.aggregate(&per_roi),
        };

        for (i, (roi, raw)) in rois.iter().zip(&per_roi).enumerate() {
            log::debug!("ROI #{i} {:?}: {} raw detection(s)", roi, raw.len());
        }
        if let Some(renderer) = &self.renderer {
            self.render(renderer.as_ref(), &aggregator, frame, &rois, &per_roi);
        }

        log::info!(
            "Detected {} of {} across {} ROI(s) in {:.1}ms",
            report.filtered.len(),
            report.all.len(),
            rois.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(report)
    }

    /// Hands each region its own filtered results; failures are logged only.
    fn render(
        &self,
        renderer: &dyn DebugRenderer,
        aggregator: &ResultAggregator<'_>,
        frame: &Frame,
        rois: &[Rect],
        per_roi: &[Vec<RawDetection>],
    ) {
        for (roi, raw) in rois.iter().zip(per_roi) {
            let results = aggregator.aggregate(std::slice::from_ref(raw));
            if let Err(e) = renderer.render(frame, roi, &results) {
                log::warn!("Debug render failed for ROI {:?}: {e}", roi);
            }
        }
    }
}

impl VisionDetector for NeuralNetworkDetector {
    type Output = Detection;

    fn analyze(&self, frame: &Frame) -> Result<Vec<Detection>, DetectorError> {
        NeuralNetworkDetector::analyze(self, frame)
    }
}
