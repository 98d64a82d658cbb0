use crate::detection::domain::detection_result::RawDetection;
use crate::detection::domain::detector_config::DetectorConfig;
use crate::detection::domain::detector_error::DetectorError;
use crate::detection::domain::inference_session::InferenceSession;
use crate::shared::constants::DEFAULT_INPUT_SIZE;
use crate::shared::frame::Frame;
use crate::shared::rect::Rect;

use super::preprocess::{preprocess, RoiTransform};
use super::yolo_decoder::{self, Candidate};

/// Runs the model on one region and returns its candidates in image coordinates.
pub struct RegionProcessor<'a> {
    session: &'a dyn InferenceSession,
    config: &'a DetectorConfig,
}

impl<'a> RegionProcessor<'a> {
    pub fn new(session: &'a dyn InferenceSession, config: &'a DetectorConfig) -> Self {
        Self { session, config }
    }

    /// Model input `(width, height)`: config override, then the model's own, then 640².
    pub fn input_size(&self) -> (u32, u32) {
        self.config
            .input_size
            .map(|[w, h]| (w, h))
            .or_else(|| self.session.input_size())
            .unwrap_or((DEFAULT_INPUT_SIZE, DEFAULT_INPUT_SIZE))
    }

    /// Detects inside `roi`.
    ///
    /// A ROI reaching past the image is clipped first; one that is degenerate
    /// or entirely outside contributes nothing. Inference and output-shape
    /// failures are returned as errors.
    pub fn process(&self, frame: &Frame, roi: &Rect) -> Result<Vec<RawDetection>, DetectorError> {
        let region = roi.clip_to(frame.width(), frame.height());
        if roi.is_empty() || region.is_empty() {
            log::warn!(
                "Skipping ROI {:?}: empty within {}x{} image",
                <[i32; 4]>::from(*roi),
                frame.width(),
                frame.height()
            );
            return Ok(Vec::new());
        }
        if region != *roi {
            log::debug!("ROI {:?} clipped to {:?}", roi, region);
        }

        let (input_w, input_h) = self.input_size();
        let (tensor, transform) = preprocess(
            frame.view(&region),
            input_w,
            input_h,
            self.config.resize_mode,
            &self.config.normalization,
        );

        let output = self.session.run(tensor)?;

        let labels = &self.config.label_table;
        let num_classes = (!labels.is_empty()).then_some(labels.len());
        let mut candidates = yolo_decoder::decode(
            &output,
            self.config.output_format,
            num_classes,
            self.config.score_threshold,
        )?;
        if let Some(iou) = self.config.nms_iou_threshold {
            candidates = yolo_decoder::suppress(candidates, iou);
        }

        Ok(candidates
            .iter()
            .filter_map(|c| {
                let rect = to_image_rect(c, &region, &transform, frame);
                (!rect.is_empty()).then_some(RawDetection {
                    class_index: c.class_index,
                    score: c.score,
                    rect,
                })
            })
            .collect())
    }
}

/// Model-input box → ROI space → image space, rounded then clipped to the image.
/// Corners are clamped to the image before the integer cast.
fn to_image_rect(c: &Candidate, region: &Rect, transform: &RoiTransform, frame: &Frame) -> Rect {
    let (x1, y1) = transform.to_roi(c.x1, c.y1);
    let (x2, y2) = transform.to_roi(c.x2, c.y2);
    let ox = region.x as f64;
    let oy = region.y as f64;
    let max_x = frame.width() as f64;
    let max_y = frame.height() as f64;
    let px = |v: f64, max: f64| v.round().clamp(0.0, max) as i32;
    Rect::from_corners(
        px(x1 + ox, max_x),
        px(y1 + oy, max_y),
        px(x2 + ox, max_x),
        px(y2 + oy, max_y),
    )
    .clip_to(frame.width(), frame.height())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detector_config::LabelTable;
    use crate::detection::domain::inference_session::SessionError;
    use approx::assert_relative_eq;
    use ndarray::{Array, Array4, ArrayD, IxDyn};
    use std::sync::Mutex;

    // --- Stubs ---

    /// Returns the same `[1, features, candidates]` output on every call and
    /// records the input shapes it was given.
    struct StubSession {
        output: ArrayD<f32>,
        input_size: Option<(u32, u32)>,
        seen: Mutex<Vec<Vec<usize>>>,
    }

    impl StubSession {
        fn new(rows: &[Vec<f32>]) -> Self {
            let n = rows.len();
            let f = rows[0].len();
            Self {
                output: Array::from_shape_fn(IxDyn(&[1, f, n]), |idx| rows[idx[2]][idx[1]]),
                input_size: None,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    impl InferenceSession for StubSession {
        fn run(&self, input: Array4<f32>) -> Result<ArrayD<f32>, SessionError> {
            self.seen.lock().unwrap().push(input.shape().to_vec());
            Ok(self.output.clone())
        }

        fn input_size(&self) -> Option<(u32, u32)> {
            self.input_size
        }
    }

    struct FailingSession;

    impl InferenceSession for FailingSession {
        fn run(&self, _input: Array4<f32>) -> Result<ArrayD<f32>, SessionError> {
            Err(SessionError::Runtime("input shape mismatch".to_string()))
        }
    }

    /// Two classes; one row per candidate as `[cx, cy, w, h, s0, s1]`.
    fn config(input: [u32; 2]) -> DetectorConfig {
        DetectorConfig {
            label_table: LabelTable::new(["background", "button"]),
            input_size: Some(input),
            score_threshold: 0.5,
            ..Default::default()
        }
    }

    fn row(x: f32, y: f32, w: f32, h: f32, class: usize, score: f32) -> Vec<f32> {
        let mut r = vec![x + w / 2.0, y + h / 2.0, w, h, 0.0, 0.0];
        r[4 + class] = score;
        r
    }

    // --- Tests ---

    #[test]
    fn test_single_full_image_detection() {
        let frame = Frame::filled(640, 480, [0, 0, 0]);
        let session = StubSession::new(&[row(10.0, 10.0, 50.0, 50.0, 1, 0.92), vec![0.0; 6]]);
        let cfg = config([640, 480]);
        let out = RegionProcessor::new(&session, &cfg)
            .process(&frame, &frame.bounds())
            .unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].class_index, Some(1));
        assert_eq!(out[0].rect, Rect::new(10, 10, 50, 50));
        assert_relative_eq!(out[0].score, 0.92, epsilon = 1e-6);
    }

    #[test]
    fn test_translates_by_roi_offset() {
        let frame = Frame::filled(640, 480, [0, 0, 0]);
        let session = StubSession::new(&[row(10.0, 20.0, 30.0, 40.0, 1, 0.9), vec![0.0; 6]]);
        let cfg = config([320, 320]);
        let out = RegionProcessor::new(&session, &cfg)
            .process(&frame, &Rect::new(100, 50, 320, 320))
            .unwrap();

        assert_eq!(out[0].rect, Rect::new(110, 70, 30, 40));
    }

    #[test]
    fn test_sub_pixel_edges_are_rounded() {
        // 100x100 ROI into a 200x200 input: scale 2, model x1=21 → 10.5 → 11
        let frame = Frame::filled(200, 200, [0, 0, 0]);
        let session = StubSession::new(&[row(21.0, 21.0, 40.0, 40.0, 1, 0.9), vec![0.0; 6]]);
        let cfg = config([200, 200]);
        let out = RegionProcessor::new(&session, &cfg)
            .process(&frame, &Rect::new(0, 0, 100, 100))
            .unwrap();

        assert_eq!(out[0].rect, Rect::new(11, 11, 20, 20));
    }

    #[test]
    fn test_overflowing_box_is_clipped_to_image() {
        let frame = Frame::filled(640, 480, [0, 0, 0]);
        let session = StubSession::new(&[row(10.0, 0.0, 40.0, 20.0, 1, 0.9), vec![0.0; 6]]);
        let cfg = config([40, 40]);
        let out = RegionProcessor::new(&session, &cfg)
            .process(&frame, &Rect::new(600, 0, 40, 40))
            .unwrap();

        assert_eq!(out[0].rect, Rect::new(610, 0, 30, 20));
        assert!(frame.bounds().contains_rect(&out[0].rect));
    }

    #[test]
    fn test_huge_box_is_clamped_to_image() {
        let frame = Frame::filled(100, 100, [0, 0, 0]);
        let session = StubSession::new(&[vec![0.0, 0.0, 1e10, 1e10, 0.9, 0.0], vec![0.0; 6]]);
        let cfg = config([100, 100]);
        let out = RegionProcessor::new(&session, &cfg)
            .process(&frame, &frame.bounds())
            .unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].rect, Rect::new(0, 0, 100, 100));
    }

    #[test]
    fn test_box_entirely_in_padding_is_dropped() {
        // 640x480 letterboxed into 640x640 → 80px pad rows on top
        let frame = Frame::filled(640, 480, [0, 0, 0]);
        let session = StubSession::new(&[row(10.0, 0.0, 50.0, 40.0, 1, 0.9), vec![0.0; 6]]);
        let cfg = config([640, 640]);
        let out = RegionProcessor::new(&session, &cfg)
            .process(&frame, &frame.bounds())
            .unwrap();

        assert!(out.is_empty());
    }

    #[test]
    fn test_below_threshold_is_dropped() {
        let frame = Frame::filled(64, 64, [0, 0, 0]);
        let session = StubSession::new(&[row(1.0, 1.0, 5.0, 5.0, 1, 0.4), vec![0.0; 6]]);
        let cfg = config([64, 64]);
        let out = RegionProcessor::new(&session, &cfg)
            .process(&frame, &frame.bounds())
            .unwrap();

        assert!(out.is_empty());
    }

    #[test]
    fn test_degenerate_roi_skips_inference() {
        let frame = Frame::filled(64, 64, [0, 0, 0]);
        let session = StubSession::new(&[row(1.0, 1.0, 5.0, 5.0, 1, 0.9), vec![0.0; 6]]);
        let cfg = config([64, 64]);
        let processor = RegionProcessor::new(&session, &cfg);

        assert!(processor.process(&frame, &Rect::new(0, 0, 0, 10)).unwrap().is_empty());
        assert!(processor.process(&frame, &Rect::new(0, 0, 10, -5)).unwrap().is_empty());
        assert!(processor.process(&frame, &Rect::new(100, 100, 10, 10)).unwrap().is_empty());
        assert_eq!(session.calls(), 0);
    }

    #[test]
    fn test_partially_outside_roi_is_clipped() {
        let frame = Frame::filled(640, 480, [0, 0, 0]);
        let session = StubSession::new(&[row(0.0, 0.0, 10.0, 10.0, 1, 0.9), vec![0.0; 6]]);
        let cfg = config([40, 80]);
        let out = RegionProcessor::new(&session, &cfg)
            .process(&frame, &Rect::new(600, 400, 100, 100))
            .unwrap();

        assert_eq!(session.calls(), 1);
        assert_eq!(out[0].rect, Rect::new(600, 400, 10, 10));
    }

    #[test]
    fn test_input_size_precedence() {
        let mut session = StubSession::new(&[vec![0.0; 6], vec![0.0; 6]]);
        let mut cfg = config([320, 192]);
        assert_eq!(RegionProcessor::new(&session, &cfg).input_size(), (320, 192));

        cfg.input_size = None;
        session.input_size = Some((416, 416));
        assert_eq!(RegionProcessor::new(&session, &cfg).input_size(), (416, 416));

        session.input_size = None;
        assert_eq!(
            RegionProcessor::new(&session, &cfg).input_size(),
            (DEFAULT_INPUT_SIZE, DEFAULT_INPUT_SIZE)
        );
    }

    #[test]
    fn test_tensor_uses_input_size() {
        let frame = Frame::filled(64, 48, [0, 0, 0]);
        let session = StubSession::new(&[vec![0.0; 6], vec![0.0; 6]]);
        let cfg = config([96, 32]);
        RegionProcessor::new(&session, &cfg)
            .process(&frame, &frame.bounds())
            .unwrap();

        assert_eq!(session.seen.lock().unwrap()[0], vec![1, 3, 32, 96]);
    }

    #[test]
    fn test_suppression_stays_within_roi() {
        let frame = Frame::filled(100, 100, [0, 0, 0]);
        let rows = [
            row(10.0, 10.0, 40.0, 40.0, 1, 0.8),
            row(12.0, 12.0, 40.0, 40.0, 1, 0.9),
            row(60.0, 60.0, 20.0, 20.0, 1, 0.7),
        ];
        let session = StubSession::new(&rows);
        let mut cfg = config([100, 100]);

        let out = RegionProcessor::new(&session, &cfg)
            .process(&frame, &frame.bounds())
            .unwrap();
        let scores: Vec<f64> = out.iter().map(|d| (d.score * 10.0).round() / 10.0).collect();
        assert_eq!(scores, vec![0.9, 0.7]);

        cfg.nms_iou_threshold = None;
        let out = RegionProcessor::new(&session, &cfg)
            .process(&frame, &frame.bounds())
            .unwrap();
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_inference_failure_is_an_error() {
        let frame = Frame::filled(64, 64, [0, 0, 0]);
        let cfg = config([64, 64]);
        let err = RegionProcessor::new(&FailingSession, &cfg)
            .process(&frame, &frame.bounds())
            .unwrap_err();

        assert!(matches!(err, DetectorError::Inference(SessionError::Runtime(_))));
    }

    #[test]
    fn test_bad_output_shape_is_an_error() {
        let frame = Frame::filled(64, 64, [0, 0, 0]);
        let session = StubSession {
            output: ArrayD::zeros(IxDyn(&[2, 6, 10])),
            input_size: None,
            seen: Mutex::new(Vec::new()),
        };
        let cfg = config([64, 64]);
        let err = RegionProcessor::new(&session, &cfg)
            .process(&frame, &frame.bounds())
            .unwrap_err();

        assert!(matches!(err, DetectorError::OutputShape { .. }));
    }
}
