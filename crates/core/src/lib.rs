//! Region-scoped object detection over a shared ONNX inference session.
//!
//! `NeuralNetworkDetector` runs a YOLO-style model on each configured region
//! of a frame, merges the decoded boxes in region order, keeps only the
//! expected classes and labels them.

pub mod detection;
pub mod shared;
