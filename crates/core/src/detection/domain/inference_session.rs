use ndarray::{Array4, ArrayD};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("inference runtime error: {0}")]
    Runtime(String),
    #[error("inference session lock poisoned")]
    Poisoned,
    #[error("model produced no outputs")]
    NoOutputs,
}

/// Handle to a loaded model, owned by whoever loaded it.
///
/// Detectors only hold it behind an `Arc` and call [`run`](Self::run); they
/// never create, reload or drop the underlying runtime session. Implementations
/// must serialize access themselves if their runtime is not reentrant.
pub trait InferenceSession: Send + Sync {
    /// Runs one forward pass on an NCHW `f32` tensor and returns the first output.
    fn run(&self, input: Array4<f32>) -> Result<ArrayD<f32>, SessionError>;

    /// Input `(width, height)` the model declares, if it is static.
    fn input_size(&self) -> Option<(u32, u32)> {
        None
    }
}
