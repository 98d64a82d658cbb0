//! Fits a region's pixels into the model's NCHW input tensor.

use ndarray::{Array4, ArrayView3};

use crate::detection::domain::detector_config::{ChannelOrder, Normalization, ResizeMode};

/// Maps model-input coordinates back to region-local pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RoiTransform {
    pub scale_x: f64,
    pub scale_y: f64,
    pub pad_x: f64,
    pub pad_y: f64,
}

impl RoiTransform {
    pub fn to_roi(&self, x: f64, y: f64) -> (f64, f64) {
        ((x - self.pad_x) / self.scale_x, (y - self.pad_y) / self.scale_y)
    }
}

/// Resizes `src` (`[H, W, C]`, C ≥ 3) to `input_w` × `input_h` and normalizes it.
///
/// Uses nearest-neighbour sampling. The caller guarantees `src` is non-empty.
pub fn preprocess(
    src: ArrayView3<'_, u8>,
    input_w: u32,
    input_h: u32,
    mode: ResizeMode,
    norm: &Normalization,
) -> (Array4<f32>, RoiTransform) {
    let (src_h, src_w, _) = src.dim();
    let (iw, ih) = (input_w as f64, input_h as f64);

    let (scale_x, scale_y, new_w, new_h) = match mode {
        ResizeMode::Letterbox => {
            let scale = (iw / src_w as f64).min(ih / src_h as f64);
            let new_w = ((src_w as f64 * scale).round() as u32).clamp(1, input_w);
            let new_h = ((src_h as f64 * scale).round() as u32).clamp(1, input_h);
            (scale, scale, new_w, new_h)
        }
        ResizeMode::Stretch => (iw / src_w as f64, ih / src_h as f64, input_w, input_h),
    };
    let pad_x = (input_w - new_w) / 2;
    let pad_y = (input_h - new_h) / 2;

    let mut tensor = Array4::<f32>::zeros((1, 3, input_h as usize, input_w as usize));
    for c in 0..3 {
        let fill = (norm.pad_value - norm.mean[c]) / norm.std[c];
        tensor.slice_mut(ndarray::s![0, c, .., ..]).fill(fill);
    }

    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale_y) as usize).min(src_h - 1);
        let ty = pad_y as usize + y;
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale_x) as usize).min(src_w - 1);
            let tx = pad_x as usize + x;
            for c in 0..3 {
                let src_c = match norm.channel_order {
                    ChannelOrder::Rgb => c,
                    ChannelOrder::Bgr => 2 - c,
                };
                let v = src[[src_y, src_x, src_c]] as f32 / 255.0;
                tensor[[0, c, ty, tx]] = (v - norm.mean[c]) / norm.std[c];
            }
        }
    }

    let transform = RoiTransform {
        scale_x,
        scale_y,
        pad_x: pad_x as f64,
        pad_y: pad_y as f64,
    };
    (tensor, transform)
}
