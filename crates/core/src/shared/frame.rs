use ndarray::{s, ArrayView3};

use crate::shared::rect::Rect;

/// A captured screen image: contiguous interleaved bytes in row-major order.
///
/// The first three channels are read as colour (RGB unless the detector is
/// configured for BGR); any further channel such as alpha is ignored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        debug_assert!(channels >= 3, "frame needs at least three colour channels");
        Self {
            data,
            width,
            height,
            channels,
        }
    }

    /// Solid-colour RGB frame.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self::new(data, width, height, 3)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn bounds(&self) -> Rect {
        Rect::full(self.width, self.height)
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// View of the pixels under `rect`, clipped to the frame.
    pub fn view(&self, rect: &Rect) -> ArrayView3<'_, u8> {
        let r = rect.clip_to(self.width, self.height);
        if r.is_empty() {
            return self.as_ndarray().slice_move(s![0..0, 0..0, ..]);
        }
        let (x, y) = (r.x as usize, r.y as usize);
        let (w, h) = (r.width as usize, r.height as usize);
        self.as_ndarray().slice_move(s![y..y + h, x..x + w, ..])
    }

    /// Copies the pixels under `rect` (clipped to the frame) into a new frame.
    pub fn crop(&self, rect: &Rect) -> Frame {
        let view = self.view(rect);
        let (h, w, c) = view.dim();
        Frame::new(view.iter().copied().collect(), w as u32, h as u32, c as u8)
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
