use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use ab_glyph::{FontRef, InvalidFont, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect as PixelRect;

use crate::detection::domain::debug_renderer::DebugRenderer;
use crate::detection::domain::detection_result::Detection;
use crate::shared::constants::DEBUG_IMAGE_PREFIX;
use crate::shared::frame::Frame;
use crate::shared::rect::Rect;

static CAPTION_FONT: &[u8] = include_bytes!("../../../assets/DejaVuSans.ttf");

const PALETTE: [[u8; 3]; 6] = [
    [255, 64, 64],
    [64, 255, 64],
    [64, 128, 255],
    [255, 200, 0],
    [255, 0, 255],
    [0, 255, 255],
];
const UNKNOWN_CLASS_COLOR: [u8; 3] = [255, 255, 255];
const CAPTION_TEXT_COLOR: [u8; 3] = [0, 0, 0];
const OUTLINE_THICKNESS: i32 = 2;
const CAPTION_SCALE: f32 = 14.0;
const CAPTION_PADDING: i32 = 1;

/// Writes one PNG per rendered region into a directory.
///
/// Each image is the region's crop with every detection outlined in a
/// per-class colour and captioned with its label and score.
pub struct ImageDebugRenderer {
    dir: PathBuf,
    prefix: String,
    counter: AtomicUsize,
    font: FontRef<'static>,
}

impl ImageDebugRenderer {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, InvalidFont> {
        Ok(Self {
            dir: dir.into(),
            prefix: DEBUG_IMAGE_PREFIX.to_string(),
            counter: AtomicUsize::new(0),
            font: FontRef::try_from_slice(CAPTION_FONT)?,
        })
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Draws `results` over a copy of the region's pixels.
    pub fn draw(&self, frame: &Frame, roi: &Rect, results: &[Detection]) -> RgbImage {
        let region = roi.clip_to(frame.width(), frame.height());
        let crop = frame.crop(&region);
        let channels = crop.channels() as usize;
        let rgb: Vec<u8> = crop
            .data()
            .chunks_exact(channels)
            .flat_map(|px| px[..3].iter().copied())
            .collect();
        let mut img = RgbImage::from_raw(crop.width(), crop.height(), rgb)
            .unwrap_or_else(|| RgbImage::new(crop.width(), crop.height()));

        for d in results {
            let local = d.rect.translate(-region.x, -region.y);
            let color = Rgb(class_color(d.class_index));
            draw_outline(&mut img, &local, color);
            self.draw_caption(&mut img, &local, &caption(d), color);
        }
        img
    }

    /// Filled label tag above the box, or inside its top edge when there is no room.
    fn draw_caption(&self, img: &mut RgbImage, rect: &Rect, text: &str, color: Rgb<u8>) {
        let scale = PxScale::from(CAPTION_SCALE);
        let (tw, th) = text_size(scale, &self.font, text);
        let tag_w = tw + 2 * CAPTION_PADDING as u32;
        let tag_h = th + 2 * CAPTION_PADDING as u32;

        let above = rect.y - tag_h as i32 - 1;
        let top = if above >= 0 {
            above
        } else {
            rect.y + OUTLINE_THICKNESS
        };
        draw_filled_rect_mut(img, PixelRect::at(rect.x, top).of_size(tag_w, tag_h), color);
        draw_text_mut(
            img,
            Rgb(CAPTION_TEXT_COLOR),
            rect.x + CAPTION_PADDING,
            top + CAPTION_PADDING,
            scale,
            &self.font,
            text,
        );
    }
}

impl DebugRenderer for ImageDebugRenderer {
    fn render(
        &self,
        frame: &Frame,
        roi: &Rect,
        results: &[Detection],
    ) -> Result<(), Box<dyn std::error::Error>> {
        if roi.clip_to(frame.width(), frame.height()).is_empty() {
            return Ok(());
        }
        let img = self.draw(frame, roi, results);

        std::fs::create_dir_all(&self.dir)?;
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let path = self.dir.join(format!(
            "{}_{n:04}_{}_{}_{}x{}.png",
            self.prefix, roi.x, roi.y, roi.width, roi.height
        ));
        img.save(&path)?;
        log::debug!("Wrote {} ({} detection(s))", path.display(), results.len());
        Ok(())
    }
}

fn class_color(class_index: Option<usize>) -> [u8; 3] {
    class_index
        .map(|c| PALETTE[c % PALETTE.len()])
        .unwrap_or(UNKNOWN_CLASS_COLOR)
}

/// `"<label> 0.92"`, falling back to the class index, or `?` when unknown.
fn caption(d: &Detection) -> String {
    let name = if !d.label.is_empty() {
        d.label.clone()
    } else {
        d.class_index
            .map(|c| c.to_string())
            .unwrap_or_else(|| "?".to_string())
    };
    format!("{name} {:.2}", d.score)
}

fn draw_outline(img: &mut RgbImage, rect: &Rect, color: Rgb<u8>) {
    for t in 0..OUTLINE_THICKNESS {
        let (w, h) = (rect.width - 2 * t, rect.height - 2 * t);
        if w <= 0 || h <= 0 {
            break;
        }
        draw_hollow_rect_mut(
            img,
            PixelRect::at(rect.x + t, rect.y + t).of_size(w as u32, h as u32),
            color,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(class_index: Option<usize>, label: &str, rect: Rect, score: f64) -> Detection {
        Detection {
            class_index,
            label: label.to_string(),
            rect,
            score,
        }
    }

    fn renderer() -> (tempfile::TempDir, ImageDebugRenderer) {
        let dir = tempfile::tempdir().unwrap();
        let renderer = ImageDebugRenderer::new(dir.path()).unwrap();
        (dir, renderer)
    }

    #[test]
    fn test_draw_is_roi_sized() {
        let (_dir, renderer) = renderer();
        let frame = Frame::filled(100, 80, [0, 0, 0]);
        let img = renderer.draw(&frame, &Rect::new(10, 20, 30, 40), &[]);
        assert_eq!(img.dimensions(), (30, 40));
    }

    #[test]
    fn test_draw_outlines_in_roi_coordinates() {
        let (_dir, renderer) = renderer();
        let frame = Frame::filled(100, 100, [0, 0, 0]);
        let roi = Rect::new(20, 20, 60, 60);
        let d = detection(Some(0), "", Rect::new(30, 40, 20, 20), 1.0);
        let img = renderer.draw(&frame, &roi, &[d]);

        // box corners at (10, 20) and (29, 39) local
        assert_eq!(img.get_pixel(10, 20), &Rgb(PALETTE[0]));
        assert_eq!(img.get_pixel(29, 39), &Rgb(PALETTE[0]));
        assert_eq!(img.get_pixel(20, 30), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_unknown_class_uses_neutral_color() {
        let (_dir, renderer) = renderer();
        let frame = Frame::filled(50, 50, [0, 0, 0]);
        let d = detection(None, "", Rect::new(10, 30, 10, 10), 0.5);
        let img = renderer.draw(&frame, &frame.bounds(), &[d]);
        assert_eq!(img.get_pixel(19, 39), &Rgb(UNKNOWN_CLASS_COLOR));
    }

    #[test]
    fn test_caption_text() {
        let labelled = detection(Some(1), "start", Rect::new(0, 0, 1, 1), 0.923);
        assert_eq!(caption(&labelled), "start 0.92");
        assert_eq!(caption(&detection(Some(4), "", Rect::default(), 0.5)), "4 0.50");
        assert_eq!(caption(&detection(None, "", Rect::default(), 0.5)), "? 0.50");
    }

    #[test]
    fn test_boxes_past_edges_do_not_panic() {
        let (_dir, renderer) = renderer();
        let frame = Frame::filled(20, 20, [0, 0, 0]);
        let d = detection(Some(2), "wide label", Rect::new(-5, -5, 40, 40), 0.9);
        let img = renderer.draw(&frame, &frame.bounds(), &[d]);
        assert_eq!(img.dimensions(), (20, 20));
    }

    #[test]
    fn test_render_writes_label_text_above_box() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = ImageDebugRenderer::new(dir.path()).unwrap();
        let frame = Frame::filled(120, 80, [255, 255, 255]);
        let d = detection(Some(0), "button", Rect::new(10, 40, 80, 30), 0.87);

        renderer.render(&frame, &frame.bounds(), &[d]).unwrap();

        let path = dir.path().join(format!("{DEBUG_IMAGE_PREFIX}_0000_0_0_120x80.png"));
        let img = image::open(&path).unwrap().to_rgb8();
        // white frame, red tag: dark pixels above the box can only be glyphs
        let above_box: Vec<&Rgb<u8>> = (0..39u32)
            .flat_map(|y| (0..120u32).map(move |x| (x, y)))
            .map(|(x, y)| img.get_pixel(x, y))
            .collect();
        assert!(above_box.iter().any(|p| p[0] < 128));
        assert!(above_box.iter().any(|p| **p == Rgb(PALETTE[0])));
    }

    #[test]
    fn test_render_writes_png_per_call() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = ImageDebugRenderer::new(dir.path().join("debug"))
            .unwrap()
            .with_prefix("test");
        let frame = Frame::filled(40, 40, [10, 20, 30]);
        let roi = Rect::new(0, 0, 20, 20);
        let d = detection(Some(0), "x", Rect::new(2, 2, 10, 10), 0.8);

        renderer.render(&frame, &roi, &[d.clone()]).unwrap();
        renderer.render(&frame, &roi, &[d]).unwrap();

        let first = dir.path().join("debug").join("test_0000_0_0_20x20.png");
        let second = dir.path().join("debug").join("test_0001_0_0_20x20.png");
        assert!(first.exists());
        assert!(second.exists());
        let loaded = image::open(&first).unwrap().to_rgb8();
        assert_eq!(loaded.dimensions(), (20, 20));
    }

    #[test]
    fn test_render_skips_region_outside_image() {
        let (dir, renderer) = renderer();
        let frame = Frame::filled(10, 10, [0, 0, 0]);
        renderer.render(&frame, &Rect::new(50, 50, 5, 5), &[]).unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
