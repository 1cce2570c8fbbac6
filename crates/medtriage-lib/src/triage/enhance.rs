use super::ImageEnhancer;
use image::{Rgb, RgbImage};

/// Per-channel linear stretch of the occupied range onto 0..=255.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContrastStretch;

impl ImageEnhancer for ContrastStretch {
    fn enhance(&self, image: &RgbImage) -> RgbImage {
        let mut lo = [255u8; 3];
        let mut hi = [0u8; 3];
        for pixel in image.pixels() {
            for c in 0..3 {
                lo[c] = lo[c].min(pixel[c]);
                hi[c] = hi[c].max(pixel[c]);
            }
        }
        RgbImage::from_fn(image.width(), image.height(), |x, y| {
            let pixel = image.get_pixel(x, y);
            let mut out = [0u8; 3];
            for c in 0..3 {
                out[c] = if hi[c] <= lo[c] {
                    pixel[c]
                } else {
                    let range = (hi[c] - lo[c]) as f32;
                    ((pixel[c] - lo[c]) as f32 / range * 255.0).round() as u8
                };
            }
            Rgb(out)
        })
    }
}
