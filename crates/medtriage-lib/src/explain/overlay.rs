use super::colormap::jet;
use crate::error::ExplainError;
use image::{imageops::FilterType, ImageBuffer, Luma, Rgb, RgbImage};
use ndarray::Array2;

type MapImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Bilinear resize of a `[H', W']` map to `width` x `height` pixels.
pub fn resize_map(values: &Array2<f32>, width: u32, height: u32) -> Result<MapImage, ExplainError> {
    let (rows, cols) = values.dim();
    let source = MapImage::from_raw(cols as u32, rows as u32, values.iter().copied().collect())
        .ok_or(ExplainError::EmptyFeatureMap)?;
    Ok(image::imageops::resize(&source, width, height, FilterType::Triangle))
}

/// Quantizes each value to 8 bits, then applies the jet ramp.
pub fn colorize(map: &MapImage) -> RgbImage {
    RgbImage::from_fn(map.width(), map.height(), |x, y| {
        let level = (map.get_pixel(x, y)[0].clamp(0.0, 1.0) * 255.0) as u8;
        Rgb(jet(level as f32 / 255.0))
    })
}

/// `weight * heat + (1 - weight) * original`, clipped to the pixel range.
pub fn blend(heat: &RgbImage, original: &RgbImage, weight: f32) -> RgbImage {
    let weight = weight.clamp(0.0, 1.0);
    RgbImage::from_fn(original.width(), original.height(), |x, y| {
        let h = heat.get_pixel(x, y);
        let o = original.get_pixel(x, y);
        let mut px = [0u8; 3];
        for (c, slot) in px.iter_mut().enumerate() {
            let v = weight * h[c] as f32 + (1.0 - weight) * o[c] as f32;
            *slot = v.clamp(0.0, 255.0) as u8;
        }
        Rgb(px)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_stretches_to_requested_size() {
        let values = Array2::from_shape_vec((2, 2), vec![0.0, 1.0, 0.0, 1.0]).unwrap();
        let resized = resize_map(&values, 40, 10).unwrap();
        assert_eq!(resized.dimensions(), (40, 10));
        assert!(resized.get_pixel(0, 5)[0] < 0.2);
        assert!(resized.get_pixel(39, 5)[0] > 0.8);
    }

    #[test]
    fn blend_uses_forty_sixty_weights() {
        let heat = RgbImage::from_pixel(2, 2, Rgb([200, 0, 100]));
        let original = RgbImage::from_pixel(2, 2, Rgb([100, 50, 100]));
        let out = blend(&heat, &original, 0.4);
        assert_eq!(out.get_pixel(1, 1), &Rgb([140, 30, 100]));
    }
}
