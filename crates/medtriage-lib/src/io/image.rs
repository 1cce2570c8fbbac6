use crate::error::TriageError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{imageops::FilterType, DynamicImage, ImageFormat, Rgb, RgbImage};
use ndarray::Array3;
use std::io::Cursor;

/// ImageNet channel statistics the classifiers were trained with.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, TriageError> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(|e| TriageError::Parse(format!("not a valid image: {}", e)))
}

/// Resize to `size`x`size` and normalize into a `[3, H, W]` tensor.
pub fn to_input_tensor(image: &RgbImage, size: u32) -> Array3<f32> {
    let resized = image::imageops::resize(image, size, size, FilterType::Triangle);
    Array3::from_shape_fn((3, size as usize, size as usize), |(c, y, x)| {
        let value = resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0;
        (value - IMAGENET_MEAN[c]) / IMAGENET_STD[c]
    })
}

/// Undo the ImageNet normalization of a `[3, H, W]` tensor.
pub fn tensor_to_image(tensor: &Array3<f32>) -> RgbImage {
    let (channels, height, width) = tensor.dim();
    RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let mut px = [0u8; 3];
        for (c, slot) in px.iter_mut().enumerate() {
            // grayscale tensors repeat their single channel
            let src = c.min(channels.saturating_sub(1));
            let value = if channels == 0 {
                0.0
            } else {
                tensor[[src, y as usize, x as usize]] * IMAGENET_STD[c] + IMAGENET_MEAN[c]
            };
            *slot = (value.clamp(0.0, 1.0) * 255.0) as u8;
        }
        Rgb(px)
    })
}

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, TriageError> {
    let mut output = Vec::new();
    DynamicImage::ImageRgb8(image.clone()).write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}

pub fn data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

pub fn png_data_url(image: &RgbImage) -> Result<String, TriageError> {
    Ok(data_url(&encode_png(image)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tensor_round_trip_preserves_pixels() {
        let img = RgbImage::from_fn(8, 8, |x, y| Rgb([(x * 30) as u8, (y * 30) as u8, 128]));
        let tensor = to_input_tensor(&img, 8);
        assert_eq!(tensor.dim(), (3, 8, 8));
        let back = tensor_to_image(&tensor);
        for (a, b) in img.pixels().zip(back.pixels()) {
            for c in 0..3 {
                assert!((a[c] as i32 - b[c] as i32).abs() <= 1);
            }
        }
    }

    #[test]
    fn undecodable_bytes_are_a_parse_failure() {
        assert!(matches!(
            decode_image(b"definitely not an image"),
            Err(TriageError::Parse(_))
        ));
    }

    #[test]
    fn png_data_url_decodes_back() {
        let img = RgbImage::from_pixel(3, 2, Rgb([10, 20, 30]));
        let url = png_data_url(&img).unwrap();
        let payload = url.strip_prefix("data:image/png;base64,").unwrap();
        let bytes = STANDARD.decode(payload).unwrap();
        let decoded = decode_image(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.get_pixel(1, 1), &Rgb([10, 20, 30]));
    }
}
