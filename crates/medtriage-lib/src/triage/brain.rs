use super::{BoxDetector, Detection, ImageEnhancer};
use crate::error::TriageError;
use crate::io::image::png_data_url;
use crate::model::labels::{is_no_tumor, NO_TUMOR};
use image::{imageops, GrayImage, Luma, Rgb, RgbImage};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::morphology::{grayscale_open, Mask};
use imageproc::rect::Rect;
use log::debug;
use serde::{Deserialize, Serialize};

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_THICKNESS: u32 = 2;

/// 5x5 elliptical structuring element used to clean the thresholded ROI.
const ELLIPSE_5X5: [[u8; 5]; 5] = [
    [0, 0, 255, 0, 0],
    [255, 255, 255, 255, 255],
    [255, 255, 255, 255, 255],
    [255, 255, 255, 255, 255],
    [0, 0, 255, 0, 0],
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrainReport {
    pub label: String,
    pub confidence: f64,
    pub explanation: String,
    /// Mask pixels over image pixels, in percent.
    pub tumor_size_percent: f64,
    pub detections: Vec<Detection>,
    /// Annotated image as a PNG data URL.
    pub annotated: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BrainAnalysis {
    pub report: BrainReport,
    pub annotated: RgbImage,
    pub mask: GrayImage,
}

/// Runs the detector, outlines tumor boxes and segments inside each box.
///
/// When `roi_enhancer` is given it is applied to every box before
/// thresholding.
pub fn analyze_brain(
    image: &RgbImage,
    detector: Option<&dyn BoxDetector>,
    roi_enhancer: Option<&dyn ImageEnhancer>,
) -> Result<BrainAnalysis, TriageError> {
    let detector = detector
        .ok_or_else(|| TriageError::ModelUnavailable("brain detector not loaded".into()))?;
    let detections = detector.detect(image)?;
    let (width, height) = image.dimensions();
    let mut annotated = image.clone();
    let mut mask = GrayImage::new(width, height);

    for det in detections.iter().filter(|d| !is_no_tumor(&d.label)) {
        let Some([x1, y1, x2, y2]) = clamp_box(det.bbox, width, height) else {
            debug!("skipping empty box {:?} for {}", det.bbox, det.label);
            continue;
        };
        draw_box(&mut annotated, [x1, y1, x2, y2]);
        let mut roi = imageops::crop_imm(image, x1, y1, x2 - x1, y2 - y1).to_image();
        if let Some(enhancer) = roi_enhancer {
            roi = enhancer.enhance(&roi);
        }
        let segmented = segment_roi(&to_gray(&roi));
        for (x, y, px) in segmented.enumerate_pixels() {
            let target = mask.get_pixel_mut(x1 + x, y1 + y);
            target[0] = target[0].max(px[0]);
        }
    }

    let total = (width as u64 * height as u64).max(1);
    let tumor_px = mask.pixels().filter(|p| p[0] > 0).count() as u64;
    let tumor_size_percent = tumor_px as f64 / total as f64 * 100.0;

    let best = detections
        .iter()
        .filter(|d| !is_no_tumor(&d.label))
        .reduce(|best, d| if d.confidence > best.confidence { d } else { best });
    let (label, confidence, explanation) = match best {
        Some(d) => (
            d.label.clone(),
            d.confidence as f64 * 100.0,
            "A tumor anomaly was detected. Radiological verification is recommended.",
        ),
        None => (NO_TUMOR.to_string(), 100.0, "No tumor anomalies detected."),
    };
    debug!(
        "brain: {} ({:.1}%), tumor area {:.2}%",
        label, confidence, tumor_size_percent
    );

    let report = BrainReport {
        label,
        confidence,
        explanation: explanation.to_string(),
        tumor_size_percent,
        detections,
        annotated: png_data_url(&annotated)?,
        mask: if tumor_px > 0 {
            Some(png_data_url(&gray_to_rgb(&mask))?)
        } else {
            None
        },
    };
    Ok(BrainAnalysis {
        report,
        annotated,
        mask,
    })
}

fn clamp_box(bbox: [u32; 4], width: u32, height: u32) -> Option<[u32; 4]> {
    let [x1, y1, x2, y2] = bbox;
    let (x2, y2) = (x2.min(width), y2.min(height));
    (x1 < x2 && y1 < y2).then_some([x1, y1, x2, y2])
}

fn draw_box(img: &mut RgbImage, [x1, y1, x2, y2]: [u32; 4]) {
    for inset in 0..BOX_THICKNESS {
        let (w, h) = (x2 - x1, y2 - y1);
        if w <= 2 * inset || h <= 2 * inset {
            break;
        }
        let rect = Rect::at((x1 + inset) as i32, (y1 + inset) as i32)
            .of_size(w - 2 * inset, h - 2 * inset);
        draw_hollow_rect_mut(img, rect, BOX_COLOR);
    }
}

/// Luma with the BT.601 weights.
fn to_gray(img: &RgbImage) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let [r, g, b] = img.get_pixel(x, y).0;
        let v = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        Luma([v.round().clamp(0.0, 255.0) as u8])
    })
}

fn gray_to_rgb(img: &GrayImage) -> RgbImage {
    RgbImage::from_fn(img.width(), img.height(), |x, y| {
        let v = img.get_pixel(x, y)[0];
        Rgb([v, v, v])
    })
}

fn ellipse_mask() -> Mask {
    let kernel = GrayImage::from_fn(5, 5, |x, y| Luma([ELLIPSE_5X5[y as usize][x as usize]]));
    Mask::from_image(&kernel, 2, 2)
}

/// Otsu threshold followed by a 5x5 elliptical opening.
pub fn segment_roi(gray: &GrayImage) -> GrayImage {
    let binary = threshold(gray, otsu_level(gray), ThresholdType::Binary);
    grayscale_open(&binary, &ellipse_mask())
}
