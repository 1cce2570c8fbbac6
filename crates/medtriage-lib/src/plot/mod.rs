use crate::error::TriageError;
use crate::io::image::{data_url, encode_png};
use crate::signal::RawSignal;
use image::RgbImage;
use log::warn;
use plotters::prelude::*;
use serde::{Deserialize, Serialize};

/// 1x1 PNG returned when a plot cannot be rendered.
pub const PLACEHOLDER_PNG_DATA_URL: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

/// Largest plot canvas, in pixels.
pub const MAX_CANVAS_PIXELS: u64 = 40_000_000;

const MAJOR_GRID: RGBColor = RGBColor(0xf0, 0xa1, 0xa1);
const MINOR_GRID: RGBColor = RGBColor(0xfc, 0xe0, 0xe0);

/// Layout of the paper-style ECG rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EcgPlotOptions {
    /// Number of stacked panels the recording is split into.
    pub rows: usize,
    pub show_grid: bool,
    /// Adds a report title with the source name and today's date.
    pub show_details: bool,
    pub source_name: String,
    pub width: u32,
    pub row_height: u32,
    /// Points drawn per panel before decimation kicks in.
    pub max_points_per_row: usize,
}

impl Default for EcgPlotOptions {
    fn default() -> Self {
        Self {
            rows: 1,
            show_grid: true,
            show_details: false,
            source_name: "ECG Data".into(),
            width: 1500,
            row_height: 300,
            max_points_per_row: 4000,
        }
    }
}

pub fn decimate_points(points: &[(f64, f64)], max_points: usize) -> Vec<(f64, f64)> {
    if points.len() <= max_points || max_points == 0 {
        return points.to_vec();
    }
    let bucket_size = points.len() as f64 / max_points as f64;
    let mut result = Vec::with_capacity(max_points);
    for i in 0..max_points {
        let start = (i as f64 * bucket_size).floor() as usize;
        if start >= points.len() {
            break;
        }
        result.push(points[start]);
    }
    result
}

/// Splits the recording into `rows` equal segments, one panel each.
pub fn row_segments(samples: &[f64], rows: usize) -> Vec<&[f64]> {
    let rows = rows.clamp(1, samples.len().max(1));
    let per_row = samples.len() / rows;
    (0..rows)
        .map(|i| &samples[i * per_row..(i + 1) * per_row])
        .collect()
}

fn value_range(segment: &[f64]) -> (f64, f64) {
    let min = segment.iter().copied().fold(f64::INFINITY, f64::min);
    let max = segment.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !min.is_finite() || !max.is_finite() {
        return (-1.0, 1.0);
    }
    if (max - min).abs() < f64::EPSILON {
        (min - 1.0, max + 1.0)
    } else {
        let pad = (max - min) * 0.05;
        (min - pad, max + pad)
    }
}

/// Canvas dimensions for `rows` stacked panels, bounded by [`MAX_CANVAS_PIXELS`].
fn canvas_size(width: u32, row_height: u32, rows: usize) -> Result<(u32, u32), TriageError> {
    let width = width.max(1);
    let height = u32::try_from(rows)
        .ok()
        .and_then(|rows| row_height.max(1).checked_mul(rows))
        .ok_or_else(|| TriageError::Image(format!("{} rows do not fit in one image", rows)))?;
    let pixels = width as u64 * height as u64;
    if pixels > MAX_CANVAS_PIXELS {
        return Err(TriageError::Image(format!(
            "plot of {}x{} exceeds {} pixels",
            width, height, MAX_CANVAS_PIXELS
        )));
    }
    Ok((width, height))
}

/// Renders the recording as a PNG.
pub fn render_ecg_grid(signal: &RawSignal, opts: &EcgPlotOptions) -> Result<Vec<u8>, TriageError> {
    let segments = row_segments(signal.samples(), opts.rows);
    let (width, height) = canvas_size(opts.width, opts.row_height, segments.len())?;
    let mut buffer = vec![0u8; width as usize * height as usize * 3];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
        root.fill(&WHITE)?;
        let body = if opts.show_details {
            let title = format!(
                "ECG Report | Source: {} | Date: {}",
                opts.source_name,
                chrono::Local::now().format("%Y-%m-%d")
            );
            root.titled(&title, ("sans-serif", 24).into_font().style(FontStyle::Bold))?
        } else {
            root.clone()
        };
        let panels = body.split_evenly((segments.len(), 1));
        for (idx, (panel, segment)) in panels.iter().zip(&segments).enumerate() {
            let (y_min, y_max) = value_range(segment);
            let x_max = segment.len().max(2) as f64 - 1.0;
            let mut chart = ChartBuilder::on(panel)
                .margin(8)
                .set_label_area_size(LabelAreaPosition::Left, if opts.show_grid { 60 } else { 0 })
                .set_label_area_size(LabelAreaPosition::Bottom, if opts.show_grid { 24 } else { 0 })
                .build_cartesian_2d(0f64..x_max, y_min..y_max)?;
            if opts.show_grid {
                chart
                    .configure_mesh()
                    .bold_line_style(MAJOR_GRID.stroke_width(2))
                    .light_line_style(MINOR_GRID)
                    .y_desc(format!("Lead/Row {}", idx + 1))
                    .draw()?;
            }
            let points: Vec<(f64, f64)> = segment
                .iter()
                .enumerate()
                .map(|(i, v)| (i as f64, *v))
                .collect();
            chart.draw_series(LineSeries::new(
                decimate_points(&points, opts.max_points_per_row),
                &BLACK,
            ))?;
        }
        root.present()?;
    }
    let image = RgbImage::from_raw(width, height, buffer)
        .ok_or_else(|| TriageError::Image("plot buffer has the wrong size".into()))?;
    encode_png(&image)
}

/// Data URL of the rendered plot, or a 1x1 placeholder if rendering fails.
pub fn ecg_grid_data_url(signal: &RawSignal, opts: &EcgPlotOptions) -> String {
    match render_ecg_grid(signal, opts) {
        Ok(png) => data_url(&png),
        Err(err) => {
            warn!("ECG plot failed ({}), using placeholder", err);
            PLACEHOLDER_PNG_DATA_URL.to_string()
        }
    }
}
