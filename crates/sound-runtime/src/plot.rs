//! Marker-and-line plot of reading values against their index, saved as PNG.
//!
//! Labels are drawn with a built-in 5x7 bitmap font so no font files are
//! needed at runtime.

use std::path::Path;

use image::{Rgb, RgbImage};
use sound_core::error::{Result, SoundLogError};
use sound_core::models::{parse_value, RawReading};

pub const PLOT_WIDTH: u32 = 1000;
pub const PLOT_HEIGHT: u32 = 500;
const MARGIN: i64 = 50;
const MARKER_RADIUS: i64 = 2;
const GRID_DIVISIONS: i64 = 10;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const GRID: Rgb<u8> = Rgb([225, 225, 225]);
const AXIS: Rgb<u8> = Rgb([90, 90, 90]);
const SERIES: Rgb<u8> = Rgb([31, 119, 180]);
const TEXT: Rgb<u8> = Rgb([20, 20, 20]);

const TITLE: &str = "Sound Readings";
const X_LABEL: &str = "Index";
const Y_LABEL: &str = "Sound Value";

/// Convert every raw line to a number, failing on the first one that is not.
pub fn plot_values(readings: &[RawReading]) -> Result<Vec<f64>> {
    readings
        .iter()
        .map(|r| {
            parse_value(&r.line).ok_or_else(|| SoundLogError::MalformedReading {
                value: r.line.clone(),
            })
        })
        .collect()
}

/// Draw `values` and write the image to `path`.
pub fn render_plot(values: &[f64], path: &Path) -> Result<()> {
    if values.is_empty() {
        return Err(SoundLogError::Plot("no values to plot".to_string()));
    }

    let mut img = RgbImage::from_pixel(PLOT_WIDTH, PLOT_HEIGHT, BACKGROUND);
    let frame = Frame::new(values);

    draw_grid(&mut img);
    draw_labels(&mut img, &frame, values);

    let points: Vec<(i64, i64)> = values
        .iter()
        .enumerate()
        .map(|(i, &v)| frame.project(i, v))
        .collect();
    for pair in points.windows(2) {
        draw_line(&mut img, pair[0], pair[1], SERIES);
    }
    for &(x, y) in &points {
        for dx in -MARKER_RADIUS..=MARKER_RADIUS {
            for dy in -MARKER_RADIUS..=MARKER_RADIUS {
                set_pixel(&mut img, x + dx, y + dy, SERIES);
            }
        }
    }

    img.save(path)
        .map_err(|e| SoundLogError::Plot(format!("{}: {}", path.display(), e)))?;
    tracing::debug!("Saved plot of {} values to {}", values.len(), path.display());
    Ok(())
}

/// Maps (index, value) pairs into pixel space.
struct Frame {
    count: usize,
    low: f64,
    high: f64,
}

impl Frame {
    fn new(values: &[f64]) -> Self {
        let (mut low, mut high) = data_range(values);
        if high - low < f64::EPSILON {
            low -= 1.0;
            high += 1.0;
        }
        let pad = (high - low) * 0.05;
        Self {
            count: values.len(),
            low: low - pad,
            high: high + pad,
        }
    }

    fn project(&self, index: usize, value: f64) -> (i64, i64) {
        let width = PLOT_WIDTH as i64 - 2 * MARGIN;
        let height = PLOT_HEIGHT as i64 - 2 * MARGIN;
        let x = if self.count > 1 {
            MARGIN + (index as i64 * width) / (self.count as i64 - 1)
        } else {
            MARGIN + width / 2
        };
        let frac = (self.high - value) / (self.high - self.low);
        let y = MARGIN + (frac * height as f64).round() as i64;
        (x, y)
    }
}

fn draw_grid(img: &mut RgbImage) {
    let (w, h) = (PLOT_WIDTH as i64, PLOT_HEIGHT as i64);
    for step in 0..=GRID_DIVISIONS {
        let x = MARGIN + step * (w - 2 * MARGIN) / GRID_DIVISIONS;
        let y = MARGIN + step * (h - 2 * MARGIN) / GRID_DIVISIONS;
        draw_line(img, (x, MARGIN), (x, h - MARGIN), GRID);
        draw_line(img, (MARGIN, y), (w - MARGIN, y), GRID);
    }
    draw_line(img, (MARGIN, MARGIN), (MARGIN, h - MARGIN), AXIS);
    draw_line(img, (MARGIN, h - MARGIN), (w - MARGIN, h - MARGIN), AXIS);
}

/// Title, axis names and the first/last index and min/max value ticks.
fn draw_labels(img: &mut RgbImage, frame: &Frame, values: &[f64]) {
    let (w, h) = (PLOT_WIDTH as i64, PLOT_HEIGHT as i64);

    draw_text(img, TITLE, (w - text_width(TITLE, 2)) / 2, 12, 2);
    draw_text(img, X_LABEL, (w - text_width(X_LABEL, 1)) / 2, h - MARGIN + 24, 1);
    draw_text(img, Y_LABEL, 4, MARGIN - 14, 1);

    let last = values.len() - 1;
    let first_x = frame.project(0, 0.0).0;
    let last_x = frame.project(last, 0.0).0;
    draw_text(img, "0", first_x - text_width("0", 1) / 2, h - MARGIN + 6, 1);
    let last_label = last.to_string();
    if last > 0 {
        draw_text(img, &last_label, last_x - text_width(&last_label, 1) / 2, h - MARGIN + 6, 1);
    }

    let (low, high) = data_range(values);
    for value in [low, high] {
        let label = tick_label(value);
        let y = frame.project(0, value).1;
        draw_text(img, &label, MARGIN - 4 - text_width(&label, 1), y - GLYPH_HEIGHT / 2, 1);
    }
}

fn data_range(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

fn tick_label(value: f64) -> String {
    if value.abs() >= 10.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}

// ── Text ──────────────────────────────────────────────────────────────────────

const GLYPH_WIDTH: i64 = 5;
const GLYPH_HEIGHT: i64 = 7;

/// Rows of a 5x7 glyph, top to bottom; bit 4 is the leftmost column.
/// Characters without a glyph render as blank space.
fn glyph(c: char) -> [u8; 7] {
    match c {
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'a' => [0x00, 0x00, 0x0E, 0x01, 0x0F, 0x11, 0x0F],
        'd' => [0x01, 0x01, 0x0D, 0x13, 0x11, 0x13, 0x0D],
        'e' => [0x00, 0x00, 0x0E, 0x11, 0x1F, 0x10, 0x0E],
        'g' => [0x00, 0x0F, 0x11, 0x11, 0x0F, 0x01, 0x0E],
        'i' => [0x04, 0x00, 0x0C, 0x04, 0x04, 0x04, 0x0E],
        'l' => [0x0C, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'n' => [0x00, 0x00, 0x16, 0x19, 0x11, 0x11, 0x11],
        'o' => [0x00, 0x00, 0x0E, 0x11, 0x11, 0x11, 0x0E],
        's' => [0x00, 0x00, 0x0F, 0x10, 0x0E, 0x01, 0x1E],
        'u' => [0x00, 0x00, 0x11, 0x11, 0x11, 0x13, 0x0D],
        'x' => [0x00, 0x00, 0x11, 0x0A, 0x04, 0x0A, 0x11],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        _ => [0; 7],
    }
}

/// Width in pixels of `text` at `scale`, with one column of spacing per glyph.
fn text_width(text: &str, scale: i64) -> i64 {
    let count = text.chars().count() as i64;
    if count == 0 {
        0
    } else {
        (count * (GLYPH_WIDTH + 1) - 1) * scale
    }
}

fn draw_text(img: &mut RgbImage, text: &str, left: i64, top: i64, scale: i64) {
    for (index, c) in text.chars().enumerate() {
        let origin = left + index as i64 * (GLYPH_WIDTH + 1) * scale;
        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        let x = origin + col * scale + dx;
                        let y = top + row as i64 * scale + dy;
                        set_pixel(img, x, y, TEXT);
                    }
                }
            }
        }
    }
}

/// Bresenham line between two pixel positions.
fn draw_line(img: &mut RgbImage, from: (i64, i64), to: (i64, i64), color: Rgb<u8>) {
    let (mut x, mut y) = from;
    let dx = (to.0 - x).abs();
    let dy = -(to.1 - y).abs();
    let sx = if x < to.0 { 1 } else { -1 };
    let sy = if y < to.1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        set_pixel(img, x, y, color);
        if x == to.0 && y == to.1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

fn set_pixel(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}
