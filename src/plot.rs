//! Line charts of per-channel series, drawn with OpenCV primitives
//!
//! Channel 0 is always drawn as "Red", 1 as "Green" and 2 as "Blue". The
//! series coming out of the extractor are already in that order.

use std::path::Path;
use opencv::{
    core::{Mat, Point, Rect, Scalar, Vector, CV_8UC3},
    imgcodecs, imgproc,
    prelude::*,
};
use tracing::{instrument, debug};
use crate::common::{Result, ColorSignalError, Statistic, CHANNELS, CHANNEL_NAMES};
use crate::series::ColumnSeries;

const MARGIN_LEFT: i32 = 90;
const MARGIN_RIGHT: i32 = 30;
const MARGIN_TOP: i32 = 50;
const MARGIN_BOTTOM: i32 = 70;
const TICKS: i32 = 5;
const FONT: i32 = imgproc::FONT_HERSHEY_SIMPLEX;

/// Canvas settings for rendered charts
#[derive(Debug, Clone, PartialEq)]
pub struct PlotOptions {
    pub width: i32,
    pub height: i32,
    pub line_thickness: i32,
}

impl Default for PlotOptions {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 600,
            line_thickness: 1,
        }
    }
}

impl PlotOptions {
    fn validate(&self) {
        assert!(self.width > MARGIN_LEFT + MARGIN_RIGHT && self.height > MARGIN_TOP + MARGIN_BOTTOM,
                "Plot canvas {}x{} is too small", self.width, self.height);
        assert!(self.line_thickness > 0, "Line thickness must be positive");
    }
}

/// BGR drawing color for a channel position
fn channel_color(channel: usize) -> Scalar {
    match channel {
        0 => Scalar::new(0.0, 0.0, 220.0, 0.0),
        1 => Scalar::new(0.0, 160.0, 0.0, 0.0),
        _ => Scalar::new(220.0, 0.0, 0.0, 0.0),
    }
}

fn black() -> Scalar {
    Scalar::all(0.0)
}

/// Linear mapping from data coordinates onto the plotting area
#[derive(Debug, Clone, PartialEq)]
struct Axes {
    x_range: (f64, f64),
    y_range: (f64, f64),
    area: Rect,
}

impl Axes {
    fn new(frame_nums: &[u64], channels: &[Vec<f64>; CHANNELS], options: &PlotOptions) -> Self {
        let x_range = padded_range(frame_nums.iter().map(|&f| f as f64));
        let y_range = padded_range(channels.iter().flatten().copied());
        let area = Rect::new(
            MARGIN_LEFT,
            MARGIN_TOP,
            options.width - MARGIN_LEFT - MARGIN_RIGHT,
            options.height - MARGIN_TOP - MARGIN_BOTTOM,
        );
        Self { x_range, y_range, area }
    }

    fn to_pixel(&self, x: f64, y: f64) -> Point {
        let fx = (x - self.x_range.0) / (self.x_range.1 - self.x_range.0);
        let fy = (y - self.y_range.0) / (self.y_range.1 - self.y_range.0);
        Point::new(
            self.area.x + (fx * self.area.width as f64).round() as i32,
            self.area.y + self.area.height - (fy * self.area.height as f64).round() as i32,
        )
    }
}

/// Min and max of the finite values, widened when degenerate
fn padded_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (min, max) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));

    if min > max {
        (0.0, 1.0)
    } else if min == max {
        (min - 1.0, max + 1.0)
    } else {
        (min, max)
    }
}

fn format_tick(value: f64, span: f64) -> String {
    if span >= 50.0 || value.abs() >= 1000.0 {
        format!("{:.0}", value)
    } else if span >= 5.0 {
        format!("{:.1}", value)
    } else {
        format!("{:.2}", value)
    }
}

fn text(canvas: &mut Mat, content: &str, origin: Point, scale: f64) -> Result<()> {
    imgproc::put_text(canvas, content, origin, FONT, scale, black(), 1, imgproc::LINE_AA, false)?;
    Ok(())
}

fn draw_frame(canvas: &mut Mat, axes: &Axes, y_label: &str) -> Result<()> {
    let area = axes.area;
    imgproc::rectangle(canvas, area, black(), 1, imgproc::LINE_8, 0)?;

    let (x0, x1) = axes.x_range;
    let (y0, y1) = axes.y_range;
    for tick in 0..=TICKS {
        let t = tick as f64 / TICKS as f64;

        let x_value = x0 + t * (x1 - x0);
        let px = axes.to_pixel(x_value, y0);
        imgproc::line(canvas, px, Point::new(px.x, px.y + 6), black(), 1, imgproc::LINE_8, 0)?;
        text(canvas, &format_tick(x_value, x1 - x0), Point::new(px.x - 15, px.y + 22), 0.4)?;

        let y_value = y0 + t * (y1 - y0);
        let py = axes.to_pixel(x0, y_value);
        imgproc::line(canvas, py, Point::new(py.x - 6, py.y), black(), 1, imgproc::LINE_8, 0)?;
        text(canvas, &format_tick(y_value, y1 - y0), Point::new(8, py.y + 4), 0.4)?;
    }

    text(canvas, "Frame Number",
         Point::new(area.x + area.width / 2 - 50, area.y + area.height + 55), 0.6)?;
    text(canvas, y_label, Point::new(8, MARGIN_TOP - 20), 0.6)?;
    Ok(())
}

fn draw_series(canvas: &mut Mat, axes: &Axes, frame_nums: &[u64], values: &[f64],
               color: Scalar, thickness: i32) -> Result<()> {
    let points: Vec<Option<Point>> = frame_nums
        .iter()
        .zip(values)
        .map(|(&x, &y)| y.is_finite().then(|| axes.to_pixel(x as f64, y)))
        .collect();

    if let [Some(only)] = points.as_slice() {
        imgproc::circle(canvas, *only, 2, color, imgproc::FILLED, imgproc::LINE_AA, 0)?;
    }

    for pair in points.windows(2) {
        if let [Some(from), Some(to)] = pair {
            imgproc::line(canvas, *from, *to, color, thickness, imgproc::LINE_AA, 0)?;
        }
    }
    Ok(())
}

fn draw_legend(canvas: &mut Mat, axes: &Axes, label: &str) -> Result<()> {
    let x = axes.area.x + axes.area.width - 170;
    for channel in 0..CHANNELS {
        let y = axes.area.y + 20 + channel as i32 * 20;
        imgproc::line(canvas, Point::new(x, y - 4), Point::new(x + 25, y - 4),
                      channel_color(channel), 2, imgproc::LINE_AA, 0)?;
        text(canvas, &format!("{} {}", CHANNEL_NAMES[channel], label), Point::new(x + 32, y), 0.45)?;
    }
    Ok(())
}

/// Render three channel curves against frame numbers and write an image
///
/// The image format follows the extension of `path`. An existing file is
/// overwritten.
///
/// # Errors
/// * `PlotFailed` - If the image can't be encoded or written
///
/// # Panics
/// Panics if any channel length differs from `frame_nums`
#[instrument(skip(frame_nums, channels, options), fields(path = %path.display(), points = frame_nums.len()))]
pub fn plot_channels(
    frame_nums: &[u64],
    channels: &[Vec<f64>; CHANNELS],
    label: &str,
    y_label: &str,
    path: &Path,
    options: &PlotOptions,
) -> Result<()> {
    for (channel, values) in channels.iter().enumerate() {
        assert_eq!(values.len(), frame_nums.len(),
                   "Channel {} has {} values for {} frames",
                   channel, values.len(), frame_nums.len());
    }
    options.validate();

    let mut canvas = Mat::new_rows_cols_with_default(
        options.height, options.width, CV_8UC3, Scalar::all(255.0))?;
    let axes = Axes::new(frame_nums, channels, options);

    draw_frame(&mut canvas, &axes, y_label)?;
    for (channel, values) in channels.iter().enumerate() {
        draw_series(&mut canvas, &axes, frame_nums, values,
                    channel_color(channel), options.line_thickness)?;
    }
    draw_legend(&mut canvas, &axes, label)?;

    write_image(&canvas, path)?;
    debug!("Wrote chart {}", path.display());
    Ok(())
}

/// Render one statistic of a column series
pub fn plot_statistic(
    series: &ColumnSeries,
    statistic: Statistic,
    label: &str,
    path: &Path,
    options: &PlotOptions,
) -> Result<()> {
    plot_channels(&series.frame_nums, series.channels(statistic), label,
                  statistic.axis_label(), path, options)
}

fn write_image(canvas: &Mat, path: &Path) -> Result<()> {
    let path_str = path.to_string_lossy();
    let plot_error = |reason: String| ColorSignalError::PlotFailed {
        path: path_str.to_string(),
        reason,
    };

    let written = imgcodecs::imwrite(&path_str, canvas, &Vector::<i32>::new())
        .map_err(|e| plot_error(e.to_string()))?;
    if !written {
        return Err(plot_error("image encoder reported failure".to_string()));
    }
    Ok(())
}
