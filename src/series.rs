//! Per-frame samples and the time series built from them
//!
//! A series exists in two interchangeable shapes: row form
//! ([`ColorSeries`], one [`FrameSample`] per sampled frame) and column form
//! ([`ColumnSeries`], parallel arrays per channel). The column form is what
//! gets persisted, smoothed and plotted.

use opencv::core::Mat;
use serde::{Deserialize, Serialize};
use tracing::{instrument, debug, info, trace};
use crate::common::{Result, Statistic, CHANNELS};
use crate::stats::frame_statistics;

/// Color statistics of one decoded frame, channels in R, G, B order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSample {
    frame_index: u64,
    mean: [f64; CHANNELS],
    std: [f64; CHANNELS],
}

impl FrameSample {
    pub fn new(frame_index: u64, mean: [f64; CHANNELS], std: [f64; CHANNELS]) -> Self {
        Self { frame_index, mean, std }
    }

    /// Index of the frame in the original video
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn mean(&self) -> [f64; CHANNELS] {
        self.mean
    }

    pub fn std(&self) -> [f64; CHANNELS] {
        self.std
    }
}

/// Row-form series ordered by strictly increasing frame index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorSeries {
    samples: Vec<FrameSample>,
}

impl ColorSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample
    ///
    /// # Panics
    /// Panics if the frame index does not increase
    pub fn push(&mut self, sample: FrameSample) {
        if let Some(last) = self.samples.last() {
            assert!(sample.frame_index > last.frame_index,
                    "Frame indices must strictly increase: {} after {}",
                    sample.frame_index, last.frame_index);
        }
        self.samples.push(sample);
    }

    pub fn samples(&self) -> &[FrameSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Convert to struct-of-arrays form
    pub fn into_columns(self) -> ColumnSeries {
        let len = self.samples.len();
        let mut columns = ColumnSeries {
            frame_nums: Vec::with_capacity(len),
            means: std::array::from_fn(|_| Vec::with_capacity(len)),
            stds: std::array::from_fn(|_| Vec::with_capacity(len)),
        };

        for sample in self.samples {
            columns.frame_nums.push(sample.frame_index);
            for channel in 0..CHANNELS {
                columns.means[channel].push(sample.mean[channel]);
                columns.stds[channel].push(sample.std[channel]);
            }
        }

        columns
    }
}

impl FromIterator<FrameSample> for ColorSeries {
    fn from_iter<I: IntoIterator<Item = FrameSample>>(iter: I) -> Self {
        let mut series = ColorSeries::new();
        for sample in iter {
            series.push(sample);
        }
        series
    }
}

/// Column-form series, the persisted and plotted representation
///
/// `means[c][i]` and `stds[c][i]` belong to frame `frame_nums[i]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnSeries {
    pub means: [Vec<f64>; CHANNELS],
    pub stds: [Vec<f64>; CHANNELS],
    pub frame_nums: Vec<u64>,
}

impl ColumnSeries {
    pub fn len(&self) -> usize {
        self.frame_nums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frame_nums.is_empty()
    }

    /// Channel columns for one statistic
    pub fn channels(&self, statistic: Statistic) -> &[Vec<f64>; CHANNELS] {
        match statistic {
            Statistic::Mean => &self.means,
            Statistic::Std => &self.stds,
        }
    }

    /// Check the series invariants, describing the first violation found
    pub fn validate(&self) -> std::result::Result<(), String> {
        let len = self.frame_nums.len();
        for (name, columns) in [("means", &self.means), ("stds", &self.stds)] {
            for (channel, values) in columns.iter().enumerate() {
                if values.len() != len {
                    return Err(format!(
                        "{}[{}] has {} values but frame_nums has {}",
                        name, channel, values.len(), len
                    ));
                }
            }
        }

        if let Some(pos) = self.frame_nums.windows(2).position(|w| w[1] <= w[0]) {
            return Err(format!(
                "frame_nums not strictly increasing at position {} ({} then {})",
                pos + 1, self.frame_nums[pos], self.frame_nums[pos + 1]
            ));
        }

        Ok(())
    }

    /// Convert back to row form, rejecting malformed columns
    pub fn to_series(&self) -> std::result::Result<ColorSeries, String> {
        self.validate()?;
        let samples = (0..self.len())
            .map(|i| FrameSample::new(
                self.frame_nums[i],
                std::array::from_fn(|c| self.means[c][i]),
                std::array::from_fn(|c| self.stds[c][i]),
            ))
            .collect();
        Ok(ColorSeries { samples })
    }
}

impl From<ColorSeries> for ColumnSeries {
    fn from(series: ColorSeries) -> Self {
        series.into_columns()
    }
}

impl TryFrom<ColumnSeries> for ColorSeries {
    type Error = String;

    fn try_from(columns: ColumnSeries) -> std::result::Result<Self, Self::Error> {
        columns.to_series()
    }
}

/// Receives progress updates while a series is being built
///
/// Implementations must not panic; progress is informational only.
pub trait ProgressObserver {
    fn update(&mut self, completed: u64, expected: u64);
}

/// Progress observer that logs through `tracing` at every 10% step
#[derive(Debug, Default)]
pub struct LogProgress {
    last_decile: u64,
}

impl ProgressObserver for LogProgress {
    fn update(&mut self, completed: u64, expected: u64) {
        trace!("Sampled {}/{} frames", completed, expected);
        if expected == 0 {
            return;
        }
        // The expected total is an estimate and may be exceeded
        let shown = completed.min(expected);
        let decile = shown * 10 / expected;
        if decile > self.last_decile {
            self.last_decile = decile;
            info!("Sampling progress: {}/{} ({}%)", shown, expected, decile * 10);
        }
    }
}

/// Observer that ignores all updates
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn update(&mut self, _completed: u64, _expected: u64) {}
}

/// Accumulates frame statistics into a [`ColorSeries`]
pub struct SeriesBuilder<P: ProgressObserver = LogProgress> {
    series: ColorSeries,
    expected_total: u64,
    progress: P,
}

impl SeriesBuilder<LogProgress> {
    /// Builder reporting progress to the log against `expected_total`
    pub fn new(expected_total: u64) -> Self {
        Self::with_progress(expected_total, LogProgress::default())
    }
}

impl<P: ProgressObserver> SeriesBuilder<P> {
    pub fn with_progress(expected_total: u64, progress: P) -> Self {
        debug!("Building series, expecting about {} samples", expected_total);
        Self {
            series: ColorSeries::new(),
            expected_total,
            progress,
        }
    }

    /// Append one sample and report progress
    pub fn push(&mut self, sample: FrameSample) {
        self.series.push(sample);
        self.progress.update(self.series.len() as u64, self.expected_total);
    }

    /// Measure each `(frame_index, frame)` pair in order until the input ends
    ///
    /// Indices may have irregular gaps but must strictly increase. The first
    /// error stops consumption and is returned.
    #[instrument(skip(self, frames))]
    pub fn extend_from_frames<I>(&mut self, frames: I) -> Result<()>
    where
        I: IntoIterator<Item = Result<(u64, Mat)>>,
    {
        for item in frames {
            let (frame_index, frame) = item?;
            let sample = frame_statistics(&frame, frame_index)?;
            self.push(sample);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn expected_total(&self) -> u64 {
        self.expected_total
    }

    pub fn progress(&self) -> &P {
        &self.progress
    }

    pub fn finish(self) -> ColorSeries {
        info!("Series complete with {} samples (expected about {})",
              self.series.len(), self.expected_total);
        self.series
    }

    /// Finish and convert to column form
    pub fn into_columns(self) -> ColumnSeries {
        self.finish().into_columns()
    }
}
