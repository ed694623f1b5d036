//! Temporal median filtering of column-form series
//!
//! Each of the six columns (mean and std for three channels) is filtered
//! independently. Windows near the ends of the series slide inward and keep
//! their full length, so a window at least as long as the series always
//! covers all of it.
//!
//! Shrinking, replicating or reflecting the edges would not give that
//! guarantee: each weights the boundary samples differently per position, so
//! a long window would no longer reduce to the median of the whole series.

use tracing::{instrument, debug};
use crate::common::{Statistic, CHANNELS};
use crate::series::ColumnSeries;

/// Window length used when none is configured, in samples
pub const DEFAULT_WINDOW: usize = 500;

/// A series whose columns have been median filtered
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothedSeries {
    window: usize,
    series: ColumnSeries,
}

impl SmoothedSeries {
    /// Window length the series was filtered with
    pub fn window(&self) -> usize {
        self.window
    }

    pub fn series(&self) -> &ColumnSeries {
        &self.series
    }

    pub fn channels(&self, statistic: Statistic) -> &[Vec<f64>; CHANNELS] {
        self.series.channels(statistic)
    }

    pub fn into_inner(self) -> ColumnSeries {
        self.series
    }
}

/// Median filter every column of `series` with a window of `window` samples
///
/// # Panics
/// Panics if window is 0
#[instrument(skip(series), fields(samples = series.len()))]
pub fn smooth(series: &ColumnSeries, window: usize) -> SmoothedSeries {
    assert!(window > 0, "Smoothing window must be positive, got: {}", window);

    let filtered = ColumnSeries {
        means: std::array::from_fn(|c| median_filter(&series.means[c], window)),
        stds: std::array::from_fn(|c| median_filter(&series.stds[c], window)),
        frame_nums: series.frame_nums.clone(),
    };

    debug!("Smoothed {} samples with window {}", series.len(), window);
    SmoothedSeries { window, series: filtered }
}

/// Sliding-window median of `values`
///
/// For position `i` the window holds `min(window, len)` values starting at
/// `i - window / 2`, shifted to stay inside the slice. Even-length windows
/// use the mean of the two middle values.
///
/// # Panics
/// Panics if window is 0
pub fn median_filter(values: &[f64], window: usize) -> Vec<f64> {
    assert!(window > 0, "Smoothing window must be positive, got: {}", window);

    let len = values.len();
    let span = window.min(len);
    let mut scratch = Vec::with_capacity(span);

    (0..len)
        .map(|i| {
            let start = window_start(i, window, len);
            scratch.clear();
            scratch.extend_from_slice(&values[start..start + span]);
            median(&mut scratch)
        })
        .collect()
}

/// First index of the window centred on `i`
fn window_start(i: usize, window: usize, len: usize) -> usize {
    let span = window.min(len);
    i.saturating_sub(window / 2).min(len - span)
}

/// Median of a non-empty buffer, reordering it in place
fn median(values: &mut [f64]) -> f64 {
    let len = values.len();
    let (lower, upper, _) = values.select_nth_unstable_by(len / 2, f64::total_cmp);
    let upper = *upper;
    if len % 2 == 1 {
        return upper;
    }
    let lower_max = lower.iter().copied().max_by(f64::total_cmp).unwrap_or(upper);
    (lower_max + upper) / 2.0
}
