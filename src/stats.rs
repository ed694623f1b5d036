//! Per-frame color statistics
//!
//! OpenCV hands out frames in B, G, R channel order. Everything downstream
//! of this module uses R, G, B, so the swap happens here and nowhere else.

use opencv::{core::{self, Mat}, prelude::*};
use tracing::trace;
use crate::common::{Result, CHANNELS};
use crate::series::FrameSample;

/// Mean and population standard deviation of each channel over all pixels
///
/// # Panics
/// Panics if the frame is empty or does not have exactly three channels.
pub fn frame_statistics(frame: &Mat, frame_index: u64) -> Result<FrameSample> {
    assert!(!frame.empty(), "Frame {} is empty", frame_index);
    assert_eq!(frame.channels(), CHANNELS as i32,
               "Frame {} must have {} channels, got {}",
               frame_index, CHANNELS, frame.channels());

    let mut mean = Mat::default();
    let mut stddev = Mat::default();
    core::mean_std_dev_def(frame, &mut mean, &mut stddev)?;

    let mean = bgr_to_rgb(read_channels(&mean)?);
    let std = bgr_to_rgb(read_channels(&stddev)?);

    trace!("Frame {}: mean={:?} std={:?}", frame_index, mean, std);
    Ok(FrameSample::new(frame_index, mean, std))
}

fn read_channels(values: &Mat) -> Result<[f64; CHANNELS]> {
    Ok([
        *values.at::<f64>(0)?,
        *values.at::<f64>(1)?,
        *values.at::<f64>(2)?,
    ])
}

/// Reorder a decoder-native B, G, R triple into R, G, B
pub fn bgr_to_rgb(values: [f64; CHANNELS]) -> [f64; CHANNELS] {
    [values[2], values[1], values[0]]
}
