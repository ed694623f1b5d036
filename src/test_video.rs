//! Synthetic videos for tests that need real decoding
//!
//! Everything here goes through OpenCV's built-in Motion JPEG writer, so no
//! external encoder has to be installed.

use std::path::Path;
use opencv::{core::{Mat, Scalar, Size, CV_8UC3}, videoio, prelude::*};
use crate::common::Result;
use crate::transcode::Transcoder;
use crate::video_stream::FrameIter;

pub const WIDTH: i32 = 64;
pub const HEIGHT: i32 = 48;
pub const FPS: f64 = 10.0;

fn open_writer(path: &Path) -> Result<videoio::VideoWriter> {
    let fourcc = videoio::VideoWriter::fourcc('M', 'J', 'P', 'G')?;
    let writer = videoio::VideoWriter::new_with_backend(
        &path.to_string_lossy(),
        videoio::CAP_OPENCV_MJPEG,
        fourcc,
        FPS,
        Size::new(WIDTH, HEIGHT),
        true,
    )?;
    assert!(writer.is_opened()?, "Could not open MJPEG writer for {}", path.display());
    Ok(writer)
}

/// Write one solid frame per BGR color in `colors`
pub fn write_solid_video(path: &Path, colors: &[Scalar]) -> Result<()> {
    let mut writer = open_writer(path)?;
    for color in colors {
        let frame = Mat::new_rows_cols_with_default(HEIGHT, WIDTH, CV_8UC3, *color)?;
        writer.write(&frame)?;
    }
    writer.release()?;
    Ok(())
}

/// Keeps every Nth frame by decoding and re-encoding in process
#[derive(Debug, Default, Clone, Copy)]
pub struct InProcessTranscoder;

impl Transcoder for InProcessTranscoder {
    fn transcode(&self, src: &Path, dst: &Path, stride: u32) -> Result<()> {
        let mut writer = open_writer(dst)?;
        for item in FrameIter::open(src, stride)? {
            let (_, frame) = item?;
            writer.write(&frame)?;
        }
        writer.release()?;
        Ok(())
    }
}

/// Whether two channel values agree within MJPEG rounding
pub fn close(actual: f64, expected: f64) -> bool {
    (actual - expected).abs() < 4.0
}
