//! Video stream handling using OpenCV backend
//!
//! This module wraps OpenCV's VideoCapture and exposes decoded frames as a
//! lazy, one-shot iterator. The capture handle is released when the stream
//! is dropped, whether iteration finished, was abandoned, or failed.

use opencv::{videoio, core::Mat, prelude::*};
use tracing::{instrument, debug, trace, warn, info};
use std::iter::FusedIterator;
use std::path::Path;
use crate::common::{Result, ColorSignalError};

/// Wrapper around OpenCV VideoCapture for sequential frame reads
pub struct VideoStream {
    cap: videoio::VideoCapture,
    fps: f64,
    frame_count: i64,
    current_frame: u64,
    width: i32,
    height: i32,
    path: String,
}

impl VideoStream {
    /// Open a video file for reading
    ///
    /// # Errors
    /// * `VideoNotFound` - If the file doesn't exist
    /// * `VideoOpenFailed` - If OpenCV can't open the file
    /// * `InvalidVideoFormat` - If fps or frame dimensions are unusable
    #[instrument(skip(path), fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self> {
        let path_str = path.to_string_lossy().into_owned();
        info!("Opening video stream: {}", path_str);

        if !path.is_file() {
            return Err(ColorSignalError::VideoNotFound { path: path_str });
        }

        let cap = videoio::VideoCapture::from_file(&path_str, videoio::CAP_ANY)
            .map_err(|e| {
                warn!("Failed to create VideoCapture: {}", e);
                ColorSignalError::VideoOpenFailed { path: path_str.clone() }
            })?;

        let is_opened = cap.is_opened().map_err(|e| {
            warn!("Failed to check if VideoCapture is opened: {}", e);
            ColorSignalError::VideoOpenFailed { path: path_str.clone() }
        })?;

        if !is_opened {
            return Err(ColorSignalError::VideoOpenFailed { path: path_str });
        }

        let property = |id: i32, name: &str| {
            cap.get(id).map_err(|e| {
                warn!("Failed to get video {}: {}", name, e);
                ColorSignalError::InvalidVideoFormat { path: path_str.clone() }
            })
        };

        let fps = property(videoio::CAP_PROP_FPS, "fps")?;
        let frame_count = property(videoio::CAP_PROP_FRAME_COUNT, "frame count")? as i64;
        let width = property(videoio::CAP_PROP_FRAME_WIDTH, "width")? as i32;
        let height = property(videoio::CAP_PROP_FRAME_HEIGHT, "height")? as i32;

        if fps <= 0.0 || width <= 0 || height <= 0 {
            return Err(ColorSignalError::InvalidVideoFormat { path: path_str });
        }

        // Only used for progress totals, so an unknown count is tolerated
        if frame_count <= 0 {
            warn!("Container reports no frame count for {}", path_str);
        }

        info!("Video opened successfully - FPS: {}, Frames: {}, Size: {}x{}",
              fps, frame_count, width, height);

        Ok(Self {
            cap,
            fps,
            frame_count: frame_count.max(0),
            current_frame: 0,
            width,
            height,
            path: path_str,
        })
    }

    /// Read the next frame from the video
    ///
    /// Returns `None` at end of stream.
    pub fn read_frame(&mut self) -> Result<Option<Mat>> {
        let mut frame = Mat::default();

        let success = self.cap.read(&mut frame).map_err(|e| {
            ColorSignalError::frame_error(
                self.current_frame,
                format!("OpenCV read failed: {}", e)
            )
        })?;

        if success && !frame.empty() {
            if frame.rows() != self.height || frame.cols() != self.width {
                return Err(ColorSignalError::frame_error(
                    self.current_frame,
                    format!("Frame size {}x{} differs from stream size {}x{}",
                            frame.cols(), frame.rows(), self.width, self.height),
                ));
            }

            self.current_frame += 1;
            trace!("Read frame {}/{}", self.current_frame, self.frame_count);
            Ok(Some(frame))
        } else {
            debug!("Reached end of video at frame {}", self.current_frame);
            Ok(None)
        }
    }

    /// Consume the stream into an iterator over every `stride`-th frame
    ///
    /// # Panics
    /// Panics if stride is 0
    pub fn into_frames(self, stride: u32) -> FrameIter {
        FrameIter::new(self, stride)
    }

    /// Get the video framerate
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Get the frame count reported by the container (0 if unknown)
    pub fn frame_count(&self) -> u64 {
        self.frame_count as u64
    }

    /// Number of frames read so far
    pub fn current_frame(&self) -> u64 {
        self.current_frame
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Get the video duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.frame_count as f64 / self.fps
    }
}

impl Drop for VideoStream {
    fn drop(&mut self) {
        match self.cap.release() {
            Ok(()) => debug!("Released video capture for {}", self.path),
            Err(e) => warn!("Failed to release video capture for {}: {}", self.path, e),
        }
    }
}

// Implement Debug manually to avoid showing internal OpenCV state
impl std::fmt::Debug for VideoStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoStream")
            .field("path", &self.path)
            .field("fps", &self.fps)
            .field("frame_count", &self.frame_count)
            .field("current_frame", &self.current_frame)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// One-shot iterator over decoded frames, keeping every `stride`-th one
///
/// Every frame is decoded; only those whose raw position is a multiple of
/// the stride are emitted, numbered consecutively from 0. Once the stream
/// ends or an error is yielded the iterator stays exhausted.
#[derive(Debug)]
pub struct FrameIter {
    stream: Option<VideoStream>,
    stride: u64,
    raw_position: u64,
    emitted: u64,
}

impl FrameIter {
    fn new(stream: VideoStream, stride: u32) -> Self {
        assert!(stride > 0, "Stride must be positive, got: {}", stride);
        Self {
            stream: Some(stream),
            stride: stride as u64,
            raw_position: 0,
            emitted: 0,
        }
    }

    /// Open `path` and iterate every `stride`-th frame
    pub fn open(path: &Path, stride: u32) -> Result<Self> {
        Ok(VideoStream::open(path)?.into_frames(stride))
    }

    /// The underlying stream, or `None` once exhausted
    pub fn stream(&self) -> Option<&VideoStream> {
        self.stream.as_ref()
    }

    /// Whether the iterator has released its decoder
    pub fn is_exhausted(&self) -> bool {
        self.stream.is_none()
    }

    fn finish(&mut self) {
        // Dropping the stream releases the capture right away
        self.stream = None;
    }
}

impl Iterator for FrameIter {
    type Item = Result<(u64, Mat)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let stream = self.stream.as_mut()?;
            match stream.read_frame() {
                Ok(Some(frame)) => {
                    let position = self.raw_position;
                    self.raw_position += 1;
                    if position % self.stride != 0 {
                        continue;
                    }
                    let local_index = self.emitted;
                    self.emitted += 1;
                    return Some(Ok((local_index, frame)));
                }
                Ok(None) => {
                    debug!("Frame iterator exhausted after {} emitted frames", self.emitted);
                    self.finish();
                    return None;
                }
                Err(e) => {
                    self.finish();
                    return Some(Err(e));
                }
            }
        }
    }
}

impl FusedIterator for FrameIter {}

/// Expected number of emitted frames for `stride`, from the container's count
///
/// Only suitable for progress totals; the real count may differ.
#[instrument]
pub fn estimate_sample_count(path: &Path, stride: u32) -> Result<u64> {
    assert!(stride > 0, "Stride must be positive, got: {}", stride);
    let stream = VideoStream::open(path)?;
    Ok(stream.frame_count() / stride as u64)
}
