//! Color activity signal extraction for videos
//!
//! This crate samples a video at a reduced frame rate, measures the mean and
//! standard deviation of each color channel for every sampled frame, stores
//! the resulting time series, and median-filters it so that content changes
//! stand out from frame-level noise.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use colorsignal::{analyze_video, ColorSignalPipeline, PipelineConfig};
//!
//! // One sample per second, results under ./video_info
//! let report = analyze_video(Path::new("video.mp4"), Path::new("video_info"))?;
//! println!("{} samples (cache hit: {})", report.series.len(), report.cache_hit);
//!
//! // Custom stride and window
//! let config = PipelineConfig { stride: Some(15), window: 101, ..PipelineConfig::new("out") };
//! let pipeline = ColorSignalPipeline::new(config)?;
//! let series = pipeline.extract(Path::new("video.mp4"))?;
//! # Ok::<(), colorsignal::ColorSignalError>(())
//! ```

mod common;
mod video_stream;
mod transcode;
mod sampler;
mod stats;
mod series;
mod store;
mod smoother;
mod plot;
mod media;
mod pipeline;
#[cfg(test)]
mod test_video;

// Re-export main types for public API
pub use common::{ColorSignalError, ErrorCategory, Result, Statistic, CHANNELS, CHANNEL_NAMES};
pub use video_stream::{estimate_sample_count, FrameIter, VideoStream};
pub use transcode::{FfmpegTranscoder, Transcoder};
pub use sampler::{max_samples, original_index, SampledFrames};
pub use stats::{bgr_to_rgb, frame_statistics};
pub use series::{
    ColorSeries, ColumnSeries, FrameSample, LogProgress, NoProgress, ProgressObserver, SeriesBuilder,
};
pub use store::{load, save, exists, CachePolicy, ExistencePolicy, ModifiedAfterSourcePolicy};
pub use smoother::{median_filter, smooth, SmoothedSeries, DEFAULT_WINDOW};
pub use plot::{plot_channels, plot_statistic, PlotOptions};
pub use media::{read_metadata, MediaBundle, VideoMetadata};
pub use pipeline::{stride_for_fps, ColorSignalPipeline, PipelineConfig, PipelineReport};

use std::path::Path;
use tracing::{instrument, info};

/// Run the full pipeline with default settings
///
/// Uses `ffmpeg` from `PATH`, one sample per second of video, a 500-sample
/// median window and the existence cache policy.
#[instrument]
pub fn analyze_video(video_path: &Path, output_dir: &Path) -> Result<PipelineReport> {
    let pipeline = ColorSignalPipeline::new(PipelineConfig::new(output_dir))?;
    pipeline.run(video_path)
}

/// Get video information without sampling anything
#[instrument]
pub fn get_video_info(video_path: &Path) -> Result<VideoInfo> {
    let video_stream = VideoStream::open(video_path)?;

    Ok(VideoInfo {
        path: video_path.display().to_string(),
        fps: video_stream.fps(),
        frame_count: video_stream.frame_count(),
        width: video_stream.width() as u32,
        height: video_stream.height() as u32,
        duration_seconds: video_stream.duration_seconds(),
    })
}

/// Video metadata information
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub path: String,
    pub fps: f64,
    pub frame_count: u64,
    pub width: u32,
    pub height: u32,
    pub duration_seconds: f64,
}

impl VideoInfo {
    /// Get a human-readable description of the video
    pub fn description(&self) -> String {
        format!(
            "{}x{} at {:.2}fps, {} frames ({:.1}s duration)",
            self.width, self.height, self.fps, self.frame_count, self.duration_seconds
        )
    }

    /// Stride that yields one sample per second of this video
    pub fn default_stride(&self) -> u32 {
        stride_for_fps(self.fps)
    }

    /// Expected sample count at `stride`
    pub fn expected_samples(&self, stride: u32) -> u64 {
        assert!(stride > 0, "Stride must be positive, got: {}", stride);
        self.frame_count / stride as u64
    }

    /// Check if this appears to be a valid video configuration
    pub fn is_valid(&self) -> bool {
        self.fps > 0.0
            && self.frame_count > 0
            && self.width > 0
            && self.height > 0
            && self.duration_seconds > 0.0
    }
}

/// Initialize tracing for the library
///
/// `RUST_LOG` takes precedence over `level` when set.
///
/// # Arguments
/// * `level` - Tracing level filter (e.g., "debug", "info", "warn", "error")
pub fn init_tracing(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Color signal library initialized with tracing level: {}", level);
}
