//! Common types, utilities, and error handling for the color signal library.
//!
//! This module provides the foundational types used throughout the codebase:
//! channel conventions, the statistic selector, and the error taxonomy shared
//! by every pipeline stage.

use std::path::Path;

/// Number of color channels carried by every sample
pub const CHANNELS: usize = 3;

/// Display names for the channels, in storage order (R, G, B)
pub const CHANNEL_NAMES: [&str; CHANNELS] = ["Red", "Green", "Blue"];

/// Which per-channel statistic a column set holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statistic {
    Mean,
    Std,
}

impl Statistic {
    /// Short label used in chart legends
    pub fn label(&self) -> &'static str {
        match self {
            Statistic::Mean => "Mean",
            Statistic::Std => "Std",
        }
    }

    /// Y-axis caption used in charts
    pub fn axis_label(&self) -> &'static str {
        match self {
            Statistic::Mean => "Mean Color Value",
            Statistic::Std => "Standard Deviation of Color Value",
        }
    }

    /// File stem used for rendered charts
    pub fn file_stem(&self) -> &'static str {
        match self {
            Statistic::Mean => "mean_color",
            Statistic::Std => "std_color",
        }
    }
}

/// Coarse classification of failures, used by callers deciding on policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Source media missing or unopenable
    Acquisition,
    /// The external transcoder failed
    ExternalProcess,
    /// A persisted series is absent
    NotFound,
    /// A persisted series is malformed
    Format,
    /// Filesystem or rendering I/O failed
    Io,
    /// Invalid user-supplied configuration
    Config,
    /// Decoder or OpenCV internals failed
    Decode,
}

/// All possible errors from the color signal pipeline
///
/// Contract violations (wrong channel count, zero smoothing window, out of
/// order samples) are not represented here; they panic.
#[derive(Debug, thiserror::Error)]
pub enum ColorSignalError {
    #[error("Video file not found: {path}")]
    VideoNotFound { path: String },

    #[error("Failed to open video file: {path}")]
    VideoOpenFailed { path: String },

    #[error("Invalid video format or corrupted file: {path}")]
    InvalidVideoFormat { path: String },

    #[error("Invalid media metadata in {path}: {reason}")]
    InvalidMetadata { path: String, reason: String },

    #[error("Transcoding with {program} failed: {reason}")]
    TranscodeFailed { program: String, reason: String },

    #[error("Series file not found: {path}")]
    SeriesNotFound { path: String },

    #[error("Invalid series file {path}: {reason}")]
    InvalidSeries { path: String, reason: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("OpenCV error: {0}")]
    OpenCv(#[from] opencv::Error),

    #[error("Frame processing failed at frame {frame}: {reason}")]
    FrameProcessingFailed { frame: u64, reason: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Failed to render plot {path}: {reason}")]
    PlotFailed { path: String, reason: String },
}

impl ColorSignalError {
    /// Create a configuration error with a descriptive message
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::InvalidConfig { message: message.into() }
    }

    /// Create a frame processing error
    pub fn frame_error(frame: u64, reason: impl Into<String>) -> Self {
        Self::FrameProcessingFailed {
            frame,
            reason: reason.into()
        }
    }

    /// Create a transcoding error for the given program
    pub fn transcode_error(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TranscodeFailed {
            program: program.into(),
            reason: reason.into(),
        }
    }

    /// Create a series format error for the given file
    pub fn format_error(path: &Path, reason: impl Into<String>) -> Self {
        Self::InvalidSeries {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }

    /// Wrap an I/O error with the path it happened on
    pub fn io_error(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    /// Which part of the error taxonomy this error belongs to
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::VideoNotFound { .. }
            | Self::VideoOpenFailed { .. }
            | Self::InvalidVideoFormat { .. }
            | Self::InvalidMetadata { .. } => ErrorCategory::Acquisition,
            Self::TranscodeFailed { .. } => ErrorCategory::ExternalProcess,
            Self::SeriesNotFound { .. } => ErrorCategory::NotFound,
            Self::InvalidSeries { .. } => ErrorCategory::Format,
            Self::Io { .. } | Self::PlotFailed { .. } => ErrorCategory::Io,
            Self::InvalidConfig { .. } => ErrorCategory::Config,
            Self::OpenCv(_) | Self::FrameProcessingFailed { .. } => ErrorCategory::Decode,
        }
    }
}

/// Convenient Result type for color signal operations
pub type Result<T> = std::result::Result<T, ColorSignalError>;
