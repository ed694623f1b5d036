//! External downsampling through an ffmpeg child process
//!
//! The frame selection happens inside the transcoder so that the decoder
//! downstream only ever sees the frames that will be measured.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{instrument, debug, info};
use crate::common::{Result, ColorSignalError};

/// Capability to write a copy of `src` keeping only every `stride`-th frame
///
/// Implementations must overwrite `dst` and must fail if no output was
/// produced. Failures are deterministic and are not retried.
pub trait Transcoder {
    fn transcode(&self, src: &Path, dst: &Path, stride: u32) -> Result<()>;
}

impl<T: Transcoder + ?Sized> Transcoder for &T {
    fn transcode(&self, src: &Path, dst: &Path, stride: u32) -> Result<()> {
        (**self).transcode(src, dst, stride)
    }
}

/// Transcoder that shells out to the `ffmpeg` binary
#[derive(Debug, Clone, PartialEq)]
pub struct FfmpegTranscoder {
    program: PathBuf,
    codec: String,
    bitrate: String,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            codec: "libx265".to_string(),
            bitrate: "100K".to_string(),
        }
    }
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific ffmpeg executable instead of the one on `PATH`
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Output video codec passed to `-c:v`
    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = codec.into();
        self
    }

    /// Output video bitrate passed to `-b:v`
    pub fn with_bitrate(mut self, bitrate: impl Into<String>) -> Self {
        self.bitrate = bitrate.into();
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn codec(&self) -> &str {
        &self.codec
    }

    pub fn bitrate(&self) -> &str {
        &self.bitrate
    }

    /// Filter expression keeping frames whose index is divisible by `stride`
    pub fn select_filter(stride: u32) -> String {
        format!("select=not(mod(n\\,{}))", stride)
    }

    /// Full argument list for one invocation
    pub fn build_args(&self, src: &Path, dst: &Path, stride: u32) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            src.to_string_lossy().into_owned(),
            "-vf".to_string(),
            Self::select_filter(stride),
            // Re-time the kept frames into a contiguous variable-rate stream
            "-vsync".to_string(),
            "vfr".to_string(),
            "-an".to_string(),
            "-b:v".to_string(),
            self.bitrate.clone(),
            "-c:v".to_string(),
            self.codec.clone(),
            dst.to_string_lossy().into_owned(),
        ]
    }
}

impl Transcoder for FfmpegTranscoder {
    #[instrument(skip(self), fields(program = %self.program.display()))]
    fn transcode(&self, src: &Path, dst: &Path, stride: u32) -> Result<()> {
        assert!(stride > 0, "Stride must be positive, got: {}", stride);
        let program = self.program.display().to_string();

        if !src.is_file() {
            return Err(ColorSignalError::VideoNotFound {
                path: src.display().to_string(),
            });
        }

        let args = self.build_args(src, dst, stride);
        info!("Running {} {}", program, args.join(" "));

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| ColorSignalError::transcode_error(&program, format!("failed to spawn: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("{} stderr: {}", program, stderr);
            return Err(ColorSignalError::transcode_error(
                &program,
                format!("{}: {}", output.status, stderr_tail(&stderr, 5)),
            ));
        }

        let produced = dst.metadata().map(|m| m.len() > 0).unwrap_or(false);
        if !produced {
            return Err(ColorSignalError::transcode_error(
                &program,
                format!("no output written to {}", dst.display()),
            ));
        }

        debug!("Transcoded {} -> {} (stride {})", src.display(), dst.display(), stride);
        Ok(())
    }
}

/// Last `lines` non-empty lines of a process's stderr
fn stderr_tail(stderr: &str, lines: usize) -> String {
    let kept: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = kept.len().saturating_sub(lines);
    kept[start..].join(" | ")
}
