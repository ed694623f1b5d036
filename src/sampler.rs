//! Transcode-then-decode frame sampling
//!
//! Decoding a full-rate video only to discard most frames is the expensive
//! part of sampling. [`SampledFrames`] first asks a [`Transcoder`] for a copy
//! holding every Nth frame, then decodes that copy and maps positions back
//! to original frame indices.

use std::iter::FusedIterator;
use std::path::{Path, PathBuf};
use opencv::core::Mat;
use tempfile::TempDir;
use tracing::{instrument, debug, info};
use crate::common::{Result, ColorSignalError};
use crate::transcode::Transcoder;
use crate::video_stream::FrameIter;

/// File name of the downsampled copy inside the working directory
const DOWNSAMPLED_FILE: &str = "downsampled.mp4";

/// One-shot iterator over `(original_frame_index, frame)` pairs
///
/// Owns the temporary directory holding the downsampled video; it is
/// removed when the iterator is dropped.
#[derive(Debug)]
pub struct SampledFrames {
    // Declared before `workdir` so the decoder closes before the file is deleted
    frames: FrameIter,
    workdir: TempDir,
    stride: u32,
}

impl SampledFrames {
    /// Downsample `source` at `stride` and open the result for decoding
    ///
    /// # Errors
    /// * `VideoNotFound` - If `source` doesn't exist
    /// * `TranscodeFailed` - If the transcoder fails or writes nothing
    /// * Any error from opening the downsampled copy
    ///
    /// # Panics
    /// Panics if stride is 0
    #[instrument(skip(transcoder), fields(source = %source.display()))]
    pub fn new<T: Transcoder + ?Sized>(source: &Path, stride: u32, transcoder: &T) -> Result<Self> {
        assert!(stride > 0, "Stride must be positive, got: {}", stride);

        if !source.is_file() {
            return Err(ColorSignalError::VideoNotFound {
                path: source.display().to_string(),
            });
        }

        let workdir = tempfile::Builder::new()
            .prefix("colorsignal-")
            .tempdir()
            .map_err(|e| ColorSignalError::io_error(&std::env::temp_dir(), e))?;
        let downsampled = workdir.path().join(DOWNSAMPLED_FILE);

        // On any error below `workdir` is dropped and removed with it
        transcoder.transcode(source, &downsampled, stride)?;
        let frames = FrameIter::open(&downsampled, 1)?;

        info!("Sampling {} every {} frames via {}",
              source.display(), stride, downsampled.display());

        Ok(Self { frames, workdir, stride })
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Path of the downsampled copy (valid while the iterator lives)
    pub fn downsampled_path(&self) -> PathBuf {
        self.workdir.path().join(DOWNSAMPLED_FILE)
    }
}

impl Iterator for SampledFrames {
    type Item = Result<(u64, Mat)>;

    fn next(&mut self) -> Option<Self::Item> {
        let stride = self.stride as u64;
        self.frames
            .next()
            .map(|item| item.map(|(local, frame)| (original_index(local, stride), frame)))
    }
}

impl FusedIterator for SampledFrames {}

impl Drop for SampledFrames {
    fn drop(&mut self) {
        debug!("Discarding downsampled copy in {}", self.workdir.path().display());
    }
}

/// Map a position in the downsampled stream back to the source video
pub fn original_index(local_index: u64, stride: u64) -> u64 {
    local_index * stride
}

/// Upper bound on samples for a video of `frames` frames at `stride`
pub fn max_samples(frames: u64, stride: u32) -> u64 {
    frames.div_ceil(stride as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use crate::test_video::InProcessTranscoder;

    /// Records its calls and writes nothing decodable
    struct RecordingTranscoder {
        calls: Cell<u32>,
        seen_dst: std::cell::RefCell<Option<PathBuf>>,
        fail: bool,
    }

    impl RecordingTranscoder {
        fn new(fail: bool) -> Self {
            Self { calls: Cell::new(0), seen_dst: Default::default(), fail }
        }
    }

    impl Transcoder for RecordingTranscoder {
        fn transcode(&self, _src: &Path, dst: &Path, stride: u32) -> Result<()> {
            self.calls.set(self.calls.get() + 1);
            *self.seen_dst.borrow_mut() = Some(dst.to_path_buf());
            assert_eq!(stride, 4);
            if self.fail {
                return Err(ColorSignalError::transcode_error("fake", "exit status 1"));
            }
            std::fs::write(dst, b"not a real video").map_err(|e| ColorSignalError::io_error(dst, e))
        }
    }

    #[test]
    fn test_original_index_mapping() {
        let indices: Vec<u64> = (0..5).map(|i| original_index(i, 2)).collect();
        assert_eq!(indices, vec![0, 2, 4, 6, 8]);
        assert_eq!(original_index(0, 30), 0);
    }

    #[test]
    fn test_max_samples() {
        assert_eq!(max_samples(10, 2), 5);
        assert_eq!(max_samples(10, 3), 4);
        assert_eq!(max_samples(10, 1), 10);
        assert_eq!(max_samples(0, 7), 0);
    }

    #[test]
    fn test_missing_source_skips_transcoder() {
        let transcoder = RecordingTranscoder::new(false);
        let result = SampledFrames::new(Path::new("missing.mp4"), 4, &transcoder);

        assert!(matches!(result.unwrap_err(), ColorSignalError::VideoNotFound { .. }));
        assert_eq!(transcoder.calls.get(), 0);
    }

    #[test]
    fn test_transcode_failure_removes_workdir() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.mp4");
        std::fs::write(&source, b"stub").unwrap();

        let transcoder = RecordingTranscoder::new(true);
        let result = SampledFrames::new(&source, 4, &transcoder);

        assert!(matches!(result.unwrap_err(), ColorSignalError::TranscodeFailed { .. }));
        let dst = transcoder.seen_dst.borrow().clone().unwrap();
        assert!(!dst.parent().unwrap().exists());
    }

    #[test]
    fn test_undecodable_output_removes_workdir() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.mp4");
        std::fs::write(&source, b"stub").unwrap();

        let transcoder = RecordingTranscoder::new(false);
        let result = SampledFrames::new(&source, 4, &transcoder);

        assert!(result.is_err());
        assert_eq!(transcoder.calls.get(), 1);
        let dst = transcoder.seen_dst.borrow().clone().unwrap();
        assert!(!dst.parent().unwrap().exists());
    }

    fn alternating_video(dir: &Path) -> PathBuf {
        use opencv::core::Scalar;
        let path = dir.join("source.avi");
        let colors: Vec<Scalar> = (0..10)
            .map(|i| if i % 2 == 0 { Scalar::all(40.0) } else { Scalar::all(220.0) })
            .collect();
        crate::test_video::write_solid_video(&path, &colors).unwrap();
        path
    }

    #[test]
    fn test_sampled_frames_report_original_indices() {
        let dir = tempfile::tempdir().unwrap();
        let source = alternating_video(dir.path());

        let frames = SampledFrames::new(&source, 2, &InProcessTranscoder).unwrap();
        assert_eq!(frames.stride(), 2);
        assert!(frames.downsampled_path().is_file());

        let samples: Vec<(u64, Mat)> = frames.map(|item| item.unwrap()).collect();
        let indices: Vec<u64> = samples.iter().map(|(index, _)| *index).collect();

        assert_eq!(indices, vec![0, 2, 4, 6, 8]);
        assert!(indices.len() as u64 <= max_samples(10, 2));
        // Only even raw frames survive, all of them the darker color
        for (index, frame) in &samples {
            let sample = crate::stats::frame_statistics(frame, *index).unwrap();
            assert!(sample.mean().iter().all(|&m| crate::test_video::close(m, 40.0)), "{:?}", sample);
        }
    }

    #[test]
    fn test_early_drop_removes_workdir() {
        let dir = tempfile::tempdir().unwrap();
        let source = alternating_video(dir.path());

        let mut frames = SampledFrames::new(&source, 3, &InProcessTranscoder).unwrap();
        let workdir = frames.downsampled_path().parent().unwrap().to_path_buf();
        assert!(workdir.is_dir());

        // Stop after the first sample, leaving the rest undecoded
        let (first, _) = frames.next().unwrap().unwrap();
        assert_eq!(first, 0);
        assert!(workdir.is_dir());

        drop(frames);
        assert!(!workdir.exists());
    }

    #[test]
    #[should_panic(expected = "Stride must be positive")]
    fn test_zero_stride_panics() {
        let transcoder = RecordingTranscoder::new(false);
        let _ = SampledFrames::new(Path::new("missing.mp4"), 0, &transcoder);
    }
}
