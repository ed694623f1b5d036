//! End-to-end color signal extraction with a cached intermediate series
//!
//! A run either computes the raw series (transcode, decode, measure, save,
//! plot) or, when the cache policy accepts the stored file, skips straight
//! to loading it. Both paths then smooth the loaded series and plot it.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{instrument, info, warn};
use crate::common::{Result, ColorSignalError, Statistic};
use crate::media::MediaBundle;
use crate::plot::{plot_statistic, PlotOptions};
use crate::sampler::SampledFrames;
use crate::series::{ColumnSeries, LogProgress, ProgressObserver, SeriesBuilder};
use crate::smoother::{smooth, SmoothedSeries, DEFAULT_WINDOW};
use crate::store::{self, CachePolicy, ExistencePolicy};
use crate::transcode::{FfmpegTranscoder, Transcoder};
use crate::video_stream::{estimate_sample_count, VideoStream};

/// Settings for one pipeline instance
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Directory receiving the series file and charts
    pub output_dir: PathBuf,
    /// Sampling stride; derived from the video's fps when `None`
    pub stride: Option<u32>,
    /// Median window in samples
    pub window: usize,
    pub series_file_name: String,
    pub render_plots: bool,
    /// Recompute instead of failing when the stored series is malformed
    pub recompute_invalid_cache: bool,
    pub plot: PlotOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("video_info"),
            stride: None,
            window: DEFAULT_WINDOW,
            series_file_name: "color_info.json".to_string(),
            render_plots: true,
            recompute_invalid_cache: false,
            plot: PlotOptions::default(),
        }
    }
}

impl PipelineConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    /// Check the settings before any work starts
    pub fn validate(&self) -> Result<()> {
        if self.stride == Some(0) {
            return Err(ColorSignalError::config_error("Stride must be positive"));
        }
        if self.window == 0 {
            return Err(ColorSignalError::config_error("Smoothing window must be positive"));
        }
        if self.series_file_name.trim().is_empty() {
            return Err(ColorSignalError::config_error("Series file name must not be empty"));
        }
        if self.plot.width < 200 || self.plot.height < 150 || self.plot.line_thickness <= 0 {
            return Err(ColorSignalError::config_error(format!(
                "Plot canvas {}x{} (thickness {}) is unusable",
                self.plot.width, self.plot.height, self.plot.line_thickness
            )));
        }
        Ok(())
    }

    /// Path of the persisted series
    pub fn series_path(&self) -> PathBuf {
        self.output_dir.join(&self.series_file_name)
    }

    /// Same settings writing into `output_dir/<id>`
    pub fn for_item(&self, id: &str) -> Self {
        Self {
            output_dir: self.output_dir.join(id),
            ..self.clone()
        }
    }
}

/// Outcome of one pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    /// Whether the stored series was reused
    pub cache_hit: bool,
    pub stride: Option<u32>,
    pub series: ColumnSeries,
    pub smoothed: SmoothedSeries,
    /// Every file written during the run
    pub artifacts: Vec<PathBuf>,
}

/// Stride giving one sample per second of video
///
/// The fps is truncated, as containers often report values like 29.97.
pub fn stride_for_fps(fps: f64) -> u32 {
    if fps.is_finite() && fps >= 1.0 {
        fps.trunc().min(u32::MAX as f64) as u32
    } else {
        1
    }
}

/// The color signal pipeline over an injectable transcoder and cache policy
#[derive(Debug)]
pub struct ColorSignalPipeline<T: Transcoder = FfmpegTranscoder, C: CachePolicy = ExistencePolicy> {
    config: PipelineConfig,
    transcoder: T,
    cache: C,
}

impl ColorSignalPipeline {
    /// Pipeline using `ffmpeg` from `PATH` and the existence cache policy
    pub fn new(config: PipelineConfig) -> Result<Self> {
        Self::with_parts(config, FfmpegTranscoder::default(), ExistencePolicy)
    }
}

impl<T: Transcoder, C: CachePolicy> ColorSignalPipeline<T, C> {
    pub fn with_parts(config: PipelineConfig, transcoder: T, cache: C) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, transcoder, cache })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn transcoder(&self) -> &T {
        &self.transcoder
    }

    /// Configured stride, or one derived from the video's frame rate
    pub fn resolve_stride(&self, video: &Path) -> Result<u32> {
        match self.config.stride {
            Some(stride) => Ok(stride),
            None => {
                let fps = VideoStream::open(video)?.fps();
                let stride = stride_for_fps(fps);
                info!("Derived stride {} from {:.2} fps", stride, fps);
                Ok(stride)
            }
        }
    }

    /// Sample `video` and measure every kept frame
    pub fn extract(&self, video: &Path) -> Result<ColumnSeries> {
        self.extract_with_progress(video, LogProgress::default())
    }

    /// [`extract`](Self::extract) with a custom progress observer
    #[instrument(skip(self, progress), fields(video = %video.display()))]
    pub fn extract_with_progress<P: ProgressObserver>(&self, video: &Path, progress: P) -> Result<ColumnSeries> {
        let stride = self.resolve_stride(video)?;
        self.extract_at(video, stride, progress)
    }

    fn extract_at<P: ProgressObserver>(&self, video: &Path, stride: u32, progress: P) -> Result<ColumnSeries> {
        let expected = estimate_sample_count(video, stride)?;

        let frames = SampledFrames::new(video, stride, &self.transcoder)?;
        let mut builder = SeriesBuilder::with_progress(expected, progress);
        builder.extend_from_frames(frames)?;

        Ok(builder.into_columns())
    }

    /// Compute or reuse the raw series, then smooth and chart it
    ///
    /// # Errors
    /// Any stage error is returned unchanged. A malformed stored series is
    /// returned as `InvalidSeries` unless `recompute_invalid_cache` is set.
    #[instrument(skip(self), fields(video = %video.display(), out = %self.config.output_dir.display()))]
    pub fn run(&self, video: &Path) -> Result<PipelineReport> {
        let out_dir = &self.config.output_dir;
        fs::create_dir_all(out_dir).map_err(|e| ColorSignalError::io_error(out_dir, e))?;

        let series_path = self.config.series_path();
        let mut artifacts = Vec::new();
        let mut stride = None;

        let cache_hit = self.cache.is_fresh(video, &series_path);
        let series = if cache_hit {
            info!("Reusing stored series {}", series_path.display());
            match store::load(&series_path) {
                Ok(series) => Some(series),
                Err(e @ ColorSignalError::InvalidSeries { .. }) if self.config.recompute_invalid_cache => {
                    warn!("Stored series is invalid, recomputing: {}", e);
                    None
                }
                Err(e) => return Err(e),
            }
        } else {
            None
        };

        let cache_hit = series.is_some();
        let series = match series {
            Some(series) => series,
            None => {
                let resolved = self.resolve_stride(video)?;
                stride = Some(resolved);
                let computed = self.extract_at(video, resolved, LogProgress::default())?;
                store::save(&computed, &series_path)?;
                artifacts.push(series_path.clone());

                if self.config.render_plots {
                    for statistic in [Statistic::Mean, Statistic::Std] {
                        let path = out_dir.join(format!("{}.png", statistic.file_stem()));
                        plot_statistic(&computed, statistic, statistic.label(), &path, &self.config.plot)?;
                        artifacts.push(path);
                    }
                }

                // Downstream stages always work from what was persisted
                store::load(&series_path)?
            }
        };

        let smoothed = smooth(&series, self.config.window);
        if self.config.render_plots {
            for statistic in [Statistic::Mean, Statistic::Std] {
                let path = out_dir.join(format!("{}_smoothed.png", statistic.file_stem()));
                let label = format!("{} Smoothed", statistic.label());
                plot_statistic(smoothed.series(), statistic, &label, &path, &self.config.plot)?;
                artifacts.push(path);
            }
        }

        info!("Pipeline finished: {} samples, cache hit: {}, {} artifacts written",
              series.len(), cache_hit, artifacts.len());

        Ok(PipelineReport { cache_hit, stride, series, smoothed, artifacts })
    }

    /// Run against an acquired bundle, writing into `output_dir/<id>`
    pub fn run_bundle(&self, bundle: &MediaBundle) -> Result<PipelineReport>
    where
        T: Clone,
        C: Clone,
    {
        info!("Processing {} ({})", bundle.title(), bundle.id());
        let item = ColorSignalPipeline {
            config: self.config.for_item(bundle.id()),
            transcoder: self.transcoder.clone(),
            cache: self.cache.clone(),
        };
        item.run(&bundle.video)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use opencv::core::Scalar;
    use crate::series::{ColorSeries, FrameSample, NoProgress};
    use crate::test_video::InProcessTranscoder;

    /// Transcoder that must never be reached
    #[derive(Default, Clone)]
    struct CountingTranscoder {
        calls: std::rc::Rc<Cell<u32>>,
    }

    impl Transcoder for CountingTranscoder {
        fn transcode(&self, _src: &Path, _dst: &Path, _stride: u32) -> Result<()> {
            self.calls.set(self.calls.get() + 1);
            Err(ColorSignalError::transcode_error("counting", "not available in tests"))
        }
    }

    fn stored_series() -> ColumnSeries {
        ColorSeries::from_iter((0..6u64).map(|i| {
            let v = if i % 2 == 0 { 10.0 } else { 200.0 };
            FrameSample::new(i * 30, [v, v / 2.0, 1.0], [0.0, 1.0, 2.0])
        }))
        .into_columns()
    }

    fn test_config(dir: &Path) -> PipelineConfig {
        PipelineConfig {
            window: 3,
            plot: PlotOptions { width: 400, height: 300, line_thickness: 1 },
            ..PipelineConfig::new(dir)
        }
    }

    #[test]
    fn test_stride_for_fps() {
        assert_eq!(stride_for_fps(30.0), 30);
        assert_eq!(stride_for_fps(29.97), 29);
        assert_eq!(stride_for_fps(0.5), 1);
        assert_eq!(stride_for_fps(0.0), 1);
        assert_eq!(stride_for_fps(f64::NAN), 1);
    }

    #[test]
    fn test_config_validation() {
        assert!(PipelineConfig::default().validate().is_ok());

        let zero_stride = PipelineConfig { stride: Some(0), ..PipelineConfig::default() };
        assert!(matches!(zero_stride.validate().unwrap_err(), ColorSignalError::InvalidConfig { .. }));

        let zero_window = PipelineConfig { window: 0, ..PipelineConfig::default() };
        assert!(zero_window.validate().is_err());

        let no_name = PipelineConfig { series_file_name: " ".into(), ..PipelineConfig::default() };
        assert!(no_name.validate().is_err());

        assert!(ColorSignalPipeline::new(zero_window).is_err());
    }

    #[test]
    fn test_config_paths() {
        let config = PipelineConfig::new("out");
        assert_eq!(config.series_path(), Path::new("out/color_info.json"));
        assert_eq!(config.for_item("abc").series_path(), Path::new("out/abc/color_info.json"));
    }

    #[test]
    fn test_cache_hit_skips_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        store::save(&stored_series(), &config.series_path()).unwrap();

        let transcoder = CountingTranscoder::default();
        let pipeline = ColorSignalPipeline::with_parts(config, transcoder.clone(), ExistencePolicy).unwrap();

        // The video doesn't exist: a hit must not touch it
        let first = pipeline.run(&dir.path().join("missing.mp4")).unwrap();
        let second = pipeline.run(&dir.path().join("missing.mp4")).unwrap();

        assert!(first.cache_hit);
        assert_eq!(transcoder.calls.get(), 0);
        assert_eq!(first.series, stored_series());
        assert_eq!(first, second);
        assert_eq!(first.artifacts.len(), 2);
        assert!(first.artifacts.iter().all(|p| p.exists()));
        assert!(dir.path().join("mean_color_smoothed.png").exists());
        assert!(!dir.path().join("mean_color.png").exists());
    }

    #[test]
    fn test_cache_hit_smooths_loaded_series() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig { render_plots: false, ..test_config(dir.path()) };
        store::save(&stored_series(), &config.series_path()).unwrap();

        let pipeline = ColorSignalPipeline::with_parts(config, CountingTranscoder::default(), ExistencePolicy).unwrap();
        let report = pipeline.run(Path::new("missing.mp4")).unwrap();

        assert!(report.artifacts.is_empty());
        assert_eq!(report.smoothed.window(), 3);
        // 10, 200, 10, 200, 10, 200 with a 3-wide window
        assert_eq!(report.smoothed.series().means[0], vec![10.0, 10.0, 200.0, 10.0, 200.0, 200.0]);
    }

    #[test]
    fn test_cache_miss_propagates_acquisition_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig { stride: Some(2), ..test_config(dir.path()) };
        let transcoder = CountingTranscoder::default();
        let pipeline = ColorSignalPipeline::with_parts(config, transcoder.clone(), ExistencePolicy).unwrap();

        let error = pipeline.run(&dir.path().join("missing.mp4")).unwrap_err();
        assert!(matches!(error, ColorSignalError::VideoNotFound { .. }));
        assert_eq!(transcoder.calls.get(), 0);
        assert!(!dir.path().join("color_info.json").exists());
    }

    #[test]
    fn test_invalid_cache_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        fs::write(config.series_path(), r#"{"means": []}"#).unwrap();

        let pipeline = ColorSignalPipeline::with_parts(config, CountingTranscoder::default(), ExistencePolicy).unwrap();
        let error = pipeline.run(Path::new("missing.mp4")).unwrap_err();
        assert!(matches!(error, ColorSignalError::InvalidSeries { .. }));
    }

    #[test]
    fn test_invalid_cache_recomputes_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            stride: Some(2),
            recompute_invalid_cache: true,
            ..test_config(dir.path())
        };
        fs::write(config.series_path(), "garbage").unwrap();
        let video = dir.path().join("video.mp4");
        fs::write(&video, b"stub").unwrap();

        let transcoder = CountingTranscoder::default();
        let pipeline = ColorSignalPipeline::with_parts(config, transcoder.clone(), ExistencePolicy).unwrap();
        let result = pipeline.run(&video);

        // Recomputation was attempted; the stub video can't be opened for the estimate
        assert!(result.is_err());
        assert!(!matches!(result.unwrap_err(), ColorSignalError::InvalidSeries { .. }));
    }

    #[test]
    fn test_run_bundle_writes_under_id() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig { render_plots: false, ..test_config(dir.path()) };
        let item_config = config.for_item("abc123");
        fs::create_dir_all(&item_config.output_dir).unwrap();
        store::save(&stored_series(), &item_config.series_path()).unwrap();

        let bundle = MediaBundle {
            metadata: crate::media::VideoMetadata { id: "abc123".into(), title: "Test".into() },
            video: dir.path().join("missing.mp4"),
            audio: None,
            subtitles: None,
        };
        let pipeline = ColorSignalPipeline::with_parts(config, CountingTranscoder::default(), ExistencePolicy).unwrap();
        let report = pipeline.run_bundle(&bundle).unwrap();

        assert!(report.cache_hit);
        assert_eq!(report.series, stored_series());
    }

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len(), "{:?} vs {:?}", actual, expected);
        for (a, e) in actual.iter().zip(expected) {
            assert!(crate::test_video::close(*a, *e), "{:?} vs {:?}", actual, expected);
        }
    }

    /// Ten solid frames sampled at stride 2, the colour flipping between samples
    #[test]
    fn test_alternating_colors_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let first = Scalar::new(0.0, 0.0, 200.0, 0.0); // RGB (200, 0, 0)
        let second = Scalar::new(100.0, 50.0, 0.0, 0.0); // RGB (0, 50, 100)
        // Raw frames 0, 2, 4, 6 and 8 get first, second, first, second, first
        let colors: Vec<Scalar> = (0..10)
            .map(|i| if (i / 2) % 2 == 0 { first } else { second })
            .collect();
        let video = dir.path().join("source.avi");
        crate::test_video::write_solid_video(&video, &colors).unwrap();

        let config = PipelineConfig {
            stride: Some(2),
            render_plots: false,
            ..test_config(&dir.path().join("out"))
        };
        let pipeline = ColorSignalPipeline::with_parts(config, InProcessTranscoder, ExistencePolicy).unwrap();
        let report = pipeline.run(&video).unwrap();

        assert!(!report.cache_hit);
        assert_eq!(report.stride, Some(2));
        assert_eq!(report.artifacts, vec![pipeline.config().series_path()]);

        let series = &report.series;
        assert_eq!(series.frame_nums, vec![0, 2, 4, 6, 8]);
        assert_close(&series.means[0], &[200.0, 0.0, 200.0, 0.0, 200.0]);
        assert_close(&series.means[1], &[0.0, 50.0, 0.0, 50.0, 0.0]);
        assert_close(&series.means[2], &[0.0, 100.0, 0.0, 100.0, 0.0]);

        assert_eq!(report.smoothed.window(), 3);
        let out = report.smoothed.clone().into_inner();
        assert_eq!(out.frame_nums, series.frame_nums);
        assert_close(&out.means[0], &[200.0, 200.0, 0.0, 200.0, 200.0]);
        assert_close(&out.means[1], &[0.0, 0.0, 50.0, 0.0, 0.0]);
        assert_close(&out.means[2], &[0.0, 0.0, 100.0, 0.0, 0.0]);
        assert!(out.stds.iter().flatten().all(|&s| s < 1.0));

        // A second run reuses the stored series
        let again = pipeline.run(&video).unwrap();
        assert!(again.cache_hit);
        assert_eq!(again.series, report.series);
    }

    /// Needs `ffmpeg` with libx264 on PATH and an OpenCV build with video I/O
    #[test]
    #[ignore]
    fn test_real_video_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("source.avi");
        let colors: Vec<Scalar> = (0..10)
            .map(|i| Scalar::all(if i % 2 == 0 { 40.0 } else { 220.0 }))
            .collect();
        crate::test_video::write_solid_video(&video, &colors).unwrap();

        let config = PipelineConfig { stride: Some(2), ..test_config(&dir.path().join("out")) };
        let transcoder = FfmpegTranscoder::new().with_codec("libx264").with_bitrate("1M");
        let pipeline = ColorSignalPipeline::with_parts(config, transcoder, ExistencePolicy).unwrap();

        let report = pipeline.run(&video).unwrap();
        assert!(!report.cache_hit);
        assert_eq!(report.artifacts.len(), 5);
        assert!(report.series.len() <= 5);
        assert_eq!(report.series.frame_nums.first(), Some(&0));
        assert!(report.series.frame_nums.windows(2).all(|w| w[1] > w[0]));
        // Every kept frame has an even index, so every sample is the darker color
        assert!(report.series.means[0].iter().all(|&m| (m - 40.0).abs() < 8.0));

        let again = pipeline.run(&video).unwrap();
        assert!(again.cache_hit);
        assert_eq!(again.series, report.series);

        let direct = pipeline.extract_with_progress(&video, NoProgress).unwrap();
        assert_eq!(direct.frame_nums, report.series.frame_nums);
    }
}
