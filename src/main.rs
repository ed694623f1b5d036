//! Command-line interface for the color signal library
//!
//! Runs the sampling, caching and smoothing pipeline on one video (or one
//! acquired media directory) and prints a summary of what was produced.

use std::env;
use std::path::PathBuf;
use std::process;
use std::time::Instant;
use anyhow::{bail, Context};
use tracing::{info, debug, warn};
use colorsignal::{
    get_video_info, init_tracing,
    CachePolicy, ColorSignalPipeline, ExistencePolicy, FfmpegTranscoder, MediaBundle,
    ModifiedAfterSourcePolicy, PipelineConfig, PipelineReport,
};

/// Command-line arguments structure
#[derive(Debug)]
struct Args {
    input: PathBuf,
    output_dir: Option<PathBuf>,
    stride: Option<u32>,
    window: Option<usize>,
    codec: Option<String>,
    bitrate: Option<String>,
    ffmpeg: Option<PathBuf>,
    series_name: Option<String>,
    render_plots: bool,
    recompute_invalid: bool,
    cache_policy: CacheMode,
    bundle: bool,
    verbose: bool,
    show_video_info: bool,
    output_format: OutputFormat,
}

/// Which stored series count as reusable
#[derive(Debug, Clone, Copy, PartialEq)]
enum CacheMode {
    Exists,     // Any stored series
    Mtime,      // Only series newer than the video
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum OutputFormat {
    Simple,     // One-line summary
    Json,       // JSON format for integration
}

impl Default for Args {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            output_dir: None,
            stride: None,
            window: None,
            codec: None,
            bitrate: None,
            ffmpeg: None,
            series_name: None,
            render_plots: true,
            recompute_invalid: false,
            cache_policy: CacheMode::Exists,
            bundle: false,
            verbose: false,
            show_video_info: false,
            output_format: OutputFormat::Simple,
        }
    }
}

impl Args {
    /// Pipeline settings implied by the flags
    fn pipeline_config(&self) -> PipelineConfig {
        let defaults = PipelineConfig::default();
        PipelineConfig {
            output_dir: self.output_dir.clone().unwrap_or(defaults.output_dir),
            stride: self.stride,
            window: self.window.unwrap_or(defaults.window),
            series_file_name: self.series_name.clone().unwrap_or(defaults.series_file_name),
            render_plots: self.render_plots,
            recompute_invalid_cache: self.recompute_invalid,
            plot: defaults.plot,
        }
    }

    fn transcoder(&self) -> FfmpegTranscoder {
        let mut transcoder = FfmpegTranscoder::new();
        if let Some(program) = &self.ffmpeg {
            transcoder = transcoder.with_program(program);
        }
        if let Some(codec) = &self.codec {
            transcoder = transcoder.with_codec(codec);
        }
        if let Some(bitrate) = &self.bitrate {
            transcoder = transcoder.with_bitrate(bitrate);
        }
        transcoder
    }
}

const USAGE: &str = "\
Options:
  --out-dir <dir>          Output directory (default: video_info)
  --stride <n>             Sample every n-th frame (default: one per second)
  --window <n>             Median window in samples (default: 500)
  --codec <c>              Transcoding video codec (default: libx265)
  --bitrate <b>            Transcoding video bitrate (default: 100K)
  --ffmpeg <path>          ffmpeg executable (default: ffmpeg on PATH)
  --series-name <file>     Series file name (default: color_info.json)
  --no-plots               Skip chart rendering
  --recompute-invalid      Recompute when the stored series is malformed
  --cache-policy <p>       Reuse stored series: exists|mtime (default: exists)
  --bundle                 Treat the input as an acquired media directory
  --info                   Show video information only
  --format <fmt>           Output format: simple|json (default: simple)
  --verbose                Enable debug logging
  --help                   Show this help message";

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let args = parse_args(env::args().collect())?;

    let log_level = if args.verbose { "debug" } else { "info" };
    init_tracing(log_level);

    info!("Color signal CLI v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    if args.show_video_info {
        return show_video_info(&args);
    }

    let start_time = Instant::now();
    let report = match args.cache_policy {
        CacheMode::Exists => execute(&args, ExistencePolicy)?,
        CacheMode::Mtime => execute(&args, ModifiedAfterSourcePolicy)?,
    };

    output_results(&report, &args, start_time.elapsed())
}

fn execute<C: CachePolicy + Clone>(args: &Args, cache: C) -> anyhow::Result<PipelineReport> {
    let pipeline = ColorSignalPipeline::with_parts(args.pipeline_config(), args.transcoder(), cache)
        .context("Invalid pipeline settings")?;

    if args.bundle {
        let bundle = MediaBundle::from_dir(&args.input)
            .with_context(|| format!("Failed to read media directory {}", args.input.display()))?;
        pipeline.run_bundle(&bundle)
    } else {
        pipeline.run(&args.input)
    }
    .with_context(|| format!("Color signal extraction failed for {}", args.input.display()))
}

fn parse_args(args: Vec<String>) -> anyhow::Result<Args> {
    let program = args.first().map(String::as_str).unwrap_or("colorsignal");

    if args.len() < 2 {
        bail!("Usage: {} <video_path|media_dir> [OPTIONS]\n\n{}", program, USAGE);
    }

    let mut parsed_args = Args::default();
    let mut input = None;

    let mut i = 1;
    while i < args.len() {
        let value = |name: &str| option_value(&args, i, name);
        let mut consumed = 2;
        match args[i].as_str() {
            "--out-dir" => parsed_args.output_dir = Some(PathBuf::from(value("--out-dir")?)),
            "--stride" => {
                parsed_args.stride = Some(value("--stride")?.parse()
                    .context("Invalid stride value")?);
            }
            "--window" => {
                parsed_args.window = Some(value("--window")?.parse()
                    .context("Invalid window value")?);
            }
            "--codec" => parsed_args.codec = Some(value("--codec")?.clone()),
            "--bitrate" => parsed_args.bitrate = Some(value("--bitrate")?.clone()),
            "--ffmpeg" => parsed_args.ffmpeg = Some(PathBuf::from(value("--ffmpeg")?)),
            "--series-name" => parsed_args.series_name = Some(value("--series-name")?.clone()),
            "--cache-policy" => {
                parsed_args.cache_policy = match value("--cache-policy")?.as_str() {
                    "exists" => CacheMode::Exists,
                    "mtime" => CacheMode::Mtime,
                    _ => bail!("Invalid cache policy. Use 'exists' or 'mtime'"),
                };
            }
            "--format" => {
                parsed_args.output_format = match value("--format")?.as_str() {
                    "simple" => OutputFormat::Simple,
                    "json" => OutputFormat::Json,
                    _ => bail!("Invalid format. Use 'simple' or 'json'"),
                };
            }
            flag => {
                consumed = 1;
                match flag {
                    "--no-plots" => parsed_args.render_plots = false,
                    "--recompute-invalid" => parsed_args.recompute_invalid = true,
                    "--bundle" => parsed_args.bundle = true,
                    "--info" => parsed_args.show_video_info = true,
                    "--verbose" => parsed_args.verbose = true,
                    "--help" => bail!(
                        "Color signal extraction\n\n\
                        Usage: {} <video_path|media_dir> [OPTIONS]\n\n\
                        Samples a video, records per-channel color mean and standard\n\
                        deviation, caches the series and renders smoothed charts.\n\n{}",
                        program, USAGE
                    ),
                    other if other.starts_with("--") => bail!("Unknown option: {}", other),
                    other => {
                        if input.is_some() {
                            bail!("Unexpected extra argument: {}", other);
                        }
                        input = Some(PathBuf::from(other));
                    }
                }
            }
        }
        i += consumed;
    }

    parsed_args.input = input.context("Missing <video_path|media_dir> argument")?;
    Ok(parsed_args)
}

fn option_value<'a>(args: &'a [String], i: usize, name: &str) -> anyhow::Result<&'a String> {
    args.get(i + 1).with_context(|| format!("{} requires a value", name))
}

fn show_video_info(args: &Args) -> anyhow::Result<()> {
    let video_path = if args.bundle {
        MediaBundle::from_dir(&args.input)?.video
    } else {
        args.input.clone()
    };
    info!("Analyzing video: {}", video_path.display());

    let video_info = get_video_info(&video_path)
        .with_context(|| format!("Failed to get video info for {}", video_path.display()))?;

    println!("Video Information:");
    println!("  Path: {}", video_info.path);
    println!("  Dimensions: {}x{}", video_info.width, video_info.height);
    println!("  Frame Rate: {:.2} fps", video_info.fps);
    println!("  Frame Count: {}", video_info.frame_count);
    println!("  Duration: {:.2} seconds", video_info.duration_seconds);
    println!("  Default Stride: {}", video_info.default_stride());
    println!("  Description: {}", video_info.description());

    if !video_info.is_valid() {
        warn!("Video properties appear invalid - sampling may fail");
    }

    Ok(())
}

fn artifact_names(artifacts: &[PathBuf]) -> Vec<String> {
    artifacts.iter().map(|p| p.display().to_string()).collect()
}

fn output_results(report: &PipelineReport, args: &Args, elapsed: std::time::Duration) -> anyhow::Result<()> {
    match args.output_format {
        OutputFormat::Simple => {
            println!("Sampled {} frames ({}), smoothing window {}",
                     report.series.len(),
                     if report.cache_hit { "cached" } else { "computed" },
                     report.smoothed.window());
            for artifact in &report.artifacts {
                println!("  wrote {}", artifact.display());
            }
        }
        OutputFormat::Json => {
            let json_output = serde_json::json!({
                "input": args.input.display().to_string(),
                "elapsed_ms": elapsed.as_millis() as u64,
                "cache_hit": report.cache_hit,
                "stride": report.stride,
                "samples": report.series.len(),
                "window": report.smoothed.window(),
                "artifacts": artifact_names(&report.artifacts),
            });

            println!("{}", serde_json::to_string_pretty(&json_output)
                .context("JSON serialization failed")?);
        }
    }

    info!("Finished in {:.2}ms", elapsed.as_secs_f64() * 1000.0);
    Ok(())
}
