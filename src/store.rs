//! Durable storage of column-form series and the cache policy gate
//!
//! The store file doubles as the pipeline's memo: a [`CachePolicy`] decides
//! whether an existing file can stand in for recomputation.

use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{instrument, debug, info};
use crate::common::{Result, ColorSignalError};
use crate::series::ColumnSeries;

/// Write `series` to `path` as JSON, replacing any existing file
///
/// # Errors
/// * `Io` - If the parent directory is missing or the file can't be written
#[instrument(skip(series), fields(path = %path.display(), samples = series.len()))]
pub fn save(series: &ColumnSeries, path: &Path) -> Result<()> {
    let file = fs::File::create(path).map_err(|e| ColorSignalError::io_error(path, e))?;
    let mut writer = BufWriter::new(file);

    serde_json::to_writer_pretty(&mut writer, series).map_err(|e| {
        ColorSignalError::io_error(path, std::io::Error::other(e))
    })?;
    writer.flush().map_err(|e| ColorSignalError::io_error(path, e))?;

    info!("Saved {} samples to {}", series.len(), path.display());
    Ok(())
}

/// Read a series previously written by [`save`]
///
/// # Errors
/// * `SeriesNotFound` - If `path` doesn't exist
/// * `InvalidSeries` - If fields are missing, malformed or inconsistent
/// * `Io` - If the file exists but can't be read
#[instrument(fields(path = %path.display()))]
pub fn load(path: &Path) -> Result<ColumnSeries> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ColorSignalError::SeriesNotFound {
                path: path.display().to_string(),
            });
        }
        Err(e) => return Err(ColorSignalError::io_error(path, e)),
    };

    let series: ColumnSeries = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        if e.is_io() {
            ColorSignalError::io_error(path, std::io::Error::other(e))
        } else {
            ColorSignalError::format_error(path, e.to_string())
        }
    })?;

    series
        .validate()
        .map_err(|reason| ColorSignalError::format_error(path, reason))?;

    debug!("Loaded {} samples from {}", series.len(), path.display());
    Ok(series)
}

/// Whether a series file is present at `path`
pub fn exists(path: &Path) -> bool {
    path.is_file()
}

/// Decides whether a stored artifact may replace recomputation
pub trait CachePolicy {
    fn is_fresh(&self, source_video: &Path, artifact: &Path) -> bool;
}

impl<C: CachePolicy + ?Sized> CachePolicy for &C {
    fn is_fresh(&self, source_video: &Path, artifact: &Path) -> bool {
        (**self).is_fresh(source_video, artifact)
    }
}

/// Any existing artifact is trusted; changes to the source go unnoticed
#[derive(Debug, Default, Clone, Copy)]
pub struct ExistencePolicy;

impl CachePolicy for ExistencePolicy {
    fn is_fresh(&self, _source_video: &Path, artifact: &Path) -> bool {
        exists(artifact)
    }
}

/// Artifact must exist and be no older than the source video
///
/// If either modification time can't be read the artifact is treated as
/// stale.
#[derive(Debug, Default, Clone, Copy)]
pub struct ModifiedAfterSourcePolicy;

impl CachePolicy for ModifiedAfterSourcePolicy {
    fn is_fresh(&self, source_video: &Path, artifact: &Path) -> bool {
        if !exists(artifact) {
            return false;
        }
        let modified = |path: &Path| fs::metadata(path).and_then(|m| m.modified()).ok();
        match (modified(source_video), modified(artifact)) {
            (Some(source), Some(stored)) => stored >= source,
            _ => false,
        }
    }
}
