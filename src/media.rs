//! Locating the files an acquisition step left in a work directory
//!
//! Acquisition itself happens elsewhere. What arrives here is a directory
//! holding one video, optionally an audio track and a subtitle file, and an
//! info record describing the item.

use std::fs;
use std::path::{Path, PathBuf};
use serde::Deserialize;
use tracing::{instrument, debug, warn};
use crate::common::{Result, ColorSignalError};

/// The part of the info record the pipeline cares about
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VideoMetadata {
    pub id: String,
    #[serde(default)]
    pub title: String,
}

/// Files and metadata for one acquired video
#[derive(Debug, Clone, PartialEq)]
pub struct MediaBundle {
    pub metadata: VideoMetadata,
    pub video: PathBuf,
    pub audio: Option<PathBuf>,
    pub subtitles: Option<PathBuf>,
}

impl MediaBundle {
    /// Identifier used to name output artifacts
    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn title(&self) -> &str {
        &self.metadata.title
    }

    /// Scan `dir` and pick files by extension
    ///
    /// `.mp4` is the video, `.mp3` the audio, `.vtt` the subtitles and
    /// `.json` the info record. When several files share an extension the
    /// first in name order wins.
    ///
    /// # Errors
    /// * `Io` - If the directory can't be read
    /// * `VideoNotFound` - If no video file is present
    /// * `InvalidMetadata` - If the info record is missing or unparsable
    #[instrument(fields(dir = %dir.display()))]
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut entries: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(|e| ColorSignalError::io_error(dir, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .collect();
        entries.sort();

        let mut video = None;
        let mut audio = None;
        let mut subtitles = None;
        let mut info = None;

        for path in entries {
            let slot = match extension(&path).as_deref() {
                Some("mp4") => &mut video,
                Some("mp3") => &mut audio,
                Some("vtt") => &mut subtitles,
                Some("json") => &mut info,
                _ => continue,
            };
            if slot.is_some() {
                warn!("Ignoring extra file {}", path.display());
                continue;
            }
            *slot = Some(path);
        }

        let video = video.ok_or_else(|| ColorSignalError::VideoNotFound {
            path: dir.join("*.mp4").display().to_string(),
        })?;
        let info = info.ok_or_else(|| ColorSignalError::InvalidMetadata {
            path: dir.display().to_string(),
            reason: "no .json info record".to_string(),
        })?;
        let metadata = read_metadata(&info)?;

        debug!("Found bundle {} ({}) video={}", metadata.id, metadata.title, video.display());
        Ok(Self { metadata, video, audio, subtitles })
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// Parse an info record, requiring a non-empty `id`
pub fn read_metadata(path: &Path) -> Result<VideoMetadata> {
    let invalid = |reason: String| ColorSignalError::InvalidMetadata {
        path: path.display().to_string(),
        reason,
    };

    let content = fs::read_to_string(path).map_err(|e| ColorSignalError::io_error(path, e))?;
    let metadata: VideoMetadata = serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))?;

    if metadata.id.trim().is_empty() {
        return Err(invalid("empty id".to_string()));
    }
    if metadata.id.contains(['/', '\\']) || metadata.id == "." || metadata.id == ".." {
        return Err(invalid(format!("id {:?} is not usable as a directory name", metadata.id)));
    }
    Ok(metadata)
}
