//! Media sources for the streaming pump
//!
//! A source yields raw Annex-B byte chunks; the pump splits them into NAL
//! units. Resolution order: configured file, configured directory, synthetic
//! test pattern.

use crate::config::StreamConfig;
use crate::{Error, Result};
use bytes::Bytes;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// A loopable supply of Annex-B chunks
pub trait MediaSource: Send {
    /// Next chunk, or `None` when one full pass is exhausted
    fn next_chunk(&mut self) -> Result<Option<Bytes>>;

    /// Rewind to the start of the material
    fn reset(&mut self) -> Result<()>;

    /// Interval between consecutive units on the track
    fn cadence(&self) -> Duration;

    /// Human-readable description for logs
    fn describe(&self) -> String;
}

/// Single raw H.264 file, served as one chunk per pass
#[derive(Debug)]
pub struct H264FileSource {
    path: PathBuf,
    cadence: Duration,
    served: bool,
}

impl H264FileSource {
    /// Open and validate the file path
    pub fn new(path: &Path, cadence: Duration) -> Result<Self> {
        let meta = fs::metadata(path)
            .map_err(|e| Error::MediaSource(format!("cannot stat {}: {e}", path.display())))?;
        if !meta.is_file() {
            return Err(Error::MediaSource(format!(
                "{} is not a regular file",
                path.display()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            cadence,
            served: false,
        })
    }
}

impl MediaSource for H264FileSource {
    fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if self.served {
            return Ok(None);
        }
        self.served = true;

        let data = fs::read(&self.path)
            .map_err(|e| Error::MediaSource(format!("cannot read {}: {e}", self.path.display())))?;
        Ok(Some(Bytes::from(data)))
    }

    fn reset(&mut self) -> Result<()> {
        self.served = false;
        Ok(())
    }

    fn cadence(&self) -> Duration {
        self.cadence
    }

    fn describe(&self) -> String {
        format!("h264 file {}", self.path.display())
    }
}

/// Directory of raw H.264 files, served in sorted order, one chunk per file
#[derive(Debug)]
pub struct DirectorySource {
    files: Vec<PathBuf>,
    next: usize,
    cadence: Duration,
    dir: PathBuf,
}

impl DirectorySource {
    /// Scan the directory for `.h264`/`.264` files
    pub fn new(dir: &Path, cadence: Duration) -> Result<Self> {
        let entries = fs::read_dir(dir)
            .map_err(|e| Error::MediaSource(format!("cannot read {}: {e}", dir.display())))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.is_file()
                    && matches!(
                        p.extension().and_then(|e| e.to_str()),
                        Some("h264") | Some("264")
                    )
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(Error::MediaSource(format!(
                "no .h264/.264 files in {}",
                dir.display()
            )));
        }

        Ok(Self {
            files,
            next: 0,
            cadence,
            dir: dir.to_path_buf(),
        })
    }
}

impl MediaSource for DirectorySource {
    fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        while self.next < self.files.len() {
            let path = &self.files[self.next];
            self.next += 1;

            match fs::read(path) {
                Ok(data) => return Ok(Some(Bytes::from(data))),
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "skipping unreadable media file");
                }
            }
        }
        Ok(None)
    }

    fn reset(&mut self) -> Result<()> {
        self.next = 0;
        Ok(())
    }

    fn cadence(&self) -> Duration {
        self.cadence
    }

    fn describe(&self) -> String {
        format!(
            "h264 directory {} ({} files)",
            self.dir.display(),
            self.files.len()
        )
    }
}

/// Synthetic Annex-B pattern used when no real media is configured
///
/// Emits a small SPS/PPS/IDR group per chunk with a rolling frame counter in
/// the slice payload. Never exhausts, so `next_chunk` never returns `None`.
pub struct TestPatternSource {
    frame: u32,
    cadence: Duration,
}

impl TestPatternSource {
    /// Create the pattern generator
    pub fn new(cadence: Duration) -> Self {
        Self { frame: 0, cadence }
    }
}

impl MediaSource for TestPatternSource {
    fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        let n = self.frame;
        self.frame = self.frame.wrapping_add(1);

        let mut chunk = Vec::with_capacity(64);
        // SPS
        chunk.extend_from_slice(&[0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1F, 0xAC]);
        // PPS
        chunk.extend_from_slice(&[0, 0, 0, 1, 0x68, 0xCE, 0x3C, 0x80]);
        // IDR slice carrying the frame counter
        chunk.extend_from_slice(&[0, 0, 0, 1, 0x65, 0x88, 0x84]);
        chunk.extend_from_slice(&n.to_be_bytes());

        Ok(Some(Bytes::from(chunk)))
    }

    fn reset(&mut self) -> Result<()> {
        Ok(())
    }

    fn cadence(&self) -> Duration {
        self.cadence
    }

    fn describe(&self) -> String {
        "synthetic test pattern".to_string()
    }
}

/// Pick the media source for the current configuration
///
/// A configured file or directory that cannot be opened logs a warning and
/// falls through to the next option instead of failing the session.
pub fn resolve_source(config: &StreamConfig) -> Box<dyn MediaSource> {
    if let Some(path) = &config.media_file {
        match H264FileSource::new(path, config.file_tick()) {
            Ok(src) => {
                info!(source = %src.describe(), "media source resolved");
                return Box::new(src);
            }
            Err(e) => warn!(error = %e, "configured media file unusable, falling back"),
        }
    }

    if let Some(dir) = &config.media_dir {
        match DirectorySource::new(dir, config.fallback_tick()) {
            Ok(src) => {
                info!(source = %src.describe(), "media source resolved");
                return Box::new(src);
            }
            Err(e) => warn!(error = %e, "configured media directory unusable, falling back"),
        }
    }

    let src = TestPatternSource::new(config.fallback_tick());
    info!(source = %src.describe(), "media source resolved");
    Box::new(src)
}
