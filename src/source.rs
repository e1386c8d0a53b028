//! Source resolution and the scoped dump directory
//!
//! A source is `adb`, an existing directory, or an archive file. Every
//! source maps to a dump directory that holds the extracted partitions for
//! the duration of one invocation.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::{ExtractCtx, DEFAULT_SOURCE};

/// Archive suffixes stripped when naming an archive's dump directory
const ARCHIVE_SUFFIXES: &[&str] = &[".tar.gz", ".tar.md5", ".tgz", ".tar", ".zip"];

/// Where the dump comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpSource {
    /// A device attached over adb
    Adb,
    /// An already-unpacked dump directory
    Directory(PathBuf),
    /// A zip or tar archive (factory image, OTA package, firmware bundle)
    Archive(PathBuf),
}

impl DumpSource {
    /// Classify a source identifier from the command line
    pub fn resolve(source: &str) -> Result<Self> {
        if source == DEFAULT_SOURCE {
            return Ok(DumpSource::Adb);
        }

        let path = PathBuf::from(source);
        if path.is_dir() {
            Ok(DumpSource::Directory(path))
        } else if path.is_file() {
            Ok(DumpSource::Archive(path))
        } else {
            anyhow::bail!("Source {} does not exist", source)
        }
    }
}

/// Dump directory held for the duration of an extraction
///
/// Directories created by this run for adb or archive sources are removed on
/// drop when `keep_dump` is false. A directory given as the source, or one
/// left by an earlier run, is never removed.
#[derive(Debug)]
pub struct DumpDir {
    path: PathBuf,
    owned: bool,
    keep: bool,
}

impl DumpDir {
    /// Create (if needed) and hold a dump directory
    ///
    /// A directory that already existed is never owned, so an earlier dump
    /// survives even when `keep` is false.
    pub fn create(path: impl Into<PathBuf>, owned: bool, keep: bool) -> Result<Self> {
        let path = path.into();
        let existed = path.exists();
        fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create dump directory {}", path.display()))?;
        Ok(Self {
            path,
            owned: owned && !existed,
            keep,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the directory will be deleted on drop
    pub fn is_temporary(&self) -> bool {
        self.owned && !self.keep
    }
}

impl Drop for DumpDir {
    fn drop(&mut self) {
        if !self.is_temporary() {
            return;
        }

        log::debug!("Removing dump directory {}", self.path.display());
        if let Err(e) = fs::remove_dir_all(&self.path) {
            log::warn!("Failed to remove dump directory {}: {}", self.path.display(), e);
        }
    }
}

/// Dump directory placed next to an archive, named after it
pub fn archive_dump_dir(archive: &Path) -> PathBuf {
    let file_name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let stem = ARCHIVE_SUFFIXES
        .iter()
        .find_map(|suffix| file_name.strip_suffix(*suffix))
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}.dump", file_name));

    archive.with_file_name(stem)
}

/// Resolve a source into a dump directory
pub fn get_dump_dir(source: &str, ctx: &ExtractCtx) -> Result<DumpDir> {
    let dump_dir = match DumpSource::resolve(source)? {
        DumpSource::Adb => DumpDir::create(ctx.config.dump.adb_dir.clone(), true, ctx.keep_dump)?,
        DumpSource::Directory(dir) => DumpDir::create(dir, false, true)?,
        DumpSource::Archive(archive) => {
            DumpDir::create(archive_dump_dir(&archive), true, ctx.keep_dump)?
        }
    };

    log::info!("Using dump directory {}", dump_dir.path().display());
    Ok(dump_dir)
}
