//! Filesystem image detection and unpacking
//!
//! Partition images are unpacked with the standard host tools: `debugfs`
//! for ext4 and `fsck.erofs` for EROFS.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use std::process::Command;

use crate::config::ToolsConfig;

/// Both superblocks live at offset 1024
const SUPERBLOCK_OFFSET: usize = 1024;
const EXT4_MAGIC_OFFSET: usize = SUPERBLOCK_OFFSET + 0x38;
const EXT4_MAGIC: u16 = 0xEF53;
const EROFS_MAGIC: u32 = 0xE0F5_E1E2;

/// Filesystem found inside a raw partition image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsKind {
    Ext4,
    Erofs,
    Unknown,
}

/// Identify the filesystem of a raw (non-sparse) image
pub fn detect_fs(path: &Path) -> Result<FsKind> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut superblock = Vec::with_capacity(2048);
    file.take(2048)
        .read_to_end(&mut superblock)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    if superblock.len() >= SUPERBLOCK_OFFSET + 4 {
        let magic = u32::from_le_bytes([
            superblock[SUPERBLOCK_OFFSET],
            superblock[SUPERBLOCK_OFFSET + 1],
            superblock[SUPERBLOCK_OFFSET + 2],
            superblock[SUPERBLOCK_OFFSET + 3],
        ]);
        if magic == EROFS_MAGIC {
            return Ok(FsKind::Erofs);
        }
    }

    if superblock.len() >= EXT4_MAGIC_OFFSET + 2 {
        let magic = u16::from_le_bytes([
            superblock[EXT4_MAGIC_OFFSET],
            superblock[EXT4_MAGIC_OFFSET + 1],
        ]);
        if magic == EXT4_MAGIC {
            return Ok(FsKind::Ext4);
        }
    }

    Ok(FsKind::Unknown)
}

/// Unpack a raw filesystem image into `out_dir`
pub fn unpack_fs_image(image: &Path, out_dir: &Path, kind: FsKind, tools: &ToolsConfig) -> Result<()> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let mut command = match kind {
        FsKind::Ext4 => {
            let mut command = Command::new(&tools.debugfs);
            command
                .arg("-R")
                .arg(format!("rdump / {}", out_dir.display()))
                .arg(image);
            command
        }
        FsKind::Erofs => {
            let mut command = Command::new(&tools.fsck_erofs);
            command
                .arg(format!("--extract={}", out_dir.display()))
                .arg(image);
            command
        }
        FsKind::Unknown => anyhow::bail!("Unknown filesystem in {}", image.display()),
    };

    log::info!("Unpacking {:?} image {} into {}", kind, image.display(), out_dir.display());
    log::debug!("Running {:?}", command);

    let output = command
        .output()
        .with_context(|| format!("Failed to execute {:?}", command.get_program()))?;

    if !output.status.success() {
        anyhow::bail!(
            "{} failed on {}: {}",
            command.get_program().to_string_lossy(),
            image.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(())
}
