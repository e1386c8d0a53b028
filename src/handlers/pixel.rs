//! Pixel factory image and firmware handlers
//!
//! A Pixel factory zip contains `bootloader-*.img`, `radio-*.img` and an
//! inner `image-*.zip` holding the partition images. The bootloader and
//! radio images are FBPK packs of individual firmware partitions.

use anyhow::{bail, Context, Result};
use binrw::{BinRead, BinReaderExt};
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::archive;
use crate::models::{ExtractCtx, FIRMWARE_DIR};

pub const PIXEL_FACTORY_IMAGE_REGEX: &str = r"image-[a-z0-9_]+-[a-z0-9._]+\.zip";
pub const PIXEL_FIRMWARE_REGEX: &str = r"(bootloader|radio)-[a-z0-9_]+-[a-z0-9._-]+\.img";

const FBPK_MAGIC: &[u8; 4] = b"FBPK";
const FBPK_VERSION: u32 = 2;

/// FBPK v2 entry types
const ENTRY_TYPE_PARTITION_TABLE: u32 = 0;
const ENTRY_TYPE_PARTITION_DATA: u32 = 1;

#[derive(BinRead, Debug)]
#[br(little, magic = b"FBPK")]
struct PackHeader {
    version: u32,
    header_size: u32,
    entry_header_size: u32,
    _platform: [u8; 16],
    _pack_version: [u8; 64],
    _slot_type: u32,
    _data_align: u32,
    total_entries: u32,
    _total_size: u32,
}

#[derive(BinRead, Debug)]
#[br(little)]
struct PackEntry {
    entry_type: u32,
    name: [u8; 36],
    _product: [u8; 40],
    offset: u64,
    size: u64,
    _slotted: u32,
    _crc32: u32,
}

fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).to_string()
}

/// Unpack the partition images of a factory zip's inner `image-*.zip`
pub fn extract_pixel_factory_image(
    ctx: &ExtractCtx,
    file: &Path,
    dump_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let written = archive::unpack(file, dump_dir, |name| ctx.wants_file(name))?;
    log::info!(
        "Extracted {} images from factory image {}",
        written.len(),
        file.display()
    );
    Ok(written)
}

/// Unpack a Pixel bootloader or radio image into the firmware directory
pub fn extract_pixel_firmware(
    _ctx: &ExtractCtx,
    file: &Path,
    dump_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let firmware_dir = dump_dir.join(FIRMWARE_DIR);
    fs::create_dir_all(&firmware_dir)
        .with_context(|| format!("Failed to create {}", firmware_dir.display()))?;

    if is_fbpk(file)? {
        return unpack_fbpk(file, &firmware_dir);
    }

    if file.parent() == Some(firmware_dir.as_path()) {
        log::debug!("{} is already in {}, leaving it as is", file.display(), FIRMWARE_DIR);
        return Ok(Vec::new());
    }

    // Not a pack: keep the image whole under its kind (bootloader/radio)
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .with_context(|| format!("{} has no file name", file.display()))?;
    let kind = file_name.split('-').next().unwrap_or(&file_name);
    let out_path = firmware_dir.join(format!("{}.img", kind));

    fs::copy(file, &out_path)
        .with_context(|| format!("Failed to copy {} to {}", file.display(), out_path.display()))?;
    log::info!("Copied {} to {}", file.display(), out_path.display());

    Ok(vec![out_path])
}

/// Whether a file starts with the FBPK magic
pub fn is_fbpk(path: &Path) -> Result<bool> {
    let mut file = File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut magic = [0u8; 4];
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(&magic == FBPK_MAGIC),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

/// Write every entry of an FBPK v2 pack into `out_dir`
pub fn unpack_fbpk(path: &Path, out_dir: &Path) -> Result<Vec<PathBuf>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);

    let header: PackHeader = reader
        .read_le()
        .with_context(|| format!("Failed to read FBPK header of {}", path.display()))?;

    if header.version != FBPK_VERSION {
        bail!(
            "Unsupported FBPK version {} in {}",
            header.version,
            path.display()
        );
    }

    log::debug!("{} contains {} FBPK entries", path.display(), header.total_entries);

    let mut entries = Vec::with_capacity(header.total_entries as usize);
    for index in 0..header.total_entries {
        let position = header.header_size as u64 + index as u64 * header.entry_header_size as u64;
        reader.seek(SeekFrom::Start(position))?;
        let entry: PackEntry = reader
            .read_le()
            .with_context(|| format!("Failed to read FBPK entry #{}", index))?;
        entries.push(entry);
    }

    let mut written = Vec::new();
    for entry in entries {
        let name = c_string(&entry.name);
        if name.is_empty() || name.contains(['/', '\\']) || name == ".." {
            log::warn!("Skipping FBPK entry with invalid name {:?}", name);
            continue;
        }

        let extension = match entry.entry_type {
            ENTRY_TYPE_PARTITION_DATA => "img",
            ENTRY_TYPE_PARTITION_TABLE => "gpt",
            _ => "bin",
        };
        let out_path = out_dir.join(format!("{}.{}", name, extension));

        reader.seek(SeekFrom::Start(entry.offset))?;
        let mut out = File::create(&out_path)
            .with_context(|| format!("Failed to create {}", out_path.display()))?;
        let copied = io::copy(&mut (&mut reader).take(entry.size), &mut out)?;
        if copied != entry.size {
            bail!("FBPK entry {} in {} is truncated", name, path.display());
        }

        log::debug!("Extracted FBPK entry {} ({} bytes)", name, entry.size);
        written.push(out_path);
    }

    Ok(written)
}
