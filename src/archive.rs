//! Archive unpacking (zip, tar, tar.gz)
//!
//! Entries are written flat into the destination directory under their base
//! name; directory structure inside the archive is not preserved. Only
//! entries whose base name passes the caller's filter are written, and the
//! first entry with a given base name wins.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const TAR_MAGIC: &[u8] = b"ustar";
const TAR_MAGIC_OFFSET: usize = 257;

/// Container formats recognised by their leading bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Tar,
    TarGz,
}

/// Identify the archive format of a file, if any
pub fn detect(path: &Path) -> Result<Option<ArchiveKind>> {
    let mut file = File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut header = Vec::with_capacity(TAR_MAGIC_OFFSET + TAR_MAGIC.len());
    file.by_ref()
        .take((TAR_MAGIC_OFFSET + TAR_MAGIC.len()) as u64)
        .read_to_end(&mut header)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    if header.starts_with(ZIP_MAGIC) {
        return Ok(Some(ArchiveKind::Zip));
    }
    if header.starts_with(GZIP_MAGIC) {
        return Ok(Some(ArchiveKind::TarGz));
    }
    if header.len() >= TAR_MAGIC_OFFSET + TAR_MAGIC.len()
        && &header[TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + TAR_MAGIC.len()] == TAR_MAGIC
    {
        return Ok(Some(ArchiveKind::Tar));
    }

    Ok(None)
}

/// Unpack the entries of an archive whose base name passes `filter`
///
/// Returns the paths written, in archive order.
pub fn unpack<F>(path: &Path, dest: &Path, filter: F) -> Result<Vec<PathBuf>>
where
    F: Fn(&str) -> bool,
{
    let kind = detect(path)?
        .with_context(|| format!("{} is not a zip or tar archive", path.display()))?;

    log::info!("Unpacking {:?} archive {}", kind, path.display());

    fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create {}", dest.display()))?;

    let file = File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let written = match kind {
        ArchiveKind::Zip => unpack_zip(BufReader::new(file), dest, &filter),
        ArchiveKind::Tar => unpack_tar(BufReader::new(file), dest, &filter),
        ArchiveKind::TarGz => unpack_tar(GzDecoder::new(BufReader::new(file)), dest, &filter),
    }
    .with_context(|| format!("Failed to unpack {}", path.display()))?;

    log::debug!("Unpacked {} entries from {}", written.len(), path.display());
    Ok(written)
}

/// Base name of an archive entry, rejecting names that would escape `dest`
fn entry_file_name(entry: &str) -> Option<&str> {
    let name = entry.rsplit(['/', '\\']).next()?;
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name)
}

fn unpack_zip<R, F>(reader: R, dest: &Path, filter: &F) -> Result<Vec<PathBuf>>
where
    R: Read + Seek,
    F: Fn(&str) -> bool,
{
    let mut archive = ZipArchive::new(reader).context("Failed to read zip central directory")?;
    let mut written = Vec::new();

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .with_context(|| format!("Failed to read zip entry #{}", index))?;

        if entry.is_dir() {
            continue;
        }

        let entry_name = entry.name().to_string();
        let Some(name) = entry_file_name(&entry_name) else {
            continue;
        };
        if !filter(name) {
            continue;
        }

        let out_path = dest.join(name);
        if written.contains(&out_path) {
            log::warn!("Skipping {}: {} was already extracted", entry_name, name);
            continue;
        }
        log::debug!("Extracting {} -> {}", entry_name, out_path.display());

        let mut out = File::create(&out_path)
            .with_context(|| format!("Failed to create {}", out_path.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("Failed to extract {}", entry_name))?;

        written.push(out_path);
    }

    Ok(written)
}

fn unpack_tar<R, F>(reader: R, dest: &Path, filter: &F) -> Result<Vec<PathBuf>>
where
    R: Read,
    F: Fn(&str) -> bool,
{
    let mut archive = tar::Archive::new(reader);
    let mut written = Vec::new();

    for entry in archive.entries().context("Failed to read tar entries")? {
        let mut entry = entry.context("Failed to read tar entry")?;

        if !entry.header().entry_type().is_file() {
            continue;
        }

        let entry_name = entry.path()?.to_string_lossy().to_string();
        let Some(name) = entry_file_name(&entry_name) else {
            continue;
        };
        if !filter(name) {
            continue;
        }

        let out_path = dest.join(name);
        if written.contains(&out_path) {
            log::warn!("Skipping {}: {} was already extracted", entry_name, name);
            continue;
        }
        log::debug!("Extracting {} -> {}", entry_name, out_path.display());

        let mut out = File::create(&out_path)
            .with_context(|| format!("Failed to create {}", out_path.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("Failed to extract {}", entry_name))?;

        written.push(out_path);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    fn tar_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_entry_file_name() {
        assert_eq!(entry_file_name("husky-ud1a/system.img"), Some("system.img"));
        assert_eq!(entry_file_name("system.img"), Some("system.img"));
        assert_eq!(entry_file_name("dir/"), None);
        assert_eq!(entry_file_name("dir/.."), None);
    }

    #[test]
    fn test_detect_formats() {
        let temp = TempDir::new().unwrap();

        let zip_path = temp.path().join("a.zip");
        write_zip(&zip_path, &[("x", &b"x"[..])]);
        assert_eq!(detect(&zip_path).unwrap(), Some(ArchiveKind::Zip));

        let tar_path = temp.path().join("a.tar");
        std::fs::write(&tar_path, tar_bytes(&[("x", &b"x"[..])])).unwrap();
        assert_eq!(detect(&tar_path).unwrap(), Some(ArchiveKind::Tar));

        let gz_path = temp.path().join("a.tar.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar_bytes(&[("x", &b"x"[..])])).unwrap();
        std::fs::write(&gz_path, encoder.finish().unwrap()).unwrap();
        assert_eq!(detect(&gz_path).unwrap(), Some(ArchiveKind::TarGz));

        let raw_path = temp.path().join("system.img");
        std::fs::write(&raw_path, vec![0u8; 4096]).unwrap();
        assert_eq!(detect(&raw_path).unwrap(), None);
    }

    #[test]
    fn test_unpack_zip_filters_and_flattens() {
        let temp = TempDir::new().unwrap();
        let zip_path = temp.path().join("factory.zip");
        write_zip(
            &zip_path,
            &[
                ("husky-ud1a/system.img", &b"system"[..]),
                ("husky-ud1a/boot.img", &b"boot"[..]),
                ("husky-ud1a/vendor.img", &b"vendor"[..]),
            ],
        );

        let dest = temp.path().join("out");
        let written = unpack(&zip_path, &dest, |name| name != "boot.img").unwrap();

        assert_eq!(written, vec![dest.join("system.img"), dest.join("vendor.img")]);
        assert_eq!(std::fs::read(dest.join("system.img")).unwrap(), &b"system"[..]);
        assert!(!dest.join("boot.img").exists());
    }

    #[test]
    fn test_unpack_keeps_first_duplicate_name() {
        let temp = TempDir::new().unwrap();
        let zip_path = temp.path().join("factory.zip");
        write_zip(
            &zip_path,
            &[
                ("a/system.img", &b"first"[..]),
                ("b/system.img", &b"second"[..]),
            ],
        );

        let dest = temp.path().join("out");
        let written = unpack(&zip_path, &dest, |_| true).unwrap();

        assert_eq!(written, vec![dest.join("system.img")]);
        assert_eq!(std::fs::read(dest.join("system.img")).unwrap(), &b"first"[..]);

        let tar_path = temp.path().join("bundle.tar");
        std::fs::write(
            &tar_path,
            tar_bytes(&[("a/modem.img", &b"first"[..]), ("b/modem.img", &b"second"[..])]),
        )
        .unwrap();

        let written = unpack(&tar_path, &dest, |_| true).unwrap();
        assert_eq!(written, vec![dest.join("modem.img")]);
        assert_eq!(std::fs::read(dest.join("modem.img")).unwrap(), &b"first"[..]);
    }

    #[test]
    fn test_unpack_tar_gz() {
        let temp = TempDir::new().unwrap();
        let gz_path = temp.path().join("firmware.tar.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&tar_bytes(&[("fw/modem.img", &b"modem"[..]), ("fw/dsp.img", &b"dsp"[..])]))
            .unwrap();
        std::fs::write(&gz_path, encoder.finish().unwrap()).unwrap();

        let dest = temp.path().join("radio");
        let written = unpack(&gz_path, &dest, |_| true).unwrap();

        assert_eq!(written.len(), 2);
        assert_eq!(std::fs::read(dest.join("modem.img")).unwrap(), &b"modem"[..]);
        assert_eq!(std::fs::read(dest.join("dsp.img")).unwrap(), &b"dsp"[..]);
    }

    #[test]
    fn test_unpack_rejects_non_archive() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("plain.bin");
        std::fs::write(&path, &b"not an archive"[..]).unwrap();

        let result = unpack(&path, &temp.path().join("out"), |_| true);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not a zip or tar archive"));
    }
}
