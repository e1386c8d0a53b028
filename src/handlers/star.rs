//! Star firmware bundles
//!
//! These ship as a plain or gzip-compressed tar of firmware images; every
//! member goes into the firmware directory.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::archive::{self, ArchiveKind};
use crate::models::{ExtractCtx, FIRMWARE_DIR};

pub const STAR_FIRMWARE_REGEX: &str = r"[a-z0-9_-]*firmware[a-z0-9._-]*\.tar(\.gz)?";

pub fn extract_star_firmware(
    _ctx: &ExtractCtx,
    file: &Path,
    dump_dir: &Path,
) -> Result<Vec<PathBuf>> {
    match archive::detect(file)? {
        Some(ArchiveKind::Tar) | Some(ArchiveKind::TarGz) => {}
        _ => anyhow::bail!("{} is not a tar firmware bundle", file.display()),
    }

    let firmware_dir = dump_dir.join(FIRMWARE_DIR);
    let written = archive::unpack(file, &firmware_dir, |_| true)
        .with_context(|| format!("Failed to unpack star firmware {}", file.display()))?;

    log::info!(
        "Extracted {} firmware images from {}",
        written.len(),
        file.display()
    );
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::HandlerRegistry;
    use tempfile::TempDir;

    fn ctx() -> ExtractCtx {
        ExtractCtx::new(true, vec![], HandlerRegistry::default(), false)
    }

    #[test]
    fn test_extract_tar_bundle() {
        let temp = TempDir::new().unwrap();
        let bundle = temp.path().join("star-firmware.tar");

        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in [("images/modem.img", &b"modem"[..]), ("images/tz.mbn", &b"tz"[..])] {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, data).unwrap();
        }
        std::fs::write(&bundle, builder.into_inner().unwrap()).unwrap();

        let written = extract_star_firmware(&ctx(), &bundle, temp.path()).unwrap();
        let radio = temp.path().join(FIRMWARE_DIR);

        assert_eq!(written, vec![radio.join("modem.img"), radio.join("tz.mbn")]);
        assert_eq!(std::fs::read(radio.join("tz.mbn")).unwrap(), b"tz");
    }

    #[test]
    fn test_rejects_zip() {
        let temp = TempDir::new().unwrap();
        let bundle = temp.path().join("firmware.tar");
        std::fs::write(&bundle, b"PK\x03\x04rest-of-zip").unwrap();

        let result = extract_star_firmware(&ctx(), &bundle, temp.path());
        assert!(result.unwrap_err().to_string().contains("not a tar firmware bundle"));
    }
}
