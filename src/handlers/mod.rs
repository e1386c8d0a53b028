//! Vendor-specific extraction handlers
//!
//! A handler receives a file from the dump whose name matched one of its
//! registered patterns and unpacks it in place. Files it produces are fed
//! back into the extraction queue so they can match other handlers or be
//! picked up as partition images.

use anyhow::Result;
use std::path::{Path, PathBuf};
use strum::Display;

use crate::models::ExtractCtx;

pub mod pixel;
pub mod star;

/// The handlers a file name pattern can be attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ExtractHandler {
    /// Inner `image-*.zip` of a Pixel factory image
    PixelFactoryImage,
    /// Pixel `bootloader-*.img` / `radio-*.img` (FBPK packs)
    PixelFirmware,
    /// Tar bundle of firmware images
    StarFirmware,
}

impl ExtractHandler {
    /// Pattern used when the handler's flag is given without values
    pub fn default_pattern(self) -> &'static str {
        match self {
            ExtractHandler::PixelFactoryImage => pixel::PIXEL_FACTORY_IMAGE_REGEX,
            ExtractHandler::PixelFirmware => pixel::PIXEL_FIRMWARE_REGEX,
            ExtractHandler::StarFirmware => star::STAR_FIRMWARE_REGEX,
        }
    }

    /// Run the handler on one file, returning the files it wrote
    pub fn run(self, ctx: &ExtractCtx, file: &Path, dump_dir: &Path) -> Result<Vec<PathBuf>> {
        log::info!("Running {} on {}", self, file.display());

        match self {
            ExtractHandler::PixelFactoryImage => {
                pixel::extract_pixel_factory_image(ctx, file, dump_dir)
            }
            ExtractHandler::PixelFirmware => pixel::extract_pixel_firmware(ctx, file, dump_dir),
            ExtractHandler::StarFirmware => star::extract_star_firmware(ctx, file, dump_dir),
        }
    }
}
