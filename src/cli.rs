//! CLI argument parsing and the dispatch sequence

use anyhow::Result;
use clap::Parser;

use crate::config;
use crate::extract::{Extractor, HostExtractor};
use crate::models::{DispatchOutcome, ExtractCtx, DEFAULT_EXTRACTED_PARTITIONS, DEFAULT_SOURCE};
use crate::output;
use crate::registry::HandlerRegistry;

/// Extract partition and firmware images from an Android device dump
#[derive(Parser, Debug)]
#[command(
    name = "extract",
    version,
    about = "Extract partition and firmware images from a device, archive or dump directory",
    long_about = "Resolves SOURCE into a dump directory, skips partitions that were already \
                  extracted there, and unpacks the rest. SOURCE is 'adb' (pull from the \
                  attached device), a factory/OTA/firmware archive, or an existing dump \
                  directory."
)]
pub struct Cli {
    /// Enable verbose logging (can be repeated for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Partitions to extract
    /// Default: odm product system system_ext vendor
    #[arg(long, num_args = 1.., value_name = "PARTITION")]
    pub partitions: Option<Vec<String>>,

    /// Extra partitions to extract, appended to --partitions
    #[arg(long, num_args = 0.., value_name = "PARTITION")]
    pub extra_partitions: Option<Vec<String>>,

    /// Extract all files from the archive
    #[arg(long)]
    pub all: bool,

    /// Files to extract as Pixel factory image (default pattern when no value is given)
    #[arg(long, num_args = 0.., value_name = "REGEX")]
    pub pixel_factory: Option<Vec<String>>,

    /// Files to extract as Pixel firmware (default pattern when no value is given)
    #[arg(long, num_args = 0.., value_name = "REGEX")]
    pub pixel_firmware: Option<Vec<String>>,

    /// Files to extract as star firmware (default pattern when no value is given)
    #[arg(long, num_args = 0.., value_name = "REGEX")]
    pub star_firmware: Option<Vec<String>>,

    /// Source to extract from: 'adb', an archive, or a dump directory
    #[arg(value_name = "SOURCE", default_value = DEFAULT_SOURCE)]
    pub source: String,
}

/// Append the extra partitions, if the flag was given at all
///
/// Order is preserved and duplicates are kept.
pub fn merge_partitions(partitions: Vec<String>, extra_partitions: Option<Vec<String>>) -> Vec<String> {
    let mut extract_partitions = partitions;
    if let Some(extra) = extra_partitions {
        extract_partitions.extend(extra);
    }
    extract_partitions
}

/// Run the acquire, filter, extract-or-skip sequence
///
/// The dump directory stays held until this returns, whether extraction
/// succeeded or not.
pub fn dispatch<E: Extractor>(
    extractor: &E,
    source: &str,
    ctx: &mut ExtractCtx,
) -> Result<DispatchOutcome> {
    let dump_dir = extractor.get_dump_dir(source, ctx)?;

    extractor.filter_already_extracted_partitions(&dump_dir, ctx)?;

    if ctx.extract_partitions.is_empty() {
        log::info!("All partitions already extracted in {}", dump_dir.path().display());
        return Ok(DispatchOutcome::NothingToExtract);
    }

    let stats = extractor.extract_image(source, ctx, &dump_dir)?;
    Ok(DispatchOutcome::Extracted(stats))
}

impl Cli {
    /// Partition list after applying defaults and --extra-partitions
    pub fn effective_partitions(&self) -> Vec<String> {
        let partitions = self.partitions.clone().unwrap_or_else(|| {
            DEFAULT_EXTRACTED_PARTITIONS
                .iter()
                .map(|p| p.to_string())
                .collect()
        });

        merge_partitions(partitions, self.extra_partitions.clone())
    }

    /// Pattern to handler mapping from the three handler flags
    pub fn handler_registry(&self) -> Result<HandlerRegistry> {
        HandlerRegistry::build(
            self.pixel_factory.clone(),
            self.pixel_firmware.clone(),
            self.star_firmware.clone(),
        )
    }

    /// Build the extraction context; the dump is always kept
    pub fn build_context(&self) -> Result<ExtractCtx> {
        Ok(ExtractCtx::new(
            true,
            self.effective_partitions(),
            self.handler_registry()?,
            self.all,
        ))
    }

    /// Execute the extraction
    pub fn execute(self) -> Result<()> {
        // Setup logging based on verbosity
        let log_level = match self.verbose {
            0 => "warn",   // Default: only warnings and errors
            1 => "info",   // -v: show info messages
            2 => "debug",  // -vv: show debug messages
            _ => "trace",  // -vvv: show trace messages
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
            .init();

        let config = config::load_config()?;
        let mut ctx = self.build_context()?.with_config(config);

        log::debug!(
            "Partitions: {:?}, patterns: {:?}, extract all: {}",
            ctx.extract_partitions,
            ctx.extract_fns.patterns().collect::<Vec<_>>(),
            ctx.extract_all
        );

        let outcome = dispatch(&HostExtractor, &self.source, &mut ctx)?;
        output::outcome(&outcome);

        Ok(())
    }
}
