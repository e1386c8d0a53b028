//! Core data models for extract-utils
//!
//! The extraction context is built once per invocation from the parsed
//! command line and handed by reference to the dump, filter and extract
//! stages.

use crate::config::Config;
use crate::registry::HandlerRegistry;

/// Partitions extracted when `--partitions` is not given
pub const DEFAULT_EXTRACTED_PARTITIONS: &[&str] = &[
    "odm",
    "product",
    "system",
    "system_ext",
    "vendor",
];

/// Source identifier used when none is given on the command line
pub const DEFAULT_SOURCE: &str = "adb";

/// Directory (relative to the dump) that receives firmware images
pub const FIRMWARE_DIR: &str = "radio";

/// Everything the extraction stages need to know about one invocation
#[derive(Debug, Clone)]
pub struct ExtractCtx {
    /// Keep the dump directory after extraction instead of deleting it
    pub keep_dump: bool,
    /// Partitions still to extract (shrinks after already-extracted filtering)
    pub extract_partitions: Vec<String>,
    /// Partitions the filter found already extracted in the dump
    pub already_extracted: Vec<String>,
    /// File name pattern to handler mapping
    pub extract_fns: HandlerRegistry,
    /// Unpack every archive entry, not only the ones needed for partitions
    pub extract_all: bool,
    /// Host tool paths and dump locations
    pub config: Config,
}

impl ExtractCtx {
    pub fn new(
        keep_dump: bool,
        extract_partitions: Vec<String>,
        extract_fns: HandlerRegistry,
        extract_all: bool,
    ) -> Self {
        Self {
            keep_dump,
            extract_partitions,
            already_extracted: Vec::new(),
            extract_fns,
            extract_all,
            config: Config::default(),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Image file name a partition is shipped as inside archives
    pub fn partition_image_name(partition: &str) -> String {
        format!("{}.img", partition)
    }

    /// Whether a file with this base name should be taken out of an archive
    pub fn wants_file(&self, file_name: &str) -> bool {
        if self.extract_all || self.extract_fns.matches(file_name) {
            return true;
        }

        self.extract_partitions
            .iter()
            .any(|p| Self::partition_image_name(p) == file_name)
    }
}

/// What the dispatch sequence ended up doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// `extract_image` ran for the remaining partitions
    Extracted(ExtractStats),
    /// Every requested partition was already present in the dump
    NothingToExtract,
}

/// Counters reported at the end of an extraction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractStats {
    /// Files taken out of the source archive
    pub files_unpacked: usize,
    /// Individual handler invocations
    pub handler_runs: usize,
    /// Partitions unpacked into their own directory
    pub partitions_extracted: usize,
    /// Requested partitions with no image in the dump
    pub partitions_missing: Vec<String>,
    /// Requested partitions whose image format could not be unpacked
    pub partitions_unsupported: Vec<String>,
}
