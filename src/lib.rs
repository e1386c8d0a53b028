//! extract-utils: pull partition and firmware images out of Android dumps
//!
//! A source (`adb`, a factory/OTA/firmware archive, or a dump directory) is
//! resolved into a dump directory; partitions already extracted there are
//! skipped and the rest are unpacked into `<dump>/<partition>/`. Files whose
//! names match registered patterns are first passed to vendor handlers
//! (Pixel factory image, Pixel firmware, star firmware).
//!
//! # Architecture
//!
//! - **CLI**: parses arguments into an [`ExtractCtx`] and runs the dispatch sequence
//! - **Registry**: ordered file name pattern to handler mapping
//! - **Extract**: dump directory resolution, already-extracted filtering, extraction
//!
//! # Example Usage
//!
//! ```no_run
//! use extract_utils::{cli, ExtractCtx, HandlerRegistry, HostExtractor};
//!
//! let registry = HandlerRegistry::build(Some(vec![]), Some(vec![]), None).unwrap();
//! let mut ctx = ExtractCtx::new(true, vec!["vendor".to_string()], registry, false);
//!
//! let outcome = cli::dispatch(&HostExtractor, "husky-factory.zip", &mut ctx).unwrap();
//! println!("{:?}", outcome);
//! ```

pub mod adb;
pub mod archive;
pub mod cli;
pub mod config;
pub mod extract;
pub mod handlers;
pub mod image;
pub mod models;
pub mod output;
pub mod registry;
pub mod source;
pub mod sparse;

// Re-export commonly used types
pub use config::Config;
pub use extract::{Extractor, HostExtractor};
pub use handlers::ExtractHandler;
pub use models::{DispatchOutcome, ExtractCtx, ExtractStats, DEFAULT_EXTRACTED_PARTITIONS};
pub use registry::HandlerRegistry;
pub use source::{DumpDir, DumpSource};
