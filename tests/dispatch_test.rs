//! Dispatch sequence tests
//!
//! A recording extractor stands in for the host so these tests check only
//! the acquire, filter, extract-or-skip ordering and gating.


use anyhow::Result;
use clap::Parser;
use extract_utils::cli::{dispatch, Cli};
use extract_utils::{
    DispatchOutcome, DumpDir, ExtractCtx, ExtractHandler, ExtractStats, Extractor,
    DEFAULT_EXTRACTED_PARTITIONS,
};
use std::cell::RefCell;
use tempfile::TempDir;
use test_helpers::strings;

/// Extractor that records calls and pretends some partitions exist
struct RecordingExtractor {
    dump: TempDir,
    already_extracted: Vec<String>,
    fail_extract: bool,
    calls: RefCell<Vec<String>>,
}

impl RecordingExtractor {
    fn new(already_extracted: &[&str]) -> Self {
        Self {
            dump: TempDir::new().unwrap(),
            already_extracted: strings(already_extracted),
            fail_extract: false,
            calls: RefCell::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl Extractor for RecordingExtractor {
    fn get_dump_dir(&self, source: &str, _ctx: &ExtractCtx) -> Result<DumpDir> {
        self.calls.borrow_mut().push(format!("get_dump_dir {}", source));
        DumpDir::create(self.dump.path(), false, true)
    }

    fn filter_already_extracted_partitions(
        &self,
        _dump_dir: &DumpDir,
        ctx: &mut ExtractCtx,
    ) -> Result<()> {
        self.calls.borrow_mut().push("filter".to_string());
        ctx.extract_partitions
            .retain(|p| !self.already_extracted.contains(p));
        Ok(())
    }

    fn extract_image(
        &self,
        source: &str,
        ctx: &ExtractCtx,
        _dump_dir: &DumpDir,
    ) -> Result<ExtractStats> {
        self.calls
            .borrow_mut()
            .push(format!("extract_image {} {}", source, ctx.extract_partitions.join(",")));
        if self.fail_extract {
            anyhow::bail!("payload is corrupt");
        }
        Ok(ExtractStats {
            partitions_extracted: ctx.extract_partitions.len(),
            ..Default::default()
        })
    }
}

fn context(args: &[&str]) -> (Cli, ExtractCtx) {
    let mut argv = vec!["extract"];
    argv.extend_from_slice(args);
    let cli = Cli::try_parse_from(argv).unwrap();
    let ctx = cli.build_context().unwrap();
    (cli, ctx)
}

#[test]
fn test_no_flags_uses_default_partitions() {
    let (cli, ctx) = context(&[]);
    assert_eq!(cli.source, "adb");
    assert_eq!(ctx.extract_partitions, DEFAULT_EXTRACTED_PARTITIONS);
    assert!(ctx.extract_fns.is_empty());
    assert!(ctx.keep_dump);
}

#[test]
fn test_extra_partitions_are_appended() {
    let (_, ctx) = context(&["--extra-partitions", "x", "y"]);
    let mut expected = strings(DEFAULT_EXTRACTED_PARTITIONS);
    expected.extend(strings(&["x", "y"]));
    assert_eq!(ctx.extract_partitions, expected);
}

#[test]
fn test_partitions_override_then_extra_without_dedup() {
    let (_, ctx) = context(&["--partitions", "a", "b", "--extra-partitions", "c", "a"]);
    assert_eq!(ctx.extract_partitions, vec!["a", "b", "c", "a"]);
}

#[test]
fn test_pixel_factory_without_values() {
    let (_, ctx) = context(&["--pixel-factory"]);
    assert_eq!(ctx.extract_fns.len(), 1);
    assert_eq!(
        ctx.extract_fns.get(ExtractHandler::PixelFactoryImage.default_pattern()),
        Some(&[ExtractHandler::PixelFactoryImage][..])
    );
}

#[test]
fn test_shared_pattern_accumulates_handlers() {
    let (_, ctx) = context(&["--star-firmware", "foo", "--pixel-factory", "foo"]);
    assert_eq!(
        ctx.extract_fns.get("foo"),
        Some(&[ExtractHandler::PixelFactoryImage, ExtractHandler::StarFirmware][..])
    );
}

#[test]
fn test_dispatch_runs_all_stages_in_order() {
    let extractor = RecordingExtractor::new(&["system"]);
    let (cli, mut ctx) = context(&["--partitions", "system", "vendor", "--", "factory.zip"]);

    let outcome = dispatch(&extractor, &cli.source, &mut ctx).unwrap();

    assert_eq!(
        extractor.calls(),
        vec![
            "get_dump_dir factory.zip",
            "filter",
            "extract_image factory.zip vendor",
        ]
    );
    assert_eq!(ctx.extract_partitions, vec!["vendor"]);
    assert!(matches!(
        outcome,
        DispatchOutcome::Extracted(ExtractStats { partitions_extracted: 1, .. })
    ));
}

#[test]
fn test_dispatch_skips_when_everything_extracted() {
    let extractor = RecordingExtractor::new(DEFAULT_EXTRACTED_PARTITIONS);
    let (cli, mut ctx) = context(&[]);

    let outcome = dispatch(&extractor, &cli.source, &mut ctx).unwrap();

    assert_eq!(outcome, DispatchOutcome::NothingToExtract);
    assert_eq!(extractor.calls(), vec!["get_dump_dir adb", "filter"]);
}

#[test]
fn test_extract_all_does_not_force_extraction() {
    let extractor = RecordingExtractor::new(&["vendor"]);
    let (cli, mut ctx) = context(&["--all", "--partitions", "vendor", "--", "ota.zip"]);
    assert!(ctx.extract_all);

    let outcome = dispatch(&extractor, &cli.source, &mut ctx).unwrap();

    assert_eq!(outcome, DispatchOutcome::NothingToExtract);
    assert!(!extractor.calls().iter().any(|c| c.starts_with("extract_image")));
}

#[test]
fn test_extract_errors_propagate() {
    let mut extractor = RecordingExtractor::new(&[]);
    extractor.fail_extract = true;
    let (cli, mut ctx) = context(&["--partitions", "odm"]);

    let err = dispatch(&extractor, &cli.source, &mut ctx).unwrap_err();
    assert!(err.to_string().contains("payload is corrupt"));
    assert_eq!(extractor.calls().len(), 3);
}

#[test]
fn test_invalid_pattern_fails_context() {
    let cli = Cli::try_parse_from(["extract", "--pixel-firmware", "radio-(", "--", "dump"]).unwrap();
    assert!(cli.build_context().is_err());
}
