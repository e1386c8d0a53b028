//! Partition extraction
//!
//! Three stages run against a dump directory:
//!
//! 1. `get_dump_dir`: resolve the source into a dump directory
//! 2. `filter_already_extracted_partitions`: drop partitions already present
//! 3. `extract_image`: pull or unpack the remaining partitions
//!
//! `extract_image` itself runs in two passes. The handler pass feeds every
//! candidate file through the handlers registered for its name, queueing
//! whatever they produce. The partition pass then turns each requested
//! `<partition>.img` into a `<partition>/` directory.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::adb::Adb;
use crate::archive;
use crate::image::{self, FsKind};
use crate::models::{ExtractCtx, ExtractStats, DEFAULT_EXTRACTED_PARTITIONS, FIRMWARE_DIR};
use crate::source::{self, DumpDir, DumpSource};
use crate::sparse;

/// The collaborators the dispatch sequence drives
pub trait Extractor {
    /// Resolve a source into a scoped dump directory
    fn get_dump_dir(&self, source: &str, ctx: &ExtractCtx) -> Result<DumpDir>;

    /// Remove partitions that already have a directory in the dump
    fn filter_already_extracted_partitions(&self, dump_dir: &DumpDir, ctx: &mut ExtractCtx)
        -> Result<()>;

    /// Extract the requested partitions into the dump
    fn extract_image(&self, source: &str, ctx: &ExtractCtx, dump_dir: &DumpDir)
        -> Result<ExtractStats>;
}

/// Extractor backed by the filesystem, archives and host tools
#[derive(Debug, Default, Clone, Copy)]
pub struct HostExtractor;

impl Extractor for HostExtractor {
    fn get_dump_dir(&self, source: &str, ctx: &ExtractCtx) -> Result<DumpDir> {
        source::get_dump_dir(source, ctx)
    }

    fn filter_already_extracted_partitions(
        &self,
        dump_dir: &DumpDir,
        ctx: &mut ExtractCtx,
    ) -> Result<()> {
        filter_already_extracted_partitions(dump_dir, ctx);
        Ok(())
    }

    fn extract_image(
        &self,
        source: &str,
        ctx: &ExtractCtx,
        dump_dir: &DumpDir,
    ) -> Result<ExtractStats> {
        extract_image(source, ctx, dump_dir)
    }
}

/// Drop every partition whose output directory already exists
pub fn filter_already_extracted_partitions(dump_dir: &DumpDir, ctx: &mut ExtractCtx) {
    let (extracted, remaining): (Vec<String>, Vec<String>) = ctx
        .extract_partitions
        .drain(..)
        .partition(|partition| dump_dir.path().join(partition).is_dir());

    for partition in &extracted {
        log::info!("Partition {} already extracted, skipping", partition);
    }

    ctx.extract_partitions = remaining;
    ctx.already_extracted.extend(extracted);
}

/// Extract the partitions requested in `ctx` from `source` into `dump_dir`
pub fn extract_image(source: &str, ctx: &ExtractCtx, dump_dir: &DumpDir) -> Result<ExtractStats> {
    let dump_path = dump_dir.path();
    let mut stats = ExtractStats::default();

    log::info!(
        "Extracting {} from {} into {}",
        ctx.extract_partitions.join(", "),
        source,
        dump_path.display()
    );

    let candidates = match DumpSource::resolve(source)? {
        DumpSource::Adb => {
            pull_partitions(ctx, dump_path, &mut stats)?;
            return Ok(stats);
        }
        DumpSource::Archive(archive) => {
            let files = archive::unpack(&archive, dump_path, |name| ctx.wants_file(name))?;
            stats.files_unpacked = files.len();
            files
        }
        DumpSource::Directory(_) => collect_dump_files(ctx, dump_path),
    };

    let files = run_handlers(ctx, dump_path, candidates, &mut stats)?;
    extract_partitions(ctx, dump_path, &files, &mut stats)?;

    Ok(stats)
}

/// Pull every requested partition from the attached device
fn pull_partitions(ctx: &ExtractCtx, dump_path: &Path, stats: &mut ExtractStats) -> Result<()> {
    let adb = Adb::new(&ctx.config.tools.adb);
    adb.ensure_device()?;

    for partition in &ctx.extract_partitions {
        let partition_dir = dump_path.join(partition);

        // A failed pull must not leave a directory that looks extracted
        let guard = scopeguard::guard(partition_dir.clone(), |dir| {
            let _ = fs::remove_dir_all(dir);
        });

        match adb.pull(&format!("/{}", partition), &partition_dir) {
            Ok(()) => {
                scopeguard::ScopeGuard::into_inner(guard);
                stats.partitions_extracted += 1;
            }
            Err(e) => {
                log::warn!("Failed to pull partition {}: {:#}", partition, e);
                stats.partitions_missing.push(partition.clone());
            }
        }
    }

    Ok(())
}

/// Regular files already in a dump directory, outside partition outputs
///
/// Top-level directories named after a requested, already extracted or
/// default partition are skipped, as is the firmware directory.
fn collect_dump_files(ctx: &ExtractCtx, dump_path: &Path) -> Vec<PathBuf> {
    let skipped_dirs: HashSet<&str> = ctx
        .extract_partitions
        .iter()
        .chain(ctx.already_extracted.iter())
        .map(String::as_str)
        .chain(DEFAULT_EXTRACTED_PARTITIONS.iter().copied())
        .chain(std::iter::once(FIRMWARE_DIR))
        .collect();

    WalkDir::new(dump_path)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            !(entry.depth() == 1
                && entry.file_type().is_dir()
                && skipped_dirs.contains(entry.file_name().to_string_lossy().as_ref()))
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("Failed to read dump entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Run the registered handlers over the candidates and everything they produce
///
/// Files written into the firmware directory are final and never go back
/// through the handlers. Returns every file seen, candidates first, in
/// processing order, followed by the firmware outputs.
fn run_handlers(
    ctx: &ExtractCtx,
    dump_path: &Path,
    candidates: Vec<PathBuf>,
    stats: &mut ExtractStats,
) -> Result<Vec<PathBuf>> {
    let firmware_dir = dump_path.join(FIRMWARE_DIR);
    let mut queue: VecDeque<PathBuf> = candidates.into();
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut files = Vec::new();
    let mut firmware_files = Vec::new();

    while let Some(file) = queue.pop_front() {
        if !seen.insert(file.clone()) {
            continue;
        }

        let name = file_name(&file);
        for handler in ctx.extract_fns.handlers_for(&name) {
            let produced = handler
                .run(ctx, &file, dump_path)
                .with_context(|| format!("{} failed on {}", handler, file.display()))?;
            stats.handler_runs += 1;

            for path in produced {
                if path.starts_with(&firmware_dir) {
                    if seen.insert(path.clone()) {
                        firmware_files.push(path);
                    }
                } else {
                    queue.push_back(path);
                }
            }
        }

        files.push(file);
    }

    files.extend(firmware_files);
    Ok(files)
}

/// Unpack each requested partition image into its own directory
fn extract_partitions(
    ctx: &ExtractCtx,
    dump_path: &Path,
    files: &[PathBuf],
    stats: &mut ExtractStats,
) -> Result<()> {
    let pb = ProgressBar::new(ctx.extract_partitions.len() as u64);
    pb.set_draw_target(ProgressDrawTarget::stderr());
    if let Ok(style) = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} partitions {msg}")
    {
        pb.set_style(style.progress_chars("=>-"));
    }

    for partition in &ctx.extract_partitions {
        pb.set_message(partition.clone());

        let image_name = ExtractCtx::partition_image_name(partition);
        let Some(image) = files.iter().find(|f| file_name(f) == image_name) else {
            log::warn!("No image found for partition {}", partition);
            stats.partitions_missing.push(partition.clone());
            pb.inc(1);
            continue;
        };

        if extract_partition(ctx, dump_path, partition, image)? {
            stats.partitions_extracted += 1;
        } else {
            stats.partitions_unsupported.push(partition.clone());
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    Ok(())
}

/// Unpack one partition image; false when its format is not supported
fn extract_partition(
    ctx: &ExtractCtx,
    dump_path: &Path,
    partition: &str,
    image: &Path,
) -> Result<bool> {
    let raw_path = dump_path.join(format!("{}.raw.img", partition));
    let sparse = sparse::is_sparse(image)?;

    // The expanded copy is only needed while unpacking
    let _raw_guard = scopeguard::guard(sparse, |sparse| {
        if sparse {
            let _ = fs::remove_file(&raw_path);
        }
    });

    let raw_image = if sparse {
        log::info!("Converting sparse image {}", image.display());
        sparse::unsparse(image, &raw_path)?;
        raw_path.as_path()
    } else {
        image
    };

    let kind = image::detect_fs(raw_image)?;
    if kind == FsKind::Unknown {
        log::warn!(
            "Unsupported filesystem in {}, leaving it unextracted",
            image.display()
        );
        return Ok(false);
    }

    let partition_dir = dump_path.join(partition);
    let dir_guard = scopeguard::guard(partition_dir.clone(), |dir| {
        let _ = fs::remove_dir_all(dir);
    });

    image::unpack_fs_image(raw_image, &partition_dir, kind, &ctx.config.tools)
        .with_context(|| format!("Failed to extract partition {}", partition))?;

    scopeguard::ScopeGuard::into_inner(dir_guard);
    log::info!("Extracted partition {} into {}", partition, partition_dir.display());

    Ok(true)
}
