//! User-facing terminal messages
//!
//! Plain colored lines on stderr, kept separate from the `log` output so the
//! result of a run stays readable without `-v`.

use owo_colors::OwoColorize;

use crate::models::{DispatchOutcome, ExtractStats};

/// Display an error message to the user in red with padding
pub fn error(message: &str) {
    eprintln!("\n{}\n", message.red());
}

/// Display a warning message to the user in yellow
pub fn warn(message: &str) {
    eprintln!("{}", message.yellow());
}

/// Display an informational message to the user in default color
pub fn info(message: &str) {
    eprintln!("{}", message);
}

/// Lines summarising an extraction, warnings flagged
pub fn summary_lines(stats: &ExtractStats) -> Vec<(bool, String)> {
    let mut lines = vec![(
        false,
        format!(
            "Extracted {} partition(s) ({} file(s) unpacked, {} handler run(s))",
            stats.partitions_extracted, stats.files_unpacked, stats.handler_runs
        ),
    )];

    if !stats.partitions_missing.is_empty() {
        lines.push((
            true,
            format!("Not found: {}", stats.partitions_missing.join(", ")),
        ));
    }
    if !stats.partitions_unsupported.is_empty() {
        lines.push((
            true,
            format!("Unsupported image format: {}", stats.partitions_unsupported.join(", ")),
        ));
    }

    lines
}

/// Report how a dispatch ended
pub fn outcome(outcome: &DispatchOutcome) {
    match outcome {
        DispatchOutcome::NothingToExtract => info("Nothing to extract"),
        DispatchOutcome::Extracted(stats) => {
            for (is_warning, line) in summary_lines(stats) {
                if is_warning {
                    warn(&line);
                } else {
                    info(&line);
                }
            }
        }
    }
}
