//! Import command implementation.

use crate::cli::ImportArgs;
use crate::config::{load_config, resolve_layout};
use crate::error::{Error, Result};
use crate::import::{GapReason, IdMapper, ImportStats, Importer};
use crate::validate::is_valid_name;
use colored::Colorize;
use std::path::Path;

/// Execute the import command.
///
/// # Errors
///
/// Returns an error if the project is not initialized, the source name is
/// not usable as a file name, the input file is missing, or the store
/// cannot be read.
pub fn execute(args: &ImportArgs, dir: Option<&Path>, json: bool) -> Result<()> {
    if !is_valid_name(&args.source) {
        return Err(Error::InvalidArgument(format!(
            "Invalid source name: {:?}",
            args.source
        )));
    }

    let layout = resolve_layout(dir)?;
    let config = load_config(&layout)?;
    let store = layout.store();

    let mut mapper = IdMapper::load(
        &layout.mapping_path(&args.source),
        &args.source,
        &config.id_prefix,
    );
    let stats = Importer::new(&store, &mut mapper).import_file(&args.file)?;

    if json {
        println!("{}", serde_json::to_string(&stats)?);
    } else {
        print_stats(&args.source, &stats);
    }
    Ok(())
}

fn print_stats(source: &str, stats: &ImportStats) {
    println!(
        "Imported from {source}: {} written ({} new, {} merged), {} skipped",
        stats.written().to_string().green(),
        stats.imported,
        stats.merged,
        stats.skipped
    );

    if stats.malformed > 0 || stats.duplicates > 0 || stats.failed > 0 {
        println!(
            "  {} {} malformed line(s), {} repeated id(s), {} failed write(s)",
            "!".yellow().bold(),
            stats.malformed,
            stats.duplicates,
            stats.failed
        );
    }
    if stats.dropped_references > 0 {
        println!(
            "  {} {} unresolved reference(s) dropped",
            "!".yellow().bold(),
            stats.dropped_references
        );
    }

    if !stats.gaps.is_empty() {
        println!();
        println!("{}", "Untranslated links:".yellow().bold());
        for gap in &stats.gaps {
            let reason = match gap.reason {
                GapReason::UnsupportedRelation => "unsupported link type",
                GapReason::InverseTargetOutsideBatch => "target not in this batch",
            };
            println!(
                "  {} ({}) {} {}: {reason}",
                gap.issue_id, gap.foreign_id, gap.link_type, gap.target
            );
        }
    }

    if !stats.findings.is_empty() {
        println!();
        println!("{}", "Consistency findings:".yellow().bold());
        for finding in &stats.findings {
            println!("  {finding}");
        }
    }

    if !stats.mapping_saved {
        println!();
        println!(
            "{}",
            "Identifier mapping could not be saved; re-importing these records recovers their IDs from issue provenance."
                .yellow()
        );
    }
}
