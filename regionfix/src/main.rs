use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use regionfix_check::{ChunkRef, backup_region_dirs, delete_chunks, region_files, repair, scan_world};
use regionfix_stats::ScanMetrics;

#[derive(Parser)]
#[command(
    name = "region-fixer",
    version,
    about = "Check the integrity of Minecraft region files and fix them, when possible, using backups of the world"
)]
pub struct Args {
    /// Minecraft world directory. With no other option the world is only scanned.
    #[arg(long, env = "REGIONFIX_WORLD")]
    pub world: PathBuf,

    /// Backup world directories used to fix corrupted chunks, tried in order.
    /// Comma separated. Nothing checks these are the same world!
    #[arg(long, value_delimiter = ',')]
    pub backups_corrupted: Vec<PathBuf>,

    /// Same as --backups-corrupted, for wrong located chunks.
    #[arg(long, visible_alias = "backups-wrong-located", value_delimiter = ',')]
    pub backups_misplaced: Vec<PathBuf>,

    /// [WARNING] Delete corrupted chunks that could not be fixed.
    /// Only the header entry is cleared; the server regenerates the chunk.
    #[arg(long)]
    pub delete_corrupted: bool,

    /// [WARNING] Delete wrong located chunks that could not be fixed.
    #[arg(long, visible_alias = "delete-wrong-located")]
    pub delete_misplaced: bool,

    /// Threads used for scanning (0 = one per CPU).
    #[arg(long, env = "REGIONFIX_THREADS", default_value_t = 0)]
    pub threads: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.threads)
            .build_global()?;
    }

    let interrupt = Arc::new(AtomicBool::new(false));
    let flag = interrupt.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted by user, stopping...");
            flag.store(true, Ordering::Relaxed);
        }
    });

    let metrics = Arc::new(ScanMetrics::new());
    let report = metrics.clone();
    tokio::task::spawn_blocking(move || run(&args, &report, &interrupt)).await??;

    println!("\n{}", metrics.generate_report());
    Ok(())
}

fn run(args: &Args, metrics: &ScanMetrics, interrupt: &AtomicBool) -> anyhow::Result<()> {
    println!("Welcome to Region Fixer!");

    let backups_corrupted = backup_list(&args.backups_corrupted);
    let backups_misplaced = backup_list(&args.backups_misplaced);

    println!("Scanning directory...");
    let files = region_files(&args.world)?;
    println!(
        "There are {} region files found on the world directory.",
        files.len()
    );

    println!("\n{:#^60}", " Scanning for corrupted chunks ");
    let scan = scan_world(&files, metrics, interrupt);
    for skipped in &scan.skipped {
        println!("Skipped {}: {}", skipped.path.display(), skipped.reason);
    }

    let corrupt = scan.corrupt();
    let misplaced = scan.misplaced();
    println!(
        "Found {} corrupted and {} wrong located chunks of a total of {}",
        corrupt.len(),
        misplaced.len(),
        scan.total()
    );

    if scan.interrupted {
        println!("\nInterrupted by user, nothing was fixed or deleted.");
        return Ok(());
    }

    let corrupt = fix_chunks(
        corrupt,
        backups_corrupted.as_deref(),
        "corrupted",
        metrics,
        interrupt,
    );
    let misplaced = fix_chunks(
        misplaced,
        backups_misplaced.as_deref(),
        "wrong located",
        metrics,
        interrupt,
    );

    if interrupt.load(Ordering::Relaxed) {
        println!("\nInterrupted by user, nothing was deleted.");
        return Ok(());
    }
    if args.delete_corrupted {
        delete_unfixed(&corrupt, "corrupted", metrics, interrupt);
    }
    if args.delete_misplaced {
        delete_unfixed(&misplaced, "wrong located", metrics, interrupt);
    }

    Ok(())
}

/// `None` when no backups were asked for.
fn backup_list(worlds: &[PathBuf]) -> Option<Vec<PathBuf>> {
    if worlds.is_empty() {
        return None;
    }
    let dirs = backup_region_dirs(worlds);
    if dirs.is_empty() {
        println!("[WARNING] No valid backup directories found.");
    }
    Some(dirs)
}

/// Repair `chunks` from `backups` when any were given. Returns what is left broken.
fn fix_chunks(
    chunks: Vec<ChunkRef>,
    backups: Option<&[PathBuf]>,
    kind: &str,
    metrics: &ScanMetrics,
    interrupt: &AtomicBool,
) -> Vec<ChunkRef> {
    let Some(backups) = backups else {
        return chunks;
    };
    if chunks.is_empty() || interrupt.load(Ordering::Relaxed) {
        return chunks;
    }

    println!("\n{:#^60}", format!(" Trying to fix {kind} chunks "));
    let outcome = repair(&chunks, backups, interrupt);
    metrics.record_repair(outcome.fixed, outcome.unresolved.len());
    println!(
        "{} fixed chunks of a total of {} {} chunks",
        outcome.fixed,
        chunks.len(),
        kind
    );
    outcome.unresolved
}

fn delete_unfixed(chunks: &[ChunkRef], kind: &str, metrics: &ScanMetrics, interrupt: &AtomicBool) {
    if chunks.is_empty() {
        return;
    }

    println!("\n{:#^60}", format!(" Deleting {kind} chunks "));
    let deleted = delete_chunks(chunks, interrupt);
    metrics.record_deleted(deleted);
    println!("Deleted {deleted} {kind} chunks");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backup_lists() {
        let args = Args::parse_from([
            "region-fixer",
            "--world",
            "/srv/world",
            "--backups-corrupted",
            "/b/one,/b/two",
            "--backups-wrong-located",
            "/b/three",
            "--delete-corrupted",
        ]);
        assert_eq!(args.world, PathBuf::from("/srv/world"));
        assert_eq!(
            args.backups_corrupted,
            vec![PathBuf::from("/b/one"), PathBuf::from("/b/two")]
        );
        assert_eq!(args.backups_misplaced, vec![PathBuf::from("/b/three")]);
        assert!(args.delete_corrupted);
        assert!(!args.delete_misplaced);
        assert_eq!(args.threads, 0);
    }

    #[test]
    fn test_report_only_by_default() {
        let args = Args::parse_from(["region-fixer", "--world", "w"]);
        assert!(args.backups_corrupted.is_empty());
        assert!(args.backups_misplaced.is_empty());
        assert!(!args.delete_corrupted && !args.delete_misplaced);
    }
}
