//! Terminal output for the `desktop-cleaner` binary.
//!
//! Provides a centralized interface for all CLI output: colored status lines,
//! the organize progress bar and the tables printed after an organize run or
//! when listing workspaces and snapshots. Library modules never print; only the
//! binary calls into this module.

use crate::organize::OrganizeReport;
use crate::registry::{Snapshot, Workspace};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;

/// Stateless namespace for styled status lines, the organize progress bar and
/// the report tables.
pub struct OutputFormatter;

impl OutputFormatter {
    /// `✓ message` in green.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use desktop_cleaner::output::OutputFormatter;
    /// OutputFormatter::success("Workspace created");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message to stderr in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// `⚠ message`; warnings go to stdout so they interleave with progress.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Creates a progress bar for file tasks. The organize engine sets the
    /// length once it knows how many files it will process.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use desktop_cleaner::output::OutputFormatter;
    /// let pb = OutputFormatter::create_progress_bar(0);
    /// pb.set_length(100);
    /// pb.inc(1);
    /// pb.finish_with_message("Completed!");
    /// ```
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        pb.set_style(style);
        pb
    }

    /// Prints a per-folder table of completed operations followed by the
    /// counts of files that were left alone.
    pub fn organize_summary(report: &OrganizeReport) {
        let mut folder_counts: BTreeMap<&str, usize> = BTreeMap::new();
        for op in &report.operations {
            *folder_counts.entry(op.category.as_str()).or_default() += 1;
        }

        Self::header(if report.dry_run {
            "SUMMARY (planned)"
        } else {
            "SUMMARY"
        });

        let max_folder_len = folder_counts
            .keys()
            .map(|name| name.len())
            .max()
            .unwrap_or(0)
            .max(6); // At least "Folder" width

        println!(
            "{:<width$} | {}",
            "Folder".bold(),
            "Files".bold(),
            width = max_folder_len
        );
        println!("{}", "-".repeat(max_folder_len + 10));

        for (folder, count) in &folder_counts {
            println!(
                "{:<width$} | {} {}",
                folder,
                count.to_string().green(),
                plural(*count),
                width = max_folder_len
            );
        }

        println!("{}", "-".repeat(max_folder_len + 10));
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            report.completed().to_string().green().bold(),
            plural(report.completed()),
            width = max_folder_len
        );

        for (label, count) in [
            ("skipped due to conflicts", report.skipped_conflicts),
            ("without a matching rule", report.unmatched),
            ("ignored", report.ignored),
            ("already in place", report.already_in_place),
        ] {
            if count > 0 {
                Self::plain(&format!("{count} {} {label}", plural(count)));
            }
        }
    }

    /// Prints workspaces with their 1-based display index.
    pub fn workspace_table(workspaces: &[Workspace]) {
        if workspaces.is_empty() {
            Self::info("No workspaces registered");
            return;
        }
        Self::header("WORKSPACES");
        for (i, ws) in workspaces.iter().enumerate() {
            println!(
                "{:>3}  {}  {}  {}",
                (i + 1).to_string().bold(),
                ws.id.to_string().dimmed(),
                ws.created_at.format("%Y-%m-%d %H:%M:%S"),
                ws.root_path.display()
            );
        }
    }

    pub fn snapshot_table(snapshots: &[Snapshot]) {
        if snapshots.is_empty() {
            Self::info("No snapshots taken");
            return;
        }
        Self::header("SNAPSHOTS");
        for snapshot in snapshots {
            println!(
                "{}  {}  {} bytes",
                snapshot.id.to_string().dimmed(),
                snapshot.taken_at.format("%Y-%m-%d %H:%M:%S"),
                snapshot.directory_state.len()
            );
        }
    }

    /// Prefixes `message` with `[DRY RUN]`.
    pub fn dry_run_notice(message: &str) {
        println!("{} {}", "[DRY RUN]".yellow().bold(), message.yellow());
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "file" } else { "files" }
}
