//! Progress reporting for archive runs
//!
//! Provides real-time progress display using indicatif progress bars.

use crate::archive::Compression;
use crate::walker::{ArchiveProgress, ArchiveSummary};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner showing archive status
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        bar.set_style(style);

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the progress display
    pub fn update(&self, progress: &ArchiveProgress) {
        let msg = format!(
            "Levels: {} | Objects: {} | Size: {} | Rate: {:.0}/s | Queued: {}",
            format_number(progress.levels),
            format_number(progress.objects),
            format_size(progress.bytes, BINARY),
            progress.objects_per_second(),
            progress.pending,
        );

        self.bar.set_message(msg);
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| {
            chunk
                .iter()
                .rev()
                .map(|&b| b as char)
                .collect::<String>()
        })
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Compressed size as a percentage of the tar stream
fn ratio(summary: &ArchiveSummary) -> Option<f64> {
    (summary.archive_bytes > 0)
        .then(|| summary.output_bytes as f64 * 100.0 / summary.archive_bytes as f64)
}

/// Print a summary of a saved archive
pub fn print_summary(summary: &ArchiveSummary) {
    let duration_secs = summary.duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        summary.objects as f64 / duration_secs
    } else {
        0.0
    };

    println!();
    println!("{}", style("Archive Complete").green().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {}",
        style("Levels:").bold(),
        format_number(summary.levels)
    );
    println!(
        "  {} {}",
        style("Objects:").bold(),
        format_number(summary.objects)
    );
    println!(
        "  {} {}",
        style("Total Size:").bold(),
        format_size(summary.payload_bytes, BINARY)
    );
    println!(
        "  {} {:.1}s ({:.0} objects/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    match ratio(summary) {
        Some(pct) => println!(
            "  {} {} ({} {:.1}% of tar)",
            style("Archive:").bold(),
            summary.output.display(),
            format_size(summary.output_bytes, BINARY),
            pct
        ),
        None => println!(
            "  {} {} ({})",
            style("Archive:").bold(),
            summary.output.display(),
            format_size(summary.output_bytes, BINARY)
        ),
    }
    println!();
}

/// Print a header at the start of the run
pub fn print_header(url: &str, workers: usize, output: &str, compression: Compression) {
    println!();
    println!(
        "{} {}",
        style("bucket-tar").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Source:").bold(), url);
    println!("  {} {}", style("Workers:").bold(), workers);
    println!("  {} {}", style("Compression:").bold(), compression.name());
    println!("  {} {}", style("Output:").bold(), output);
    println!();
}
