//! Terminal output formatting for threads and export jobs.
//!
//! Supports multiple output formats: Markdown, JSON, and table view.

use std::fmt::Write as _;

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};

use crate::domain::{ExportJob, ExportStatus, Thread, EXTRA_FILE_PATH};

use super::storage_manager::StorageSummary;

/// Output format options.
#[derive(Debug, Clone, Copy, Default)]
pub enum OutputFormat {
    /// Human-readable Markdown format.
    #[default]
    Markdown,
    /// JSON format for programmatic use.
    Json,
    /// Compact table listing.
    Table,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            "table" => Ok(Self::Table),
            _ => Err(format!("Unknown format: {s}. Use: markdown, json, table")),
        }
    }
}

/// Formats a single thread as Markdown for the terminal.
#[must_use]
pub fn format_thread_markdown(thread: &Thread) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "# {} ({})\n", thread.name, thread.short_id());
    let _ = writeln!(
        out,
        "**Created:** {}",
        thread.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(
        out,
        "**Modified:** {}",
        thread.modified_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(
        out,
        "**Messages:** {} ({} images)\n",
        thread.message_count(),
        thread.image_count()
    );
    out.push_str("---\n\n");

    for message in &thread.messages {
        let _ = writeln!(
            out,
            "### {} *{}*\n",
            message.role,
            message.created_at.format("%H:%M:%S")
        );

        if message.is_image() {
            match message.extra_str(EXTRA_FILE_PATH) {
                Some(path) => {
                    let _ = writeln!(out, "[image: {path}]\n");
                }
                None => out.push_str("[image: inline data]\n\n"),
            }
        }

        if !message.text.is_empty() {
            out.push_str(&message.text);
            out.push_str("\n\n");
        }

        out.push_str("---\n\n");
    }

    out
}

/// Formats threads as JSON.
///
/// # Errors
/// Returns error if serialization fails.
pub fn format_threads_json(threads: &[Thread]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(threads)
}

/// Formats a table listing of threads.
#[must_use]
pub fn format_threads_table(threads: &[Thread]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["ID", "Modified", "Msgs", "Imgs", "Name", "Preview"]);

    for thread in threads {
        table.add_row(vec![
            thread.short_id().to_string(),
            thread.modified_at.format("%Y-%m-%d %H:%M").to_string(),
            thread.message_count().to_string(),
            thread.image_count().to_string(),
            truncate(&thread.name, 24),
            truncate(thread.preview(), 35),
        ]);
    }

    table.to_string()
}

/// Formats one export job as a status line.
#[must_use]
pub fn format_job(job: &ExportJob) -> String {
    let status = match job.status {
        ExportStatus::Pending => job.status.to_string().yellow(),
        ExportStatus::Working => job.status.to_string().blue(),
        ExportStatus::Done => job.status.to_string().green(),
        ExportStatus::Failed => job.status.to_string().red(),
    };

    let mut out = format!(
        "{} {} [{}] {}",
        "Export".bold(),
        job.id,
        job.format,
        status.bold()
    );
    if let Some(path) = &job.result_path {
        let _ = write!(out, "\n  {} {}", "→".green(), path.display());
    }
    if let Some(error) = &job.error {
        let _ = write!(out, "\n  {} {}", "✗".red(), error);
    }
    out
}

/// Formats an export job as JSON.
///
/// # Errors
/// Returns error if serialization fails.
pub fn format_job_json(job: &ExportJob) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(job)
}

/// Formats converter availability.
#[must_use]
pub fn format_converters(availability: &[(String, bool)]) -> String {
    if availability.is_empty() {
        return format!("{}\n  (none configured)", "📄 PDF converters".bold());
    }

    let mut out = "📄 PDF converters".bold().to_string();
    for (i, (name, available)) in availability.iter().enumerate() {
        let state = if *available {
            "available".green()
        } else {
            "not installed".red()
        };
        let _ = write!(out, "\n  {}. {name}: {state}", i + 1);
    }
    out
}

/// Formats storage statistics for display.
#[must_use]
pub fn format_stats(summary: &StorageSummary) -> String {
    format!(
        "{}\n  Threads: {}\n  Messages: {}\n  Images: {}\n  Export artifacts: {}\n\n{}\n  Store: {}\n  Assets: {}\n  Exports: {}\n  Total: {}",
        "📊 Statistics".bold(),
        summary.thread_count.to_string().cyan(),
        summary.message_count.to_string().cyan(),
        summary.image_count.to_string().green(),
        summary.artifact_count.to_string().yellow(),
        "💾 Disk usage".bold(),
        summary.store_human(),
        summary.assets_human(),
        summary.exports_human(),
        summary.total_human().bold()
    )
}

/// Truncates a string to max characters with ellipsis.
fn truncate(s: &str, max_len: usize) -> String {
    let s = s.lines().next().unwrap_or(s);
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{head}...")
    }
}
