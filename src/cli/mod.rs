//! CLI interface using clap.
//!
//! Provides command-line arguments and subcommands for the tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::application::OutputFormat;

/// Thread Archive - store chat threads and export them to Markdown, zip or PDF.
///
/// Quick start: thread-archive create "Notes" | add <id> "hello" | export <id> --to pdf -o notes.pdf
#[derive(Parser, Debug)]
#[command(name = "thread-archive")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (use multiple times for more verbosity).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format: markdown, json, or table.
    #[arg(short, long, default_value = "markdown")]
    pub format: String,

    /// Data directory (defaults to ~/.thread-archive).
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List all threads (most recently modified first).
    List {
        /// Maximum number of threads to show.
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Create a new empty thread.
    Create {
        /// Thread name (defaults to the creation time).
        name: Option<String>,
    },

    /// Show a thread in detail.
    Show {
        /// Thread ID (full or unique prefix).
        thread_id: String,

        /// Show only the last N messages.
        #[arg(short, long)]
        last: Option<usize>,
    },

    /// Delete a thread with its images and exports.
    Delete {
        /// Thread ID (full or unique prefix).
        thread_id: String,
    },

    /// Append a message to a thread.
    Add {
        /// Thread ID (full or unique prefix).
        thread_id: String,

        /// Message text (caption for image messages).
        text: Option<String>,

        /// Message author role.
        #[arg(short, long, default_value = "user")]
        role: String,

        /// Attach an image file; the message becomes an image message.
        #[arg(short, long)]
        image: Option<PathBuf>,
    },

    /// Export a thread and wait for the result.
    Export {
        /// Thread ID (full or unique prefix).
        thread_id: String,

        /// Deliverable: md, zip or pdf.
        #[arg(short, long, default_value = "zip")]
        to: String,

        /// Copy the finished artifact to this path.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Give up waiting after this many seconds.
        #[arg(long, default_value = "120")]
        timeout_secs: u64,
    },

    /// Show which PDF converters are configured and installed.
    Converters,

    /// Show statistics about stored threads and disk usage.
    Stats,

    /// Show data paths being used.
    Paths,

    /// Write a default configuration file.
    InitConfig {
        /// Overwrite an existing file with the effective configuration.
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    /// Parse the output format argument.
    pub fn output_format(&self) -> Result<OutputFormat, String> {
        self.format.parse()
    }
}
