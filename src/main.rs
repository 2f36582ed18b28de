//! Thread Archive - file-backed chat threads with background export.
//!
//! Threads and their messages live in a single JSON document under the data
//! directory. Exports render a thread to Markdown with its images, package
//! the bundle as a zip and optionally convert it to PDF through whichever
//! external converter is installed.
//!
//! QUICK START:
//!   thread-archive create "Trip notes"            # New thread, prints its id
//!   thread-archive add <id> "hello"               # Append a text message
//!   thread-archive add <id> "map" --image map.png # Append an image message
//!   thread-archive show <id> --last 5             # View recent messages
//!   thread-archive export <id> --to pdf -o t.pdf  # Render and fetch a PDF

mod application;
mod cli;
mod domain;
mod infrastructure;

use std::path::Path;
use std::time::{Duration, Instant};

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use application::{
    format_converters, format_job, format_job_json, format_stats, format_thread_markdown,
    format_threads_json, format_threads_table, ArchiveService, OutputFormat, StorageManager,
};
use cli::{Cli, Commands};
use domain::{encode_data_uri, AppConfig, AppError, ExportFormat, NewMessage};
use infrastructure::{ensure_config_exists, load_config, save_config, ConverterChain};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Main application logic.
async fn run(cli: Cli) -> domain::Result<()> {
    let format = cli
        .output_format()
        .map_err(|e| AppError::Config { message: e })?;
    let config = load_config(cli.data_dir.as_deref())?;

    match cli.command {
        Commands::List { limit } => {
            with_archive(&config, |archive| cmd_list(archive, limit, format)).await?;
        }
        Commands::Create { name } => {
            with_archive(&config, |archive| cmd_create(archive, name.as_deref(), format)).await?;
        }
        Commands::Show { thread_id, last } => {
            with_archive(&config, |archive| cmd_show(archive, &thread_id, last, format)).await?;
        }
        Commands::Delete { thread_id } => {
            with_archive(&config, |archive| cmd_delete(archive, &thread_id)).await?;
        }
        Commands::Add {
            thread_id,
            text,
            role,
            image,
        } => {
            with_archive(&config, |archive| {
                cmd_add(archive, &thread_id, &role, text, image.as_deref())
            })
            .await?;
        }
        Commands::Export {
            thread_id,
            to,
            output,
            timeout_secs,
        } => {
            let archive = ArchiveService::open(&config)?;
            let result = cmd_export(
                &archive,
                &config,
                &thread_id,
                &to,
                output.as_deref(),
                Duration::from_secs(timeout_secs),
                format,
            )
            .await;
            archive.shutdown().await;
            result?;
        }
        Commands::Converters => {
            cmd_converters(&config)?;
        }
        Commands::Stats => {
            with_archive(&config, cmd_stats).await?;
        }
        Commands::Paths => {
            cmd_paths(&config);
        }
        Commands::InitConfig { force } => {
            cmd_init_config(&config, cli.data_dir.as_deref(), force)?;
        }
    }

    Ok(())
}

/// Open the archive, run one synchronous command and stop the worker.
async fn with_archive<F>(config: &AppConfig, command: F) -> domain::Result<()>
where
    F: FnOnce(&ArchiveService) -> domain::Result<()>,
{
    let archive = ArchiveService::open(config)?;
    let result = command(&archive);
    archive.shutdown().await;
    result
}

/// List threads command.
fn cmd_list(archive: &ArchiveService, limit: usize, format: OutputFormat) -> domain::Result<()> {
    let mut threads = archive.list_threads()?;
    threads.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
    let total = threads.len();
    threads.truncate(limit);

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                format_threads_json(&threads).map_err(AppError::json_parse)?
            );
        }
        OutputFormat::Markdown | OutputFormat::Table => {
            println!("{}", format_threads_table(&threads));
            println!();
            println!("Showing {} of {} thread(s)", threads.len(), total);
        }
    }

    Ok(())
}

/// Create thread command.
fn cmd_create(
    archive: &ArchiveService,
    name: Option<&str>,
    format: OutputFormat,
) -> domain::Result<()> {
    let thread = archive.create_thread(name)?;

    match format {
        OutputFormat::Json => println!(
            "{}",
            format_threads_json(std::slice::from_ref(&thread)).map_err(AppError::json_parse)?
        ),
        OutputFormat::Markdown | OutputFormat::Table => {
            println!(
                "{} Created thread {} ({})",
                "✓".green().bold(),
                thread.name.cyan(),
                thread.id
            );
        }
    }

    Ok(())
}

/// Show a single thread.
fn cmd_show(
    archive: &ArchiveService,
    id: &str,
    last: Option<usize>,
    format: OutputFormat,
) -> domain::Result<()> {
    let thread_id = archive.resolve_thread_id(id)?;
    let mut thread = archive.get_thread(&thread_id)?;

    // Apply --last filter if specified
    if let Some(n) = last {
        let len = thread.messages.len();
        if n < len {
            thread.messages.drain(..len - n);
        }
    }

    let output = match format {
        OutputFormat::Markdown => format_thread_markdown(&thread),
        OutputFormat::Json => {
            format_threads_json(std::slice::from_ref(&thread)).map_err(AppError::json_parse)?
        }
        OutputFormat::Table => format_threads_table(std::slice::from_ref(&thread)),
    };

    println!("{output}");
    Ok(())
}

/// Delete thread command.
fn cmd_delete(archive: &ArchiveService, id: &str) -> domain::Result<()> {
    let thread_id = archive.resolve_thread_id(id)?;
    archive.delete_thread(&thread_id)?;

    println!("{} Deleted thread {}", "✓".green().bold(), thread_id);
    Ok(())
}

/// Append message command.
fn cmd_add(
    archive: &ArchiveService,
    id: &str,
    role: &str,
    text: Option<String>,
    image: Option<&Path>,
) -> domain::Result<()> {
    let thread_id = archive.resolve_thread_id(id)?;

    let new = match image {
        Some(path) => {
            let bytes = std::fs::read(path)
                .map_err(|e| AppError::io(format!("Failed to read image {}", path.display()), e))?;
            let ext = path.extension().and_then(|e| e.to_str());
            NewMessage::image_base64(role, text.unwrap_or_default(), encode_data_uri(ext, &bytes))
        }
        None => {
            let text = text.ok_or_else(|| AppError::InvalidInput {
                message: "Message text is required unless --image is given".into(),
            })?;
            NewMessage::text(role, text)
        }
    };

    let message = archive.add_message(&thread_id, new)?;

    println!(
        "{} Added {} message {} to {}",
        "✓".green().bold(),
        message.kind,
        message.id,
        thread_id
    );
    Ok(())
}

/// Export command: enqueue, wait for a terminal status, fetch the artifact.
async fn cmd_export(
    archive: &ArchiveService,
    config: &AppConfig,
    id: &str,
    to: &str,
    output: Option<&Path>,
    timeout: Duration,
    format: OutputFormat,
) -> domain::Result<()> {
    let export_format: ExportFormat = to
        .parse()
        .map_err(|message| AppError::InvalidInput { message })?;
    let thread_id = archive.resolve_thread_id(id)?;

    let mut job = archive.export_thread(&thread_id, export_format)?;
    let deadline = Instant::now() + timeout;

    while !job.status.is_terminal() && Instant::now() < deadline {
        tokio::time::sleep(config.poll_interval()).await;
        job = archive.export_status(Some(thread_id.as_str()), &job.id)?;
    }

    match format {
        OutputFormat::Json => println!("{}", format_job_json(&job).map_err(AppError::json_parse)?),
        OutputFormat::Markdown | OutputFormat::Table => println!("{}", format_job(&job)),
    }

    // Conflict unless the job finished
    let artifact = archive.download(Some(thread_id.as_str()), &job.id)?;

    if let Some(dest) = output {
        std::fs::copy(&artifact, dest)
            .map_err(|e| AppError::io(format!("Failed to copy export to {}", dest.display()), e))?;
        println!("{} Saved to {}", "✓".green().bold(), dest.display());
    }

    Ok(())
}

/// Converter availability command.
fn cmd_converters(config: &AppConfig) -> domain::Result<()> {
    let chain = ConverterChain::from_names(&config.export.pdf_converters)?;
    println!("{}", format_converters(&chain.availability()));
    Ok(())
}

/// Show statistics command.
fn cmd_stats(archive: &ArchiveService) -> domain::Result<()> {
    let threads = archive.list_threads()?;
    let summary = StorageManager::new(archive.layout().clone()).get_summary(&threads)?;
    println!("{}", format_stats(&summary));
    Ok(())
}

/// Show data paths command.
fn cmd_paths(config: &AppConfig) {
    let layout = config.layout();
    let config_path = config.config_file_path();

    println!("{}", "📂 Thread Archive Paths".bold());
    println!();

    let entries = [
        ("data", layout.root().to_path_buf()),
        ("config", config_path),
        ("store", layout.store_path()),
        ("assets", layout.assets_dir()),
        ("exports", layout.exports_dir()),
    ];

    for (label, path) in &entries {
        let state = if path.exists() {
            "exists".green()
        } else {
            "missing".yellow()
        };
        println!("  {:8} [{}] {}", label, state, path.display());
    }
}

/// Write default configuration command.
fn cmd_init_config(config: &AppConfig, data_dir: Option<&Path>, force: bool) -> domain::Result<()> {
    if force {
        save_config(config)?;
        println!(
            "{} Wrote configuration to {}",
            "✓".green().bold(),
            config.config_file_path().display()
        );
        return Ok(());
    }

    let (path, created) = ensure_config_exists(data_dir)?;
    if created {
        println!("{} Created {}", "✓".green().bold(), path.display());
    } else {
        println!(
            "{} {} already exists (use --force to overwrite)",
            "•".yellow(),
            path.display()
        );
    }
    Ok(())
}

/// Setup tracing/logging based on verbosity level.
fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
