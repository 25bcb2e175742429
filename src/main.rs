//! bucket-tar - Archive an object-store prefix into one compressed tarball
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use bucket_tar::config::{ArchiveConfig, CliArgs};
use bucket_tar::progress::{print_header, print_summary, ProgressReporter};
use bucket_tar::walker::ArchiveCoordinator;
use clap::Parser;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    // Validate and create config
    let config = ArchiveConfig::from_args(args).context("Invalid configuration")?;

    if config.show_progress {
        print_header(
            &config.bucket_url.to_display_string(),
            config.worker_count,
            &config.output_path.display().to_string(),
            config.compression,
        );
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create async runtime")?;

    runtime.block_on(run_archive(config))
}

async fn run_archive(config: ArchiveConfig) -> Result<()> {
    let coordinator =
        ArchiveCoordinator::new(config.clone()).context("Failed to open bucket")?;

    // Setup signal handler for graceful shutdown
    let shutdown_flag = coordinator.shutdown_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, shutting down...");
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let progress = config.show_progress.then(ProgressReporter::new);

    if let Some(ref p) = progress {
        p.set_status("Listing bucket...");
    }

    let result = coordinator
        .run_with_progress(|snapshot| {
            if let Some(ref p) = progress {
                p.update(snapshot);
            }
        })
        .await;

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            if let Some(ref p) = progress {
                p.finish_and_clear();
            }
            return Err(e).context("Archive failed");
        }
    };

    if let Some(ref p) = progress {
        p.finish("Archive saved");
    }

    if config.show_progress {
        print_summary(&summary);
    }

    info!(
        objects = summary.objects,
        output = %summary.output.display(),
        "Done"
    );

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("bucket_tar=debug,warn")
    } else {
        EnvFilter::new("bucket_tar=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
