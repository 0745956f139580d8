//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::ServerConfig;
use outputs::OutputFactory;
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{EventDecoder, EventSource, Pipeline};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    Pipeline::check_output_types(&config, &OutputFactory::with_builtins())?;

    info!(
        mode = ?config.output_buffer.mode,
        batch_size = config.output_buffer.batch_size,
        flush_interval_ms = config.output_buffer.flush_interval_ms,
        filtered_outputs = config.filtered_outputs.len(),
        streams = config.streams.len(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config);
        return Ok(());
    }

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
    }

    let source = EventSource::from_arg(args.input.as_deref());
    let reader = source.open().await?;
    let pipeline = Pipeline::build(&config)
        .await
        .context("Failed to build output pipeline")?;

    let timeout = (args.timeout > 0).then(|| Duration::from_secs(args.timeout));
    info!(
        input = %source.describe(),
        producers = args.producers,
        "Starting pipeline..."
    );

    let stats = pipeline
        .run(
            reader,
            EventDecoder::new(args.start_offset),
            usize::from(args.producers),
            shutdown_signal(timeout),
        )
        .await
        .context("Pipeline execution failed")?;

    info!(
        events_written = stats.events_written,
        committed_offset = ?stats.committed_offset,
        duration_secs = stats.duration.as_secs_f64(),
        "Pipeline finished"
    );
    stats.print_summary();

    Ok(())
}

/// Resolve on Ctrl+C, SIGTERM or after `timeout`
async fn shutdown_signal(timeout: Option<Duration>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let deadline = async {
        match timeout {
            Some(timeout) => {
                tokio::time::sleep(timeout).await;
                info!(timeout_secs = timeout.as_secs(), "Run timeout reached");
            }
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = deadline => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &ServerConfig) {
    let buffer = &config.output_buffer;
    println!("\n=== Configuration Summary ===\n");
    println!("Output buffer:");
    println!("  Mode: {:?}", buffer.mode);
    println!("  Batch size: {}", buffer.batch_size);
    println!("  Flush interval: {}ms", buffer.flush_interval_ms);
    println!("  Shutdown timeout: {}ms", buffer.shutdown_timeout_ms);

    match &config.default_output {
        Some(output) => println!("\nDefault output: {} ({})", output.id, output.output_type),
        None => println!("\nDefault output: log (built-in)"),
    }

    if !config.filtered_outputs.is_empty() {
        println!("\nFiltered outputs ({}):", config.filtered_outputs.len());
        for output in &config.filtered_outputs {
            println!("  - {} ({})", output.id, output.output_type);
        }
    }

    if !config.streams.is_empty() {
        println!("\nStreams ({}):", config.streams.len());
        for stream in &config.streams {
            println!("  - {} -> {:?}", stream.id, stream.output_ids);
        }
    }

    println!();
}
