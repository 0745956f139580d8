//! `info` command implementation.

use std::collections::HashMap;

use anyhow::{Context, Result};
use contracts::{OutputConfig, ServerConfig};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;
use crate::error::CliError;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    output_buffer: BufferInfo,
    route_cache: CacheInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    cluster_probe: Option<String>,
    default_output: Option<OutputInfo>,
    filtered_outputs: Vec<OutputInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    outputs: Vec<OutputInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    streams: Vec<StreamInfo>,
}

#[derive(Serialize)]
struct BufferInfo {
    mode: String,
    batch_size: usize,
    flush_interval_ms: u64,
    shutdown_timeout_ms: u64,
    output_module_timeout_ms: u64,
}

#[derive(Serialize)]
struct CacheInfo {
    ttl_ms: u64,
    max_entries: usize,
}

#[derive(Serialize)]
struct OutputInfo {
    id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    title: String,
    output_type: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    params: HashMap<String, String>,
}

#[derive(Serialize)]
struct StreamInfo {
    id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    title: String,
    output_ids: Vec<String>,
}

impl From<&OutputConfig> for OutputInfo {
    fn from(config: &OutputConfig) -> Self {
        Self {
            id: config.id.clone(),
            title: config.title.clone(),
            output_type: config.output_type.clone(),
            params: config.params.clone(),
        }
    }
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&config, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&config, args);
    }

    Ok(())
}

fn build_config_info(config: &ServerConfig, args: &InfoArgs) -> ConfigInfo {
    let buffer = &config.output_buffer;

    let outputs = if args.outputs {
        config.outputs.iter().map(OutputInfo::from).collect()
    } else {
        Vec::new()
    };

    let streams = if args.streams {
        config
            .streams
            .iter()
            .map(|s| StreamInfo {
                id: s.id.clone(),
                title: s.title.clone(),
                output_ids: s.output_ids.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", config.version),
        output_buffer: BufferInfo {
            mode: format!("{:?}", buffer.mode),
            batch_size: buffer.batch_size,
            flush_interval_ms: buffer.flush_interval_ms,
            shutdown_timeout_ms: buffer.shutdown_timeout_ms,
            output_module_timeout_ms: buffer.output_module_timeout_ms,
        },
        route_cache: CacheInfo {
            ttl_ms: config.route_cache.ttl_ms,
            max_entries: config.route_cache.max_entries,
        },
        cluster_probe: config.cluster.probe_addr.clone(),
        default_output: config.default_output.as_ref().map(OutputInfo::from),
        filtered_outputs: config.filtered_outputs.iter().map(OutputInfo::from).collect(),
        outputs,
        streams,
    }
}

fn print_config_info(config: &ServerConfig, args: &InfoArgs) {
    let buffer = &config.output_buffer;

    println!("\n=== Outflow Configuration ===\n");
    println!("Version: {:?}", config.version);

    println!("\nOutput buffer:");
    println!("  Mode: {:?}", buffer.mode);
    println!("  Batch size: {}", buffer.batch_size);
    println!("  Flush interval: {}ms", buffer.flush_interval_ms);
    println!("  Shutdown timeout: {}ms", buffer.shutdown_timeout_ms);
    println!("  Output module timeout: {}ms", buffer.output_module_timeout_ms);

    println!("\nRoute cache:");
    println!("  TTL: {}ms", config.route_cache.ttl_ms);
    println!("  Max entries: {}", config.route_cache.max_entries);

    if let Some(ref addr) = config.cluster.probe_addr {
        println!("\nCluster probe: {}", addr);
    }

    match &config.default_output {
        Some(output) => println!("\nDefault output: {} ({})", output.id, output.output_type),
        None => println!("\nDefault output: log (built-in)"),
    }

    println!("\nFiltered outputs ({}):", config.filtered_outputs.len());
    for output in &config.filtered_outputs {
        println!("  - {} ({})", output.id, output.output_type);
    }

    if args.outputs {
        println!("\nStream outputs ({}):", config.outputs.len());
        for output in &config.outputs {
            println!("  - {} ({})", output.id, output.output_type);
            let mut params: Vec<_> = output.params.iter().collect();
            params.sort();
            for (key, value) in params {
                println!("      {}: {}", key, value);
            }
        }
    }

    if args.streams {
        println!("\nStreams ({}):", config.streams.len());
        for stream in &config.streams {
            if stream.output_ids.is_empty() {
                println!("  - {} (no outputs)", stream.id);
            } else {
                println!("  - {} -> {}", stream.id, stream.output_ids.join(", "));
            }
        }
    } else {
        println!(
            "\nStreams: {} (use --streams for details)",
            config.streams.len()
        );
    }

    println!();
}
