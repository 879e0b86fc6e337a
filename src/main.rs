mod cli;

use hdsflow::{config, HdsStream, HttpFetcher, StreamOptions, StreamStatus};
use hdsflow_media::{next_chunk, parse_bootstrap, ChunkSpec, SourceMode};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "hdsflow=trace,hdsflow_media=trace,reqwest=debug".to_string()
        } else {
            "hdsflow=info,hdsflow_media=info".to_string()
        }
    });

    // stdout may carry the stream itself
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Fetch { output } => fetch(&output, cli.config.as_deref()),
        Commands::Inspect {
            file,
            quality,
            json,
        } => inspect(&file, quality.as_deref(), json),
        Commands::Schedule {
            file,
            count,
            duration,
            quality,
        } => schedule(&file, count, duration, quality.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("hdsflow {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn fetch(output: &Path, config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let variant = config.source.variant()?;
    let poll = Duration::from_millis(config.stream.poll_interval_ms.max(1));

    let fetcher = Arc::new(HttpFetcher::new(&config.fetch));
    let mut stream = HdsStream::open(variant, StreamOptions::from(&config.stream), fetcher)
        .context("Failed to open stream")?;
    if let Some(size) = stream.size_hint() {
        tracing::info!("Expected size: about {} bytes", size);
    }

    let mut out: Box<dyn Write> = if output == Path::new("-") {
        Box::new(std::io::stdout().lock())
    } else {
        let file = std::fs::File::create(output)
            .with_context(|| format!("Failed to create output file: {:?}", output))?;
        Box::new(std::io::BufWriter::new(file))
    };

    let live = stream.mode().is_live();
    let mut buf = vec![0u8; 64 * 1024];
    let mut total: u64 = 0;

    loop {
        let n = stream.read(&mut buf);
        if n > 0 {
            out.write_all(&buf[..n]).context("Failed to write stream data")?;
            total += n as u64;
            continue;
        }

        match stream.status() {
            StreamStatus::EndOfStream => break,
            StreamStatus::Stalled {
                fragment: Some(fragment),
                reason,
            } => {
                anyhow::bail!("Stream stalled at fragment {}: {}", fragment, reason);
            }
            // Live scheduling gaps can close on the next refresh.
            StreamStatus::Stalled {
                fragment: None,
                reason,
            } if !live => {
                anyhow::bail!("Stream stalled: {}", reason);
            }
            _ => std::thread::sleep(poll),
        }
    }

    out.flush()?;
    stream.close();
    tracing::info!("Wrote {} bytes", total);
    Ok(())
}

fn inspect(file: &Path, quality: Option<&str>, json: bool) -> Result<()> {
    let data = std::fs::read(file).with_context(|| format!("Failed to read {:?}", file))?;
    let index = parse_bootstrap(&data, quality)
        .with_context(|| format!("Failed to parse bootstrap {:?}", file))?;

    if json {
        let json_str = serde_json::to_string_pretty(&index)?;
        println!("{}", json_str);
        return Ok(());
    }

    println!("Movie: {}", index.movie_id);
    println!("Version: {}", index.bootstrap_version);
    println!(
        "Profile: {}  Live: {}  Update: {}",
        index.profile, index.live, index.update
    );
    println!("Timescale: {}", index.timescale);
    println!(
        "Current media time: {} ({:.3} s)",
        index.live_current_time,
        index.live_current_time as f64 / index.timescale.max(1) as f64
    );
    if let Some(ref modifier) = index.quality_modifier {
        println!("Quality modifier: {}", modifier);
    }

    println!("\nServers: {}", index.servers.len());
    for (i, server) in index.servers.iter().enumerate() {
        println!("  [{}] {}", i, server);
    }

    println!("\nSegment runs: {}", index.segment_runs.len());
    for run in &index.segment_runs {
        println!(
            "  segment {:>6}  {} fragments/segment",
            run.first_segment, run.fragments_per_segment
        );
    }

    println!(
        "\nFragment runs: {} (timescale {})",
        index.fragment_runs.len(),
        index.table_timescale
    );
    for run in &index.fragment_runs {
        match run.discontinuity {
            Some(kind) if run.is_discontinuity() => println!(
                "  fragment {:>6}  discontinuity {:?}",
                run.fragment_number_start, kind
            ),
            _ => println!(
                "  fragment {:>6}  t={:<12} d={}",
                run.fragment_number_start, run.timestamp, run.duration
            ),
        }
    }

    Ok(())
}

fn schedule(file: &Path, count: usize, duration: Option<u64>, quality: Option<&str>) -> Result<()> {
    let data = std::fs::read(file).with_context(|| format!("Failed to read {:?}", file))?;
    let index = parse_bootstrap(&data, quality)
        .with_context(|| format!("Failed to parse bootstrap {:?}", file))?;
    let mode = SourceMode::from_duration(duration);

    let mut previous: Option<ChunkSpec> = None;
    for _ in 0..count {
        let chunk = next_chunk(&index, mode, previous.as_ref())
            .context("Scheduling stopped")?;
        println!(
            "Seg{}-Frag{}  t={:.3}s  d={:.3}s{}",
            chunk.segment_number,
            chunk.fragment_number,
            index.table_to_secs(chunk.timestamp),
            index.table_to_secs(chunk.duration),
            if chunk.eof { "  [eof]" } else { "" }
        );
        if chunk.eof {
            break;
        }
        previous = Some(chunk);
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Fetch timeout: {}s", config.fetch.timeout_secs);
            println!("  Max response: {} bytes", config.fetch.max_response_bytes);
            println!("  Lookahead: {}s", config.stream.lookahead_secs);
            match config.source.variant() {
                Ok(variant) => {
                    println!("  Base URL: {}", variant.base_url);
                    println!(
                        "  Mode: {}",
                        if SourceMode::from_duration(variant.duration_secs).is_live() {
                            "live"
                        } else {
                            "vod"
                        }
                    );
                }
                Err(e) => println!("  Source: not playable ({})", e),
            }
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Fetch timeout: {}s", config.fetch.timeout_secs);
            println!("  Lookahead: {}s", config.stream.lookahead_secs);
        }
    }

    Ok(())
}
