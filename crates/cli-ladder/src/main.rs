use anyhow::{Context, Result};
use clap::Parser;
use ladder::{
    config::PipelineConfig,
    ffprobe,
    inspector::StreamInfo,
    pipeline::{TranscodePipeline, TranscodePlan},
    params::VideoMode,
};
use log::{debug, info, LevelFilter};
use std::fs;
use std::path::PathBuf;

/// Decide copy vs transcode for each ladder rung and print the encoder options
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Source media file
    input: PathBuf,

    /// Path to configuration file (JSON or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use a saved `ffprobe -print_format json -show_streams -show_format` result instead of running ffprobe
    #[arg(long)]
    probe_json: Option<PathBuf>,

    /// Print the plan as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins unless --verbose is given
    let mut builder = env_logger::Builder::from_default_env();
    builder.format_timestamp_secs();
    if args.verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.init();

    let mut cfg = PipelineConfig::load_config(args.config.as_deref())
        .context("Failed to load configuration")?;
    cfg.apply_env_overrides()
        .context("Failed to apply environment overrides")?;
    cfg.validate().context("Invalid configuration")?;

    info!("Configuration loaded:");
    info!("  Ladder: {}", cfg.ladder.iter().map(|t| t.label()).collect::<Vec<_>>().join(", "));
    info!("  Quality profile: {}", cfg.encode_profile.active_quality_profile);
    info!("  ffprobe: {} (timeout {}s)", cfg.ffprobe_bin.display(), cfg.probe_timeout_secs);

    let pipeline = TranscodePipeline::new(&cfg);

    let plan = match &args.probe_json {
        Some(probe_path) => {
            debug!("Using saved probe result: {}", probe_path.display());
            let json_str = fs::read_to_string(probe_path)
                .with_context(|| format!("Failed to read probe JSON: {}", probe_path.display()))?;
            let data = ffprobe::parse_ffprobe_json(&json_str)
                .with_context(|| format!("Failed to parse probe JSON: {}", probe_path.display()))?;
            let stream_info = StreamInfo::from_probe(&data)
                .with_context(|| format!("Cannot plan ladder for {}", args.input.display()))?;
            pipeline.plan(&stream_info)
        }
        None => pipeline
            .run(&args.input)
            .await
            .with_context(|| format!("Cannot plan ladder for {}", args.input.display()))?,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan).context("Failed to serialize plan")?);
    } else {
        print_plan(&args.input, &plan);
    }

    Ok(())
}

fn print_plan(input: &std::path::Path, plan: &TranscodePlan) {
    let source = &plan.source;
    println!("Source: {}", input.display());
    println!(
        "  {} {} in {}, {:.1}s, audio: {}, subtitles: {}",
        source.video.codec,
        source.resolution(),
        source.container_format,
        source.duration_seconds,
        source.audio.as_ref().map(|a| a.codec.as_str()).unwrap_or("none"),
        source.subtitle_streams.len()
    );

    for rung in &plan.rungs {
        let action = match rung.parameters.video_mode {
            VideoMode::Copy => "copy".to_string(),
            VideoMode::Transcode { tier } => format!("transcode ({})", tier),
        };
        let marker = if rung.is_original_resolution { " [original]" } else { "" };

        println!();
        println!("{}{}: {}", rung.target.label(), marker, action);
        if let Some(reason) = rung.verdict.reason() {
            println!("  reason: {}", reason);
        }
        println!("  args: {}", rung.parameters.tokens().join(" "));
    }

    for target in &plan.skipped {
        println!();
        println!("{}: skipped (taller than source)", target.label());
    }
}
