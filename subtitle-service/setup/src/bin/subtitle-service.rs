use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use subtitle_configuration::{load_config, load_config_from, setup_logging};
use subtitle_setup::{build_and_run, SubtitleJob};

#[derive(Parser)]
#[command(name = "subtitle-service", about = "Generate SRT subtitles for a video file")]
struct Cli {
    /// Video file to subtitle
    #[arg(short, long)]
    input: PathBuf,

    /// Where to write the subtitle; defaults to the input path with an .srt extension
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Sample rate the extracted audio should use
    #[arg(short, long, default_value = "44100")]
    sample_rate: String,

    /// Configuration file; defaults to config/default.toml and config/$RUN_ENV.toml
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => load_config().context("failed to load config")?,
    };
    setup_logging(&config);

    let job = SubtitleJob {
        input: cli.input,
        output: cli.output,
        sample_rate: cli.sample_rate,
    };
    if let Err(error) = build_and_run(config, job).await {
        tracing::error!(error = %format!("{error:#}"), "subtitle generation failed");
        return Err(error);
    }
    Ok(())
}
