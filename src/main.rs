use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dicom_attention::{
    ChannelFilter, Pipeline, PipelineConfig, PrecomputedPredictor, Study,
    convert, decoder::has_extension, exporter,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Normalize CT studies and render attention overlays")]
struct Cli {
    /// Pipeline configuration (TOML); built-in defaults when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a study and print its shape, or count the frames of a GIF.
    Inspect {
        source: PathBuf,
        /// Write the center slice as PNG.
        #[arg(long)]
        preview: Option<PathBuf>,
    },
    /// Render a precomputed prediction's attention over a study.
    Overlay {
        source: PathBuf,
        /// JSON prediction with `scores` and optional `attention`.
        #[arg(long)]
        prediction: PathBuf,
        #[arg(long, default_value = "overlays")]
        output_dir: PathBuf,
        /// Overrides `[overlay] gain`.
        #[arg(long)]
        gain: Option<f32>,
    },
    /// Split an overlay GIF into PNG frames and stack them into a MetaImage volume.
    Convert {
        gif: PathBuf,
        #[arg(long)]
        frames_dir: PathBuf,
        #[arg(long)]
        output: PathBuf,
        /// Only stack frames with this many channels.
        #[arg(long, default_value_t = 3)]
        channels: u8,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Command::Inspect { source, preview } => {
            if has_extension(&source, &["gif"]) {
                let frames = exporter::frame_count(&source)
                    .with_context(|| format!("reading {}", source.display()))?;
                println!("{}: {frames} frames", source.display());
                return Ok(());
            }
            let volume = Pipeline::new(config)?
                .loader()
                .load(&source, None)
                .with_context(|| format!("loading {}", source.display()))?;
            let (depth, height, width) = volume.dim();
            println!(
                "{}: {depth} x {height} x {width}, spacing {:?}",
                volume.series_id(),
                volume.spacing()
            );
            if let Some(path) = preview {
                let image = volume
                    .slice_to_image(depth / 2)
                    .context("volume has no center slice")?;
                image
                    .save(&path)
                    .with_context(|| format!("writing {}", path.display()))?;
            }
        }
        Command::Overlay {
            source,
            prediction,
            output_dir,
            gain,
        } => {
            if let Some(gain) = gain {
                config.overlay.gain = gain;
            }
            let predictor = PrecomputedPredictor::load(&prediction)?;
            let study = Study::new(&source);
            let outcome = Pipeline::new(config)?
                .with_output_dir(output_dir)
                .run_study(&study, &predictor)
                .with_context(|| format!("processing {}", source.display()))?;

            println!("{}: {} slices", outcome.series_id, outcome.depth);
            for (year, score) in outcome.scores.0.iter().enumerate() {
                println!("  year {}: {score:.4}", year + 1);
            }
            match outcome.artifact {
                Some(artifact) => println!(
                    "  overlay: {} ({} frames)",
                    artifact.path.display(),
                    artifact.frame_count
                ),
                None => println!("  overlay: none (prediction carries no attention)"),
            }
        }
        Command::Convert {
            gif,
            frames_dir,
            output,
            channels,
        } => {
            let frames = convert::split_animation(&gif, &frames_dir)?;
            let stacked = convert::stack_frames(&frames_dir, &output, ChannelFilter::exactly(channels))?;
            println!(
                "{}: {} frames split, {stacked} stacked into {}",
                gif.display(),
                frames.len(),
                output.display()
            );
        }
    }
    Ok(())
}
