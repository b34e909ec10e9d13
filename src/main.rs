use anyhow::Result;
use clap::{Parser, Subcommand};
use sref_studio::app::{GenerationRequest, Studio};
use sref_studio::files::{default_output_path, load_image, save_image};
use sref_studio::models::Config;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "sref-studio")]
#[command(about = "Generate images in the style of a reference image")]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate an image from a prompt and a style-reference URL.
    Generate {
        #[arg(short, long)]
        prompt: String,

        /// URL of the style-reference image.
        #[arg(short, long)]
        sref: String,

        /// Frame ratio as W:H.
        #[arg(short, long, default_value = "1:1")]
        aspect_ratio: String,

        /// Where to write the generated image. Defaults to `<job id>.<ext>`.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Composite a second image into a generated one.
    Edit {
        /// The image to edit.
        #[arg(short, long)]
        base: PathBuf,

        /// The image to composite in.
        #[arg(long)]
        overlay: PathBuf,

        #[arg(short, long)]
        instruction: String,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

async fn run(command: Command, studio: &Studio) -> sref_studio::Result<PathBuf> {
    match command {
        Command::Generate {
            prompt,
            sref,
            aspect_ratio,
            output,
        } => {
            let outcome = studio
                .generate(&GenerationRequest {
                    prompt,
                    sref_url: sref,
                    aspect_ratio,
                })
                .await?;
            let path =
                output.unwrap_or_else(|| default_output_path(&outcome.job.id, &outcome.image));
            save_image(&path, &outcome.image)?;
            Ok(path)
        }
        Command::Edit {
            base,
            overlay,
            instruction,
            output,
        } => {
            let base = load_image(&base)?;
            let overlay = load_image(&overlay)?;
            let edited = studio.edit(&base, &overlay, &instruction).await?;
            let path = output.unwrap_or_else(|| {
                default_output_path(&format!("edit_{}", uuid::Uuid::new_v4().simple()), &edited)
            });
            save_image(&path, &edited)?;
            Ok(path)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sref_studio=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();

    let studio = match Config::from_env().and_then(|config| Studio::from_config(&config)) {
        Ok(studio) => studio,
        Err(e) => {
            error!("Failed to initialize: {}", e);
            std::process::exit(1);
        }
    };

    match run(args.command, &studio).await {
        Ok(path) => {
            info!("Wrote {}", path.display());
            Ok(())
        }
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}
