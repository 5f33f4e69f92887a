mod config;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tryon_core::{Region, ShadeDescriptor, TransferState, TryOnSession, ValidationReport};
use tryon_detect::ScrfdDetector;
use tryon_hw::V4l2Camera;
use tryon_synth::{HttpAssetFetcher, SynthesisClient};

#[derive(Parser)]
#[command(name = "tryon", about = "Virtual makeup try-on CLI")]
struct Cli {
    /// TOML file overlaid on the TRYON_* environment
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a photo against the face validation rules
    Validate {
        photo: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show which facial region a product category maps to
    Classify {
        /// Product category (e.g. "lipstick"); omit for the default region
        category: Option<String>,
    },
    /// Apply one shade to one region of a photo
    Transfer {
        photo: PathBuf,
        /// Reference image URL or path for the shade
        #[arg(long)]
        shade: String,
        /// Product category of the shade
        #[arg(long)]
        category: Option<String>,
        /// Display name of the shade
        #[arg(long, default_value = "shade")]
        name: String,
        /// Intensity in [0.0, 2.0]
        #[arg(long, default_value_t = 1.0)]
        intensity: f32,
        #[arg(short, long, default_value = "tryon-result.png")]
        output: PathBuf,
    },
    /// Transfer the whole look of a reference photo
    Global {
        photo: PathBuf,
        reference: PathBuf,
        #[arg(short, long, default_value = "tryon-result.png")]
        output: PathBuf,
    },
    /// List V4L2 capture devices
    Cameras,
    /// Capture a still from the camera and validate it
    Capture {
        /// Device path (overrides TRYON_CAMERA_DEVICE)
        #[arg(long)]
        device: Option<String>,
        /// Save the captured still
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Validate { photo, json } => {
            let mut session = ready_session(&config).await?;
            let report = session.upload_path(&photo).await?;
            if json {
                println!("{}", serde_json::to_string(&report)?);
            } else {
                print_report(report);
            }
            session.close();
        }
        Commands::Classify { category } => {
            let region = Region::from_category(category.as_deref());
            println!("{region}");
        }
        Commands::Transfer {
            photo,
            shade,
            category,
            name,
            intensity,
            output,
        } => {
            let mut session = ready_session(&config).await?;
            require_valid(session.upload_path(&photo).await?)?;

            let descriptor = ShadeDescriptor {
                id: shade.clone(),
                name,
                source: shade,
                category,
            };
            let region = session.select_shade(&descriptor).await?;
            let applied = session.set_intensity(region, intensity)?;
            println!("Applying {} to {region} at {applied:.1}", descriptor.name);

            cancel_on_ctrl_c(&session);
            let outcome = session.submit().await?;
            finish(outcome, &output).await?;
            session.close();
        }
        Commands::Global {
            photo,
            reference,
            output,
        } => {
            let mut session = ready_session(&config).await?;
            require_valid(session.upload_path(&photo).await?)?;

            let bytes = tokio::fs::read(&reference)
                .await
                .with_context(|| format!("reading {}", reference.display()))?;
            cancel_on_ctrl_c(&session);
            let outcome = session.submit_global(bytes, media_type_of(&reference)).await?;
            finish(outcome, &output).await?;
            session.close();
        }
        Commands::Cameras => {
            let devices = V4l2Camera::list_devices();
            if devices.is_empty() {
                println!("No capture devices found");
            }
            for dev in devices {
                println!("{}  {} [{}] {}", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
        Commands::Capture { device, output } => {
            let path = device.unwrap_or_else(|| config.camera_device.clone());
            let camera = V4l2Camera::open(&path, config.warmup_frames)?;

            let mut session = ready_session(&config).await?;
            session.start_camera(Box::new(camera)).await?;
            let report = session.capture_from_camera().await?;
            print_report(report);

            if let (Some(output), Some(photo)) = (output, session.photo()) {
                tokio::fs::write(&output, photo.bytes())
                    .await
                    .with_context(|| format!("writing {}", output.display()))?;
                println!("Saved {}", output.display());
            }
            session.close();
        }
    }

    Ok(())
}

/// Session wired to the real capabilities, with the detector loaded.
async fn ready_session(config: &Config) -> Result<TryOnSession<ScrfdDetector>> {
    let timeout = config.request_timeout();
    let transport = SynthesisClient::new(config.synthesis_url.clone()).with_timeout(timeout);
    let fetcher = HttpAssetFetcher::new().with_timeout(timeout);

    let mut session = TryOnSession::new(ScrfdDetector::new(), Arc::new(fetcher), Arc::new(transport));
    session
        .load_detector(&config.model_location())
        .await
        .context("loading face detection models")?;
    Ok(session)
}

fn cancel_on_ctrl_c<D>(session: &TryOnSession<D>)
where
    D: tryon_core::FaceDetection,
{
    let token = session.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted");
            token.cancel();
        }
    });
}

fn print_report(report: ValidationReport) {
    match report {
        ValidationReport::Valid => println!("Photo is valid"),
        ValidationReport::Invalid(reason) => println!("Photo rejected: {reason}"),
    }
}

fn require_valid(report: ValidationReport) -> Result<()> {
    match report {
        ValidationReport::Valid => Ok(()),
        ValidationReport::Invalid(reason) => bail!("{reason}"),
    }
}

async fn finish(outcome: TransferState, output: &Path) -> Result<()> {
    match outcome {
        TransferState::Succeeded(bytes) => {
            tokio::fs::write(output, &bytes)
                .await
                .with_context(|| format!("writing {}", output.display()))?;
            println!("Saved {}", output.display());
            Ok(())
        }
        TransferState::Failed(e) => bail!("{e}"),
        other => bail!("unexpected transfer state: {other:?}"),
    }
}

fn media_type_of(path: &Path) -> &'static str {
    image::ImageFormat::from_path(path)
        .map(|f| f.to_mime_type())
        .unwrap_or("image/jpeg")
}
