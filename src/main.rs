use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facekit::config;
use facekit_vision::onnx::onnx_backend;
use facekit_vision::video::Camera;
use facekit_vision::{FaceApi, FaceApiOptions, Media};
use log::{info, warn};

#[derive(Parser)]
#[command(name = "facekit")]
#[command(version, about = "Face detection and face mesh landmarks on ONNX Runtime")]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect faces in an image and print the result as JSON
    Detect {
        image: PathBuf,
        /// Also compute face mesh landmarks
        #[arg(long)]
        landmarks: bool,
        /// Downscale inputs wider than this before inference (0 disables)
        #[arg(long)]
        downscale: Option<u32>,
        #[arg(long)]
        max_faces: Option<usize>,
        #[arg(long)]
        threshold: Option<f32>,
    },
    /// Run detection with landmarks on camera frames
    Watch {
        /// Stop after this many frames
        #[arg(long)]
        frames: Option<usize>,
    },
    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_target(false)
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Detect {
            image,
            landmarks,
            downscale,
            max_faces,
            threshold,
        } => {
            let overrides = FaceApiOptions {
                score_threshold: threshold,
                max_faces,
                downscale_width_threshold: downscale,
                ..Default::default()
            };
            detect(&cfg, &image, landmarks, &overrides)
        }
        Commands::Watch { frames } => watch(&cfg, frames),
        Commands::Config => print_config(&cfg, cli.config.as_deref()),
    }
}

fn open_api(cfg: &config::Config) -> Result<FaceApi> {
    let api = FaceApi::new(cfg.options.clone(), onnx_backend(cfg.models.clone()))
        .context("Failed to configure face api")?;
    Ok(api)
}

fn detect(
    cfg: &config::Config,
    path: &Path,
    landmarks: bool,
    overrides: &FaceApiOptions,
) -> Result<()> {
    let img = image::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let media = Media::from(img);
    let mut api = open_api(cfg)?;

    let json = if landmarks {
        let result = api.detect_with_landmarks(&media, Some(overrides))?;
        info!(
            "{} face(s) in {:.1} ms",
            result.faces.len(),
            result.timing.total
        );
        serde_json::to_string_pretty(&result)?
    } else {
        let result = api.detect(&media, Some(overrides))?;
        info!(
            "{} face(s) in {:.1} ms",
            result.faces.len(),
            result.timing.total
        );
        serde_json::to_string_pretty(&result)?
    };
    println!("{}", json);
    api.dispose();
    Ok(())
}

fn watch(cfg: &config::Config, frames: Option<usize>) -> Result<()> {
    info!("Opening camera: {}", cfg.camera);
    let mut camera = Camera::open(&cfg.camera).context("Failed to open camera")?;
    let mut api = open_api(cfg)?;

    let environment = api.initialize()?;
    info!("Running on {} ({:?})", environment, api.backend());
    api.warmup();

    info!("Camera opened. Capturing frames...");
    info!("Press Ctrl+C to stop.");

    let mut captured = 0usize;
    while frames.map_or(true, |limit| captured < limit) {
        let frame = camera.frame().context("Failed to capture frame")?;
        captured += 1;

        match api.detect_with_landmarks(&frame, None) {
            Ok(result) => {
                let points: Vec<usize> = result.faces.iter().map(|f| f.landmarks.len()).collect();
                info!(
                    "Frame {}: {} face(s), landmarks {:?}, {:.1} ms",
                    captured,
                    result.faces.len(),
                    points,
                    result.timing.total
                );
            }
            Err(e) => {
                warn!("Frame {}: {}", captured, e);
            }
        }
    }

    api.dispose();
    Ok(())
}

fn print_config(cfg: &config::Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(config::CONFIG_PATH.as_path());
    info!("Config file: {}", path.display());
    print!("{}", toml::to_string_pretty(cfg)?);
    Ok(())
}
