use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use faceswap::pipeline::SkipReason;
use faceswap::{config, storage, FaceRegion, FaceSwapper, Pipeline, ReferencePick, Strategy};
use faceswap_vision::{LandmarkExtractor, MeanShapeLandmarker, OnnxLandmarker};
use log::{info, warn};

#[derive(Parser)]
#[command(name = "faceswap")]
#[command(version, about = "Composite faces from a face-set image onto detected faces")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Pick {
    /// Any reference face, drawn with the seeded generator
    Random,
    /// The reference face with the closest appearance
    Similar,
}

impl From<Pick> for ReferencePick {
    fn from(pick: Pick) -> Self {
        match pick {
            Pick::Random => ReferencePick::Random,
            Pick::Similar => ReferencePick::Similar,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Swap faces from the face-set image onto the input image
    Swap {
        /// Image whose faces get replaced
        #[arg(short, long)]
        input: PathBuf,
        /// Image holding the reference faces
        #[arg(short, long)]
        faces: PathBuf,
        /// Where to write the result
        #[arg(short, long)]
        output: PathBuf,
        /// Region list with the target faces
        #[arg(long)]
        targets: Option<PathBuf>,
        /// Target face box as x,y,w,h (repeatable)
        #[arg(long = "target-box")]
        target_boxes: Vec<String>,
        /// Region list with the reference faces
        #[arg(long)]
        references: Option<PathBuf>,
        /// Reference face box as x,y,w,h (repeatable)
        #[arg(long = "reference-box")]
        reference_boxes: Vec<String>,
        /// Override the configured strategy (affine or triangulated)
        #[arg(long)]
        strategy: Option<Strategy>,
        #[arg(long, value_enum, default_value_t = Pick::Random)]
        pick: Pick,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Fit a template face to each box instead of running the landmark model
        #[arg(long)]
        template_landmarks: bool,
    },
    /// Reject regions that sit too close to the image border
    Check {
        #[arg(long)]
        image: PathBuf,
        #[arg(long)]
        regions: PathBuf,
        /// Relative margin, defaults to the configured one
        #[arg(long)]
        margin: Option<f32>,
        /// Write the updated regions back
        #[arg(long)]
        write: bool,
    },
    /// Print a region list as JSON
    Inspect {
        #[arg(long)]
        regions: PathBuf,
    },
    /// Open config file in editor
    Config,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(None)?;

    match cli.command {
        Commands::Swap {
            input,
            faces,
            output,
            targets,
            target_boxes,
            references,
            reference_boxes,
            strategy,
            pick,
            seed,
            template_landmarks,
        } => {
            let targets = collect_regions(targets.as_deref(), &target_boxes).context("loading targets")?;
            let references =
                collect_regions(references.as_deref(), &reference_boxes).context("loading references")?;
            let request = SwapRequest {
                input,
                faces,
                output,
                strategy,
                pick: pick.into(),
                seed,
                template_landmarks,
            };
            swap(&cfg, &request, targets, references)
        }
        Commands::Check {
            image,
            regions,
            margin,
            write,
        } => check(&image, &regions, margin.unwrap_or(cfg.border_margin), write),
        Commands::Inspect { regions } => inspect(&regions),
        Commands::Config => open_config(),
    }
}

struct SwapRequest {
    input: PathBuf,
    faces: PathBuf,
    output: PathBuf,
    strategy: Option<Strategy>,
    pick: ReferencePick,
    seed: u64,
    template_landmarks: bool,
}

fn collect_regions(list: Option<&Path>, boxes: &[String]) -> Result<Vec<FaceRegion>> {
    let mut regions = match list {
        Some(path) => storage::load_regions(path)?,
        None => vec![],
    };
    for spec in boxes {
        regions.push(storage::parse_box(spec)?);
    }
    Ok(regions)
}

fn swap(
    cfg: &config::Config,
    request: &SwapRequest,
    mut targets: Vec<FaceRegion>,
    mut references: Vec<FaceRegion>,
) -> Result<()> {
    if targets.is_empty() {
        anyhow::bail!("No target faces given. Use --targets or --target-box.");
    }
    if references.is_empty() {
        anyhow::bail!("No reference faces given. Use --references or --reference-box.");
    }

    let source = image::open(&request.input)
        .with_context(|| format!("Failed to open {}", request.input.display()))?
        .to_rgb8();
    let face_set = image::open(&request.faces)
        .with_context(|| format!("Failed to open {}", request.faces.display()))?
        .to_rgb8();

    for region in targets.iter_mut() {
        region.calc_appearance(&source);
    }
    for region in references.iter_mut() {
        region.calc_appearance(&face_set);
    }

    let extractor: Box<dyn LandmarkExtractor> = if request.template_landmarks {
        info!("Using template landmarks");
        Box::new(MeanShapeLandmarker)
    } else {
        Box::new(
            OnnxLandmarker::from_file(&cfg.landmark_model, cfg.landmark_spec())
                .context("Failed to initialize landmark model")?,
        )
    };

    let mut options = cfg.swap_options();
    if let Some(strategy) = request.strategy {
        options.strategy = strategy;
    }
    info!(
        "Swapping {} target(s) with {} reference(s), {} strategy",
        targets.len(),
        references.len(),
        options.strategy
    );

    let mut pipeline = Pipeline::new(
        FaceSwapper::new(extractor, options),
        cfg.detection_threshold,
        request.seed,
    );
    let (output, report) = pipeline.run(&source, &face_set, &targets, &references, request.pick);

    for (target, reference) in &report.swapped {
        info!("✓ target {} <- reference {}", target, reference);
    }
    for (target, reason) in &report.skipped {
        match reason {
            SkipReason::Failed { reference, error } => {
                warn!("target {} <- reference {} failed: {}", target, reference, error)
            }
            other => warn!("target {} skipped: {:?}", target, other),
        }
    }

    output
        .save(&request.output)
        .with_context(|| format!("Failed to write {}", request.output.display()))?;
    info!("Wrote {}", request.output.display());

    if report.swapped.is_empty() {
        anyhow::bail!("No face was swapped");
    }
    Ok(())
}

fn check(image_path: &Path, regions_path: &Path, margin: f32, write: bool) -> Result<()> {
    let (width, height) = image::image_dimensions(image_path)
        .with_context(|| format!("Failed to read {}", image_path.display()))?;
    let mut regions = storage::load_regions(regions_path)?;

    let mut rejected = 0;
    for (i, region) in regions.iter_mut().enumerate() {
        if region.check_border(width, height, margin) {
            warn!("region {} {:?} is too close to the border", i, region.bounding_box());
            rejected += 1;
        }
    }
    info!(
        "{} of {} region(s) rejected at margin {}",
        rejected,
        regions.len(),
        margin
    );

    if write {
        storage::save_regions(regions_path, &regions)?;
        info!("Updated {}", regions_path.display());
    }
    Ok(())
}

fn inspect(regions_path: &Path) -> Result<()> {
    let regions = storage::load_regions(regions_path)?;
    println!("{}", serde_json::to_string_pretty(&regions)?);
    Ok(())
}

fn open_config() -> Result<()> {
    let config_path = config::CONFIG_PATH.as_os_str();
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
