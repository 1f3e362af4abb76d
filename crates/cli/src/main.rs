use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;

use shakeface_core::detection::domain::face_detector::FaceDetector;
use shakeface_core::detection::infrastructure::fixed_face_detector::FixedFaceDetector;
use shakeface_core::detection::infrastructure::onnx_blazeface_detector::OnnxBlazefaceDetector;
use shakeface_core::filtering::domain::face_filter::FaceFilter;
use shakeface_core::filtering::infrastructure::cpu_filter_renderer::CpuFilterRenderer;
use shakeface_core::media::domain::frame_source::FrameSource;
use shakeface_core::media::infrastructure::image_file_reader::ImageFileReader;
use shakeface_core::media::infrastructure::image_file_writer::ImageFileWriter;
use shakeface_core::media::infrastructure::image_sequence_reader::{
    is_image_file, ImageSequenceReader,
};
use shakeface_core::media::infrastructure::image_sequence_writer::ImageSequenceWriter;
use shakeface_core::pipeline::filter_frames_use_case::FilterFramesUseCase;
use shakeface_core::pipeline::filter_image_use_case::FilterImageUseCase;
use shakeface_core::pipeline::filter_recipe::FilterRecipe;
use shakeface_core::pipeline::infrastructure::threaded_pipeline_executor::ThreadedPipelineExecutor;
use shakeface_core::pipeline::pipeline_executor::ProgressFn;
use shakeface_core::session::face_filter_session::FaceFilterSession;
use shakeface_core::session::filter_event::LogEventListener;
use shakeface_core::shared::constants::BLAZEFACE_MODEL_NAME;
use shakeface_core::shared::model_resolver::{self, ModelSource};
use shakeface_core::shared::region::Region;

/// Per-face filter effects for images and image sequences.
///
/// Filters are applied to every detected face in this order: recipe
/// filters, --blur, --replace, --filter (as given), --outline.
#[derive(Parser, Debug)]
#[command(name = "shakeface")]
struct Cli {
    /// Input image, or a directory of images processed as a sequence.
    input: PathBuf,

    /// Output image, or output directory for a sequence.
    output: PathBuf,

    /// Gaussian blur with this standard deviation in pixels.
    #[arg(long)]
    blur: Option<f32>,

    /// Outline each face: COLOR[:WIDTH], e.g. white:3 or #ff0000.
    #[arg(long, visible_alias = "track")]
    outline: Option<String>,

    /// Extra filter (repeatable): blur:R, outline[:COLOR[:W]], greyscale, pixelate:N.
    #[arg(long = "filter")]
    filters: Vec<FaceFilter>,

    /// Grey out everything except the faces.
    #[arg(long)]
    color_pop: bool,

    /// Draw this image over each face.
    #[arg(long)]
    replace: Option<PathBuf>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long)]
    confidence: Option<f64>,

    /// Maximum number of faces per frame.
    #[arg(long)]
    max_faces: Option<usize>,

    /// BlazeFace ONNX model file.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Download URL used when the model is not cached yet.
    #[arg(long)]
    model_url: Option<String>,

    /// Use fixed face boxes instead of detection: x,y,w,h;x,y,w,h
    #[arg(long)]
    faces: Option<String>,

    /// JSON filter recipe (defaults to the user's saved recipe, if any).
    #[arg(long)]
    recipe: Option<PathBuf>,

    /// Store the effective recipe as JSON at this path before processing.
    #[arg(long)]
    save_recipe: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let recipe = build_recipe(&cli)?;
    if let Some(path) = &cli.save_recipe {
        save_recipe(&recipe, path)?;
    }
    let detector = build_detector(&cli, &recipe)?;
    let session = FaceFilterSession::new(detector, Box::new(CpuFilterRenderer::new()))
        .with_listener(Box::new(LogEventListener::default()));

    if cli.input.is_dir() {
        run_sequence(&cli.input, &cli.output, session, &recipe)
    } else {
        run_image(&cli.input, &cli.output, session, &recipe)
    }
}

fn run_image(
    input: &Path,
    output: &Path,
    session: FaceFilterSession,
    recipe: &FilterRecipe,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut use_case = FilterImageUseCase::new(
        Box::new(ImageFileReader::new()),
        Box::new(ImageFileWriter::new()),
        session,
        recipe.stages(),
    );
    let faces = use_case.execute(input, output)?;
    log::info!("{faces} face(s), output written to {}", output.display());
    Ok(())
}

fn run_sequence(
    input: &Path,
    output: &Path,
    session: FaceFilterSession,
    recipe: &FilterRecipe,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut reader: Box<dyn FrameSource> = Box::new(ImageSequenceReader::new());
    let metadata = reader.open(input)?;

    let total = metadata.total_frames;
    let progress: ProgressFn = Box::new(move |current, _| {
        eprint!("\rProcessing frame {current}/{total}");
        true
    });

    let mut use_case = FilterFramesUseCase::new(
        reader,
        Box::new(ImageSequenceWriter::new()),
        session,
        recipe.stages(),
        Box::new(ThreadedPipelineExecutor::new()),
        Some(progress),
        None,
    );
    use_case.execute(&metadata, output)?;
    eprintln!();
    log::info!("Output written to {}", output.display());
    Ok(())
}

/// Loads the recipe and layers the command-line filters on top of it.
fn build_recipe(cli: &Cli) -> Result<FilterRecipe, Box<dyn std::error::Error>> {
    let mut recipe = match &cli.recipe {
        Some(path) => FilterRecipe::load(path)?,
        None => FilterRecipe::load_default()?,
    };

    if let Some(radius) = cli.blur {
        recipe.filters.push(FaceFilter::blur(radius));
    }
    if let Some(path) = &cli.replace {
        let image = image_for_replace(path)?;
        recipe.filters.push(FaceFilter::replace(image));
    }
    recipe.filters.extend(cli.filters.iter().cloned());
    if let Some(spec) = &cli.outline {
        recipe.filters.push(format!("outline:{spec}").parse()?);
    }
    recipe.color_pop |= cli.color_pop;
    if let Some(confidence) = cli.confidence {
        recipe.confidence = confidence;
    }
    if let Some(max_faces) = cli.max_faces {
        recipe.max_faces = max_faces;
    }

    recipe.validate()?;
    if recipe.filters.is_empty() && !recipe.color_pop {
        return Err(
            "nothing to do: give --blur, --outline, --filter, --replace, --color-pop or a recipe"
                .into(),
        );
    }
    log::debug!("Effective recipe: {} filter(s)", recipe.filters.len());
    Ok(recipe)
}

/// Replacement images live outside the recipe, so they are left out.
fn save_recipe(recipe: &FilterRecipe, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut saved = recipe.clone();
    saved
        .filters
        .retain(|f| !matches!(f, FaceFilter::Replace { .. }));
    if saved.filters.len() < recipe.filters.len() {
        log::warn!("--replace is not stored in saved recipes");
    }
    saved.save(path)?;
    log::info!("Recipe saved to {}", path.display());
    Ok(())
}

fn image_for_replace(path: &Path) -> Result<image::RgbImage, Box<dyn std::error::Error>> {
    let mut reader = ImageFileReader::new();
    reader.open(path)?;
    let frame = reader.frames().next().ok_or("empty replacement image")??;
    Ok(frame
        .to_rgb_image()
        .ok_or("replacement image is not RGB")?)
}

fn build_detector(
    cli: &Cli,
    recipe: &FilterRecipe,
) -> Result<Box<dyn FaceDetector>, Box<dyn std::error::Error>> {
    if let Some(faces) = &cli.faces {
        let regions = Region::parse_list(faces)?;
        log::info!("Using {} fixed face box(es)", regions.len());
        return Ok(Box::new(FixedFaceDetector::new(regions)));
    }

    log::info!("Resolving model: {BLAZEFACE_MODEL_NAME}");
    let source = ModelSource {
        path: cli.model.as_deref(),
        url: cli.model_url.as_deref(),
    };
    let model_path =
        model_resolver::resolve(BLAZEFACE_MODEL_NAME, &source, Some(Box::new(download_progress)))?;

    Ok(Box::new(OnnxBlazefaceDetector::with_options(
        &model_path,
        recipe.confidence,
        recipe.max_faces,
    )?))
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.input.exists() {
        return Err(format!("Input not found: {}", cli.input.display()).into());
    }
    if cli.input.is_dir() {
        if cli.output.is_file() {
            return Err(format!(
                "Output must be a directory when the input is one: {}",
                cli.output.display()
            )
            .into());
        }
    } else if !is_image_file(&cli.input) {
        return Err(format!("Unsupported input format: {}", cli.input.display()).into());
    }
    if cli.faces.is_some() && (cli.model.is_some() || cli.model_url.is_some()) {
        return Err("--faces cannot be combined with --model or --model-url".into());
    }
    if let Some(replace) = &cli.replace {
        if !replace.is_file() {
            return Err(format!("Replacement image not found: {}", replace.display()).into());
        }
    }
    Ok(())
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face detection model... {pct}%");
    } else {
        eprint!("\rDownloading face detection model... {downloaded} bytes");
    }
}
