use clap::{Args, Parser, Subcommand};
use live_adjust::backend::HttpSubmitter;
use live_adjust::imaging::{
    self, Adjustment, AdjustmentParameters, CropAnchor, GeometrySpec, Resample, codec,
    geometry::execute_plan,
};
use live_adjust::runtime::{self, Controller, FilePreview, SessionEvent};
use live_adjust::{config, output};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup — trivial, called exactly once
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "live-adjust")]
#[command(about = "Realtime image adjustment sessions")]
#[command(long_about = "\
Realtime image adjustment sessions

A session receives an image from the backend, previews brightness, contrast,
saturation and crop/resize adjustments as the controls change, and submits the
approved result back exactly once. If the controls sit idle after an
adjustment, the session warns and then applies automatically.

The `session` command reads one JSON message per line on stdin:

  {\"op\":\"event\",\"name\":\"realtime_image_adjust_update\",
   \"detail\":{\"node_id\":\"7\",\"image_data\":\"data:image/png;base64,...\"}}
  {\"op\":\"set_adjustment\",\"name\":\"brightness\",\"value\":1.2}
  {\"op\":\"set_target_width\",\"value\":512}
  {\"op\":\"set_crop_anchor\",\"value\":\"top-left\"}
  {\"op\":\"submit\"}

Other ops: set_target_height, set_keep_aspect, drag_start, drag_end,
reset_color, reset_size, teardown. End of input closes the session.

Run 'live-adjust gen-config' to generate a documented live-adjust.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file (defaults to ./live-adjust.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one adjustment session driven by JSON lines on stdin
    Session(SessionArgs),
    /// Apply adjustments to an image file
    Adjust(AdjustArgs),
    /// Print a stock live-adjust.toml with all options documented
    GenConfig,
}

#[derive(Args)]
struct SessionArgs {
    /// Identity of the node this session serves
    #[arg(long)]
    node_id: String,

    /// Write every preview to this PNG file
    #[arg(long)]
    preview: Option<PathBuf>,

    /// Print session events as JSON lines instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct AdjustArgs {
    /// Input image (PNG, JPEG, WebP, TIFF)
    input: PathBuf,

    /// Output image; format follows the extension
    #[arg(short, long)]
    output: PathBuf,

    #[arg(long, default_value_t = 1.0)]
    brightness: f64,

    #[arg(long, default_value_t = 1.0)]
    contrast: f64,

    #[arg(long, default_value_t = 1.0)]
    saturation: f64,

    /// Target width, 0 = derive from source
    #[arg(long, default_value_t = 0)]
    width: u32,

    /// Target height, 0 = derive from source
    #[arg(long, default_value_t = 0)]
    height: u32,

    /// Let an unset dimension keep the source size instead of following the aspect ratio
    #[arg(long)]
    no_keep_aspect: bool,

    /// Crop anchor when the target aspect differs from the source
    #[arg(long, default_value = "center")]
    anchor: CropAnchor,

    /// Resampling filter (overrides the config)
    #[arg(long)]
    resample: Option<Resample>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
        Command::Session(args) => {
            let config = load_config(cli.config.as_deref())?;
            init_tracing(&config.logging);
            init_thread_pool(&config.processing);
            let runtime = tokio::runtime::Runtime::new()?;
            let result = runtime.block_on(run_session(args, &config));
            // The stdin reader may still be parked in a blocking read.
            runtime.shutdown_background();
            result?;
        }
        Command::Adjust(args) => {
            let config = load_config(cli.config.as_deref())?;
            init_tracing(&config.logging);
            init_thread_pool(&config.processing);
            run_adjust(&args, &config)?;
        }
    }

    Ok(())
}

/// Load the explicit config file, or `./live-adjust.toml` if it exists.
fn load_config(path: Option<&Path>) -> Result<config::AdjustConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) if !path.exists() => {
            Err(format!("config file not found: {}", path.display()).into())
        }
        Some(path) => Ok(config::load_config(path)?),
        None => Ok(config::load_config(Path::new(config::CONFIG_FILE_NAME))?),
    }
}

/// Install the tracing subscriber on stderr. `RUST_LOG` wins over the config.
fn init_tracing(logging: &config::LoggingConfig) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores — user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

async fn run_session(
    args: SessionArgs,
    config: &config::AdjustConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let submitter = Arc::new(HttpSubmitter::from_config(&config.backend)?);
    tracing::info!(endpoint = submitter.endpoint(), "Submitting to backend");

    let json = args.json;
    let mut controller = Controller::from_config(args.node_id, config, submitter).observe(
        move |node_id: &str, event: &SessionEvent| {
            if json {
                match serde_json::to_string(event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::error!(error = %e, "Could not serialize event"),
                }
            } else {
                output::print_session_event(node_id, event);
            }
        },
    );
    if let Some(path) = args.preview {
        controller = controller.with_preview(FilePreview::new(path));
    }

    let (tx, rx) = mpsc::channel(64);
    let reader = tokio::spawn(async move {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        if let Err(e) = runtime::read_messages(stdin, tx).await {
            tracing::error!(error = %e, "Reading messages from stdin failed; closing session");
        }
    });

    let report = controller.run(rx).await;
    reader.abort();
    tracing::info!(
        node_id = %report.node_id,
        images = report.images,
        applied = report.applied,
        "Session finished"
    );
    Ok(())
}

fn run_adjust(
    args: &AdjustArgs,
    config: &config::AdjustConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut params = AdjustmentParameters::default();
    for (which, value) in [
        (Adjustment::Brightness, args.brightness),
        (Adjustment::Contrast, args.contrast),
        (Adjustment::Saturation, args.saturation),
    ] {
        if !params.set(which, value) {
            return Err(format!("invalid {which} value: {value}").into());
        }
    }
    let max = config.geometry.max_dimension;
    let spec = GeometrySpec {
        target_width: args.width.min(max),
        target_height: args.height.min(max),
        keep_aspect: !args.no_keep_aspect,
        anchor: args.anchor,
    };
    let resample = args.resample.unwrap_or(config.geometry.resample);

    let source = codec::load_image_file(&args.input)?;
    let plan = imaging::plan_geometry(
        source.dimensions(),
        &spec,
        config.geometry.aspect_tolerance,
        max,
    );
    let colored = imaging::apply_color(&source, &params);
    let result = execute_plan(&colored, &plan, resample);
    result.save(&args.output)?;

    output::print_adjust_output(
        &args.input,
        &args.output,
        &params,
        &plan,
        &imaging::fingerprint(&result),
    );
    Ok(())
}
