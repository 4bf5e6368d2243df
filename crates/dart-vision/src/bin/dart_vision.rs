use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use clap::{Args, Parser, Subcommand};
use dart_vision::{
    overlay, CameraBackend, CycleOutcome, DetectionConfig, DetectionEngine, DetectionEvent,
    ImageSequenceBackend,
};
use log::LevelFilter;
use nalgebra::Point2;
use serde::Serialize;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser, Debug)]
#[command(name = "dart-vision", version, about = "Camera-based dart detection and scoring")]
struct Cli {
    /// JSON detection config; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Calibration file, overrides the config.
    #[arg(long, global = true)]
    calibration: Option<PathBuf>,
    /// error, warn, info, debug, trace or off; falls back to
    /// `DART_VISION_LOG`, then `warn`.
    #[arg(long, global = true, value_parser = parse_level)]
    log_level: Option<LevelFilter>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Calibrate a camera from three clicked points (camera pixels).
    Calibrate(CalibrateArgs),
    /// Remove a camera's calibration.
    Clear {
        #[arg(long)]
        camera: u32,
    },
    /// Score a camera-pixel position through its calibration.
    Score {
        #[arg(long)]
        camera: u32,
        #[arg(long)]
        x: f32,
        #[arg(long)]
        y: f32,
        /// Apply radial tip compensation with this factor.
        #[arg(long)]
        tip_compensation: Option<f32>,
    },
    /// List calibrated cameras.
    Status,
    /// Run detection over recorded frames in `<frames>/cam<id>/`.
    Replay(ReplayArgs),
    /// Print the effective configuration as JSON.
    Config,
}

#[derive(Args, Debug)]
struct CalibrateArgs {
    #[arg(long)]
    camera: u32,
    /// Bullseye, as `x,y`.
    #[arg(long, value_parser = parse_point)]
    center: Point2<f32>,
    /// Outer double edge at 12 o'clock, as `x,y`.
    #[arg(long, value_parser = parse_point)]
    top: Point2<f32>,
    /// Outer double edge at 3 o'clock, as `x,y`.
    #[arg(long, value_parser = parse_point)]
    right: Point2<f32>,
}

#[derive(Args, Debug)]
struct ReplayArgs {
    /// Directory holding one `cam<id>` folder per camera.
    #[arg(long)]
    frames: PathBuf,
    /// Cameras to replay; all discovered ones when omitted.
    #[arg(long, value_delimiter = ',')]
    cameras: Vec<u32>,
    /// Write board overlays of every confirmed dart here.
    #[arg(long)]
    debug_dir: Option<PathBuf>,
}

fn parse_level(raw: &str) -> Result<LevelFilter, String> {
    raw.parse()
        .map_err(|_| format!("unknown log level `{raw}`"))
}

fn parse_point(raw: &str) -> Result<Point2<f32>, String> {
    let (x, y) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected `x,y`, got `{raw}`"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<f32>()
            .map_err(|e| format!("bad coordinate `{v}`: {e}"))
    };
    Ok(Point2::new(parse(x)?, parse(y)?))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScoreReport {
    camera_id: u32,
    board_x: f32,
    board_y: f32,
    #[serde(flatten)]
    score: dart_vision::ScoreResult,
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level)?;

    let mut cfg = match cli.config.as_ref() {
        Some(path) => DetectionConfig::load_json(path)?,
        None => DetectionConfig::default(),
    };
    if let Some(path) = cli.calibration.as_ref() {
        cfg.calibration_path = Some(path.clone());
    }

    match cli.command {
        Command::Calibrate(args) => calibrate(&cfg, &args),
        Command::Clear { camera } => {
            let store = cfg.open_calibration_store();
            if store.clear(camera) {
                println!("cleared calibration for camera {camera}");
            } else {
                println!("camera {camera} was not calibrated");
            }
            Ok(())
        }
        Command::Score {
            camera,
            x,
            y,
            tip_compensation,
        } => score(&cfg, camera, Point2::new(x, y), tip_compensation),
        Command::Status => {
            let store = cfg.open_calibration_store();
            let rows: Vec<_> = store
                .calibrated_cameras()
                .into_iter()
                .filter_map(|id| store.record(id))
                .map(|rec| rec.to_row())
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
            Ok(())
        }
        Command::Replay(args) => replay(&cfg, &args),
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&cfg)?);
            Ok(())
        }
    }
}

#[cfg(not(feature = "tracing"))]
fn init_logging(level: Option<LevelFilter>) -> CliResult<()> {
    use dart_vision::core::{init_from_env, init_with_level, LOG_ENV};
    match level {
        Some(level) => init_with_level(level),
        None => init_from_env(LOG_ENV, LevelFilter::Warn),
    }
    .map_err(|e| e.to_string())?;
    Ok(())
}

#[cfg(feature = "tracing")]
fn init_logging(level: Option<LevelFilter>) -> CliResult<()> {
    let level = level.unwrap_or(LevelFilter::Trace);
    tracing_log::LogTracer::init_with_filter(level).map_err(|e| e.to_string())?;
    dart_vision::core::init_tracing(false);
    Ok(())
}

fn calibrate(cfg: &DetectionConfig, args: &CalibrateArgs) -> CliResult<()> {
    let store = cfg.open_calibration_store();
    let record = store.calibrate(args.camera, args.center, args.top, args.right)?;
    println!("{}", serde_json::to_string_pretty(&record.to_row())?);
    Ok(())
}

fn score(
    cfg: &DetectionConfig,
    camera_id: u32,
    pixel: Point2<f32>,
    tip_compensation: Option<f32>,
) -> CliResult<()> {
    let store = cfg.open_calibration_store();
    let board = store
        .transform_point(pixel, camera_id)
        .ok_or_else(|| format!("camera {camera_id} is not calibrated"))?;
    let calc = store
        .score_calculator(camera_id)
        .ok_or_else(|| format!("camera {camera_id} is not calibrated"))?;
    let score = match tip_compensation {
        Some(factor) => calc.score_with_tip_compensation(board.x, board.y, factor),
        None => calc.score(board.x, board.y),
    };
    let report = ScoreReport {
        camera_id,
        board_x: board.x,
        board_y: board.y,
        score,
    };
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

fn replay(cfg: &DetectionConfig, args: &ReplayArgs) -> CliResult<()> {
    let t_total = Instant::now();
    let backend = ImageSequenceBackend::new(&args.frames);
    let camera_ids = if args.cameras.is_empty() {
        backend.discover()?
    } else {
        args.cameras.clone()
    };
    if camera_ids.is_empty() {
        return Err(format!("no cam<id> folders under {}", args.frames.display()).into());
    }

    let store = Arc::new(cfg.open_calibration_store());
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut engine = DetectionEngine::new(Arc::clone(&store), cfg, tx);

    let mut cycles = 0usize;
    for &id in &camera_ids {
        cycles = cycles.max(backend.frames(id)?.len());
        engine.add_camera(id, backend.open(id, &cfg.capture)?);
    }
    engine.refresh_references();

    let mut darts = 0usize;
    for _ in 0..cycles {
        match engine.step() {
            Ok(CycleOutcome::Dart(_)) => {
                darts += 1;
                if let Some(dir) = args.debug_dir.as_ref() {
                    if let Err(err) = save_overlays(dir, darts, &engine) {
                        log::warn!("failed to write overlays to {}: {err}", dir.display());
                    }
                }
            }
            Ok(CycleOutcome::Takeout(_)) => engine.refresh_references(),
            Ok(CycleOutcome::Sampling { .. }) => {}
            Err(err) => log::warn!("cycle failed: {err}"),
        }
        for event in rx.try_iter() {
            print_event(&event)?;
        }
    }
    engine.release_all();

    log::info!(
        "replayed {cycles} cycle(s) over {} camera(s), {darts} dart(s) in {} ms",
        camera_ids.len(),
        t_total.elapsed().as_millis()
    );
    Ok(())
}

fn print_event(event: &DetectionEvent) -> CliResult<()> {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}

fn save_overlays(dir: &Path, dart: usize, engine: &DetectionEngine) -> CliResult<()> {
    std::fs::create_dir_all(dir)?;
    let store = engine.calibration();
    for &(camera_id, ref tip) in engine.last_tips() {
        let Some(reference) = engine.reference(camera_id) else {
            continue;
        };
        let mut canvas = overlay::to_rgb(reference);
        if let (Some(center), Some(radii)) =
            (store.board_center(camera_id), store.ring_radii(camera_id))
        {
            overlay::draw_board_overlay(&mut canvas, center, &radii);
        }
        overlay::draw_detection(&mut canvas, tip);
        let path = dir.join(format!("dart{dart:03}_cam{camera_id}.png"));
        canvas.save(&path)?;
        log::debug!("wrote {}", path.display());
    }
    Ok(())
}
