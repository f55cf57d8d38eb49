//! tanplace CLI — replay recorded observation sessions through the
//! placement validation engine.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::io::BufRead;
use std::path::PathBuf;

use tanplace::{
    validate_pose, Difficulty, Engine, EngineConfig, EngineEvent, PieceShape, PuzzleLayout,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "tanplace")]
#[command(about = "Validate tangram piece placements from recorded pose observations")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a session of pose observations against a puzzle.
    Replay(ReplayArgs),

    /// Print a puzzle layout summary.
    PuzzleInfo {
        /// Path to a puzzle JSON file (defaults to the classic square).
        #[arg(long)]
        puzzle: Option<PathBuf>,
    },

    /// Write a puzzle layout as schema-v1 JSON.
    ExportPuzzle {
        /// Path to write (defaults to stdout).
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Check one pose against one target slot.
    CheckPose(CheckPoseArgs),
}

#[derive(Debug, Clone, Args)]
struct ReplayArgs {
    /// Path to a puzzle JSON file (defaults to the classic square).
    #[arg(long)]
    puzzle: Option<PathBuf>,

    /// Path to the session file: one JSON observation per line.
    #[arg(long)]
    session: PathBuf,

    /// Path to write the replay report (JSON); stdout when omitted.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Difficulty preset for the engine tolerances.
    #[arg(long, value_enum, default_value = "standard")]
    difficulty: CliDifficulty,

    /// Interval between periodic validation passes, seconds.
    #[arg(long, default_value = "0.5")]
    pass_interval: f64,
}

#[derive(Debug, Clone, Args)]
struct CheckPoseArgs {
    /// Path to a puzzle JSON file (defaults to the classic square).
    #[arg(long)]
    puzzle: Option<PathBuf>,

    /// Target slot id to check against.
    #[arg(long)]
    slot: u32,

    /// Observed x position, puzzle units.
    #[arg(long)]
    x: f64,

    /// Observed y position, puzzle units.
    #[arg(long)]
    y: f64,

    /// Observed rotation, degrees.
    #[arg(long)]
    rotation_deg: f64,

    /// Observed mirror state.
    #[arg(long)]
    flip: bool,

    /// Difficulty preset for the tolerances.
    #[arg(long, value_enum, default_value = "standard")]
    difficulty: CliDifficulty,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliDifficulty {
    Easy,
    Standard,
    Hard,
}

impl From<CliDifficulty> for Difficulty {
    fn from(d: CliDifficulty) -> Self {
        match d {
            CliDifficulty::Easy => Difficulty::Easy,
            CliDifficulty::Standard => Difficulty::Standard,
            CliDifficulty::Hard => Difficulty::Hard,
        }
    }
}

/// One recorded observation.
#[derive(Debug, Clone, serde::Deserialize)]
struct ObservationRecord {
    t: f64,
    piece: u32,
    shape: PieceShape,
    position: [f64; 2],
    rotation: f64,
    #[serde(default)]
    flip: bool,
}

#[derive(Debug, serde::Serialize)]
struct ReplayReport {
    puzzle: String,
    n_observations: usize,
    n_passes: usize,
    completed: bool,
    validated_targets: Vec<u32>,
    n_mappings: usize,
    events: Vec<EngineEvent>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Replay(args) => run_replay(args),
        Commands::PuzzleInfo { puzzle } => run_puzzle_info(puzzle),
        Commands::ExportPuzzle { out } => run_export_puzzle(out),
        Commands::CheckPose(args) => run_check_pose(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn load_puzzle(path: Option<&PathBuf>) -> CliResult<PuzzleLayout> {
    match path {
        Some(path) => Ok(PuzzleLayout::from_json_file(path)?),
        None => Ok(PuzzleLayout::default()),
    }
}

fn run_replay(args: ReplayArgs) -> CliResult<()> {
    let puzzle = load_puzzle(args.puzzle.as_ref())?;
    let puzzle_name = puzzle.name.clone();
    let config = EngineConfig::for_difficulty(args.difficulty.into());
    let mut engine = Engine::with_config(puzzle, config)?;

    let file = std::fs::File::open(&args.session)?;
    let reader = std::io::BufReader::new(file);

    let mut events = Vec::new();
    let mut n_observations = 0usize;
    let mut n_passes = 0usize;
    let mut last_time = 0.0f64;
    let mut next_pass = args.pass_interval;

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let obs: ObservationRecord = serde_json::from_str(&line)?;
        n_observations += 1;
        last_time = last_time.max(obs.t);

        engine.observe_piece(obs.piece, obs.shape, obs.position, obs.rotation, obs.flip, obs.t);

        while args.pass_interval > 0.0 && obs.t >= next_pass {
            engine.request_validation_pass(next_pass);
            n_passes += 1;
            next_pass += args.pass_interval;
        }
        events.extend(engine.drain_events());
    }

    // Final pass after the last debounce window has elapsed.
    let final_time = last_time + engine.config().placement_delay + 0.1;
    engine.request_validation_pass(final_time);
    n_passes += 1;
    events.extend(engine.drain_events());

    let report = ReplayReport {
        puzzle: puzzle_name,
        n_observations,
        n_passes,
        completed: engine.is_completed(),
        validated_targets: engine.validated_targets().iter().copied().collect(),
        n_mappings: engine.current_mappings(final_time).len(),
        events,
    };
    let json = serde_json::to_string_pretty(&report)?;
    match args.out {
        Some(path) => std::fs::write(path, json)?,
        None => println!("{json}"),
    }
    Ok(())
}

fn run_puzzle_info(path: Option<PathBuf>) -> CliResult<()> {
    let puzzle = load_puzzle(path.as_ref())?;
    println!("puzzle: {}", puzzle.name);
    println!("slots: {}", puzzle.n_slots());
    for slot in &puzzle.slots {
        println!(
            "  [{}] {:?} at ({:.4}, {:.4}) rot {:.1} deg{}",
            slot.id,
            slot.shape,
            slot.pose.position[0],
            slot.pose.position[1],
            slot.pose.rotation.to_degrees(),
            if slot.pose.flip { " flipped" } else { "" },
        );
    }
    Ok(())
}

fn run_export_puzzle(out: Option<PathBuf>) -> CliResult<()> {
    let json = PuzzleLayout::default().to_json_string();
    match out {
        Some(path) => std::fs::write(path, json)?,
        None => println!("{json}"),
    }
    Ok(())
}

fn run_check_pose(args: CheckPoseArgs) -> CliResult<()> {
    let puzzle = load_puzzle(args.puzzle.as_ref())?;
    let slot = puzzle
        .slot(args.slot)
        .ok_or_else(|| format!("no slot {} in puzzle '{}'", args.slot, puzzle.name))?;

    let config = EngineConfig::for_difficulty(args.difficulty.into());
    let observed = tanplace::Pose::new(args.x, args.y, args.rotation_deg.to_radians(), args.flip);
    let check = validate_pose(slot.shape, &observed, &slot.pose, &config.tolerances());

    println!("shape: {:?}", slot.shape);
    println!("position_ok: {} (error {:.4})", check.position_ok, check.position_error);
    println!(
        "rotation_ok: {} (error {:.2} deg)",
        check.rotation_ok,
        check.rotation_error.to_degrees()
    );
    println!("flip_ok: {}", check.flip_ok);
    match check.fault() {
        None => println!("verdict: valid"),
        Some(fault) => println!("verdict: {fault:?}"),
    }
    Ok(())
}
