use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use boardsight::core::{BoardReadings, Frame, Occupancy, RgbImage, ScreenRect, Square};
use boardsight::engine::StrengthProfile;
use boardsight::vision::{calibrate, Extractor};
use boardsight::{
    init_logging, load_rgb, CaptureError, ImageFileGrabber, Orientation, ProcessLauncher, Session,
    SessionConfig, SessionError, SessionEvent, StoredCalibration,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use nalgebra::Point2;

#[derive(Parser, Debug)]
#[command(name = "boardsight", version, about = "Track an on-screen chessboard and ask a UCI engine for moves")]
struct Cli {
    /// More log output (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Learn the board in a screenshot of the starting position.
    Calibrate(CalibrateArgs),
    /// Print the board read from a screenshot with a stored calibration.
    Read(ReadArgs),
    /// Track a screenshot file that is being refreshed and print engine moves.
    Watch(WatchArgs),
}

#[derive(Args, Debug)]
struct CalibrateArgs {
    /// Screenshot showing the starting position.
    #[arg(long)]
    image: PathBuf,
    /// Board region as `x,y,width,height` in screenshot pixels.
    #[arg(long, value_parser = parse_rect)]
    rect: ScreenRect,
    /// Army at the bottom of the screen; detected when omitted.
    #[arg(long, value_enum)]
    orientation: Option<Side>,
    /// Session config whose calibration and extractor settings are used.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct ReadArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    calibration: PathBuf,
}

#[derive(Args, Debug)]
struct WatchArgs {
    /// Screenshot file, re-read on every capture.
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    calibration: PathBuf,
    #[arg(long)]
    config: Option<PathBuf>,
    /// UCI engine executable.
    #[arg(long)]
    engine: Option<PathBuf>,
    /// Engine skill, 0 (weakest) to 20.
    #[arg(long)]
    skill: Option<u8>,
    /// Think time per move in milliseconds.
    #[arg(long)]
    think_ms: Option<u64>,
    #[arg(long)]
    seed: Option<u64>,
    /// Stop after this many seconds; runs until killed otherwise.
    #[arg(long)]
    duration_secs: Option<u64>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Side {
    White,
    Black,
}

impl From<Side> for Orientation {
    fn from(side: Side) -> Self {
        match side {
            Side::White => Orientation::WhiteAtBottom,
            Side::Black => Orientation::BlackAtBottom,
        }
    }
}

fn parse_rect(s: &str) -> Result<ScreenRect, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [x, y, w, h] = parts.as_slice() else {
        return Err(format!("expected x,y,width,height, got {s:?}"));
    };
    let int = |v: &str| v.parse::<i32>().map_err(|e| format!("{v:?}: {e}"));
    let size = |v: &str| v.parse::<u32>().map_err(|e| format!("{v:?}: {e}"));
    Ok(ScreenRect::new(int(x)?, int(y)?, size(w)?, size(h)?))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    init_logging(level);

    let res = match cli.command {
        Command::Calibrate(args) => run_calibrate(args),
        Command::Read(args) => run_read(args),
        Command::Watch(args) => run_watch(args),
    };
    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<SessionConfig, SessionError> {
    match path {
        Some(p) => Ok(SessionConfig::load_json(p)?),
        None => Ok(SessionConfig::default()),
    }
}

/// The whole screenshot as a frame anchored at screen `(0, 0)`.
fn screenshot(image: RgbImage) -> Frame {
    Frame::new(0, Point2::new(0, 0), image)
}

fn run_calibrate(args: CalibrateArgs) -> Result<(), SessionError> {
    let config = load_config(args.config.as_ref())?;
    let mut params = config.calibration.clone();
    if let Some(side) = args.orientation {
        params.orientation_hint = Some(side.into());
    }
    let frame = screenshot(load_rgb(&args.image)?);
    let grid = calibrate(args.rect, &[frame], &params)?;
    println!(
        "calibrated {}x{} at ({}, {}), {:?}",
        grid.region.width, grid.region.height, grid.region.x, grid.region.y, grid.orientation
    );
    StoredCalibration {
        grid,
        calibration: params,
        extractor: config.extractor,
    }
    .write_json(&args.out)?;
    println!("saved {}", args.out.display());
    Ok(())
}

fn run_read(args: ReadArgs) -> Result<(), SessionError> {
    let stored = StoredCalibration::load_json(&args.calibration)?;
    let frame = screenshot(load_rgb(&args.image)?);
    if !frame.bounds().contains(&stored.grid.region) {
        return Err(CaptureError::RegionUnavailable {
            region: stored.grid.region,
            screen: (frame.image.width, frame.image.height),
        }
        .into());
    }
    let readings = Extractor::new(stored.extractor).extract(&frame, &stored.grid);
    print!("{}", diagram(&readings));
    match placement(&readings) {
        Some(fen) => println!("{fen}"),
        None => println!("incomplete read"),
    }
    Ok(())
}

fn cell_char(occupancy: Occupancy) -> char {
    match occupancy {
        Occupancy::Empty => '.',
        Occupancy::Piece(p) => p.to_fen_char(),
        Occupancy::Unknown => '?',
    }
}

/// Rank 8 first, `?` for unreadable squares.
fn diagram(readings: &BoardReadings) -> String {
    let mut out = String::new();
    for rank in (0..8u8).rev() {
        out.push(char::from(b'1' + rank));
        for file in 0..8u8 {
            out.push(' ');
            out.push(cell_char(readings[Square::at(file, rank).index()].occupancy));
        }
        out.push('\n');
    }
    out.push_str("  a b c d e f g h\n");
    out
}

/// FEN piece placement, if every square was read.
fn placement(readings: &BoardReadings) -> Option<String> {
    let mut out = String::with_capacity(72);
    for rank in (0..8u8).rev() {
        let mut empty = 0;
        for file in 0..8u8 {
            match readings[Square::at(file, rank).index()].occupancy {
                Occupancy::Unknown => return None,
                Occupancy::Empty => empty += 1,
                Occupancy::Piece(p) => {
                    if empty > 0 {
                        out.push_str(&empty.to_string());
                        empty = 0;
                    }
                    out.push(p.to_fen_char());
                }
            }
        }
        if empty > 0 {
            out.push_str(&empty.to_string());
        }
        if rank > 0 {
            out.push('/');
        }
    }
    Some(out)
}

fn run_watch(args: WatchArgs) -> Result<(), SessionError> {
    let stored = StoredCalibration::load_json(&args.calibration)?;
    let mut config = load_config(args.config.as_ref())?;
    config.calibration = stored.calibration;
    config.extractor = stored.extractor;
    if let Some(program) = args.engine {
        config.engine.program = program;
    }
    if args.skill.is_some() || args.think_ms.is_some() || args.seed.is_some() {
        let base = &config.strength;
        let think = args.think_ms.map(Duration::from_millis).unwrap_or(base.think_time());
        let mut profile = StrengthProfile::new(
            args.skill.unwrap_or(base.skill()),
            think,
            args.seed.unwrap_or(base.seed()),
        )?;
        if let Some(depth) = base.max_depth() {
            profile = profile.with_max_depth(depth)?;
        }
        config.strength = profile;
    }

    let launcher = Arc::new(ProcessLauncher::from_params(&config.engine));
    let grabber = Arc::new(ImageFileGrabber::new(&args.image));
    let mut session = Session::new(config, grabber, launcher)?;
    let events = session.events();
    session.restore_calibration(stored.grid)?;
    session.start()?;

    let deadline = args
        .duration_secs
        .map(|s| Instant::now() + Duration::from_secs(s));
    loop {
        let wait = match deadline {
            Some(d) if Instant::now() >= d => break,
            Some(d) => d.saturating_duration_since(Instant::now()),
            None => Duration::from_secs(3600),
        };
        if let Ok(event) = events.recv_timeout(wait) {
            report(&event);
        }
    }
    session.stop();
    while let Ok(event) = events.try_recv() {
        report(&event);
    }
    match serde_json::to_string_pretty(&session.status()) {
        Ok(json) => println!("{json}"),
        Err(e) => log::warn!("status not serializable: {e}"),
    }
    Ok(())
}

fn report(event: &SessionEvent) {
    match event {
        SessionEvent::PositionCommitted {
            position_seq,
            fen,
            mv,
        } => match mv {
            Some(mv) => println!("#{position_seq} {mv}: {fen}"),
            None => println!("#{position_seq} start: {fen}"),
        },
        SessionEvent::Recommendation(rec) => {
            let eval = rec
                .evaluation
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "?".into());
            let stale = if rec.stale { " (stale)" } else { "" };
            println!("#{} best {} [{eval}]{stale}", rec.position_seq, rec.mv());
        }
        SessionEvent::GameOver { position_seq } => println!("#{position_seq} game over"),
        SessionEvent::RecalibrationRecommended => {
            println!("board lost; recalibrate the region")
        }
        other => log::info!("{other:?}"),
    }
}
