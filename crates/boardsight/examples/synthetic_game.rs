//! Plays a short opening on an in-memory screen and prints what a real UCI
//! engine recommends after every tracked move.
//!
//! Usage: `synthetic_game [engine_path]` (defaults to `stockfish` on `PATH`).

use std::sync::Arc;
use std::time::Duration;

use boardsight::core::BoardState;
use boardsight::vision::BoardRenderer;
use boardsight::{
    init_logging, Orientation, ProcessLauncher, Session, SessionConfig, SessionEvent,
    VirtualScreen,
};
use nalgebra::Point2;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(log::LevelFilter::Info);

    let mut config = SessionConfig::default();
    if let Some(program) = std::env::args().nth(1) {
        config.engine.program = program.into();
    }
    config.capture.interval_ms = 100;

    let renderer = BoardRenderer::default();
    let origin = Point2::new(0, 0);
    let mut board = BoardState::starting_position();
    let screen = Arc::new(VirtualScreen::new(
        renderer.render(&board, Orientation::WhiteAtBottom),
    ));
    let launcher = Arc::new(ProcessLauncher::from_params(&config.engine));
    let mut session = Session::new(config, screen.clone(), launcher)?;
    let events = session.events();

    session.select_region(renderer.board_rect(origin))?;
    session.start()?;

    for fen in [
        "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1",
        "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2",
        "rnbqkbnr/pppp1ppp/8/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R b KQkq - 1 2",
    ] {
        board = BoardState::from_fen(fen)?;
        screen.set(renderer.render(&board, Orientation::WhiteAtBottom));
        let deadline = std::time::Instant::now() + Duration::from_secs(3);
        while let Ok(event) = events.recv_deadline(deadline) {
            match event {
                SessionEvent::PositionCommitted { fen, mv, .. } => {
                    println!("tracked {}: {fen}", mv.map(|m| m.to_string()).unwrap_or_default())
                }
                SessionEvent::Recommendation(rec) if !rec.stale => {
                    println!("  engine suggests {}", rec.mv())
                }
                _ => {}
            }
        }
    }

    session.stop();
    println!("{}", serde_json::to_string_pretty(&session.status())?);
    Ok(())
}
