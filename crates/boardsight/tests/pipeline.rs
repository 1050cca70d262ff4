mod support;

use std::sync::Arc;
use std::time::Duration;

use boardsight::core::{BoardState, Frame};
use boardsight::engine::EngineParams;
use boardsight::tracker::InitialPosition;
use boardsight::vision::{calibrate, CalibrationError, CalibrationParams};
use boardsight::{
    CaptureError, CaptureParams, Move, Session, SessionConfig, SessionError, SessionEvent,
    StrengthProfile, TrackerState, VirtualScreen,
};
use nalgebra::Point2;
use support::{best, board_rect, screen_with, wait_for, ScriptedEngine};

const TIMEOUT: Duration = Duration::from_secs(5);
const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1";
const FOOLS_MATE: &str = "rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3";

fn config() -> SessionConfig {
    SessionConfig {
        capture: CaptureParams {
            interval_ms: 10,
            sample_frames: 2,
            sample_gap_ms: 1,
        },
        engine: EngineParams {
            handshake_timeout_ms: 500,
            search_slack_ms: 300,
            stop_timeout_ms: 200,
            backoff_base_ms: 10,
            backoff_cap_ms: 40,
            ..EngineParams::default()
        },
        strength: StrengthProfile::full(Duration::from_millis(20)).expect("profile"),
        ..SessionConfig::default()
    }
}

fn opening_engine() -> Arc<ScriptedEngine> {
    ScriptedEngine::new(|fen| {
        if fen.starts_with("rnbqkbnr/pppppppp/8/8/8/8/") {
            best(Some("e2e4"), 30)
        } else {
            best(Some("e7e5"), -20)
        }
    })
}

fn board(fen: &str) -> BoardState {
    BoardState::from_fen(fen).expect("fen")
}

fn origin() -> Point2<i32> {
    Point2::new(0, 0)
}

fn committed(event: &SessionEvent, seq: u64) -> bool {
    matches!(event, SessionEvent::PositionCommitted { position_seq, .. } if *position_seq == seq)
}

fn recommendation_for(event: &SessionEvent, seq: u64) -> bool {
    matches!(event, SessionEvent::Recommendation(r) if r.position_seq == seq)
}

#[test]
fn tracks_a_move_and_recommends_a_reply() {
    let screen = Arc::new(VirtualScreen::new(screen_with(
        &BoardState::starting_position(),
        origin(),
    )));
    let engine = opening_engine();
    let mut session = Session::new(config(), screen.clone(), engine.clone()).expect("session");
    let events = session.events();

    session.select_region(board_rect(origin())).expect("select");
    let calibrated = wait_for(&events, TIMEOUT, |e| matches!(e, SessionEvent::Calibrated { .. }));
    assert!(calibrated.is_some());
    let initial = wait_for(&events, TIMEOUT, |e| committed(e, 1)).expect("initial position");
    assert!(matches!(initial, SessionEvent::PositionCommitted { mv: None, .. }));

    session.start().expect("start");
    let first = wait_for(&events, TIMEOUT, |e| recommendation_for(e, 1));
    match first {
        Some(SessionEvent::Recommendation(r)) => {
            assert_eq!(r.mv(), "e2e4".parse::<Move>().expect("move"))
        }
        other => panic!("expected a recommendation, got {other:?}"),
    }

    screen.set(screen_with(&board(AFTER_E4), origin()));
    match wait_for(&events, TIMEOUT, |e| committed(e, 2)) {
        Some(SessionEvent::PositionCommitted { fen, mv, .. }) => {
            assert_eq!(mv, Some("e2e4".parse().expect("move")));
            assert!(fen.starts_with("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq"));
        }
        other => panic!("expected a commit, got {other:?}"),
    }
    let reply = wait_for(&events, TIMEOUT, |e| recommendation_for(e, 2));
    assert!(reply.is_some());

    let status = session.status();
    assert!(status.running);
    assert_eq!(status.tracker_state, TrackerState::Tracking);
    assert_eq!(status.position_seq, 2);
    assert!(status.frames_processed > 0);

    session.stop();
    assert!(wait_for(&events, TIMEOUT, |e| matches!(e, SessionEvent::Stopped)).is_some());
    assert_eq!(engine.live(), 0);
    let status = session.status();
    assert!(!status.running);
    assert_eq!(status.engine_health, None);
    assert_eq!(
        status.last_recommendation.map(|r| r.position_seq),
        Some(2)
    );
}

#[test]
fn lifecycle_rules_are_enforced() {
    let screen = Arc::new(VirtualScreen::new(screen_with(
        &BoardState::starting_position(),
        origin(),
    )));
    let mut session = Session::new(config(), screen, opening_engine()).expect("session");
    assert!(matches!(session.start(), Err(SessionError::NotCalibrated)));
    assert!(matches!(
        session.recalibrate(board_rect(origin())),
        Err(SessionError::NotCalibrated)
    ));

    session.select_region(board_rect(origin())).expect("select");
    session.start().expect("start");
    assert!(matches!(session.start(), Err(SessionError::AlreadyRunning)));
    assert!(matches!(
        session.select_region(board_rect(origin())),
        Err(SessionError::Running)
    ));
    let weaker = StrengthProfile::new(3, Duration::from_millis(20), 9).expect("profile");
    assert!(matches!(
        session.set_strength(weaker.clone()),
        Err(SessionError::Running)
    ));

    session.stop();
    session.stop();
    session.set_strength(weaker.clone()).expect("stopped");
    assert_eq!(session.config().strength, weaker);
}

#[test]
fn failed_calibration_is_reported() {
    let screen = Arc::new(VirtualScreen::new(screen_with(
        &BoardState::starting_position(),
        origin(),
    )));
    let mut session = Session::new(config(), screen, opening_engine()).expect("session");
    let events = session.events();

    // squares far below the minimum size
    let err = session
        .select_region(boardsight::ScreenRect::new(20, 20, 40, 40))
        .expect_err("too small");
    assert!(matches!(err, SessionError::Calibration(_)));
    assert!(wait_for(&events, TIMEOUT, |e| matches!(e, SessionEvent::CalibrationFailed(_))).is_some());
    assert_eq!(session.status().tracker_state, TrackerState::Calibrating);

    let err = session
        .select_region(boardsight::ScreenRect::new(400, 400, 300, 300))
        .expect_err("off screen");
    assert!(matches!(
        err,
        SessionError::Capture(CaptureError::RegionUnavailable { .. })
    ));
    assert!(session.grid().is_none());
}

#[test]
fn recalibration_follows_a_moved_board() {
    let screen = Arc::new(VirtualScreen::new(screen_with(
        &BoardState::starting_position(),
        origin(),
    )));
    let mut session = Session::new(config(), screen.clone(), opening_engine()).expect("session");
    let events = session.events();
    session.select_region(board_rect(origin())).expect("select");
    session.start().expect("start");

    let moved = Point2::new(64, 48);
    screen.set(screen_with(&BoardState::starting_position(), moved));
    session.recalibrate(board_rect(moved)).expect("recalibrate");
    assert_eq!(session.status().region, Some(board_rect(moved)));

    screen.set(screen_with(&board(AFTER_E4), moved));
    let commit = wait_for(&events, TIMEOUT, |e| committed(e, 2));
    assert!(matches!(
        commit,
        Some(SessionEvent::PositionCommitted { mv: Some(_), .. })
    ));
    session.stop();
}

#[test]
fn checkmate_read_from_screen_ends_the_game() {
    let start = screen_with(&BoardState::starting_position(), origin());
    let frame = Frame::new(0, origin(), start);
    let grid = calibrate(board_rect(origin()), &[frame], &CalibrationParams::default())
        .expect("calibrate");

    let screen = Arc::new(VirtualScreen::new(screen_with(&board(FOOLS_MATE), origin())));
    let engine = ScriptedEngine::new(|_| best(None, 0));
    let mut cfg = config();
    cfg.tracker.initial_position = InitialPosition::BoardRead;
    let mut session = Session::new(cfg, screen, engine).expect("session");
    let events = session.events();

    session.restore_calibration(grid).expect("restore");
    let status = session.status();
    assert!(status
        .fen
        .as_deref()
        .is_some_and(|f| f.starts_with("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w")));

    session.start().expect("start");
    let over = wait_for(&events, TIMEOUT, |e| matches!(e, SessionEvent::GameOver { .. }));
    assert_eq!(over, Some(SessionEvent::GameOver { position_seq: 1 }));
}

#[test]
fn malformed_stored_grid_is_refused() {
    let start = screen_with(&BoardState::starting_position(), origin());
    let frame = Frame::new(0, origin(), start.clone());
    let mut grid = calibrate(board_rect(origin()), &[frame], &CalibrationParams::default())
        .expect("calibrate");
    grid.cells.truncate(10);

    let screen = Arc::new(VirtualScreen::new(start));
    let mut session = Session::new(config(), screen, opening_engine()).expect("session");
    let events = session.events();

    let err = session.restore_calibration(grid).expect_err("short grid");
    assert!(matches!(
        err,
        SessionError::Calibration(CalibrationError::InvalidGrid(_))
    ));
    assert!(wait_for(&events, TIMEOUT, |e| matches!(e, SessionEvent::CalibrationFailed(_))).is_some());
    assert!(session.grid().is_none());
    assert_eq!(session.status().tracker_state, TrackerState::Idle);
    assert!(matches!(session.start(), Err(SessionError::NotCalibrated)));
}
