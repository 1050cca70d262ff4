mod support;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use boardsight_core::{BoardState, Move, Square};
use boardsight_engine::{
    EngineConfigError, EngineError, EngineEvent, EngineHealth, EngineOrchestrator, EngineParams,
    ProcessLauncher, Score, StrengthProfile,
};
use support::{answer, next_recommendation, wait_for_event, Reply, ScriptedLauncher};

const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

fn quick_params() -> EngineParams {
    EngineParams {
        handshake_timeout_ms: 500,
        search_slack_ms: 150,
        stop_timeout_ms: 200,
        backoff_base_ms: 10,
        backoff_cap_ms: 40,
        max_restarts: 3,
        ..EngineParams::default()
    }
}

fn full_strength() -> StrengthProfile {
    StrengthProfile::full(Duration::from_millis(50)).expect("profile")
}

fn after_e4() -> BoardState {
    BoardState::from_fen("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1")
        .expect("fen")
}

fn sq(s: &str) -> Square {
    s.parse().expect("square")
}

#[test]
fn publishes_the_engine_move_for_the_latest_position() {
    let launcher = ScriptedLauncher::new(|_, _| {
        Reply::After(Duration::from_millis(10), answer(&[("e2e4", 31)]))
    });
    let orch = EngineOrchestrator::start(quick_params(), full_strength(), launcher.clone())
        .expect("start");
    let events = orch.events();

    let seq = orch
        .submit(&BoardState::starting_position(), 1)
        .expect("submit");
    let rec = next_recommendation(&events, Duration::from_secs(3)).expect("recommendation");
    assert_eq!(rec.request_seq, seq);
    assert_eq!(rec.position_seq, 1);
    assert_eq!((rec.from, rec.to), (sq("e2"), sq("e4")));
    assert_eq!(rec.evaluation, Some(Score::Centipawns(31)));
    assert!(!rec.stale);
    assert_eq!(orch.last_recommendation(), Some(rec));
    assert_eq!(orch.health(), EngineHealth::Healthy);

    let sent = launcher.sent();
    assert!(sent.contains(&"setoption name Skill Level value 20".to_string()));
    assert!(sent.contains(&format!("position fen {START_FEN}")));
    assert!(!sent.iter().any(|l| l.starts_with("setoption name MultiPV")));
}

#[test]
fn superseded_response_is_never_published() {
    let launcher = ScriptedLauncher::new(|_, fen| {
        if fen == START_FEN {
            Reply::After(Duration::from_millis(400), answer(&[("d2d4", 20)]))
        } else {
            Reply::After(Duration::from_millis(10), answer(&[("e7e5", -25)]))
        }
    });
    let orch = EngineOrchestrator::start(quick_params(), full_strength(), launcher.clone())
        .expect("start");
    let events = orch.events();

    let first = orch
        .submit(&BoardState::starting_position(), 1)
        .expect("submit");
    thread::sleep(Duration::from_millis(50));
    let second = orch.submit(&after_e4(), 2).expect("submit");
    assert!(second > first);

    let rec = next_recommendation(&events, Duration::from_secs(3)).expect("recommendation");
    assert_eq!(rec.request_seq, second);
    assert_eq!(rec.mv(), "e7e5".parse::<Move>().expect("move"));
    assert!(next_recommendation(&events, Duration::from_millis(600)).is_none());
    assert!(launcher.sent().contains(&"stop".to_string()));
}

#[test]
fn superseded_game_over_is_never_published() {
    let launcher = ScriptedLauncher::new(|_, fen| {
        if fen == START_FEN {
            Reply::After(Duration::from_millis(300), answer(&[]))
        } else {
            Reply::After(Duration::from_millis(10), answer(&[("e7e5", -25)]))
        }
    });
    let orch = EngineOrchestrator::start(quick_params(), full_strength(), launcher)
        .expect("start");
    let events = orch.events();

    let first = orch
        .submit(&BoardState::starting_position(), 1)
        .expect("submit");
    thread::sleep(Duration::from_millis(50));
    let second = orch.submit(&after_e4(), 2).expect("submit");

    let seen = wait_for_event(&events, Duration::from_millis(800), |e| {
        matches!(e, EngineEvent::NoLegalMove { .. })
    });
    assert_eq!(seen, None);
    assert_eq!(orch.last_recommendation().map(|r| r.request_seq), Some(second));
    assert!(second > first);

    orch.submit(&BoardState::starting_position(), 3)
        .expect("submit");
    orch.cancel_all();
    let seen = wait_for_event(&events, Duration::from_millis(800), |e| {
        matches!(e, EngineEvent::NoLegalMove { .. })
    });
    assert_eq!(seen, None);
}

#[test]
fn cancel_all_drops_the_outstanding_answer() {
    let launcher = ScriptedLauncher::new(|_, _| {
        Reply::After(Duration::from_millis(200), answer(&[("e2e4", 10)]))
    });
    let orch = EngineOrchestrator::start(quick_params(), full_strength(), launcher)
        .expect("start");
    let events = orch.events();

    orch.submit(&BoardState::starting_position(), 1)
        .expect("submit");
    orch.cancel_all();
    assert!(next_recommendation(&events, Duration::from_millis(600)).is_none());
    assert_eq!(orch.last_recommendation(), None);
}

#[test]
fn older_recommendation_turns_stale_on_new_submit() {
    let launcher = ScriptedLauncher::new(|_, fen| {
        if fen == START_FEN {
            Reply::After(Duration::from_millis(5), answer(&[("e2e4", 30)]))
        } else {
            Reply::After(Duration::from_millis(300), answer(&[("c7c5", -30)]))
        }
    });
    let orch = EngineOrchestrator::start(quick_params(), full_strength(), launcher)
        .expect("start");
    let events = orch.events();

    orch.submit(&BoardState::starting_position(), 1)
        .expect("submit");
    next_recommendation(&events, Duration::from_secs(3)).expect("first");
    orch.submit(&after_e4(), 2).expect("submit");
    let last = orch.last_recommendation().expect("kept");
    assert_eq!(last.position_seq, 1);
    assert!(last.stale);

    let rec = next_recommendation(&events, Duration::from_secs(3)).expect("second");
    assert_eq!(rec.position_seq, 2);
    assert!(!orch.last_recommendation().expect("fresh").stale);
}

fn skill_zero_run(seed: u64) -> Vec<Move> {
    let launcher = ScriptedLauncher::new(|_, _| {
        Reply::After(
            Duration::from_millis(1),
            answer(&[("e2e4", 30), ("d2d4", 25), ("g1f3", 20), ("c2c4", 15)]),
        )
    });
    let profile = StrengthProfile::new(0, Duration::from_millis(20), seed).expect("profile");
    let orch = EngineOrchestrator::start(quick_params(), profile, launcher.clone()).expect("start");
    let events = orch.events();

    let start = BoardState::starting_position();
    let picks = (1..=12)
        .map(|i| {
            let seq = orch.submit(&start, i).expect("submit");
            let rec = next_recommendation(&events, Duration::from_secs(3)).expect("recommendation");
            assert_eq!(rec.request_seq, seq);
            rec.mv()
        })
        .collect();

    let sent = launcher.sent();
    assert!(sent.contains(&"setoption name Skill Level value 0".to_string()));
    assert!(sent.contains(&"setoption name MultiPV value 4".to_string()));
    picks
}

#[test]
fn skill_zero_with_fixed_seed_is_reproducible() {
    let a = skill_zero_run(1234);
    let b = skill_zero_run(1234);
    assert_eq!(a, b);

    let mut distinct = a.clone();
    distinct.sort_by_key(|m| m.to_string());
    distinct.dedup();
    assert!(distinct.len() > 1, "skill 0 should not always play the top line");
}

#[test]
fn hung_engine_is_restarted_and_recovers() {
    let launcher = ScriptedLauncher::new(|launch, _| {
        if launch == 0 {
            Reply::Hang
        } else {
            Reply::After(Duration::from_millis(5), answer(&[("g1f3", 12)]))
        }
    });
    let orch = EngineOrchestrator::start(quick_params(), full_strength(), launcher.clone())
        .expect("start");
    let events = orch.events();

    let seq = orch
        .submit(&BoardState::starting_position(), 1)
        .expect("submit");
    let degraded = wait_for_event(&events, Duration::from_secs(3), |e| {
        matches!(
            e,
            EngineEvent::Health {
                health: EngineHealth::Degraded,
                ..
            }
        )
    });
    assert!(degraded.is_some());

    let rec = next_recommendation(&events, Duration::from_secs(3)).expect("recommendation");
    assert_eq!(rec.request_seq, seq);
    assert_eq!(orch.health(), EngineHealth::Healthy);
    assert_eq!(launcher.launches(), 2);
    assert_eq!(launcher.live(), 1);
}

#[test]
fn crash_loop_ends_unavailable() {
    let launcher = ScriptedLauncher::new(|_, _| Reply::Crash);
    let orch = EngineOrchestrator::start(quick_params(), full_strength(), launcher.clone())
        .expect("start");
    let events = orch.events();

    orch.submit(&BoardState::starting_position(), 1)
        .expect("submit");
    let hard = wait_for_event(&events, Duration::from_secs(5), |e| {
        matches!(
            e,
            EngineEvent::Health {
                health: EngineHealth::Unavailable,
                ..
            }
        )
    });
    assert!(hard.is_some());
    assert_eq!(orch.health(), EngineHealth::Unavailable);
    // initial launch plus max_restarts
    assert_eq!(launcher.launches(), 4);
    assert!(matches!(
        orch.submit(&BoardState::starting_position(), 2),
        Err(EngineError::Unavailable { .. })
    ));
}

#[test]
fn stop_releases_the_engine() {
    let launcher = ScriptedLauncher::new(|_, _| Reply::Hang);
    let mut orch = EngineOrchestrator::start(quick_params(), full_strength(), launcher.clone())
        .expect("start");
    orch.submit(&BoardState::starting_position(), 1)
        .expect("submit");
    thread::sleep(Duration::from_millis(20));
    orch.stop();
    assert_eq!(launcher.live(), 0);
    // idempotent
    orch.stop();
}

#[test]
fn invalid_configuration_is_rejected_before_launch() {
    let launcher = ScriptedLauncher::new(|_, _| Reply::Hang);
    let params = EngineParams {
        candidates: 0,
        ..quick_params()
    };
    let err = EngineOrchestrator::start(params, full_strength(), launcher.clone())
        .err()
        .expect("must fail");
    assert!(matches!(
        err,
        EngineError::Config(EngineConfigError::ZeroCandidates)
    ));
    assert_eq!(launcher.launches(), 0);
}

#[test]
fn missing_engine_binary_fails_at_start() {
    let params = EngineParams {
        program: "/definitely/not/an/engine".into(),
        ..quick_params()
    };
    let launcher = Arc::new(ProcessLauncher::from_params(&params));
    let err = EngineOrchestrator::start(params, full_strength(), launcher)
        .err()
        .expect("must fail");
    assert!(matches!(err, EngineError::Spawn { .. }), "{err}");
}
