#![cfg(feature = "cli")]

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use boardsight::core::BoardState;
use boardsight::save_rgb;
use boardsight::vision::BoardRenderer;
use boardsight::{Orientation, StoredCalibration};
use predicates::prelude::*;
use tempfile::TempDir;

const START_PLACEMENT: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR";
const E4_PLACEMENT: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR";
const RECT: &str = "16,16,384,384";

fn screenshot(dir: &Path, name: &str, fen: &str) -> PathBuf {
    let board = BoardState::from_fen(fen).expect("fen");
    let img = BoardRenderer::default().render(&board, Orientation::WhiteAtBottom);
    let path = dir.join(name);
    save_rgb(&img, &path).expect("png");
    path
}

fn start_png(dir: &Path) -> PathBuf {
    screenshot(
        dir,
        "start.png",
        "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
    )
}

fn boardsight() -> Command {
    Command::cargo_bin("boardsight").expect("binary")
}

fn calibrated(dir: &TempDir) -> PathBuf {
    let out = dir.path().join("calibration.json");
    boardsight()
        .args(["calibrate", "--rect", RECT, "--image"])
        .arg(start_png(dir.path()))
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("WhiteAtBottom"));
    out
}

#[test]
fn help_lists_subcommands() {
    boardsight()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("calibrate").and(predicate::str::contains("watch")));
}

#[test]
fn calibrate_writes_a_reusable_calibration() {
    let dir = TempDir::new().expect("tempdir");
    let path = calibrated(&dir);
    let stored = StoredCalibration::load_json(&path).expect("stored calibration");
    assert_eq!(stored.grid.region, boardsight::ScreenRect::new(16, 16, 384, 384));
    assert_eq!(stored.grid.orientation, Orientation::WhiteAtBottom);
}

#[test]
fn read_prints_the_board_placement() {
    let dir = TempDir::new().expect("tempdir");
    let calibration = calibrated(&dir);

    boardsight()
        .arg("read")
        .arg("--image")
        .arg(start_png(dir.path()))
        .arg("--calibration")
        .arg(&calibration)
        .assert()
        .success()
        .stdout(predicate::str::contains(START_PLACEMENT));

    let e4 = screenshot(
        dir.path(),
        "e4.png",
        "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1",
    );
    boardsight()
        .arg("read")
        .arg("--image")
        .arg(e4)
        .arg("--calibration")
        .arg(&calibration)
        .assert()
        .success()
        .stdout(predicate::str::contains(E4_PLACEMENT));
}

#[test]
fn calibrate_rejects_a_region_outside_the_image() {
    let dir = TempDir::new().expect("tempdir");
    boardsight()
        .args(["calibrate", "--rect", "300,300,384,384", "--image"])
        .arg(start_png(dir.path()))
        .arg("--out")
        .arg(dir.path().join("never.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("not inside"));
    assert!(!dir.path().join("never.json").exists());
}

#[test]
fn calibrate_rejects_a_malformed_rect() {
    let dir = TempDir::new().expect("tempdir");
    boardsight()
        .args(["calibrate", "--rect", "16,16,384", "--image"])
        .arg(start_png(dir.path()))
        .arg("--out")
        .arg(dir.path().join("never.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("x,y,width,height"));
}

#[test]
fn watch_reports_a_missing_engine() {
    let dir = TempDir::new().expect("tempdir");
    let calibration = calibrated(&dir);
    boardsight()
        .arg("watch")
        .arg("--image")
        .arg(start_png(dir.path()))
        .arg("--calibration")
        .arg(&calibration)
        .args(["--engine", "/definitely/not/an/engine", "--duration-secs", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to start engine"));
}
