use boardsight_core::BoardState;
use boardsight_vision::{calibrate, BoardRenderer, CalibrationParams, Extractor, Orientation};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nalgebra::Point2;

fn bench_extract(c: &mut Criterion) {
    let renderer = BoardRenderer::default();
    let origin = Point2::new(0, 0);
    let start = BoardState::starting_position();
    let frame = renderer.frame(0, origin, start.pieces(), Orientation::WhiteAtBottom);
    let grid = calibrate(
        renderer.board_rect(origin),
        std::slice::from_ref(&frame),
        &CalibrationParams::default(),
    )
    .expect("calibrate");
    let extractor = Extractor::default();

    c.bench_function("extract_64_squares", |b| {
        b.iter(|| extractor.extract(black_box(&frame), black_box(&grid)))
    });

    c.bench_function("calibrate_start_position", |b| {
        b.iter(|| {
            calibrate(
                renderer.board_rect(origin),
                std::slice::from_ref(black_box(&frame)),
                &CalibrationParams::default(),
            )
        })
    });
}

criterion_group!(benches, bench_extract);
criterion_main!(benches);
