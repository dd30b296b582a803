//! Flight-recorder capture + playback roundtrip benchmarks.
//!
//! Exercises the full `.fdp` pipeline end to end: capturing keyframe and
//! delta frames through [`FlightRecorder`], then replaying them back into a
//! fresh [`Repository`] through [`Session`] and the [`SeekController`].

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ecs_core::chunk_table::ByteComponent;
use ecs_core::snapshot::{FlightRecorder, Session, SeekController};
use ecs_core::{EcsConfig, Repository};
use std::hint::black_box;
use std::path::PathBuf;
use tempfile::tempdir;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}
unsafe impl ByteComponent for Position {}

fn current_thread_rt() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Records `tick_count` frames (one keyframe followed by deltas) for
/// `entity_count` entities, mutating one component field each tick so every
/// delta frame carries real chunk churn.
fn record_stream(path: &PathBuf, entity_count: usize, tick_count: u64) {
    let rt = current_thread_rt();
    rt.block_on(async {
        let mut repo = Repository::new(EcsConfig {
            max_entities: entity_count,
            ..EcsConfig::default()
        })
        .unwrap();
        repo.register_byte_packed::<Position>().unwrap();

        let handles: Vec<_> = (0..entity_count)
            .map(|i| {
                let h = repo.create_entity();
                repo.add(h, Position { x: i as f32, y: 0.0 }).unwrap();
                h
            })
            .collect();

        let mut rec = FlightRecorder::create(EcsConfig::default(), path).unwrap();

        for tick in 0..tick_count {
            for &h in &handles {
                let _ = repo.get_mut::<Position, _>(h, |p| {
                    p.x = tick as f32;
                    p.y = tick as f32;
                });
            }
            rec.capture_frame(&mut repo, tick, tick == 0).await.unwrap();
        }

        rec.flush_and_close().await.unwrap();
    });
}

/// Benchmark: capturing a keyframe plus a run of delta frames.
fn bench_capture_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("capture_throughput");
    group.sample_size(10);

    for &entity_count in &[1_000usize, 10_000] {
        group.bench_with_input(
            BenchmarkId::new("entities", entity_count),
            &entity_count,
            |b, &entity_count| {
                b.iter(|| {
                    let dir = tempdir().unwrap();
                    let path = dir.path().join("capture.fdp");
                    record_stream(&path, entity_count, 16);
                    black_box(&path);
                });
            },
        );
    }

    group.finish();
}

/// Benchmark: sequential playback of a recorded stream via [`Session`].
fn bench_sequential_playback(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("playback.fdp");
    record_stream(&path, 10_000, 16);

    let mut group = c.benchmark_group("sequential_playback");
    group.sample_size(20);

    group.bench_function("step_forward_all_frames", |b| {
        b.iter(|| {
            let mut repo = Repository::new(EcsConfig {
                max_entities: 10_000,
                ..EcsConfig::default()
            })
            .unwrap();
            repo.register_byte_packed::<Position>().unwrap();

            let mut session = Session::open(&path).unwrap();
            while session.step_forward(&mut repo).unwrap().is_some() {}

            black_box(repo.active_count());
        });
    });

    group.finish();
}

/// Benchmark: random-access seeking via [`SeekController`], which must
/// roll forward from the nearest keyframe with events muted along the way.
fn bench_seek_to_tick(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("seek.fdp");
    record_stream(&path, 10_000, 32);

    let mut group = c.benchmark_group("seek_to_tick");
    group.sample_size(20);

    group.bench_function("seek_to_last_tick", |b| {
        b.iter(|| {
            let mut repo = Repository::new(EcsConfig {
                max_entities: 10_000,
                ..EcsConfig::default()
            })
            .unwrap();
            repo.register_byte_packed::<Position>().unwrap();

            let mut controller = SeekController::open(&path).unwrap();
            let last_tick = *controller.ticks().last().unwrap();
            let landed = controller.seek_to_tick(&mut repo, last_tick).unwrap();

            black_box(landed);
        });
    });

    group.bench_function("seek_to_midpoint_tick", |b| {
        b.iter(|| {
            let mut repo = Repository::new(EcsConfig {
                max_entities: 10_000,
                ..EcsConfig::default()
            })
            .unwrap();
            repo.register_byte_packed::<Position>().unwrap();

            let mut controller = SeekController::open(&path).unwrap();
            let ticks = controller.ticks();
            let mid_tick = ticks[ticks.len() / 2];
            let landed = controller.seek_to_tick(&mut repo, mid_tick).unwrap();

            black_box(landed);
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_capture_throughput,
    bench_sequential_playback,
    bench_seek_to_tick
);
criterion_main!(benches);
