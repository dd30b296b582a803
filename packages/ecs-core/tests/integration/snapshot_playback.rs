use ecs_core::chunk_table::ByteComponent;
use ecs_core::snapshot::{FlightRecorder, SeekController, Session};
use ecs_core::{EcsConfig, EventComponent, Repository};
use tempfile::tempdir;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}
unsafe impl ByteComponent for Position {}

#[derive(Debug, Clone, Copy, PartialEq)]
struct DamageEvent {
    amount: u32,
}
unsafe impl EventComponent for DamageEvent {}

fn rt() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
}

fn new_repo(max_entities: usize) -> Repository {
    Repository::new(EcsConfig {
        max_entities,
        ..EcsConfig::default()
    })
    .unwrap()
}

#[test]
fn keyframe_then_delta_then_seek_reproduces_natural_playback() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("scenario.fdp");

    let rt = rt();
    let mut src = new_repo(32);
    src.register_byte_packed::<Position>().unwrap();
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let h = src.create_entity();
            src.add(h, Position { x: i as f32, y: 0.0 }).unwrap();
            h
        })
        .collect();

    rt.block_on(async {
        let mut rec = FlightRecorder::create(EcsConfig::default(), &path).unwrap();
        rec.capture_frame(&mut src, 0, true).await.unwrap(); // keyframe

        for tick in 1..5u64 {
            for &h in &handles {
                src.get_mut::<Position, _>(h, |p| p.y = tick as f32).unwrap();
            }
            rec.capture_frame(&mut src, tick, false).await.unwrap(); // deltas
        }

        rec.flush_and_close().await.unwrap();
    });

    // Natural playback: step forward through every frame in order.
    let mut natural = new_repo(32);
    natural.register_byte_packed::<Position>().unwrap();
    let mut session = Session::open(&path).unwrap();
    while session.step_forward(&mut natural).unwrap().is_some() {}

    // Seek directly to the final tick via the index built by SeekController.
    let mut seeked = new_repo(32);
    seeked.register_byte_packed::<Position>().unwrap();
    let mut controller = SeekController::open(&path).unwrap();
    let last_tick = *controller.ticks().last().unwrap();
    controller.seek_to_tick(&mut seeked, last_tick).unwrap();

    for &h in &handles {
        assert_eq!(natural.get::<Position>(h).unwrap(), seeked.get::<Position>(h).unwrap());
        assert_eq!(seeked.get::<Position>(h).unwrap().y, 4.0);
    }
}

#[test]
fn applying_the_same_keyframe_twice_yields_the_same_world() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("idempotent.fdp");

    let rt = rt();
    let mut src = new_repo(16);
    src.register_byte_packed::<Position>().unwrap();
    let h = src.create_entity();
    src.add(h, Position { x: 7.0, y: 7.0 }).unwrap();

    rt.block_on(async {
        let mut rec = FlightRecorder::create(EcsConfig::default(), &path).unwrap();
        rec.capture_frame(&mut src, 0, true).await.unwrap();
        rec.flush_and_close().await.unwrap();
    });

    let mut dst = new_repo(16);
    dst.register_byte_packed::<Position>().unwrap();
    let mut session = Session::open(&path).unwrap();
    session.step_forward(&mut dst).unwrap();
    let first_read = dst.get::<Position>(h).unwrap();

    // Re-apply the same keyframe bytes from a fresh session.
    let mut session2 = Session::open(&path).unwrap();
    session2.step_forward(&mut dst).unwrap();
    let second_read = dst.get::<Position>(h).unwrap();

    assert_eq!(first_read, second_read);
    assert!(dst.is_alive(h));
}

#[test]
fn destroyed_entities_survive_the_round_trip_as_dead() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("destroy.fdp");

    let rt = rt();
    let mut src = new_repo(16);
    src.register_byte_packed::<Position>().unwrap();
    let survivor = src.create_entity();
    src.add(survivor, Position { x: 1.0, y: 1.0 }).unwrap();
    let doomed = src.create_entity();
    src.destroy_entity(doomed);

    rt.block_on(async {
        let mut rec = FlightRecorder::create(EcsConfig::default(), &path).unwrap();
        rec.capture_frame(&mut src, 0, true).await.unwrap();
        rec.flush_and_close().await.unwrap();
    });

    let mut dst = new_repo(16);
    dst.register_byte_packed::<Position>().unwrap();
    let mut session = Session::open(&path).unwrap();
    session.step_forward(&mut dst).unwrap();

    assert!(dst.is_alive(survivor));
    assert!(!dst.is_alive(doomed));
}

#[test]
fn recorder_backpressure_forces_a_keyframe_after_dropped_frames() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("backpressure.fdp");

    let rt = rt();
    let mut repo = new_repo(16);
    repo.register_byte_packed::<Position>().unwrap();
    let h = repo.create_entity();
    repo.add(h, Position::default()).unwrap();

    rt.block_on(async {
        let mut rec = FlightRecorder::create(EcsConfig::default(), &path).unwrap();
        rec.capture_frame(&mut repo, 0, true).await.unwrap();

        // Back-to-back captures with no yield in between may or may not
        // race the previous frame's background writer; either outcome must
        // leave the stream decodable, which is what this test checks. The
        // drop/forced-keyframe mechanism itself is unit-tested directly
        // against the recorder's internal in-flight flag.
        for tick in 1..4u64 {
            let _ = rec.capture_frame(&mut repo, tick, false).await;
        }

        rec.flush_and_close().await.unwrap();
    });

    // Whatever frames landed, the stream must still open and decode cleanly.
    let mut replay = new_repo(16);
    replay.register_byte_packed::<Position>().unwrap();
    let mut session = Session::open(&path).unwrap();
    let mut frame_count = 0;
    while session.step_forward(&mut replay).unwrap().is_some() {
        frame_count += 1;
    }
    assert!(frame_count >= 1);
    assert!(replay.is_alive(h));
}

#[test]
fn replayed_events_are_scoped_to_their_own_frame_not_accumulated_across_frames() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("events.fdp");

    let rt = rt();
    let mut src = new_repo(16);
    src.register_event::<DamageEvent>(7).unwrap();

    rt.block_on(async {
        let mut rec = FlightRecorder::create(EcsConfig::default(), &path).unwrap();
        rec.capture_frame(&mut src, 0, true).await.unwrap(); // keyframe, no events yet

        src.bus().publish(DamageEvent { amount: 10 }).unwrap();
        rec.capture_frame(&mut src, 1, false).await.unwrap();

        src.bus().publish(DamageEvent { amount: 20 }).unwrap();
        rec.capture_frame(&mut src, 2, false).await.unwrap();

        src.bus().publish(DamageEvent { amount: 30 }).unwrap();
        rec.capture_frame(&mut src, 3, false).await.unwrap();

        rec.flush_and_close().await.unwrap();
    });

    let mut dst = new_repo(16);
    dst.register_event::<DamageEvent>(7).unwrap();
    let mut session = Session::open(&path).unwrap();

    session.step_forward(&mut dst).unwrap(); // frame 0
    assert_eq!(dst.bus().consume::<DamageEvent>().unwrap(), Vec::new());

    session.step_forward(&mut dst).unwrap(); // frame 1
    assert_eq!(dst.bus().consume::<DamageEvent>().unwrap(), Vec::new());

    session.step_forward(&mut dst).unwrap(); // frame 2
    assert_eq!(
        dst.bus().consume::<DamageEvent>().unwrap(),
        vec![DamageEvent { amount: 10 }],
        "frame 2's event block carries only the amount-10 event"
    );

    session.step_forward(&mut dst).unwrap(); // frame 3
    assert_eq!(
        dst.bus().consume::<DamageEvent>().unwrap(),
        vec![DamageEvent { amount: 20 }],
        "frame 3's landing must not retain frame 2's already-consumed event"
    );
}
