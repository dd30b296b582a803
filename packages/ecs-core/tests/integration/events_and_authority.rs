use ecs_core::chunk_table::ByteComponent;
use ecs_core::phase::{PhaseConfig, Permission};
use ecs_core::{EcsConfig, EcsError, EventComponent, Repository};

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

fn new_repo() -> Repository {
    Repository::new(EcsConfig {
        max_entities: 32,
        ..EcsConfig::default()
    })
    .unwrap()
}

#[test]
fn published_events_are_observed_after_a_buffer_swap_and_drained_by_the_next() {
    let mut repo = new_repo();
    repo.register_event::<DamageEvent>(1).unwrap();

    repo.bus().publish(DamageEvent { amount: 10 }).unwrap();
    repo.bus().publish(DamageEvent { amount: 5 }).unwrap();

    // Nothing is visible until the write buffer becomes the read buffer.
    assert_eq!(repo.bus().consume::<DamageEvent>().unwrap(), Vec::new());

    repo.bus().swap_buffers();
    let read = repo.bus().consume::<DamageEvent>().unwrap();
    assert_eq!(read, vec![DamageEvent { amount: 10 }, DamageEvent { amount: 5 }]);

    // A second swap with nothing published in between empties the reader side.
    repo.bus().swap_buffers();
    assert_eq!(repo.bus().consume::<DamageEvent>().unwrap(), Vec::new());
}

#[test]
fn injecting_raw_bytes_into_the_current_buffer_is_observed_verbatim() {
    let mut repo = new_repo();
    repo.register_event::<DamageEvent>(1).unwrap();

    let injected = [DamageEvent { amount: 42 }, DamageEvent { amount: 7 }];
    let bytes: &[u8] = unsafe {
        std::slice::from_raw_parts(
            injected.as_ptr() as *const u8,
            injected.len() * std::mem::size_of::<DamageEvent>(),
        )
    };
    repo.bus().inject_into_current(1, bytes);

    let read = repo.bus().consume::<DamageEvent>().unwrap();
    assert_eq!(read, injected);
}

#[test]
fn authority_gated_phase_rejects_writes_to_unowned_components_and_allows_owned_ones() {
    let mut repo = new_repo();
    repo.register_byte_packed::<Position>().unwrap();
    let h = repo.create_entity();
    repo.add(h, Position::default()).unwrap();

    repo.set_phase_config(PhaseConfig::default_sim_loop()).unwrap();
    repo.set_phase("Init").unwrap();
    repo.set_phase("NetworkReceive").unwrap();
    repo.set_phase("Simulation").unwrap();
    assert_eq!(
        repo.current_phase(),
        Some("Simulation"),
        "default sim loop's Simulation phase is OwnedOnly"
    );

    // Not yet granted authority over Position: a write must be rejected.
    let rejected = repo.add(h, Position { x: 1.0, y: 1.0 });
    assert!(matches!(rejected, Err(EcsError::WrongPhase { .. })));

    // Granting authority allows the same write to proceed.
    repo.set_authority::<Position>(h, true).unwrap();
    repo.add(h, Position { x: 1.0, y: 1.0 }).unwrap();
    assert_eq!(repo.get::<Position>(h).unwrap(), Position { x: 1.0, y: 1.0 });
}

#[test]
fn relaxed_phase_config_permits_writes_everywhere() {
    let mut repo = new_repo();
    repo.register_byte_packed::<Position>().unwrap();
    let h = repo.create_entity();

    repo.set_phase_config(PhaseConfig::relaxed(&["Tick"])).unwrap();
    repo.set_phase("Tick").unwrap();
    assert_eq!(repo.current_phase(), Some("Tick"));

    // Permission::ReadWriteAll everywhere: no authority grant required.
    repo.add(h, Position { x: 2.0, y: 3.0 }).unwrap();
    assert_eq!(repo.get::<Position>(h).unwrap(), Position { x: 2.0, y: 3.0 });
    let _ = Permission::ReadWriteAll; // exercised implicitly via relaxed()
}
