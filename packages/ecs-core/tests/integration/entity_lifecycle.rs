use ecs_core::chunk_table::ByteComponent;
use ecs_core::{EcsConfig, Repository};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}
unsafe impl ByteComponent for Position {}

fn repo(max_entities: usize) -> Repository {
    Repository::new(EcsConfig {
        max_entities,
        ..EcsConfig::default()
    })
    .unwrap()
}

#[test]
fn created_entity_is_immediately_alive_with_nonzero_generation() {
    let mut repo = repo(16);
    let h = repo.create_entity();
    assert!(repo.is_alive(h));
    assert!(h.generation >= 1);
}

#[test]
fn default_handle_and_zero_generation_are_never_alive() {
    let repo = repo(16);
    let default_handle = ecs_core::EntityHandle::default();
    assert!(!repo.is_alive(default_handle));
    assert_eq!(default_handle.generation, 0);
}

#[test]
fn add_then_read_round_trips_the_exact_value() {
    let mut repo = repo(16);
    repo.register_byte_packed::<Position>().unwrap();
    let h = repo.create_entity();
    repo.add(h, Position { x: 1.5, y: -2.25 }).unwrap();

    assert_eq!(repo.get::<Position>(h).unwrap(), Position { x: 1.5, y: -2.25 });
}

#[test]
fn destroying_an_entity_invalidates_its_handle_and_recycles_the_slot() {
    let mut repo = repo(16);
    let h1 = repo.create_entity();
    assert!(repo.destroy_entity(h1));
    assert!(!repo.is_alive(h1));

    // Keep allocating until the freed slot is handed back out; the new
    // handle at that slot must carry a different generation than h1's.
    let mut reused = None;
    for _ in 0..64 {
        let candidate = repo.create_entity();
        if candidate.index == h1.index {
            reused = Some(candidate);
            break;
        }
    }
    let h2 = reused.expect("slot was never recycled within the retry budget");
    assert_ne!(h2.generation, h1.generation);
    assert!(repo.is_alive(h2));
    assert!(!repo.is_alive(h1));
}

#[test]
fn clear_resets_liveness_and_zeroes_every_table_chunk() {
    let mut repo = repo(256);
    repo.register_byte_packed::<Position>().unwrap();

    let handles: Vec<_> = (0..50)
        .map(|i| {
            let h = repo.create_entity();
            repo.add(h, Position { x: i as f32, y: i as f32 }).unwrap();
            h
        })
        .collect();

    repo.clear();

    assert_eq!(repo.active_count(), 0);
    for h in handles {
        assert!(!repo.is_alive(h));
    }

    // Re-populate the same slots: a fresh read must observe a zeroed table,
    // not leftover bytes from before the clear.
    let h = repo.create_entity();
    assert_eq!(repo.get::<Position>(h).unwrap(), Position::default());
}
