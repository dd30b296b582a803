use ecs_core::chunk_table::ByteComponent;
use ecs_core::{EcsConfig, Repository};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}
unsafe impl ByteComponent for Position {}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Tag(&'static str);

#[test]
fn committing_past_the_first_chunk_grows_lazily_without_disturbing_earlier_entities() {
    // Small chunks force growth well before the default 64 KiB page would.
    let mut repo = Repository::new(EcsConfig {
        max_entities: 4096,
        chunk_size_bytes: 64,
        ..EcsConfig::default()
    })
    .unwrap();
    let id = repo.register_byte_packed::<Position>().unwrap();

    let first = repo.create_entity();
    repo.add(first, Position { x: 1.0, y: 2.0 }).unwrap();

    let table = repo.get_raw_table(id).unwrap().clone();
    assert_eq!(table.is_chunk_committed(0), true);
    let chunks_before = (0..table.total_chunks()).filter(|&i| table.is_chunk_committed(i)).count();
    assert_eq!(chunks_before, 1);

    // Push entities far enough to land in a later chunk.
    let far_slot = table.chunk_capacity() * 3 + 1;
    let mut far_handle = first;
    for _ in 0..=far_slot {
        far_handle = repo.create_entity();
    }
    repo.add(far_handle, Position { x: 9.0, y: 9.0 }).unwrap();

    let chunks_after = (0..table.total_chunks()).filter(|&i| table.is_chunk_committed(i)).count();
    assert!(chunks_after > chunks_before, "writing a distant slot must commit new chunks lazily");

    // The original entity's data is untouched by the later chunk's commit.
    assert_eq!(repo.get::<Position>(first).unwrap(), Position { x: 1.0, y: 2.0 });
}

#[test]
fn generation_wraparound_on_a_single_slot_never_breaks_liveness_checks() {
    let mut repo = Repository::new(EcsConfig {
        max_entities: 1,
        ..EcsConfig::default()
    })
    .unwrap();

    let mut previous_generation = 0u16;
    for _ in 0..70_000u32 {
        let h = repo.create_entity();
        assert!(repo.is_alive(h));
        assert_ne!(h.generation, 0, "generation 0 must never be issued as live");
        assert_ne!(
            h.generation, previous_generation,
            "wraparound must still change generation on every reissue"
        );
        previous_generation = h.generation;

        repo.destroy_entity(h);
        assert!(!repo.is_alive(h));
    }
}

#[test]
fn multi_part_storage_clears_mask_on_empty_and_fully_resets_on_clear() {
    let mut repo = Repository::new(EcsConfig {
        max_entities: 16,
        ..EcsConfig::default()
    })
    .unwrap();
    repo.register_multi_part::<Tag>().unwrap();

    let h = repo.create_entity();
    repo.add_part(h, Tag("a")).unwrap();
    repo.add_part(h, Tag("b")).unwrap();
    assert!(repo.has::<Tag>(h).unwrap());
    assert_eq!(repo.parts::<Tag>(h).unwrap().len(), 2);

    // Remove every element: the entity no longer carries the component...
    repo.remove_part::<Tag>(h, 0);
    repo.remove_part::<Tag>(h, 0);
    assert!(repo.parts::<Tag>(h).unwrap().is_empty());
    assert!(!repo.has::<Tag>(h).unwrap());

    // ...but destroying the entity and recreating a fresh one, then
    // clearing the whole repository, must still leave storage fully reset.
    repo.add_part(h, Tag("c")).unwrap();
    repo.destroy_entity(h);

    repo.clear();
    assert_eq!(repo.active_count(), 0);
    let fresh = repo.create_entity();
    assert!(repo.parts::<Tag>(fresh).unwrap().is_empty());
}
