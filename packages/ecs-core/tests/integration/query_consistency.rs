use ecs_core::chunk_table::ByteComponent;
use ecs_core::{EcsConfig, EcsError, EntityHandle, Repository};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}
unsafe impl ByteComponent for Position {}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Velocity {
    dx: f32,
    dy: f32,
}
unsafe impl ByteComponent for Velocity {}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Unregistered(u8);
unsafe impl ByteComponent for Unregistered {}

fn build_mixed_population() -> (Repository, HashSet<EntityHandle>) {
    let mut repo = Repository::new(EcsConfig {
        max_entities: 500,
        ..EcsConfig::default()
    })
    .unwrap();
    repo.register_byte_packed::<Position>().unwrap();
    repo.register_byte_packed::<Velocity>().unwrap();

    let mut expected = HashSet::new();
    for i in 0..300 {
        let h = repo.create_entity();
        repo.add(h, Position { x: i as f32, y: 0.0 }).unwrap();
        if i % 3 == 0 {
            repo.add(h, Velocity { dx: 1.0, dy: 0.0 }).unwrap();
            expected.insert(h);
        }
    }
    (repo, expected)
}

#[test]
fn query_with_both_components_matches_a_naive_full_scan() {
    let (repo, expected) = build_mixed_population();

    let matched: HashSet<EntityHandle> = repo
        .query()
        .with::<Position>()
        .unwrap()
        .with::<Velocity>()
        .unwrap()
        .collect_handles()
        .into_iter()
        .collect();

    assert_eq!(matched, expected);
}

#[test]
fn query_excluding_a_component_matches_a_naive_full_scan() {
    let (repo, with_velocity) = build_mixed_population();

    let without_velocity: HashSet<EntityHandle> = repo
        .query()
        .with::<Position>()
        .unwrap()
        .without::<Velocity>()
        .unwrap()
        .collect_handles()
        .into_iter()
        .collect();

    let all_positions: HashSet<EntityHandle> =
        repo.query().with::<Position>().unwrap().collect_handles().into_iter().collect();

    let expected: HashSet<EntityHandle> = all_positions.difference(&with_velocity).copied().collect();
    assert_eq!(without_velocity, expected);
}

#[test]
fn querying_an_unregistered_component_fails_without_panicking() {
    let repo = build_mixed_population().0;

    let result = repo.query().with::<Unregistered>();
    assert!(matches!(result, Err(EcsError::NotRegistered)));
}

#[test]
fn delta_query_only_returns_entities_touched_since_the_baseline() {
    let mut repo = Repository::new(EcsConfig {
        max_entities: 64,
        ..EcsConfig::default()
    })
    .unwrap();
    repo.register_byte_packed::<Position>().unwrap();

    let untouched = repo.create_entity();
    repo.add(untouched, Position::default()).unwrap();

    let baseline = repo.tick();

    let touched = repo.create_entity();
    repo.add(touched, Position { x: 9.0, y: 9.0 }).unwrap();

    let mut seen = HashSet::new();
    repo.query()
        .with::<Position>()
        .unwrap()
        .for_each_delta(baseline, |h| {
            seen.insert(h);
        });

    assert!(seen.contains(&touched));
    assert!(!seen.contains(&untouched));
}
