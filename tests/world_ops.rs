use std::sync::Once;

use bytemuck::{Pod, Zeroable};

use archon_ecs::engine::component::{freeze_components, register_component, Bundle, Component};
use archon_ecs::engine::entity::Entity;
use archon_ecs::engine::error::{ECSError, QueryError, SpawnError};
use archon_ecs::engine::types::ArchetypeID;
use archon_ecs::engine::world::EntityWorld;
use archon_ecs::SystemCommands;

#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Health(u64);

#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Armor(u32);

#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Poison(u16);

#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Position {
    x: f32,
    y: f32,
}

impl Component for Health {}
impl Component for Armor {}
impl Component for Poison {}
impl Component for Position {}

static INIT: Once = Once::new();

fn init_registry() {
    INIT.call_once(|| {
        register_component::<Health>().unwrap();
        register_component::<Armor>().unwrap();
        register_component::<Poison>().unwrap();
        register_component::<Position>().unwrap();
        freeze_components().unwrap();
    });
}

fn archetype_of(world: &EntityWorld, entity: Entity) -> ArchetypeID {
    world
        .world_ref()
        .data()
        .entities()
        .get_location(entity)
        .expect("entity should be alive")
        .archetype
}

#[test]
fn spawn_round_trips_component_values() {
    init_registry();
    let mut world = EntityWorld::new().unwrap();

    let entity = world
        .spawn(
            Bundle::new()
                .with(Health(100))
                .unwrap()
                .with(Armor(25))
                .unwrap(),
        )
        .unwrap();

    assert!(world.is_alive(entity));
    assert_eq!(world.get_component::<Health>(entity).unwrap(), Health(100));
    assert_eq!(world.get_component::<Armor>(entity).unwrap(), Armor(25));
    assert_eq!(world.live_count(), 1);
}

#[test]
fn despawn_invalidates_the_handle() {
    init_registry();
    let mut world = EntityWorld::new().unwrap();

    let entity = world.spawn(Bundle::new().with(Health(1)).unwrap()).unwrap();
    world.despawn(entity).unwrap();

    assert!(!world.is_alive(entity));
    assert!(matches!(
        world.get_component::<Health>(entity),
        Err(ECSError::Spawn(SpawnError::StaleEntity))
    ));

    // The index is recycled with a bumped version; the old handle stays dead.
    let replacement = world.spawn(Bundle::new().with(Health(2)).unwrap()).unwrap();
    assert!(world.is_alive(replacement));
    assert!(!world.is_alive(entity));
    assert_ne!(entity, replacement);
}

#[test]
fn spawn_order_resolves_to_the_same_archetype() {
    init_registry();
    let mut world = EntityWorld::new().unwrap();

    let forward = world
        .spawn(
            Bundle::new()
                .with(Health(1))
                .unwrap()
                .with(Armor(1))
                .unwrap(),
        )
        .unwrap();
    let backward = world
        .spawn(
            Bundle::new()
                .with(Armor(2))
                .unwrap()
                .with(Health(2))
                .unwrap(),
        )
        .unwrap();

    assert_eq!(archetype_of(&world, forward), archetype_of(&world, backward));
}

#[test]
fn duplicate_bundle_insert_keeps_last_value() {
    init_registry();
    let mut world = EntityWorld::new().unwrap();

    let entity = world
        .spawn(
            Bundle::new()
                .with(Health(1))
                .unwrap()
                .with(Health(7))
                .unwrap(),
        )
        .unwrap();

    assert_eq!(world.get_component::<Health>(entity).unwrap(), Health(7));
}

#[test]
fn query_honors_required_and_excluded_components() {
    init_registry();
    let mut world = EntityWorld::new().unwrap();

    let _h = world.spawn(Bundle::new().with(Health(1)).unwrap()).unwrap();
    let ha = world
        .spawn(
            Bundle::new()
                .with(Health(2))
                .unwrap()
                .with(Armor(2))
                .unwrap(),
        )
        .unwrap();
    let _hap = world
        .spawn(
            Bundle::new()
                .with(Health(3))
                .unwrap()
                .with(Armor(3))
                .unwrap()
                .with(Poison(3))
                .unwrap(),
        )
        .unwrap();

    let world_ref = world.world_ref();
    let mut matched = Vec::new();
    world
        .query()
        .require::<Health>()
        .unwrap()
        .require::<Armor>()
        .unwrap()
        .without::<Poison>()
        .unwrap()
        .for_each_entity(&world_ref, |entity| matched.push(entity))
        .unwrap();

    assert_eq!(matched, vec![ha]);
}

#[test]
fn command_batch_keeps_last_insert() {
    init_registry();
    let mut world = EntityWorld::new().unwrap();
    let entity = world.spawn(Bundle::new().with(Health(1)).unwrap()).unwrap();

    let mut commands = SystemCommands::new();
    commands
        .get_entity(entity)
        .insert(Armor(10))
        .unwrap()
        .insert(Armor(99))
        .unwrap();
    world.execute_commands(&mut commands).unwrap();

    assert_eq!(world.get_component::<Armor>(entity).unwrap(), Armor(99));
}

#[test]
fn insert_then_remove_in_one_batch_is_a_no_op() {
    init_registry();
    let mut world = EntityWorld::new().unwrap();
    let entity = world.spawn(Bundle::new().with(Health(1)).unwrap()).unwrap();
    let before = archetype_of(&world, entity);

    let mut commands = SystemCommands::new();
    commands
        .get_entity(entity)
        .insert(Armor(10))
        .unwrap()
        .remove::<Armor>()
        .unwrap();
    world.execute_commands(&mut commands).unwrap();

    assert_eq!(archetype_of(&world, entity), before);
    assert!(world.get_component::<Armor>(entity).is_err());
}

#[test]
fn migration_preserves_untouched_component_bytes() {
    init_registry();
    let mut world = EntityWorld::new().unwrap();

    let entity = world
        .spawn(
            Bundle::new()
                .with(Health(1234))
                .unwrap()
                .with(Armor(9))
                .unwrap(),
        )
        .unwrap();

    let mut commands = SystemCommands::new();
    commands
        .get_entity(entity)
        .insert(Poison(55))
        .unwrap()
        .remove::<Armor>()
        .unwrap();
    world.execute_commands(&mut commands).unwrap();

    // {Health, Armor} + Poison - Armor -> {Health, Poison}
    assert_eq!(world.get_component::<Health>(entity).unwrap(), Health(1234));
    assert_eq!(world.get_component::<Poison>(entity).unwrap(), Poison(55));
    assert!(matches!(
        world.get_component::<Armor>(entity),
        Err(ECSError::Spawn(SpawnError::MissingComponent { .. }))
    ));

    // The entity is gone from {Health, Armor} queries.
    let world_ref = world.world_ref();
    let mut matched = Vec::new();
    world
        .query()
        .require::<Health>()
        .unwrap()
        .require::<Armor>()
        .unwrap()
        .for_each_entity(&world_ref, |e| matched.push(e))
        .unwrap();
    assert!(matched.is_empty());
}

#[test]
fn removing_the_last_component_despawns() {
    init_registry();
    let mut world = EntityWorld::new().unwrap();
    let entity = world.spawn(Bundle::new().with(Health(1)).unwrap()).unwrap();

    let mut commands = SystemCommands::new();
    commands.get_entity(entity).remove::<Health>().unwrap();
    world.execute_commands(&mut commands).unwrap();

    assert!(!world.is_alive(entity));
}

#[test]
fn despawn_discards_the_rest_of_the_batch() {
    init_registry();
    let mut world = EntityWorld::new().unwrap();
    let entity = world.spawn(Bundle::new().with(Health(1)).unwrap()).unwrap();

    let mut commands = SystemCommands::new();
    commands.despawn(entity);
    commands.get_entity(entity).insert(Armor(3)).unwrap();
    world.execute_commands(&mut commands).unwrap();

    assert!(!world.is_alive(entity));
}

#[test]
fn deferred_spawn_applies_after_entity_batches() {
    init_registry();
    let mut world = EntityWorld::new().unwrap();

    let mut commands = SystemCommands::new();
    commands.spawn(
        Bundle::new()
            .with(Position { x: 1.0, y: 2.0 })
            .unwrap(),
    );
    world.execute_commands(&mut commands).unwrap();

    assert_eq!(world.live_count(), 1);

    let world_ref = world.world_ref();
    let mut seen = Vec::new();
    world
        .query()
        .read::<Position>()
        .unwrap()
        .for_each_read1::<Position, _>(&world_ref, |_entity, position| {
            seen.push(*position);
        })
        .unwrap();
    assert_eq!(seen, vec![Position { x: 1.0, y: 2.0 }]);
}

#[test]
fn in_place_write_is_visible_to_reads() {
    init_registry();
    let mut world = EntityWorld::new().unwrap();
    let entity = world.spawn(Bundle::new().with(Health(5)).unwrap()).unwrap();

    world.set_component(entity, Health(6)).unwrap();
    assert_eq!(world.get_component::<Health>(entity).unwrap(), Health(6));
}

#[test]
fn re_registration_returns_the_existing_id() {
    init_registry();

    // Registration is idempotent, even once the registry is frozen.
    let first = register_component::<Health>().unwrap();
    let second = register_component::<Health>().unwrap();
    assert_eq!(first, second);
}

#[test]
fn unconstrained_query_is_rejected() {
    init_registry();
    let world = EntityWorld::new().unwrap();
    let world_ref = world.world_ref();

    assert!(matches!(
        world.query().for_each_entity(&world_ref, |_| {}),
        Err(ECSError::Query(QueryError::EmptyQuery))
    ));
}
