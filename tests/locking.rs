use std::sync::Once;

use bytemuck::{Pod, Zeroable};

use archon_ecs::engine::component::{freeze_components, register_component, Bundle, Component};
use archon_ecs::engine::entity::Entity;
use archon_ecs::engine::error::{ECSError, SpawnError};
use archon_ecs::engine::locker::{EntityLocker, EntityLockGuard};
use archon_ecs::engine::world::EntityWorld;
use archon_ecs::SystemCommands;

#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Coins(u64);

#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Charm(u32);

impl Component for Coins {}
impl Component for Charm {}

static INIT: Once = Once::new();

fn init_registry() {
    INIT.call_once(|| {
        register_component::<Coins>().unwrap();
        register_component::<Charm>().unwrap();
        freeze_components().unwrap();
    });
}

#[test]
fn readers_share_and_writers_exclude() {
    let locker = EntityLocker::new();
    let entity = Entity(7);

    assert!(locker.try_lock_entity(entity, false));
    assert!(locker.try_lock_entity(entity, false));

    // A writer cannot enter while readers hold the entity.
    assert!(!locker.try_lock_entity(entity, true));

    locker.unlock_entity(entity, false);
    locker.unlock_entity(entity, false);

    assert!(locker.try_lock_entity(entity, true));
    assert!(!locker.try_lock_entity(entity, false));
    assert!(!locker.try_lock_entity(entity, true));
    locker.unlock_entity(entity, true);

    assert!(locker.try_lock_entity(entity, false));
    locker.unlock_entity(entity, false);
}

#[test]
fn upgrade_succeeds_only_for_the_sole_reader() {
    let locker = EntityLocker::new();
    let entity = Entity(3);

    assert!(locker.try_lock_entity(entity, false));
    assert!(locker.try_lock_entity(entity, false));
    assert!(!locker.try_upgrade(entity), "two readers must not upgrade");

    locker.unlock_entity(entity, false);
    assert!(locker.try_upgrade(entity), "sole reader upgrades in place");

    // The lock is now a write lock and must be released as one.
    assert!(!locker.try_lock_entity(entity, false));
    locker.unlock_entity(entity, true);
    assert!(locker.try_lock_entity(entity, false));
    locker.unlock_entity(entity, false);
}

#[test]
fn lock_sets_are_all_or_nothing() {
    let locker = EntityLocker::new();
    let a = Entity(1);
    let b = Entity(2);

    // Hold `b` for write so the set acquisition must fail.
    assert!(locker.try_lock_entity(b, true));

    let requests = [(a, true), (b, false)];
    assert!(!locker.try_lock_entities(&requests));

    // The failed attempt rolled `a` back; it is free for a writer.
    assert!(locker.try_lock_entity(a, true));
    locker.unlock_entity(a, true);
    locker.unlock_entity(b, true);

    assert!(locker.try_lock_entities(&requests));
    locker.unlock_entities(&requests);
}

#[test]
fn guard_releases_on_drop() {
    let locker = EntityLocker::new();
    let entity = Entity(11);

    {
        let _guard = EntityLockGuard::try_new(&locker, &[(entity, true)])
            .expect("uncontended lock set should be acquired");
        assert!(!locker.try_lock_entity(entity, false));
    }

    assert!(locker.try_lock_entity(entity, true));
    locker.unlock_entity(entity, true);
}

#[test]
fn contended_batch_is_dropped_then_applies_after_release() {
    init_registry();
    let mut world = EntityWorld::new().unwrap();
    let entity = world.spawn(Bundle::new().with(Coins(7)).unwrap()).unwrap();

    // An outside reader holds the entity across the sync point, so write
    // escalation cannot succeed.
    assert!(world.world_ref().data().locker().try_lock_entity(entity, false));

    let mut commands = SystemCommands::new();
    commands.get_entity(entity).insert(Charm(9)).unwrap();
    world.execute_commands(&mut commands).unwrap();

    // The batch was skipped for this pass: no new component, old value
    // untouched, and no error surfaced.
    assert!(matches!(
        world.get_component::<Charm>(entity),
        Err(ECSError::Spawn(SpawnError::MissingComponent { .. }))
    ));
    assert_eq!(world.get_component::<Coins>(entity).unwrap(), Coins(7));

    world.world_ref().data().locker().unlock_entity(entity, false);

    // Re-emitting the same batch after the reader drains applies normally.
    let mut commands = SystemCommands::new();
    commands.get_entity(entity).insert(Charm(9)).unwrap();
    world.execute_commands(&mut commands).unwrap();
    assert_eq!(world.get_component::<Charm>(entity).unwrap(), Charm(9));
    assert_eq!(world.get_component::<Coins>(entity).unwrap(), Coins(7));
}
