use std::sync::Once;

use bytemuck::{Pod, Zeroable};

use archon_ecs::engine::affective::AffectiveSystem;
use archon_ecs::engine::component::{
    component_id_of, freeze_components, register_component, AffectiveComponent, Bundle, Component,
};
use archon_ecs::engine::schedule::Scheduler;
use archon_ecs::engine::systems::SystemBuilder;
use archon_ecs::engine::types::{AccessSets, AffectiveHash};
use archon_ecs::engine::world::EntityWorld;
use archon_ecs::SystemCommands;

const LOW: u32 = 1;
const MEDIUM: u32 = 2;
const HIGH: u32 = 3;

/// Bucketing component: the bucket is the raw mood level.
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Mood(u32);

#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Payload(i32);

impl Component for Mood {
    fn affective_hash(&self) -> AffectiveHash {
        self.0 as AffectiveHash
    }
}

impl AffectiveComponent for Mood {}

impl Component for Payload {}

static INIT: Once = Once::new();

fn init_registry() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
        register_component::<Mood>().unwrap();
        register_component::<Payload>().unwrap();
        freeze_components().unwrap();
    });
}

/// Family whose per-bucket child writes the bucket level into the payload.
fn mood_family() -> AffectiveSystem<Mood> {
    let mut access = AccessSets::default();
    access.read.set(component_id_of::<Mood>().unwrap());
    access.write.set(component_id_of::<Payload>().unwrap());

    AffectiveSystem::<Mood>::new("mood_family", access, |bucket| {
        SystemBuilder::new("mood_bucket")
            .affective::<Mood>(bucket)
            .unwrap()
            .each_write1::<Payload, _>(move |_entity, payload, _commands| {
                payload.0 = bucket as i32;
            })
            .unwrap()
            .build()
    })
}

fn spawn_mood(world: &mut EntityWorld, mood: u32) -> archon_ecs::Entity {
    world
        .spawn(
            Bundle::new()
                .with(Mood(mood))
                .unwrap()
                .with(Payload(-1))
                .unwrap(),
        )
        .unwrap()
}

#[test]
fn buckets_route_entities_to_their_child_system() {
    init_registry();
    let mut world = EntityWorld::new().unwrap();

    let entity_a = spawn_mood(&mut world, LOW);
    let entity_b = spawn_mood(&mut world, LOW);
    let entity_c = spawn_mood(&mut world, MEDIUM);
    let entity_d = spawn_mood(&mut world, HIGH);

    let mut scheduler = Scheduler::new(2).unwrap();
    scheduler.add_system(Box::new(mood_family()));
    scheduler.run(&world).unwrap();

    // Each entity got the value of its own bucket's child, nobody else's.
    assert_eq!(world.get_component::<Payload>(entity_a).unwrap(), Payload(1));
    assert_eq!(world.get_component::<Payload>(entity_b).unwrap(), Payload(1));
    assert_eq!(world.get_component::<Payload>(entity_c).unwrap(), Payload(2));
    assert_eq!(world.get_component::<Payload>(entity_d).unwrap(), Payload(3));
}

#[test]
fn command_swap_moves_the_entity_to_the_new_bucket() {
    init_registry();
    let mut world = EntityWorld::new().unwrap();

    let _low_a = spawn_mood(&mut world, LOW);
    let _low_b = spawn_mood(&mut world, LOW);
    let medium = spawn_mood(&mut world, MEDIUM);
    let _high = spawn_mood(&mut world, HIGH);

    let mut scheduler = Scheduler::new(2).unwrap();
    scheduler.add_system(Box::new(mood_family()));
    scheduler.run(&world).unwrap();
    assert_eq!(world.get_component::<Payload>(medium).unwrap(), Payload(2));

    // Replace Medium with High via commands; the bucket migration applies at
    // the sync point, so the next pass runs the High child over it.
    let mut commands = SystemCommands::new();
    commands.get_entity(medium).insert(Mood(HIGH)).unwrap();
    world.execute_commands(&mut commands).unwrap();

    scheduler.run(&world).unwrap();
    assert_eq!(world.get_component::<Payload>(medium).unwrap(), Payload(3));
    assert_eq!(world.get_component::<Mood>(medium).unwrap(), Mood(HIGH));
}

#[test]
fn in_place_drift_is_rebucketed_one_pass_later() {
    init_registry();
    let mut world = EntityWorld::new().unwrap();

    let drifter = spawn_mood(&mut world, LOW);

    let mut scheduler = Scheduler::new(2).unwrap();
    scheduler.add_system(Box::new(mood_family()));
    scheduler.run(&world).unwrap();
    assert_eq!(world.get_component::<Payload>(drifter).unwrap(), Payload(1));

    // An in-place write does not re-bucket; the entity's value now disagrees
    // with its archetype's recorded bucket.
    world.set_component(drifter, Mood(MEDIUM)).unwrap();

    // This pass still runs the Low child over the drifter, then the rescan
    // re-inserts it; the migration applies at the pass's sync point.
    scheduler.run(&world).unwrap();
    assert_eq!(world.get_component::<Payload>(drifter).unwrap(), Payload(1));

    scheduler.run(&world).unwrap();
    assert_eq!(world.get_component::<Payload>(drifter).unwrap(), Payload(2));
}
