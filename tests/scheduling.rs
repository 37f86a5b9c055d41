use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use bytemuck::{Pod, Zeroable};

use archon_ecs::engine::component::{freeze_components, register_component, Bundle, Component};
use archon_ecs::engine::error::{ECSError, ScheduleError};
use archon_ecs::engine::query::QueryBuilder;
use archon_ecs::engine::schedule::{Scheduler, SystemState};
use archon_ecs::engine::systems::FnSystem;
use archon_ecs::engine::types::AccessSets;
use archon_ecs::engine::world::EntityWorld;
use archon_ecs::{component_id_of, ComponentID};

#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Counter {
    lo: u64,
    hi: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Marker(u32);

impl Component for Counter {}
impl Component for Marker {}

static INIT: Once = Once::new();

fn init_registry() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
        register_component::<Counter>().unwrap();
        register_component::<Marker>().unwrap();
        freeze_components().unwrap();
    });
}

fn read_access(ids: &[ComponentID]) -> AccessSets {
    let mut access = AccessSets::default();
    for &id in ids {
        access.read.set(id);
    }
    access
}

fn write_access(ids: &[ComponentID]) -> AccessSets {
    let mut access = AccessSets::default();
    for &id in ids {
        access.write.set(id);
    }
    access
}

#[test]
fn conflicting_systems_never_overlap_and_reads_are_not_torn() {
    init_registry();
    let counter_id = component_id_of::<Counter>().unwrap();

    let mut world = EntityWorld::new().unwrap();
    world
        .spawn(Bundle::new().with(Counter { lo: 0, hi: 0 }).unwrap())
        .unwrap();

    // Both conflicting systems bump this on entry and assert exclusivity.
    let in_flight = Arc::new(AtomicUsize::new(0));

    let writer_flag = Arc::clone(&in_flight);
    let writer = FnSystem::new(
        "counter_writer",
        write_access(&[counter_id]),
        move |world, _commands| {
            assert_eq!(writer_flag.fetch_add(1, Ordering::SeqCst), 0);
            for _ in 0..100 {
                QueryBuilder::new()
                    .write::<Counter>()?
                    .for_each_write1::<Counter, _>(world, |_entity, counter| {
                        counter.lo += 1;
                        counter.hi += 1;
                    })?;
            }
            writer_flag.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        },
    );

    let reader_flag = Arc::clone(&in_flight);
    let reader = FnSystem::new(
        "counter_reader",
        read_access(&[counter_id]),
        move |world, _commands| {
            assert_eq!(reader_flag.fetch_add(1, Ordering::SeqCst), 0);
            QueryBuilder::new()
                .read::<Counter>()?
                .for_each_read1::<Counter, _>(world, |_entity, counter| {
                    assert_eq!(counter.lo, counter.hi, "observed a torn counter");
                })?;
            reader_flag.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        },
    );

    let mut scheduler = Scheduler::new(4).unwrap();
    scheduler.add_system(Box::new(writer));
    scheduler.add_system(Box::new(reader));

    for _ in 0..20 {
        scheduler.run(&world).unwrap();
    }

    let entity = {
        let world_ref = world.world_ref();
        let mut found = None;
        world
            .query()
            .require::<Counter>()
            .unwrap()
            .for_each_entity(&world_ref, |e| found = Some(e))
            .unwrap();
        found.unwrap()
    };
    assert_eq!(
        world.get_component::<Counter>(entity).unwrap(),
        Counter { lo: 2000, hi: 2000 }
    );
}


/// Registers a system that appends its name to `log` when it runs.
fn add_logging_system(
    scheduler: &mut Scheduler,
    log: &Arc<Mutex<Vec<&'static str>>>,
    name: &'static str,
) -> archon_ecs::SystemID {
    let log = Arc::clone(log);
    scheduler.add_system(Box::new(FnSystem::new(
        name,
        AccessSets::default(),
        move |_, _| {
            log.lock().unwrap().push(name);
            Ok(())
        },
    )))
}

#[test]
fn explicit_dependency_cycle_is_rejected() {
    init_registry();
    let world = EntityWorld::new().unwrap();

    let mut scheduler = Scheduler::new(2).unwrap();
    let a = scheduler.add_system(Box::new(FnSystem::new(
        "cycle_a",
        AccessSets::default(),
        |_, _| Ok(()),
    )));
    let b = scheduler.add_system(Box::new(FnSystem::new(
        "cycle_b",
        AccessSets::default(),
        |_, _| Ok(()),
    )));

    scheduler.add_dependency(b, a).unwrap();
    scheduler.add_dependency(a, b).unwrap();

    assert!(matches!(
        scheduler.run(&world),
        Err(ECSError::Schedule(ScheduleError::DependencyCycle { .. }))
    ));
}

#[test]
fn self_and_unknown_dependencies_are_rejected() {
    init_registry();

    let mut scheduler = Scheduler::new(2).unwrap();
    let a = scheduler.add_system(Box::new(FnSystem::new(
        "lonely",
        AccessSets::default(),
        |_, _| Ok(()),
    )));

    assert!(matches!(
        scheduler.add_dependency(a, a),
        Err(ECSError::Schedule(ScheduleError::SelfDependency { .. }))
    ));
    assert!(matches!(
        scheduler.add_dependency(a, 99),
        Err(ECSError::Schedule(ScheduleError::UnknownSystem { system: 99 }))
    ));
}

#[test]
fn explicit_dependencies_order_execution() {
    init_registry();
    let world = EntityWorld::new().unwrap();
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let mut scheduler = Scheduler::new(4).unwrap();

    let first = add_logging_system(&mut scheduler, &log, "first");
    let second = add_logging_system(&mut scheduler, &log, "second");
    let third = add_logging_system(&mut scheduler, &log, "third");

    scheduler.add_dependency(second, first).unwrap();
    scheduler.add_dependency(third, second).unwrap();

    scheduler.run(&world).unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
}

#[test]
fn execute_and_wait_runs_transitive_predecessors_first() {
    init_registry();
    let world = EntityWorld::new().unwrap();
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let mut scheduler = Scheduler::new(2).unwrap();

    let root = add_logging_system(&mut scheduler, &log, "root");
    let middle = add_logging_system(&mut scheduler, &log, "middle");
    let target = add_logging_system(&mut scheduler, &log, "target");
    let _unrelated = add_logging_system(&mut scheduler, &log, "unrelated");

    scheduler.add_dependency(middle, root).unwrap();
    scheduler.add_dependency(target, middle).unwrap();

    scheduler.execute_and_wait(target, &world).unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["root", "middle", "target"]);
}

#[test]
fn disabled_systems_keep_their_edges_but_do_not_run() {
    init_registry();
    let world = EntityWorld::new().unwrap();
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let mut scheduler = Scheduler::new(2).unwrap();

    let gate = add_logging_system(&mut scheduler, &log, "gate");
    let dependent = add_logging_system(&mut scheduler, &log, "dependent");
    scheduler.add_dependency(dependent, gate).unwrap();

    scheduler.set_enabled(gate, false).unwrap();
    scheduler.run(&world).unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["dependent"]);
    assert_eq!(scheduler.system_state(gate).unwrap(), SystemState::Idle);
    assert_eq!(
        scheduler.system_state(dependent).unwrap(),
        SystemState::Completed
    );
}

#[test]
fn commands_apply_between_batches() {
    init_registry();
    let marker_id = component_id_of::<Marker>().unwrap();
    let world = EntityWorld::new().unwrap();

    let spawner = FnSystem::new(
        "marker_spawner",
        AccessSets::default(),
        |_world, commands| {
            commands.spawn(Bundle::new().with(Marker(1)).unwrap());
            Ok(())
        },
    );

    let observed = Arc::new(AtomicUsize::new(0));
    let observed_by_counter = Arc::clone(&observed);
    let counter = FnSystem::new(
        "marker_counter",
        read_access(&[marker_id]),
        move |world, _commands| {
            let mut count = 0;
            QueryBuilder::new()
                .require::<Marker>()?
                .for_each_entity(world, |_| count += 1)?;
            observed_by_counter.store(count, Ordering::SeqCst);
            Ok(())
        },
    );

    let mut scheduler = Scheduler::new(2).unwrap();
    let spawner_id = scheduler.add_system(Box::new(spawner));
    let counter_id = scheduler.add_system(Box::new(counter));
    scheduler.add_dependency(counter_id, spawner_id).unwrap();

    // Tick 1: the spawn command applies at the sync point after the spawner's
    // batch, so the counter already sees one marker.
    scheduler.run(&world).unwrap();
    assert_eq!(observed.load(Ordering::SeqCst), 1);

    scheduler.run(&world).unwrap();
    assert_eq!(observed.load(Ordering::SeqCst), 2);
}
