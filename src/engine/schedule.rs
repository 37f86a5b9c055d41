//! ECS system scheduling and execution.
//!
//! This module is responsible for:
//! * ordering systems by explicit dependency edges,
//! * serializing systems that conflict on component access,
//! * running compatible systems in parallel on a dedicated worker pool,
//! * enforcing structural synchronization points between batches.
//!
//! ## Scheduling model
//!
//! The schedule is a graph over registered systems with two edge kinds:
//!
//! * **explicit edges** added via [`Scheduler::add_dependency`], which order
//!   execution,
//! * **implicit conflict edges** derived from declared [`AccessSets`]
//!   (write/write, write/read, and read/write overlaps), which only forbid
//!   concurrency.
//!
//! Systems are placed into **batches**: a deterministic topological order
//! over explicit edges (registration order breaks ties) is walked greedily,
//! and each system lands in the earliest batch that is after all of its
//! explicit predecessors and contains no conflicting member. Batches run
//! sequentially; members of a batch run in parallel.
//!
//! Cycles among explicit edges are detected when the plan is built, before
//! any system executes.
//!
//! ## Structural synchronization
//!
//! Each system records structural changes into its own [`SystemCommands`]
//! buffer. After every batch completes, buffers are applied in system
//! registration order, so command application is deterministic for a fixed
//! schedule.
//!
//! ## Per-tick state
//!
//! Every system carries an observable per-tick [`SystemState`]
//! (`Idle → Scheduled → Running → Completed`), reset when the next pass
//! begins. Disabled systems keep their position in the graph but stay
//! `Idle`.

use std::sync::atomic::{AtomicU8, Ordering};

use log::{debug, trace};
use rayon::prelude::*;

use crate::engine::commands::SystemCommands;
use crate::engine::error::{ECSResult, ExecutionError, ScheduleError};
use crate::engine::systems::System;
use crate::engine::types::{AccessSets, SystemID};
use crate::engine::world::EntityWorld;

/// Observable per-tick execution state of one system.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SystemState {
    /// Not yet considered in the current pass.
    Idle,
    /// Placed into a batch, waiting for dispatch.
    Scheduled,
    /// Currently executing on a worker.
    Running,
    /// Finished executing in the current pass.
    Completed,
}

impl SystemState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => SystemState::Scheduled,
            2 => SystemState::Running,
            3 => SystemState::Completed,
            _ => SystemState::Idle,
        }
    }

    fn raw(self) -> u8 {
        match self {
            SystemState::Idle => 0,
            SystemState::Scheduled => 1,
            SystemState::Running => 2,
            SystemState::Completed => 3,
        }
    }
}

struct SystemEntry {
    system: Box<dyn System>,
    access: AccessSets,
    enabled: bool,
    initialized: bool,
    state: AtomicU8,
}

impl SystemEntry {
    fn set_state(&self, state: SystemState) {
        self.state.store(state.raw(), Ordering::Release);
    }
}

/// Conflict-aware parallel system scheduler.
///
/// Owns a dedicated fixed-size worker pool; scheduling work never shares
/// threads with unrelated parallel workloads in the process.
pub struct Scheduler {
    systems: Vec<SystemEntry>,
    /// `dependencies[later]` lists the systems that must run before `later`.
    dependencies: Vec<Vec<SystemID>>,
    pool: rayon::ThreadPool,
}

impl Scheduler {
    /// Creates a scheduler with a dedicated pool of `worker_threads`
    /// workers.
    ///
    /// ## Errors
    /// [`ExecutionError::PoolBuildFailed`] if the pool cannot be
    /// constructed.
    pub fn new(worker_threads: usize) -> ECSResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_threads.max(1))
            .build()
            .map_err(|e| ExecutionError::PoolBuildFailed { message: e.to_string() })?;
        Ok(Self { systems: Vec::new(), dependencies: Vec::new(), pool })
    }

    /// Registers a system and returns its identifier.
    ///
    /// Registration order is the deterministic tie-break for batch
    /// construction and the application order for command buffers.
    pub fn add_system(&mut self, system: Box<dyn System>) -> SystemID {
        let id = self.systems.len() as SystemID;
        debug!("registered system {} ({})", id, system.name());
        let access = system.access();
        self.systems.push(SystemEntry {
            system,
            access,
            enabled: true,
            initialized: false,
            state: AtomicU8::new(SystemState::Idle.raw()),
        });
        self.dependencies.push(Vec::new());
        id
    }

    /// Declares that `later` must run after `earlier`.
    ///
    /// ## Errors
    /// * [`ScheduleError::UnknownSystem`] for unregistered IDs.
    /// * [`ScheduleError::SelfDependency`] when `later == earlier`.
    ///
    /// Cycles are reported when the plan is next built, before execution.
    pub fn add_dependency(&mut self, later: SystemID, earlier: SystemID) -> ECSResult<()> {
        if later == earlier {
            return Err(ScheduleError::SelfDependency { system: later }.into());
        }
        for id in [later, earlier] {
            if (id as usize) >= self.systems.len() {
                return Err(ScheduleError::UnknownSystem { system: id }.into());
            }
        }
        if !self.dependencies[later as usize].contains(&earlier) {
            self.dependencies[later as usize].push(earlier);
        }
        Ok(())
    }

    /// Enables or disables a system.
    ///
    /// A disabled system keeps its position in the graph (its explicit
    /// edges still order other systems) but is skipped at dispatch.
    pub fn set_enabled(&mut self, id: SystemID, enabled: bool) -> ECSResult<()> {
        let entry = self
            .systems
            .get_mut(id as usize)
            .ok_or(ScheduleError::UnknownSystem { system: id })?;
        entry.enabled = enabled;
        Ok(())
    }

    /// Returns the observable per-tick state of a system.
    pub fn system_state(&self, id: SystemID) -> ECSResult<SystemState> {
        let entry = self
            .systems
            .get(id as usize)
            .ok_or(ScheduleError::UnknownSystem { system: id })?;
        Ok(SystemState::from_raw(entry.state.load(Ordering::Acquire)))
    }

    /// Builds the deterministic topological order over explicit edges.
    ///
    /// ## Errors
    /// [`ScheduleError::DependencyCycle`] naming the systems left in the
    /// cycle.
    fn topological_order(&self) -> ECSResult<Vec<SystemID>> {
        let n = self.systems.len();
        let mut indegree = vec![0usize; n];
        let mut dependents: Vec<Vec<SystemID>> = vec![Vec::new(); n];
        for (later, earliers) in self.dependencies.iter().enumerate() {
            indegree[later] = earliers.len();
            for &earlier in earliers {
                dependents[earlier as usize].push(later as SystemID);
            }
        }

        // Registration order breaks ties: the ready set is scanned from the
        // lowest ID.
        let mut ready: Vec<SystemID> = (0..n as SystemID).filter(|&i| indegree[i as usize] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(&next) = ready.iter().min() {
            ready.retain(|&id| id != next);
            order.push(next);
            for &dependent in &dependents[next as usize] {
                indegree[dependent as usize] -= 1;
                if indegree[dependent as usize] == 0 {
                    ready.push(dependent);
                }
            }
        }

        if order.len() < n {
            let systems = (0..n as SystemID)
                .filter(|&i| indegree[i as usize] > 0)
                .collect();
            return Err(ScheduleError::DependencyCycle { systems }.into());
        }
        Ok(order)
    }

    /// Builds the batch plan: explicit order plus conflict serialization.
    fn build_batches(&self) -> ECSResult<Vec<Vec<SystemID>>> {
        let order = self.topological_order()?;
        let mut batch_of = vec![0usize; self.systems.len()];
        let mut batches: Vec<Vec<SystemID>> = Vec::new();

        for &id in &order {
            // A system starts no earlier than the batch after its latest
            // explicit predecessor.
            let mut earliest = 0usize;
            for &earlier in &self.dependencies[id as usize] {
                earliest = earliest.max(batch_of[earlier as usize] + 1);
            }

            let access = &self.systems[id as usize].access;
            let mut placed = None;
            for batch_index in earliest..batches.len() {
                let conflict = batches[batch_index]
                    .iter()
                    .any(|&other| access.conflicts_with(&self.systems[other as usize].access));
                if !conflict {
                    placed = Some(batch_index);
                    break;
                }
            }

            let batch_index = match placed {
                Some(i) => i,
                None => {
                    batches.push(Vec::new());
                    batches.len() - 1
                }
            };
            batches[batch_index].push(id);
            batch_of[id as usize] = batch_index;
        }

        trace!("schedule plan: {} systems in {} batches", order.len(), batches.len());
        Ok(batches)
    }

    fn initialize_pending(&mut self, world: &EntityWorld) -> ECSResult<()> {
        for entry in &mut self.systems {
            if !entry.initialized {
                entry.system.on_initialize(&world.world_ref())?;
                entry.initialized = true;
            }
        }
        Ok(())
    }

    /// Runs one system on the current thread, producing its command buffer.
    fn run_system(entry: &SystemEntry, world: &EntityWorld) -> ECSResult<SystemCommands> {
        entry.set_state(SystemState::Running);
        #[cfg(debug_assertions)]
        crate::engine::query::install_declared_access(Some(entry.access));

        let mut commands = SystemCommands::new();
        let world_ref = world.world_ref();
        let result = entry
            .system
            .on_update(&world_ref, &mut commands)
            .and_then(|_| entry.system.run(&world_ref, &mut commands))
            .and_then(|_| entry.system.on_late_update(&world_ref, &mut commands));

        #[cfg(debug_assertions)]
        crate::engine::query::install_declared_access(None);
        entry.set_state(SystemState::Completed);

        result
            .map(|_| commands)
            .map_err(|e| {
                ExecutionError::SystemFailed {
                    system: entry.system.name().to_string(),
                    message: e.to_string(),
                }
                .into()
            })
    }

    /// Executes one full pass over the schedule.
    ///
    /// ## Behavior
    /// 1. Validates the explicit dependency graph (cycles abort before any
    ///    system runs).
    /// 2. Resets per-tick states and marks scheduled systems.
    /// 3. Runs batches sequentially, members in parallel on the dedicated
    ///    pool.
    /// 4. Applies each batch's command buffers at the sync point, in system
    ///    registration order.
    pub fn run(&mut self, world: &EntityWorld) -> ECSResult<()> {
        let batches = self.build_batches()?;
        self.initialize_pending(world)?;

        for entry in &self.systems {
            if entry.enabled {
                entry.set_state(SystemState::Scheduled);
            } else {
                entry.set_state(SystemState::Idle);
            }
        }

        for batch in &batches {
            let systems = &self.systems;
            let mut results: Vec<(SystemID, ECSResult<SystemCommands>)> = self.pool.install(|| {
                batch
                    .par_iter()
                    .filter(|&&id| systems[id as usize].enabled)
                    .map(|&id| (id, Self::run_system(&systems[id as usize], world)))
                    .collect()
            });

            // Deterministic sync point: apply buffers in registration order.
            results.sort_by_key(|(id, _)| *id);
            for (id, result) in results {
                let mut commands = result?;
                if !commands.is_empty() {
                    trace!("applying {} commands from system {}", commands.len(), id);
                }
                world.execute_commands(&mut commands)?;
            }
        }
        Ok(())
    }

    /// Collects the transitive explicit predecessors of `id`, in
    /// deterministic topological order.
    fn transitive_dependencies(&self, id: SystemID) -> ECSResult<Vec<SystemID>> {
        let order = self.topological_order()?;
        let mut needed = vec![false; self.systems.len()];
        needed[id as usize] = true;
        // Walk the order backwards, marking predecessors of needed systems.
        for &candidate in order.iter().rev() {
            if !needed[candidate as usize] {
                continue;
            }
            for &earlier in &self.dependencies[candidate as usize] {
                needed[earlier as usize] = true;
            }
        }
        Ok(order
            .into_iter()
            .filter(|&sid| sid != id && needed[sid as usize])
            .collect())
    }

    /// Runs `id` synchronously, after running its transitive explicit
    /// predecessors in dependency order.
    ///
    /// ## Behavior
    /// Command buffers are applied after each system, so predecessors'
    /// structural changes are visible downstream. Disabled predecessors are
    /// skipped; the requested system runs even when disabled.
    ///
    /// ## Errors
    /// Schedule errors (unknown system, dependency cycles) surface before
    /// any system executes.
    pub fn execute_and_wait(&mut self, id: SystemID, world: &EntityWorld) -> ECSResult<()> {
        if (id as usize) >= self.systems.len() {
            return Err(ScheduleError::UnknownSystem { system: id }.into());
        }
        let predecessors = self.transitive_dependencies(id)?;
        self.initialize_pending(world)?;

        for &sid in &predecessors {
            let entry = &self.systems[sid as usize];
            if !entry.enabled {
                continue;
            }
            entry.set_state(SystemState::Scheduled);
            let mut commands = Self::run_system(entry, world)?;
            world.execute_commands(&mut commands)?;
        }

        let entry = &self.systems[id as usize];
        entry.set_state(SystemState::Scheduled);
        let mut commands = Self::run_system(entry, world)?;
        world.execute_commands(&mut commands)?;
        Ok(())
    }
}
