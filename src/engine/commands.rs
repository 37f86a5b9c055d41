//! # Commands
//!
//! This module defines deferred commands used to mutate the ECS world.
//!
//! ## Purpose
//! Commands provide an explicit, ordered representation of structural world
//! mutations such as entity creation, destruction, and component insertion or
//! removal.
//!
//! Rather than mutating archetypes directly during system execution, systems
//! emit `Command` values that are applied later at a synchronization point.
//! This enables safe parallel system execution and deterministic world
//! updates.
//!
//! ## Design
//! - Commands are plain data describing *what* change should occur, not
//!   *how*: component values travel as raw bytes tagged with their component
//!   ID and affective hash.
//! - The stream is target-oriented: a [`Command::GetEntity`] marker selects
//!   the current entity, and following `Insert`/`Remove`/`Despawn` commands
//!   apply to it. The executor groups each target's commands into one batch.
//! - Execution is handled by the command executor at sync points between
//!   scheduler batches.
//!
//! ## Invariants
//! - Within one entity's batch, commands apply in recorded order; duplicate
//!   inserts of the same component keep the last value.
//! - Target entities must exist at execution time unless being spawned.
//! - Component identifiers and payload sizes must match the registry.

use crate::engine::component::{component_id_of, Bundle, Component};
use crate::engine::entity::Entity;
use crate::engine::error::ECSResult;
use crate::engine::types::{AffectiveHash, ComponentID};

/// Represents a deferred ECS mutation command.
///
/// ## Invariants
/// - `Insert`, `Remove`, and `Despawn` must follow a `GetEntity` marker that
///   names their target.
/// - Component payload bytes must match the registered component size.
pub enum Command {
    /// Selects the target entity for the commands that follow.
    GetEntity {
        /// Entity the following commands apply to.
        entity: Entity,
    },

    /// Inserts or overwrites a component on the current target.
    ///
    /// ## Behavior
    /// - If the target's archetype lacks the component, the entity migrates
    ///   to the archetype including it.
    /// - If present, the bytes are written in place (the affective hash may
    ///   still force a bucket migration).
    Insert {
        /// Identifier of the component type to insert.
        component_id: ComponentID,

        /// Affective hash of the inserted value.
        affective: AffectiveHash,

        /// Raw component value bytes.
        bytes: Vec<u8>,
    },

    /// Removes a component from the current target.
    ///
    /// ## Behavior
    /// - Moves the entity to the archetype excluding the component.
    /// - The removed component value is zeroed with the old record.
    Remove {
        /// Identifier of the component type to remove.
        component_id: ComponentID,
    },

    /// Despawns the current target.
    ///
    /// ## Behavior
    /// - Zeroes and releases the entity's record.
    /// - Invalidates the entity handle.
    /// - Skips any remaining commands in the target's batch.
    Despawn,

    /// Spawns a new entity.
    Spawn {
        /// Data bundle for the new entity.
        bundle: Bundle,
    },
}

/// Per-system buffer of deferred commands.
///
/// Each system receives its own buffer during execution; buffers are drained
/// by the executor at the next sync point in system order.
#[derive(Default)]
pub struct SystemCommands {
    commands: Vec<Command>,
}

impl SystemCommands {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects `entity` as the target for chained structural commands.
    pub fn get_entity(&mut self, entity: Entity) -> EntityCommands<'_> {
        self.commands.push(Command::GetEntity { entity });
        EntityCommands { commands: self }
    }

    /// Records a despawn of `entity`.
    pub fn despawn(&mut self, entity: Entity) {
        self.commands.push(Command::GetEntity { entity });
        self.commands.push(Command::Despawn);
    }

    /// Records a deferred spawn.
    pub fn spawn(&mut self, bundle: Bundle) {
        self.commands.push(Command::Spawn { bundle });
    }

    /// Returns `true` if no commands are recorded.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Returns the number of recorded commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Takes the recorded command stream, leaving the buffer empty.
    pub fn take(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }
}

/// Chained recording surface for commands targeting one entity.
pub struct EntityCommands<'a> {
    commands: &'a mut SystemCommands,
}

impl EntityCommands<'_> {
    /// Records an insert of `value` on the target.
    ///
    /// ## Errors
    /// Returns a registry error if `T` was never registered.
    pub fn insert<T: Component>(self, value: T) -> ECSResult<Self> {
        let component_id = component_id_of::<T>()?;
        let affective = value.affective_hash();
        self.commands.commands.push(Command::Insert {
            component_id,
            affective,
            bytes: bytemuck::bytes_of(&value).to_vec(),
        });
        Ok(self)
    }

    /// Records a removal of component `T` from the target.
    ///
    /// ## Errors
    /// Returns a registry error if `T` was never registered.
    pub fn remove<T: Component>(self) -> ECSResult<Self> {
        let component_id = component_id_of::<T>()?;
        self.commands.commands.push(Command::Remove { component_id });
        Ok(self)
    }

    /// Records a despawn of the target.
    pub fn despawn(self) {
        self.commands.commands.push(Command::Despawn);
    }
}
