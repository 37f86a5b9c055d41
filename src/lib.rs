//! # Archon ECS
//!
//! Archetype-based Entity-Component-System scheduling core.
//!
//! ## Design Goals
//! - Record-oriented chunk storage for cache efficiency
//! - Canonical archetype identity, including affective bucketing
//! - Conflict-aware parallel scheduling on a dedicated worker pool
//! - Deferred structural mutation under a per-entity lock protocol
//! - Safe, explicit data access

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]
#![deny(dead_code)]

pub mod engine;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

// Core ECS types

pub use engine::world::{
    EntityWorld,
    WorldRef,
};

pub use engine::entity::{
    Entity,
    EntityLocation,
};

pub use engine::component::{
    Component,
    AffectiveComponent,
    Bundle,
    register_component,
    freeze_components,
    component_id_of,
};

pub use engine::query::QueryBuilder;

pub use engine::systems::{System, FnSystem, SystemBuilder};
pub use engine::affective::AffectiveSystem;
pub use engine::schedule::{
    Scheduler,
    SystemState,
};

pub use engine::commands::{Command, SystemCommands};
pub use engine::locker::EntityLocker;

pub use engine::error::{
    ECSResult,
    ECSError,
    RegistryError,
    SpawnError,
    CommandError,
    QueryError,
    ScheduleError,
    ExecutionError,
};

pub use engine::types::{
    EntityID,
    ComponentID,
    ArchetypeID,
    SystemID,
    AffectiveHash,
    AccessSets,
    ArchetypeKey,
    Signature,
    AFFECTIVE_NONE,
};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude (Optional but recommended)
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used ECS types.
///
/// Import with:
/// ```rust
/// use archon_ecs::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        EntityWorld,
        WorldRef,
        Entity,
        Bundle,
        QueryBuilder,
        System,
        FnSystem,
        SystemBuilder,
        AffectiveSystem,
        Scheduler,
        SystemCommands,
        Component,
        AffectiveComponent,
        register_component,
        freeze_components,
        component_id_of,
    };
}
