//! Error types for the ECS core.
//!
//! This module declares focused, composable error types used across component
//! registration, entity spawning, querying, command execution, and system
//! scheduling. Each error carries enough context to make failures actionable
//! while remaining small and cheap to pass around or convert into the
//! top-level [`ECSError`] aggregate.
//!
//! ## Goals
//! * **Specificity:** Each error type models a single failure mode (e.g.
//!   registry capacity, stale entity handles, dependency cycles).
//! * **Ergonomics:** All errors implement [`std::error::Error`] and
//!   [`fmt::Display`], and provide `From<T>` conversions into [`ECSError`].
//! * **Actionability:** Structured fields (e.g. offending component IDs,
//!   chunk/row positions, system names) make logs useful without reproducing
//!   the issue.
//!
//! ## Typical flow
//! Low-level storage and registry operations return small, dedicated error
//! types. Higher-level orchestration code uses `?` to bubble failures into
//! [`ECSError`], which callers can match on for control flow or log with
//! user-readable messages.
//!
//! ## Display vs. Debug
//! * [`fmt::Display`] is optimized for operator logs (short, imperative
//!   phrasing).
//! * [`fmt::Debug`] (derived) retains full structure for diagnostics.

use std::fmt;

use crate::engine::types::{ChunkID, ComponentID, RowID, SystemID};

/// Convenience alias for results carrying [`ECSError`].
pub type ECSResult<T> = Result<T, ECSError>;

/// Returned when an `Entity` handle is no longer valid, typically because it
/// was despawned or its version no longer matches live storage.
///
/// Use this to prevent use-after-free style logic errors at the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleEntityError;

impl fmt::Display for StaleEntityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("stale or dead entity reference")
    }
}

impl std::error::Error for StaleEntityError {}

/// Returned when a `(ChunkID, RowID)` pair refers to a position outside valid
/// record storage bounds.
///
/// ## Context
/// Used by chunk and archetype storage to report invalid addressing, typically
/// caused by stale metadata or incorrect index calculations.
///
/// ## Invariants
/// - `chunk < chunks`
/// - `row < CHUNK_RECORDS`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOutOfBoundsError {
    /// Chunk index that was addressed.
    pub chunk: ChunkID,

    /// Row index that was addressed.
    pub row: RowID,

    /// Total number of chunks in the archetype.
    pub chunks: usize,

    /// Record capacity per chunk.
    pub capacity: usize,
}

impl fmt::Display for PositionOutOfBoundsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "position out of bounds: chunk {} (of {}), row {} (capacity per chunk {})",
            self.chunk, self.chunks, self.row, self.capacity
        )
    }
}

impl std::error::Error for PositionOutOfBoundsError {}

/// Errors raised by the global component registry.
///
/// ## Context
/// Components must be registered before the first world is constructed; the
/// registry is then frozen and becomes immutable. Registration enforces the
/// record layout contract: components are plain-old-data with alignment at
/// most the record alignment guarantee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Registration was attempted after the registry was frozen.
    Frozen,

    /// The registry is at component capacity.
    Capacity {
        /// Maximum number of registrable component types.
        capacity: usize,
    },

    /// The component type's alignment exceeds the record alignment guarantee.
    UnsupportedAlignment {
        /// Human-readable component type name.
        name: &'static str,

        /// The component type's alignment.
        align: usize,

        /// Maximum supported alignment.
        max_align: usize,
    },

    /// A component type was used before being registered.
    Unregistered {
        /// Human-readable component type name.
        name: &'static str,
    },

    /// An operation ran before the registry was frozen.
    NotFrozen,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::Frozen => {
                f.write_str("component registry is frozen; register components before world construction")
            }
            RegistryError::Capacity { capacity } => {
                write!(f, "component registry is full (capacity {})", capacity)
            }
            RegistryError::UnsupportedAlignment { name, align, max_align } => {
                write!(
                    f,
                    "component {} has alignment {} exceeding the supported maximum {}",
                    name, align, max_align
                )
            }
            RegistryError::Unregistered { name } => {
                write!(f, "component {} is not registered", name)
            }
            RegistryError::NotFrozen => {
                f.write_str("component registry must be frozen before use")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// High-level error for entity spawning and direct world access.
///
/// This aggregates the most common failure modes encountered while creating
/// entities, attaching their components, and reading them back. It preserves
/// the underlying structured error to keep diagnostics actionable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnError {
    /// The spawn bundle contained no components.
    EmptyBundle,

    /// An entity handle was stale or referred to a despawned entity.
    StaleEntity,

    /// The entity index space is exhausted.
    Capacity {
        /// Maximum number of concurrently addressable entities.
        capacity: u64,
    },

    /// The entity's archetype does not contain the requested component.
    MissingComponent {
        /// Component that was requested.
        component_id: ComponentID,
    },

    /// A `(ChunkID, RowID)` addressed storage outside valid bounds.
    Position(PositionOutOfBoundsError),
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::EmptyBundle => f.write_str("cannot spawn an entity with no components"),
            SpawnError::StaleEntity => write!(f, "{StaleEntityError}"),
            SpawnError::Capacity { capacity } => {
                write!(f, "entity limit reached (capacity {})", capacity)
            }
            SpawnError::MissingComponent { component_id } => {
                write!(f, "entity does not have component {}", component_id)
            }
            SpawnError::Position(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SpawnError {}

impl From<PositionOutOfBoundsError> for SpawnError {
    fn from(e: PositionOutOfBoundsError) -> Self { SpawnError::Position(e) }
}

/// Errors raised while applying deferred structural commands.
///
/// ## Notes
/// Lock contention during command application is **not** an error: contended
/// batches are dropped for the current pass and re-emitted naturally when the
/// issuing system runs again. Stale targets are likewise skipped, since an
/// earlier batch in the same pass may legitimately have despawned them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Command payload bytes did not match the component's registered size.
    PayloadSizeMismatch {
        /// Offending component ID.
        component_id: ComponentID,

        /// Registered component size in bytes.
        expected: usize,

        /// Supplied payload size in bytes.
        actual: usize,
    },
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::PayloadSizeMismatch { component_id, expected, actual } => {
                write!(
                    f,
                    "payload size mismatch for component {}: expected {} bytes, got {}",
                    component_id, expected, actual
                )
            }
        }
    }
}

impl std::error::Error for CommandError {}

/// Errors raised while building or evaluating a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// A component was declared both read and written by the same query.
    ConflictingAccess {
        /// Offending component ID.
        component_id: ComponentID,
    },

    /// The query declared no matching constraints at all.
    EmptyQuery,
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::ConflictingAccess { component_id } => {
                write!(f, "component {} declared as both read and write", component_id)
            }
            QueryError::EmptyQuery => f.write_str("query declares no component constraints"),
        }
    }
}

impl std::error::Error for QueryError {}

/// Errors raised while constructing or validating a system schedule.
///
/// ## Context
/// Schedule construction analyzes explicit dependency edges for cycles before
/// any system executes. A cycle among explicit dependencies is fatal to the
/// schedule; implicit conflict edges cannot form cycles because conflicting
/// systems are merely serialized, not ordered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// Explicit dependencies form a cycle.
    DependencyCycle {
        /// Systems participating in the cycle, in detection order.
        systems: Vec<SystemID>,
    },

    /// A dependency edge referenced a system ID that was never registered.
    UnknownSystem {
        /// Offending system ID.
        system: SystemID,
    },

    /// A system declared a self-dependency.
    SelfDependency {
        /// Offending system ID.
        system: SystemID,
    },
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleError::DependencyCycle { systems } => {
                write!(f, "explicit dependency cycle among systems {:?}", systems)
            }
            ScheduleError::UnknownSystem { system } => {
                write!(f, "dependency references unknown system {}", system)
            }
            ScheduleError::SelfDependency { system } => {
                write!(f, "system {} cannot depend on itself", system)
            }
        }
    }
}

impl std::error::Error for ScheduleError {}

/// Errors surfaced during system execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// A system returned an error from its run hook.
    SystemFailed {
        /// Name of the failed system.
        system: String,

        /// Rendered underlying error.
        message: String,
    },

    /// The scheduler's worker pool could not be constructed.
    PoolBuildFailed {
        /// Rendered underlying error.
        message: String,
    },
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::SystemFailed { system, message } => {
                write!(f, "system {} failed: {}", system, message)
            }
            ExecutionError::PoolBuildFailed { message } => {
                write!(f, "failed to build scheduler worker pool: {}", message)
            }
        }
    }
}

impl std::error::Error for ExecutionError {}

/// Top-level aggregate error for all ECS operations.
///
/// `From<T>` conversions allow `?` from every subsystem while callers match on
/// a single expressive type at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ECSError {
    /// Component registry failure.
    Registry(RegistryError),

    /// Entity spawning or direct access failure.
    Spawn(SpawnError),

    /// Deferred command recording or application failure.
    Command(CommandError),

    /// Query construction failure.
    Query(QueryError),

    /// Schedule construction failure.
    Schedule(ScheduleError),

    /// System execution failure.
    Execute(ExecutionError),

    /// Internal invariant violation. Indicates a bug, not a recoverable
    /// runtime condition.
    Internal(String),
}

impl fmt::Display for ECSError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ECSError::Registry(e) => write!(f, "{e}"),
            ECSError::Spawn(e) => write!(f, "{e}"),
            ECSError::Command(e) => write!(f, "{e}"),
            ECSError::Query(e) => write!(f, "{e}"),
            ECSError::Schedule(e) => write!(f, "{e}"),
            ECSError::Execute(e) => write!(f, "{e}"),
            ECSError::Internal(message) => write!(f, "internal invariant violation: {}", message),
        }
    }
}

impl std::error::Error for ECSError {}

impl From<RegistryError> for ECSError {
    fn from(e: RegistryError) -> Self { ECSError::Registry(e) }
}
impl From<SpawnError> for ECSError {
    fn from(e: SpawnError) -> Self { ECSError::Spawn(e) }
}
impl From<CommandError> for ECSError {
    fn from(e: CommandError) -> Self { ECSError::Command(e) }
}
impl From<QueryError> for ECSError {
    fn from(e: QueryError) -> Self { ECSError::Query(e) }
}
impl From<ScheduleError> for ECSError {
    fn from(e: ScheduleError) -> Self { ECSError::Schedule(e) }
}
impl From<ExecutionError> for ECSError {
    fn from(e: ExecutionError) -> Self { ECSError::Execute(e) }
}
impl From<StaleEntityError> for ECSError {
    fn from(_: StaleEntityError) -> Self { ECSError::Spawn(SpawnError::StaleEntity) }
}
impl From<PositionOutOfBoundsError> for ECSError {
    fn from(e: PositionOutOfBoundsError) -> Self { ECSError::Spawn(SpawnError::Position(e)) }
}
