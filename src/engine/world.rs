//! ECS world management layer.
//!
//! This module defines the central orchestration layer of the ECS,
//! responsible for:
//!
//! * owning archetypes and their record storage,
//! * mapping canonical archetype keys to archetype IDs,
//! * managing entity handles and their record locations,
//! * providing safe shared and exclusive access to world state,
//! * serving as the entry point for queries and deferred commands.
//!
//! ## Concurrency model
//!
//! The world is internally mutable and uses `UnsafeCell` to allow aliasing
//! between shared (`&`) and exclusive (`&mut`) access paths. Safety is
//! enforced by *API discipline*, not the Rust borrow checker:
//!
//! * Structural mutations must go through exclusive access
//!   (`&mut WorldData`),
//! * Parallel iteration is limited to non-overlapping component access sets,
//! * Deferred commands are applied only at explicit synchronization points,
//!   under the per-entity lock protocol.
//!
//! ## Archetype identity
//!
//! The archetype cache is **owned by the world**. Component registration is
//! global, but archetype identity is not: two worlds never share archetype
//! IDs or cache entries.
//!
//! ## Safety
//!
//! This module contains unsafe code for interior mutability (`UnsafeCell`).
//! All unsafe blocks rely on the access discipline documented above.

use std::cell::UnsafeCell;
use std::collections::HashMap;

use log::debug;

use crate::engine::archetype::{Archetype, ArchetypeMatch};
use crate::engine::commands::SystemCommands;
use crate::engine::component::{component_id_of, components_frozen, Bundle, Component};
use crate::engine::entity::{Entities, Entity, EntityLocation};
use crate::engine::error::{ECSError, ECSResult, RegistryError, SpawnError, StaleEntityError};
use crate::engine::executor::apply_commands;
use crate::engine::locker::EntityLocker;
use crate::engine::query::QueryBuilder;
use crate::engine::types::{ArchetypeID, ArchetypeKey, QuerySignature};

/// Thread-safe entry point to the ECS world.
///
/// ## Role
/// `EntityWorld` owns the entire world state and provides controlled access
/// through lightweight references ([`WorldRef`]). It is designed to be
/// shared across threads while enforcing safety via interior mutability.
///
/// ## Concurrency
/// * `EntityWorld` is `Sync`
/// * All mutation occurs through `UnsafeCell<WorldData>`
/// * Users must respect API-level exclusivity guarantees
pub struct EntityWorld {
    /// Interior-mutable world state.
    inner: UnsafeCell<WorldData>,
}

unsafe impl Sync for EntityWorld {}

impl EntityWorld {
    /// Creates an empty world.
    ///
    /// ## Errors
    /// Returns [`RegistryError::NotFrozen`] if the component registry is
    /// still open; record layouts require stable component metadata.
    pub fn new() -> ECSResult<Self> {
        if !components_frozen()? {
            return Err(RegistryError::NotFrozen.into());
        }
        Ok(Self { inner: UnsafeCell::new(WorldData::new()) })
    }

    /// Returns a lightweight reference handle to the world.
    ///
    /// ## Safety
    /// The returned reference permits both shared and mutable access via
    /// [`WorldRef`], relying on caller discipline to avoid data races.
    #[inline]
    pub fn world_ref(&self) -> WorldRef<'_> {
        WorldRef { inner: &self.inner }
    }

    /// Spawns an entity with the components of `bundle`.
    pub fn spawn(&mut self, bundle: Bundle) -> ECSResult<Entity> {
        self.inner.get_mut().spawn(bundle)
    }

    /// Despawns an entity, zeroing and releasing its record.
    pub fn despawn(&mut self, entity: Entity) -> ECSResult<()> {
        self.inner.get_mut().despawn(entity)
    }

    /// Reads a copy of component `T` from an entity.
    pub fn get_component<T: Component>(&self, entity: Entity) -> ECSResult<T> {
        self.world_ref().data().get_component::<T>(entity)
    }

    /// Overwrites component `T` on an entity in place.
    ///
    /// ## Notes
    /// The write does not re-bucket affective components; bucket migration
    /// goes through deferred commands.
    pub fn set_component<T: Component>(&mut self, entity: Entity, value: T) -> ECSResult<()> {
        self.inner.get_mut().set_component(entity, value)
    }

    /// Returns `true` if the handle refers to a live entity.
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.world_ref().data().entities().is_alive(entity)
    }

    /// Returns the number of live entities.
    pub fn live_count(&self) -> usize {
        self.world_ref().data().entities().live_count()
    }

    /// Begins construction of a component query.
    pub fn query(&self) -> QueryBuilder {
        QueryBuilder::new()
    }

    /// Applies a buffer of deferred commands.
    ///
    /// ## Semantics
    /// This is a synchronization point where structural changes requested
    /// during parallel or shared access phases are applied, entity batch by
    /// entity batch, under the per-entity lock protocol.
    pub fn execute_commands(&self, commands: &mut SystemCommands) -> ECSResult<()> {
        apply_commands(&self.world_ref(), commands)
    }
}

/// A non-owning handle granting access to world data.
///
/// ## Role
/// `WorldRef` allows systems to read or mutate world state while the
/// [`EntityWorld`] remains shared.
///
/// ## Safety
/// This type exposes raw access to `WorldData` via `UnsafeCell` and relies
/// on higher-level scheduling to avoid conflicting mutable accesses.
pub struct WorldRef<'a> {
    inner: &'a UnsafeCell<WorldData>,
}

impl<'a> WorldRef<'a> {
    /// Returns an immutable reference to world data.
    ///
    /// ## Safety
    /// No aliasing guarantees are enforced at compile time.
    #[inline]
    pub fn data(&self) -> &WorldData {
        unsafe { &*self.inner.get() }
    }

    /// Returns a mutable reference to world data.
    ///
    /// ## Safety
    /// Caller must ensure no conflicting references are active while this
    /// reference is used.
    #[inline]
    pub fn data_mut(&self) -> &mut WorldData {
        unsafe { &mut *self.inner.get() }
    }
}

/// Core world storage and orchestration structure.
///
/// ## Responsibilities
/// * Owns all archetypes and their record storage
/// * Maps canonical archetype keys to archetype IDs
/// * Manages entity handle allocation and record locations
/// * Hosts the per-entity lock table used at command sync points
///
/// ## Invariants
/// * `archetype_map` and `archetypes` must remain consistent
/// * Entity locations must always point to occupied records
pub struct WorldData {
    archetypes: Vec<Archetype>,
    archetype_map: HashMap<ArchetypeKey, ArchetypeID>,
    entities: Entities,
    locker: EntityLocker,
}

impl WorldData {
    fn new() -> Self {
        Self {
            archetypes: Vec::new(),
            archetype_map: HashMap::new(),
            entities: Entities::new(),
            locker: EntityLocker::new(),
        }
    }

    /// Returns the entity handle table.
    #[inline]
    pub fn entities(&self) -> &Entities {
        &self.entities
    }

    /// Returns the entity handle table for mutation.
    #[inline]
    pub fn entities_mut(&mut self) -> &mut Entities {
        &mut self.entities
    }

    /// Returns the per-entity lock table.
    #[inline]
    pub fn locker(&self) -> &EntityLocker {
        &self.locker
    }

    /// Returns an archetype by ID.
    pub fn archetype(&self, archetype_id: ArchetypeID) -> ECSResult<&Archetype> {
        self.archetypes
            .get(archetype_id as usize)
            .ok_or_else(|| ECSError::Internal(format!("unknown archetype {}", archetype_id)))
    }

    /// Returns an archetype by ID for mutation.
    pub fn archetype_mut(&mut self, archetype_id: ArchetypeID) -> ECSResult<&mut Archetype> {
        self.archetypes
            .get_mut(archetype_id as usize)
            .ok_or_else(|| ECSError::Internal(format!("unknown archetype {}", archetype_id)))
    }

    /// Retrieves the archetype for a canonical key, creating it lazily.
    ///
    /// ## Semantics
    /// Archetypes are assigned monotonically increasing IDs; the cache maps
    /// the full key including affective hashes, so the same component set in
    /// different buckets resolves to different archetypes.
    ///
    /// ## Complexity
    /// Amortized O(1).
    pub fn get_or_create_archetype(&mut self, key: &ArchetypeKey) -> ECSResult<ArchetypeID> {
        if let Some(&id) = self.archetype_map.get(key) {
            return Ok(id);
        }

        let id = self.archetypes.len() as ArchetypeID;
        let archetype = Archetype::new(id, key.clone())?;
        debug!(
            "created archetype {} with {} components",
            id,
            key.entries().len()
        );
        self.archetype_map.insert(key.clone(), id);
        self.archetypes.push(archetype);
        Ok(id)
    }

    /// Returns mutable references to two distinct archetypes.
    ///
    /// ## Purpose
    /// Enables mutation of source and destination archetypes during entity
    /// migration without violating Rust aliasing rules.
    ///
    /// ## Panics
    /// Panics if `a == b`; same-key migrations are handled in place and
    /// never reach this path.
    ///
    /// ## Safety
    /// Relies on slice splitting to ensure disjoint mutable borrows.
    #[inline]
    pub fn archetype_pair_mut(
        &mut self,
        a: ArchetypeID,
        b: ArchetypeID,
    ) -> (&mut Archetype, &mut Archetype) {
        assert!(a != b, "source and destination archetype must differ");

        let (low, high) = if a < b { (a, b) } else { (b, a) };
        let (head, tail) = self.archetypes.split_at_mut(high as usize);

        let left = &mut head[low as usize];
        let right = &mut tail[0];

        if a < b { (left, right) } else { (right, left) }
    }

    /// Spawns an entity with the components of `bundle`.
    ///
    /// ## Behavior
    /// 1. Derives the canonical key (duplicates deduplicated, last value
    ///    wins) and resolves the archetype through the cache.
    /// 2. Takes a record slot and allocates an entity handle.
    /// 3. Writes the record header and every component's bytes.
    ///
    /// ## Errors
    /// * [`SpawnError::EmptyBundle`] for an empty bundle.
    /// * [`SpawnError::Capacity`] when the entity index space is exhausted.
    pub fn spawn(&mut self, bundle: Bundle) -> ECSResult<Entity> {
        if bundle.is_empty() {
            return Err(SpawnError::EmptyBundle.into());
        }

        let key = bundle.key();
        let archetype_id = self.get_or_create_archetype(&key)?;

        let (chunk, row) = self.archetypes[archetype_id as usize].take_record();
        let location = EntityLocation { archetype: archetype_id, chunk, row };
        let entity = match self.entities.spawn(location) {
            Ok(entity) => entity,
            Err(e) => {
                self.archetypes[archetype_id as usize].release_record(chunk, row)?;
                return Err(e.into());
            }
        };

        let archetype = &mut self.archetypes[archetype_id as usize];
        archetype.occupy_record(chunk, row, entity.0)?;
        for entry in bundle.entries() {
            archetype
                .component_bytes_mut(chunk, row, entry.component_id)?
                .copy_from_slice(&entry.bytes);
        }
        Ok(entity)
    }

    /// Despawns an entity.
    ///
    /// ## Behavior
    /// Zeroes and releases the record, clears the location, and bumps the
    /// handle version so outstanding handles report stale.
    ///
    /// ## Errors
    /// [`SpawnError::StaleEntity`] for dead or stale handles.
    pub fn despawn(&mut self, entity: Entity) -> ECSResult<()> {
        let location = self
            .entities
            .get_location(entity)
            .ok_or(StaleEntityError)?;
        self.archetypes[location.archetype as usize].release_record(location.chunk, location.row)?;
        self.entities.despawn(entity);
        Ok(())
    }

    /// Reads a copy of component `T` from an entity.
    ///
    /// ## Errors
    /// * [`SpawnError::StaleEntity`] for dead handles.
    /// * [`SpawnError::MissingComponent`] if the entity's archetype lacks
    ///   `T`.
    pub fn get_component<T: Component>(&self, entity: Entity) -> ECSResult<T> {
        let component_id = component_id_of::<T>()?;
        let location = self
            .entities
            .get_location(entity)
            .ok_or(StaleEntityError)?;
        let archetype = self.archetype(location.archetype)?;
        if !archetype.has(component_id) {
            return Err(SpawnError::MissingComponent { component_id }.into());
        }
        let bytes = archetype.component_bytes(location.chunk, location.row, component_id)?;
        Ok(*bytemuck::from_bytes(bytes))
    }

    /// Overwrites component `T` on an entity in place.
    ///
    /// ## Errors
    /// See [`WorldData::get_component`].
    pub fn set_component<T: Component>(&mut self, entity: Entity, value: T) -> ECSResult<()> {
        let component_id = component_id_of::<T>()?;
        let location = self
            .entities
            .get_location(entity)
            .ok_or(StaleEntityError)?;
        let archetype = self.archetype_mut(location.archetype)?;
        if !archetype.has(component_id) {
            return Err(SpawnError::MissingComponent { component_id }.into());
        }
        archetype
            .component_bytes_mut(location.chunk, location.row, component_id)?
            .copy_from_slice(bytemuck::bytes_of(&value));
        Ok(())
    }

    /// Begins construction of a component query.
    pub fn query(&self) -> QueryBuilder {
        QueryBuilder::new()
    }

    /// Returns archetypes matching a query signature, in creation order.
    pub fn matching_archetypes(&self, query: &QuerySignature) -> Vec<ArchetypeMatch> {
        self.archetypes
            .iter()
            .filter(|a| a.matches(query))
            .map(|a| ArchetypeMatch {
                archetype_id: a.archetype_id(),
                chunks: a.chunk_count(),
            })
            .collect()
    }
}
