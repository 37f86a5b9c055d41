//! # Entity Handles and the Location Table
//!
//! Entities are packed generational handles: a 32-bit index into the
//! location table and a 32-bit version used to detect stale handles after
//! despawning. The table maps each live entity to the `(archetype, chunk,
//! row)` position of its record.

use crate::engine::error::SpawnError;
use crate::engine::types::{
    ArchetypeID, ChunkID, EntityID, IndexID, RowID, VersionID, INDEX_BITS, INDEX_CAP, INDEX_MASK,
};

/// Packed generational entity handle.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct Entity(pub EntityID);

#[inline]
const fn make_id(index: IndexID, version: VersionID) -> EntityID {
    ((version as EntityID) << INDEX_BITS) | (index as EntityID)
}

#[inline]
fn make_entity(index: IndexID, version: VersionID) -> Entity {
    debug_assert!((index as EntityID) <= INDEX_MASK);
    Entity(make_id(index, version))
}

#[inline]
const fn split_entity(entity: Entity) -> (IndexID, VersionID) {
    let id = entity.0;
    let index = (id & INDEX_MASK) as IndexID;
    let version = (id >> INDEX_BITS) as VersionID;
    (index, version)
}

impl Entity {
    /// Splits the handle into its index and version.
    #[inline] pub fn components(self) -> (IndexID, VersionID) { split_entity(self) }
    /// Returns the table index.
    #[inline] pub fn index(self) -> IndexID { (self.0 & INDEX_MASK) as IndexID }
    /// Returns the generation counter.
    #[inline] pub fn version(self) -> VersionID { (self.0 >> INDEX_BITS) as VersionID }
}

/// Record position of a live entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EntityLocation {
    /// Archetype holding the entity's record.
    pub archetype: ArchetypeID,

    /// Chunk within the archetype.
    pub chunk: ChunkID,

    /// Row within the chunk.
    pub row: RowID,
}

/// Allocation table for entity handles and their record locations.
///
/// ## Invariants
/// - `versions`, `alive`, and `locations` always have equal length.
/// - `free_store` contains exactly the dead indices below the table length.
/// - `versions[i]` is bumped on every despawn of index `i`, so a stale
///   handle never matches.
#[derive(Default)]
pub struct Entities {
    versions: Vec<VersionID>,
    free_store: Vec<IndexID>,
    alive: Vec<bool>,
    locations: Vec<EntityLocation>,
}

impl Entities {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live entities.
    pub fn live_count(&self) -> usize {
        self.alive.iter().filter(|&&a| a).count()
    }

    fn ensure_capacity(&mut self, additional_entities: u32) -> Result<(), SpawnError> {
        if additional_entities == 0 {
            return Ok(());
        }

        let current_entity_count = self.versions.len() as EntityID;
        let entities_needed = current_entity_count + (additional_entities as EntityID);
        let capacity = INDEX_CAP as EntityID + 1;
        if entities_needed > capacity {
            return Err(SpawnError::Capacity { capacity });
        }

        self.versions.resize(entities_needed as usize, 0);
        self.alive.resize(entities_needed as usize, false);
        self.locations
            .resize(entities_needed as usize, EntityLocation::default());

        for index in current_entity_count..entities_needed {
            self.free_store.push(index as IndexID);
        }
        Ok(())
    }

    /// Allocates a fresh handle at `location`.
    ///
    /// ## Errors
    /// Returns [`SpawnError::Capacity`] when the index space is exhausted.
    pub fn spawn(&mut self, location: EntityLocation) -> Result<Entity, SpawnError> {
        let index = match self.free_store.pop() {
            Some(i) => i,
            None => {
                self.ensure_capacity(1024)?;
                self.free_store
                    .pop()
                    .ok_or(SpawnError::Capacity { capacity: INDEX_CAP as u64 + 1 })?
            }
        };

        let version = self.versions[index as usize];
        self.alive[index as usize] = true;
        self.locations[index as usize] = location;

        Ok(make_entity(index, version))
    }

    /// Invalidates a handle: bumps the version, clears the location, and
    /// recycles the index. Returns `false` for stale handles.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        let (i, v) = split_entity(entity);
        let index = i as usize;
        match self.versions.get_mut(index) {
            Some(live) if *live == v && self.alive.get(index).copied().unwrap_or(false) => {
                *live = live.wrapping_add(1);
                self.alive[index] = false;
                self.locations[index] = EntityLocation::default();
                self.free_store.push(i);
                true
            }
            _ => false,
        }
    }

    /// Returns `true` if the handle refers to a live entity.
    pub fn is_alive(&self, entity: Entity) -> bool {
        let (i, v) = split_entity(entity);
        let index = i as usize;
        index < self.versions.len()
            && self.alive.get(index).copied().unwrap_or(false)
            && self.versions[index] == v
    }

    /// Returns the record location of a live entity, or `None` for stale
    /// handles.
    pub fn get_location(&self, entity: Entity) -> Option<EntityLocation> {
        if self.is_alive(entity) {
            Some(self.locations[entity.index() as usize])
        } else {
            None
        }
    }

    /// Updates the record location of a live entity.
    pub fn set_location(&mut self, entity: Entity, location: EntityLocation) {
        let index = entity.index() as usize;
        debug_assert!(
            self.is_alive(entity),
            "set_location was called on a dead or stale entity. Entity: {:?}, Location: {:?}",
            entity,
            location
        );
        if index < self.locations.len() {
            self.locations[index] = location;
        }
    }
}
