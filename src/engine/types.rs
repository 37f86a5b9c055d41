//! Core ECS Types, Identifiers, and Bit-Level Layouts
//!
//! This module defines the **fundamental types, identifiers, bit layouts, and
//! signatures** shared across all subsystems of the ECS: entity management,
//! archetypes, queries, scheduling, and command execution.
//!
//! ## Design Philosophy
//!
//! The ECS is designed around:
//!
//! - **Record-oriented chunk storage** — all components of one entity live in
//!   a single contiguous record inside a chunk,
//! - **Bitset-based signatures** for fast query matching,
//! - **Stable numeric identifiers** for components, archetypes, and systems,
//! - **Explicit access declaration** driving schedule-time conflict analysis.
//!
//! ## Entity Representation
//!
//! Entities are encoded as a packed 64-bit integer:
//!
//! ```text
//! | version (32) | index (32) |
//! ```
//!
//! - **Index** identifies the slot in the entity location table.
//! - **Version** enables stale-entity detection after despawning.
//!
//! ## Archetypes and Components
//!
//! Components are identified by compact [`ComponentID`] values. An archetype
//! is identified by its [`ArchetypeKey`]: the canonically ordered sequence of
//! `(ComponentID, AffectiveHash)` pairs present on its entities. Two keys
//! describing the same logical set in different insertion order are equal.
//!
//! [`Signature`] bitsets are derived from keys and drive query matching and
//! access conflict detection; they intentionally ignore affective hashes,
//! which are matched separately against the key.
//!
//! ## Queries and Access Control
//!
//! - [`QuerySignature`] — describes *what components* a query requires,
//!   excludes, and pins to affective buckets,
//! - [`AccessSets`] — describes *how components are accessed* (read/write),
//!   and is the sole input to the scheduler's implicit conflict edges.

use crate::engine::component::component_id_of;
use crate::engine::error::ECSResult;

/// Bit-width type used for compile-time layout calculations.
pub type Bits = u8;

/// Globally unique entity identifier encoded as a packed 64-bit value.
pub type EntityID = u64;
/// Index into the entity location table.
pub type IndexID = u32;
/// Generation counter used to detect stale entities.
pub type VersionID = u32;
/// Count of live entities.
pub type EntityCount = u32;

/// Unique identifier for a system within a scheduler.
pub type SystemID = u16;
/// Simulation tick counter.
pub type Tick = u64;

/// Total number of bits in an [`EntityID`].
pub const ENTITY_BITS: Bits = 64;
/// Number of bits reserved for entity versioning.
pub const VERSION_BITS: Bits = 32;
/// Number of bits reserved for the entity index.
pub const INDEX_BITS: Bits = ENTITY_BITS - VERSION_BITS;

const _: [(); 1] = [(); (VERSION_BITS < ENTITY_BITS) as usize];
const _: [(); 1] = [(); (INDEX_BITS > 0) as usize];

const fn mask(bits: Bits) -> EntityID {
    if bits == 0 { 0 } else { ((1 as EntityID) << bits) - 1 }
}

/// Mask selecting the index portion of an [`EntityID`].
pub const INDEX_MASK: EntityID = mask(INDEX_BITS);
/// Maximum number of entity indices.
pub const INDEX_CAP: IndexID = INDEX_MASK as IndexID;

/// Unique identifier for an archetype within one world.
pub type ArchetypeID = u16;
/// Record row index within a chunk.
pub type RowID = u32;
/// Chunk index within an archetype.
pub type ChunkID = u16;

/// Number of record slots per chunk.
pub const CHUNK_RECORDS: usize = 1024;

/// Maximum number of chunks one archetype can hold, bounded by the
/// [`ChunkID`] width. Growth past this bound aborts, like any other storage
/// exhaustion.
pub const MAX_CHUNKS: usize = ChunkID::MAX as usize + 1;

/// Size in bytes of the fixed header at the start of every record.
///
/// Layout: `u64` entity bits, `u32` flags (bit 0 = occupied), `u32` reserved.
pub const RECORD_HEADER_SIZE: usize = 16;

/// Alignment guarantee for record bases and the maximum supported component
/// alignment. Chunk buffers are allocated as `u64` words, so every record
/// base is aligned to this value.
pub const RECORD_ALIGN: usize = 8;

/// Unique identifier for a component type.
pub type ComponentID = u16;

/// Coarse bucketing hash attached to a component value's archetype key entry.
pub type AffectiveHash = u64;

/// Affective hash of components that do not participate in bucketing.
pub const AFFECTIVE_NONE: AffectiveHash = 0;

/// Maximum number of registered component types.
pub const COMPONENT_CAP: usize = 4096;
/// Number of `u64` words required to represent a full component signature.
pub const SIGNATURE_SIZE: usize = (COMPONENT_CAP + 63) / 64;

/// Bitset representing a set of components.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signature {
    /// Packed component bitset.
    pub components: [u64; SIGNATURE_SIZE],
}

impl Default for Signature {
    fn default() -> Self {
        Self {
            components: [0u64; SIGNATURE_SIZE],
        }
    }
}

impl Signature {
    /// Sets the bit corresponding to `component_id`.
    #[inline]
    pub fn set(&mut self, component_id: ComponentID) {
        let index = (component_id as usize) / 64;
        let bits = (component_id as usize) % 64;
        self.components[index] |= 1u64 << bits;
    }

    /// Returns `true` if `component_id` is present in this signature.
    #[inline]
    pub fn has(&self, component_id: ComponentID) -> bool {
        let index = (component_id as usize) / 64;
        let bits = (component_id as usize) % 64;
        (self.components[index] >> bits) & 1 == 1
    }

    /// Returns `true` if all components in `signature` are present.
    #[inline]
    pub fn contains_all(&self, signature: &Signature) -> bool {
        for (component_a, component_b) in self.components.iter().zip(signature.components.iter()) {
            if (component_a & component_b) != *component_b { return false; }
        }
        true
    }

    /// Returns `true` if no component is shared with `signature`.
    #[inline]
    pub fn is_disjoint(&self, signature: &Signature) -> bool {
        self.components
            .iter()
            .zip(signature.components.iter())
            .all(|(a, b)| (a & b) == 0)
    }

    /// Returns `true` if no bit is set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.iter().all(|&w| w == 0)
    }
}

/// Builds a component signature from a list of component IDs.
pub fn build_signature(component_ids: &[ComponentID]) -> Signature {
    let mut signature = Signature::default();
    for &component_id in component_ids { signature.set(component_id); }
    signature
}

/// Canonical identity of an archetype.
///
/// ## Purpose
/// The archetype cache key: the exact set of `(ComponentID, AffectiveHash)`
/// pairs present on the archetype's entities, sorted by component ID.
///
/// ## Invariants
/// - Entries are sorted by component ID and contain no duplicate IDs.
/// - Two keys constructed from the same logical set in any insertion order
///   compare equal and hash identically.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct ArchetypeKey {
    entries: Vec<(ComponentID, AffectiveHash)>,
}

impl ArchetypeKey {
    /// Builds a canonical key from arbitrary-order entries.
    ///
    /// ## Behavior
    /// Entries are sorted by component ID; duplicate component IDs keep the
    /// **last** supplied affective hash, mirroring command batching semantics
    /// where the last insert of a type wins.
    pub fn from_entries(entries: impl IntoIterator<Item = (ComponentID, AffectiveHash)>) -> Self {
        let mut canonical: Vec<(ComponentID, AffectiveHash)> = Vec::new();
        for (component_id, affective) in entries {
            match canonical.iter_mut().find(|(cid, _)| *cid == component_id) {
                Some(entry) => entry.1 = affective,
                None => canonical.push((component_id, affective)),
            }
        }
        canonical.sort_unstable_by_key(|(cid, _)| *cid);
        Self { entries: canonical }
    }

    /// Returns the canonical entry list, sorted by component ID.
    #[inline]
    pub fn entries(&self) -> &[(ComponentID, AffectiveHash)] {
        &self.entries
    }

    /// Returns the affective hash recorded for `component_id`, if present.
    #[inline]
    pub fn affective_of(&self, component_id: ComponentID) -> Option<AffectiveHash> {
        self.entries
            .binary_search_by_key(&component_id, |(cid, _)| *cid)
            .ok()
            .map(|i| self.entries[i].1)
    }

    /// Returns `true` if the key contains `component_id`.
    #[inline]
    pub fn has(&self, component_id: ComponentID) -> bool {
        self.affective_of(component_id).is_some()
    }

    /// Returns `true` if the key contains no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Derives the component presence bitset for this key.
    pub fn signature(&self) -> Signature {
        let mut signature = Signature::default();
        for &(component_id, _) in &self.entries {
            signature.set(component_id);
        }
        signature
    }

    /// Returns a copy of this key with `component_id` set to `affective`,
    /// inserting the entry if absent.
    pub fn with_entry(&self, component_id: ComponentID, affective: AffectiveHash) -> Self {
        let mut entries = self.entries.clone();
        match entries.binary_search_by_key(&component_id, |(cid, _)| *cid) {
            Ok(i) => entries[i].1 = affective,
            Err(i) => entries.insert(i, (component_id, affective)),
        }
        Self { entries }
    }

    /// Returns a copy of this key without `component_id`.
    pub fn without_entry(&self, component_id: ComponentID) -> Self {
        let mut entries = self.entries.clone();
        if let Ok(i) = entries.binary_search_by_key(&component_id, |(cid, _)| *cid) {
            entries.remove(i);
        }
        Self { entries }
    }
}

/// Component signature used for query matching.
#[derive(Clone, Debug, Default)]
pub struct QuerySignature {
    /// Components read by the query.
    pub read: Signature,

    /// Components written by the query.
    pub write: Signature,

    /// Components required to be present without declared access.
    pub required: Signature,

    /// Components explicitly excluded from the query.
    pub without: Signature,

    /// Affective bucket pins: the archetype key must record exactly these
    /// hashes for the named components.
    pub affective: Vec<(ComponentID, AffectiveHash)>,
}

impl QuerySignature {
    /// Returns `true` if an archetype signature satisfies the structural part
    /// of this query (affective pins are matched against the key separately).
    pub fn requires_all(&self, archetype_signature: &Signature) -> bool {
        archetype_signature.contains_all(&self.read)
            && archetype_signature.contains_all(&self.write)
            && archetype_signature.contains_all(&self.required)
            && archetype_signature.is_disjoint(&self.without)
    }

    /// Returns the access sets implied by this query.
    pub fn access_sets(&self) -> AccessSets {
        AccessSets { read: self.read, write: self.write }
    }
}

/// Marks a component type as read-only in a query signature.
pub fn set_read<T: 'static>(signature: &mut QuerySignature) -> ECSResult<()> {
    signature.read.set(component_id_of::<T>()?);
    Ok(())
}

/// Marks a component type as writable in a query signature.
pub fn set_write<T: 'static>(signature: &mut QuerySignature) -> ECSResult<()> {
    signature.write.set(component_id_of::<T>()?);
    Ok(())
}

/// Requires a component type to be present without declaring access.
pub fn set_required<T: 'static>(signature: &mut QuerySignature) -> ECSResult<()> {
    signature.required.set(component_id_of::<T>()?);
    Ok(())
}

/// Excludes a component type from a query signature.
pub fn set_without<T: 'static>(signature: &mut QuerySignature) -> ECSResult<()> {
    signature.without.set(component_id_of::<T>()?);
    Ok(())
}

/// Declares the component access set of a system.
#[derive(Clone, Copy, Debug, Default)]
pub struct AccessSets {
    /// Components read by the system.
    pub read: Signature,
    /// Components written by the system.
    pub write: Signature,
}

impl AccessSets {
    /// Returns `true` if this access set conflicts with another.
    #[inline]
    pub fn conflicts_with(&self, other: &AccessSets) -> bool {
        // Conflicts if: (W ∩ W) or (W ∩ R) or (R ∩ W)
        for ((a_w, a_r), (b_w, b_r)) in self.write.components.iter().zip(self.read.components.iter())
            .zip(other.write.components.iter().zip(other.read.components.iter()))
        {
            if (a_w & b_w) != 0 { return true; }
            if (a_w & b_r) != 0 { return true; }
            if (a_r & b_w) != 0 { return true; }
        }
        false
    }

    /// Returns `true` if this declaration covers `other`: every write in
    /// `other` is declared writable here, and every read in `other` is
    /// declared readable or writable here.
    #[inline]
    pub fn covers(&self, other: &AccessSets) -> bool {
        for ((a_w, a_r), (b_w, b_r)) in self.write.components.iter().zip(self.read.components.iter())
            .zip(other.write.components.iter().zip(other.read.components.iter()))
        {
            if (b_w & !a_w) != 0 { return false; }
            if (b_r & !(a_r | a_w)) != 0 { return false; }
        }
        true
    }
}
