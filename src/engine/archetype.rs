//! # Archetypes
//!
//! An archetype owns the storage for every entity sharing one exact
//! component set (and affective bucket assignment). Storage is a list of
//! fixed-capacity [`ArchetypeChunk`]s plus a free-list of released record
//! slots.
//!
//! ## Record layout
//! The layout is computed once at archetype construction from the frozen
//! component registry: the [`RECORD_HEADER_SIZE`]-byte header, then each
//! component of the canonical key in order, each at the next offset padded
//! up to its alignment; the total is rounded up to [`RECORD_ALIGN`].
//!
//! ## Record lifecycle
//! - [`Archetype::take_record`] pops the free-list, else bump-allocates in
//!   the last chunk, else appends a fresh chunk. Short of allocation abort it
//!   never fails.
//! - [`Archetype::release_record`] zeroes the record and pushes the slot
//!   back. Live records are never compacted or moved; queries skip free
//!   slots.
//!
//! ## Invariants
//! - The free-list never contains an occupied slot.
//! - Every offset in the offset table is aligned for its component.
//! - Chunk pointers are stable for the archetype's lifetime; records never
//!   move between (chunk, row) positions.
//! - An archetype holds at most [`MAX_CHUNKS`] chunks; growth past the
//!   `ChunkID` range aborts, like any other storage exhaustion.

use crate::engine::chunk::ArchetypeChunk;
use crate::engine::component::component_description;
use crate::engine::error::{ECSError, ECSResult, PositionOutOfBoundsError};
use crate::engine::types::{
    ArchetypeID, ArchetypeKey, ChunkID, ComponentID, EntityID, QuerySignature, RowID, Signature,
    CHUNK_RECORDS, MAX_CHUNKS, RECORD_ALIGN, RECORD_HEADER_SIZE,
};

#[inline]
fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Narrows a chunk index to [`ChunkID`], aborting past the addressable range.
#[inline]
fn chunk_id_for(index: usize) -> ChunkID {
    assert!(
        index < MAX_CHUNKS,
        "archetype chunk count exceeds the ChunkID range ({} chunks)",
        MAX_CHUNKS
    );
    index as ChunkID
}

/// Byte placement of one component inside a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComponentSlot {
    /// Component stored at this slot.
    pub component_id: ComponentID,

    /// Byte offset from the record base.
    pub offset: usize,

    /// Component size in bytes.
    pub size: usize,
}

/// Computed record layout for one archetype.
///
/// ## Invariants
/// - Slots are ordered by component ID (canonical key order).
/// - `record_size` is a multiple of [`RECORD_ALIGN`] and at least
///   [`RECORD_HEADER_SIZE`].
#[derive(Clone, Debug)]
pub struct RecordLayout {
    slots: Vec<ComponentSlot>,
    record_size: usize,
}

impl RecordLayout {
    /// Computes the layout for a canonical archetype key.
    ///
    /// ## Errors
    /// Returns a registry error if any component of the key is unregistered.
    pub fn for_key(key: &ArchetypeKey) -> ECSResult<Self> {
        let mut slots = Vec::with_capacity(key.entries().len());
        let mut cursor = RECORD_HEADER_SIZE;
        for &(component_id, _) in key.entries() {
            let desc = component_description(component_id)?;
            cursor = align_up(cursor, desc.align.max(1));
            slots.push(ComponentSlot { component_id, offset: cursor, size: desc.size });
            cursor += desc.size;
        }
        Ok(Self { slots, record_size: align_up(cursor, RECORD_ALIGN) })
    }

    /// Returns the total record size in bytes.
    #[inline]
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Returns the slot for `component_id`, if the layout contains it.
    #[inline]
    pub fn slot_of(&self, component_id: ComponentID) -> Option<ComponentSlot> {
        self.slots
            .binary_search_by_key(&component_id, |s| s.component_id)
            .ok()
            .map(|i| self.slots[i])
    }

    /// Returns all slots in canonical order.
    #[inline]
    pub fn slots(&self) -> &[ComponentSlot] {
        &self.slots
    }
}

/// Storage and identity for one exact component set.
pub struct Archetype {
    archetype_id: ArchetypeID,
    key: ArchetypeKey,
    signature: Signature,
    layout: RecordLayout,
    chunks: Vec<ArchetypeChunk>,
    free: Vec<(ChunkID, RowID)>,
}

impl Archetype {
    /// Constructs an empty archetype for a canonical key.
    ///
    /// ## Errors
    /// Returns a registry error if any component of the key is unregistered.
    pub fn new(archetype_id: ArchetypeID, key: ArchetypeKey) -> ECSResult<Self> {
        let layout = RecordLayout::for_key(&key)?;
        let signature = key.signature();
        Ok(Self {
            archetype_id,
            key,
            signature,
            layout,
            chunks: Vec::new(),
            free: Vec::new(),
        })
    }

    /// Returns this archetype's identifier.
    #[inline]
    pub fn archetype_id(&self) -> ArchetypeID {
        self.archetype_id
    }

    /// Returns the canonical key.
    #[inline]
    pub fn key(&self) -> &ArchetypeKey {
        &self.key
    }

    /// Returns the component presence bitset.
    #[inline]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Returns the computed record layout.
    #[inline]
    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    /// Returns `true` if the archetype stores `component_id`.
    #[inline]
    pub fn has(&self, component_id: ComponentID) -> bool {
        self.signature.has(component_id)
    }

    /// Returns the number of chunks.
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Returns the total number of occupied records.
    pub fn live(&self) -> usize {
        self.chunks.iter().map(|c| c.live()).sum()
    }

    /// Returns a shared view of a chunk.
    pub fn chunk(&self, chunk: ChunkID) -> ECSResult<&ArchetypeChunk> {
        self.chunks
            .get(chunk as usize)
            .ok_or_else(|| self.out_of_bounds(chunk, 0).into())
    }

    /// Returns a mutable view of a chunk.
    pub fn chunk_mut(&mut self, chunk: ChunkID) -> ECSResult<&mut ArchetypeChunk> {
        let chunks = self.chunks.len();
        self.chunks
            .get_mut(chunk as usize)
            .ok_or_else(|| {
                ECSError::from(PositionOutOfBoundsError {
                    chunk,
                    row: 0,
                    chunks,
                    capacity: CHUNK_RECORDS,
                })
            })
    }

    /// Iterates over all chunks.
    pub fn chunks(&self) -> impl Iterator<Item = (ChunkID, &ArchetypeChunk)> {
        self.chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (chunk_id_for(i), c))
    }

    fn out_of_bounds(&self, chunk: ChunkID, row: RowID) -> PositionOutOfBoundsError {
        PositionOutOfBoundsError {
            chunk,
            row,
            chunks: self.chunks.len(),
            capacity: CHUNK_RECORDS,
        }
    }

    /// Claims a record slot.
    ///
    /// ## Behavior
    /// Pops the free-list if non-empty; otherwise bump-allocates in the last
    /// chunk; otherwise appends a fresh chunk and takes its first row. O(1)
    /// amortized; never fails short of allocation abort.
    ///
    /// The returned slot is zeroed and unoccupied. Callers must write the
    /// header via [`Archetype::occupy_record`] before exposing the entity.
    ///
    /// ## Panics
    /// Aborts when growth would exceed [`MAX_CHUNKS`] chunks.
    pub fn take_record(&mut self) -> (ChunkID, RowID) {
        if let Some(slot) = self.free.pop() {
            return slot;
        }
        if let Some(last) = self.chunks.last_mut() {
            if let Some(row) = last.allocate_row() {
                return (chunk_id_for(self.chunks.len() - 1), row);
            }
        }
        let mut chunk = ArchetypeChunk::new(self.layout.record_size());
        let row = chunk
            .allocate_row()
            .unwrap_or(0);
        self.chunks.push(chunk);
        (chunk_id_for(self.chunks.len() - 1), row)
    }

    /// Releases a record slot: zeroes all bytes and pushes the slot onto the
    /// free-list.
    ///
    /// ## Errors
    /// Returns a position error if `(chunk, row)` is out of bounds.
    pub fn release_record(&mut self, chunk: ChunkID, row: RowID) -> ECSResult<()> {
        let position = self.out_of_bounds(chunk, row);
        let storage = self
            .chunks
            .get_mut(chunk as usize)
            .ok_or(position)?;
        if !storage.zero_record(row) {
            return Err(position.into());
        }
        self.free.push((chunk, row));
        Ok(())
    }

    /// Writes the record header and marks the slot occupied.
    pub fn occupy_record(&mut self, chunk: ChunkID, row: RowID, entity_bits: EntityID) -> ECSResult<()> {
        let position = self.out_of_bounds(chunk, row);
        let storage = self.chunks.get_mut(chunk as usize).ok_or(position)?;
        if !storage.occupy_record(row, entity_bits) {
            return Err(ECSError::Internal(format!(
                "occupy_record: slot ({}, {}) unavailable in archetype {}",
                chunk, row, self.archetype_id
            )));
        }
        Ok(())
    }

    /// Returns the byte view of one component of one record.
    pub fn component_bytes(
        &self,
        chunk: ChunkID,
        row: RowID,
        component_id: ComponentID,
    ) -> ECSResult<&[u8]> {
        let slot = self
            .layout
            .slot_of(component_id)
            .ok_or_else(|| ECSError::Internal(format!(
                "component {} not stored in archetype {}",
                component_id, self.archetype_id
            )))?;
        let position = self.out_of_bounds(chunk, row);
        let storage = self.chunks.get(chunk as usize).ok_or(position)?;
        storage
            .component_bytes(row, slot.offset, slot.size)
            .ok_or_else(|| position.into())
    }

    /// Returns the mutable byte view of one component of one record.
    pub fn component_bytes_mut(
        &mut self,
        chunk: ChunkID,
        row: RowID,
        component_id: ComponentID,
    ) -> ECSResult<&mut [u8]> {
        let slot = self
            .layout
            .slot_of(component_id)
            .ok_or_else(|| ECSError::Internal(format!(
                "component {} not stored in archetype {}",
                component_id, self.archetype_id
            )))?;
        let position = self.out_of_bounds(chunk, row);
        let storage = self.chunks.get_mut(chunk as usize).ok_or(position)?;
        storage
            .component_bytes_mut(row, slot.offset, slot.size)
            .ok_or_else(|| position.into())
    }

    /// Returns `true` if this archetype satisfies a query: structural
    /// constraints against the signature, affective pins against the key.
    pub fn matches(&self, query: &QuerySignature) -> bool {
        if !query.requires_all(&self.signature) {
            return false;
        }
        query
            .affective
            .iter()
            .all(|&(component_id, affective)| self.key.affective_of(component_id) == Some(affective))
    }
}

/// Identifies an archetype matched by a query, with its chunk count at match
/// time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArchetypeMatch {
    /// Matched archetype.
    pub archetype_id: ArchetypeID,

    /// Number of chunks at match time.
    pub chunks: usize,
}

/// Copies the record header and all components shared by both layouts from a
/// source record into a destination record.
///
/// Used during archetype migration; components absent from either layout are
/// left untouched (the destination slot was zeroed on release).
pub fn copy_shared_record(
    source: &Archetype,
    source_position: (ChunkID, RowID),
    destination: &mut Archetype,
    destination_position: (ChunkID, RowID),
) -> ECSResult<()> {
    let entity_bits = source
        .chunk(source_position.0)?
        .entity_bits(source_position.1)
        .ok_or_else(|| ECSError::Internal("copy_shared_record: source record not occupied".into()))?;
    destination.occupy_record(destination_position.0, destination_position.1, entity_bits)?;

    for slot in source.layout().slots() {
        if destination.layout().slot_of(slot.component_id).is_none() {
            continue;
        }
        let bytes =
            source.component_bytes(source_position.0, source_position.1, slot.component_id)?;
        let copied = bytes.to_vec();
        destination
            .component_bytes_mut(destination_position.0, destination_position.1, slot.component_id)?
            .copy_from_slice(&copied);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_ids_cover_the_full_chunk_id_range() {
        assert_eq!(chunk_id_for(0), 0);
        assert_eq!(chunk_id_for(MAX_CHUNKS - 1), ChunkID::MAX);
    }

    #[test]
    #[should_panic(expected = "exceeds the ChunkID range")]
    fn chunk_index_past_the_chunk_id_range_aborts() {
        let _ = chunk_id_for(MAX_CHUNKS);
    }
}
