//! # Record Chunk Storage
//!
//! Fixed-capacity chunks of entity records. Each record holds a small header
//! followed by every component of one entity at fixed byte offsets, so all
//! data for an entity is contiguous in memory.
//!
//! ## Design
//! - A chunk stores up to [`CHUNK_RECORDS`] records of uniform `record_size`.
//! - The backing buffer is allocated as `Box<[u64]>`, so the buffer base and
//!   every record base (record sizes are multiples of [`RECORD_ALIGN`]) are
//!   8-byte aligned. Component offsets are padded to their alignment, which
//!   the registry caps at [`RECORD_ALIGN`], so in-place typed references into
//!   record bytes are always aligned.
//! - Records begin with a [`RECORD_HEADER_SIZE`]-byte header: the entity's
//!   packed bits (`u64`), a `u32` flag word (bit 0 = occupied), and a `u32`
//!   reserved word.
//!
//! ## Invariants
//! - `record_size` is a non-zero multiple of [`RECORD_ALIGN`].
//! - `live <= allocated <= CHUNK_RECORDS`.
//! - Released records are fully zeroed, including the header.

use crate::engine::types::{
    EntityID, RowID, CHUNK_RECORDS, RECORD_ALIGN, RECORD_HEADER_SIZE,
};

/// Record flag bit marking the slot as occupied by a live entity.
pub const FLAG_OCCUPIED: u32 = 1;

const FLAGS_OFFSET: usize = 8;

/// A fixed-capacity block of entity records.
///
/// ## Purpose
/// The unit of storage inside an archetype: a contiguous buffer of records
/// sharing one layout, with a bump-allocated high-water mark and a live
/// count maintained by the owning archetype's free-list.
pub struct ArchetypeChunk {
    buffer: Box<[u64]>,
    record_size: usize,
    allocated: usize,
    live: usize,
}

impl ArchetypeChunk {
    /// Allocates a zeroed chunk for records of `record_size` bytes.
    ///
    /// ## Invariants
    /// `record_size` must be a non-zero multiple of [`RECORD_ALIGN`]; the
    /// archetype layout computation guarantees this.
    pub fn new(record_size: usize) -> Self {
        debug_assert!(record_size >= RECORD_HEADER_SIZE);
        debug_assert!(record_size % RECORD_ALIGN == 0);
        let words = (record_size / 8) * CHUNK_RECORDS;
        Self {
            buffer: vec![0u64; words].into_boxed_slice(),
            record_size,
            allocated: 0,
            live: 0,
        }
    }

    /// Returns the uniform record size in bytes.
    #[inline]
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Returns the bump-allocation high-water mark.
    #[inline]
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Returns the number of occupied records.
    #[inline]
    pub fn live(&self) -> usize {
        self.live
    }

    /// Returns `true` if no fresh row can be bump-allocated.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.allocated >= CHUNK_RECORDS
    }

    /// Bump-allocates the next fresh row, if any remain.
    pub fn allocate_row(&mut self) -> Option<RowID> {
        if self.is_full() {
            return None;
        }
        let row = self.allocated as RowID;
        self.allocated += 1;
        Some(row)
    }

    #[inline]
    fn record_range(&self, row: RowID) -> Option<std::ops::Range<usize>> {
        let row = row as usize;
        if row >= self.allocated {
            return None;
        }
        let start = row * self.record_size;
        Some(start..start + self.record_size)
    }

    /// Returns the full byte view of a record, if the row is allocated.
    pub fn record_bytes(&self, row: RowID) -> Option<&[u8]> {
        let range = self.record_range(row)?;
        Some(&bytemuck::cast_slice::<u64, u8>(&self.buffer)[range])
    }

    /// Returns the full mutable byte view of a record, if the row is
    /// allocated.
    pub fn record_bytes_mut(&mut self, row: RowID) -> Option<&mut [u8]> {
        let range = self.record_range(row)?;
        Some(&mut bytemuck::cast_slice_mut::<u64, u8>(&mut self.buffer)[range])
    }

    /// Returns the byte view of one component within a record.
    ///
    /// `offset` and `size` come from the owning archetype's offset table.
    pub fn component_bytes(&self, row: RowID, offset: usize, size: usize) -> Option<&[u8]> {
        let record = self.record_bytes(row)?;
        record.get(offset..offset + size)
    }

    /// Returns the mutable byte view of one component within a record.
    pub fn component_bytes_mut(
        &mut self,
        row: RowID,
        offset: usize,
        size: usize,
    ) -> Option<&mut [u8]> {
        let record = self.record_bytes_mut(row)?;
        record.get_mut(offset..offset + size)
    }

    /// Writes the record header and marks the slot occupied.
    ///
    /// Returns `false` if the row is out of bounds or already occupied.
    pub fn occupy_record(&mut self, row: RowID, entity_bits: EntityID) -> bool {
        if self.is_occupied(row) {
            return false;
        }
        let Some(record) = self.record_bytes_mut(row) else {
            return false;
        };
        record[0..8].copy_from_slice(&entity_bits.to_ne_bytes());
        record[FLAGS_OFFSET..FLAGS_OFFSET + 4].copy_from_slice(&FLAG_OCCUPIED.to_ne_bytes());
        record[FLAGS_OFFSET + 4..RECORD_HEADER_SIZE].fill(0);
        self.live += 1;
        true
    }

    /// Returns the packed entity bits stored in a record header, if the row
    /// is allocated and occupied.
    pub fn entity_bits(&self, row: RowID) -> Option<EntityID> {
        if !self.is_occupied(row) {
            return None;
        }
        let record = self.record_bytes(row)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&record[0..8]);
        Some(EntityID::from_ne_bytes(raw))
    }

    /// Returns `true` if the row is allocated and its occupied flag is set.
    pub fn is_occupied(&self, row: RowID) -> bool {
        let Some(record) = self.record_bytes(row) else {
            return false;
        };
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&record[FLAGS_OFFSET..FLAGS_OFFSET + 4]);
        u32::from_ne_bytes(raw) & FLAG_OCCUPIED != 0
    }

    /// Zeroes a record, clearing the header and all component bytes.
    ///
    /// Decrements the live count if the slot was occupied. Returns `false`
    /// if the row is out of bounds.
    pub fn zero_record(&mut self, row: RowID) -> bool {
        let was_occupied = self.is_occupied(row);
        let Some(record) = self.record_bytes_mut(row) else {
            return false;
        };
        record.fill(0);
        if was_occupied {
            self.live -= 1;
        }
        true
    }
}
