//! Typed query construction and execution for the ECS.
//!
//! This module provides a *builder-style* API for constructing component
//! queries with explicit read/write access declarations, and for executing
//! those queries over matching archetypes.
//!
//! ## Design goals
//! * **Static intent:** Read/write/require/without/affective intent is
//!   encoded at build time.
//! * **Runtime efficiency:** Queries operate directly on record storage
//!   without intermediate allocations.
//! * **Safety by discipline:** The API enforces access correctness by
//!   construction, not by the borrow checker.
//!
//! ## Execution model
//! Queries:
//! 1. Construct a [`QuerySignature`] describing required, read, write,
//!    excluded, and affective-pinned components.
//! 2. Resolve matching archetypes at execution time; results are never
//!    cached, so structural changes are visible to the next execution.
//! 3. Iterate chunk-by-chunk in storage order, skipping free record slots.
//! 4. Invoke user-provided closures on the entity handle and typed component
//!    references into the record.
//!
//! ## Concurrency
//! This module itself does not perform parallel execution. It relies on the
//! caller (typically the scheduler) to ensure non-overlapping write sets
//! between concurrent queries.

use crate::engine::archetype::ArchetypeMatch;
use crate::engine::component::{component_id_of, Component};
use crate::engine::entity::Entity;
use crate::engine::error::{ECSResult, QueryError};
use crate::engine::types::{
    set_read, set_required, set_without, set_write, AccessSets, ChunkID, ComponentID,
    QuerySignature,
};
use crate::engine::world::WorldRef;

#[cfg(debug_assertions)]
mod shadow {
    //! Debug-only shadow check of declared system access.
    //!
    //! The scheduler installs the running system's declared access sets for
    //! the current thread; typed query adapters assert that every query they
    //! execute is covered by the declaration. Release builds compile this
    //! away, matching the unchecked declaration contract.

    use std::cell::Cell;

    use crate::engine::types::AccessSets;

    thread_local! {
        static DECLARED: Cell<Option<AccessSets>> = const { Cell::new(None) };
    }

    pub(crate) fn install_declared_access(access: Option<AccessSets>) {
        DECLARED.with(|d| d.set(access));
    }

    pub(crate) fn assert_covered(query_access: &AccessSets) {
        DECLARED.with(|d| {
            if let Some(declared) = d.get() {
                debug_assert!(
                    declared.covers(query_access),
                    "query access exceeds the running system's declared access sets"
                );
            }
        });
    }
}

#[cfg(debug_assertions)]
pub(crate) use shadow::install_declared_access;

#[cfg(debug_assertions)]
fn assert_declared_coverage(access: &AccessSets) {
    shadow::assert_covered(access);
}

#[cfg(not(debug_assertions))]
fn assert_declared_coverage(_access: &AccessSets) {}

/// Builder for ECS component queries.
///
/// `QueryBuilder` incrementally constructs a [`QuerySignature`] describing:
/// * which components must be present,
/// * which components are read-only,
/// * which components are written,
/// * which components must be absent,
/// * which affective buckets the archetype key must record.
///
/// The builder is *consumed* when executing a query, ensuring that a query
/// definition cannot be reused incorrectly.
///
/// ## Typing model
/// Execution goes through a typed adapter matching the declared access
/// pattern (e.g. [`QueryBuilder::for_each_read1_write1`]); the adapter's type
/// parameters must repeat the declarations in order.
///
/// ## Example
/// ```ignore
/// world.query()
///     .read::<Position>()?
///     .read::<Velocity>()?
///     .write::<Transform>()?
///     .for_each_read2_write1(&world, |_entity, pos, vel, transform| {
///         transform.update(pos, vel);
///     })?;
/// ```
pub struct QueryBuilder {
    /// Structural and access-level query signature.
    signature: QuerySignature,

    /// Component IDs read by the query (in declaration order).
    reads: Vec<ComponentID>,

    /// Component IDs written by the query (in declaration order).
    writes: Vec<ComponentID>,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryBuilder {
    /// Creates a new, empty query builder.
    pub fn new() -> Self {
        Self { signature: QuerySignature::default(), reads: vec![], writes: vec![] }
    }

    /// Reconstructs a builder from a previously captured signature and
    /// declaration order. Used by built systems to re-run their query each
    /// tick.
    pub(crate) fn from_parts(
        signature: QuerySignature,
        reads: Vec<ComponentID>,
        writes: Vec<ComponentID>,
    ) -> Self {
        Self { signature, reads, writes }
    }

    /// Declares a read-only dependency on component `T`.
    ///
    /// ## Semantics
    /// * Adds `T` to the query's required component set.
    /// * Marks `T` as read-only for access conflict analysis.
    ///
    /// ## Errors
    /// * Registry error if `T` is unregistered.
    /// * [`QueryError::ConflictingAccess`] if `T` was already declared
    ///   written.
    pub fn read<T: Component>(mut self) -> ECSResult<Self> {
        let component_id = component_id_of::<T>()?;
        if self.writes.contains(&component_id) {
            return Err(QueryError::ConflictingAccess { component_id }.into());
        }
        set_read::<T>(&mut self.signature)?;
        self.reads.push(component_id);
        Ok(self)
    }

    /// Declares a mutable dependency on component `T`.
    ///
    /// ## Semantics
    /// * Adds `T` to the query's required component set.
    /// * Marks `T` as write-access for conflict detection.
    ///
    /// ## Errors
    /// * Registry error if `T` is unregistered.
    /// * [`QueryError::ConflictingAccess`] if `T` was already declared read.
    pub fn write<T: Component>(mut self) -> ECSResult<Self> {
        let component_id = component_id_of::<T>()?;
        if self.reads.contains(&component_id) {
            return Err(QueryError::ConflictingAccess { component_id }.into());
        }
        set_write::<T>(&mut self.signature)?;
        self.writes.push(component_id);
        Ok(self)
    }

    /// Requires component `T` to be present without declaring access to it.
    pub fn require<T: Component>(mut self) -> ECSResult<Self> {
        set_required::<T>(&mut self.signature)?;
        Ok(self)
    }

    /// Excludes component `T` from matching archetypes.
    pub fn without<T: Component>(mut self) -> ECSResult<Self> {
        set_without::<T>(&mut self.signature)?;
        Ok(self)
    }

    /// Pins component `T` to a specific affective bucket.
    ///
    /// ## Semantics
    /// The archetype key must record exactly `affective` for `T`. Implies
    /// that `T` is required.
    pub fn affective<T: Component>(mut self, affective: u64) -> ECSResult<Self> {
        let component_id = component_id_of::<T>()?;
        set_required::<T>(&mut self.signature)?;
        self.signature.affective.push((component_id, affective));
        Ok(self)
    }

    /// Returns the read/write access sets declared by this query.
    ///
    /// This is typically used by schedulers to detect conflicts between
    /// queries before execution.
    pub fn access_sets(&self) -> AccessSets {
        self.signature.access_sets()
    }

    /// Returns the underlying query signature.
    pub fn signature(&self) -> &QuerySignature {
        &self.signature
    }

    /// Resolves the query into matching archetypes.
    ///
    /// This performs no iteration and does not borrow record storage.
    pub fn resolve(&self, world: &WorldRef<'_>) -> Vec<ArchetypeMatch> {
        world.data().matching_archetypes(&self.signature)
    }

    /// Rejects queries with no constraints at all; such a query would match
    /// every archetype, which is always a declaration mistake.
    fn ensure_constrained(&self) -> ECSResult<()> {
        let s = &self.signature;
        if s.read.is_empty()
            && s.write.is_empty()
            && s.required.is_empty()
            && s.without.is_empty()
            && s.affective.is_empty()
        {
            return Err(QueryError::EmptyQuery.into());
        }
        Ok(())
    }
}

macro_rules! validate_arity {
    ($self:ident, $reads:expr, $writes:expr) => {
        debug_assert_eq!($self.reads.len(), $reads);
        debug_assert_eq!($self.writes.len(), $writes);
        assert_declared_coverage(&$self.signature.access_sets());
    };
}

impl QueryBuilder {
    /// Executes the query yielding only entity handles.
    ///
    /// Useful with [`QueryBuilder::require`] and [`QueryBuilder::without`]
    /// when no component data is needed.
    ///
    /// ## Errors
    /// [`QueryError::EmptyQuery`] if the builder declared no constraints.
    pub fn for_each_entity<F>(self, world: &WorldRef<'_>, mut f: F) -> ECSResult<()>
    where
        F: FnMut(Entity),
    {
        self.ensure_constrained()?;
        assert_declared_coverage(&self.signature.access_sets());
        let data = world.data();

        for m in data.matching_archetypes(&self.signature) {
            let archetype = data.archetype(m.archetype_id)?;
            for (_, chunk) in archetype.chunks() {
                for row in 0..chunk.allocated() as u32 {
                    if let Some(bits) = chunk.entity_bits(row) {
                        f(Entity(bits));
                    }
                }
            }
        }
        Ok(())
    }

    /// Executes the query over one read-only component.
    pub fn for_each_read1<A, F>(self, world: &WorldRef<'_>, mut f: F) -> ECSResult<()>
    where
        A: Component,
        F: FnMut(Entity, &A),
    {
        validate_arity!(self, 1, 0);
        let a_id = self.reads[0];
        let data = world.data();

        for m in data.matching_archetypes(&self.signature) {
            let archetype = data.archetype(m.archetype_id)?;
            for (chunk_id, chunk) in archetype.chunks() {
                for row in 0..chunk.allocated() as u32 {
                    let Some(bits) = chunk.entity_bits(row) else { continue };
                    let a: A = *bytemuck::from_bytes(
                        archetype.component_bytes(chunk_id, row, a_id)?,
                    );
                    f(Entity(bits), &a);
                }
            }
        }
        Ok(())
    }

    /// Executes the query over two read-only components.
    pub fn for_each_read2<A, B, F>(self, world: &WorldRef<'_>, mut f: F) -> ECSResult<()>
    where
        A: Component,
        B: Component,
        F: FnMut(Entity, &A, &B),
    {
        validate_arity!(self, 2, 0);
        let a_id = self.reads[0];
        let b_id = self.reads[1];
        let data = world.data();

        for m in data.matching_archetypes(&self.signature) {
            let archetype = data.archetype(m.archetype_id)?;
            for (chunk_id, chunk) in archetype.chunks() {
                for row in 0..chunk.allocated() as u32 {
                    let Some(bits) = chunk.entity_bits(row) else { continue };
                    let a: A = *bytemuck::from_bytes(
                        archetype.component_bytes(chunk_id, row, a_id)?,
                    );
                    let b: B = *bytemuck::from_bytes(
                        archetype.component_bytes(chunk_id, row, b_id)?,
                    );
                    f(Entity(bits), &a, &b);
                }
            }
        }
        Ok(())
    }

    /// Executes the query over one mutable component, written in place.
    pub fn for_each_write1<A, F>(self, world: &WorldRef<'_>, mut f: F) -> ECSResult<()>
    where
        A: Component,
        F: FnMut(Entity, &mut A),
    {
        validate_arity!(self, 0, 1);
        let a_id = self.writes[0];
        let data = world.data_mut();

        for m in data.matching_archetypes(&self.signature) {
            let archetype = data.archetype_mut(m.archetype_id)?;
            for chunk_index in 0..archetype.chunk_count() {
                // Exact: archetype growth is bounded by the ChunkID range.
                let chunk_id = chunk_index as ChunkID;
                let allocated = archetype.chunk(chunk_id)?.allocated() as u32;
                for row in 0..allocated {
                    let Some(bits) = archetype.chunk(chunk_id)?.entity_bits(row) else {
                        continue;
                    };
                    let a: &mut A = bytemuck::from_bytes_mut(
                        archetype.component_bytes_mut(chunk_id, row, a_id)?,
                    );
                    f(Entity(bits), a);
                }
            }
        }
        Ok(())
    }

    /// Executes the query over one read-only and one mutable component.
    pub fn for_each_read1_write1<A, B, F>(self, world: &WorldRef<'_>, mut f: F) -> ECSResult<()>
    where
        A: Component,
        B: Component,
        F: FnMut(Entity, &A, &mut B),
    {
        validate_arity!(self, 1, 1);
        let a_id = self.reads[0];
        let b_id = self.writes[0];
        let data = world.data_mut();

        for m in data.matching_archetypes(&self.signature) {
            let archetype = data.archetype_mut(m.archetype_id)?;
            for chunk_index in 0..archetype.chunk_count() {
                // Exact: archetype growth is bounded by the ChunkID range.
                let chunk_id = chunk_index as ChunkID;
                let allocated = archetype.chunk(chunk_id)?.allocated() as u32;
                for row in 0..allocated {
                    let Some(bits) = archetype.chunk(chunk_id)?.entity_bits(row) else {
                        continue;
                    };
                    let a: A = *bytemuck::from_bytes(
                        archetype.component_bytes(chunk_id, row, a_id)?,
                    );
                    let b: &mut B = bytemuck::from_bytes_mut(
                        archetype.component_bytes_mut(chunk_id, row, b_id)?,
                    );
                    f(Entity(bits), &a, b);
                }
            }
        }
        Ok(())
    }

    /// Executes the query over two read-only components and one mutable
    /// component.
    pub fn for_each_read2_write1<A, B, C, F>(self, world: &WorldRef<'_>, mut f: F) -> ECSResult<()>
    where
        A: Component,
        B: Component,
        C: Component,
        F: FnMut(Entity, &A, &B, &mut C),
    {
        validate_arity!(self, 2, 1);
        let a_id = self.reads[0];
        let b_id = self.reads[1];
        let c_id = self.writes[0];
        let data = world.data_mut();

        for m in data.matching_archetypes(&self.signature) {
            let archetype = data.archetype_mut(m.archetype_id)?;
            for chunk_index in 0..archetype.chunk_count() {
                // Exact: archetype growth is bounded by the ChunkID range.
                let chunk_id = chunk_index as ChunkID;
                let allocated = archetype.chunk(chunk_id)?.allocated() as u32;
                for row in 0..allocated {
                    let Some(bits) = archetype.chunk(chunk_id)?.entity_bits(row) else {
                        continue;
                    };
                    let a: A = *bytemuck::from_bytes(
                        archetype.component_bytes(chunk_id, row, a_id)?,
                    );
                    let b: B = *bytemuck::from_bytes(
                        archetype.component_bytes(chunk_id, row, b_id)?,
                    );
                    let c: &mut C = bytemuck::from_bytes_mut(
                        archetype.component_bytes_mut(chunk_id, row, c_id)?,
                    );
                    f(Entity(bits), &a, &b, c);
                }
            }
        }
        Ok(())
    }
}
