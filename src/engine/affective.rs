//! Affective bucketing of systems.
//!
//! An *affective hash* is a coarse semantic equality over a component's
//! value. Components whose hash differs land in different archetypes even
//! when the component set is identical, so entities are physically grouped
//! by bucket ("bucket-per-archetype").
//!
//! [`AffectiveSystem`] rides on that grouping to select logic dynamically:
//! it maintains one child system per distinct bucket hash observed in the
//! world, created lazily from a factory and retired when the bucket empties.
//! Children execute sequentially inside the parent's scheduled slot, in
//! ascending hash order, so a single conflict-graph node covers the whole
//! family.
//!
//! After the children run, the parent rescans the bucketing component: any
//! entity whose current value no longer hashes to the bucket its archetype
//! key records is re-inserted through the command buffer, which migrates it
//! to the correct bucket at the next synchronization point. A bucket swap is
//! therefore visible to child systems one pass after the value changes.
//!
//! ## Access declaration
//!
//! The parent's declared [`AccessSets`] must cover read access to the
//! bucketing component plus everything its children touch; children execute
//! under the parent's declaration, and the debug-only shadow check in the
//! query layer asserts coverage of every child query.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Mutex;

use log::{debug, trace};

use crate::engine::commands::SystemCommands;
use crate::engine::component::{component_id_of, AffectiveComponent};
use crate::engine::entity::Entity;
use crate::engine::error::{ECSError, ECSResult};
use crate::engine::systems::System;
use crate::engine::types::{set_required, AccessSets, AffectiveHash, QuerySignature};
use crate::engine::world::WorldRef;

type ChildFactory = Box<dyn Fn(AffectiveHash) -> Box<dyn System> + Send + Sync>;

/// A system family with one child per affective bucket of component `T`.
///
/// ## Example
/// ```ignore
/// let system = AffectiveSystem::<Mood>::new("mood_family", access, |bucket| {
///     SystemBuilder::new("mood_bucket")
///         .affective::<Mood>(bucket)?
///         .each_write1::<Payload, _>(move |_entity, payload, _commands| {
///             payload.value = bucket as i32;
///         })?
///         .build()
/// });
/// ```
pub struct AffectiveSystem<T: AffectiveComponent> {
    name: &'static str,
    access: AccessSets,
    factory: ChildFactory,
    /// Live children keyed by bucket hash; `BTreeMap` fixes execution order.
    children: Mutex<BTreeMap<AffectiveHash, Box<dyn System>>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: AffectiveComponent> AffectiveSystem<T> {
    /// Creates the family.
    ///
    /// `factory` builds the child system for a bucket hash; it typically
    /// pins the bucket with an affective query constraint so each child only
    /// sees its own entities.
    pub fn new<F>(name: &'static str, access: AccessSets, factory: F) -> Self
    where
        F: Fn(AffectiveHash) -> Box<dyn System> + Send + Sync + 'static,
    {
        Self {
            name,
            access,
            factory: Box::new(factory),
            children: Mutex::new(BTreeMap::new()),
            _marker: PhantomData,
        }
    }

    fn bucket_signature() -> ECSResult<QuerySignature> {
        let mut signature = QuerySignature::default();
        set_required::<T>(&mut signature)?;
        Ok(signature)
    }

    /// Counts live entities per bucket of `T` across matching archetypes.
    fn live_buckets(world: &WorldRef<'_>) -> ECSResult<BTreeMap<AffectiveHash, usize>> {
        let component_id = component_id_of::<T>()?;
        let signature = Self::bucket_signature()?;
        let data = world.data();

        let mut buckets: BTreeMap<AffectiveHash, usize> = BTreeMap::new();
        for m in data.matching_archetypes(&signature) {
            let archetype = data.archetype(m.archetype_id)?;
            if let Some(bucket) = archetype.key().affective_of(component_id) {
                *buckets.entry(bucket).or_default() += archetype.live();
            }
        }
        Ok(buckets)
    }

    /// Re-inserts entities whose component value hashes outside their
    /// archetype's recorded bucket.
    fn rescan_buckets(
        &self,
        world: &WorldRef<'_>,
        commands: &mut SystemCommands,
    ) -> ECSResult<()> {
        let component_id = component_id_of::<T>()?;
        let signature = Self::bucket_signature()?;
        let data = world.data();

        for m in data.matching_archetypes(&signature) {
            let archetype = data.archetype(m.archetype_id)?;
            let Some(recorded) = archetype.key().affective_of(component_id) else {
                continue;
            };
            for (chunk_id, chunk) in archetype.chunks() {
                for row in 0..chunk.allocated() as u32 {
                    let Some(bits) = chunk.entity_bits(row) else { continue };
                    let value: T = *bytemuck::from_bytes(
                        archetype.component_bytes(chunk_id, row, component_id)?,
                    );
                    if value.affective_hash() != recorded {
                        trace!(
                            "rebucketing entity {} from bucket {:#x}",
                            bits, recorded
                        );
                        commands.get_entity(Entity(bits)).insert(value)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl<T: AffectiveComponent> System for AffectiveSystem<T> {
    fn name(&self) -> &str {
        self.name
    }

    fn access(&self) -> AccessSets {
        self.access
    }

    /// Runs every live bucket's child sequentially, then rescans for bucket
    /// drift.
    ///
    /// ## Behavior
    /// 1. Missing children for live buckets are created from the factory
    ///    (and initialized); children whose bucket emptied are retired.
    /// 2. Children run in ascending bucket-hash order, sharing the parent's
    ///    command buffer.
    /// 3. Entities whose value hash disagrees with their archetype's bucket
    ///    are re-inserted via commands, migrating at the next sync point.
    fn run(&self, world: &WorldRef<'_>, commands: &mut SystemCommands) -> ECSResult<()> {
        let buckets = Self::live_buckets(world)?;

        let mut children = self
            .children
            .lock()
            .map_err(|_| ECSError::Internal(format!("{}: child table poisoned", self.name)))?;

        children.retain(|bucket, _| buckets.get(bucket).is_some_and(|&live| live > 0));
        for (&bucket, &live) in &buckets {
            if live == 0 || children.contains_key(&bucket) {
                continue;
            }
            let child = (self.factory)(bucket);
            debug!(
                "{}: creating child {} for bucket {:#x}",
                self.name,
                child.name(),
                bucket
            );
            child.on_initialize(world)?;
            children.insert(bucket, child);
        }

        for child in children.values() {
            child.on_update(world, commands)?;
            child.run(world, commands)?;
            child.on_late_update(world, commands)?;
        }
        drop(children);

        self.rescan_buckets(world, commands)
    }
}
