//! # Command Executor
//!
//! Applies deferred structural commands to the world at synchronization
//! points, one entity batch at a time, under the per-entity lock protocol.
//!
//! ## Batching
//! The recorded stream is grouped by target entity: every command naming the
//! same entity, wherever it appears in the stream, joins that entity's batch
//! in recorded order. Within a batch:
//!
//! * duplicate inserts of one component keep the **last** payload,
//! * an insert cancels a pending remove of the same component and vice
//!   versa,
//! * a despawn discards the remainder of the batch.
//!
//! The batch reduces to a *net archetype diff* against the entity's current
//! key, so an insert-then-remove pair costs nothing and a component whose
//! affective hash changes triggers exactly one bucket migration.
//!
//! ## Locking
//! Each batch acquires a read lock on its target to inspect the current
//! location, then escalates to a write lock before mutating (upgrading in
//! place when the holder is the sole reader, otherwise releasing and
//! retrying a full write acquisition). Contention at any step drops the
//! batch for this pass with a debug log; the issuing system re-emits next
//! tick. Lock contention is never an error.
//!
//! ## Migration
//! When the net key differs from the current key, the entity's record moves:
//! a slot is taken in the destination archetype, the header and all shared
//! component bytes are copied, inserted payloads are written, and the source
//! record is zeroed and released. When the key is unchanged, payloads are
//! written in place. Records of other entities never move.

use log::debug;

use crate::engine::archetype::copy_shared_record;
use crate::engine::commands::{Command, SystemCommands};
use crate::engine::component::{component_description, Bundle};
use crate::engine::entity::{Entity, EntityLocation};
use crate::engine::error::{CommandError, ECSError, ECSResult};
use crate::engine::types::{AffectiveHash, ComponentID};
use crate::engine::world::WorldRef;

/// Net effect of one entity's command batch.
#[derive(Default)]
struct EntityBatch {
    inserts: Vec<(ComponentID, AffectiveHash, Vec<u8>)>,
    removes: Vec<ComponentID>,
    despawn: bool,
}

impl EntityBatch {
    fn insert(&mut self, component_id: ComponentID, affective: AffectiveHash, bytes: Vec<u8>) {
        if self.despawn {
            return;
        }
        self.removes.retain(|&cid| cid != component_id);
        match self
            .inserts
            .iter_mut()
            .find(|(cid, _, _)| *cid == component_id)
        {
            Some(entry) => {
                entry.1 = affective;
                entry.2 = bytes;
            }
            None => self.inserts.push((component_id, affective, bytes)),
        }
    }

    fn remove(&mut self, component_id: ComponentID) {
        if self.despawn {
            return;
        }
        self.inserts.retain(|(cid, _, _)| *cid != component_id);
        if !self.removes.contains(&component_id) {
            self.removes.push(component_id);
        }
    }
}

/// Groups a command stream into per-entity batches plus deferred spawns.
///
/// Batch order follows each entity's first appearance in the stream, keeping
/// application deterministic for a fixed recording order.
fn group_commands(
    stream: Vec<Command>,
) -> ECSResult<(Vec<(Entity, EntityBatch)>, Vec<Bundle>)> {
    let mut batches: Vec<(Entity, EntityBatch)> = Vec::new();
    let mut spawns = Vec::new();
    let mut current: Option<usize> = None;

    for command in stream {
        match command {
            Command::GetEntity { entity } => {
                let index = match batches.iter().position(|(e, _)| *e == entity) {
                    Some(i) => i,
                    None => {
                        batches.push((entity, EntityBatch::default()));
                        batches.len() - 1
                    }
                };
                current = Some(index);
            }
            Command::Insert { component_id, affective, bytes } => {
                let Some(index) = current else {
                    return Err(ECSError::Internal(
                        "insert command without a target entity".into(),
                    ));
                };
                batches[index].1.insert(component_id, affective, bytes);
            }
            Command::Remove { component_id } => {
                let Some(index) = current else {
                    return Err(ECSError::Internal(
                        "remove command without a target entity".into(),
                    ));
                };
                batches[index].1.remove(component_id);
            }
            Command::Despawn => {
                let Some(index) = current else {
                    return Err(ECSError::Internal(
                        "despawn command without a target entity".into(),
                    ));
                };
                batches[index].1.despawn = true;
            }
            Command::Spawn { bundle } => spawns.push(bundle),
        }
    }
    Ok((batches, spawns))
}

/// Validates insert payload sizes against the registry.
fn validate_payloads(batch: &EntityBatch) -> ECSResult<()> {
    for (component_id, _, bytes) in &batch.inserts {
        let desc = component_description(*component_id)?;
        if desc.size != bytes.len() {
            return Err(CommandError::PayloadSizeMismatch {
                component_id: *component_id,
                expected: desc.size,
                actual: bytes.len(),
            }
            .into());
        }
    }
    Ok(())
}

/// Acquires a write lock on `entity`, starting from a held read lock.
///
/// Returns `false` if contention prevents escalation; the read lock is
/// released either way.
fn escalate_to_write(world: &WorldRef<'_>, entity: Entity) -> bool {
    let locker = world.data().locker();
    if locker.try_upgrade(entity) {
        return true;
    }
    locker.unlock_entity(entity, false);
    // One retry as a fresh writer; other readers may have drained.
    locker.try_lock_entity(entity, true)
}

/// Applies one entity's net batch under a held write lock.
fn apply_batch(world: &WorldRef<'_>, entity: Entity, batch: &EntityBatch) -> ECSResult<()> {
    let data = world.data_mut();
    let Some(location) = data.entities().get_location(entity) else {
        debug!("dropping command batch for stale entity {:?}", entity);
        return Ok(());
    };

    if batch.despawn {
        return data.despawn(entity);
    }

    let source_id = location.archetype;
    let old_key = data.archetype(source_id)?.key().clone();
    let mut new_key = old_key.clone();
    for &component_id in &batch.removes {
        new_key = new_key.without_entry(component_id);
    }
    for &(component_id, affective, _) in &batch.inserts {
        new_key = new_key.with_entry(component_id, affective);
    }

    if new_key.is_empty() {
        // Removing the last component despawns the entity.
        return data.despawn(entity);
    }

    if new_key == old_key {
        let archetype = data.archetype_mut(source_id)?;
        for (component_id, _, bytes) in &batch.inserts {
            archetype
                .component_bytes_mut(location.chunk, location.row, *component_id)?
                .copy_from_slice(bytes);
        }
        return Ok(());
    }

    let destination_id = data.get_or_create_archetype(&new_key)?;
    let destination_slot = data.archetype_mut(destination_id)?.take_record();

    {
        let (source, destination) = data.archetype_pair_mut(source_id, destination_id);
        copy_shared_record(
            source,
            (location.chunk, location.row),
            destination,
            destination_slot,
        )?;
    }

    let destination = data.archetype_mut(destination_id)?;
    for (component_id, _, bytes) in &batch.inserts {
        destination
            .component_bytes_mut(destination_slot.0, destination_slot.1, *component_id)?
            .copy_from_slice(bytes);
    }

    data.archetype_mut(source_id)?
        .release_record(location.chunk, location.row)?;
    data.entities_mut().set_location(
        entity,
        EntityLocation {
            archetype: destination_id,
            chunk: destination_slot.0,
            row: destination_slot.1,
        },
    );
    Ok(())
}

/// Applies a buffer of deferred commands to the world.
///
/// ## Behavior
/// Entity batches apply first, in first-appearance order, each under the
/// lock protocol described in the module docs; deferred spawns apply last.
///
/// ## Errors
/// Storage and registry failures abort application. Lock contention and
/// stale targets are not errors; those batches are skipped.
pub fn apply_commands(world: &WorldRef<'_>, commands: &mut SystemCommands) -> ECSResult<()> {
    let (batches, spawns) = group_commands(commands.take())?;

    for (entity, batch) in &batches {
        validate_payloads(batch)?;

        if !world.data().locker().try_lock_entity(*entity, false) {
            debug!("dropping contended command batch for entity {:?}", entity);
            continue;
        }

        if world.data().entities().get_location(*entity).is_none() {
            world.data().locker().unlock_entity(*entity, false);
            debug!("dropping command batch for stale entity {:?}", entity);
            continue;
        }

        if !escalate_to_write(world, *entity) {
            debug!(
                "dropping command batch for entity {:?}: write escalation contended",
                entity
            );
            continue;
        }

        let result = apply_batch(world, *entity, batch);
        world.data().locker().unlock_entity(*entity, true);
        result?;
    }

    for bundle in spawns {
        world.data_mut().spawn(bundle)?;
    }
    Ok(())
}
