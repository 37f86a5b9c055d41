//! # Per-Entity Lock Protocol
//!
//! This module implements a **per-entity read/write lock table** used by the
//! command executor to serialize structural mutation against concurrent
//! readers of the same entity.
//!
//! ## Purpose
//!
//! Deferred command application runs at sync points, but direct accessors and
//! diagnostics may still touch entities concurrently. The locker enforces
//! Rust-like borrowing rules at runtime, per entity:
//!
//! - Multiple holders may **read** the same entity concurrently.
//! - Only one holder may **write** an entity at a time.
//! - No holder may read an entity while another writes it.
//!
//! ## State Encoding
//!
//! Each entity maps to one `AtomicUsize` with the following meaning:
//!
//! | State | Meaning |
//! |------:|--------|
//! | `0` | Unlocked |
//! | `1` | Write-locked (exclusive writer) |
//! | `>= 2` | Read-locked (`state - 1` active readers) |
//!
//! ## Synchronization Strategy
//!
//! All acquisition is **non-blocking**: a contended entity fails the attempt
//! instead of spinning. The executor responds by dropping the command batch
//! for the current pass; the issuing system re-emits next tick.
//!
//! Entities are mapped onto a fixed table of lock stripes by index. Two
//! entities sharing a stripe contend spuriously; this only defers a batch and
//! never compromises exclusion.
//!
//! ## RAII Integration
//!
//! [`EntityLockGuard`] provides all-or-nothing acquisition of a lock set with
//! automatic release on drop.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::engine::entity::Entity;

/// Number of lock stripes in the table.
const LOCK_STRIPES: usize = 4096;

/// Tracks runtime read/write locks for entities.
pub struct EntityLocker {
    /// Per-stripe atomic lock state.
    states: Box<[AtomicUsize]>,
}

impl Default for EntityLocker {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityLocker {
    /// Creates a locker with all entities unlocked.
    pub fn new() -> Self {
        let mut states = Vec::with_capacity(LOCK_STRIPES);
        states.resize_with(LOCK_STRIPES, || AtomicUsize::new(0));
        Self { states: states.into_boxed_slice() }
    }

    #[inline]
    fn state_of(&self, entity: Entity) -> &AtomicUsize {
        &self.states[entity.index() as usize % LOCK_STRIPES]
    }

    /// Attempts to acquire a lock on one entity without blocking.
    ///
    /// ## Behavior
    /// - `write = true`: succeeds only from the unlocked state (`0 → 1`).
    /// - `write = false`: succeeds unless write-locked (`0 → 2`,
    ///   `n → n + 1`).
    ///
    /// Returns `false` on contention; never spins on a holder.
    pub fn try_lock_entity(&self, entity: Entity, write: bool) -> bool {
        let state = self.state_of(entity);
        loop {
            let current = state.load(Ordering::Acquire);
            let next = if write {
                if current != 0 {
                    return false;
                }
                1
            } else {
                if current == 1 {
                    return false;
                }
                if current == 0 { 2 } else { current + 1 }
            };
            // Retry only on CAS races, not on observed holders.
            if state
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Releases a previously acquired lock.
    ///
    /// ## Safety
    /// Assumes a matching successful `try_lock_entity` call with the same
    /// `write` flag.
    pub fn unlock_entity(&self, entity: Entity, write: bool) {
        let state = self.state_of(entity);
        if write {
            let previous = state.swap(0, Ordering::AcqRel);
            debug_assert!(previous == 1);
        } else {
            let previous = state.fetch_sub(1, Ordering::AcqRel);
            debug_assert!(previous >= 2);
            if previous == 2 {
                state.store(0, Ordering::Release);
            }
        }
    }

    /// Attempts to upgrade a held read lock to a write lock.
    ///
    /// Succeeds only when the caller is the sole reader (`2 → 1`). On
    /// failure the read lock is still held.
    pub fn try_upgrade(&self, entity: Entity) -> bool {
        self.state_of(entity)
            .compare_exchange(2, 1, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    /// Attempts to acquire a set of locks, all or nothing.
    ///
    /// ## Behavior
    /// Locks are attempted in entity order; on the first failure every lock
    /// acquired so far is rolled back and `false` is returned. Duplicate
    /// entities in the set must be pre-merged by the caller.
    pub fn try_lock_entities(&self, requests: &[(Entity, bool)]) -> bool {
        let mut ordered = requests.to_vec();
        ordered.sort_unstable_by_key(|(entity, _)| *entity);

        for (held, &(entity, write)) in ordered.iter().enumerate() {
            if !self.try_lock_entity(entity, write) {
                for &(locked, locked_write) in &ordered[..held] {
                    self.unlock_entity(locked, locked_write);
                }
                return false;
            }
        }
        true
    }

    /// Releases a set of locks previously acquired with
    /// [`EntityLocker::try_lock_entities`].
    pub fn unlock_entities(&self, requests: &[(Entity, bool)]) {
        for &(entity, write) in requests {
            self.unlock_entity(entity, write);
        }
    }
}

/// RAII guard holding a set of entity locks.
///
/// When dropped, all locks are released automatically.
pub struct EntityLockGuard<'a> {
    locker: &'a EntityLocker,
    locks: Vec<(Entity, bool)>,
}

impl<'a> EntityLockGuard<'a> {
    /// Attempts to acquire all requested locks, returning `None` on
    /// contention.
    pub fn try_new(locker: &'a EntityLocker, requests: &[(Entity, bool)]) -> Option<Self> {
        if !locker.try_lock_entities(requests) {
            return None;
        }
        Some(Self { locker, locks: requests.to_vec() })
    }
}

impl Drop for EntityLockGuard<'_> {
    fn drop(&mut self) {
        self.locker.unlock_entities(&self.locks);
    }
}
