//! # Component Contract and Registry
//!
//! This module provides the component trait contract and a global registry
//! that assigns stable `ComponentID` values to Rust component types.
//!
//! ## Purpose
//! The registry decouples component type information (`TypeId`, name, size,
//! alignment) from runtime storage, enabling archetypes to compute record
//! layouts and move component bytes without knowing concrete types.
//!
//! ## Design
//! - Components are plain-old-data ([`bytemuck::Pod`]): fixed layout, no
//!   destructors, safely copyable as raw bytes between records.
//! - Components are registered once and assigned a compact `ComponentID` in
//!   `[0, COMPONENT_CAP)`.
//! - The registry is `freeze()`d after setup; worlds require a frozen
//!   registry so record layouts are complete and stable.
//!
//! ## Invariants
//! - `ComponentID` values are unique and stable for the lifetime of the
//!   process.
//! - Registered components have alignment at most [`RECORD_ALIGN`]; larger
//!   alignments are rejected at registration.
//! - When frozen, registration is disallowed.
//!
//! ## Concurrency
//! The registry is protected by `RwLock` for concurrent reads and serialized
//! writes.

use std::{
    any::{type_name, TypeId},
    collections::HashMap,
    mem::{align_of, size_of},
    sync::{OnceLock, RwLock},
};

use bytemuck::Pod;

use crate::engine::error::{ECSError, ECSResult, RegistryError};
use crate::engine::types::{
    AffectiveHash, ArchetypeKey, ComponentID, AFFECTIVE_NONE, COMPONENT_CAP, RECORD_ALIGN,
};

/// Contract for component types stored in entity records.
///
/// ## Purpose
/// Components are fixed-layout value types copied byte-for-byte between
/// records during spawning and archetype migration. The [`Pod`] bound makes
/// those copies sound.
///
/// ## Behavior
/// `affective_hash` reports the coarse bucketing hash of a component value.
/// Plain components report [`AFFECTIVE_NONE`]; bucketing components override
/// this to place entities into per-value-class archetypes.
pub trait Component: Pod + Send + Sync + 'static {
    /// Returns the bucketing hash of this component value.
    fn affective_hash(&self) -> AffectiveHash {
        AFFECTIVE_NONE
    }
}

/// Contract for components that participate in affective bucketing.
///
/// ## Purpose
/// A bucketing component maps its value into a small set of hash classes.
/// The hash rides the archetype key, so entities whose component values fall
/// into different classes live in different archetypes and can be processed
/// by different child systems.
///
/// ## Invariants
/// - `affective_hash` must never return [`AFFECTIVE_NONE`] for a value meant
///   to occupy a bucket.
/// - `affective_eq` must be consistent with `affective_hash`: equal buckets
///   hash identically.
pub trait AffectiveComponent: Component {
    /// Returns `true` if both values fall into the same bucket.
    fn affective_eq(&self, other: &Self) -> bool {
        self.affective_hash() == other.affective_hash()
    }
}

/// Global mapping between Rust component types and compact `ComponentID`
/// values.
///
/// ## Design
/// - `by_type` maps `TypeId -> ComponentID`.
/// - `by_id` stores `ComponentDesc` indexed by `ComponentID`.
/// - `next_id` assigns new IDs sequentially until `COMPONENT_CAP`.
/// - `frozen` prevents further registration once the ECS is initialized.
///
/// ## Invariants
/// - Every entry in `by_type` has a matching `by_id[id]`.
/// - IDs are always in bounds of `COMPONENT_CAP`.
pub struct ComponentRegistry {
    next_id: ComponentID,
    by_type: HashMap<TypeId, ComponentID>,
    by_id: Vec<Option<ComponentDesc>>,
    frozen: bool,
}

static REGISTRY: OnceLock<RwLock<ComponentRegistry>> = OnceLock::new();

fn component_registry() -> &'static RwLock<ComponentRegistry> {
    REGISTRY.get_or_init(|| {
        RwLock::new(ComponentRegistry {
            next_id: 0 as ComponentID,
            by_type: HashMap::new(),
            by_id: vec![None; COMPONENT_CAP],
            frozen: false,
        })
    })
}

fn registry_read() -> ECSResult<std::sync::RwLockReadGuard<'static, ComponentRegistry>> {
    component_registry()
        .read()
        .map_err(|_| ECSError::Internal("component registry lock poisoned".into()))
}

fn registry_write() -> ECSResult<std::sync::RwLockWriteGuard<'static, ComponentRegistry>> {
    component_registry()
        .write()
        .map_err(|_| ECSError::Internal("component registry lock poisoned".into()))
}

impl ComponentRegistry {
    /// Registers component type `T` and returns its assigned `ComponentID`.
    ///
    /// ## Behavior
    /// - If `T` is already registered, returns the existing ID.
    /// - Otherwise validates the layout contract and allocates a new ID.
    ///
    /// ## Errors
    /// - [`RegistryError::Frozen`] if registration happens after `freeze`.
    /// - [`RegistryError::Capacity`] if `COMPONENT_CAP` is exceeded.
    /// - [`RegistryError::UnsupportedAlignment`] if `align_of::<T>()` exceeds
    ///   [`RECORD_ALIGN`].
    pub fn register<T: Component>(&mut self) -> Result<ComponentID, RegistryError> {
        let type_id = TypeId::of::<T>();
        if let Some(&existing) = self.by_type.get(&type_id) {
            return Ok(existing);
        }

        if self.frozen {
            return Err(RegistryError::Frozen);
        }
        if align_of::<T>() > RECORD_ALIGN {
            return Err(RegistryError::UnsupportedAlignment {
                name: type_name::<T>(),
                align: align_of::<T>(),
                max_align: RECORD_ALIGN,
            });
        }
        if (self.next_id as usize) >= COMPONENT_CAP {
            return Err(RegistryError::Capacity { capacity: COMPONENT_CAP });
        }

        let id = self.next_id;
        self.next_id = id.wrapping_add(1);
        self.by_type.insert(type_id, id);
        self.by_id[id as usize] = Some(ComponentDesc::of::<T>().with_id(id));
        Ok(id)
    }

    /// Freezes the registry, preventing further component registrations.
    ///
    /// ## Purpose
    /// Locks component identity and record layout inputs so archetypes can
    /// assume IDs are complete and stable.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Returns `true` if the registry has been frozen.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Returns the `ComponentID` associated with a `TypeId`, if registered.
    pub fn component_id_of_type_id(&self, type_id: TypeId) -> Option<ComponentID> {
        self.by_type.get(&type_id).copied()
    }

    /// Returns the `ComponentID` for `T`, if registered.
    pub fn id_of<T: 'static>(&self) -> Option<ComponentID> {
        self.component_id_of_type_id(TypeId::of::<T>())
    }

    /// Returns the component descriptor for a `ComponentID`, if registered.
    pub fn description_by_component_id(&self, component_id: ComponentID) -> Option<&ComponentDesc> {
        self.by_id.get(component_id as usize).and_then(|o| o.as_ref())
    }
}

/// Registers component type `T` in the global registry and returns its
/// `ComponentID`.
///
/// ## Errors
/// See [`ComponentRegistry::register`].
pub fn register_component<T: Component>() -> ECSResult<ComponentID> {
    Ok(registry_write()?.register::<T>()?)
}

/// Freezes the global component registry.
///
/// ## Purpose
/// Prevents any further component registration, making component IDs and
/// record layouts stable for archetype construction.
pub fn freeze_components() -> ECSResult<()> {
    registry_write()?.freeze();
    Ok(())
}

/// Returns `true` if the global registry has been frozen.
pub fn components_frozen() -> ECSResult<bool> {
    Ok(registry_read()?.is_frozen())
}

/// Returns the registered `ComponentID` for type `T`.
///
/// ## Errors
/// Returns [`RegistryError::Unregistered`] if `T` was never registered.
pub fn component_id_of<T: 'static>() -> ECSResult<ComponentID> {
    registry_read()?
        .id_of::<T>()
        .ok_or_else(|| RegistryError::Unregistered { name: type_name::<T>() }.into())
}

/// Returns the `ComponentID` associated with a runtime `TypeId`, if registered.
pub fn component_id_of_type_id(type_id: TypeId) -> ECSResult<Option<ComponentID>> {
    Ok(registry_read()?.component_id_of_type_id(type_id))
}

/// Returns a copy of the descriptor for `component_id`.
///
/// ## Errors
/// Returns [`RegistryError::Unregistered`] if no component carries this ID.
pub fn component_description(component_id: ComponentID) -> ECSResult<ComponentDesc> {
    registry_read()?
        .description_by_component_id(component_id)
        .copied()
        .ok_or_else(|| RegistryError::Unregistered { name: "<unknown component id>" }.into())
}

/// Describes a registered component type.
///
/// ## Purpose
/// Provides the layout metadata archetypes use to compute record offsets,
/// plus names and type IDs for diagnostics and validation.
///
/// ## Notes
/// `ComponentDesc` is `Copy` and safe to clone freely for reporting.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ComponentDesc {
    /// Runtime identifier assigned to this component type.
    pub component_id: ComponentID,

    /// Rust type name for diagnostics.
    pub name: &'static str,

    /// Runtime `TypeId` of the component.
    pub type_id: TypeId,

    /// Size of the component type in bytes.
    pub size: usize,

    /// Alignment of the component type in bytes.
    pub align: usize,
}

impl ComponentDesc {
    /// Constructs a descriptor for type `T` using its `TypeId`, name, size,
    /// and alignment.
    ///
    /// ## Notes
    /// The returned descriptor uses `component_id = 0` and should be
    /// finalized via `with_id`.
    #[inline]
    pub fn of<T: 'static>() -> Self {
        Self {
            component_id: 0,
            name: type_name::<T>(),
            type_id: TypeId::of::<T>(),
            size: size_of::<T>(),
            align: align_of::<T>(),
        }
    }

    /// Returns a copy of this descriptor with `component_id` set.
    #[inline]
    pub fn with_id(mut self, component_id: ComponentID) -> Self {
        self.component_id = component_id;
        self
    }
}

impl std::fmt::Display for ComponentDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ComponentDesc {{ id: {}, name: {}, size: {}, align: {} }}",
            self.component_id, self.name, self.size, self.align
        )
    }
}

/// An ordered collection of component values used for spawning.
///
/// ## Behavior
/// Values are stored as raw bytes tagged with their component ID and
/// affective hash. Inserting the same component type twice replaces the
/// earlier value (last insert wins), mirroring deferred command semantics.
#[derive(Default)]
pub struct Bundle {
    entries: Vec<BundleEntry>,
}

pub(crate) struct BundleEntry {
    pub component_id: ComponentID,
    pub affective: AffectiveHash,
    pub bytes: Vec<u8>,
}

impl Bundle {
    /// Creates an empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts component `value`, replacing any earlier value of the same
    /// type.
    ///
    /// ## Errors
    /// Returns [`RegistryError::Unregistered`] if `T` was never registered.
    pub fn insert<T: Component>(&mut self, value: T) -> ECSResult<&mut Self> {
        let component_id = component_id_of::<T>()?;
        let affective = value.affective_hash();
        let bytes = bytemuck::bytes_of(&value).to_vec();
        match self.entries.iter_mut().find(|e| e.component_id == component_id) {
            Some(entry) => {
                entry.affective = affective;
                entry.bytes = bytes;
            }
            None => self.entries.push(BundleEntry { component_id, affective, bytes }),
        }
        Ok(self)
    }

    /// Builder-style variant of [`Bundle::insert`].
    pub fn with<T: Component>(mut self, value: T) -> ECSResult<Self> {
        self.insert(value)?;
        Ok(self)
    }

    /// Returns the number of distinct component types in the bundle.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the bundle contains no components.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Derives the canonical archetype key for this bundle.
    pub fn key(&self) -> ArchetypeKey {
        ArchetypeKey::from_entries(self.entries.iter().map(|e| (e.component_id, e.affective)))
    }

    pub(crate) fn entries(&self) -> &[BundleEntry] {
        &self.entries
    }
}
