//! ECS System Abstractions
//!
//! This module defines the core *system execution model* used by the
//! scheduling core.
//!
//! A **system** is a unit of logic that operates over the ECS world.
//! Systems:
//! - declare which components they read and write,
//! - are scheduled based on access conflicts and explicit dependencies,
//! - may be executed sequentially or in parallel,
//! - operate through a controlled [`WorldRef`] rather than direct world
//!   access,
//! - record structural changes into a [`SystemCommands`] buffer instead of
//!   mutating structure directly.
//!
//! ## Design Goals
//!
//! - **Enable safe parallelism** by statically declaring component access
//!   (`read` / `write`) via [`AccessSets`].
//! - **Decouple logic from storage** so systems operate on *views* of the
//!   world rather than concrete data layouts.
//! - **Support lightweight system definitions** through the capability
//!   builder ([`SystemBuilder`]) and function-backed systems ([`FnSystem`])
//!   without requiring boilerplate types for every system.
//!
//! ## Lifecycle
//!
//! Each scheduled pass invokes, in order: [`System::on_update`],
//! [`System::run`], [`System::on_late_update`]. [`System::on_initialize`]
//! runs once when the system is added to a scheduler.
//!
//! ## Capability builder
//!
//! [`SystemBuilder`] replaces wide generic system signatures with explicit
//! capability declarations: filters and access are declared one call at a
//! time, and the per-entity closure is attached through an arity-specific
//! `each_*` method. Declare filters (`without`, `affective`) **before**
//! attaching the closure; the closure captures the query shape at attachment
//! time.
//!
//! ## Thread Safety
//!
//! Systems must be `Send + Sync` so they can be scheduled and executed in
//! parallel across threads.

use crate::engine::commands::SystemCommands;
use crate::engine::component::{component_id_of, Component};
use crate::engine::entity::Entity;
use crate::engine::error::{ECSResult, QueryError};
use crate::engine::query::QueryBuilder;
use crate::engine::types::{
    set_read, set_required, set_without, set_write, AccessSets, AffectiveHash, ComponentID,
    QuerySignature,
};
use crate::engine::world::WorldRef;

/// A unit of executable logic operating on the ECS world.
///
/// Systems must be `Send + Sync` so they can be scheduled and executed in
/// parallel across threads.
pub trait System: Send + Sync {
    /// Returns the human-readable name of this system.
    fn name(&self) -> &str;

    /// Returns the component access sets required by this system.
    fn access(&self) -> AccessSets;

    /// Called once when the system is registered with a scheduler.
    fn on_initialize(&self, _world: &WorldRef<'_>) -> ECSResult<()> {
        Ok(())
    }

    /// Called before [`System::run`] on every scheduled pass.
    fn on_update(&self, _world: &WorldRef<'_>, _commands: &mut SystemCommands) -> ECSResult<()> {
        Ok(())
    }

    /// Executes the system logic against the ECS world.
    fn run(&self, world: &WorldRef<'_>, commands: &mut SystemCommands) -> ECSResult<()>;

    /// Called after [`System::run`] on every scheduled pass.
    fn on_late_update(
        &self,
        _world: &WorldRef<'_>,
        _commands: &mut SystemCommands,
    ) -> ECSResult<()> {
        Ok(())
    }
}

/// A concrete [`System`] backed by a function or closure.
///
/// `FnSystem` allows systems to be defined inline using a function or
/// closure, without requiring a custom system type. The declared access sets
/// must cover everything the body touches; the debug-only shadow check in
/// the query layer asserts this during development.
pub struct FnSystem<F>
where
    F: Fn(&WorldRef<'_>, &mut SystemCommands) -> ECSResult<()> + Send + Sync + 'static,
{
    name: &'static str,
    access: AccessSets,
    f: F,
}

impl<F> FnSystem<F>
where
    F: Fn(&WorldRef<'_>, &mut SystemCommands) -> ECSResult<()> + Send + Sync + 'static,
{
    /// Creates a new function-backed system.
    ///
    /// # Parameters
    /// - `name`: Human-readable name, useful for debugging and logs.
    /// - `access`: Declared component access used for scheduling.
    /// - `f`: The function or closure executed when the system runs.
    pub fn new(name: &'static str, access: AccessSets, f: F) -> Self {
        Self { name, access, f }
    }
}

impl<F> System for FnSystem<F>
where
    F: Fn(&WorldRef<'_>, &mut SystemCommands) -> ECSResult<()> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        self.name
    }

    fn access(&self) -> AccessSets {
        self.access
    }

    fn run(&self, world: &WorldRef<'_>, commands: &mut SystemCommands) -> ECSResult<()> {
        (self.f)(world, commands)
    }
}

type HookFn = Box<dyn Fn(&WorldRef<'_>, &mut SystemCommands) -> ECSResult<()> + Send + Sync>;
type BodyFn =
    Box<dyn Fn(QueryBuilder, &WorldRef<'_>, &mut SystemCommands) -> ECSResult<()> + Send + Sync>;

/// Capability builder for systems.
///
/// ## Example
/// ```ignore
/// let system = SystemBuilder::new("integrate")
///     .without::<Frozen>()?
///     .each_read1_write1::<Velocity, Position, _>(|_entity, vel, pos, _commands| {
///         pos.x += vel.dx;
///         pos.y += vel.dy;
///     })?
///     .build();
/// ```
pub struct SystemBuilder {
    name: &'static str,
    signature: QuerySignature,
    reads: Vec<ComponentID>,
    writes: Vec<ComponentID>,
    pre: Option<HookFn>,
    body: Option<BodyFn>,
    post: Option<HookFn>,
}

impl SystemBuilder {
    /// Starts a builder for a system called `name`.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            signature: QuerySignature::default(),
            reads: Vec::new(),
            writes: Vec::new(),
            pre: None,
            body: None,
            post: None,
        }
    }

    fn declare_read<T: Component>(&mut self) -> ECSResult<()> {
        let component_id = component_id_of::<T>()?;
        if self.writes.contains(&component_id) {
            return Err(QueryError::ConflictingAccess { component_id }.into());
        }
        set_read::<T>(&mut self.signature)?;
        self.reads.push(component_id);
        Ok(())
    }

    fn declare_write<T: Component>(&mut self) -> ECSResult<()> {
        let component_id = component_id_of::<T>()?;
        if self.reads.contains(&component_id) {
            return Err(QueryError::ConflictingAccess { component_id }.into());
        }
        set_write::<T>(&mut self.signature)?;
        self.writes.push(component_id);
        Ok(())
    }

    /// Declares read access to `T` without attaching a typed closure.
    ///
    /// Used together with [`SystemBuilder::raw`] when the body drives its
    /// own queries.
    pub fn reads<T: Component>(mut self) -> ECSResult<Self> {
        self.declare_read::<T>()?;
        Ok(self)
    }

    /// Declares write access to `T` without attaching a typed closure.
    pub fn writes<T: Component>(mut self) -> ECSResult<Self> {
        self.declare_write::<T>()?;
        Ok(self)
    }

    /// Requires `T` to be present on matched entities without declaring
    /// access.
    pub fn require<T: Component>(mut self) -> ECSResult<Self> {
        set_required::<T>(&mut self.signature)?;
        Ok(self)
    }

    /// Excludes entities carrying `T`.
    pub fn without<T: Component>(mut self) -> ECSResult<Self> {
        set_without::<T>(&mut self.signature)?;
        Ok(self)
    }

    /// Pins `T` to a specific affective bucket.
    pub fn affective<T: Component>(mut self, affective: AffectiveHash) -> ECSResult<Self> {
        let component_id = component_id_of::<T>()?;
        set_required::<T>(&mut self.signature)?;
        self.signature.affective.push((component_id, affective));
        Ok(self)
    }

    /// Attaches a hook that runs before the system body on every pass.
    pub fn pre<F>(mut self, f: F) -> Self
    where
        F: Fn(&WorldRef<'_>, &mut SystemCommands) -> ECSResult<()> + Send + Sync + 'static,
    {
        self.pre = Some(Box::new(f));
        self
    }

    /// Attaches a hook that runs after the system body on every pass.
    pub fn post<F>(mut self, f: F) -> Self
    where
        F: Fn(&WorldRef<'_>, &mut SystemCommands) -> ECSResult<()> + Send + Sync + 'static,
    {
        self.post = Some(Box::new(f));
        self
    }

    /// Attaches a raw body receiving the world and command buffer directly.
    ///
    /// Access must have been declared via [`SystemBuilder::reads`] and
    /// [`SystemBuilder::writes`].
    pub fn raw<F>(mut self, f: F) -> Self
    where
        F: Fn(&WorldRef<'_>, &mut SystemCommands) -> ECSResult<()> + Send + Sync + 'static,
    {
        self.body = Some(Box::new(move |_query, world, commands| f(world, commands)));
        self
    }

    /// Attaches a per-entity closure over one read-only component.
    pub fn each_read1<A, F>(mut self, f: F) -> ECSResult<Self>
    where
        A: Component,
        F: Fn(Entity, &A, &mut SystemCommands) + Send + Sync + 'static,
    {
        self.declare_read::<A>()?;
        self.body = Some(Box::new(move |query, world, commands| {
            query.for_each_read1::<A, _>(world, |entity, a| f(entity, a, commands))
        }));
        Ok(self)
    }

    /// Attaches a per-entity closure over two read-only components.
    pub fn each_read2<A, B, F>(mut self, f: F) -> ECSResult<Self>
    where
        A: Component,
        B: Component,
        F: Fn(Entity, &A, &B, &mut SystemCommands) + Send + Sync + 'static,
    {
        self.declare_read::<A>()?;
        self.declare_read::<B>()?;
        self.body = Some(Box::new(move |query, world, commands| {
            query.for_each_read2::<A, B, _>(world, |entity, a, b| f(entity, a, b, commands))
        }));
        Ok(self)
    }

    /// Attaches a per-entity closure over one mutable component.
    pub fn each_write1<A, F>(mut self, f: F) -> ECSResult<Self>
    where
        A: Component,
        F: Fn(Entity, &mut A, &mut SystemCommands) + Send + Sync + 'static,
    {
        self.declare_write::<A>()?;
        self.body = Some(Box::new(move |query, world, commands| {
            query.for_each_write1::<A, _>(world, |entity, a| f(entity, a, commands))
        }));
        Ok(self)
    }

    /// Attaches a per-entity closure over one read-only and one mutable
    /// component.
    pub fn each_read1_write1<A, B, F>(mut self, f: F) -> ECSResult<Self>
    where
        A: Component,
        B: Component,
        F: Fn(Entity, &A, &mut B, &mut SystemCommands) + Send + Sync + 'static,
    {
        self.declare_read::<A>()?;
        self.declare_write::<B>()?;
        self.body = Some(Box::new(move |query, world, commands| {
            query.for_each_read1_write1::<A, B, _>(world, |entity, a, b| f(entity, a, b, commands))
        }));
        Ok(self)
    }

    /// Attaches a per-entity closure over two read-only components and one
    /// mutable component.
    pub fn each_read2_write1<A, B, C, F>(mut self, f: F) -> ECSResult<Self>
    where
        A: Component,
        B: Component,
        C: Component,
        F: Fn(Entity, &A, &B, &mut C, &mut SystemCommands) + Send + Sync + 'static,
    {
        self.declare_read::<A>()?;
        self.declare_read::<B>()?;
        self.declare_write::<C>()?;
        self.body = Some(Box::new(move |query, world, commands| {
            query.for_each_read2_write1::<A, B, C, _>(world, |entity, a, b, c| {
                f(entity, a, b, c, commands)
            })
        }));
        Ok(self)
    }

    /// Finishes the builder.
    pub fn build(self) -> Box<dyn System> {
        Box::new(BuiltSystem {
            name: self.name,
            access: self.signature.access_sets(),
            signature: self.signature,
            reads: self.reads,
            writes: self.writes,
            pre: self.pre,
            body: self.body,
            post: self.post,
        })
    }
}

/// System produced by [`SystemBuilder`].
struct BuiltSystem {
    name: &'static str,
    access: AccessSets,
    signature: QuerySignature,
    reads: Vec<ComponentID>,
    writes: Vec<ComponentID>,
    pre: Option<HookFn>,
    body: Option<BodyFn>,
    post: Option<HookFn>,
}

impl System for BuiltSystem {
    fn name(&self) -> &str {
        self.name
    }

    fn access(&self) -> AccessSets {
        self.access
    }

    fn on_update(&self, world: &WorldRef<'_>, commands: &mut SystemCommands) -> ECSResult<()> {
        match &self.pre {
            Some(hook) => hook(world, commands),
            None => Ok(()),
        }
    }

    fn run(&self, world: &WorldRef<'_>, commands: &mut SystemCommands) -> ECSResult<()> {
        let Some(body) = &self.body else {
            return Ok(());
        };
        let query = QueryBuilder::from_parts(
            self.signature.clone(),
            self.reads.clone(),
            self.writes.clone(),
        );
        body(query, world, commands)
    }

    fn on_late_update(&self, world: &WorldRef<'_>, commands: &mut SystemCommands) -> ECSResult<()> {
        match &self.post {
            Some(hook) => hook(world, commands),
            None => Ok(()),
        }
    }
}
