//! # Engine Module
//!
//! Internal ECS engine implementation.
//!
//! This module contains all core ECS building blocks such as:
//! - Archetypes and record chunk storage
//! - Entity handles and locations
//! - Component registration and bundles
//! - Query execution
//! - Deferred commands and their executor
//! - Scheduling and systems
//!
//! Public API exposure is controlled by `lib.rs`.

pub mod types;
pub mod error;
pub mod component;
pub mod chunk;
pub mod archetype;
pub mod entity;
pub mod locker;
pub mod query;
pub mod commands;
pub mod executor;
pub mod systems;
pub mod affective;
pub mod schedule;
pub mod world;
