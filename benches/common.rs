#![allow(dead_code)]

use std::sync::Once;

use bytemuck::{Pod, Zeroable};

use archon_ecs::engine::component::{freeze_components, register_component, Component};

pub const AGENTS_SMALL: usize = 10_000;
pub const AGENTS_MED: usize = 100_000;

#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Velocity {
    pub dx: f32,
    pub dy: f32,
}

impl Component for Position {}
impl Component for Velocity {}

static INIT: Once = Once::new();

pub fn init_components() {
    INIT.call_once(|| {
        register_component::<Position>().unwrap();
        register_component::<Velocity>().unwrap();
        freeze_components().unwrap();
    });
}
