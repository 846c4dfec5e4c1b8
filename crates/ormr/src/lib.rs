//! # Ormr: A Small Bitmask ECS Runtime
//!
//! Generational object handles, chunked component pools, systems that track
//! the objects matching their component mask, a chunked spatial grid and a
//! scoped event bus, all owned by one [`World`](ecs::World).
//!
//! Start with `use ormr::prelude::*`.

pub mod config;
pub mod ecs;
pub mod error;
pub mod event;
pub mod input;
pub mod math;
pub mod prelude;
pub mod render;
pub mod spatial;

#[cfg(feature = "diagnostics")]
pub mod diag;
