//! # Bitmask ECS Core
//!
//! Objects are generational handles into a slot table. Each object carries a
//! 32-bit mask with one bit per component kind, and each kind lives in its
//! own chunked pool indexed by the object's slot. Systems declare a required
//! mask and keep a list of the objects that match it.
//!
//! ## Module Overview
//!
//! - [`entity`]: generational object handles and the slot table
//! - [`mask`]: kind ids and the per-object kind bitset
//! - [`component`]: the component contract and lifecycle hooks
//! - [`pool`]: chunked per-kind storage
//! - [`registry`]: kind registration and the pool set
//! - [`transform`]: the mandatory per-object transform
//! - [`hierarchy`]: parent/child links
//! - [`system`]: the system contract and tracked lists
//! - [`world`]: the container tying it all together

pub mod component;
pub mod entity;
pub mod hierarchy;
pub mod mask;
pub mod pool;
pub mod registry;
pub mod system;
pub mod transform;
pub mod world;

pub use component::{Capabilities, Component, ComponentContext, Dependencies, FieldError};
pub use entity::{ObjectFlags, ObjectHandle, ObjectTable};
pub use mask::{ComponentMask, KindId, MAX_COMPONENT_KINDS};
pub use system::{
    RenderContext, Requirements, System, SystemContext, SystemHooks, SystemId, TrackedObjects,
    WorldView,
};
pub use transform::Transform;
pub use world::{ObjectOptions, World};
