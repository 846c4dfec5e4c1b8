//! Convenience re-exports: `use ormr::prelude::*` for the common items.

pub use crate::config::{SpatialConfig, WorldConfig};
pub use crate::ecs::{
    Capabilities, Component, ComponentContext, ComponentMask, Dependencies, FieldError, KindId,
    ObjectHandle, ObjectOptions, RenderContext, Requirements, System, SystemContext, SystemHooks,
    SystemId, Transform, World, WorldView,
};
pub use crate::error::{EcsError, EcsResult};
pub use crate::event::{EventBus, EventReceiver, EventTriggerer, ReceiverId, TriggererId};
pub use crate::input::{InputEvent, KeyCode, MouseButton};
pub use crate::math::{Affine2, IVec2, Rect, Vec2};
pub use crate::render::{DrawList, Quad, RenderOrderChanged, RenderSurface, RenderSystem, Rgba};
pub use crate::spatial::SpatialIndex;
