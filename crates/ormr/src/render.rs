//! # Render: Ordered Drawing of Renderable Components
//!
//! The core does not talk to a GPU. Renderable components describe what to
//! draw through a [`RenderSurface`] supplied by the host, and
//! [`RenderSystem`] calls them in render-index order.
//!
//! ## Keeping the Order Current
//!
//! ```text
//! set_z_order(obj) ─→ Transform triggerer ─→ RenderOrderChanged
//!                                                   │ (scoped to obj)
//!                                                   ▼
//!                          RenderSystem tracked list: reorder(obj, index)
//! ```
//!
//! The system subscribes to each tracked object's own triggerer, so a
//! z-order change re-sorts exactly one entry and nothing is sorted per frame.

use glam::{Affine2, Vec2};

use crate::ecs::component::{Capabilities, Component, FieldError};
use crate::ecs::entity::ObjectHandle;
use crate::ecs::mask::ComponentMask;
use crate::ecs::system::{RenderContext, Requirements, System, SystemHooks, WorldView};
use crate::ecs::transform::Transform;
use crate::error::EcsResult;

/// Linear RGBA color.
pub type Rgba = [f32; 4];

pub const WHITE: Rgba = [1.0, 1.0, 1.0, 1.0];

/// Drawing backend supplied by the host.
pub trait RenderSurface {
    /// Unit quad centred on the origin, scaled to `size`, then placed by
    /// `transform`.
    fn draw_quad(&mut self, transform: &Affine2, size: Vec2, color: Rgba);

    fn draw_sprite(&mut self, transform: &Affine2, texture: u32, size: Vec2, tint: Rgba) {
        let _ = texture;
        self.draw_quad(transform, size, tint);
    }
}

/// Emitted through an object's transform triggerer when its render index
/// changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOrderChanged {
    pub object: ObjectHandle,
    pub render_index: u32,
}

/// One recorded draw call.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Quad {
        transform: Affine2,
        size: Vec2,
        color: Rgba,
    },
    Sprite {
        transform: Affine2,
        texture: u32,
        size: Vec2,
        tint: Rgba,
    },
}

/// A surface that only records what it was asked to draw.
#[derive(Debug, Default)]
pub struct DrawList {
    pub commands: Vec<DrawCommand>,
}

impl DrawList {
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl RenderSurface for DrawList {
    fn draw_quad(&mut self, transform: &Affine2, size: Vec2, color: Rgba) {
        self.commands.push(DrawCommand::Quad {
            transform: *transform,
            size,
            color,
        });
    }

    fn draw_sprite(&mut self, transform: &Affine2, texture: u32, size: Vec2, tint: Rgba) {
        self.commands.push(DrawCommand::Sprite {
            transform: *transform,
            texture,
            size,
            tint,
        });
    }
}

/// Solid colored rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad {
    pub size: Vec2,
    pub color: Rgba,
}

impl Default for Quad {
    fn default() -> Self {
        Self {
            size: Vec2::ONE,
            color: WHITE,
        }
    }
}

fn parse_floats<const N: usize>(value: &str) -> Result<[f32; N], FieldError> {
    let mut out = [0.0; N];
    let mut parts = value.split(',');
    for slot in &mut out {
        let part = parts.next().ok_or(FieldError::Invalid)?;
        *slot = part.trim().parse().map_err(|_| FieldError::Invalid)?;
    }
    if parts.next().is_some() {
        return Err(FieldError::Invalid);
    }
    Ok(out)
}

impl Component for Quad {
    fn dependencies(deps: &mut crate::ecs::component::Dependencies) {
        deps.require::<Transform>();
    }

    fn capabilities() -> Capabilities {
        Capabilities::RENDERABLE
    }

    fn set_value(&mut self, field: &str, value: &str) -> Result<(), FieldError> {
        match field {
            "Size" => self.size = Vec2::from_array(parse_floats::<2>(value)?),
            "Color" => self.color = parse_floats::<4>(value)?,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_values(&self) -> Vec<(String, String)> {
        let [r, g, b, a] = self.color;
        vec![
            ("Size".into(), format!("{},{}", self.size.x, self.size.y)),
            ("Color".into(), format!("{r},{g},{b},{a}")),
        ]
    }

    fn render(&self, _object: ObjectHandle, world: &Affine2, surface: &mut dyn RenderSurface) {
        surface.draw_quad(world, self.size, self.color);
    }
}

/// Draws every object that has at least one renderable component, lowest
/// render index first.
#[derive(Debug, Default)]
pub struct RenderSystem;

impl RenderSystem {
    pub fn new() -> Self {
        Self
    }
}

impl System for RenderSystem {
    fn register_requirements(&mut self, requirements: &mut Requirements<'_>) -> EcsResult<()> {
        requirements.require::<Transform>()?;
        Ok(())
    }

    fn should_track(
        &self,
        view: &WorldView<'_>,
        _object: ObjectHandle,
        mask: ComponentMask,
        required: ComponentMask,
    ) -> bool {
        mask.contains(required) && mask.intersects(view.capability_mask(Capabilities::RENDERABLE))
    }

    fn sorted(&self) -> bool {
        true
    }

    fn order_key(&self, view: &WorldView<'_>, object: ObjectHandle) -> u32 {
        view.get::<Transform>(object)
            .map_or(0, Transform::render_index)
    }

    fn on_component_added(&mut self, ctx: &mut SystemHooks<'_>, object: ObjectHandle) {
        let Some(scope) = ctx.view.get::<Transform>(object).and_then(Transform::triggerer) else {
            return;
        };
        let tracked = ctx.tracked.clone();
        ctx.events
            .subscribe_scoped(scope, ctx.receiver, move |event: &RenderOrderChanged| {
                tracked.reorder(event.object, event.render_index);
            });
    }

    fn on_component_removed(&mut self, ctx: &mut SystemHooks<'_>, object: ObjectHandle) {
        if let Some(scope) = ctx.view.get::<Transform>(object).and_then(Transform::triggerer) {
            ctx.events.unsubscribe_scoped(scope, ctx.receiver);
        }
    }

    fn render(&self, ctx: &RenderContext<'_>, surface: &mut dyn RenderSurface) {
        let view = ctx.view();
        let renderable = view.capability_mask(Capabilities::RENDERABLE);
        ctx.for_each_tracked(|object| {
            let kinds = view.mask(object);
            if !kinds.intersects(renderable) {
                return;
            }
            let world = view.world_transform(object);
            for kind in kinds.iter().filter(|kind| renderable.has(*kind)) {
                if let Some(component) = view.component(object, kind) {
                    component.render(object, &world, surface);
                }
            }
        });
    }
}
