//! The mandatory transform component.
//!
//! Every object owns exactly one [`Transform`]: created with the object,
//! removed last when it is destroyed. Position, rotation and scale are
//! relative to the parent object. Moving an object has to keep the spatial
//! index in sync, so the position is only writable through
//! [`World`](super::world::World) (`set_position`, `translate`, ...).
//!
//! Draw order is `layer * 10_000 + z_order`. Changing either after the
//! object is fully constructed emits [`RenderOrderChanged`] through the
//! transform's own triggerer, so listeners can subscribe to one object only.

use glam::{Affine2, Vec2};

use super::component::{Component, ComponentContext, FieldError};
use crate::event::{EventTriggerer, TriggererId};

/// Layers are spaced this far apart in the render index.
pub const LAYER_STRIDE: u32 = 10_000;

/// Spatial placement, draw order and the object's event triggerer.
#[derive(Debug)]
pub struct Transform {
    position: Vec2,
    rotation: f32,
    scale: Vec2,
    z_order: u32,
    layer: u32,
    indexed: bool,
    triggerer: Option<EventTriggerer>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            rotation: 0.0,
            scale: Vec2::ONE,
            z_order: 0,
            layer: 0,
            indexed: true,
            triggerer: None,
        }
    }
}

impl Transform {
    pub fn new(position: Vec2, rotation: f32, scale: Vec2) -> Self {
        Self {
            position,
            rotation,
            scale,
            ..Self::default()
        }
    }

    /// Keep this object out of the spatial index.
    pub fn unindexed(mut self) -> Self {
        self.indexed = false;
        self
    }

    /// Position relative to the parent.
    pub fn position(&self) -> Vec2 {
        self.position
    }

    /// Rotation in radians.
    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    pub fn scale(&self) -> Vec2 {
        self.scale
    }

    pub fn z_order(&self) -> u32 {
        self.z_order
    }

    pub fn layer(&self) -> u32 {
        self.layer
    }

    pub fn render_index(&self) -> u32 {
        self.layer
            .saturating_mul(LAYER_STRIDE)
            .saturating_add(self.z_order)
    }

    /// Whether the object takes part in spatial queries.
    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    /// Scope id for subscriptions to this object's events. `None` until the
    /// component is attached.
    pub fn triggerer(&self) -> Option<TriggererId> {
        self.triggerer.as_ref().map(EventTriggerer::id)
    }

    pub fn local_matrix(&self) -> Affine2 {
        Affine2::from_scale_angle_translation(self.scale, self.rotation, self.position)
    }

    pub(crate) fn set_position(&mut self, position: Vec2) {
        self.position = position;
    }

    pub(crate) fn set_rotation(&mut self, rotation: f32) {
        self.rotation = rotation;
    }

    pub(crate) fn set_scale(&mut self, scale: Vec2) {
        self.scale = scale;
    }

    pub(crate) fn set_z_order(&mut self, z_order: u32) {
        self.z_order = z_order;
    }

    pub(crate) fn set_layer(&mut self, layer: u32) {
        self.layer = layer;
    }
}

fn parse_vec2(value: &str) -> Result<Vec2, FieldError> {
    let (x, y) = value.split_once(',').ok_or(FieldError::Invalid)?;
    let x = x.trim().parse().map_err(|_| FieldError::Invalid)?;
    let y = y.trim().parse().map_err(|_| FieldError::Invalid)?;
    Ok(Vec2::new(x, y))
}

fn parse<T: std::str::FromStr>(value: &str) -> Result<T, FieldError> {
    value.trim().parse().map_err(|_| FieldError::Invalid)
}

impl Component for Transform {
    fn on_construction_complete(&mut self, ctx: &mut ComponentContext<'_>) {
        self.triggerer = Some(ctx.events.triggerer());
        if self.indexed {
            let world = ctx.parent_transform.transform_point2(self.position);
            ctx.spatial.insert(ctx.object, world);
        }
    }

    fn on_destruction_begin(&mut self, ctx: &mut ComponentContext<'_>) {
        ctx.spatial.remove(ctx.object);
    }

    fn set_value(&mut self, field: &str, value: &str) -> Result<(), FieldError> {
        match field {
            "Position" => self.position = parse_vec2(value)?,
            "Rotation" => self.rotation = parse(value)?,
            "Scale" => self.scale = parse_vec2(value)?,
            "ZOrder" => self.z_order = parse(value)?,
            "Layer" => self.layer = parse(value)?,
            _ => return Err(FieldError::Unknown),
        }
        Ok(())
    }

    fn get_values(&self) -> Vec<(String, String)> {
        vec![
            (
                "Position".into(),
                format!("{},{}", self.position.x, self.position.y),
            ),
            ("Rotation".into(), self.rotation.to_string()),
            ("Scale".into(), format!("{},{}", self.scale.x, self.scale.y)),
            ("ZOrder".into(), self.z_order.to_string()),
            ("Layer".into(), self.layer.to_string()),
        ]
    }
}
