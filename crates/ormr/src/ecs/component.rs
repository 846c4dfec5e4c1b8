//! # Component: The Contract Every Component Kind Implements
//!
//! Components are data plus a handful of lifecycle hooks. The world calls
//! into them at fixed points:
//!
//! ```text
//! add_component   → construct → set bit → add required kinds
//!                 → on_construction_complete → notify systems
//! remove_component → notify systems → on_destruction_begin
//!                 → clear bit → drop
//! ```
//!
//! Type-level metadata (name, required kinds, capabilities) is read once
//! when the kind is registered and kept in the kind registry, so nothing is
//! looked up per frame. The instance methods are object safe, which lets the
//! world reach any component through `&mut dyn Component` when all it has is
//! a [`KindId`](super::mask::KindId).

use std::any::Any;

use glam::Affine2;

use super::entity::ObjectHandle;
use super::mask::KindId;
use super::registry::ComponentStore;
use crate::error::EcsResult;
use crate::event::EventBus;
use crate::render::RenderSurface;
use crate::spatial::SpatialIndex;

/// A component kind that can be attached to objects.
///
/// Kinds used with [`World`](super::world::World) must also implement
/// `Default`: required kinds are auto-added in their default state, and
/// string-driven construction starts from the default.
pub trait Component: Any {
    /// Stable, human-readable kind name. Used in logs, errors and by the
    /// string-keyed value boundary.
    fn name() -> &'static str
    where
        Self: Sized,
    {
        let full = std::any::type_name::<Self>();
        let base = full.split('<').next().unwrap_or(full);
        base.rsplit("::").next().unwrap_or(base)
    }

    /// Declare kinds that are auto-added (default constructed) whenever this
    /// one is attached to an object lacking them.
    fn dependencies(_deps: &mut Dependencies)
    where
        Self: Sized,
    {
    }

    /// Capabilities this kind provides to collaborators.
    fn capabilities() -> Capabilities
    where
        Self: Sized,
    {
        Capabilities::NONE
    }

    /// Called once the component (and its required kinds) are attached.
    fn on_construction_complete(&mut self, _ctx: &mut ComponentContext<'_>) {}

    /// Called right before the component is dropped.
    fn on_destruction_begin(&mut self, _ctx: &mut ComponentContext<'_>) {}

    /// Assign one named field from its string form.
    fn set_value(&mut self, _field: &str, _value: &str) -> Result<(), FieldError> {
        Err(FieldError::Unknown)
    }

    /// Every named field in string form.
    fn get_values(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Draw the component. Only called for kinds with
    /// [`Capabilities::RENDERABLE`].
    fn render(&self, _object: ObjectHandle, _world: &Affine2, _surface: &mut dyn RenderSurface) {}
}

/// Why [`Component::set_value`] rejected a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldError {
    /// The kind has no field with that name.
    Unknown,
    /// The field exists but the value did not parse.
    Invalid,
}

/// What a component kind can do for collaborators, registered once per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities(u8);

impl Capabilities {
    pub const NONE: Self = Self(0);
    /// The kind draws itself through [`Component::render`].
    pub const RENDERABLE: Self = Self(1 << 0);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

pub(crate) type Registrar = fn(&mut ComponentStore) -> EcsResult<KindId>;

/// Collects the kinds a component requires. See [`Component::dependencies`].
#[derive(Default)]
pub struct Dependencies {
    pub(crate) registrars: Vec<Registrar>,
}

impl Dependencies {
    pub fn require<T: Component + Default>(&mut self) -> &mut Self {
        self.registrars.push(ComponentStore::register::<T>);
        self
    }
}

/// World services available to component lifecycle hooks.
pub struct ComponentContext<'a> {
    pub object: ObjectHandle,
    /// World transform of the object's parent, identity for roots.
    pub parent_transform: Affine2,
    pub spatial: &'a mut SpatialIndex,
    pub events: &'a EventBus,
}
