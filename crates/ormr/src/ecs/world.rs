//! # World: The Central Container
//!
//! The [`World`] owns every object, component, system, the spatial index and
//! the event bus. It is the single source of truth for the simulation and the
//! only place where those parts are wired together.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ World                                                        │
//! │                                                              │
//! │  objects:    ObjectTable   slot → {generation, mask, flags}  │
//! │  components: ComponentStore  kind → chunked pool             │
//! │  hierarchy:  Hierarchy     slot → {parent, children}         │
//! │  spatial:    SpatialIndex  chunk → cell → objects            │
//! │  events:     EventBus      event type → subscriptions        │
//! │  systems:    [SystemSlot]  system + required mask + tracked  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Component Changes Notify Systems Immediately
//!
//! Adding or removing a component re-evaluates that one object against every
//! system right away, so tracked lists are never stale:
//!
//! ```text
//! add_component:    construct → set bit → add required kinds
//!                   → on_construction_complete → notify systems
//! remove_component: notify systems (with the bit already cleared in the
//!                   mask they see) → on_destruction_begin → clear bit → drop
//! ```
//!
//! ## Comparison
//!
//! - **bevy_ecs**: archetype tables, query caches and change detection
//!   instead of per-system lists.
//! - **hecs**: no systems at all; the caller iterates queries.
//!
//! Here everything is a fixed-size bitset test, which keeps both membership
//! checks and component lookups O(1).

use std::any::TypeId;
#[cfg(feature = "diagnostics")]
use std::time::Instant;

use glam::{Affine2, Vec2};

use super::component::{Capabilities, Component, ComponentContext, FieldError};
use super::entity::{ObjectFlags, ObjectHandle, ObjectTable};
use super::hierarchy::Hierarchy;
use super::mask::{ComponentMask, KindId};
use super::registry::ComponentStore;
use super::system::{
    RenderContext, Requirements, System, SystemContext, SystemHooks, SystemId, TrackedObjects,
    WorldView, downcast_mut, downcast_ref,
};
use super::transform::Transform;
use crate::config::WorldConfig;
use crate::error::{EcsError, EcsResult};
use crate::event::{EventBus, EventReceiver, ReceiverId};
use crate::input::InputEvent;
use crate::math::Rect;
use crate::render::{RenderOrderChanged, RenderSurface};
use crate::spatial::SpatialIndex;

#[cfg(feature = "diagnostics")]
use crate::diag::SystemTiming;

/// Parameters for [`World::create_object_with`].
#[derive(Debug, Clone, Copy)]
pub struct ObjectOptions {
    pub position: Vec2,
    pub rotation: f32,
    pub scale: Vec2,
    pub parent: Option<ObjectHandle>,
    /// Whether the object is placed in the spatial index.
    pub spatial: bool,
}

impl Default for ObjectOptions {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            rotation: 0.0,
            scale: Vec2::ONE,
            parent: None,
            spatial: true,
        }
    }
}

impl ObjectOptions {
    pub fn at(position: Vec2) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn rotated(mut self, rotation: f32) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn scaled(mut self, scale: Vec2) -> Self {
        self.scale = scale;
        self
    }

    pub fn child_of(mut self, parent: ObjectHandle) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn without_spatial(mut self) -> Self {
        self.spatial = false;
        self
    }
}

struct SystemSlot {
    name: &'static str,
    type_id: TypeId,
    /// `None` while the system's own hook runs.
    system: Option<Box<dyn System>>,
    required: ComponentMask,
    tracked: TrackedObjects,
    receiver: EventReceiver,
    /// Removal requested while the system was running.
    retired: bool,
}

/// Disjoint borrows of the world, for code that mutates systems while
/// reading storage.
struct Parts<'a> {
    view: WorldView<'a>,
    events: &'a EventBus,
    systems: &'a mut [Option<SystemSlot>],
    rechecks: &'a mut Vec<(usize, ObjectHandle)>,
}

/// Bring one system's tracked list in line with `object`'s mask (`None` for
/// a dead object), firing the membership hooks on change.
fn sync_membership(
    slot: &mut SystemSlot,
    id: SystemId,
    view: WorldView<'_>,
    events: &EventBus,
    object: ObjectHandle,
    mask: Option<ComponentMask>,
) {
    let Some(system) = slot.system.as_mut() else {
        return;
    };
    let wants = mask.is_some_and(|mask| system.should_track(&view, object, mask, slot.required));
    if wants == slot.tracked.contains(object) {
        return;
    }
    if wants {
        let key = if slot.tracked.is_sorted() {
            system.order_key(&view, object)
        } else {
            0
        };
        slot.tracked.insert(object, key);
    } else {
        slot.tracked.remove(object);
    }
    let mut hooks = SystemHooks {
        view,
        events,
        receiver: slot.receiver.id(),
        tracked: &slot.tracked,
        id,
    };
    if wants {
        system.on_component_added(&mut hooks, object);
    } else {
        system.on_component_removed(&mut hooks, object);
    }
}

fn shut_down(slot: SystemSlot) {
    let SystemSlot {
        name,
        system,
        tracked,
        receiver,
        ..
    } = slot;
    drop(receiver);
    tracked.clear();
    if let Some(mut system) = system {
        system.on_shutdown();
    }
    log::info!("removed system `{name}`");
}

/// Owns all objects, components, systems, the spatial index and the event
/// bus.
pub struct World {
    config: WorldConfig,
    objects: ObjectTable,
    components: ComponentStore,
    hierarchy: Hierarchy,
    spatial: SpatialIndex,
    events: EventBus,
    systems: Vec<Option<SystemSlot>>,
    /// Membership checks owed to systems that were running when an object
    /// changed.
    rechecks: Vec<(usize, ObjectHandle)>,
    transform_kind: KindId,
    delta_time: f32,
    #[cfg(feature = "diagnostics")]
    timings: Vec<SystemTiming>,
}

impl World {
    /// World with the default configuration.
    pub fn new() -> Self {
        match Self::with_config(WorldConfig::default()) {
            Ok(world) => world,
            Err(err) => unreachable!("default world configuration is valid: {err}"),
        }
    }

    pub fn with_config(config: WorldConfig) -> EcsResult<Self> {
        config.validate()?;
        let mut components = ComponentStore::new(config.pool_chunk_size);
        let transform_kind = components.register::<Transform>()?;
        let spatial = SpatialIndex::new(config.spatial)?;
        log::debug!(
            "world created: pool chunks of {}, spatial cells of {} x {} per chunk",
            config.pool_chunk_size,
            config.spatial.cell_size,
            config.spatial.chunk_size_in_cells
        );
        Ok(Self {
            config,
            objects: ObjectTable::new(),
            components,
            hierarchy: Hierarchy::new(),
            spatial,
            events: EventBus::new(),
            systems: Vec::new(),
            rechecks: Vec::new(),
            transform_kind,
            delta_time: 0.0,
            #[cfg(feature = "diagnostics")]
            timings: Vec::new(),
        })
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Read-only view over storage, the same one system hooks receive.
    pub fn view(&self) -> WorldView<'_> {
        WorldView {
            objects: &self.objects,
            components: &self.components,
            hierarchy: &self.hierarchy,
            spatial: &self.spatial,
        }
    }

    fn parts(&mut self) -> Parts<'_> {
        Parts {
            view: WorldView {
                objects: &self.objects,
                components: &self.components,
                hierarchy: &self.hierarchy,
                spatial: &self.spatial,
            },
            events: &self.events,
            systems: &mut self.systems,
            rechecks: &mut self.rechecks,
        }
    }

    /// Validate a handle handed to a mutating operation, logging the
    /// operation and kind when it is stale.
    fn validate_for(&self, op: &str, kind: &str, object: ObjectHandle) -> EcsResult<usize> {
        self.objects
            .validate(object)
            .inspect_err(|_| log::warn!("{op}: stale handle {object} (`{kind}`)"))
    }

    // ── Objects ──────────────────────────────────────────────────────

    /// Create a root object with a transform and place it in the spatial
    /// index.
    pub fn create_object(&mut self, position: Vec2, rotation: f32, scale: Vec2) -> ObjectHandle {
        let object = self.spawn(Transform::new(position, rotation, scale));
        self.finish_construction(object);
        object
    }

    /// Create an object, optionally under a parent or outside the spatial
    /// index.
    pub fn create_object_with(&mut self, options: ObjectOptions) -> EcsResult<ObjectHandle> {
        if let Some(parent) = options.parent {
            self.validate_for("create_object_with", "Transform", parent)?;
        }
        let mut transform = Transform::new(options.position, options.rotation, options.scale);
        if !options.spatial {
            transform = transform.unindexed();
        }
        let object = self.spawn(transform);
        if let Some(parent) = options.parent {
            self.attach_child(parent, object)?;
        }
        self.finish_construction(object);
        Ok(object)
    }

    fn spawn(&mut self, transform: Transform) -> ObjectHandle {
        let object = self.objects.allocate();
        let slots = self.objects.total_slots();
        self.components.expand_all(slots);
        self.hierarchy.expand_to_fit(slots);
        self.hierarchy.reset(object);

        let index = object.index as usize;
        if let Some(pool) = self.components.pool_mut::<Transform>() {
            pool.construct(index, transform);
        }
        self.finish_add(object, index, self.transform_kind);
        object
    }

    fn finish_construction(&mut self, object: ObjectHandle) {
        if let Ok(index) = self.objects.validate(object) {
            self.objects
                .flags_at_mut(index)
                .insert(ObjectFlags::CONSTRUCTION_COMPLETE);
            log::trace!("created {object}");
        }
    }

    /// Destroy an object: every component but the transform (highest kind
    /// first), then the transform, then the slot. Children survive as roots.
    ///
    /// Returns `Ok(false)` for a handle that is already stale.
    pub fn destroy_object(&mut self, object: ObjectHandle) -> EcsResult<bool> {
        if object.index as usize >= self.objects.total_slots() {
            return Err(EcsError::InvalidHandle { handle: object });
        }
        if !self.objects.is_alive(object) {
            log::warn!("destroy_object: ignoring stale handle {object}");
            return Ok(false);
        }
        let index = object.index as usize;
        let orphans = self.hierarchy.children(&self.objects, object);

        let kinds: Vec<KindId> = self
            .objects
            .mask_at(index)
            .without(self.transform_kind)
            .iter()
            .collect();
        for kind in kinds.into_iter().rev() {
            self.detach_component(object, index, kind);
        }
        self.detach_component(object, index, self.transform_kind);

        for orphan in &orphans {
            self.hierarchy.detach(*orphan);
        }
        self.hierarchy.detach(object);
        self.hierarchy.reset(object);
        self.objects.deallocate(object);
        self.notify_systems(object, None);

        for orphan in orphans {
            self.refresh_subtree(orphan);
        }
        log::trace!("destroyed {object}");
        Ok(true)
    }

    /// Destroy an object and all of its descendants, deepest first. Returns
    /// the number of objects destroyed.
    pub fn destroy_recursive(&mut self, object: ObjectHandle) -> EcsResult<usize> {
        self.validate_for("destroy_recursive", "Transform", object)?;
        let mut doomed = self.hierarchy.descendants(&self.objects, object);
        doomed.reverse();
        doomed.push(object);

        let mut destroyed = 0;
        for handle in doomed {
            if self.destroy_object(handle)? {
                destroyed += 1;
            }
        }
        Ok(destroyed)
    }

    /// Destroy every object. Systems stay registered.
    pub fn destroy_all(&mut self) {
        let all: Vec<ObjectHandle> = self.objects.iter().collect();
        for object in all {
            if let Err(err) = self.destroy_object(object) {
                log::warn!("destroy_all: {err}");
            }
        }
    }

    pub fn is_alive(&self, object: ObjectHandle) -> bool {
        self.objects.is_alive(object)
    }

    pub fn object_count(&self) -> usize {
        self.objects.alive_count()
    }

    /// Live objects in slot order.
    pub fn objects(&self) -> Vec<ObjectHandle> {
        self.objects.iter().collect()
    }

    pub fn object_table(&self) -> &ObjectTable {
        &self.objects
    }

    pub fn object_flags(&self, object: ObjectHandle) -> EcsResult<ObjectFlags> {
        self.objects.flags(object)
    }

    /// Resolve a handle stored in foreign user data (e.g. a physics body)
    /// by [`ObjectHandle::to_bits`]. Stale or malformed values yield `None`.
    pub fn object_from_user_data(&self, user_data: u128) -> Option<ObjectHandle> {
        let bits = u64::try_from(user_data).ok()?;
        let object = ObjectHandle::from_bits(bits);
        self.objects.is_alive(object).then_some(object)
    }

    // ── Components ───────────────────────────────────────────────────

    /// Register `K` ahead of first use.
    pub fn register_component<K: Component + Default>(&mut self) -> EcsResult<KindId> {
        self.components.register::<K>()
    }

    pub fn kind_of<K: Component>(&self) -> Option<KindId> {
        self.components.registry().kind_of::<K>()
    }

    pub fn components(&self) -> &ComponentStore {
        &self.components
    }

    /// Kinds providing `capability`.
    pub fn capability_mask(&self, capability: Capabilities) -> ComponentMask {
        self.components.registry().capability_mask(capability)
    }

    pub fn component_mask(&self, object: ObjectHandle) -> EcsResult<ComponentMask> {
        self.objects.mask(object)
    }

    /// Attach `component`, auto-adding the kinds it requires. Fails if the
    /// object already has one.
    pub fn add_component<K: Component + Default>(
        &mut self,
        object: ObjectHandle,
        component: K,
    ) -> EcsResult<&mut K> {
        let index = self.validate_for("add_component", K::name(), object)?;
        let kind = self.components.register::<K>()?;
        if self.objects.mask_at(index).has(kind) {
            log::error!("object {object} already has a `{}` component", K::name());
            return Err(EcsError::DuplicateComponent {
                handle: object,
                kind: K::name(),
            });
        }
        self.components
            .pool_mut::<K>()
            .ok_or(EcsError::UnregisteredKind { kind: K::name() })?
            .construct(index, component);
        self.finish_add(object, index, kind);

        self.components
            .pool_mut::<K>()
            .and_then(|pool| pool.get_mut(index))
            .ok_or(EcsError::MissingComponent {
                handle: object,
                kind: K::name(),
            })
    }

    /// Attach a default-constructed component by its registered name.
    pub fn add_component_by_name(&mut self, object: ObjectHandle, name: &str) -> EcsResult<KindId> {
        let index = self.validate_for("add_component_by_name", name, object)?;
        let kind = self.kind_named(name)?;
        if self.objects.mask_at(index).has(kind) {
            let kind = self.components.registry().name(kind);
            log::error!("object {object} already has a `{kind}` component");
            return Err(EcsError::DuplicateComponent {
                handle: object,
                kind,
            });
        }
        self.components.erased_mut(kind).construct_default(index);
        self.finish_add(object, index, kind);
        Ok(kind)
    }

    fn kind_named(&self, name: &str) -> EcsResult<KindId> {
        self.components
            .registry()
            .kind_by_name(name)
            .ok_or_else(|| EcsError::UnknownComponent {
                name: name.to_string(),
            })
    }

    /// The bit for `kind` is set and its storage constructed; fill in
    /// required kinds, run the construction hook and notify systems.
    fn finish_add(&mut self, object: ObjectHandle, index: usize, kind: KindId) {
        self.objects.mask_at_mut(index).set(kind);

        let required = self.components.registry().info(kind).required;
        for dep in required.iter() {
            if self.objects.mask_at(index).has(dep) {
                continue;
            }
            log::debug!(
                "adding required `{}` to {object} for `{}`",
                self.components.registry().name(dep),
                self.components.registry().name(kind)
            );
            self.components.erased_mut(dep).construct_default(index);
            self.finish_add(object, index, dep);
        }

        self.run_component_hook(object, index, kind, true);
        let mask = self.objects.mask_at(index);
        self.notify_systems(object, Some(mask));
    }

    fn run_component_hook(&mut self, object: ObjectHandle, index: usize, kind: KindId, constructing: bool) {
        let parent_transform = self.view().parent_world_transform(object);
        let Some(component) = self.components.erased_mut(kind).get_dyn_mut(index) else {
            return;
        };
        let mut ctx = ComponentContext {
            object,
            parent_transform,
            spatial: &mut self.spatial,
            events: &self.events,
        };
        if constructing {
            component.on_construction_complete(&mut ctx);
        } else {
            component.on_destruction_begin(&mut ctx);
        }
    }

    /// Remove `K`. Returns `Ok(false)` if the object did not have one. The
    /// transform cannot be removed on its own.
    pub fn remove_component<K: Component>(&mut self, object: ObjectHandle) -> EcsResult<bool> {
        let index = self.validate_for("remove_component", K::name(), object)?;
        let Some(kind) = self.kind_of::<K>() else {
            log::trace!(
                "remove_component: `{}` is not registered, {object} has none",
                K::name()
            );
            return Ok(false);
        };
        if kind == self.transform_kind {
            log::error!("remove_component: `{}` is mandatory on {object}", K::name());
            return Err(EcsError::MandatoryComponent { kind: K::name() });
        }
        let removed = self.detach_component(object, index, kind);
        if !removed {
            log::trace!("remove_component: {object} has no `{}`", K::name());
        }
        Ok(removed)
    }

    fn detach_component(&mut self, object: ObjectHandle, index: usize, kind: KindId) -> bool {
        let mask = self.objects.mask_at(index);
        if !mask.has(kind) {
            return false;
        }
        self.notify_systems(object, Some(mask.without(kind)));
        self.run_component_hook(object, index, kind, false);
        self.objects.mask_at_mut(index).clear(kind);
        self.components.erased_mut(kind).destroy(index);
        true
    }

    pub fn has_component<K: Component>(&self, object: ObjectHandle) -> bool {
        self.view().has::<K>(object)
    }

    pub fn get_component<K: Component>(&self, object: ObjectHandle) -> EcsResult<&K> {
        self.objects.validate(object)?;
        self.view()
            .get::<K>(object)
            .ok_or(EcsError::MissingComponent {
                handle: object,
                kind: K::name(),
            })
    }

    /// Mutable access to a component. The transform is refused: move objects
    /// with [`set_position`](World::set_position) and friends so the spatial
    /// index follows.
    pub fn get_component_mut<K: Component>(&mut self, object: ObjectHandle) -> EcsResult<&mut K> {
        let index = self.validate_for("get_component_mut", K::name(), object)?;
        let missing = EcsError::MissingComponent {
            handle: object,
            kind: K::name(),
        };
        let Some(kind) = self.kind_of::<K>() else {
            return Err(missing);
        };
        if kind == self.transform_kind {
            log::error!(
                "get_component_mut: `{}` of {object} is only writable through the world",
                K::name()
            );
            return Err(EcsError::WorldManagedComponent { kind: K::name() });
        }
        if !self.objects.mask_at(index).has(kind) {
            return Err(missing);
        }
        self.components
            .pool_mut::<K>()
            .and_then(|pool| pool.get_mut(index))
            .ok_or(missing)
    }

    /// Assign one field of a component from its string form.
    pub fn set_component_value(
        &mut self,
        object: ObjectHandle,
        kind_name: &str,
        field: &str,
        value: &str,
    ) -> EcsResult<()> {
        let index = self.validate_for("set_component_value", kind_name, object)?;
        let kind = self.kind_named(kind_name)?;
        let label = self.components.registry().name(kind);
        if !self.objects.mask_at(index).has(kind) {
            return Err(EcsError::MissingComponent {
                handle: object,
                kind: label,
            });
        }
        let render_index = self.transform(object)?.render_index();

        let component = self
            .components
            .erased_mut(kind)
            .get_dyn_mut(index)
            .ok_or(EcsError::MissingComponent {
                handle: object,
                kind: label,
            })?;
        component.set_value(field, value).map_err(|err| match err {
            FieldError::Unknown => EcsError::UnknownField {
                kind: label,
                field: field.to_string(),
            },
            FieldError::Invalid => EcsError::InvalidValue {
                kind: label,
                field: field.to_string(),
                value: value.to_string(),
            },
        })?;

        if kind == self.transform_kind {
            self.refresh_subtree(object);
            if self.transform(object)?.render_index() != render_index {
                self.announce_render_order(object);
            }
        }
        Ok(())
    }

    /// Every component's fields in string form, by kind name.
    pub fn component_values(
        &self,
        object: ObjectHandle,
    ) -> EcsResult<Vec<(&'static str, Vec<(String, String)>)>> {
        let mask = self.objects.mask(object)?;
        let view = self.view();
        Ok(mask
            .iter()
            .filter_map(|kind| {
                let component = view.component(object, kind)?;
                Some((self.components.registry().name(kind), component.get_values()))
            })
            .collect())
    }

    // ── Transform ────────────────────────────────────────────────────

    pub fn transform(&self, object: ObjectHandle) -> EcsResult<&Transform> {
        self.get_component::<Transform>(object)
    }

    fn transform_mut(&mut self, op: &str, object: ObjectHandle) -> EcsResult<&mut Transform> {
        let index = self.validate_for(op, Transform::name(), object)?;
        self.components
            .pool_mut::<Transform>()
            .and_then(|pool| pool.get_mut(index))
            .ok_or(EcsError::MissingComponent {
                handle: object,
                kind: Transform::name(),
            })
    }

    /// Move an object relative to its parent. Descendants follow.
    pub fn set_position(&mut self, object: ObjectHandle, position: Vec2) -> EcsResult<()> {
        self.transform_mut("set_position", object)?.set_position(position);
        self.refresh_subtree(object);
        Ok(())
    }

    pub fn translate(&mut self, object: ObjectHandle, delta: Vec2) -> EcsResult<()> {
        let transform = self.transform_mut("translate", object)?;
        let position = transform.position() + delta;
        transform.set_position(position);
        self.refresh_subtree(object);
        Ok(())
    }

    pub fn set_rotation(&mut self, object: ObjectHandle, rotation: f32) -> EcsResult<()> {
        self.transform_mut("set_rotation", object)?.set_rotation(rotation);
        self.refresh_subtree(object);
        Ok(())
    }

    pub fn set_scale(&mut self, object: ObjectHandle, scale: Vec2) -> EcsResult<()> {
        self.transform_mut("set_scale", object)?.set_scale(scale);
        self.refresh_subtree(object);
        Ok(())
    }

    pub fn set_z_order(&mut self, object: ObjectHandle, z_order: u32) -> EcsResult<()> {
        self.transform_mut("set_z_order", object)?.set_z_order(z_order);
        self.announce_render_order(object);
        Ok(())
    }

    pub fn set_layer(&mut self, object: ObjectHandle, layer: u32) -> EcsResult<()> {
        self.transform_mut("set_layer", object)?.set_layer(layer);
        self.announce_render_order(object);
        Ok(())
    }

    /// Emit [`RenderOrderChanged`] through the object's transform triggerer.
    /// Objects still under construction stay silent.
    fn announce_render_order(&self, object: ObjectHandle) {
        let constructed = self
            .objects
            .flags(object)
            .is_ok_and(|flags| flags.contains(ObjectFlags::CONSTRUCTION_COMPLETE));
        if !constructed {
            return;
        }
        let Ok(transform) = self.transform(object) else {
            return;
        };
        let Some(scope) = transform.triggerer() else {
            return;
        };
        let event = RenderOrderChanged {
            object,
            render_index: transform.render_index(),
        };
        self.events.emit(scope, &event);
    }

    pub fn world_transform(&self, object: ObjectHandle) -> EcsResult<Affine2> {
        self.objects.validate(object)?;
        Ok(self.view().world_transform(object))
    }

    pub fn world_position(&self, object: ObjectHandle) -> EcsResult<Vec2> {
        Ok(self.world_transform(object)?.translation)
    }

    /// Re-bucket `root` and its descendants at their current world
    /// positions.
    fn refresh_subtree(&mut self, root: ObjectHandle) {
        let moves: Vec<(ObjectHandle, Vec2)> = {
            let view = self.view();
            std::iter::once(root)
                .chain(self.hierarchy.descendants(&self.objects, root))
                .filter(|object| self.spatial.contains(*object))
                .map(|object| (object, view.world_transform(object).translation))
                .collect()
        };
        for (object, position) in moves {
            self.spatial.relocate(object, position);
        }
    }

    // ── Hierarchy ────────────────────────────────────────────────────

    /// Make `child` a child of `parent`, leaving its previous parent. The
    /// child is drawn one layer above its parent.
    pub fn attach_child(&mut self, parent: ObjectHandle, child: ObjectHandle) -> EcsResult<()> {
        self.validate_for("attach_child", "Transform", parent)?;
        self.validate_for("attach_child", "Transform", child)?;
        if parent == child || self.hierarchy.is_ancestor(&self.objects, child, parent) {
            log::error!("refusing to attach {child} under its own descendant {parent}");
            return Err(EcsError::HierarchyCycle { parent, child });
        }
        self.hierarchy.detach(child);
        self.hierarchy.attach(parent, child);

        let layer = self.transform(parent)?.layer().saturating_add(1);
        let transform = self.transform_mut("attach_child", child)?;
        transform.set_layer(layer);
        let z_order = transform.z_order().saturating_add(1);
        transform.set_z_order(z_order);

        self.announce_render_order(child);
        self.refresh_subtree(child);
        Ok(())
    }

    /// Turn `child` into a root. Returns `Ok(false)` if it had no parent.
    pub fn detach_child(&mut self, child: ObjectHandle) -> EcsResult<bool> {
        self.validate_for("detach_child", "Transform", child)?;
        let detached = self.hierarchy.detach(child).is_some();
        if detached {
            self.refresh_subtree(child);
        }
        Ok(detached)
    }

    pub fn parent(&self, object: ObjectHandle) -> Option<ObjectHandle> {
        self.hierarchy.parent(&self.objects, object)
    }

    pub fn children(&self, object: ObjectHandle) -> Vec<ObjectHandle> {
        self.hierarchy.children(&self.objects, object)
    }

    pub fn descendants(&self, object: ObjectHandle) -> Vec<ObjectHandle> {
        self.hierarchy.descendants(&self.objects, object)
    }

    // ── Systems ──────────────────────────────────────────────────────

    /// Register a system: collect its requirements, track every existing
    /// object that matches, then run `on_startup`.
    pub fn add_system<S: System>(&mut self, mut system: S) -> EcsResult<SystemId> {
        let name = system.name();
        if self.system_index::<S>().is_some() {
            log::error!("system `{name}` is already registered");
            return Err(EcsError::DuplicateSystem {
                name: name.to_string(),
            });
        }
        let mut requirements = Requirements {
            store: &mut self.components,
            mask: ComponentMask::EMPTY,
        };
        system.register_requirements(&mut requirements)?;
        let required = requirements.mask;

        let index = self.systems.len();
        let id = SystemId(index);
        self.systems.push(Some(SystemSlot {
            name,
            type_id: TypeId::of::<S>(),
            tracked: TrackedObjects::new(system.sorted()),
            system: Some(Box::new(system)),
            required,
            receiver: self.events.receiver(),
            retired: false,
        }));

        let Parts {
            view,
            events,
            systems,
            ..
        } = self.parts();
        if let Some(Some(slot)) = systems.get_mut(index) {
            for object in view.objects.iter() {
                let mask = view.objects.mask(object).ok();
                sync_membership(slot, id, view, events, object, mask);
            }
            if let Some(system) = slot.system.as_mut() {
                let mut hooks = SystemHooks {
                    view,
                    events,
                    receiver: slot.receiver.id(),
                    tracked: &slot.tracked,
                    id,
                };
                system.on_startup(&mut hooks);
            }
            log::info!("added system `{name}` tracking {} objects", slot.tracked.len());
        }
        Ok(id)
    }

    fn system_index<S: System>(&self) -> Option<usize> {
        let type_id = TypeId::of::<S>();
        self.systems.iter().position(|slot| {
            slot.as_ref()
                .is_some_and(|slot| !slot.retired && slot.type_id == type_id)
        })
    }

    fn slot(&self, id: SystemId) -> Option<&SystemSlot> {
        self.systems
            .get(id.0)
            .and_then(Option::as_ref)
            .filter(|slot| !slot.retired)
    }

    /// Unregister a system: its subscriptions end, its tracked list is
    /// released and `on_shutdown` runs. A system removing itself is shut
    /// down as soon as its current hook returns.
    pub fn remove_system<S: System>(&mut self) -> EcsResult<()> {
        let Some(index) = self.system_index::<S>() else {
            let full = std::any::type_name::<S>();
            return Err(EcsError::UnknownSystem {
                name: full.rsplit("::").next().unwrap_or(full).to_string(),
            });
        };
        let Some(slot) = self.systems[index].as_mut() else {
            return Ok(());
        };
        slot.retired = true;
        if slot.system.is_some() {
            if let Some(slot) = self.systems[index].take() {
                shut_down(slot);
            }
        }
        Ok(())
    }

    pub fn system_id<S: System>(&self) -> Option<SystemId> {
        self.system_index::<S>().map(SystemId)
    }

    pub fn get_system<S: System>(&self) -> Option<&S> {
        let index = self.system_index::<S>()?;
        let system = self.systems[index].as_ref()?.system.as_deref()?;
        downcast_ref(system)
    }

    pub fn get_system_mut<S: System>(&mut self) -> Option<&mut S> {
        let index = self.system_index::<S>()?;
        let system = self.systems[index].as_mut()?.system.as_deref_mut()?;
        downcast_mut(system)
    }

    pub fn system_count(&self) -> usize {
        self.systems
            .iter()
            .filter(|slot| slot.as_ref().is_some_and(|slot| !slot.retired))
            .count()
    }

    pub(crate) fn tracked_objects(&self, id: SystemId) -> Option<&TrackedObjects> {
        self.slot(id).map(|slot| &slot.tracked)
    }

    /// Snapshot of a system's tracked list.
    pub fn tracked(&self, id: SystemId) -> Vec<ObjectHandle> {
        self.tracked_objects(id)
            .map(TrackedObjects::handles)
            .unwrap_or_default()
    }

    pub fn system_receiver(&self, id: SystemId) -> Option<ReceiverId> {
        self.slot(id).map(|slot| slot.receiver.id())
    }

    /// Walk a system's tracked list with full world access. Membership
    /// changes made by `f` to this list are applied after the walk.
    pub fn for_each_tracked(&mut self, id: SystemId, mut f: impl FnMut(&mut World, ObjectHandle)) {
        let Some(tracked) = self.tracked_objects(id).cloned() else {
            return;
        };
        tracked.lock();
        let mut index = 0;
        while let Some(object) = tracked.get(index) {
            f(self, object);
            index += 1;
        }
        tracked.unlock();
    }

    fn notify_systems(&mut self, object: ObjectHandle, mask: Option<ComponentMask>) {
        let Parts {
            view,
            events,
            systems,
            rechecks,
        } = self.parts();
        for (index, slot) in systems.iter_mut().enumerate() {
            let Some(slot) = slot else {
                continue;
            };
            if slot.retired {
                continue;
            }
            if slot.system.is_none() {
                rechecks.push((index, object));
                continue;
            }
            sync_membership(slot, SystemId(index), view, events, object, mask);
        }
    }

    fn flush_rechecks(&mut self) {
        if self.rechecks.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.rechecks);
        let Parts {
            view,
            events,
            systems,
            ..
        } = self.parts();
        for (index, object) in pending {
            let Some(Some(slot)) = systems.get_mut(index) else {
                continue;
            };
            if slot.retired {
                continue;
            }
            let mask = view.objects.mask(object).ok();
            sync_membership(slot, SystemId(index), view, events, object, mask);
        }
    }

    /// Take a system out of its slot, run `hook` with the whole world, put
    /// it back and settle whatever changed meanwhile.
    fn run_system(&mut self, index: usize, hook: impl FnOnce(&mut dyn System, &mut SystemContext<'_>)) {
        let Some(slot) = self.systems.get_mut(index).and_then(Option::as_mut) else {
            return;
        };
        if slot.retired {
            return;
        }
        let Some(mut system) = slot.system.take() else {
            return;
        };

        let mut ctx = SystemContext {
            world: self,
            id: SystemId(index),
        };
        hook(system.as_mut(), &mut ctx);

        if let Some(slot) = self.systems.get_mut(index).and_then(Option::as_mut) {
            slot.system = Some(system);
            if slot.retired {
                if let Some(slot) = self.systems[index].take() {
                    shut_down(slot);
                }
            }
        }
        self.flush_rechecks();
    }

    // ── Frame ────────────────────────────────────────────────────────

    /// Run every system's `update` in registration order.
    pub fn update(&mut self, dt: f32) {
        self.delta_time = dt;
        #[cfg(feature = "diagnostics")]
        self.timings.clear();

        for index in 0..self.systems.len() {
            #[cfg(feature = "diagnostics")]
            let (start, name) = (
                Instant::now(),
                self.systems[index].as_ref().map(|slot| slot.name),
            );

            self.run_system(index, |system, ctx| system.update(ctx, dt));

            #[cfg(feature = "diagnostics")]
            {
                if let Some(name) = name {
                    self.timings.push(SystemTiming {
                        name: name.to_string(),
                        duration_us: start.elapsed().as_secs_f64() * 1_000_000.0,
                    });
                }
            }
        }
    }

    /// Forward one input event to every system.
    pub fn process_event(&mut self, event: &InputEvent) {
        for index in 0..self.systems.len() {
            self.run_system(index, |system, ctx| system.process_event(ctx, event));
        }
    }

    /// Let every system draw onto `surface`.
    pub fn render(&self, surface: &mut dyn RenderSurface) {
        for (index, slot) in self.systems.iter().enumerate() {
            let Some(slot) = slot.as_ref().filter(|slot| !slot.retired) else {
                continue;
            };
            let Some(system) = slot.system.as_deref() else {
                continue;
            };
            let ctx = RenderContext {
                world: self,
                id: SystemId(index),
            };
            system.render(&ctx, surface);
        }
    }

    /// One frame: update, render, then the input gathered for this frame.
    pub fn run_frame(&mut self, dt: f32, events: &[InputEvent], surface: &mut dyn RenderSurface) {
        self.update(dt);
        self.render(surface);
        for event in events {
            self.process_event(event);
        }
    }

    /// `dt` passed to the latest [`update`](World::update).
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    #[cfg(feature = "diagnostics")]
    pub fn system_timings(&self) -> &[SystemTiming] {
        &self.timings
    }

    #[cfg(feature = "diagnostics")]
    pub(crate) fn tracked_lengths(&self) -> Vec<(&'static str, usize)> {
        self.systems
            .iter()
            .flatten()
            .filter(|slot| !slot.retired)
            .map(|slot| (slot.name, slot.tracked.len()))
            .collect()
    }

    // ── Spatial queries and events ───────────────────────────────────

    /// Visit every indexed object within `radius` of `center`.
    pub fn query_radius(&self, center: Vec2, radius: f32, visitor: impl FnMut(ObjectHandle)) {
        self.spatial.query_radius(center, radius, visitor);
    }

    pub fn query_region(&self, region: Rect, visitor: impl FnMut(ObjectHandle)) {
        self.spatial.query_region(region, visitor);
    }

    pub fn nearby(&self, center: Vec2, radius: f32) -> Vec<ObjectHandle> {
        self.spatial.nearby(center, radius)
    }

    pub fn spatial(&self) -> &SpatialIndex {
        &self.spatial
    }

    /// Direct access for region entries and custom placements.
    pub fn spatial_mut(&mut self) -> &mut SpatialIndex {
        &mut self.spatial
    }

    /// Discard the grid and re-insert every indexed object at its world
    /// position. Region entries added through
    /// [`spatial_mut`](World::spatial_mut) are dropped.
    pub fn rebuild_spatial_index(&mut self) {
        self.spatial.clear();
        let placements: Vec<(ObjectHandle, Vec2)> = {
            let view = self.view();
            self.objects
                .iter()
                .filter(|object| view.get::<Transform>(*object).is_some_and(Transform::is_indexed))
                .map(|object| (object, view.world_transform(object).translation))
                .collect()
        };
        log::debug!("rebuilding spatial index with {} objects", placements.len());
        for (object, position) in placements {
            self.spatial.insert(object, position);
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for World {
    fn drop(&mut self) {
        for index in (0..self.systems.len()).rev() {
            if let Some(slot) = self.systems[index].take() {
                shut_down(slot);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::ecs::component::Dependencies;
    use crate::render::{DrawList, Quad, RenderSystem};

    #[derive(Debug, Default, PartialEq)]
    struct Health(i32);

    impl Component for Health {
        fn set_value(&mut self, field: &str, value: &str) -> Result<(), FieldError> {
            match field {
                "Value" => self.0 = value.parse().map_err(|_| FieldError::Invalid)?,
                _ => return Err(FieldError::Unknown),
            }
            Ok(())
        }

        fn get_values(&self) -> Vec<(String, String)> {
            vec![("Value".into(), self.0.to_string())]
        }
    }

    #[derive(Debug, Default)]
    struct Velocity(Vec2);

    impl Component for Velocity {}

    /// Requires `Health`, so adding it pulls one in.
    #[derive(Debug, Default)]
    struct Armor;

    impl Component for Armor {
        fn dependencies(deps: &mut Dependencies) {
            deps.require::<Health>();
        }
    }

    /// Moves everything with a velocity and logs membership changes.
    #[derive(Default)]
    struct Movement {
        log: Rc<RefCell<Vec<String>>>,
    }

    impl System for Movement {
        fn register_requirements(&mut self, requirements: &mut Requirements<'_>) -> EcsResult<()> {
            requirements.require::<Transform>()?.require::<Velocity>()?;
            Ok(())
        }

        fn on_startup(&mut self, _ctx: &mut SystemHooks<'_>) {
            self.log.borrow_mut().push("startup".into());
        }

        fn on_shutdown(&mut self) {
            self.log.borrow_mut().push("shutdown".into());
        }

        fn on_component_added(&mut self, _ctx: &mut SystemHooks<'_>, object: ObjectHandle) {
            self.log.borrow_mut().push(format!("added {object}"));
        }

        fn on_component_removed(&mut self, _ctx: &mut SystemHooks<'_>, object: ObjectHandle) {
            self.log.borrow_mut().push(format!("removed {object}"));
        }

        fn update(&mut self, ctx: &mut SystemContext<'_>, dt: f32) {
            ctx.for_each_tracked(|world, object| {
                let Ok(velocity) = world.get_component::<Velocity>(object) else {
                    return;
                };
                let delta = velocity.0 * dt;
                world.translate(object, delta).unwrap();
            });
        }
    }

    /// Strips the velocity from every object it visits.
    #[derive(Default)]
    struct Brake;

    impl System for Brake {
        fn register_requirements(&mut self, requirements: &mut Requirements<'_>) -> EcsResult<()> {
            requirements.require::<Velocity>()?;
            Ok(())
        }

        fn update(&mut self, ctx: &mut SystemContext<'_>, _dt: f32) {
            let mut visited = 0;
            ctx.for_each_tracked(|world, object| {
                visited += 1;
                world.remove_component::<Velocity>(object).unwrap();
            });
            assert_eq!(visited, 3, "removals during the walk must be deferred");
        }
    }

    /// Records log output per test thread.
    mod capture {
        use std::cell::RefCell;
        use std::sync::Once;

        thread_local! {
            static RECORDS: RefCell<Vec<(log::Level, String)>> = const { RefCell::new(Vec::new()) };
        }

        struct Capture;

        impl log::Log for Capture {
            fn enabled(&self, _metadata: &log::Metadata<'_>) -> bool {
                true
            }

            fn log(&self, record: &log::Record<'_>) {
                RECORDS.with(|records| {
                    records
                        .borrow_mut()
                        .push((record.level(), record.args().to_string()));
                });
            }

            fn flush(&self) {}
        }

        static CAPTURE: Capture = Capture;
        static INSTALL: Once = Once::new();

        /// Run `f` and return what it logged on this thread.
        pub fn logs(f: impl FnOnce()) -> Vec<(log::Level, String)> {
            INSTALL.call_once(|| {
                if log::set_logger(&CAPTURE).is_ok() {
                    log::set_max_level(log::LevelFilter::Trace);
                }
            });
            RECORDS.with(|records| records.borrow_mut().clear());
            f();
            RECORDS.with(|records| records.borrow_mut().drain(..).collect())
        }
    }

    fn origin(world: &mut World) -> ObjectHandle {
        world.create_object(Vec2::ZERO, 0.0, Vec2::ONE)
    }

    #[test]
    fn created_object_has_only_a_transform() {
        let mut world = World::new();
        let object = origin(&mut world);

        let transform = world.kind_of::<Transform>().unwrap();
        assert_eq!(world.component_mask(object).unwrap(), ComponentMask::from_kind(transform));
        assert!(world.has_component::<Transform>(object));
        assert!(
            world
                .object_flags(object)
                .unwrap()
                .contains(ObjectFlags::CONSTRUCTION_COMPLETE)
        );
        assert_eq!(world.nearby(Vec2::ZERO, 1.0), vec![object]);
    }

    #[test]
    fn add_get_remove_component() {
        let mut world = World::new();
        let object = origin(&mut world);

        world.add_component(object, Health(10)).unwrap().0 += 5;
        assert_eq!(world.get_component::<Health>(object).unwrap(), &Health(15));

        assert!(world.remove_component::<Health>(object).unwrap());
        assert!(!world.remove_component::<Health>(object).unwrap());
        assert!(matches!(
            world.get_component::<Health>(object),
            Err(EcsError::MissingComponent { kind: "Health", .. })
        ));
    }

    #[test]
    fn duplicate_component_is_rejected() {
        let mut world = World::new();
        let object = origin(&mut world);
        world.add_component(object, Health(1)).unwrap();

        let err = world.add_component(object, Health(2)).unwrap_err();
        assert!(matches!(err, EcsError::DuplicateComponent { kind: "Health", .. }));
        assert_eq!(world.get_component::<Health>(object).unwrap(), &Health(1));
    }

    #[test]
    fn transform_cannot_be_removed() {
        let mut world = World::new();
        let object = origin(&mut world);
        assert!(matches!(
            world.remove_component::<Transform>(object),
            Err(EcsError::MandatoryComponent { kind: "Transform" })
        ));
        assert!(world.has_component::<Transform>(object));
    }

    #[test]
    fn transform_is_not_handed_out_mutably() {
        let mut world = World::new();
        let object = origin(&mut world);
        assert!(matches!(
            world.get_component_mut::<Transform>(object),
            Err(EcsError::WorldManagedComponent { kind: "Transform" })
        ));

        world
            .set_component_value(object, "Transform", "Position", "5000,5000")
            .unwrap();
        assert_eq!(world.world_position(object).unwrap(), Vec2::splat(5000.0));
        assert_eq!(world.nearby(Vec2::splat(5000.0), 1.0), vec![object]);
        assert!(world.nearby(Vec2::ZERO, 1.0).is_empty());
    }

    #[test]
    fn stale_handles_are_logged_with_operation_and_kind() {
        let mut world = World::new();
        let object = origin(&mut world);
        world.destroy_object(object).unwrap();
        let handle = object.to_string();

        let records = capture::logs(|| {
            assert!(world.add_component(object, Health(1)).is_err());
            assert!(world.set_position(object, Vec2::ONE).is_err());
            assert!(world.remove_component::<Health>(object).is_err());
        });
        let warned = |op: &str, kind: &str| {
            records.iter().any(|(level, message)| {
                *level == log::Level::Warn
                    && message.starts_with(op)
                    && message.contains(kind)
                    && message.contains(&handle)
            })
        };
        assert!(warned("add_component", "Health"));
        assert!(warned("set_position", "Transform"));
        assert!(warned("remove_component", "Health"));
    }

    #[test]
    fn removing_an_absent_component_is_traced() {
        let mut world = World::new();
        world.register_component::<Health>().unwrap();
        let object = origin(&mut world);

        let records = capture::logs(|| {
            assert!(!world.remove_component::<Health>(object).unwrap());
            assert!(!world.remove_component::<Velocity>(object).unwrap());
        });
        let traced = |needle: &str| {
            records
                .iter()
                .any(|(level, message)| *level == log::Level::Trace && message.contains(needle))
        };
        assert!(traced("has no `Health`"));
        assert!(traced("`Velocity` is not registered"));
    }

    #[test]
    fn required_kinds_are_added_with_defaults() {
        let mut world = World::new();
        let object = origin(&mut world);
        world.add_component(object, Armor).unwrap();

        assert_eq!(world.get_component::<Health>(object).unwrap(), &Health(0));
        let health = world.kind_of::<Health>().unwrap();
        assert!(world.component_mask(object).unwrap().has(health));
    }

    #[test]
    fn stale_handles_are_rejected() {
        let mut world = World::new();
        let object = origin(&mut world);
        assert!(world.destroy_object(object).unwrap());

        assert!(!world.is_alive(object));
        assert!(!world.destroy_object(object).unwrap());
        assert!(matches!(
            world.add_component(object, Health(1)),
            Err(EcsError::InvalidHandle { .. })
        ));

        let reused = origin(&mut world);
        assert_eq!(reused.index(), object.index());
        assert_ne!(reused.generation(), object.generation());
        assert!(matches!(
            world.destroy_object(ObjectHandle::new(99, 0)),
            Err(EcsError::InvalidHandle { .. })
        ));
    }

    #[test]
    fn destroy_removes_from_spatial_index_and_systems() {
        let mut world = World::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let id = world.add_system(Movement { log: log.clone() }).unwrap();
        let object = origin(&mut world);
        world.add_component(object, Velocity(Vec2::X)).unwrap();
        assert_eq!(world.tracked(id), vec![object]);

        world.destroy_object(object).unwrap();
        assert!(world.tracked(id).is_empty());
        assert!(world.spatial().is_empty());
        assert_eq!(
            *log.borrow(),
            vec!["startup".to_string(), format!("added {object}"), format!("removed {object}")]
        );
    }

    #[test]
    fn system_tracks_existing_and_new_objects() {
        let mut world = World::new();
        let early = origin(&mut world);
        world.add_component(early, Velocity(Vec2::X)).unwrap();
        let bystander = origin(&mut world);

        let id = world.add_system(Movement::default()).unwrap();
        assert_eq!(world.tracked(id), vec![early]);

        let late = origin(&mut world);
        world.add_component(late, Velocity(Vec2::Y)).unwrap();
        assert_eq!(world.tracked(id), vec![early, late]);

        world.remove_component::<Velocity>(early).unwrap();
        assert_eq!(world.tracked(id), vec![late]);
        assert!(!world.tracked(id).contains(&bystander));
    }

    #[test]
    fn update_moves_objects_and_rebuckets_them() {
        let mut world = World::new();
        world.add_system(Movement::default()).unwrap();
        let object = origin(&mut world);
        world.add_component(object, Velocity(Vec2::new(450.0, 0.0))).unwrap();

        world.update(1.0);

        assert_eq!(world.world_position(object).unwrap(), Vec2::new(450.0, 0.0));
        assert!(world.nearby(Vec2::ZERO, 10.0).is_empty());
        assert_eq!(world.nearby(Vec2::new(450.0, 0.0), 10.0), vec![object]);
        assert_eq!(world.delta_time(), 1.0);
    }

    #[test]
    fn removals_during_own_walk_are_deferred() {
        let mut world = World::new();
        let id = world.add_system(Brake).unwrap();
        for _ in 0..3 {
            let object = origin(&mut world);
            world.add_component(object, Velocity(Vec2::ONE)).unwrap();
        }
        assert_eq!(world.tracked(id).len(), 3);

        world.update(0.016);
        assert!(world.tracked(id).is_empty());
    }

    #[test]
    fn duplicate_and_unknown_systems() {
        let mut world = World::new();
        world.add_system(Movement::default()).unwrap();
        assert!(matches!(
            world.add_system(Movement::default()),
            Err(EcsError::DuplicateSystem { .. })
        ));
        assert!(matches!(
            world.remove_system::<Brake>(),
            Err(EcsError::UnknownSystem { name }) if name == "Brake"
        ));
    }

    #[test]
    fn remove_system_runs_shutdown_and_releases_list() {
        let mut world = World::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let id = world.add_system(Movement { log: log.clone() }).unwrap();
        let object = origin(&mut world);
        world.add_component(object, Velocity(Vec2::X)).unwrap();

        world.remove_system::<Movement>().unwrap();
        assert!(world.get_system::<Movement>().is_none());
        assert!(world.tracked(id).is_empty());
        assert_eq!(world.system_count(), 0);
        assert_eq!(log.borrow().last().map(String::as_str), Some("shutdown"));

        // Component changes no longer reach it.
        world.remove_component::<Velocity>(object).unwrap();
        assert_eq!(log.borrow().len(), 3);
    }

    #[test]
    fn get_system_downcasts() {
        let mut world = World::new();
        world.add_system(Movement::default()).unwrap();
        assert!(world.get_system::<Movement>().is_some());
        assert!(world.get_system_mut::<Movement>().is_some());
        assert!(world.get_system::<Brake>().is_none());
    }

    #[test]
    fn children_follow_parent_in_spatial_index() {
        let mut world = World::new();
        let parent = world.create_object(Vec2::new(100.0, 0.0), 0.0, Vec2::ONE);
        let child = world
            .create_object_with(ObjectOptions::at(Vec2::new(10.0, 0.0)).child_of(parent))
            .unwrap();

        assert_eq!(world.parent(child), Some(parent));
        assert_eq!(world.children(parent), vec![child]);
        assert_eq!(world.world_position(child).unwrap(), Vec2::new(110.0, 0.0));
        assert_eq!(world.transform(child).unwrap().layer(), 1);

        world.set_position(parent, Vec2::new(1000.0, 0.0)).unwrap();
        assert!(world.nearby(Vec2::new(1010.0, 0.0), 1.0).contains(&child));
        assert!(!world.nearby(Vec2::new(110.0, 0.0), 1.0).contains(&child));
    }

    #[test]
    fn destroying_parent_leaves_children_as_roots() {
        let mut world = World::new();
        let parent = world.create_object(Vec2::new(500.0, 0.0), 0.0, Vec2::ONE);
        let child = world
            .create_object_with(ObjectOptions::at(Vec2::new(10.0, 0.0)).child_of(parent))
            .unwrap();

        world.destroy_object(parent).unwrap();
        assert!(world.is_alive(child));
        assert_eq!(world.parent(child), None);
        assert_eq!(world.world_position(child).unwrap(), Vec2::new(10.0, 0.0));
        assert_eq!(world.nearby(Vec2::new(10.0, 0.0), 1.0), vec![child]);
    }

    #[test]
    fn destroy_recursive_takes_the_subtree() {
        let mut world = World::new();
        let root = origin(&mut world);
        let a = world.create_object_with(ObjectOptions::default().child_of(root)).unwrap();
        let _b = world.create_object_with(ObjectOptions::default().child_of(a)).unwrap();
        let keep = origin(&mut world);

        assert_eq!(world.destroy_recursive(root).unwrap(), 3);
        assert_eq!(world.objects(), vec![keep]);
    }

    #[test]
    fn attach_rejects_cycles() {
        let mut world = World::new();
        let a = origin(&mut world);
        let b = world.create_object_with(ObjectOptions::default().child_of(a)).unwrap();
        assert!(matches!(world.attach_child(b, a), Err(EcsError::HierarchyCycle { .. })));
        assert!(matches!(world.attach_child(a, a), Err(EcsError::HierarchyCycle { .. })));
        assert!(world.detach_child(b).unwrap());
        assert!(!world.detach_child(b).unwrap());
    }

    #[test]
    fn unindexed_objects_stay_out_of_queries() {
        let mut world = World::new();
        let hidden = world
            .create_object_with(ObjectOptions::at(Vec2::ZERO).without_spatial())
            .unwrap();
        assert!(world.nearby(Vec2::ZERO, 50.0).is_empty());
        world.rebuild_spatial_index();
        assert!(world.nearby(Vec2::ZERO, 50.0).is_empty());
        assert!(world.is_alive(hidden));
    }

    #[test]
    fn string_values() {
        let mut world = World::new();
        world.register_component::<Health>().unwrap();
        let object = origin(&mut world);

        world.add_component_by_name(object, "Health").unwrap();
        world.set_component_value(object, "Health", "Value", "42").unwrap();
        assert_eq!(world.get_component::<Health>(object).unwrap(), &Health(42));

        world.set_component_value(object, "Transform", "Position", "300,0").unwrap();
        assert_eq!(world.nearby(Vec2::new(300.0, 0.0), 1.0), vec![object]);

        assert!(matches!(
            world.set_component_value(object, "Health", "Mana", "1"),
            Err(EcsError::UnknownField { kind: "Health", .. })
        ));
        assert!(matches!(
            world.set_component_value(object, "Health", "Value", "lots"),
            Err(EcsError::InvalidValue { .. })
        ));
        assert!(matches!(
            world.add_component_by_name(object, "Mana"),
            Err(EcsError::UnknownComponent { .. })
        ));

        let values = world.component_values(object).unwrap();
        assert_eq!(values[0].0, "Transform");
        assert_eq!(values[1], ("Health", vec![("Value".to_string(), "42".to_string())]));
    }

    #[test]
    fn render_order_follows_z_changes() {
        let mut world = World::new();
        let id = world.add_system(RenderSystem::new()).unwrap();
        let objects: Vec<ObjectHandle> = (0..3)
            .map(|i| {
                let object = world.create_object(Vec2::splat(i as f32), 0.0, Vec2::ONE);
                world.set_z_order(object, 10 * (i + 1)).unwrap();
                world.add_component(object, Quad::default()).unwrap();
                object
            })
            .collect();
        assert_eq!(world.tracked(id), objects);

        world.set_z_order(objects[0], 100).unwrap();
        assert_eq!(world.tracked(id), vec![objects[1], objects[2], objects[0]]);

        let mut surface = DrawList::default();
        world.render(&mut surface);
        assert_eq!(surface.len(), 3);
    }

    #[test]
    fn non_renderable_objects_are_not_drawn() {
        let mut world = World::new();
        let id = world.add_system(RenderSystem::new()).unwrap();
        let plain = origin(&mut world);
        world.add_component(plain, Health(1)).unwrap();
        assert!(world.tracked(id).is_empty());

        let drawn = origin(&mut world);
        world.add_component(drawn, Quad::default()).unwrap();
        world.remove_component::<Quad>(drawn).unwrap();
        assert!(world.tracked(id).is_empty());
    }

    #[test]
    fn user_data_round_trip() {
        let mut world = World::new();
        let object = origin(&mut world);
        let user_data = u128::from(object.to_bits());
        assert_eq!(world.object_from_user_data(user_data), Some(object));
        assert_eq!(world.object_from_user_data(u128::MAX), None);

        world.destroy_object(object).unwrap();
        assert_eq!(world.object_from_user_data(user_data), None);
    }

    #[test]
    fn destroy_all_keeps_systems() {
        let mut world = World::new();
        let id = world.add_system(Movement::default()).unwrap();
        for _ in 0..4 {
            let object = origin(&mut world);
            world.add_component(object, Velocity(Vec2::X)).unwrap();
        }
        world.destroy_all();
        assert_eq!(world.object_count(), 0);
        assert!(world.tracked(id).is_empty());
        assert_eq!(world.system_count(), 1);
    }
}
