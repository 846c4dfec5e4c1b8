//! # System: Per-Frame Logic Over a Tracked Subset of Objects
//!
//! A system declares which component kinds it needs. The world keeps, for
//! every system, the list of objects currently satisfying that requirement
//! and updates it *immediately* whenever a component is added or removed,
//! so systems never scan the whole object table.
//!
//! ## Lifecycle
//!
//! ```text
//! add_system ─→ register_requirements ─→ scan existing objects ─→ on_startup
//!     │
//!     ▼  every frame: update → render → process_event
//!     │
//! remove_system ─→ unsubscribe from events ─→ release tracked list ─→ on_shutdown
//! ```
//!
//! ## Iterating Safely
//!
//! A system usually walks its own tracked list while adding and removing
//! components, which can change that same list. Two command buffers keep the
//! walk valid:
//!
//! - While a [`TrackedObjects`] list is being walked (see
//!   [`World::for_each_tracked`](super::world::World::for_each_tracked)),
//!   inserts, removes and reorders are queued and applied when the walk ends.
//! - While a system's own hook is running, the world cannot ask it
//!   [`should_track`](System::should_track), so membership re-checks for that
//!   system are queued and applied as soon as the hook returns.
//!
//! Lists of *other* systems are always updated on the spot.
//!
//! ## Comparison
//!
//! - **bevy_ecs**: queries are re-matched against archetypes; no per-system
//!   object list.
//! - **EnTT**: groups/observers keep sorted per-query sets, which is the same
//!   idea as our tracked lists.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use glam::Affine2;

use super::component::{Capabilities, Component};
use super::entity::{ObjectHandle, ObjectTable};
use super::hierarchy::Hierarchy;
use super::mask::{ComponentMask, KindId};
use super::registry::ComponentStore;
use super::transform::Transform;
use super::world::World;
use crate::error::EcsResult;
use crate::event::{EventBus, ReceiverId};
use crate::input::InputEvent;
use crate::render::RenderSurface;
use crate::spatial::SpatialIndex;

/// Identifies a registered system within its world.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SystemId(pub(crate) usize);

/// Blanket `Any` access for boxed systems.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A unit of per-frame logic over the objects matching its requirements.
///
/// Only [`register_requirements`](System::register_requirements) is
/// mandatory; every hook has an empty default.
pub trait System: AsAny {
    /// Short name used in logs and diagnostics.
    fn name(&self) -> &'static str {
        let full = std::any::type_name_of_val(self);
        full.rsplit("::").next().unwrap_or(full)
    }

    /// Declare the required component kinds. Called once, when the system
    /// is added.
    fn register_requirements(&mut self, requirements: &mut Requirements<'_>) -> EcsResult<()>;

    /// Whether `object`, whose mask would be `mask`, belongs in the tracked
    /// list. Override for predicates beyond plain component presence.
    fn should_track(
        &self,
        _view: &WorldView<'_>,
        _object: ObjectHandle,
        mask: ComponentMask,
        required: ComponentMask,
    ) -> bool {
        mask.contains(required)
    }

    /// Keep the tracked list sorted by [`order_key`](System::order_key).
    /// Unsorted lists append new objects and fill a removed object's place
    /// with the last one.
    fn sorted(&self) -> bool {
        false
    }

    /// Sort key of a newly tracked object. Only used when
    /// [`sorted`](System::sorted) returns `true`.
    fn order_key(&self, _view: &WorldView<'_>, _object: ObjectHandle) -> u32 {
        0
    }

    fn on_startup(&mut self, _ctx: &mut SystemHooks<'_>) {}

    fn on_shutdown(&mut self) {}

    /// `object` just entered the tracked list.
    fn on_component_added(&mut self, _ctx: &mut SystemHooks<'_>, _object: ObjectHandle) {}

    /// `object` just left the tracked list. Its components are still
    /// readable unless the object is already gone.
    fn on_component_removed(&mut self, _ctx: &mut SystemHooks<'_>, _object: ObjectHandle) {}

    fn update(&mut self, _ctx: &mut SystemContext<'_>, _dt: f32) {}

    fn process_event(&mut self, _ctx: &mut SystemContext<'_>, _event: &InputEvent) {}

    fn render(&self, _ctx: &RenderContext<'_>, _surface: &mut dyn RenderSurface) {}
}

pub(crate) fn downcast_ref<'a, S: System>(system: &'a (dyn System + 'static)) -> Option<&'a S> {
    <dyn System as AsAny>::as_any(system).downcast_ref()
}

pub(crate) fn downcast_mut<'a, S: System>(
    system: &'a mut (dyn System + 'static),
) -> Option<&'a mut S> {
    <dyn System as AsAny>::as_any_mut(system).downcast_mut()
}

// ── Requirements ─────────────────────────────────────────────────────

/// Builder passed to [`System::register_requirements`].
pub struct Requirements<'a> {
    pub(crate) store: &'a mut ComponentStore,
    pub(crate) mask: ComponentMask,
}

impl Requirements<'_> {
    /// Require `K`, registering its pool if needed.
    pub fn require<K: Component + Default>(&mut self) -> EcsResult<&mut Self> {
        let kind = self.store.register::<K>()?;
        self.mask.set(kind);
        Ok(self)
    }

    pub fn mask(&self) -> ComponentMask {
        self.mask
    }
}

// ── Tracked list ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Command {
    Insert(ObjectHandle, u32),
    Remove(ObjectHandle),
    Reorder(ObjectHandle, u32),
}

#[derive(Debug, Default)]
struct TrackedList {
    entries: Vec<(ObjectHandle, u32)>,
    /// Sort key of every member.
    keys: HashMap<ObjectHandle, u32>,
    /// Entry index of every member. Unsorted lists only.
    positions: HashMap<ObjectHandle, usize>,
    sorted: bool,
    locks: u32,
    pending: Vec<Command>,
}

impl TrackedList {
    fn apply(&mut self, command: Command) {
        match command {
            Command::Insert(object, key) => {
                if !self.keys.contains_key(&object) {
                    self.keys.insert(object, key);
                    self.place(object, key);
                }
            }
            Command::Remove(object) => {
                if let Some(key) = self.keys.remove(&object) {
                    self.unplace(object, key);
                }
            }
            Command::Reorder(object, key) => {
                let Some(old) = self.keys.get_mut(&object).map(|k| std::mem::replace(k, key))
                else {
                    return;
                };
                if self.sorted {
                    self.unplace(object, old);
                    self.place(object, key);
                } else if let Some(&at) = self.positions.get(&object) {
                    self.entries[at].1 = key;
                }
            }
        }
    }

    fn place(&mut self, object: ObjectHandle, key: u32) {
        if self.sorted {
            let at = self.entries.partition_point(|(_, k)| *k <= key);
            self.entries.insert(at, (object, key));
        } else {
            self.positions.insert(object, self.entries.len());
            self.entries.push((object, key));
        }
    }

    /// Sorted lists binary-search the run of equal keys. Unsorted lists
    /// swap the last entry into the hole.
    fn unplace(&mut self, object: ObjectHandle, key: u32) {
        if self.sorted {
            let start = self.entries.partition_point(|(_, k)| *k < key);
            let offset = self.entries[start..]
                .iter()
                .take_while(|(_, k)| *k == key)
                .position(|(o, _)| *o == object);
            if let Some(offset) = offset {
                self.entries.remove(start + offset);
            }
        } else if let Some(at) = self.positions.remove(&object) {
            self.entries.swap_remove(at);
            if let Some(&(moved, _)) = self.entries.get(at) {
                self.positions.insert(moved, at);
            }
        }
    }

    fn submit(&mut self, command: Command) {
        if self.locks > 0 {
            self.pending.push(command);
        } else {
            self.apply(command);
        }
    }

    /// Membership once queued commands are applied.
    fn will_contain(&self, object: ObjectHandle) -> bool {
        for command in self.pending.iter().rev() {
            match *command {
                Command::Insert(o, _) if o == object => return true,
                Command::Remove(o) if o == object => return false,
                _ => {}
            }
        }
        self.keys.contains_key(&object)
    }
}

/// Shared handle to a system's tracked objects.
///
/// Cloning is cheap and yields another handle to the same list, which is how
/// event callbacks re-sort a list without going through the world.
#[derive(Debug, Clone, Default)]
pub struct TrackedObjects(Rc<RefCell<TrackedList>>);

impl TrackedObjects {
    pub(crate) fn new(sorted: bool) -> Self {
        Self(Rc::new(RefCell::new(TrackedList {
            sorted,
            ..TrackedList::default()
        })))
    }

    pub fn len(&self) -> usize {
        self.0.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_sorted(&self) -> bool {
        self.0.borrow().sorted
    }

    /// Membership, counting commands still queued behind a walk.
    pub fn contains(&self, object: ObjectHandle) -> bool {
        self.0.borrow().will_contain(object)
    }

    pub fn get(&self, index: usize) -> Option<ObjectHandle> {
        self.0.borrow().entries.get(index).map(|(o, _)| *o)
    }

    /// Snapshot in list order.
    pub fn handles(&self) -> Vec<ObjectHandle> {
        self.0.borrow().entries.iter().map(|(o, _)| *o).collect()
    }

    /// Sort key an object was placed with.
    pub fn key_of(&self, object: ObjectHandle) -> Option<u32> {
        self.0.borrow().keys.get(&object).copied()
    }

    pub(crate) fn insert(&self, object: ObjectHandle, key: u32) {
        self.0.borrow_mut().submit(Command::Insert(object, key));
    }

    pub(crate) fn remove(&self, object: ObjectHandle) {
        self.0.borrow_mut().submit(Command::Remove(object));
    }

    /// Move a tracked object to the position its new key sorts to.
    pub fn reorder(&self, object: ObjectHandle, key: u32) {
        self.0.borrow_mut().submit(Command::Reorder(object, key));
    }

    pub(crate) fn clear(&self) {
        let mut list = self.0.borrow_mut();
        list.entries.clear();
        list.keys.clear();
        list.positions.clear();
        list.pending.clear();
    }

    /// Start a walk: mutations are queued until the matching `unlock`.
    pub(crate) fn lock(&self) {
        self.0.borrow_mut().locks += 1;
    }

    pub(crate) fn unlock(&self) {
        let mut list = self.0.borrow_mut();
        list.locks = list.locks.saturating_sub(1);
        if list.locks == 0 {
            let pending = std::mem::take(&mut list.pending);
            for command in pending {
                list.apply(command);
            }
        }
    }

    /// Visit every tracked object in order. Mutations requested by `f` are
    /// deferred until the walk completes.
    pub fn walk(&self, mut f: impl FnMut(ObjectHandle)) {
        self.lock();
        let mut index = 0;
        while let Some(object) = self.get(index) {
            f(object);
            index += 1;
        }
        self.unlock();
    }
}

// ── Views and contexts ───────────────────────────────────────────────

/// Read-only access to world storage, handed to system predicates and hooks.
#[derive(Clone, Copy)]
pub struct WorldView<'a> {
    pub(crate) objects: &'a ObjectTable,
    pub(crate) components: &'a ComponentStore,
    pub(crate) hierarchy: &'a Hierarchy,
    pub(crate) spatial: &'a SpatialIndex,
}

impl<'a> WorldView<'a> {
    pub fn is_alive(&self, object: ObjectHandle) -> bool {
        self.objects.is_alive(object)
    }

    /// Mask of a live object, empty for stale handles.
    pub fn mask(&self, object: ObjectHandle) -> ComponentMask {
        self.objects.mask(object).unwrap_or_default()
    }

    pub fn kind_of<K: Component>(&self) -> Option<KindId> {
        self.components.registry().kind_of::<K>()
    }

    pub fn has<K: Component>(&self, object: ObjectHandle) -> bool {
        self.kind_of::<K>()
            .is_some_and(|kind| self.mask(object).has(kind))
    }

    pub fn get<K: Component>(&self, object: ObjectHandle) -> Option<&'a K> {
        let kind = self.kind_of::<K>()?;
        if !self.mask(object).has(kind) {
            return None;
        }
        self.components.pool::<K>()?.get(object.index as usize)
    }

    /// A component by kind id, as a trait object.
    pub fn component(&self, object: ObjectHandle, kind: KindId) -> Option<&'a dyn Component> {
        if !self.mask(object).has(kind) {
            return None;
        }
        self.components.erased(kind).get_dyn(object.index as usize)
    }

    pub fn capability_mask(&self, capability: Capabilities) -> ComponentMask {
        self.components.registry().capability_mask(capability)
    }

    /// Parent, ignoring dangling links.
    pub fn parent(&self, object: ObjectHandle) -> Option<ObjectHandle> {
        self.hierarchy.parent(self.objects, object)
    }

    pub fn children(&self, object: ObjectHandle) -> Vec<ObjectHandle> {
        self.hierarchy.children(self.objects, object)
    }

    /// World transform of the object's parent chain, identity for roots.
    pub fn parent_world_transform(&self, object: ObjectHandle) -> Affine2 {
        match self.parent(object) {
            Some(parent) => self.world_transform(parent),
            None => Affine2::IDENTITY,
        }
    }

    /// Local transforms composed from the root down.
    pub fn world_transform(&self, object: ObjectHandle) -> Affine2 {
        let mut chain = Vec::new();
        let mut current = Some(object);
        while let Some(node) = current {
            if let Some(transform) = self.get::<Transform>(node) {
                chain.push(transform.local_matrix());
            }
            current = self.parent(node);
        }
        chain
            .into_iter()
            .rev()
            .fold(Affine2::IDENTITY, |acc, local| acc * local)
    }

    pub fn spatial(&self) -> &'a SpatialIndex {
        self.spatial
    }
}

/// Passed to membership and startup hooks.
pub struct SystemHooks<'a> {
    pub view: WorldView<'a>,
    pub events: &'a EventBus,
    /// The system's own receiver; its subscriptions end with the system.
    pub receiver: ReceiverId,
    pub tracked: &'a TrackedObjects,
    pub id: SystemId,
}

/// Passed to [`System::update`] and [`System::process_event`].
pub struct SystemContext<'a> {
    pub world: &'a mut World,
    pub id: SystemId,
}

impl SystemContext<'_> {
    /// Snapshot of the tracked list.
    pub fn tracked(&self) -> Vec<ObjectHandle> {
        self.world.tracked(self.id)
    }

    /// Walk the tracked list with full world access. See
    /// [`World::for_each_tracked`].
    pub fn for_each_tracked(&mut self, f: impl FnMut(&mut World, ObjectHandle)) {
        self.world.for_each_tracked(self.id, f);
    }

    pub fn receiver(&self) -> Option<ReceiverId> {
        self.world.system_receiver(self.id)
    }
}

/// Passed to [`System::render`].
pub struct RenderContext<'a> {
    pub world: &'a World,
    pub id: SystemId,
}

impl<'a> RenderContext<'a> {
    pub fn view(&self) -> WorldView<'a> {
        self.world.view()
    }

    /// Walk the tracked list in order.
    pub fn for_each_tracked(&self, f: impl FnMut(ObjectHandle)) {
        if let Some(tracked) = self.world.tracked_objects(self.id) {
            tracked.walk(f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(index: u32) -> ObjectHandle {
        ObjectHandle::new(index, 0)
    }

    #[test]
    fn unsorted_list_keeps_insertion_order() {
        let list = TrackedObjects::new(false);
        list.insert(handle(2), 50);
        list.insert(handle(0), 10);
        list.insert(handle(1), 30);
        assert_eq!(list.handles(), vec![handle(2), handle(0), handle(1)]);
    }

    #[test]
    fn sorted_list_orders_by_key_stably() {
        let list = TrackedObjects::new(true);
        list.insert(handle(0), 20);
        list.insert(handle(1), 10);
        list.insert(handle(2), 20);
        assert_eq!(list.handles(), vec![handle(1), handle(0), handle(2)]);

        list.reorder(handle(1), 30);
        assert_eq!(list.handles(), vec![handle(0), handle(2), handle(1)]);
        assert_eq!(list.key_of(handle(1)), Some(30));
    }

    #[test]
    fn unsorted_removal_moves_last_into_the_gap() {
        let list = TrackedObjects::new(false);
        for i in 0..4 {
            list.insert(handle(i), 0);
        }
        list.remove(handle(1));
        assert_eq!(list.handles(), vec![handle(0), handle(3), handle(2)]);
        list.remove(handle(2));
        list.remove(handle(0));
        assert_eq!(list.handles(), vec![handle(3)]);
        list.insert(handle(1), 0);
        list.remove(handle(3));
        assert_eq!(list.handles(), vec![handle(1)]);
        assert!(!list.contains(handle(3)));
    }

    #[test]
    fn sorted_removal_finds_object_among_equal_keys() {
        let list = TrackedObjects::new(true);
        for i in 0..5 {
            list.insert(handle(i), if i == 4 { 1 } else { 7 });
        }
        list.remove(handle(2));
        assert_eq!(list.handles(), vec![handle(4), handle(0), handle(1), handle(3)]);
        list.reorder(handle(4), 9);
        list.remove(handle(0));
        assert_eq!(list.handles(), vec![handle(1), handle(3), handle(4)]);
        assert_eq!(list.key_of(handle(4)), Some(9));
        assert_eq!(list.key_of(handle(0)), None);
    }

    #[test]
    fn unsorted_reorder_keeps_position() {
        let list = TrackedObjects::new(false);
        list.insert(handle(0), 0);
        list.insert(handle(1), 0);
        list.reorder(handle(0), 5);
        assert_eq!(list.handles(), vec![handle(0), handle(1)]);
        assert_eq!(list.key_of(handle(0)), Some(5));
    }

    #[test]
    fn duplicate_insert_is_ignored() {
        let list = TrackedObjects::new(false);
        list.insert(handle(0), 0);
        list.insert(handle(0), 0);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn reorder_of_untracked_object_is_ignored() {
        let list = TrackedObjects::new(true);
        list.reorder(handle(9), 1);
        assert!(list.is_empty());
    }

    #[test]
    fn walk_defers_mutations_until_done() {
        let list = TrackedObjects::new(false);
        for i in 0..3 {
            list.insert(handle(i), 0);
        }
        let mut seen = Vec::new();
        let inner = list.clone();
        list.walk(|object| {
            seen.push(object);
            inner.remove(object);
            inner.insert(handle(object.index + 10), 0);
            assert!(!inner.contains(object));
        });
        assert_eq!(seen, vec![handle(0), handle(1), handle(2)]);
        assert_eq!(list.handles(), vec![handle(10), handle(11), handle(12)]);
    }

    #[test]
    fn nested_walks_apply_once_outermost_ends() {
        let list = TrackedObjects::new(false);
        list.insert(handle(0), 0);
        let inner = list.clone();
        list.walk(|_| {
            inner.walk(|_| inner.insert(handle(1), 0));
            assert_eq!(inner.len(), 1);
        });
        assert_eq!(list.len(), 2);
    }
}
