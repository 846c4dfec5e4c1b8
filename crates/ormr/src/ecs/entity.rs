//! # Objects: Generational Handles and the Object Table
//!
//! An [`ObjectHandle`] is just a number. It doesn't "contain" anything: the
//! [`World`](super::world::World) maps the handle's slot index to a component
//! mask and to one entry in every component pool.
//!
//! ## Design: Generational Indices
//!
//! Slots are recycled, so a bare index would silently start pointing at a
//! different object after a destroy/create pair:
//!
//! ```text
//! 1. Create object #5
//! 2. Store a reference: saved = ObjectHandle(5)
//! 3. Destroy object #5
//! 4. Create a new object, gets recycled slot #5
//! 5. Use `saved`, which now refers to the wrong object!
//! ```
//!
//! Each slot therefore carries a **generation** counter that is bumped on
//! destroy. A handle is valid only while its generation equals the slot's.
//!
//! ```text
//! ObjectHandle { index: 5, generation: 0 }  ← original
//! ObjectHandle { index: 5, generation: 1 }  ← after recycle
//! ```
//!
//! ## Memory Layout
//!
//! ```text
//! slots:     [ {gen 0, mask 0b011, alive}, {gen 1, mask 0, free}, ... ]
//! free_list: [1]          ← slots available for reuse (LIFO)
//! ```

use std::fmt;

use super::mask::ComponentMask;
use crate::error::{EcsError, EcsResult};

/// A lightweight, copyable handle to an object in a [`World`](super::world::World).
///
/// Handles own nothing. They are only meaningful for the world that issued
/// them, and only while their generation matches the slot's.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl ObjectHandle {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index. Also the index into every component pool.
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }

    /// Pack the handle into a single integer, e.g. for a physics body's
    /// user-data slot. Generation in the high half, index in the low half.
    pub fn to_bits(self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }

    /// Inverse of [`to_bits`](Self::to_bits). The result may be stale; check
    /// it with [`World::is_alive`](super::world::World::is_alive).
    pub fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Per-object lifecycle flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObjectFlags(u8);

impl ObjectFlags {
    pub const NONE: Self = Self(0);
    /// Creation finished: the mandatory transform exists and the object is
    /// attached where it was asked to be.
    pub const CONSTRUCTION_COMPLETE: Self = Self(1 << 0);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

#[derive(Debug, Clone, Default)]
struct Slot {
    generation: u32,
    mask: ComponentMask,
    flags: ObjectFlags,
    alive: bool,
}

/// Allocates and recycles object slots.
///
/// When creating: pop from `free_list` if available, otherwise push a fresh
/// slot. When destroying: bump the generation, clear the mask, push the index
/// onto `free_list`.
#[derive(Debug, Default)]
pub struct ObjectTable {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
}

impl ObjectTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a slot. Reuses a freed index (whose mask is cleared) before
    /// growing the table.
    pub fn allocate(&mut self) -> ObjectHandle {
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.mask = ComponentMask::EMPTY;
            slot.flags = ObjectFlags::NONE;
            slot.alive = true;
            ObjectHandle::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                alive: true,
                ..Slot::default()
            });
            ObjectHandle::new(index, 0)
        }
    }

    /// Release a slot. Returns `false` if the handle was already stale.
    pub fn deallocate(&mut self, handle: ObjectHandle) -> bool {
        if !self.is_alive(handle) {
            return false;
        }
        let slot = &mut self.slots[handle.index as usize];
        slot.generation = slot.generation.wrapping_add(1);
        slot.mask = ComponentMask::EMPTY;
        slot.flags = ObjectFlags::NONE;
        slot.alive = false;
        self.free_list.push(handle.index);
        true
    }

    pub fn is_alive(&self, handle: ObjectHandle) -> bool {
        self.slots
            .get(handle.index as usize)
            .is_some_and(|slot| slot.alive && slot.generation == handle.generation)
    }

    /// Validate a handle and return its slot index.
    pub fn validate(&self, handle: ObjectHandle) -> EcsResult<usize> {
        if self.is_alive(handle) {
            Ok(handle.index as usize)
        } else {
            Err(EcsError::InvalidHandle { handle })
        }
    }

    /// Component mask of a live object.
    pub fn mask(&self, handle: ObjectHandle) -> EcsResult<ComponentMask> {
        let index = self.validate(handle)?;
        Ok(self.slots[index].mask)
    }

    pub(crate) fn mask_at(&self, index: usize) -> ComponentMask {
        self.slots[index].mask
    }

    pub(crate) fn mask_at_mut(&mut self, index: usize) -> &mut ComponentMask {
        &mut self.slots[index].mask
    }

    pub fn flags(&self, handle: ObjectHandle) -> EcsResult<ObjectFlags> {
        let index = self.validate(handle)?;
        Ok(self.slots[index].flags)
    }

    pub(crate) fn flags_at_mut(&mut self, index: usize) -> &mut ObjectFlags {
        &mut self.slots[index].flags
    }

    /// Handle currently living at `index`, if any.
    pub fn handle_at(&self, index: usize) -> Option<ObjectHandle> {
        self.slots
            .get(index)
            .filter(|slot| slot.alive)
            .map(|slot| ObjectHandle::new(index as u32, slot.generation))
    }

    /// Iterate over every live handle in slot order.
    pub fn iter(&self) -> impl Iterator<Item = ObjectHandle> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.alive)
            .map(|(index, slot)| ObjectHandle::new(index as u32, slot.generation))
    }

    pub fn alive_count(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    pub fn free_count(&self) -> usize {
        self.free_list.len()
    }

    /// Number of slots ever allocated. Every component pool is sized to fit.
    pub fn total_slots(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::mask::KindId;

    #[test]
    fn allocate_sequential() {
        let mut table = ObjectTable::new();
        let a = table.allocate();
        let b = table.allocate();
        assert_eq!((a.index, a.generation), (0, 0));
        assert_eq!((b.index, b.generation), (1, 0));
    }

    #[test]
    fn recycle_bumps_generation() {
        let mut table = ObjectTable::new();
        let a = table.allocate();
        assert!(table.deallocate(a));
        let reused = table.allocate();
        assert_eq!(reused.index, a.index);
        assert!(reused.generation > a.generation);
        assert!(!table.is_alive(a));
        assert!(table.is_alive(reused));
    }

    #[test]
    fn double_free_returns_false() {
        let mut table = ObjectTable::new();
        let a = table.allocate();
        assert!(table.deallocate(a));
        assert!(!table.deallocate(a));
    }

    #[test]
    fn freed_slot_with_future_generation_is_not_alive() {
        let mut table = ObjectTable::new();
        let a = table.allocate();
        table.deallocate(a);
        let forged = ObjectHandle::new(a.index, a.generation + 1);
        assert!(!table.is_alive(forged));
    }

    #[test]
    fn out_of_range_handle_is_invalid() {
        let table = ObjectTable::new();
        let bogus = ObjectHandle::new(42, 0);
        assert!(matches!(
            table.validate(bogus),
            Err(EcsError::InvalidHandle { .. })
        ));
    }

    #[test]
    fn reuse_clears_mask_and_flags() {
        let mut table = ObjectTable::new();
        let a = table.allocate();
        table.mask_at_mut(0).set(KindId(3));
        table.flags_at_mut(0).insert(ObjectFlags::CONSTRUCTION_COMPLETE);
        table.deallocate(a);
        let b = table.allocate();
        assert!(table.mask(b).unwrap().is_empty());
        assert_eq!(table.flags(b).unwrap(), ObjectFlags::NONE);
    }

    #[test]
    fn counts_track_alive_and_free() {
        let mut table = ObjectTable::new();
        let a = table.allocate();
        let _b = table.allocate();
        assert_eq!(table.alive_count(), 2);
        table.deallocate(a);
        assert_eq!(table.alive_count(), 1);
        assert_eq!(table.free_count(), 1);
        assert_eq!(table.total_slots(), 2);
        assert_eq!(table.iter().count(), 1);
    }

    #[test]
    fn bits_round_trip() {
        let handle = ObjectHandle::new(123, 9);
        assert_eq!(ObjectHandle::from_bits(handle.to_bits()), handle);
    }

    #[test]
    fn debug_and_display() {
        let handle = ObjectHandle::new(4, 2);
        assert_eq!(format!("{handle:?}"), "Object(4v2)");
        assert_eq!(handle.to_string(), "4v2");
    }
}
