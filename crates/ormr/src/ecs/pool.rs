//! # Component Pools: Chunked, Index-Addressed Storage
//!
//! One pool per component kind. The pool is *not* densely packed: the
//! component of object slot `i` always lives at logical index `i`, so lookup
//! is a division and an array access.
//!
//! ```text
//! chunk_size = 4
//!
//! chunks[0]: [Some(a), None, Some(c), None]   ← indices 0..4
//! chunks[1]: [None, Some(f), None, None]      ← indices 4..8
//! ```
//!
//! Growth happens a whole chunk at a time and existing chunks are never
//! reallocated, so a component's address is stable until its own index is
//! destroyed or reused. Empty slots are `None` rather than uninitialized
//! memory, so there is no unsafe code here; the object's
//! [`ComponentMask`](super::mask::ComponentMask) remains the source of truth
//! about which entries are live.

use std::any::Any;

use super::component::Component;

/// Default number of entries per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Typed storage for one component kind.
pub struct ComponentPool<T> {
    chunks: Vec<Box<[Option<T>]>>,
    chunk_size: usize,
    len: usize,
}

impl<T> ComponentPool<T> {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunks: Vec::new(),
            chunk_size: chunk_size.max(1),
            len: 0,
        }
    }

    /// Number of addressable indices.
    pub fn capacity(&self) -> usize {
        self.chunks.len() * self.chunk_size
    }

    /// Number of constructed entries.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Allocate chunks until `count` indices are addressable.
    pub fn expand_to_fit(&mut self, count: usize) {
        while self.capacity() < count {
            let chunk: Box<[Option<T>]> = std::iter::repeat_with(|| None)
                .take(self.chunk_size)
                .collect();
            self.chunks.push(chunk);
        }
    }

    fn locate(&self, index: usize) -> (usize, usize) {
        (index / self.chunk_size, index % self.chunk_size)
    }

    /// Construct `value` at `index`, replacing (and dropping) anything there.
    pub fn construct(&mut self, index: usize, value: T) -> &mut T {
        self.expand_to_fit(index + 1);
        let (chunk, offset) = self.locate(index);
        let slot = &mut self.chunks[chunk][offset];
        if slot.is_none() {
            self.len += 1;
        }
        slot.insert(value)
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        let (chunk, offset) = self.locate(index);
        self.chunks.get(chunk)?.get(offset)?.as_ref()
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        let (chunk, offset) = self.locate(index);
        self.chunks.get_mut(chunk)?.get_mut(offset)?.as_mut()
    }

    /// Move the entry at `index` out of the pool.
    pub fn take(&mut self, index: usize) -> Option<T> {
        let (chunk, offset) = self.locate(index);
        let taken = self.chunks.get_mut(chunk)?.get_mut(offset)?.take();
        if taken.is_some() {
            self.len -= 1;
        }
        taken
    }
}

/// Kind-agnostic view of a pool, used by the world when it only has a
/// [`KindId`](super::mask::KindId).
pub(crate) trait ErasedPool {
    fn expand_to_fit(&mut self, count: usize);
    fn construct_default(&mut self, index: usize);
    /// Drop the entry at `index`. Returns `false` if it was empty.
    fn destroy(&mut self, index: usize) -> bool;
    fn get_dyn(&self, index: usize) -> Option<&dyn Component>;
    fn get_dyn_mut(&mut self, index: usize) -> Option<&mut dyn Component>;
    fn chunk_count(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component + Default> ErasedPool for ComponentPool<T> {
    fn expand_to_fit(&mut self, count: usize) {
        ComponentPool::expand_to_fit(self, count);
    }

    fn construct_default(&mut self, index: usize) {
        self.construct(index, T::default());
    }

    fn destroy(&mut self, index: usize) -> bool {
        self.take(index).is_some()
    }

    fn get_dyn(&self, index: usize) -> Option<&dyn Component> {
        self.get(index).map(|c| c as &dyn Component)
    }

    fn get_dyn_mut(&mut self, index: usize) -> Option<&mut dyn Component> {
        self.get_mut(index).map(|c| c as &mut dyn Component)
    }

    fn chunk_count(&self) -> usize {
        ComponentPool::chunk_count(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
