//! Component kinds and the per-object kind bitset.

use std::fmt;

/// Maximum number of distinct component kinds a world can register.
pub const MAX_COMPONENT_KINDS: usize = 32;

/// Small integer identifying a registered component kind.
///
/// Assigned in registration order by the kind registry. Never persisted.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct KindId(pub(crate) u8);

impl KindId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for KindId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kind#{}", self.0)
    }
}

/// Fixed-width bitset with one bit per component kind.
///
/// Bit *k* of an object's mask is set exactly when pool *k* holds a
/// constructed component at the object's index.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ComponentMask(u32);

impl ComponentMask {
    pub const EMPTY: Self = Self(0);

    pub fn from_kind(kind: KindId) -> Self {
        Self(1 << kind.0)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn has(self, kind: KindId) -> bool {
        self.0 & (1 << kind.0) != 0
    }

    pub fn set(&mut self, kind: KindId) {
        self.0 |= 1 << kind.0;
    }

    pub fn clear(&mut self, kind: KindId) {
        self.0 &= !(1 << kind.0);
    }

    pub fn with(mut self, kind: KindId) -> Self {
        self.set(kind);
        self
    }

    pub fn without(mut self, kind: KindId) -> Self {
        self.clear(kind);
        self
    }

    /// `true` if every bit of `required` is also set here.
    pub fn contains(self, required: Self) -> bool {
        self.0 & required.0 == required.0
    }

    /// `true` if at least one bit is shared.
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Kinds whose bit is set, lowest first.
    pub fn iter(self) -> impl Iterator<Item = KindId> {
        (0..MAX_COMPONENT_KINDS as u8)
            .filter(move |&bit| self.0 & (1u32 << bit) != 0)
            .map(KindId)
    }
}

impl fmt::Debug for ComponentMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentMask({:#034b})", self.0)
    }
}
