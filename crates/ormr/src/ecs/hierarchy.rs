//! # Object Hierarchies: Parent/Child Links
//!
//! Parent/child links live in an arena indexed by object slot, next to the
//! object table rather than inside a component. Each node stores the parent
//! handle and the list of child handles.
//!
//! Links are never trusted blindly: a handle is only followed if it is still
//! alive, so destroying a parent leaves its children as roots without anyone
//! having to walk and patch them.
//!
//! ```text
//!   a ──┬── b ── d          descendants(a) = [b, c, d]   (breadth first)
//!       └── c
//! ```

use std::collections::VecDeque;

use super::entity::{ObjectHandle, ObjectTable};

#[derive(Debug, Clone, Default)]
struct Node {
    parent: Option<ObjectHandle>,
    children: Vec<ObjectHandle>,
}

/// Parent/child arena, one node per object slot.
#[derive(Debug, Default)]
pub struct Hierarchy {
    nodes: Vec<Node>,
}

impl Hierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn expand_to_fit(&mut self, slots: usize) {
        if self.nodes.len() < slots {
            self.nodes.resize_with(slots, Node::default);
        }
    }

    /// Forget every link stored for a slot.
    pub(crate) fn reset(&mut self, object: ObjectHandle) {
        if let Some(node) = self.nodes.get_mut(object.index as usize) {
            node.parent = None;
            node.children.clear();
        }
    }

    fn node(&self, object: ObjectHandle) -> Option<&Node> {
        self.nodes.get(object.index as usize)
    }

    /// Live parent of `object`.
    pub fn parent(&self, objects: &ObjectTable, object: ObjectHandle) -> Option<ObjectHandle> {
        if !objects.is_alive(object) {
            return None;
        }
        self.node(object)?
            .parent
            .filter(|parent| objects.is_alive(*parent))
    }

    /// Live children of `object`, in attachment order.
    pub fn children(&self, objects: &ObjectTable, object: ObjectHandle) -> Vec<ObjectHandle> {
        if !objects.is_alive(object) {
            return Vec::new();
        }
        self.node(object)
            .map(|node| {
                node.children
                    .iter()
                    .copied()
                    .filter(|child| {
                        objects.is_alive(*child)
                            && self.node(*child).and_then(|n| n.parent) == Some(object)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every live descendant, breadth first, excluding `object` itself.
    pub fn descendants(&self, objects: &ObjectTable, object: ObjectHandle) -> Vec<ObjectHandle> {
        let mut out = Vec::new();
        let mut queue: VecDeque<ObjectHandle> = self.children(objects, object).into();
        while let Some(next) = queue.pop_front() {
            out.push(next);
            queue.extend(self.children(objects, next));
        }
        out
    }

    /// Whether `ancestor` is on the parent chain of `object`.
    pub fn is_ancestor(
        &self,
        objects: &ObjectTable,
        ancestor: ObjectHandle,
        object: ObjectHandle,
    ) -> bool {
        let mut current = self.parent(objects, object);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(objects, node);
        }
        false
    }

    /// Link `child` under `parent`. The caller detaches `child` first and
    /// rules out cycles.
    pub(crate) fn attach(&mut self, parent: ObjectHandle, child: ObjectHandle) {
        let slots = (parent.index.max(child.index) as usize) + 1;
        self.expand_to_fit(slots);
        self.nodes[child.index as usize].parent = Some(parent);
        let siblings = &mut self.nodes[parent.index as usize].children;
        if !siblings.contains(&child) {
            siblings.push(child);
        }
    }

    /// Unlink `child` from its parent, returning the old parent handle
    /// (which may already be dead).
    pub(crate) fn detach(&mut self, child: ObjectHandle) -> Option<ObjectHandle> {
        let parent = self.nodes.get_mut(child.index as usize)?.parent.take()?;
        if let Some(node) = self.nodes.get_mut(parent.index as usize) {
            node.children.retain(|c| *c != child);
        }
        Some(parent)
    }
}
