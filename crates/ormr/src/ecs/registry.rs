//! # Kind Registry: Type Tokens to Small Integers
//!
//! Every component type gets a [`KindId`] the first time it is registered,
//! in registration order. The registry also remembers, per kind, the
//! metadata the world needs on hot paths:
//!
//! - `required`: mask of kinds auto-added alongside this one
//! - `capabilities`: what the kind provides (e.g. renderable)
//! - the kind's name, for the string-keyed value boundary
//!
//! Registration is explicit and happens at startup or on first use, never
//! through static initializers, so ids depend only on call order.

use std::any::TypeId;
use std::collections::HashMap;

use super::component::{Capabilities, Component, Dependencies};
use super::mask::{ComponentMask, KindId, MAX_COMPONENT_KINDS};
use super::pool::{ComponentPool, ErasedPool};
use crate::error::{EcsError, EcsResult};

/// Metadata recorded once per registered kind.
#[derive(Debug, Clone)]
pub struct KindInfo {
    pub name: &'static str,
    pub type_name: &'static str,
    /// Kinds auto-added when this one is attached.
    pub required: ComponentMask,
    pub capabilities: Capabilities,
}

/// Maps component types and names to kind ids.
#[derive(Debug, Default)]
pub struct KindRegistry {
    by_type: HashMap<TypeId, KindId>,
    by_name: HashMap<&'static str, KindId>,
    kinds: Vec<KindInfo>,
}

impl KindRegistry {
    pub fn kind_of<T: 'static>(&self) -> Option<KindId> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    pub fn kind_by_name(&self, name: &str) -> Option<KindId> {
        self.by_name.get(name).copied()
    }

    pub fn info(&self, kind: KindId) -> &KindInfo {
        &self.kinds[kind.index()]
    }

    pub fn name(&self, kind: KindId) -> &'static str {
        self.kinds[kind.index()].name
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Mask of every kind that provides `capability`.
    pub fn capability_mask(&self, capability: Capabilities) -> ComponentMask {
        self.kinds
            .iter()
            .enumerate()
            .filter(|(_, info)| info.capabilities.contains(capability))
            .fold(ComponentMask::EMPTY, |mask, (index, _)| {
                mask.with(KindId(index as u8))
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = (KindId, &KindInfo)> {
        self.kinds
            .iter()
            .enumerate()
            .map(|(index, info)| (KindId(index as u8), info))
    }
}

/// The kind registry plus one pool per registered kind.
pub struct ComponentStore {
    registry: KindRegistry,
    pools: Vec<Box<dyn ErasedPool>>,
    chunk_size: usize,
    /// Object slots every pool must be able to address.
    slots: usize,
}

impl ComponentStore {
    pub(crate) fn new(chunk_size: usize) -> Self {
        Self {
            registry: KindRegistry::default(),
            pools: Vec::new(),
            chunk_size,
            slots: 0,
        }
    }

    pub fn registry(&self) -> &KindRegistry {
        &self.registry
    }

    /// Register `T` (and, recursively, the kinds it requires). Idempotent.
    pub fn register<T: Component + Default>(&mut self) -> EcsResult<KindId> {
        if let Some(kind) = self.registry.kind_of::<T>() {
            return Ok(kind);
        }
        let name = T::name();
        if self.registry.kinds.len() >= MAX_COMPONENT_KINDS {
            log::error!(
                "component kind registry is full ({MAX_COMPONENT_KINDS}); cannot register `{name}`"
            );
            return Err(EcsError::KindCapacityExceeded {
                max: MAX_COMPONENT_KINDS,
                kind: name,
            });
        }

        let kind = KindId(self.registry.kinds.len() as u8);
        self.registry.by_type.insert(TypeId::of::<T>(), kind);
        if let Some(existing) = self.registry.by_name.get(name) {
            log::warn!(
                "component name `{name}` is already used by {existing}; `{}` is only reachable by type",
                std::any::type_name::<T>()
            );
        } else {
            self.registry.by_name.insert(name, kind);
        }
        self.registry.kinds.push(KindInfo {
            name,
            type_name: std::any::type_name::<T>(),
            required: ComponentMask::EMPTY,
            capabilities: T::capabilities(),
        });

        let mut pool = ComponentPool::<T>::new(self.chunk_size);
        pool.expand_to_fit(self.slots);
        self.pools.push(Box::new(pool));

        // Registered before its requirements so that cycles terminate.
        let mut deps = Dependencies::default();
        T::dependencies(&mut deps);
        let mut required = ComponentMask::EMPTY;
        for registrar in deps.registrars {
            match registrar(self) {
                Ok(dep) if dep != kind => required.set(dep),
                Ok(_) => {}
                Err(err) => {
                    self.truncate(kind);
                    return Err(err);
                }
            }
        }
        self.registry.kinds[kind.index()].required = required;

        log::debug!("registered component kind `{name}` as {kind}");
        Ok(kind)
    }

    /// Forget `first` and every kind registered after it, so a kind whose
    /// requirements failed to register is never left behind without them.
    fn truncate(&mut self, first: KindId) {
        let keep = first.index();
        let registry = &mut self.registry;
        registry.by_type.retain(|_, kind| kind.index() < keep);
        registry.by_name.retain(|_, kind| kind.index() < keep);
        for info in registry.kinds.drain(keep..) {
            log::debug!("rolled back registration of `{}`", info.name);
        }
        self.pools.truncate(keep);
    }

    /// Kind id of a registered type.
    pub fn kind_id<T: Component>(&self) -> EcsResult<KindId> {
        self.registry
            .kind_of::<T>()
            .ok_or_else(|| EcsError::UnregisteredKind { kind: T::name() })
    }

    pub fn pool<T: Component>(&self) -> Option<&ComponentPool<T>> {
        let kind = self.registry.kind_of::<T>()?;
        self.pools[kind.index()].as_any().downcast_ref()
    }

    pub fn pool_mut<T: Component>(&mut self) -> Option<&mut ComponentPool<T>> {
        let kind = self.registry.kind_of::<T>()?;
        self.pools[kind.index()].as_any_mut().downcast_mut()
    }

    pub(crate) fn erased(&self, kind: KindId) -> &dyn ErasedPool {
        self.pools[kind.index()].as_ref()
    }

    pub(crate) fn erased_mut(&mut self, kind: KindId) -> &mut dyn ErasedPool {
        self.pools[kind.index()].as_mut()
    }

    /// Make every pool able to address `slots` objects.
    pub(crate) fn expand_all(&mut self, slots: usize) {
        self.slots = self.slots.max(slots);
        for pool in &mut self.pools {
            pool.expand_to_fit(self.slots);
        }
    }

    /// Total chunks allocated across all pools.
    pub fn chunk_count(&self) -> usize {
        self.pools.iter().map(|p| p.chunk_count()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::component::Registrar;

    #[derive(Default)]
    struct Position;
    impl Component for Position {}

    #[derive(Default)]
    struct Velocity;
    impl Component for Velocity {
        fn dependencies(deps: &mut Dependencies) {
            deps.require::<Position>();
        }
    }

    #[derive(Default)]
    struct Sprite;
    impl Component for Sprite {
        fn capabilities() -> Capabilities {
            Capabilities::RENDERABLE
        }
    }

    // Two kinds that require each other.
    #[derive(Default)]
    struct Ping;
    impl Component for Ping {
        fn dependencies(deps: &mut Dependencies) {
            deps.require::<Pong>();
        }
    }
    #[derive(Default)]
    struct Pong;
    impl Component for Pong {
        fn dependencies(deps: &mut Dependencies) {
            deps.require::<Ping>();
        }
    }

    #[test]
    fn register_is_idempotent_and_ordered() {
        let mut store = ComponentStore::new(16);
        let a = store.register::<Position>().unwrap();
        let b = store.register::<Sprite>().unwrap();
        assert_eq!(store.register::<Position>().unwrap(), a);
        assert_eq!((a.index(), b.index()), (0, 1));
        assert_eq!(store.registry().kind_by_name("Sprite"), Some(b));
    }

    #[test]
    fn required_kinds_register_first_use() {
        let mut store = ComponentStore::new(16);
        let velocity = store.register::<Velocity>().unwrap();
        let position = store.registry().kind_of::<Position>().unwrap();
        assert!(store.registry().info(velocity).required.has(position));
    }

    #[test]
    fn mutual_requirements_terminate() {
        let mut store = ComponentStore::new(16);
        let ping = store.register::<Ping>().unwrap();
        let pong = store.registry().kind_of::<Pong>().unwrap();
        assert!(store.registry().info(ping).required.has(pong));
        assert!(store.registry().info(pong).required.has(ping));
    }

    #[test]
    fn failed_requirement_rolls_back_the_dependent_kind() {
        let mut store = ComponentStore::new(4);
        register_fillers(&mut store, MAX_COMPONENT_KINDS - 1);
        assert!(matches!(
            store.register::<Velocity>(),
            Err(EcsError::KindCapacityExceeded { kind: "Position", .. })
        ));
        assert_eq!(store.registry().len(), MAX_COMPONENT_KINDS - 1);
        assert_eq!(store.registry().kind_of::<Velocity>(), None);
        assert_eq!(store.registry().kind_by_name("Velocity"), None);
        assert!(store.pool::<Velocity>().is_none());

        // Still refused on retry instead of registering without `Position`.
        assert!(store.register::<Velocity>().is_err());
        assert_eq!(store.registry().kind_of::<Velocity>(), None);
    }

    #[test]
    fn capability_mask_lists_renderable_kinds() {
        let mut store = ComponentStore::new(16);
        store.register::<Position>().unwrap();
        let sprite = store.register::<Sprite>().unwrap();
        let mask = store.registry().capability_mask(Capabilities::RENDERABLE);
        assert_eq!(mask, ComponentMask::from_kind(sprite));
    }

    #[test]
    fn unregistered_kind_is_an_error() {
        let store = ComponentStore::new(16);
        assert!(matches!(
            store.kind_id::<Sprite>(),
            Err(EcsError::UnregisteredKind { kind: "Sprite" })
        ));
    }

    #[test]
    fn new_pools_fit_existing_slots() {
        let mut store = ComponentStore::new(4);
        store.expand_all(10);
        store.register::<Position>().unwrap();
        assert_eq!(store.pool::<Position>().unwrap().capacity(), 12);
    }

    macro_rules! filler_kinds {
        ($($name:ident),*) => {
            $(
                #[derive(Default)]
                struct $name;
                impl Component for $name {}
            )*
            const FILLERS: &[Registrar] = &[$(ComponentStore::register::<$name>),*];

            fn register_fillers(store: &mut ComponentStore, count: usize) {
                for registrar in &FILLERS[..count] {
                    registrar(store).unwrap();
                }
            }
        };
    }

    filler_kinds!(
        K0, K1, K2, K3, K4, K5, K6, K7, K8, K9, K10, K11, K12, K13, K14, K15, K16, K17, K18,
        K19, K20, K21, K22, K23, K24, K25, K26, K27, K28, K29, K30, K31
    );

    #[test]
    fn thirty_third_kind_is_a_capacity_error() {
        let mut store = ComponentStore::new(4);
        register_fillers(&mut store, MAX_COMPONENT_KINDS);
        assert_eq!(store.registry().len(), MAX_COMPONENT_KINDS);
        assert!(matches!(
            store.register::<Sprite>(),
            Err(EcsError::KindCapacityExceeded { max: 32, .. })
        ));
    }
}
