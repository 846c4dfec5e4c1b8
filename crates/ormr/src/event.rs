//! # Event Bus: Typed Publish/Subscribe With Scoping
//!
//! Decoupled parts of the engine talk through the [`EventBus`]: a component
//! announces "my draw order changed" without knowing that a render system
//! exists, and the render system reacts without polling every object.
//!
//! ## Parties
//!
//! - A **receiver** ([`EventReceiver`]) owns subscriptions. Dropping it
//!   removes every subscription it made.
//! - A **triggerer** ([`EventTriggerer`]) identifies an emitter. Subscribers
//!   may scope a subscription to one triggerer; dropping the triggerer
//!   removes those scoped subscriptions and leaves global ones alone.
//!
//! ```text
//! subscribers[type_id] = [
//!     { receiver: R1, scope: None,     callback }   ← every emitter
//!     { receiver: R2, scope: Some(T7), callback }   ← only T7
//! ]
//! ```
//!
//! ## Dispatch
//!
//! [`emit`](EventBus::emit) is synchronous and delivers in subscription
//! order. The matching callbacks are collected before any of them runs, so
//! callbacks may freely subscribe, unsubscribe or drop receivers. An
//! unsubscription takes effect for the rest of the emission in progress,
//! while a new subscription is only seen by later emissions.
//!
//! The bus is a cheap `Clone` handle over shared single-threaded state.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};

/// Runtime id of an event type, assigned on first use. Never persisted.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct EventTypeId(u32);

impl EventTypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identity of a subscribing party.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ReceiverId(u32);

/// Identity of an emitting party, also used as a subscription scope.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TriggererId(u32);

impl fmt::Display for TriggererId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "triggerer#{}", self.0)
    }
}

type Callback = Rc<RefCell<dyn FnMut(&dyn Any)>>;

struct Subscription {
    id: u64,
    receiver: ReceiverId,
    scope: Option<TriggererId>,
    callback: Callback,
}

#[derive(Default)]
struct Registry {
    type_ids: HashMap<TypeId, EventTypeId>,
    subscribers: Vec<Vec<Subscription>>,
    /// Ids of every current subscription, checked once per delivery.
    live: HashSet<u64>,
    next_receiver: u32,
    next_triggerer: u32,
    next_subscription: u64,
}

impl Registry {
    fn type_id_of<E: 'static>(&mut self) -> EventTypeId {
        let next = EventTypeId(self.subscribers.len() as u32);
        let id = *self.type_ids.entry(TypeId::of::<E>()).or_insert(next);
        if id == next {
            self.subscribers.push(Vec::new());
        }
        id
    }

    /// Detach matching subscriptions. The caller drops them after releasing
    /// the borrow, since a callback may own a receiver whose drop re-enters.
    fn drain_where(&mut self, mut pred: impl FnMut(usize, &Subscription) -> bool) -> Vec<Subscription> {
        let mut removed = Vec::new();
        for (ty, list) in self.subscribers.iter_mut().enumerate() {
            let (gone, kept): (Vec<_>, Vec<_>) =
                std::mem::take(list).into_iter().partition(|s| pred(ty, s));
            *list = kept;
            removed.extend(gone);
        }
        for subscription in &removed {
            self.live.remove(&subscription.id);
        }
        removed
    }
}

/// Typed publish/subscribe registry.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Rc<RefCell<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a receiver. Its subscriptions end when it is dropped.
    pub fn receiver(&self) -> EventReceiver {
        let mut registry = self.inner.borrow_mut();
        let id = ReceiverId(registry.next_receiver);
        registry.next_receiver += 1;
        EventReceiver {
            id,
            bus: Rc::downgrade(&self.inner),
        }
    }

    /// Create a triggerer. Subscriptions scoped to it end when it is dropped.
    pub fn triggerer(&self) -> EventTriggerer {
        let mut registry = self.inner.borrow_mut();
        let id = TriggererId(registry.next_triggerer);
        registry.next_triggerer += 1;
        EventTriggerer {
            id,
            bus: Rc::downgrade(&self.inner),
        }
    }

    /// Type id of `E`, assigning the next one on first use.
    pub fn event_type_id<E: 'static>(&self) -> EventTypeId {
        self.inner.borrow_mut().type_id_of::<E>()
    }

    /// Subscribe to every emission of `E`. Returns `false` if the receiver
    /// already has a global subscription to `E`.
    pub fn subscribe<E: 'static>(
        &self,
        receiver: ReceiverId,
        callback: impl FnMut(&E) + 'static,
    ) -> bool {
        self.add_subscription(receiver, None, callback)
    }

    /// Subscribe to emissions of `E` from one triggerer only. Returns `false`
    /// if the receiver already has this exact subscription.
    pub fn subscribe_scoped<E: 'static>(
        &self,
        scope: TriggererId,
        receiver: ReceiverId,
        callback: impl FnMut(&E) + 'static,
    ) -> bool {
        self.add_subscription(receiver, Some(scope), callback)
    }

    fn add_subscription<E: 'static>(
        &self,
        receiver: ReceiverId,
        scope: Option<TriggererId>,
        mut callback: impl FnMut(&E) + 'static,
    ) -> bool {
        let mut registry = self.inner.borrow_mut();
        let ty = registry.type_id_of::<E>();
        let list = &registry.subscribers[ty.index()];
        if list.iter().any(|s| s.receiver == receiver && s.scope == scope) {
            log::trace!(
                "{receiver:?} is already subscribed to `{}`",
                std::any::type_name::<E>()
            );
            return false;
        }
        let id = registry.next_subscription;
        registry.next_subscription += 1;
        let callback: Callback = Rc::new(RefCell::new(move |event: &dyn Any| {
            if let Some(event) = event.downcast_ref::<E>() {
                callback(event);
            }
        }));
        registry.live.insert(id);
        registry.subscribers[ty.index()].push(Subscription {
            id,
            receiver,
            scope,
            callback,
        });
        true
    }

    /// Deliver `event` to every subscriber that is global or scoped to
    /// `triggerer`. Returns the number of callbacks invoked.
    pub fn emit<E: 'static>(&self, triggerer: TriggererId, event: &E) -> usize {
        let matching: Vec<(u64, Callback)> = {
            let registry = self.inner.borrow();
            let Some(&ty) = registry.type_ids.get(&TypeId::of::<E>()) else {
                return 0;
            };
            registry.subscribers[ty.index()]
                .iter()
                .filter(|s| s.scope.is_none_or(|scope| scope == triggerer))
                .map(|s| (s.id, Rc::clone(&s.callback)))
                .collect()
        };

        let payload: &dyn Any = event;
        let mut delivered = 0;
        for (id, callback) in matching {
            if !self.is_subscribed(id) {
                continue;
            }
            let Ok(mut callback) = callback.try_borrow_mut() else {
                log::warn!(
                    "skipping re-entrant delivery of `{}` from {triggerer}",
                    std::any::type_name::<E>()
                );
                continue;
            };
            (*callback)(payload);
            delivered += 1;
        }
        delivered
    }

    fn is_subscribed(&self, id: u64) -> bool {
        self.inner.borrow().live.contains(&id)
    }

    /// Remove every subscription of `receiver`.
    pub fn unsubscribe(&self, receiver: ReceiverId) {
        let removed = self.inner.borrow_mut().drain_where(|_, s| s.receiver == receiver);
        drop(removed);
    }

    /// Remove `receiver`'s subscriptions scoped to `scope`.
    pub fn unsubscribe_scoped(&self, scope: TriggererId, receiver: ReceiverId) {
        let removed = self
            .inner
            .borrow_mut()
            .drain_where(|_, s| s.receiver == receiver && s.scope == Some(scope));
        drop(removed);
    }

    /// Remove `receiver`'s subscriptions to `E`, scoped or not.
    pub fn unsubscribe_event<E: 'static>(&self, receiver: ReceiverId) {
        let removed = {
            let mut registry = self.inner.borrow_mut();
            let Some(&ty) = registry.type_ids.get(&TypeId::of::<E>()) else {
                return;
            };
            registry.drain_where(|t, s| t == ty.index() && s.receiver == receiver)
        };
        drop(removed);
    }

    /// Remove every subscription scoped to `scope`. Global subscriptions are
    /// untouched.
    pub fn remove_triggerer(&self, scope: TriggererId) {
        let removed = self.inner.borrow_mut().drain_where(|_, s| s.scope == Some(scope));
        drop(removed);
    }

    /// Number of subscriptions to `E`.
    pub fn subscriber_count<E: 'static>(&self) -> usize {
        let registry = self.inner.borrow();
        registry
            .type_ids
            .get(&TypeId::of::<E>())
            .map_or(0, |ty| registry.subscribers[ty.index()].len())
    }
}

/// Owning handle for a receiver id. Dropping it unsubscribes everything.
pub struct EventReceiver {
    id: ReceiverId,
    bus: Weak<RefCell<Registry>>,
}

impl EventReceiver {
    pub fn id(&self) -> ReceiverId {
        self.id
    }
}

impl fmt::Debug for EventReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EventReceiver").field(&self.id.0).finish()
    }
}

impl Drop for EventReceiver {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            EventBus { inner }.unsubscribe(self.id);
        }
    }
}

/// Owning handle for a triggerer id. Dropping it removes subscriptions
/// scoped to it.
pub struct EventTriggerer {
    id: TriggererId,
    bus: Weak<RefCell<Registry>>,
}

impl EventTriggerer {
    pub fn id(&self) -> TriggererId {
        self.id
    }
}

impl fmt::Debug for EventTriggerer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EventTriggerer").field(&self.id.0).finish()
    }
}

impl Drop for EventTriggerer {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            EventBus { inner }.remove_triggerer(self.id);
        }
    }
}
