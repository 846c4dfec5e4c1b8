//! Error types shared by the whole crate.
//!
//! Every fallible core operation returns [`EcsResult`]. Handle validation
//! happens before any storage is touched, so an `Err` always means "nothing
//! changed".

use thiserror::Error;

use crate::ecs::entity::ObjectHandle;

/// Errors produced by the ECS core.
#[derive(Error, Debug)]
pub enum EcsError {
    // ── Programmer errors ────────────────────────────────────────────
    /// The handle is out of range or its generation no longer matches.
    #[error("invalid object handle {handle}")]
    InvalidHandle { handle: ObjectHandle },

    /// The object already carries a component of this kind.
    #[error("object {handle} already has a `{kind}` component")]
    DuplicateComponent { handle: ObjectHandle, kind: &'static str },

    /// The object does not carry a component of this kind.
    #[error("object {handle} has no `{kind}` component")]
    MissingComponent { handle: ObjectHandle, kind: &'static str },

    /// The component type was never registered with the world.
    #[error("component kind `{kind}` is not registered")]
    UnregisteredKind { kind: &'static str },

    /// The transform is mandatory and cannot be removed on its own.
    #[error("`{kind}` is mandatory and cannot be removed")]
    MandatoryComponent { kind: &'static str },

    /// The component keeps world state in sync and is only writable
    /// through [`World`](crate::ecs::World) methods.
    #[error("`{kind}` can only be changed through the world")]
    WorldManagedComponent { kind: &'static str },

    /// Attaching would make an object its own ancestor.
    #[error("attaching {child} under {parent} would create a cycle")]
    HierarchyCycle { parent: ObjectHandle, child: ObjectHandle },

    /// A system of the same type is already registered.
    #[error("system `{name}` is already registered")]
    DuplicateSystem { name: String },

    /// No system of the requested type is registered.
    #[error("system `{name}` is not registered")]
    UnknownSystem { name: String },

    // ── Capacity errors ──────────────────────────────────────────────
    /// More distinct component kinds than a [`ComponentMask`] can hold.
    ///
    /// [`ComponentMask`]: crate::ecs::ComponentMask
    #[error("cannot register `{kind}`: at most {max} component kinds are supported")]
    KindCapacityExceeded { max: usize, kind: &'static str },

    // ── Data errors ──────────────────────────────────────────────────
    /// No registered component kind has this name.
    #[error("unknown component `{name}`")]
    UnknownComponent { name: String },

    /// The component kind does not accept this field name.
    #[error("component `{kind}` has no field `{field}`")]
    UnknownField { kind: &'static str, field: String },

    /// The field exists but the value could not be parsed.
    #[error("invalid value `{value}` for `{kind}.{field}`")]
    InvalidValue {
        kind: &'static str,
        field: String,
        value: String,
    },

    // ── Configuration ────────────────────────────────────────────────
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type EcsResult<T> = Result<T, EcsError>;
