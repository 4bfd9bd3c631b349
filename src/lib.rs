//! A hierarchical actor runtime: location-transparent refs over an
//! in-memory, forked-process, or remote-process actor, post-order
//! supervision teardown, named dependency injection, structured per-actor
//! logging, and a clustered router with pluggable balancing and crash
//! recovery.
//!
//! Start with [`system::SystemBuilder`] to assemble an [`system::ActorSystem`],
//! implement [`behavior::Behavior`] for your actor logic, and reach every
//! actor - wherever it runs - through an [`actor_ref::ActorRef`].

pub mod actor_ref;
pub mod behavior;
mod cell;
pub mod context;
pub mod endpoint;
pub mod error;
pub mod id;
pub mod logging;
mod mailbox;
pub mod payload;
pub mod placement;
pub mod resource;
pub mod router;
pub mod system;
pub mod testkit;
#[cfg(feature = "serde")]
pub mod worker;

pub use actor_ref::ActorRef;
pub use behavior::{factory, single, Behavior, BehaviorFactory, BehaviorRegistry, BehaviorTable};
pub use context::ActorContext;
pub use error::{ActorError, ConfigError, CreateError, ResourceError, SystemError};
pub use id::{ActorId, ActorPath};
pub use logging::{Level, LogHandle, LoggerRef, LoggerRegistry};
pub use payload::{Message, Payload};
pub use placement::{CrashPolicy, Placement, RouterSpec};
pub use resource::{Resource, ResourceRegistry};
pub use system::{ActorSystem, SystemBuilder};
