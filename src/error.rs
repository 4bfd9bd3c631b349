//! Error types surfaced by the actor kernel.
//!
//! All of the error kinds a caller can observe collapse into a single
//! `thiserror`-derived enum per failure domain, following the canonical-struct
//! shape used throughout the pack this crate draws its ambient stack from:
//! structured variants that carry the offending name/id, `#[source]` chains
//! where a cause exists, and a handful of `is_*` predicate helpers so
//! supervision code can branch on error shape without string matching.

use std::error::Error as StdError;

use thiserror::Error;

use crate::id::{ActorId, ActorPath};

/// Errors raised while constructing the `ActorSystem` itself, before any
/// actor exists.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A supplied logger implementation was missing one of the required
    /// capability methods (`error`, `warn`, `info`, `debug`).
    #[error("invalid logger interface: missing `{missing}`")]
    InvalidLoggerInterface { missing: &'static str },

    /// A balancer name was referenced that was never registered.
    #[error("unknown balancer: {0}")]
    UnknownBalancer(String),

    /// The system or actor name failed path validation.
    #[error("invalid name: {0}")]
    InvalidName(String),
}

/// Errors raised by the `ResourceRegistry`.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("unknown resource: {0}")]
    UnknownResource(String),

    #[error("duplicate resource: {0}")]
    DuplicateResource(String),
}

/// Errors raised by `SystemBuilder::build`, before any actor exists.
#[derive(Debug, Error)]
pub enum SystemError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("failed to bind listener: {0}")]
    ListenFailed(#[source] std::io::Error),
}

/// Errors raised while constructing a new actor (`createChild`).
#[derive(Debug, Error)]
pub enum CreateError {
    /// A declared dependency could not be resolved in the `ResourceRegistry`.
    #[error("injection failure: behavior depends on unresolved resource `{0}`")]
    InjectionFailure(String),

    /// The actor's `initialize` hook returned an error; the actor was torn
    /// down and no ref was handed to the caller.
    #[error("init failure for actor at `{path}`: {source}")]
    InitFailure {
        path: ActorPath,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// The requested behavior/logger name has no corresponding registry
    /// entry reachable from a forked/remote worker.
    #[error("unregistered behavior: {0}")]
    UnregisteredBehavior(String),

    /// Bad configuration surfaced at construction time (see `ConfigError`).
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Spawning the backing OS process or remote connection failed.
    #[error("failed to place actor ({mode}): {source}")]
    PlacementFailed {
        mode: &'static str,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

/// Errors surfaced by `ActorRef` operations (`send`, `sendAndReceive`, ...).
#[derive(Debug, Error, Clone)]
pub enum ActorError {
    /// The target actor had already reached `Destroyed` when the send was
    /// attempted.
    #[error("stale reference: actor `{0}` is destroyed")]
    StaleReference(ActorId),

    /// The delivery was accepted into a mailbox but could not be completed
    /// (the actor died, the transport was lost, or a replica crashed
    /// mid-flight).
    #[error("delivery failure: {0}")]
    DeliveryFailure(String),

    /// The user's handler returned/threw an error; the original message is
    /// preserved verbatim.
    #[error("handler failure: {0}")]
    HandlerFailure(String),

    /// A router could not select a replica: the balancer returned nothing,
    /// an id outside the live set, or the replica set was empty. All three
    /// causes share this single message so callers cannot distinguish them.
    #[error("no routable child")]
    NoRoutableChild,
}

impl ActorError {
    /// Delivery failures and handler failures are conditions that may not
    /// recur on a retry (a respawned replica, a transient handler bug);
    /// stale references and routing dead-ends will not resolve themselves.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ActorError::DeliveryFailure(_) | ActorError::HandlerFailure(_)
        )
    }

    /// A stale reference can never succeed again; `createChild` a new actor
    /// instead of retrying the send.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ActorError::StaleReference(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_failure_is_retryable_not_fatal() {
        let err = ActorError::DeliveryFailure("replica crashed".into());
        assert!(err.is_retryable());
        assert!(!err.is_fatal());
    }

    #[test]
    fn stale_reference_is_fatal_not_retryable() {
        let err = ActorError::StaleReference(ActorId::nil());
        assert!(err.is_fatal());
        assert!(!err.is_retryable());
    }

    #[test]
    fn no_routable_child_message_is_intent_agnostic() {
        let err = ActorError::NoRoutableChild;
        assert_eq!(err.to_string(), "no routable child");
    }
}
