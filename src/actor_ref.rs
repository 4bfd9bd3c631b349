//! A location-transparent handle to an actor.
//!
//! Addresses one of four [`Endpoint`] kinds, chosen once at creation and
//! never changed afterward. Every operation below is defined on all four so
//! calling code never has to match on placement to decide how to talk to an
//! actor. Forked and remote placement need to serialize a payload to cross
//! a process boundary, so those two endpoint kinds (and everything that
//! constructs them) only exist when the `serde` feature is enabled; it is
//! on by default.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::behavior::BehaviorFactory;
#[cfg(feature = "serde")]
use crate::endpoint::{process::ProcessEndpoint, remote::RemoteEndpoint};
use crate::error::{ActorError, CreateError};
use crate::id::{ActorId, ActorPath};
use crate::logging::LogHandle;
use crate::mailbox::{Delivery, MailboxHandle};
use crate::payload::{Message, Payload};
use crate::placement::Placement;
use crate::router::{MetricsRecord, RouterEndpoint};

#[derive(Clone)]
pub(crate) enum Endpoint {
    InMemory(MailboxHandle),
    #[cfg(feature = "serde")]
    Forked(ProcessEndpoint),
    #[cfg(feature = "serde")]
    Remote(RemoteEndpoint),
    Router(RouterEndpoint),
}

struct Inner {
    id: ActorId,
    path: ActorPath,
    log: LogHandle,
    parent: Option<ActorRef>,
    endpoint: Endpoint,
}

/// A cheaply cloneable handle. Every clone refers to the same underlying
/// actor (or, for a router, the same replica set); dropping every clone does
/// not destroy the actor - only an explicit `destroy()` does.
#[derive(Clone)]
pub struct ActorRef(Arc<Inner>);

impl ActorRef {
    pub(crate) fn new(
        id: ActorId,
        path: ActorPath,
        log: LogHandle,
        parent: Option<ActorRef>,
        endpoint: Endpoint,
    ) -> Self {
        ActorRef(Arc::new(Inner {
            id,
            path,
            log,
            parent,
            endpoint,
        }))
    }

    pub fn id(&self) -> ActorId {
        self.0.id
    }

    pub fn path(&self) -> &ActorPath {
        &self.0.path
    }

    pub fn log(&self) -> &LogHandle {
        &self.0.log
    }

    pub fn parent(&self) -> Option<ActorRef> {
        self.0.parent.clone()
    }

    /// For an in-memory/forked/remote actor, the placement it runs under.
    /// For a router, the *replica* placement: `mode()` on a router ref
    /// reports where its replicas live, not the literal string "router".
    pub fn mode(&self) -> &'static str {
        match &self.0.endpoint {
            Endpoint::InMemory(_) => "in-memory",
            #[cfg(feature = "serde")]
            Endpoint::Forked(_) => "forked",
            #[cfg(feature = "serde")]
            Endpoint::Remote(_) => "remote",
            Endpoint::Router(router) => router.mode(),
        }
    }

    /// Fire-and-forget delivery; does not wait for the handler to run.
    pub async fn send(&self, topic: impl Into<String>, payload: Payload) -> Result<(), ActorError> {
        let topic = topic.into();
        match &self.0.endpoint {
            Endpoint::InMemory(mailbox) => {
                mailbox
                    .deliver(Delivery {
                        topic,
                        payload,
                        reply: None,
                    })
                    .await
            }
            #[cfg(feature = "serde")]
            Endpoint::Forked(ep) => ep.send(topic, payload).await,
            #[cfg(feature = "serde")]
            Endpoint::Remote(ep) => ep.send(topic, payload).await,
            Endpoint::Router(router) => router.send(topic, payload).await,
        }
    }

    /// Deliver and await the handler's reply.
    pub async fn send_and_receive(
        &self,
        topic: impl Into<String>,
        payload: Payload,
    ) -> Result<Payload, ActorError> {
        let topic = topic.into();
        match &self.0.endpoint {
            Endpoint::InMemory(mailbox) => {
                let (tx, rx) = oneshot::channel();
                mailbox
                    .deliver(Delivery {
                        topic,
                        payload,
                        reply: Some(tx),
                    })
                    .await?;
                rx.await
                    .map_err(|_| ActorError::DeliveryFailure("actor destroyed before replying".into()))?
            }
            #[cfg(feature = "serde")]
            Endpoint::Forked(ep) => ep.send_and_receive(topic, payload).await,
            #[cfg(feature = "serde")]
            Endpoint::Remote(ep) => ep.send_and_receive(topic, payload).await,
            Endpoint::Router(router) => router.send_and_receive(topic, payload).await,
        }
    }

    /// Send a clone of `value` to every replica (single actors treat this
    /// as a one-replica broadcast).
    pub async fn broadcast<T: Message + Clone>(
        &self,
        topic: impl Into<String>,
        value: T,
    ) -> Result<(), ActorError> {
        let topic = topic.into();
        match &self.0.endpoint {
            Endpoint::Router(router) => router.broadcast(topic, value).await,
            _ => self.send(topic, Payload::new(value)).await,
        }
    }

    /// Send a clone of `value` to every replica and collect every reply.
    pub async fn broadcast_and_receive<T: Message + Clone>(
        &self,
        topic: impl Into<String>,
        value: T,
    ) -> Result<Vec<Payload>, ActorError> {
        let topic = topic.into();
        match &self.0.endpoint {
            Endpoint::Router(router) => router.broadcast_and_receive(topic, value).await,
            _ => self
                .send_and_receive(topic, Payload::new(value))
                .await
                .map(|reply| vec![reply]),
        }
    }

    /// For a router, one entry per live replica (keyed by index, in
    /// replica-index order) plus a `"summary"` entry summing every numeric
    /// field across replicas. For a non-router actor, a single `"0"` entry
    /// from that actor's own `metrics` handler (absent handler => empty
    /// record) and no `summary`, since there is nothing to sum over one
    /// instance.
    pub async fn metrics(&self) -> HashMap<String, MetricsRecord> {
        match &self.0.endpoint {
            Endpoint::Router(router) => router.metrics().await,
            _ => {
                let record = match self.send_and_receive("metrics", Payload::new(())).await {
                    Ok(payload) => payload.downcast::<MetricsRecord>().unwrap_or_default(),
                    Err(_) => MetricsRecord::new(),
                };
                let mut out = HashMap::with_capacity(1);
                out.insert("0".to_string(), record);
                out
            }
        }
    }

    /// Create a child of this actor. For an in-memory actor this runs
    /// inside the owning cell task (so it is serialized with respect to
    /// every other message the actor is handling); for a forked/remote
    /// actor it is relayed as a control frame to the worker hosting it.
    /// `factory` is called once per in-memory instance this creates - once
    /// for a plain actor, once per replica for an in-memory cluster - and
    /// ignored for `Forked`/`Remote` placements, which instead reconstruct
    /// the behavior from the registered name embedded in the `Placement`
    /// itself inside the worker process that will actually host it.
    pub async fn create_child(
        &self,
        name: &str,
        factory: BehaviorFactory,
        placement: Placement,
    ) -> Result<ActorRef, CreateError> {
        match &self.0.endpoint {
            Endpoint::InMemory(mailbox) => {
                mailbox.create_child(name.to_string(), factory, placement).await
            }
            #[cfg(feature = "serde")]
            Endpoint::Forked(ep) => ep.create_child(name, factory, placement).await,
            #[cfg(feature = "serde")]
            Endpoint::Remote(ep) => ep.create_child(name, factory, placement).await,
            Endpoint::Router(router) => router.create_child(name, factory, placement).await,
        }
    }

    /// Destroy this actor: recursively destroy every child first (post
    /// order), then run this actor's own `destroy` hook. Idempotent.
    pub async fn destroy(&self) {
        match &self.0.endpoint {
            Endpoint::InMemory(mailbox) => mailbox.destroy_and_wait().await,
            #[cfg(feature = "serde")]
            Endpoint::Forked(ep) => ep.destroy().await,
            #[cfg(feature = "serde")]
            Endpoint::Remote(ep) => ep.destroy().await,
            Endpoint::Router(router) => router.destroy().await,
        }
    }

    pub(crate) fn endpoint(&self) -> &Endpoint {
        &self.0.endpoint
    }

    /// Resolves when this actor terminates other than through a `destroy()`
    /// this handle observed - used by a router's watchdog to tell a crash
    /// apart from a deliberate teardown. A router replica never resolves
    /// this (routers are not respawned by their parent router).
    pub(crate) async fn wait_for_crash(&self) -> bool {
        match &self.0.endpoint {
            Endpoint::InMemory(mailbox) => mailbox.wait_for_crash().await,
            #[cfg(feature = "serde")]
            Endpoint::Forked(ep) => ep.wait_for_crash().await,
            #[cfg(feature = "serde")]
            Endpoint::Remote(ep) => ep.wait_for_crash().await,
            Endpoint::Router(_) => std::future::pending().await,
        }
    }
}

impl std::fmt::Debug for ActorRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorRef")
            .field("path", &self.0.path)
            .field("mode", &self.mode())
            .finish()
    }
}
