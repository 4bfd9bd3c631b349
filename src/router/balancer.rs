//! Replica selection strategies for a router endpoint.
//!
//! The balancer is pluggable, including custom sharding logic supplied by
//! application code - so `Balancer` is a trait object behind
//! `Arc<dyn Balancer>`, the same shape `LogSink` and `Behavior` use for
//! their own pluggable points, rather than a closed enum. `forward` maps a
//! `(topic, payload) -> replica-id | none` contract directly onto the
//! router: `None` (or an id outside the live set) always collapses to
//! `ActorError::NoRoutableChild`, so a balancer can't distinguish "I chose
//! nothing" from "I chose something stale" in what the caller observes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::actor_ref::ActorRef;
use crate::error::ConfigError;
use crate::id::ActorId;
use crate::payload::Payload;

/// What `Balancer::forward` resolves a delivery to.
#[derive(Clone)]
pub enum Selection {
    /// A replica named by its `ActorId`'s string form.
    Id(String),
    /// A replica named directly by ref; the router still checks it is
    /// still live before using it.
    Ref(ActorRef),
}

/// Chooses, for each outgoing delivery, which live replica should receive
/// it. Implementations are expected to keep their own view of the replica
/// set current via `cluster_changed`, which the router calls once at
/// construction and again every time the live set changes (a crash, a
/// respawn reaching `Ready`) - never more than once per membership change.
#[async_trait]
pub trait Balancer: Send + Sync {
    /// A human-readable name, used in error messages and to resolve a
    /// balancer registered under this name from a `BalancerRegistry`.
    fn name(&self) -> &'static str;

    /// The router's live replica set changed; `replicas` is the full
    /// surviving (or newly grown) sequence in stable, index-preserving
    /// order. The default no-op suits a balancer that recomputes its
    /// target fresh on every `forward` call instead of caching the set.
    async fn cluster_changed(&self, _replicas: &[ActorRef]) {}

    /// Choose a target for one delivery. Returning `None` fails the
    /// delivery with *no routable child*; so does returning a `Selection`
    /// that no longer names a live replica.
    fn forward(&self, topic: &str, payload: &Payload) -> Option<Selection>;
}

/// Cycles through the live replica set in order, wrapping around. The
/// default balancer when a cluster's options do not name one.
#[derive(Default)]
pub struct RoundRobin {
    ids: Mutex<Vec<ActorId>>,
    next: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        RoundRobin::default()
    }
}

#[async_trait]
impl Balancer for RoundRobin {
    fn name(&self) -> &'static str {
        "roundrobin"
    }

    async fn cluster_changed(&self, replicas: &[ActorRef]) {
        *self.ids.lock().unwrap() = replicas.iter().map(|r| r.id()).collect();
    }

    fn forward(&self, _topic: &str, _payload: &Payload) -> Option<Selection> {
        let ids = self.ids.lock().unwrap();
        if ids.is_empty() {
            return None;
        }
        let i = self.next.fetch_add(1, Ordering::Relaxed) % ids.len();
        Some(Selection::Id(ids[i].to_string()))
    }
}

/// Picks a replica uniformly at random per delivery.
#[derive(Default)]
pub struct Random {
    ids: Mutex<Vec<ActorId>>,
}

impl Random {
    pub fn new() -> Self {
        Random::default()
    }
}

#[async_trait]
impl Balancer for Random {
    fn name(&self) -> &'static str {
        "random"
    }

    async fn cluster_changed(&self, replicas: &[ActorRef]) {
        *self.ids.lock().unwrap() = replicas.iter().map(|r| r.id()).collect();
    }

    fn forward(&self, _topic: &str, _payload: &Payload) -> Option<Selection> {
        let ids = self.ids.lock().unwrap();
        if ids.is_empty() {
            return None;
        }
        let i = rand::random::<usize>() % ids.len();
        Some(Selection::Id(ids[i].to_string()))
    }
}

type BalancerCtor = fn() -> std::sync::Arc<dyn Balancer>;

/// Resolves a balancer by the reserved names `roundrobin`/`random` or by a
/// name registered at system construction. Unlike
/// `BehaviorRegistry`/`LoggerRegistry`, this one is not process-global: a
/// balancer never has to be reconstructed inside a forked/remote worker
/// (routing only ever happens in the process that owns the router), so an
/// ordinary per-`ActorSystem` table suffices.
pub struct BalancerRegistry {
    entries: HashMap<String, BalancerCtor>,
}

impl BalancerRegistry {
    pub fn with_builtins() -> Self {
        let mut entries: HashMap<String, BalancerCtor> = HashMap::new();
        entries.insert("roundrobin".to_string(), || {
            std::sync::Arc::new(RoundRobin::new())
        });
        entries.insert("random".to_string(), || std::sync::Arc::new(Random::new()));
        BalancerRegistry { entries }
    }

    pub fn register(&mut self, name: impl Into<String>, ctor: BalancerCtor) {
        self.entries.insert(name.into(), ctor);
    }

    pub fn resolve(&self, name: &str) -> Result<std::sync::Arc<dyn Balancer>, ConfigError> {
        self.entries
            .get(name)
            .map(|ctor| ctor())
            .ok_or_else(|| ConfigError::UnknownBalancer(name.to_string()))
    }
}

impl Default for BalancerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor_ref::Endpoint;
    use crate::id::ActorPath;
    use crate::logging::LogHandle;
    use crate::mailbox::MailboxHandle;

    fn dummy_ref() -> ActorRef {
        let id = ActorId::new();
        let (mailbox, _rx) = MailboxHandle::new(id);
        ActorRef::new(
            id,
            ActorPath::root(),
            LogHandle::test_sink("/"),
            None,
            Endpoint::InMemory(mailbox),
        )
    }

    fn refs(n: usize) -> Vec<ActorRef> {
        (0..n).map(|_| dummy_ref()).collect()
    }

    #[tokio::test]
    async fn round_robin_cycles_in_order() {
        let rr = RoundRobin::new();
        let reps = refs(3);
        rr.cluster_changed(&reps).await;
        let payload = Payload::new(());
        let mut picks = Vec::new();
        for _ in 0..6 {
            match rr.forward("t", &payload) {
                Some(Selection::Id(id)) => picks.push(id),
                _ => panic!("expected a selection"),
            }
        }
        let expected: Vec<String> = (0..6).map(|i| reps[i % 3].id().to_string()).collect();
        assert_eq!(picks, expected);
    }

    #[tokio::test]
    async fn empty_cluster_forwards_to_nothing() {
        let rr = RoundRobin::new();
        rr.cluster_changed(&[]).await;
        assert!(rr.forward("t", &Payload::new(())).is_none());
    }

    #[test]
    fn unknown_balancer_name_is_unknown_balancer_error() {
        let registry = BalancerRegistry::with_builtins();
        let err = registry.resolve("does-not-exist").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownBalancer(_)));
    }

    #[test]
    fn builtins_are_resolved_by_reserved_name() {
        let registry = BalancerRegistry::with_builtins();
        assert_eq!(registry.resolve("roundrobin").unwrap().name(), "roundrobin");
        assert_eq!(registry.resolve("random").unwrap().name(), "random");
    }
}
