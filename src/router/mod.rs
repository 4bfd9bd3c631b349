//! The clustered router endpoint: N replica children behind a pluggable
//! [`Balancer`], with crash detection, optional respawn, broadcast fan-out
//! and `metrics` aggregation.
//!
//! Turns "one logical child, N physical replicas" into just another
//! [`crate::actor_ref::Endpoint`] variant - not a special case bolted onto
//! `ActorRef` - so every operation
//! (`send`/`broadcast`/`destroy`/...) still goes through the same dispatch
//! `ActorRef` already has. The replica `ActorRef`s are ordinary children in
//! the supervision tree and are torn down through the normal post-order
//! `destroy` path; the router adds only the balancer bookkeeping and the
//! crash watchdog on top.

pub mod balancer;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

pub use balancer::{BalancerRegistry, RoundRobin, Random, Selection};
pub use balancer::Balancer;

use crate::actor_ref::ActorRef;
use crate::behavior::BehaviorFactory;
use crate::error::{ActorError, CreateError};
use crate::id::{ActorId, ActorPath};
use crate::logging::LogHandle;
use crate::payload::Payload;
use crate::placement::{CrashPolicy, Placement, RouterSpec};
use crate::system::SystemHandle;

/// One `metrics()` reply from a single replica: whatever numeric/non-numeric
/// fields its `metrics` handler chose to report. A replica with no
/// `metrics` handler contributes an empty record, per spec.
pub type MetricsRecord = HashMap<String, serde_json::Value>;

struct RouterState {
    router_path: ActorPath,
    replicas: RwLock<Vec<ActorRef>>,
    balancer: Arc<dyn Balancer>,
    on_crash: CrashPolicy,
    factory: BehaviorFactory,
    replica_placement: Placement,
    replica_mode: &'static str,
    system: SystemHandle,
    log: LogHandle,
    next_replica_name: AtomicUsize,
    destroyed: AtomicBool,
    cluster_changed_count: AtomicUsize,
    self_ref: std::sync::OnceLock<ActorRef>,
}

/// The router's own endpoint implementation; see the module docs.
#[derive(Clone)]
pub struct RouterEndpoint(Arc<RouterState>);

/// Construct a router actor and its initial `clusterSize` replicas, placed
/// per `spec.replica_placement`. Every replica is a child of the returned
/// `ActorRef`, not of whatever actor called `createChild` - the supervision
/// tree treats a router exactly like any other actor with children.
pub(crate) async fn spawn(
    id: ActorId,
    path: ActorPath,
    factory: BehaviorFactory,
    spec: RouterSpec,
    log: LogHandle,
    parent: Option<ActorRef>,
    system: SystemHandle,
) -> Result<ActorRef, CreateError> {
    let replica_mode = spec.replica_placement.mode_name();
    let state = Arc::new(RouterState {
        router_path: path.clone(),
        replicas: RwLock::new(Vec::new()),
        balancer: spec.balancer.clone(),
        on_crash: spec.on_crash,
        factory,
        replica_placement: (*spec.replica_placement).clone(),
        replica_mode,
        system,
        log: log.clone(),
        next_replica_name: AtomicUsize::new(0),
        destroyed: AtomicBool::new(false),
        cluster_changed_count: AtomicUsize::new(0),
        self_ref: std::sync::OnceLock::new(),
    });

    let router_ref = ActorRef::new(
        id,
        path,
        log,
        parent,
        crate::actor_ref::Endpoint::Router(RouterEndpoint(state.clone())),
    );
    let _ = state.self_ref.set(router_ref.clone());

    for _ in 0..spec.replica_count.max(1) {
        spawn_replica(&state, router_ref.clone()).await?;
    }
    notify_cluster_changed(&state).await;

    Ok(router_ref)
}

async fn notify_cluster_changed(state: &Arc<RouterState>) {
    let snapshot = state.replicas.read().await.clone();
    state.balancer.cluster_changed(&snapshot).await;
    state.cluster_changed_count.fetch_add(1, Ordering::SeqCst);
}

async fn spawn_replica(state: &Arc<RouterState>, router_ref: ActorRef) -> Result<(), CreateError> {
    let idx = state.next_replica_name.fetch_add(1, Ordering::SeqCst);
    let name = idx.to_string();
    let child = state
        .system
        .create_child(
            &state.router_path,
            Some(router_ref),
            &name,
            state.factory.clone(),
            state.replica_placement.clone(),
        )
        .await?;
    state.replicas.write().await.push(child.clone());
    watch_replica(state.clone(), child);
    Ok(())
}

/// Spawn the watchdog task that tells a router apart from a deliberate
/// `destroy()`: `ActorRef::wait_for_crash` resolves `true` only when the
/// replica's task ended for a reason this handle did not itself request.
fn watch_replica(state: Arc<RouterState>, replica: ActorRef) {
    tokio::spawn(async move {
        let crashed = replica.wait_for_crash().await;
        if crashed {
            on_replica_crash(state, replica).await;
        }
    });
}

async fn on_replica_crash(state: Arc<RouterState>, crashed: ActorRef) {
    if state.destroyed.load(Ordering::SeqCst) {
        return;
    }
    state.log.warn(format!(
        "replica `{}` of router `{}` crashed",
        crashed.path(),
        state.router_path
    ));
    {
        let mut reps = state.replicas.write().await;
        reps.retain(|r| r.id() != crashed.id());
    }
    notify_cluster_changed(&state).await;

    if state.on_crash == CrashPolicy::Respawn {
        let router_ref = state
            .self_ref
            .get()
            .cloned()
            .expect("self_ref set before any replica can crash");
        if let Err(e) = spawn_replica(&state, router_ref).await {
            state.log.error(format!("failed to respawn replica: {e}"));
            return;
        }
        notify_cluster_changed(&state).await;
    }
}

impl RouterEndpoint {
    pub fn mode(&self) -> &'static str {
        self.0.replica_mode
    }

    /// Number of membership changes broadcast to the balancer so far -
    /// exposed for tests asserting the "exactly once per membership
    /// change" invariant (spec §8).
    pub fn cluster_changed_count(&self) -> usize {
        self.0.cluster_changed_count.load(Ordering::SeqCst)
    }

    pub async fn replica_count(&self) -> usize {
        self.0.replicas.read().await.len()
    }

    async fn resolve_target(&self, topic: &str, payload: &Payload) -> Result<ActorRef, ActorError> {
        let selection = self.0.balancer.forward(topic, payload);
        let reps = self.0.replicas.read().await;
        match selection {
            Some(Selection::Id(id)) => reps
                .iter()
                .find(|r| r.id().to_string() == id)
                .cloned()
                .ok_or(ActorError::NoRoutableChild),
            Some(Selection::Ref(wanted)) => reps
                .iter()
                .find(|r| r.id() == wanted.id())
                .cloned()
                .ok_or(ActorError::NoRoutableChild),
            None => Err(ActorError::NoRoutableChild),
        }
    }

    pub async fn send(&self, topic: String, payload: Payload) -> Result<(), ActorError> {
        let target = self.resolve_target(&topic, &payload).await?;
        target.send(topic, payload).await
    }

    pub async fn send_and_receive(
        &self,
        topic: String,
        payload: Payload,
    ) -> Result<Payload, ActorError> {
        let target = self.resolve_target(&topic, &payload).await?;
        target.send_and_receive(topic, payload).await
    }

    pub async fn broadcast<T: crate::payload::Message + Clone>(
        &self,
        topic: String,
        value: T,
    ) -> Result<(), ActorError> {
        let reps = self.0.replicas.read().await.clone();
        let mut tasks = Vec::with_capacity(reps.len());
        for rep in reps {
            let topic = topic.clone();
            let value = value.clone();
            tasks.push(async move { rep.send(topic, Payload::new(value)).await });
        }
        for result in futures::future::join_all(tasks).await {
            result?;
        }
        Ok(())
    }

    pub async fn broadcast_and_receive<T: crate::payload::Message + Clone>(
        &self,
        topic: String,
        value: T,
    ) -> Result<Vec<Payload>, ActorError> {
        let reps = self.0.replicas.read().await.clone();
        let mut tasks = Vec::with_capacity(reps.len());
        for rep in reps {
            let topic = topic.clone();
            let value = value.clone();
            tasks.push(async move { rep.send_and_receive(topic, Payload::new(value)).await });
        }
        futures::future::join_all(tasks).await.into_iter().collect()
    }

    /// `metrics()` calls each live replica's `metrics` handler (an absent
    /// handler contributes an empty record, surfaced as `HandlerFailure`
    /// from `BehaviorTable`'s unknown-topic default) and returns a map
    /// keyed `"0".."N-1"` in replica-index order plus `"summary"`, the
    /// field-wise sum of every numeric field across replicas.
    pub async fn metrics(&self) -> HashMap<String, MetricsRecord> {
        let reps = self.0.replicas.read().await.clone();
        let mut out = HashMap::with_capacity(reps.len() + 1);
        let mut summary = MetricsRecord::new();

        for (idx, rep) in reps.iter().enumerate() {
            let record = match rep.send_and_receive("metrics", Payload::new(())).await {
                Ok(payload) => payload.downcast::<MetricsRecord>().unwrap_or_default(),
                Err(_) => MetricsRecord::new(),
            };
            for (field, value) in &record {
                if let Some(n) = value.as_f64() {
                    let entry = summary
                        .entry(field.clone())
                        .or_insert(serde_json::Value::from(0.0));
                    let sum = entry.as_f64().unwrap_or(0.0) + n;
                    *entry = serde_json::Value::from(sum);
                }
            }
            out.insert(idx.to_string(), record);
        }
        out.insert("summary".to_string(), summary);
        out
    }

    pub async fn create_child(
        &self,
        name: &str,
        factory: BehaviorFactory,
        placement: Placement,
    ) -> Result<ActorRef, CreateError> {
        let router_ref = self.0.self_ref.get().cloned();
        self.0
            .system
            .create_child(&self.0.router_path, router_ref, name, factory, placement)
            .await
    }

    pub async fn destroy(&self) {
        if self.0.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        let reps = self.0.replicas.read().await.clone();
        for rep in reps {
            rep.destroy().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::{factory, Behavior};
    use crate::context::ActorContext;
    use crate::error::ActorError as AErr;
    use crate::system::SystemBuilder;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    struct Echo {
        tag: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Behavior for Echo {
        async fn handle(
            &mut self,
            topic: &str,
            payload: Payload,
            _ctx: &ActorContext,
        ) -> Result<Option<Payload>, AErr> {
            match topic {
                "tag" => Ok(Some(Payload::new(self.tag.load(Ordering::SeqCst)))),
                "metrics" => {
                    let mut record = MetricsRecord::new();
                    record.insert("count".into(), serde_json::json!(self.tag.load(Ordering::SeqCst)));
                    Ok(Some(Payload::new(record)))
                }
                _ => Err(AErr::HandlerFailure("unhandled".into())),
            }
        }
    }

    async fn build_cluster(n: usize) -> (crate::system::ActorSystem, ActorRef) {
        let system = SystemBuilder::new().test_mode(true).build().await.unwrap();
        let counter = Arc::new(AtomicU32::new(0));
        let fac = factory(move || {
            let c = counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Echo {
                tag: Arc::new(AtomicU32::new(c)),
            }) as Box<dyn Behavior>)
        });
        let placement = Placement::Router(RouterSpec {
            replica_count: n,
            replica_placement: Box::new(Placement::InMemory),
            balancer: Arc::new(RoundRobin::new()),
            on_crash: CrashPolicy::None,
        });
        let router = system
            .root_actor()
            .create_child("cluster", fac, placement)
            .await
            .unwrap();
        (system, router)
    }

    #[tokio::test]
    async fn round_robin_distributes_over_replicas() {
        let (system, router) = build_cluster(3).await;
        let mut tags = Vec::new();
        for _ in 0..6 {
            let reply = router.send_and_receive("tag", Payload::new(())).await.unwrap();
            tags.push(reply.downcast::<u32>().unwrap());
        }
        assert_eq!(tags[0], tags[3]);
        assert_eq!(tags[1], tags[4]);
        assert_eq!(tags[2], tags[5]);
        system.destroy().await;
    }

    #[tokio::test]
    async fn metrics_returns_cluster_size_plus_one_entries_and_sums_fields() {
        let (system, router) = build_cluster(3).await;
        let metrics = router.metrics().await;
        assert_eq!(metrics.len(), 4);
        let sum: f64 = (0..3)
            .map(|i| metrics[&i.to_string()]["count"].as_f64().unwrap())
            .sum();
        assert_eq!(metrics["summary"]["count"].as_f64().unwrap(), sum);
        system.destroy().await;
    }

    #[tokio::test]
    async fn broadcast_and_receive_preserves_replica_order() {
        let (system, router) = build_cluster(3).await;
        let replies = router
            .broadcast_and_receive("tag", ())
            .await
            .unwrap();
        let tags: Vec<u32> = replies.into_iter().map(|p| p.downcast::<u32>().unwrap()).collect();
        assert_eq!(tags, vec![0, 1, 2]);
        system.destroy().await;
    }

    struct AlwaysNone;

    #[async_trait]
    impl Balancer for AlwaysNone {
        fn name(&self) -> &'static str {
            "always-none"
        }
        fn forward(&self, _topic: &str, _payload: &Payload) -> Option<Selection> {
            None
        }
    }

    #[tokio::test]
    async fn empty_forward_fails_with_no_routable_child() {
        let system = SystemBuilder::new().test_mode(true).build().await.unwrap();
        let fac = factory(|| {
            Ok(Box::new(Echo {
                tag: Arc::new(AtomicU32::new(0)),
            }) as Box<dyn Behavior>)
        });
        let placement = Placement::Router(RouterSpec {
            replica_count: 2,
            replica_placement: Box::new(Placement::InMemory),
            balancer: Arc::new(AlwaysNone),
            on_crash: CrashPolicy::None,
        });
        let router = system
            .root_actor()
            .create_child("cluster", fac, placement)
            .await
            .unwrap();
        let err = router.send_and_receive("tag", Payload::new(())).await.unwrap_err();
        assert!(matches!(err, AErr::NoRoutableChild));
        system.destroy().await;
    }
}
