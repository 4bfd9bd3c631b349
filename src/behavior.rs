//! Actor behavior: the user-supplied logic a `Behavior` implementor runs
//! inside an `ActorCell`.
//!
//! An explicit `initialize`/`destroy` pair brackets the cell's
//! `Initializing`/`Destroying` states, and `handle` dispatches dynamically
//! by topic rather than a single fixed message type, since the set of
//! message kinds an actor handles is not known up front.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::context::ActorContext;
use crate::error::{ActorError, CreateError};
use crate::payload::Payload;
use crate::resource::ResourceRegistry;

/// User-supplied actor logic.
///
/// `initialize` runs once while the cell is `Initializing`, after any
/// declared resources have been injected and before the mailbox opens;
/// returning `Err` aborts construction (`CreateError::InitFailure`) and the
/// cell never reaches `Ready`. `destroy` runs once while the cell is
/// `Destroying`, after children have already torn down (post-order).
#[async_trait]
pub trait Behavior: Send + Sync {
    async fn initialize(&mut self, _ctx: &ActorContext) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }

    async fn destroy(&mut self, _ctx: &ActorContext) {}

    /// Handle one delivery. `topic` is the dispatch key a sender chose when
    /// constructing the delivery (see `ActorRef::send`); behaviors that only
    /// ever handle a single message shape can ignore it.
    async fn handle(
        &mut self,
        topic: &str,
        payload: Payload,
        ctx: &ActorContext,
    ) -> Result<Option<Payload>, ActorError>;

    /// Names of `ResourceRegistry` entries this behavior needs resolved
    /// before `initialize` runs. Declared rather than resolved ad hoc inside
    /// `initialize` so `createChild` can fail fast with
    /// `CreateError::InjectionFailure` before any user code executes.
    fn dependencies(&self) -> &[&'static str] {
        &[]
    }

    /// This behavior's name for `loggerConfig.categories` gating. A child
    /// actor is gated by the sibling-unique name it was given at
    /// `createChild` time, but the root actor has no such name (it is never
    /// created through `createChild`), so the root's category key comes from
    /// here instead. Defaults to the concrete type's unqualified name, the
    /// same "name defaults to the class name" convention `Resource`
    /// registration uses; override to gate on something else.
    fn name(&self) -> String {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full).to_string()
    }
}

/// Constructs a fresh `Behavior` instance on demand.
///
/// `createChild` never takes a bare `Box<dyn Behavior>`: a router with
/// `clusterSize: N` needs N independent instances (replicas share a
/// behavior, not state), and a `Box<dyn Behavior>` cannot be cloned. An
/// `Arc<dyn Fn() -> ...>` can be called as many times as the placement
/// needs - once for an in-memory singleton, once per replica for an
/// in-memory cluster - while remaining cheap to pass around.
pub type BehaviorFactory =
    Arc<dyn Fn() -> Result<Box<dyn Behavior>, CreateError> + Send + Sync>;

/// Wrap a plain closure as a `BehaviorFactory`.
pub fn factory<F>(f: F) -> BehaviorFactory
where
    F: Fn() -> Result<Box<dyn Behavior>, CreateError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a single already-constructed `Behavior` as a factory that yields it
/// exactly once. Convenient for the common case of an in-memory actor that
/// is never clustered; calling the returned factory a second time (which
/// only a router placement would ever do) fails with `InjectionFailure`
/// rather than silently reusing state across replicas.
pub fn single(behavior: Box<dyn Behavior>) -> BehaviorFactory {
    let slot = Mutex::new(Some(behavior));
    Arc::new(move || {
        slot.lock()
            .unwrap()
            .take()
            .ok_or_else(|| CreateError::InjectionFailure("behavior factory already consumed".into()))
    })
}

/// A dynamically dispatched handler function, the shape `BehaviorTable`
/// stores per topic.
pub type Handler = Arc<
    dyn Fn(
            Payload,
            &ActorContext,
        ) -> futures::future::BoxFuture<'static, Result<Option<Payload>, ActorError>>
        + Send
        + Sync,
>;

/// A `Behavior` built from an explicit per-topic handler map instead of a
/// hand-written `handle` match. Useful when the set of topics is assembled
/// at runtime (e.g. a generic supervisor that forwards whatever topics its
/// children register).
#[derive(Clone, Default)]
pub struct BehaviorTable {
    handlers: HashMap<String, Handler>,
}

impl BehaviorTable {
    pub fn new() -> Self {
        BehaviorTable {
            handlers: HashMap::new(),
        }
    }

    pub fn on<F>(mut self, topic: impl Into<String>, handler: F) -> Self
    where
        F: Fn(
                Payload,
                &ActorContext,
            ) -> futures::future::BoxFuture<'static, Result<Option<Payload>, ActorError>>
            + Send
            + Sync
            + 'static,
    {
        self.handlers.insert(topic.into(), Arc::new(handler));
        self
    }
}

#[async_trait]
impl Behavior for BehaviorTable {
    async fn handle(
        &mut self,
        topic: &str,
        payload: Payload,
        ctx: &ActorContext,
    ) -> Result<Option<Payload>, ActorError> {
        match self.handlers.get(topic) {
            Some(handler) => handler(payload, ctx).await,
            None => Err(ActorError::HandlerFailure(format!(
                "no handler registered for topic `{topic}`"
            ))),
        }
    }
}

/// Constructor recorded in the `BehaviorRegistry`: given the already-injected
/// dependencies, produce a boxed `Behavior`. A bare `fn` pointer for the same
/// reason `LoggerCtor` is - a forked worker must be able to reconstruct the
/// identical behavior from its name alone.
pub type BehaviorCtor =
    fn(deps: &ResourceRegistry) -> Result<Box<dyn Behavior>, CreateError>;

/// Process-wide table of named behavior constructors, used to recreate an
/// actor's logic inside a forked or remote worker process that only
/// received the actor's registered name, not the `Behavior` value itself.
pub struct BehaviorRegistry;

fn registry() -> &'static std::sync::Mutex<HashMap<&'static str, BehaviorCtor>> {
    static REGISTRY: std::sync::OnceLock<std::sync::Mutex<HashMap<&'static str, BehaviorCtor>>> =
        std::sync::OnceLock::new();
    REGISTRY.get_or_init(|| std::sync::Mutex::new(HashMap::new()))
}

impl BehaviorRegistry {
    pub fn register(name: &'static str, ctor: BehaviorCtor) {
        registry().lock().unwrap().insert(name, ctor);
    }

    pub fn construct(name: &str, deps: &ResourceRegistry) -> Result<Box<dyn Behavior>, CreateError> {
        let ctor = registry()
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .ok_or_else(|| CreateError::UnregisteredBehavior(name.to_string()))?;
        ctor(deps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{ActorId, ActorPath};
    use crate::logging::LogHandle;

    fn test_ctx() -> ActorContext {
        ActorContext::detached(ActorId::new(), ActorPath::root(), LogHandle::test_sink("/"))
    }

    #[tokio::test]
    async fn behavior_table_dispatches_by_topic() {
        let mut table = BehaviorTable::new().on("ping", |payload, _ctx| {
            Box::pin(async move {
                let n: u32 = payload.downcast().unwrap();
                Ok(Some(Payload::new(n + 1)))
            })
        });
        let ctx = test_ctx();
        let reply = table
            .handle("ping", Payload::new(41u32), &ctx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.downcast::<u32>().unwrap(), 42);
    }

    #[tokio::test]
    async fn unknown_topic_is_a_handler_failure() {
        let mut table = BehaviorTable::new();
        let ctx = test_ctx();
        let err = table
            .handle("nope", Payload::new(1u32), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ActorError::HandlerFailure(_)));
    }

    #[test]
    fn unregistered_behavior_name_fails_construction() {
        let deps = ResourceRegistry::new();
        let err = BehaviorRegistry::construct("does-not-exist", &deps).unwrap_err();
        assert!(matches!(err, CreateError::UnregisteredBehavior(_)));
    }
}
