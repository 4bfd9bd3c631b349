//! Global assembly: constructs the root actor, wires the registries, and
//! hands out the handle every other part of the crate uses to create
//! actors without reaching through a hidden global.
//!
//! A fluent `SystemBuilder::{root, resource, logger, balancer, ...}`
//! terminating in `.build()` assembles a `SystemConfig`, then threads an
//! explicit `SystemHandle` through every `ActorRef`/`ActorContext` instead
//! of leaving the running system as an ambient singleton. The two
//! process-wide registries that remain (`BehaviorRegistry`,
//! `LoggerRegistry`) are not a relapse into that pattern: they exist only
//! because a forked/remote worker process needs a way to resolve a name
//! back into an object without having received the object itself, which a
//! per-instance `SystemHandle` cannot help with since it never crosses the
//! process boundary.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::net::TcpListener;

use crate::actor_ref::ActorRef;
use crate::behavior::{single, Behavior, BehaviorFactory, BehaviorTable};
use crate::cell;
use crate::endpoint;
use crate::error::{CreateError, SystemError};
use crate::id::{validate_name, ActorId, ActorPath};
use crate::logging::{Level, LogHandle, LoggerFactory, LoggerRef};
use crate::placement::Placement;
use crate::resource::{Resource, ResourceRegistry};
use crate::router::{Balancer, BalancerRegistry};

/// A single configuration record: every recognized option is a field here,
/// assembled through `SystemBuilder` rather than parsed from a file -
/// config-file loading is out of scope.
#[derive(Default)]
pub struct SystemConfig {
    root: Option<BehaviorFactory>,
    resources: Vec<(String, Arc<dyn Resource>)>,
    logger: LoggerRef,
    default_level: Option<Level>,
    categories: HashMap<String, Level>,
    balancers: Vec<(String, fn() -> Arc<dyn Balancer>)>,
    test: bool,
    additional_requires: Option<String>,
}

/// Builds a `SystemConfig` and assembles an `ActorSystem` from it. One
/// setter per recognized option, terminating in `.build()`.
#[derive(Default)]
pub struct SystemBuilder {
    cfg: SystemConfig,
}

impl SystemBuilder {
    pub fn new() -> Self {
        SystemBuilder::default()
    }

    /// The root actor's behavior. Defaults to an empty `BehaviorTable` if
    /// never set.
    pub fn root(mut self, behavior: Box<dyn Behavior>) -> Self {
        self.cfg.root = Some(single(behavior));
        self
    }

    pub fn root_factory(mut self, factory: BehaviorFactory) -> Self {
        self.cfg.root = Some(factory);
        self
    }

    /// Register a resource instance, made available by `name` to any
    /// behavior that declares it as a dependency.
    pub fn resource(mut self, name: impl Into<String>, instance: Arc<dyn Resource>) -> Self {
        self.cfg.resources.push((name.into(), instance));
        self
    }

    pub fn logger(mut self, logger: LoggerRef) -> Self {
        self.cfg.logger = logger;
        self
    }

    /// `loggerConfig.categories`: a map from actor name (or `"default"`) to
    /// the `Level` gating that category's emission. An actor's name is the
    /// sibling-unique name it was given at `createChild` time, or, for the
    /// root actor (which has no such name), its configured behavior's
    /// `Behavior::name()`.
    pub fn logger_categories(mut self, categories: HashMap<String, Level>) -> Self {
        for (k, v) in categories {
            if k == "default" {
                self.cfg.default_level = Some(v);
            } else {
                self.cfg.categories.insert(k, v);
            }
        }
        self
    }

    pub fn balancer(mut self, name: impl Into<String>, ctor: fn() -> Arc<dyn Balancer>) -> Self {
        self.cfg.balancers.push((name.into(), ctor));
        self
    }

    /// Enables deterministic, network-free defaults used by the test
    /// suite: a `Silent`-by-default logger instead of a terminal drain, and
    /// no implicit `listen()` binding.
    pub fn test_mode(mut self, test: bool) -> Self {
        self.cfg.test = test;
        self
    }

    pub fn additional_requires(mut self, directive: impl Into<String>) -> Self {
        self.cfg.additional_requires = Some(directive.into());
        self
    }

    pub async fn build(self) -> Result<ActorSystem, SystemError> {
        ActorSystem::from_config(self.cfg).await
    }
}

/// Internal shared state every `ActorRef`/`ActorContext` created under this
/// system reaches through. Cloning is cheap (an `Arc` underneath); every
/// clone refers to the same system.
#[derive(Clone)]
pub struct SystemHandle {
    inner: Arc<Inner>,
}

struct Inner {
    resources: ResourceRegistry,
    logger_factory: LoggerFactory,
    /// The reference the logger was built from (`Default` or `Named`), kept
    /// alongside the constructed `LoggerFactory` so a forked child can be
    /// told which name to resolve in its own process rather than always
    /// falling back to the default terminal sink.
    logger_ref: LoggerRef,
    balancers: BalancerRegistry,
    additional_requires: Option<String>,
    test_mode: bool,
    /// Every actor ever created under this system, addressable by its full
    /// path - consulted by a forked worker's or remote listener's frame
    /// server when a `Request`/`Destroy` frame names a path instead of
    /// carrying the `ActorRef` directly (the thing a process boundary
    /// cannot carry).
    table: Arc<DashMap<String, ActorRef>>,
    listening: AtomicBool,
}

impl SystemHandle {
    /// A handle with no root actor and no listener - what a forked worker
    /// needs to host the single actor it was launched for. Never reached
    /// from `SystemBuilder::build`.
    pub(crate) fn detached(
        resources: ResourceRegistry,
        logger_factory: LoggerFactory,
        logger_ref: LoggerRef,
        balancers: BalancerRegistry,
        additional_requires: Option<String>,
        test_mode: bool,
    ) -> Self {
        SystemHandle {
            inner: Arc::new(Inner {
                resources,
                logger_factory,
                logger_ref,
                balancers,
                additional_requires,
                test_mode,
                table: Arc::new(DashMap::new()),
                listening: AtomicBool::new(false),
            }),
        }
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.inner.resources
    }

    /// The logger reference this system was built with - consulted by a
    /// forked child's launch so it can resolve the same named logger in its
    /// own process, rather than always falling back to the default sink.
    pub(crate) fn logger_ref(&self) -> &LoggerRef {
        &self.inner.logger_ref
    }

    pub fn test_mode(&self) -> bool {
        self.inner.test_mode
    }

    pub fn additional_requires(&self) -> Option<&str> {
        self.inner.additional_requires.as_deref()
    }

    pub fn resolve_balancer(&self, name: &str) -> Result<Arc<dyn Balancer>, crate::error::ConfigError> {
        self.inner.balancers.resolve(name)
    }

    /// A `LogHandle` for the actor at `path`, gated by `loggerConfig.categories`
    /// keyed on `path`'s own last segment - the sibling-unique name it was
    /// given at `createChild` time, per §4.2's actor-name contract. Use
    /// `log_for_category` instead for the one actor (the root) with no such
    /// segment.
    pub(crate) fn log_for(&self, path: &ActorPath) -> LogHandle {
        self.log_for_category(path, path.name())
    }

    /// A `LogHandle` for the actor at `path`, gated by `loggerConfig.categories`
    /// keyed explicitly on `category` rather than derived from `path`.
    pub(crate) fn log_for_category(&self, path: &ActorPath, category: &str) -> LogHandle {
        self.inner.logger_factory.handle_for(path.as_str(), category)
    }

    pub(crate) fn table(&self) -> Arc<DashMap<String, ActorRef>> {
        self.inner.table.clone()
    }

    fn register(&self, path: &ActorPath, actor_ref: ActorRef) {
        self.inner.table.insert(path.as_str().to_string(), actor_ref);
    }

    /// Create a child of the actor at `parent_path`, dispatching on
    /// `placement` to the right concrete spawn routine. This is the single
    /// seam every `createChild` call - in-memory, forked, remote, or
    /// router - eventually funnels through.
    pub(crate) async fn create_child(
        &self,
        parent_path: &ActorPath,
        parent_ref: Option<ActorRef>,
        name: &str,
        factory: BehaviorFactory,
        placement: Placement,
    ) -> Result<ActorRef, CreateError> {
        validate_name(name).map_err(|e| CreateError::InjectionFailure(e.to_string()))?;
        let path = parent_path.child(name);
        let id = ActorId::new();
        let log = self.log_for(&path);

        let actor_ref = match placement {
            Placement::InMemory => {
                let behavior = factory()?;
                cell::spawn(id, path.clone(), behavior, log, parent_ref, self.clone()).await?
            }
            #[cfg(feature = "serde")]
            Placement::Forked {
                behavior_name,
                program,
            } => {
                endpoint::process::spawn(
                    id,
                    path.clone(),
                    behavior_name,
                    program,
                    log,
                    parent_ref,
                    self.clone(),
                )
                .await?
            }
            #[cfg(feature = "serde")]
            Placement::Remote { behavior_name, addr } => {
                endpoint::remote::spawn(id, path.clone(), behavior_name, addr, log, parent_ref, self.clone())
                    .await?
            }
            Placement::Router(spec) => {
                crate::router::spawn(id, path.clone(), factory, spec, log, parent_ref, self.clone()).await?
            }
        };

        self.register(&path, actor_ref.clone());
        Ok(actor_ref)
    }
}

/// The runtime: the root actor, the shared registries, and the
/// whole-system operations (`root_actor()`, `listen()`, `destroy()`,
/// `log()`).
#[derive(Clone)]
pub struct ActorSystem {
    handle: SystemHandle,
    root: ActorRef,
}

impl ActorSystem {
    async fn from_config(cfg: SystemConfig) -> Result<ActorSystem, SystemError> {
        let resources = ResourceRegistry::new();
        for (name, instance) in cfg.resources {
            resources
                .register(&name, instance)
                .map_err(SystemError::Resource)?;
        }

        let default_level = cfg
            .default_level
            .unwrap_or(if cfg.test { Level::Silent } else { Level::Info });
        let logger_ref = cfg.logger.clone();
        let logger_factory =
            LoggerFactory::new(cfg.logger, default_level)?.with_categories(cfg.categories);

        let mut balancers = BalancerRegistry::with_builtins();
        for (name, ctor) in cfg.balancers {
            balancers.register(name, ctor);
        }

        let inner = Arc::new(Inner {
            resources,
            logger_factory,
            logger_ref,
            balancers,
            additional_requires: cfg.additional_requires,
            test_mode: cfg.test,
            table: Arc::new(DashMap::new()),
            listening: AtomicBool::new(false),
        });
        let handle = SystemHandle { inner };

        let root_path = ActorPath::root();
        let root_factory = cfg.root.unwrap_or_else(|| {
            crate::behavior::factory(|| Ok(Box::new(BehaviorTable::new()) as Box<dyn Behavior>))
        });
        let root_behavior = root_factory().map_err(|e| match e {
            CreateError::Config(c) => SystemError::Config(c),
            other => SystemError::Config(crate::error::ConfigError::InvalidName(other.to_string())),
        })?;
        // The root actor is never created through `create_child`, so it has
        // no sibling-unique name to gate `loggerConfig.categories` by; its
        // category key comes from the behavior itself instead (§4.2).
        let root_category = root_behavior.name();
        let root_log = handle.log_for_category(&root_path, &root_category);
        let root = cell::spawn(
            ActorId::new(),
            root_path.clone(),
            root_behavior,
            root_log,
            None,
            handle.clone(),
        )
        .await
        .map_err(|e| SystemError::Config(crate::error::ConfigError::InvalidName(e.to_string())))?;
        handle.register(&root_path, root.clone());

        Ok(ActorSystem { handle, root })
    }

    pub fn root_actor(&self) -> ActorRef {
        self.root.clone()
    }

    pub fn log(&self) -> LogHandle {
        self.root.log().clone()
    }

    pub(crate) fn handle(&self) -> SystemHandle {
        self.handle.clone()
    }

    /// Bind a listener so remote-mode `createChild` requests from peer
    /// systems can reach this one. Resolves once bound, to the address
    /// actually bound (useful when `addr`'s port is `0`).
    #[cfg(feature = "serde")]
    pub async fn listen(&self, addr: SocketAddr) -> Result<SocketAddr, SystemError> {
        let listener = TcpListener::bind(addr).await.map_err(SystemError::ListenFailed)?;
        let bound = listener.local_addr().map_err(SystemError::ListenFailed)?;
        self.handle.inner.listening.store(true, Ordering::SeqCst);
        let handle = self.handle.clone();
        let root = self.root.clone();
        tokio::spawn(async move {
            endpoint::remote::accept_loop(listener, handle, root).await;
        });
        Ok(bound)
    }

    /// `rootRef.destroy()` followed by `ResourceRegistry.destroyAll()` -
    /// the supervision tree's post-order teardown, then every shared
    /// resource, in reverse registration order.
    pub async fn destroy(&self) {
        self.root.destroy().await;
        self.handle
            .inner
            .resources
            .destroy_all(&self.handle.log_for(&ActorPath::root()))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::factory;
    use crate::context::ActorContext;
    use crate::error::ActorError;
    use crate::payload::Payload;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Recording {
        tag: &'static str,
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Behavior for Recording {
        async fn destroy(&mut self, _ctx: &ActorContext) {
            self.order.lock().unwrap().push(self.tag);
        }
        async fn handle(
            &mut self,
            _topic: &str,
            _payload: Payload,
            _ctx: &ActorContext,
        ) -> Result<Option<Payload>, ActorError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn destruction_order_is_post_order_then_resources() {
        let order = Arc::new(Mutex::new(Vec::new()));

        struct MyResource {
            order: Arc<Mutex<Vec<&'static str>>>,
        }
        #[async_trait]
        impl Resource for MyResource {
            async fn destroy(&self) {
                self.order.lock().unwrap().push("resource");
            }
            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
        }

        let system = SystemBuilder::new()
            .test_mode(true)
            .resource(
                "MyResource",
                Arc::new(MyResource {
                    order: order.clone(),
                }),
            )
            .root(Box::new(Recording {
                tag: "root",
                order: order.clone(),
            }))
            .build()
            .await
            .unwrap();

        let root = system.root_actor();
        let child = root
            .create_child(
                "child",
                factory({
                    let order = order.clone();
                    move || {
                        Ok(Box::new(Recording {
                            tag: "child",
                            order: order.clone(),
                        }) as Box<dyn Behavior>)
                    }
                }),
                Placement::InMemory,
            )
            .await
            .unwrap();
        child
            .create_child(
                "grandchild",
                factory({
                    let order = order.clone();
                    move || {
                        Ok(Box::new(Recording {
                            tag: "grandchild",
                            order: order.clone(),
                        }) as Box<dyn Behavior>)
                    }
                }),
                Placement::InMemory,
            )
            .await
            .unwrap();

        system.destroy().await;

        assert_eq!(
            *order.lock().unwrap(),
            vec!["grandchild", "child", "root", "resource"]
        );
    }

    #[tokio::test]
    async fn root_defaults_to_an_empty_behavior_table() {
        let system = SystemBuilder::new().test_mode(true).build().await.unwrap();
        let err = system
            .root_actor()
            .send_and_receive("anything", Payload::new(()))
            .await
            .unwrap_err();
        assert!(matches!(err, ActorError::HandlerFailure(_)));
        system.destroy().await;
    }
}
