//! Entry point for a forked worker process.
//!
//! A process started via `Placement::Forked` re-executes the current
//! binary (see `endpoint::process::spawn`, which sets `ACTORHOST_WORKER`
//! and friends on the child's environment). Application `main` functions
//! that ever use forked placement must call `run_if_worker().await` before
//! doing anything else: it recognizes that env var and, if present, never
//! returns - it hosts one actor over stdio until the launching process
//! disconnects, then exits the process. If the var is absent (the ordinary,
//! non-worker invocation), it returns immediately and `main` continues.

use tokio::io::{stdin, stdout};

use crate::actor_ref::{ActorRef, Endpoint};
use crate::behavior::BehaviorRegistry;
use crate::cell;
use crate::endpoint::conn::Conn;
use crate::endpoint::process::ProcessEndpoint;
use crate::id::{ActorId, ActorPath};
use crate::logging::{Level, LoggerFactory, LoggerRef};
use crate::resource::ResourceRegistry;
use crate::router::BalancerRegistry;
use crate::system::SystemHandle;

/// Checks `ACTORHOST_WORKER` and, if set, serves one actor over stdio until
/// the launching process disconnects, then exits the process. Returns
/// immediately otherwise.
pub async fn run_if_worker() {
    if std::env::var("ACTORHOST_WORKER").is_err() {
        return;
    }

    let behavior_name = std::env::var("ACTORHOST_BEHAVIOR_NAME")
        .expect("ACTORHOST_BEHAVIOR_NAME set by the launching process");
    let path = ActorPath::from_str(
        &std::env::var("ACTORHOST_ACTOR_PATH")
            .expect("ACTORHOST_ACTOR_PATH set by the launching process"),
    );
    let test_mode = std::env::var("ACTORHOST_TEST_MODE").as_deref() == Ok("1");
    let additional_requires = std::env::var("ACTORHOST_ADDITIONAL_REQUIRES").ok();
    let logger_ref = match std::env::var("ACTORHOST_LOGGER_NAME") {
        Ok(name) => LoggerRef::Named(name),
        Err(_) => LoggerRef::Default,
    };

    let resources = ResourceRegistry::new();
    let default_level = if test_mode { Level::Silent } else { Level::Info };
    let logger_factory = LoggerFactory::new(logger_ref.clone(), default_level)
        .unwrap_or_else(|e| panic!("failed to resolve logger `{logger_ref:?}` in worker process: {e}"));
    let balancers = BalancerRegistry::with_builtins();

    let handle = SystemHandle::detached(
        resources.clone(),
        logger_factory,
        logger_ref,
        balancers,
        additional_requires,
        test_mode,
    );

    let conn = Conn::spawn(Box::new(stdin()), Box::new(stdout()), handle.table(), handle.clone());

    let parent_path = path.parent();
    let parent_log = handle.log_for(&parent_path);
    let parent_ref = ActorRef::new(
        ActorId::new(),
        parent_path.clone(),
        parent_log,
        None,
        Endpoint::Forked(ProcessEndpoint::wrap(conn.clone(), parent_path, handle.clone())),
    );

    let behavior = BehaviorRegistry::construct(&behavior_name, &resources).unwrap_or_else(|e| {
        panic!("failed to reconstruct behavior `{behavior_name}` in worker process: {e}")
    });

    let log = handle.log_for(&path);
    let actor = cell::spawn(
        ActorId::new(),
        path.clone(),
        behavior,
        log,
        Some(parent_ref),
        handle.clone(),
    )
    .await
    .unwrap_or_else(|e| panic!("failed to initialize worker actor at `{path}`: {e}"));

    handle.table().insert(path.as_str().to_string(), actor.clone());

    conn.wait_closed().await;
    actor.destroy().await;
    std::process::exit(0);
}
