//! The task loop behind every in-memory `ActorRef`.
//!
//! One dedicated task per actor, draining a bounded channel in order and
//! running user code between `initialize` and `destroy`. `CellState` makes
//! the run loop's Ready -> Destroying -> Destroyed progression explicit
//! instead of leaving it implicit in control flow. The earlier
//! Constructed/Initializing states live in `spawn`, before the run loop's
//! task even exists: `dependencies()` resolution is Constructed, the
//! `initialize` call below is Initializing, and only a successful return
//! from it starts the task, so `CellState` itself never needs to represent
//! either.

use crate::actor_ref::{ActorRef, Endpoint};
use crate::behavior::Behavior;
use crate::context::ActorContext;
use crate::error::CreateError;
use crate::id::{ActorId, ActorPath};
use crate::logging::LogHandle;
use crate::mailbox::{CellMessage, MailboxHandle};
use crate::system::SystemHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CellState {
    Ready,
    Destroying,
    Destroyed,
}

/// Construct and start a new in-memory actor. Runs `initialize` before
/// returning, so a failure there (`CreateError::InitFailure`) is reported to
/// the caller synchronously and no task, and no `ActorRef`, is ever handed
/// back for it.
pub(crate) async fn spawn(
    id: ActorId,
    path: ActorPath,
    mut behavior: Box<dyn Behavior>,
    log: LogHandle,
    parent: Option<ActorRef>,
    system: SystemHandle,
) -> Result<ActorRef, CreateError> {
    for dep in behavior.dependencies() {
        system
            .resources()
            .resolve(dep)
            .map_err(|_| CreateError::InjectionFailure(dep.to_string()))?;
    }

    let (mailbox, rx) = MailboxHandle::new(id);
    let actor_ref = ActorRef::new(
        id,
        path.clone(),
        log.clone(),
        parent.clone(),
        Endpoint::InMemory(mailbox.clone()),
    );
    let ctx = ActorContext::new(
        id,
        path.clone(),
        log.clone(),
        parent,
        actor_ref.clone(),
        system,
    );

    log.debug(format!("initializing actor at `{path}`"));
    behavior
        .initialize(&ctx)
        .await
        .map_err(|source| CreateError::InitFailure {
            path: path.clone(),
            source,
        })?;

    let handle = tokio::spawn(run(behavior, ctx, mailbox.clone(), rx));
    mailbox.attach_task(handle);

    Ok(actor_ref)
}

async fn run(
    mut behavior: Box<dyn Behavior>,
    ctx: ActorContext,
    mailbox: MailboxHandle,
    mut rx: tokio::sync::mpsc::Receiver<CellMessage>,
) {
    let mut state = CellState::Ready;
    ctx.log().debug("actor ready");

    while state == CellState::Ready {
        let msg = match rx.recv().await {
            Some(msg) => msg,
            None => break,
        };
        match msg {
            CellMessage::Deliver(delivery) => {
                let result = behavior
                    .handle(&delivery.topic, delivery.payload, &ctx)
                    .await;
                if let Some(reply) = delivery.reply {
                    let outcome = match result {
                        Ok(Some(payload)) => Ok(payload),
                        Ok(None) => Ok(crate::payload::Payload::new(())),
                        Err(e) => Err(e),
                    };
                    let _ = reply.send(outcome);
                } else if let Err(e) = result {
                    ctx.log().warn(format!("unacknowledged handler failure: {e}"));
                }
            }
            CellMessage::CreateChild {
                name,
                factory,
                placement,
                reply,
            } => {
                let outcome = ctx.create_child(&name, factory, placement).await;
                let _ = reply.send(outcome);
            }
            CellMessage::Destroy => {
                state = CellState::Destroying;
            }
        }
    }

    ctx.log().debug("actor destroying");
    for child in ctx.children_snapshot() {
        child.destroy().await;
    }
    behavior.destroy(&ctx).await;
    state = CellState::Destroyed;
    mailbox.mark_finished();
    ctx.log().debug(format!("actor destroyed ({state:?})"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::factory;
    use crate::error::ActorError;
    use crate::payload::Payload;
    use crate::placement::Placement;
    use crate::resource::Resource;
    use crate::system::SystemBuilder;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct NeedsDb;

    #[async_trait]
    impl Behavior for NeedsDb {
        fn dependencies(&self) -> &[&'static str] {
            &["Db"]
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

    struct Db;
    #[async_trait]
    impl Resource for Db {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    #[tokio::test]
    async fn unresolved_dependency_fails_construction_before_any_task_runs() {
        let system = SystemBuilder::new().test_mode(true).build().await.unwrap();
        let err = system
            .root_actor()
            .create_child("needs-db", factory(|| Ok(Box::new(NeedsDb) as Box<dyn Behavior>)), Placement::InMemory)
            .await
            .unwrap_err();
        assert!(matches!(err, CreateError::InjectionFailure(ref name) if name == "Db"));
        system.destroy().await;
    }

    #[tokio::test]
    async fn resolved_dependency_lets_construction_proceed() {
        let system = SystemBuilder::new()
            .test_mode(true)
            .resource("Db", Arc::new(Db))
            .build()
            .await
            .unwrap();
        let child = system
            .root_actor()
            .create_child("needs-db", factory(|| Ok(Box::new(NeedsDb) as Box<dyn Behavior>)), Placement::InMemory)
            .await
            .unwrap();
        assert_eq!(child.path().as_str(), "/needs-db");
        system.destroy().await;
    }

    struct Silent;

    #[async_trait]
    impl Behavior for Silent {
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
    async fn send_to_a_destroyed_actor_fails_with_stale_reference() {
        let system = SystemBuilder::new().test_mode(true).build().await.unwrap();
        let child = system
            .root_actor()
            .create_child("silent", factory(|| Ok(Box::new(Silent) as Box<dyn Behavior>)), Placement::InMemory)
            .await
            .unwrap();
        child.destroy().await;

        let err = child
            .send_and_receive("anything", Payload::new(()))
            .await
            .unwrap_err();
        assert!(matches!(err, ActorError::StaleReference(id) if id == child.id()));

        system.destroy().await;
    }
}
