//! The handle a `Behavior` is given for the duration of one call.
//!
//! Exposes this actor's own id/path/log/parent and routes `create_child`
//! through the owning `SystemHandle` rather than a global singleton.

use std::sync::{Arc, Mutex};

use crate::actor_ref::ActorRef;
use crate::behavior::BehaviorFactory;
use crate::error::CreateError;
use crate::id::{ActorId, ActorPath};
use crate::logging::LogHandle;
use crate::placement::Placement;
use crate::resource::ResourceRegistry;
use crate::system::SystemHandle;

#[derive(Clone)]
pub struct ActorContext {
    id: ActorId,
    path: ActorPath,
    log: LogHandle,
    parent: Option<ActorRef>,
    self_ref: Option<ActorRef>,
    children: Arc<Mutex<Vec<ActorRef>>>,
    system: Option<SystemHandle>,
}

impl ActorContext {
    pub(crate) fn new(
        id: ActorId,
        path: ActorPath,
        log: LogHandle,
        parent: Option<ActorRef>,
        self_ref: ActorRef,
        system: SystemHandle,
    ) -> Self {
        ActorContext {
            id,
            path,
            log,
            parent,
            self_ref: Some(self_ref),
            children: Arc::new(Mutex::new(Vec::new())),
            system: Some(system),
        }
    }

    /// A context with no backing system, for unit-testing a `Behavior` in
    /// isolation. `create_child` on a detached context always fails.
    pub fn detached(id: ActorId, path: ActorPath, log: LogHandle) -> Self {
        ActorContext {
            id,
            path,
            log,
            parent: None,
            self_ref: None,
            children: Arc::new(Mutex::new(Vec::new())),
            system: None,
        }
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn path(&self) -> &ActorPath {
        &self.path
    }

    pub fn log(&self) -> &LogHandle {
        &self.log
    }

    pub fn parent(&self) -> Option<ActorRef> {
        self.parent.clone()
    }

    pub fn resources(&self) -> Option<&ResourceRegistry> {
        self.system.as_ref().map(|s| s.resources())
    }

    /// Children created through this context so far, in creation order.
    /// The cell task consults this when it tears down, so every child is
    /// destroyed before this actor's own `destroy` hook runs.
    pub(crate) fn children_snapshot(&self) -> Vec<ActorRef> {
        self.children.lock().unwrap().clone()
    }

    /// Create a child of the actor this context belongs to, placed per
    /// `placement`. The child's path is this actor's path with `name`
    /// appended; its parent ref is this actor's own ref.
    pub async fn create_child(
        &self,
        name: &str,
        factory: BehaviorFactory,
        placement: Placement,
    ) -> Result<ActorRef, CreateError> {
        let system = self.system.as_ref().ok_or_else(|| {
            CreateError::InjectionFailure("no system attached (detached context)".into())
        })?;
        let child = system
            .create_child(&self.path, self.self_ref.clone(), name, factory, placement)
            .await?;
        self.children.lock().unwrap().push(child.clone());
        Ok(child)
    }
}
