//! The forked-process endpoint: a child OS process hosts one actor (and,
//! transitively, any children it creates of its own), reached over its
//! stdio pipes framed per `wire.rs`.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::process::{Child, Command};
use tokio::sync::Mutex as AsyncMutex;

use crate::actor_ref::{ActorRef, Endpoint};
use crate::behavior::BehaviorFactory;
use crate::error::CreateError;
use crate::id::{ActorId, ActorPath};
use crate::logging::LogHandle;
use crate::payload::Payload;
use crate::placement::Placement;
use crate::system::SystemHandle;

use super::conn::Conn;
use super::wire::WirePlacement;

/// State shared by every actor this one connection hosts - the connection
/// itself and the OS process behind it. A forked process may host more than
/// one actor (the root actor it was launched for, plus anything it creates
/// under itself), so this is kept separate from the per-actor `path`.
struct ProcessState {
    conn: Arc<Conn>,
    launch_path: ActorPath,
    system: SystemHandle,
    destroy_requested: AtomicBool,
    child: AsyncMutex<Option<Child>>,
}

/// The parent-side handle to one actor hosted in a forked process.
#[derive(Clone)]
pub struct ProcessEndpoint {
    state: Arc<ProcessState>,
    path: ActorPath,
}

/// Launch a child process hosting a single actor named `behavior_name`,
/// reconstructed there through the same process-wide `BehaviorRegistry`
/// entries the parent process registered. `program` overrides
/// `std::env::current_exe()` for tests that want a fixed helper binary
/// rather than re-executing the test harness itself.
pub(crate) async fn spawn(
    id: ActorId,
    path: ActorPath,
    behavior_name: &'static str,
    program: Option<PathBuf>,
    log: LogHandle,
    parent: Option<ActorRef>,
    system: SystemHandle,
) -> Result<ActorRef, CreateError> {
    let exe = match program {
        Some(p) => p,
        None => std::env::current_exe().map_err(|e| CreateError::PlacementFailed {
            mode: "forked",
            source: Box::new(e),
        })?,
    };

    let mut cmd = Command::new(exe);
    cmd.env("ACTORHOST_WORKER", "1");
    cmd.env("ACTORHOST_BEHAVIOR_NAME", behavior_name);
    cmd.env("ACTORHOST_ACTOR_PATH", path.as_str());
    cmd.env("ACTORHOST_TEST_MODE", if system.test_mode() { "1" } else { "0" });
    if let Some(directive) = system.additional_requires() {
        cmd.env("ACTORHOST_ADDITIONAL_REQUIRES", directive);
    }
    if let crate::logging::LoggerRef::Named(name) = system.logger_ref() {
        cmd.env("ACTORHOST_LOGGER_NAME", name);
    }
    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::inherit());

    let mut child = cmd.spawn().map_err(|e| CreateError::PlacementFailed {
        mode: "forked",
        source: Box::new(e),
    })?;
    let stdin = child.stdin.take().expect("stdin was piped");
    let stdout = child.stdout.take().expect("stdout was piped");

    let conn = Conn::spawn(Box::new(stdout), Box::new(stdin), system.table(), system.clone());
    let state = Arc::new(ProcessState {
        conn,
        launch_path: path.clone(),
        system: system.clone(),
        destroy_requested: AtomicBool::new(false),
        child: AsyncMutex::new(Some(child)),
    });

    Ok(ActorRef::new(
        id,
        path.clone(),
        log,
        parent,
        Endpoint::Forked(ProcessEndpoint { state, path }),
    ))
}

impl ProcessEndpoint {
    /// Wrap an already-open connection as the *reverse* direction's
    /// endpoint: the handle a worker's own hosted actor uses to reach back
    /// to whatever created it, over the same stdio pipes the parent used to
    /// reach the worker. There is no `Child` to reap here - this process
    /// *is* the child - so `destroy()` only ever sends the `Destroy` frame.
    pub(crate) fn wrap(conn: Arc<Conn>, path: ActorPath, system: SystemHandle) -> ProcessEndpoint {
        let state = Arc::new(ProcessState {
            conn,
            launch_path: path.clone(),
            system,
            destroy_requested: AtomicBool::new(false),
            child: AsyncMutex::new(None),
        });
        ProcessEndpoint { state, path }
    }

    pub(crate) async fn send(&self, topic: String, payload: Payload) -> Result<(), crate::error::ActorError> {
        self.state
            .conn
            .request(self.path.as_str(), topic, payload, false)
            .await?;
        Ok(())
    }

    pub(crate) async fn send_and_receive(
        &self,
        topic: String,
        payload: Payload,
    ) -> Result<Payload, crate::error::ActorError> {
        self.state
            .conn
            .request(self.path.as_str(), topic, payload, true)
            .await
    }

    /// Ask the worker to create a child of this actor, inside its own
    /// process. Only `InMemory`/`Forked`/`Remote` placements can cross the
    /// wire this way (see `WirePlacement`); a clustered child would have to
    /// be requested as a `Router` placement on an in-memory parent instead.
    pub(crate) async fn create_child(
        &self,
        name: &str,
        _factory: BehaviorFactory,
        placement: Placement,
    ) -> Result<ActorRef, CreateError> {
        let behavior_name = match &placement {
            Placement::Forked { behavior_name, .. } | Placement::Remote { behavior_name, .. } => {
                *behavior_name
            }
            _ => "",
        };
        let wire_placement = WirePlacement::from_placement(&placement).map_err(|e| {
            CreateError::PlacementFailed {
                mode: "forked",
                source: Box::new(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())),
            }
        })?;
        let wire_value = serde_json::to_value(&wire_placement).expect("WirePlacement is always JSON");
        let child_path_str = self
            .state
            .conn
            .create_child(self.path.as_str(), name, behavior_name, wire_value)
            .await?;
        let child_path = ActorPath::from_str(&child_path_str);
        let log = self.state.system.log_for(&child_path);
        Ok(ActorRef::new(
            ActorId::new(),
            child_path.clone(),
            log,
            None,
            Endpoint::Forked(ProcessEndpoint {
                state: self.state.clone(),
                path: child_path,
            }),
        ))
    }

    pub(crate) async fn destroy(&self) {
        self.state.conn.destroy(self.path.as_str()).await;
        if self.path == self.state.launch_path {
            if self.state.destroy_requested.swap(true, Ordering::SeqCst) {
                return;
            }
            if let Some(mut child) = self.state.child.lock().await.take() {
                let _ = child.wait().await;
            }
        }
    }

    /// Resolves `true` when the worker process disconnected without this
    /// endpoint having requested the whole process's destruction.
    pub(crate) async fn wait_for_crash(&self) -> bool {
        self.state.conn.wait_closed().await;
        !self.state.destroy_requested.load(Ordering::SeqCst)
    }
}
