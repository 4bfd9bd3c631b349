//! The remote-process endpoint: an actor hosted by a peer `ActorSystem`
//! that has called `listen()`, reached over a framed `TcpStream`.
//!
//! Dialing a remote actor and hosting one for a peer to dial share the same
//! `Conn`/wire machinery a forked worker uses; `listen()`'s accept loop just
//! hands each inbound stream the listening system's own `(table, system)`
//! pair instead of spawning a fresh process for it.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};

use crate::actor_ref::{ActorRef, Endpoint};
use crate::behavior::BehaviorFactory;
use crate::error::{ActorError, CreateError};
use crate::id::{ActorId, ActorPath};
use crate::logging::LogHandle;
use crate::payload::Payload;
use crate::placement::Placement;
use crate::system::SystemHandle;

use super::conn::Conn;
use super::wire::WirePlacement;

struct RemoteState {
    conn: Arc<Conn>,
    system: SystemHandle,
}

/// The dialing-side handle to an actor hosted by a peer system.
#[derive(Clone)]
pub struct RemoteEndpoint {
    state: Arc<RemoteState>,
    /// The path this actor is addressed by on the *peer's* side - unrelated
    /// to the `ActorPath` the local `ActorRef` carries, which lives in this
    /// process's own tree.
    remote_path: String,
}

/// Dial `addr` and ask the listening system to host a new actor there,
/// named `behavior_name` (resolved through that peer's own
/// `BehaviorRegistry`).
pub(crate) async fn spawn(
    id: ActorId,
    path: ActorPath,
    behavior_name: &'static str,
    addr: SocketAddr,
    log: LogHandle,
    parent: Option<ActorRef>,
    system: SystemHandle,
) -> Result<ActorRef, CreateError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| CreateError::PlacementFailed {
            mode: "remote",
            source: Box::new(e),
        })?;
    let (r, w) = stream.into_split();
    let conn = Conn::spawn(Box::new(r), Box::new(w), system.table(), system.clone());

    let wire_placement = WirePlacement::InMemory;
    let wire_value = serde_json::to_value(&wire_placement).expect("WirePlacement is always JSON");
    let requested_name = path.as_str().rsplit('/').next().unwrap_or("actor").to_string();
    let remote_path = conn
        .create_child("/", &requested_name, behavior_name, wire_value)
        .await?;

    let state = Arc::new(RemoteState {
        conn,
        system: system.clone(),
    });

    Ok(ActorRef::new(
        id,
        path,
        log,
        parent,
        Endpoint::Remote(RemoteEndpoint { state, remote_path }),
    ))
}

/// Accept loop run by `ActorSystem::listen`: every inbound connection is
/// handed this system's own `(table, system)` pair, so a dialing peer's
/// `CreateChild`/`Request`/`Destroy` frames are served exactly the way a
/// forked worker would serve them for its own process.
pub(crate) async fn accept_loop(listener: TcpListener, system: SystemHandle, _root: ActorRef) {
    loop {
        let (stream, _peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(_) => break,
        };
        let (r, w) = stream.into_split();
        let _conn = Conn::spawn(Box::new(r), Box::new(w), system.table(), system.clone());
    }
}

impl RemoteEndpoint {
    pub(crate) async fn send(&self, topic: String, payload: Payload) -> Result<(), ActorError> {
        self.state
            .conn
            .request(&self.remote_path, topic, payload, false)
            .await?;
        Ok(())
    }

    pub(crate) async fn send_and_receive(
        &self,
        topic: String,
        payload: Payload,
    ) -> Result<Payload, ActorError> {
        self.state
            .conn
            .request(&self.remote_path, topic, payload, true)
            .await
    }

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
                mode: "remote",
                source: Box::new(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())),
            }
        })?;
        let wire_value = serde_json::to_value(&wire_placement).expect("WirePlacement is always JSON");
        let child_remote_path = self
            .state
            .conn
            .create_child(&self.remote_path, name, behavior_name, wire_value)
            .await?;
        let local_path = ActorPath::from_str(&child_remote_path);
        let log = self.state.system.log_for(&local_path);
        Ok(ActorRef::new(
            ActorId::new(),
            local_path,
            log,
            None,
            Endpoint::Remote(RemoteEndpoint {
                state: self.state.clone(),
                remote_path: child_remote_path,
            }),
        ))
    }

    pub(crate) async fn destroy(&self) {
        self.state.conn.destroy(&self.remote_path).await;
    }

    /// Resolves `true` when the peer connection drops - the only crash
    /// signal a remote endpoint has (no OS process to reap here).
    pub(crate) async fn wait_for_crash(&self) -> bool {
        self.state.conn.wait_closed().await;
        true
    }
}
