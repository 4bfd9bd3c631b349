//! A duplex, multiplexed connection shared by the forked and remote
//! endpoints.
//!
//! One `Conn` wraps a byte-stream pair (a forked child's stdio, or a
//! `TcpStream` split in two) and is symmetric: it both sends outgoing
//! requests - tracking a pending-reply map keyed by a `u64` correlation id -
//! and serves incoming request frames against a local `path -> ActorRef`
//! table. Symmetry matters because a forked child's `ctx.parent()` ref
//! calls back over the same connection the parent used to reach the child;
//! both directions need to originate requests and both need to serve them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, Mutex, Notify};

use crate::actor_ref::ActorRef;
use crate::behavior::{factory, BehaviorRegistry};
use crate::error::{ActorError, CreateError};
use crate::payload::Payload;
use crate::system::SystemHandle;

use super::wire::{self, Frame};

pub(crate) type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;
pub(crate) type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

enum Pending {
    Reply(oneshot::Sender<Result<Payload, ActorError>>),
    CreateChild(oneshot::Sender<Result<String, CreateError>>),
    Destroy(oneshot::Sender<()>),
}

pub(crate) struct Conn {
    next_id: AtomicU64,
    outbox: mpsc::UnboundedSender<Frame>,
    pending: Mutex<HashMap<u64, Pending>>,
    closed: Notify,
    disconnected: AtomicBool,
}

impl Conn {
    /// Start the reader/writer tasks and return the shared handle. `table`
    /// is consulted for every incoming `Request`/`CreateChild`/`Destroy`
    /// frame; `system` is used to actually construct children named by an
    /// incoming `CreateChild` frame.
    pub(crate) fn spawn(
        reader: BoxedReader,
        writer: BoxedWriter,
        table: Arc<DashMap<String, ActorRef>>,
        system: SystemHandle,
    ) -> Arc<Conn> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Arc::new(Conn {
            next_id: AtomicU64::new(1),
            outbox: tx,
            pending: Mutex::new(HashMap::new()),
            closed: Notify::new(),
            disconnected: AtomicBool::new(false),
        });
        tokio::spawn(write_loop(writer, rx));
        tokio::spawn(read_loop(conn.clone(), reader, table, system));
        conn
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) async fn request(
        &self,
        path: &str,
        topic: String,
        payload: Payload,
        expect_reply: bool,
    ) -> Result<Payload, ActorError> {
        let id = self.next_id();
        let rx = if expect_reply {
            let (tx, rx) = oneshot::channel();
            self.pending.lock().await.insert(id, Pending::Reply(tx));
            Some(rx)
        } else {
            None
        };
        let frame = Frame::Request {
            id,
            path: path.to_string(),
            topic,
            payload: payload.to_json(),
            expect_reply,
        };
        self.outbox
            .send(frame)
            .map_err(|_| ActorError::DeliveryFailure("connection closed".into()))?;
        match rx {
            Some(rx) => rx
                .await
                .map_err(|_| ActorError::DeliveryFailure("connection closed before reply".into()))?,
            None => Ok(Payload::new(())),
        }
    }

    pub(crate) async fn create_child(
        &self,
        parent_path: &str,
        name: &str,
        behavior_name: &str,
        placement: serde_json::Value,
    ) -> Result<String, CreateError> {
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, Pending::CreateChild(tx));
        let frame = Frame::CreateChild {
            id,
            parent_path: parent_path.to_string(),
            name: name.to_string(),
            behavior_name: behavior_name.to_string(),
            placement,
        };
        self.outbox.send(frame).map_err(|_| {
            CreateError::PlacementFailed {
                mode: "forked",
                source: Box::new(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "connection closed")),
            }
        })?;
        rx.await.map_err(|_| CreateError::PlacementFailed {
            mode: "forked",
            source: Box::new(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "connection closed before reply",
            )),
        })?
    }

    pub(crate) async fn destroy(&self, path: &str) {
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, Pending::Destroy(tx));
        if self
            .outbox
            .send(Frame::Destroy {
                id,
                path: path.to_string(),
            })
            .is_err()
        {
            return;
        }
        let _ = rx.await;
    }

    /// Resolves once the peer disconnects (EOF or I/O error on read).
    pub(crate) async fn wait_closed(&self) {
        if self.disconnected.load(Ordering::Acquire) {
            return;
        }
        self.closed.notified().await;
    }
}

async fn write_loop(mut writer: BoxedWriter, mut rx: mpsc::UnboundedReceiver<Frame>) {
    while let Some(frame) = rx.recv().await {
        if wire::write_frame(&mut writer, &frame).await.is_err() {
            break;
        }
    }
}

async fn read_loop(
    conn: Arc<Conn>,
    mut reader: BoxedReader,
    table: Arc<DashMap<String, ActorRef>>,
    system: SystemHandle,
) {
    loop {
        let frame = match wire::read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) | Err(_) => break,
        };
        match frame {
            Frame::Response { id, result } => {
                if let Some(Pending::Reply(tx)) = conn.pending.lock().await.remove(&id) {
                    let outcome = result
                        .map(Payload::from_json)
                        .map_err(wire::string_to_actor_error);
                    let _ = tx.send(outcome);
                }
            }
            Frame::CreateChildReply { id, result } => {
                if let Some(Pending::CreateChild(tx)) = conn.pending.lock().await.remove(&id) {
                    let outcome = result.map_err(|e| CreateError::PlacementFailed {
                        mode: "forked",
                        source: Box::new(std::io::Error::new(std::io::ErrorKind::Other, e)),
                    });
                    let _ = tx.send(outcome);
                }
            }
            Frame::DestroyAck { id } => {
                if let Some(Pending::Destroy(tx)) = conn.pending.lock().await.remove(&id) {
                    let _ = tx.send(());
                }
            }
            Frame::Request {
                id,
                path,
                topic,
                payload,
                expect_reply,
            } => {
                let outbox = conn.outbox.clone();
                let table = table.clone();
                tokio::spawn(async move {
                    let target = table.get(&path).map(|r| r.clone());
                    let result = match target {
                        Some(actor) if expect_reply => actor
                            .send_and_receive(topic, Payload::from_json(payload))
                            .await
                            .map(|p| p.to_json())
                            .map_err(|e| wire::actor_error_to_string(&e)),
                        Some(actor) => {
                            let _ = actor.send(topic, Payload::from_json(payload)).await;
                            return;
                        }
                        None => Err(format!("unknown actor path `{path}`")),
                    };
                    if expect_reply {
                        let _ = outbox.send(Frame::Response { id, result });
                    }
                });
            }
            Frame::CreateChild {
                id,
                parent_path,
                name,
                behavior_name,
                placement,
            } => {
                let outbox = conn.outbox.clone();
                let table = table.clone();
                let system = system.clone();
                tokio::spawn(async move {
                    let result = serve_create_child(
                        &table,
                        &system,
                        &parent_path,
                        &name,
                        &behavior_name,
                        placement,
                    )
                    .await;
                    let _ = outbox.send(Frame::CreateChildReply { id, result });
                });
            }
            Frame::Destroy { id, path } => {
                let outbox = conn.outbox.clone();
                let table = table.clone();
                tokio::spawn(async move {
                    if let Some((_, actor)) = table.remove(&path) {
                        actor.destroy().await;
                    }
                    let _ = outbox.send(Frame::DestroyAck { id });
                });
            }
        }
    }
    conn.disconnected.store(true, Ordering::Release);
    conn.closed.notify_waiters();
}

async fn serve_create_child(
    table: &Arc<DashMap<String, ActorRef>>,
    system: &SystemHandle,
    parent_path: &str,
    name: &str,
    behavior_name: &str,
    placement: serde_json::Value,
) -> Result<String, String> {
    let parent = table
        .get(parent_path)
        .map(|r| r.clone())
        .ok_or_else(|| format!("unknown parent path `{parent_path}`"))?;
    let wire_placement: super::wire::WirePlacement =
        serde_json::from_value(placement).map_err(|e| e.to_string())?;
    let placement = wire_placement.into_placement();

    let deps = system.resources().clone();
    let owned_name = behavior_name.to_string();
    let fac = factory(move || BehaviorRegistry::construct(&owned_name, &deps));

    let parent_actor_path = crate::id::ActorPath::from_str(parent_path);
    let child = system
        .create_child(&parent_actor_path, Some(parent), name, fac, placement)
        .await
        .map_err(|e| e.to_string())?;
    Ok(child.path().as_str().to_string())
}
