//! The serial FIFO mailbox every in-memory actor's cell task drains.
//!
//! A bounded channel carrying a topic + `Payload` pair, plus a `Destroy`
//! variant so lifecycle control flows through the same ordered channel as
//! ordinary messages - a destroy request can never jump ahead of, or be
//! reordered with respect to, messages sent before it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;

use crate::actor_ref::ActorRef;
use crate::behavior::BehaviorFactory;
use crate::error::{ActorError, CreateError};
use crate::id::ActorId;
use crate::payload::Payload;
use crate::placement::Placement;

/// One delivery accepted into a mailbox.
pub struct Delivery {
    pub topic: String,
    pub payload: Payload,
    pub reply: Option<oneshot::Sender<Result<Payload, ActorError>>>,
}

pub(crate) enum CellMessage {
    Deliver(Delivery),
    Destroy,
    CreateChild {
        name: String,
        factory: BehaviorFactory,
        placement: Placement,
        reply: oneshot::Sender<Result<ActorRef, CreateError>>,
    },
}

/// The capacity of every actor's mailbox channel. Unbounded mailboxes are
/// explicitly out of scope; a bounded channel gives `send` natural
/// backpressure instead of unbounded memory growth under a slow handler.
pub const MAILBOX_CAPACITY: usize = 256;

/// The sending half of a cell's mailbox, plus the bookkeeping needed to
/// answer `destroy` idempotently and to reject sends after destruction.
#[derive(Clone)]
pub struct MailboxHandle {
    id: ActorId,
    sender: mpsc::Sender<CellMessage>,
    destroyed: Arc<AtomicBool>,
    destroy_requested: Arc<AtomicBool>,
    finished: Arc<Notify>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl MailboxHandle {
    pub(crate) fn new(id: ActorId) -> (Self, mpsc::Receiver<CellMessage>) {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        (
            MailboxHandle {
                id,
                sender: tx,
                destroyed: Arc::new(AtomicBool::new(false)),
                destroy_requested: Arc::new(AtomicBool::new(false)),
                finished: Arc::new(Notify::new()),
                task: Arc::new(Mutex::new(None)),
            },
            rx,
        )
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Record the cell task's `JoinHandle` so a router can later tell a
    /// deliberate destroy apart from a panic (`wait_for_crash`).
    pub(crate) fn attach_task(&self, handle: JoinHandle<()>) {
        *self.task.lock().unwrap() = Some(handle);
    }

    pub(crate) fn mark_finished(&self) {
        self.destroyed.store(true, Ordering::Release);
        self.finished.notify_waiters();
    }

    /// Resolves when the cell task ends for any reason, returning `true` if
    /// that end was not the result of a `destroy()` call observed by this
    /// handle - i.e. the task panicked, or its channel was dropped out from
    /// under it. Consumes the stored `JoinHandle`; only one caller (a
    /// router's watchdog) should ever call this for a given replica.
    pub(crate) async fn wait_for_crash(&self) -> bool {
        let handle = self.task.lock().unwrap().take();
        match handle {
            Some(handle) => match handle.await {
                Ok(()) => !self.destroy_requested.load(Ordering::Acquire),
                Err(_) => true,
            },
            None => std::future::pending::<bool>().await,
        }
    }

    /// Fails with `StaleReference` when the target was already `Destroyed`
    /// at the time of the call (spec §3/§7); a send that loses a race with
    /// destruction *after* being accepted here instead surfaces as
    /// `DeliveryFailure`, since the delivery did make it into the mailbox.
    pub async fn deliver(&self, delivery: Delivery) -> Result<(), ActorError> {
        if self.is_destroyed() {
            return Err(ActorError::StaleReference(self.id));
        }
        self.sender
            .send(CellMessage::Deliver(delivery))
            .await
            .map_err(|_| ActorError::DeliveryFailure("mailbox is closed".into()))
    }

    /// Request destruction and wait for the cell (and, transitively, all of
    /// its children) to finish tearing down. Safe to call more than once or
    /// concurrently; every caller observes the same completion.
    pub async fn destroy_and_wait(&self) {
        let notified = self.finished.notified();
        if self.is_destroyed() {
            return;
        }
        self.destroy_requested.store(true, Ordering::Release);
        let _ = self.sender.send(CellMessage::Destroy).await;
        notified.await;
    }

    /// Ask the owning cell task to create a child on our behalf, so the
    /// creation is serialized with respect to the cell's own message
    /// handling instead of racing it from an outside caller.
    pub async fn create_child(
        &self,
        name: String,
        factory: BehaviorFactory,
        placement: Placement,
    ) -> Result<ActorRef, CreateError> {
        if self.is_destroyed() {
            return Err(CreateError::InjectionFailure(
                "parent actor is already destroyed".into(),
            ));
        }
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(CellMessage::CreateChild {
                name,
                factory,
                placement,
                reply: tx,
            })
            .await
            .map_err(|_| CreateError::InjectionFailure("parent actor is already destroyed".into()))?;
        rx.await
            .map_err(|_| CreateError::InjectionFailure("parent actor was destroyed mid-request".into()))?
    }
}
