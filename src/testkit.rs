//! Channel-backed test probes.
//!
//! Generalizes `riker-testkit`'s `Probe`/`ProbeReceive` split (an
//! `std::sync::mpsc` pair driven from a spawned thread) to the
//! `tokio::sync::mpsc` equivalent: this crate's tests are async and drive
//! actors through `.await`, so a probe's receive side needs an async `recv`
//! rather than a blocking one. The `Probe`/`ProbeReceive` trait shapes and
//! the elapsed-time bookkeeping are otherwise unchanged.

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

pub trait Probe {
    type Msg: Send;

    fn event(&self, evt: Self::Msg);
}

#[async_trait::async_trait]
pub trait ProbeReceive {
    type Msg: Send;

    async fn recv(&mut self) -> Self::Msg;
    fn reset_timer(&mut self);
    fn last_event_milliseconds(&self) -> i64;
}

/// A clonable probe handle, given to a behavior under test so it can report
/// events as it processes messages; `ChannelProbeReceive` is the matching
/// receive side kept by the test itself.
#[derive(Clone)]
pub struct ChannelProbe<T> {
    tx: UnboundedSender<T>,
}

impl<T: Send> Probe for ChannelProbe<T> {
    type Msg = T;

    fn event(&self, evt: T) {
        let _ = self.tx.send(evt);
    }
}

pub struct ChannelProbeReceive<T> {
    rx: UnboundedReceiver<T>,
    timer_start: chrono::DateTime<chrono::Utc>,
}

#[async_trait::async_trait]
impl<T: Send> ProbeReceive for ChannelProbeReceive<T> {
    type Msg = T;

    async fn recv(&mut self) -> T {
        self.rx
            .recv()
            .await
            .expect("probe channel closed before an expected event arrived")
    }

    fn reset_timer(&mut self) {
        self.timer_start = chrono::Utc::now();
    }

    fn last_event_milliseconds(&self) -> i64 {
        (chrono::Utc::now() - self.timer_start).num_milliseconds()
    }
}

/// Build a fresh probe/receiver pair.
pub fn probe<T: Send>() -> (ChannelProbe<T>, ChannelProbeReceive<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ChannelProbe { tx },
        ChannelProbeReceive {
            rx,
            timer_start: chrono::Utc::now(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn probe_delivers_events_in_order() {
        let (probe, mut listen) = probe::<&'static str>();
        probe.event("first");
        probe.event("second");
        assert_eq!(listen.recv().await, "first");
        assert_eq!(listen.recv().await, "second");
    }

    #[tokio::test]
    async fn probe_clones_share_one_channel() {
        let (probe, mut listen) = probe::<u32>();
        let other = probe.clone();
        other.event(7);
        probe.event(8);
        assert_eq!(listen.recv().await, 7);
        assert_eq!(listen.recv().await, 8);
    }
}
