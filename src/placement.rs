//! Where an actor runs, decided once at `createChild` and fixed for its
//! lifetime. A living actor never moves between placements, so this type
//! has no mutation path, only construction.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use crate::router::Balancer;

/// What a router does when one of its replicas dies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrashPolicy {
    /// Start a same-behavior replacement once the crash is detected.
    Respawn,
    /// Leave the replica set shrunk.
    #[default]
    None,
}

/// How many replicas a router endpoint should start with, and where each
/// one is placed.
#[derive(Clone)]
pub struct RouterSpec {
    pub replica_count: usize,
    pub replica_placement: Box<Placement>,
    pub balancer: Arc<dyn Balancer>,
    pub on_crash: CrashPolicy,
}

/// The placement chosen for a newly created actor.
#[derive(Clone)]
pub enum Placement {
    /// Runs as a tokio task in this process's runtime - the common case,
    /// and the only one with no serialization cost.
    InMemory,

    /// Runs in a child OS process on this host, started by re-executing the
    /// current binary with `worker::run_if_worker` as its entry point.
    /// `program` overrides `std::env::current_exe()` when set, for tests
    /// that want a fixed helper binary instead of re-execing the test
    /// harness itself.
    Forked {
        behavior_name: &'static str,
        program: Option<PathBuf>,
    },

    /// Runs in an already-listening `actorhost` process reachable at
    /// `addr`, over the framed-TCP transport `endpoint` implements.
    Remote {
        behavior_name: &'static str,
        addr: SocketAddr,
    },

    /// Fronts `replica_count` replicas of `replica_placement` behind
    /// `balancer`, with crash detection and respawn.
    Router(RouterSpec),
}

impl Placement {
    pub fn mode_name(&self) -> &'static str {
        match self {
            Placement::InMemory => "in-memory",
            Placement::Forked { .. } => "forked",
            Placement::Remote { .. } => "remote",
            Placement::Router(_) => "router",
        }
    }
}
