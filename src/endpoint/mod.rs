//! Cross-process placement.
//!
//! `process.rs` (forked child OS process) and `remote.rs` (remote TCP peer)
//! share one wire format (`wire.rs`) and one duplex connection abstraction
//! (`conn.rs`) so the dispatch and outstanding-reply bookkeeping is written
//! once; only how each endpoint obtains its `AsyncRead`/`AsyncWrite` halves
//! differs. All of this requires `serde` to serialize a `Payload` across the
//! boundary, so the whole module is feature-gated.

#[cfg(feature = "serde")]
pub(crate) mod conn;
#[cfg(feature = "serde")]
pub mod process;
#[cfg(feature = "serde")]
pub mod remote;
#[cfg(feature = "serde")]
pub(crate) mod wire;
