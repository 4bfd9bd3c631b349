//! The length-prefixed JSON frame format used to talk to a forked or remote
//! worker process.
//!
//! Built on `serde_json` the same way this crate's other cross-process
//! contracts (payload, logger/behavior names) are. Every frame carries a
//! `u64` correlation id so replies can be matched against requests out of
//! order over a single multiplexed connection.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::ActorError;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) enum Frame {
    /// Deliver a message to `path`, within the worker's own actor tree.
    Request {
        id: u64,
        path: String,
        topic: String,
        payload: serde_json::Value,
        expect_reply: bool,
    },
    Response {
        id: u64,
        result: Result<serde_json::Value, String>,
    },
    CreateChild {
        id: u64,
        parent_path: String,
        name: String,
        behavior_name: String,
        placement: serde_json::Value,
    },
    CreateChildReply {
        id: u64,
        result: Result<String, String>,
    },
    Destroy {
        id: u64,
        path: String,
    },
    DestroyAck {
        id: u64,
    },
}

pub(crate) async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    frame: &Frame,
) -> std::io::Result<()> {
    let bytes = serde_json::to_vec(frame).expect("Frame is always representable as JSON");
    writer.write_u32(bytes.len() as u32).await?;
    writer.write_all(&bytes).await?;
    writer.flush().await
}

pub(crate) async fn read_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
) -> std::io::Result<Option<Frame>> {
    let len = match reader.read_u32().await {
        Ok(len) => len,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    let frame = serde_json::from_slice(&buf)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    Ok(Some(frame))
}

pub(crate) fn actor_error_to_string(err: &ActorError) -> String {
    err.to_string()
}

pub(crate) fn string_to_actor_error(s: String) -> ActorError {
    ActorError::DeliveryFailure(s)
}

/// The wire form of a [`crate::placement::Placement`]. A `Router` placement
/// has no wire form: a worker created across a process boundary is never
/// itself a cluster in this crate's scope.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) enum WirePlacement {
    InMemory,
    Forked {
        behavior_name: String,
        program: Option<String>,
    },
    Remote {
        behavior_name: String,
        addr: String,
    },
}

impl WirePlacement {
    pub(crate) fn into_placement(self) -> crate::placement::Placement {
        use crate::placement::Placement;
        match self {
            WirePlacement::InMemory => Placement::InMemory,
            WirePlacement::Forked {
                behavior_name,
                program,
            } => Placement::Forked {
                behavior_name: Box::leak(behavior_name.into_boxed_str()),
                program: program.map(std::path::PathBuf::from),
            },
            WirePlacement::Remote { behavior_name, addr } => Placement::Remote {
                behavior_name: Box::leak(behavior_name.into_boxed_str()),
                addr: addr.parse().expect("peer sent a valid socket address"),
            },
        }
    }

    pub(crate) fn from_placement(
        placement: &crate::placement::Placement,
    ) -> Result<Self, ActorError> {
        use crate::placement::Placement;
        match placement {
            Placement::InMemory => Ok(WirePlacement::InMemory),
            Placement::Forked {
                behavior_name,
                program,
            } => Ok(WirePlacement::Forked {
                behavior_name: behavior_name.to_string(),
                program: program.as_ref().map(|p| p.display().to_string()),
            }),
            Placement::Remote { behavior_name, addr } => Ok(WirePlacement::Remote {
                behavior_name: behavior_name.to_string(),
                addr: addr.to_string(),
            }),
            Placement::Router(_) => Err(ActorError::DeliveryFailure(
                "a router placement cannot be created across a process boundary".into(),
            )),
        }
    }
}
