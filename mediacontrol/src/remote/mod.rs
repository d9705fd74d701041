//! Remote casting: cast session state machine driven through a
//! [`CastEngine`](crate::capabilities::CastEngine).

mod coordinator;
mod queue_item;
mod session;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::capabilities::MediaStatus;
use crate::errors::ControlError;
use crate::queue::QueueSnapshot;

pub use coordinator::RemoteSessionCoordinator;
pub use queue_item::{MediaInformation, QueueItem, StreamType};
pub use session::{CastSession, RemoteState};

/// Identifier of one remote queue request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How `load_or_append` applies a descriptor to the remote queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnqueueMode {
    /// Load a single-item queue, keeping the receiver's repeat mode.
    Replace,
    /// Insert at the end of the queue.
    Append,
}

impl EnqueueMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnqueueMode::Replace => "REPLACE",
            EnqueueMode::Append => "APPEND",
        }
    }
}

/// Events published by the remote coordinator.
#[derive(Clone, Debug, PartialEq)]
pub enum RemoteEvent {
    StateChanged {
        from: RemoteState,
        to: RemoteState,
    },
    SessionStarted {
        session_id: String,
    },
    SessionResumed {
        session_id: String,
    },
    ConnectionFailed {
        error: ControlError,
    },
    SessionEnded {
        session_id: Option<String>,
        /// Reason given by the engine when the session ended on its own.
        error: Option<String>,
    },
    MediaSessionStarted {
        media_session_id: i64,
    },
    RequestCompleted {
        request: RequestId,
        mode: EnqueueMode,
        descriptor_id: String,
    },
    RequestFailed {
        request: RequestId,
        mode: EnqueueMode,
        descriptor_id: String,
        error: ControlError,
    },
    QueueChanged(QueueSnapshot),
    StatusUpdated(MediaStatus),
    AdInfo(serde_json::Value),
}
