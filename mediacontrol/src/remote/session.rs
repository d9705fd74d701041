use std::fmt;

use serde::{Deserialize, Serialize};

use crate::capabilities::RepeatMode;
use crate::local::PlaybackState;
use crate::queue::CastQueue;

/// Connection and session state of the remote coordinator.
///
/// A media session is nested inside a connection:
/// `Disconnected → Connecting → Connected → (SessionStarting → SessionActive
/// → SessionEnding) → Connected → Disconnected`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoteState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    SessionStarting,
    SessionActive,
    SessionEnding,
}

impl RemoteState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteState::Disconnected => "DISCONNECTED",
            RemoteState::Connecting => "CONNECTING",
            RemoteState::Connected => "CONNECTED",
            RemoteState::SessionStarting => "SESSION_STARTING",
            RemoteState::SessionActive => "SESSION_ACTIVE",
            RemoteState::SessionEnding => "SESSION_ENDING",
        }
    }

    /// True once the receiver accepted the connection.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            RemoteState::Connected
                | RemoteState::SessionStarting
                | RemoteState::SessionActive
                | RemoteState::SessionEnding
        )
    }

    /// True in the states where queue requests are accepted.
    pub fn accepts_requests(&self) -> bool {
        matches!(
            self,
            RemoteState::Connected | RemoteState::SessionStarting | RemoteState::SessionActive
        )
    }
}

impl fmt::Display for RemoteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mirror of the connected cast session.
#[derive(Clone, Debug, Default)]
pub struct CastSession {
    pub session_id: Option<String>,
    pub connected: bool,
    pub queue: CastQueue,
    pub remote_state: RemoteState,
    /// Receiver player state, as last reported.
    pub player_state: PlaybackState,
    /// Receiver repeat mode, as last reported.
    pub repeat_mode: RepeatMode,
    pub media_session_id: Option<i64>,
}

impl CastSession {
    pub fn active_index(&self) -> Option<usize> {
        self.queue.current_index()
    }

    /// Forgets everything learned from the receiver. `remote_state` is left
    /// to the caller.
    pub(crate) fn reset(&mut self) {
        self.session_id = None;
        self.connected = false;
        self.queue.clear();
        self.player_state = PlaybackState::Idle;
        self.repeat_mode = RepeatMode::Off;
        self.media_session_id = None;
    }
}
