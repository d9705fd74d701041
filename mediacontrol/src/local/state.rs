use std::fmt;

use serde::{Deserialize, Serialize};

use crate::capabilities::LoadTicket;
use crate::descriptor::MediaDescriptor;
use crate::errors::ControlError;

/// Player state.
///
/// Shared by the local coordinator and by the remote status mirror.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaybackState {
    /// No item loaded
    #[default]
    Idle,
    /// Item is buffering
    Preparing,
    /// Item is prepared and can be played
    Ready,
    Playing,
    Paused,
    /// Current item is being released
    Stopping,
    /// Last prepare attempt failed; `load` again to recover
    Failed,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "IDLE",
            PlaybackState::Preparing => "PREPARING",
            PlaybackState::Ready => "READY",
            PlaybackState::Playing => "PLAYING",
            PlaybackState::Paused => "PAUSED",
            PlaybackState::Stopping => "STOPPING",
            PlaybackState::Failed => "FAILED",
        }
    }

    /// True when an item is prepared and the engine position is meaningful.
    pub fn has_prepared_item(&self) -> bool {
        matches!(
            self,
            PlaybackState::Ready | PlaybackState::Playing | PlaybackState::Paused
        )
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current state of the local player.
#[derive(Clone, Debug, Default)]
pub struct PlaybackSession {
    pub current_descriptor: Option<MediaDescriptor>,
    pub state: PlaybackState,
    /// Last known playhead in seconds.
    pub position_seconds: f64,
    /// Duration from the descriptor or resolved at prepare time.
    pub duration_seconds: Option<f64>,
}

impl PlaybackSession {
    pub fn current_id(&self) -> Option<&str> {
        self.current_descriptor.as_ref().map(|d| d.id())
    }

    /// Clamps `seconds` to `[0, duration]`, or to `[0, ∞)` if the duration
    /// is unknown.
    pub fn clamp_position(&self, seconds: f64) -> f64 {
        let seconds = if seconds.is_nan() { 0.0 } else { seconds.max(0.0) };
        match self.duration_seconds {
            Some(duration) => seconds.min(duration),
            None => seconds,
        }
    }
}

/// Events published by the local coordinator.
#[derive(Clone, Debug, PartialEq)]
pub enum PlaybackEvent {
    StateChanged {
        from: PlaybackState,
        to: PlaybackState,
    },
    LoadStarted {
        ticket: LoadTicket,
        /// Descriptor that was replaced by this load, if any.
        replaced: Option<String>,
    },
    Ready {
        ticket: LoadTicket,
        duration_seconds: Option<f64>,
    },
    PrepareFailed {
        ticket: LoadTicket,
        error: ControlError,
    },
    PositionTick {
        descriptor_id: String,
        position_seconds: f64,
        duration_seconds: Option<f64>,
    },
    Seeked {
        descriptor_id: String,
        position_seconds: f64,
    },
    PlaybackEnded {
        descriptor_id: String,
    },
    PlaybackError {
        descriptor_id: String,
        error: ControlError,
    },
    TornDown {
        descriptor_id: Option<String>,
    },
}

impl PlaybackEvent {
    /// Id of the descriptor this event refers to, if any.
    pub fn descriptor_id(&self) -> Option<&str> {
        match self {
            PlaybackEvent::StateChanged { .. } => None,
            PlaybackEvent::LoadStarted { ticket, .. }
            | PlaybackEvent::Ready { ticket, .. }
            | PlaybackEvent::PrepareFailed { ticket, .. } => Some(&ticket.descriptor_id),
            PlaybackEvent::PositionTick { descriptor_id, .. }
            | PlaybackEvent::Seeked { descriptor_id, .. }
            | PlaybackEvent::PlaybackEnded { descriptor_id }
            | PlaybackEvent::PlaybackError { descriptor_id, .. } => Some(descriptor_id),
            PlaybackEvent::TornDown { descriptor_id } => descriptor_id.as_deref(),
        }
    }
}
