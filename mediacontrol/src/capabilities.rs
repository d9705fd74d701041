//! Capability traits implemented by external engines.
//!
//! The coordinators never talk to a concrete player or cast SDK. They drive
//! a [`PlayerEngine`] or a [`CastEngine`] and receive callbacks through small
//! single-method listener traits, one per event category:
//!
//! | listener               | category                                   |
//! |------------------------|--------------------------------------------|
//! | [`PrepareListener`]    | prepare result (`canPlay` / prepare error) |
//! | [`PlayerEventListener`]| player events keyed by name                |
//! | [`SessionListener`]    | cast session lifecycle                     |
//! | [`RequestListener`]    | completion of a remote queue request       |
//! | [`MediaStatusListener`]| remote media status updates                |
//! | [`AdInfoListener`]     | ad metadata parsed by the cast engine      |
//!
//! Engines may invoke listeners from any thread. The implementations handed
//! out by the coordinators only post a message into the coordinator inbox.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::descriptor::MediaDescriptor;
use crate::errors::PrepareFailure;
use crate::local::PlaybackState;
use crate::remote::{QueueItem, RequestId};

// ============================================================================
// Local player engine
// ============================================================================

/// Identifies one `load` request of the local coordinator.
///
/// Engines echo the ticket they received in [`PrepareRequest`] with every
/// callback concerning that item, which lets the coordinator drop callbacks
/// that belong to a superseded load.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LoadTicket {
    pub generation: u64,
    pub descriptor_id: String,
}

impl fmt::Display for LoadTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "load#{}({})", self.generation, self.descriptor_id)
    }
}

/// Everything an engine needs to start buffering an item.
#[derive(Clone)]
pub struct PrepareRequest {
    pub ticket: LoadTicket,
    pub descriptor: MediaDescriptor,
    pub listener: Arc<dyn PrepareListener>,
}

impl fmt::Debug for PrepareRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrepareRequest")
            .field("ticket", &self.ticket)
            .field("descriptor", &self.descriptor.id())
            .finish()
    }
}

/// Information the engine learned while preparing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PreparedMedia {
    /// Duration found in the stream, if any.
    pub duration_seconds: Option<f64>,
}

/// Player events a coordinator can subscribe to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlayerEventKind {
    Ended,
    Error,
}

impl PlayerEventKind {
    /// Event name as exposed by player SDKs.
    pub fn name(&self) -> &'static str {
        match self {
            PlayerEventKind::Ended => "ended",
            PlayerEventKind::Error => "error",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PlayerEvent {
    /// Playback reached the end of the item.
    Ended { ticket: LoadTicket },
    /// The engine failed while the item was already prepared.
    Error { ticket: LoadTicket, message: String },
}

impl PlayerEvent {
    pub fn kind(&self) -> PlayerEventKind {
        match self {
            PlayerEvent::Ended { .. } => PlayerEventKind::Ended,
            PlayerEvent::Error { .. } => PlayerEventKind::Error,
        }
    }

    pub fn ticket(&self) -> &LoadTicket {
        match self {
            PlayerEvent::Ended { ticket } | PlayerEvent::Error { ticket, .. } => ticket,
        }
    }
}

pub trait PrepareListener: Send + Sync {
    fn on_prepare_result(&self, ticket: LoadTicket, result: Result<PreparedMedia, PrepareFailure>);
}

pub trait PlayerEventListener: Send + Sync {
    fn on_player_event(&self, event: PlayerEvent);
}

/// Local media player.
///
/// `prepare` is asynchronous: returning `Ok` only means the request was
/// accepted, the outcome is reported to the request's [`PrepareListener`].
pub trait PlayerEngine {
    /// Registers `listener` for the given event kinds.
    fn subscribe(
        &mut self,
        events: &[PlayerEventKind],
        listener: Arc<dyn PlayerEventListener>,
    ) -> Result<()>;

    fn prepare(&mut self, request: PrepareRequest) -> Result<()>;

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    /// Stops playback and releases the current item (decoders, buffers).
    fn stop(&mut self) -> Result<()>;

    /// Current playhead in seconds.
    fn current_time(&self) -> f64;

    fn set_current_time(&mut self, seconds: f64) -> Result<()>;

    /// Duration of the current item, if known.
    fn duration(&self) -> Option<f64>;

    /// Releases every resource held by the engine.
    fn destroy(&mut self);
}

// ============================================================================
// Cast engine
// ============================================================================

/// Queue repeat mode of a cast receiver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RepeatMode {
    #[default]
    Off,
    All,
    Single,
    AllAndShuffle,
}

impl RepeatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatMode::Off => "REPEAT_OFF",
            RepeatMode::All => "REPEAT_ALL",
            RepeatMode::Single => "REPEAT_SINGLE",
            RepeatMode::AllAndShuffle => "REPEAT_ALL_AND_SHUFFLE",
        }
    }
}

/// Remote media status as reported by the cast engine.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaStatus {
    pub media_session_id: Option<i64>,
    pub player_state: PlaybackState,
    pub repeat_mode: RepeatMode,
    /// Playhead of the active item in seconds.
    pub current_time: f64,
    /// Index of the active item in the remote queue.
    pub active_index: Option<usize>,
}

/// Where an inserted item lands in the remote queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertPosition {
    /// After the last item.
    End,
    /// Before the item with the given remote item id.
    Before(u32),
}

#[derive(Clone, Debug, PartialEq)]
pub struct QueueLoadRequest {
    pub items: Vec<QueueItem>,
    pub start_index: usize,
    pub play_position: f64,
    pub repeat_mode: RepeatMode,
    pub custom_data: Option<serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct QueueInsertRequest {
    pub items: Vec<QueueItem>,
    pub position: InsertPosition,
    pub custom_data: Option<serde_json::Value>,
}

/// Session lifecycle notifications.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    Started { session_id: String },
    Resumed { session_id: String },
    StartFailed { reason: String },
    Ended {
        session_id: String,
        error: Option<String>,
    },
    MediaSessionStarted {
        session_id: String,
        media_session_id: i64,
    },
}

pub trait SessionListener: Send + Sync {
    fn on_session_event(&self, event: SessionEvent);
}

pub trait RequestListener: Send + Sync {
    /// `Ok` for a completed request, `Err` with the engine's reason otherwise.
    fn on_request_result(&self, request: RequestId, result: Result<(), String>);
}

pub trait MediaStatusListener: Send + Sync {
    fn on_media_status(&self, status: MediaStatus);
}

pub trait AdInfoListener: Send + Sync {
    /// Ad break information, already parsed by the engine.
    fn on_ad_info(&self, info: serde_json::Value);
}

/// Remote cast session manager.
///
/// `start_session`, `queue_load` and `queue_insert` are asynchronous; their
/// outcome goes to the session listener or to the request listener.
pub trait CastEngine {
    /// Sets the receiver application the next session will launch.
    fn set_options(&mut self, application_id: &str) -> Result<()>;

    fn add_session_listener(&mut self, listener: Arc<dyn SessionListener>);

    fn remove_session_listener(&mut self);

    fn start_session(&mut self) -> Result<()>;

    fn end_session(&mut self) -> Result<()>;

    fn has_current_session(&self) -> bool;

    /// Last known media status, `None` when no media session exists.
    fn media_status(&self) -> Option<MediaStatus>;

    fn queue_load(
        &mut self,
        request_id: RequestId,
        request: QueueLoadRequest,
        listener: Arc<dyn RequestListener>,
    ) -> Result<()>;

    fn queue_insert(
        &mut self,
        request_id: RequestId,
        request: QueueInsertRequest,
        listener: Arc<dyn RequestListener>,
    ) -> Result<()>;

    fn add_media_listeners(
        &mut self,
        status: Arc<dyn MediaStatusListener>,
        ads: Arc<dyn AdInfoListener>,
    );

    fn remove_media_listeners(&mut self);
}
