//! Media session coordination.
//!
//! Two coordinators sit between an application and its playback engines:
//!
//! - [`LocalPlaybackCoordinator`] drives an on-device [`PlayerEngine`]
//!   through `IDLE → PREPARING → READY → PLAYING ⇄ PAUSED`.
//! - [`RemoteSessionCoordinator`] drives a [`CastEngine`]: it connects to a
//!   receiver, loads or appends media and mirrors the remote queue.
//!
//! Both publish their events, in order, to a single observer through an
//! [`EventRelay`].

mod inbox;

pub mod capabilities;
pub mod config_ext;
pub mod descriptor;
pub mod errors;
pub mod events;
pub mod local;
pub mod queue;
pub mod remote;
pub mod sim;
pub mod time_utils;

#[cfg(feature = "chromecast")]
pub mod chromecast_engine;

pub use capabilities::{
    CastEngine, LoadTicket, MediaStatus, PlayerEngine, PlayerEvent, PlayerEventKind,
    PrepareRequest, PreparedMedia, RepeatMode,
};
pub use config_ext::{ChromecastOptions, ControlConfigExt};
pub use descriptor::{MediaDescriptor, MediaDescriptorBuilder, MediaFormat, MediaMetadata};
pub use errors::{ControlError, PrepareFailure};
pub use events::{EventObserver, EventRelay};
pub use local::{LocalPlaybackCoordinator, LocalPlaybackOptions, PlaybackEvent, PlaybackState};
pub use queue::{CastQueue, QueueSnapshot};
pub use remote::{EnqueueMode, RemoteEvent, RemoteSessionCoordinator, RemoteState, RequestId};
pub use sim::{SimulatedCastEngine, SimulatedPlayerEngine, SimulationOptions};

#[cfg(feature = "chromecast")]
pub use chromecast_engine::ChromecastEngine;
