//! Local playback: player state machine driven through a [`PlayerEngine`].
//!
//! [`PlayerEngine`]: crate::capabilities::PlayerEngine

mod coordinator;
mod state;
mod ticker;

pub use coordinator::{DEFAULT_POSITION_TICK_INTERVAL, LocalPlaybackCoordinator, LocalPlaybackOptions};
pub use state::{PlaybackEvent, PlaybackSession, PlaybackState};
