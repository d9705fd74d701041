use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use tracing::{debug, info, warn};

use crate::capabilities::{
    LoadTicket, PlayerEngine, PlayerEvent, PlayerEventKind, PlayerEventListener, PrepareListener,
    PrepareRequest, PreparedMedia,
};
use crate::descriptor::MediaDescriptor;
use crate::errors::{ControlError, PrepareFailure};
use crate::events::{EventObserver, EventRelay};
use crate::inbox::{Inbox, InboxHandle};
use crate::local::state::{PlaybackEvent, PlaybackSession, PlaybackState};
use crate::local::ticker::PositionTicker;

/// Default cadence of position ticks.
pub const DEFAULT_POSITION_TICK_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Clone, Debug, PartialEq)]
pub struct LocalPlaybackOptions {
    /// Interval used by `subscribe_position_ticks(None)`.
    pub position_tick_interval: Duration,
}

impl Default for LocalPlaybackOptions {
    fn default() -> Self {
        Self {
            position_tick_interval: DEFAULT_POSITION_TICK_INTERVAL,
        }
    }
}

/// Engine callbacks and ticker wake-ups, as seen by the owning thread.
#[derive(Debug)]
pub(crate) enum LocalMessage {
    Prepared {
        ticket: LoadTicket,
        result: Result<PreparedMedia, PrepareFailure>,
    },
    Player(PlayerEvent),
    Tick,
}

impl PrepareListener for InboxHandle<LocalMessage> {
    fn on_prepare_result(&self, ticket: LoadTicket, result: Result<PreparedMedia, PrepareFailure>) {
        self.post(LocalMessage::Prepared { ticket, result });
    }
}

impl PlayerEventListener for InboxHandle<LocalMessage> {
    fn on_player_event(&self, event: PlayerEvent) {
        self.post(LocalMessage::Player(event));
    }
}

/// Owns the lifecycle of one local player.
///
/// The coordinator is single-owner: every operation takes `&mut self` and
/// engine callbacks only take effect when the owner calls
/// [`process_pending`](Self::process_pending) or
/// [`wait_and_process`](Self::wait_and_process). Events are delivered to the
/// observer at the end of each of those calls.
pub struct LocalPlaybackCoordinator<E: PlayerEngine> {
    engine: E,
    session: PlaybackSession,
    generation: u64,
    /// Ticket of the item currently owned by the engine.
    active_ticket: Option<LoadTicket>,
    inbox: Inbox<LocalMessage>,
    listener: Arc<InboxHandle<LocalMessage>>,
    relay: EventRelay<PlaybackEvent>,
    ticker: Option<PositionTicker>,
    options: LocalPlaybackOptions,
}

impl<E: PlayerEngine> LocalPlaybackCoordinator<E> {
    pub fn new(engine: E) -> Result<Self, ControlError> {
        Self::with_options(engine, LocalPlaybackOptions::default())
    }

    pub fn with_options(mut engine: E, options: LocalPlaybackOptions) -> Result<Self, ControlError> {
        let inbox = Inbox::new();
        let listener = Arc::new(inbox.handle());

        engine
            .subscribe(
                &[PlayerEventKind::Ended, PlayerEventKind::Error],
                listener.clone(),
            )
            .map_err(ControlError::engine)?;

        Ok(Self {
            engine,
            session: PlaybackSession::default(),
            generation: 0,
            active_ticket: None,
            inbox,
            listener,
            relay: EventRelay::new(),
            ticker: None,
            options,
        })
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn state(&self) -> PlaybackState {
        self.session.state
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    pub fn current_descriptor(&self) -> Option<&MediaDescriptor> {
        self.session.current_descriptor.as_ref()
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        self.session.duration_seconds
    }

    /// Current playhead.
    ///
    /// Reads through to the engine while an item is prepared, otherwise
    /// returns the last known position.
    pub fn position_seconds(&self) -> f64 {
        if self.session.state.has_prepared_item() {
            self.session.clamp_position(self.engine.current_time())
        } else {
            self.session.position_seconds
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Number of engine callbacks waiting to be processed.
    pub fn pending_messages(&self) -> usize {
        self.inbox.len()
    }

    // ------------------------------------------------------------------
    // Observer
    // ------------------------------------------------------------------

    /// Registers the observer, replacing the previous one.
    pub fn set_observer(&mut self, observer: Box<dyn EventObserver<PlaybackEvent>>) -> bool {
        self.relay.set_observer(observer)
    }

    pub fn clear_observer(&mut self) {
        self.relay.clear_observer();
    }

    /// Registers a channel observer and returns its receiver.
    pub fn observe(&mut self) -> Receiver<PlaybackEvent> {
        self.relay.observe()
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Starts loading `descriptor`, superseding whatever was loaded or
    /// loading before.
    ///
    /// The engine is stopped before it is asked to prepare the new item.
    /// Observers see a single transition to `Preparing`; the intermediate
    /// `Stopping`/`Idle` steps of a switch are not published.
    pub fn load(&mut self, descriptor: MediaDescriptor) -> Result<LoadTicket, ControlError> {
        let from = self.session.state;
        let replaced = self.session.current_id().map(str::to_string);

        if matches!(
            from,
            PlaybackState::Preparing
                | PlaybackState::Ready
                | PlaybackState::Playing
                | PlaybackState::Paused
        ) {
            self.session.state = PlaybackState::Stopping;
            debug!(from = %from, previous = ?replaced, "Releasing current item before load");

            if let Err(err) = self.engine.stop() {
                warn!(error = %err, "Engine refused to stop current item");
                self.active_ticket = None;
                self.session.state = from;
                self.transition(PlaybackState::Failed);
                self.relay.flush();
                return Err(ControlError::engine(err));
            }
            self.session.state = PlaybackState::Idle;
        }

        self.generation += 1;
        let ticket = LoadTicket {
            generation: self.generation,
            descriptor_id: descriptor.id().to_string(),
        };

        self.session.position_seconds = descriptor.start_position_seconds();
        self.session.duration_seconds = descriptor.duration_seconds();
        self.session.current_descriptor = Some(descriptor.clone());
        self.active_ticket = Some(ticket.clone());

        // Publie la transition depuis l'état visible avant le load
        self.session.state = from;
        self.transition(PlaybackState::Preparing);
        self.relay.emit(PlaybackEvent::LoadStarted {
            ticket: ticket.clone(),
            replaced,
        });

        info!(
            descriptor = %ticket.descriptor_id,
            format = %descriptor.format(),
            ticket = %ticket,
            "Loading media"
        );

        let request = PrepareRequest {
            ticket: ticket.clone(),
            descriptor,
            listener: self.listener.clone(),
        };

        if let Err(err) = self.engine.prepare(request) {
            let error = ControlError::prepare_failed(
                &ticket.descriptor_id,
                PrepareFailure::Other(format!("{:#}", err)),
            );
            warn!(ticket = %ticket, error = %error, "Engine refused prepare");
            self.active_ticket = None;
            self.transition(PlaybackState::Failed);
            self.relay.emit(PlaybackEvent::PrepareFailed {
                ticket,
                error: error.clone(),
            });
            self.relay.flush();
            return Err(error);
        }

        self.relay.flush();
        Ok(ticket)
    }

    /// `Ready`/`Paused` → `Playing`. No-op when already playing.
    pub fn play(&mut self) -> Result<(), ControlError> {
        match self.session.state {
            PlaybackState::Playing => Ok(()),
            PlaybackState::Ready | PlaybackState::Paused => {
                self.engine.play().map_err(ControlError::engine)?;
                self.transition(PlaybackState::Playing);
                self.relay.flush();
                Ok(())
            }
            other => Err(ControlError::invalid_state("play", other.as_str())),
        }
    }

    /// `Playing` → `Paused`. No-op in any other state.
    pub fn pause(&mut self) -> Result<(), ControlError> {
        if self.session.state != PlaybackState::Playing {
            debug!(state = %self.session.state, "pause ignored");
            return Ok(());
        }

        self.engine.pause().map_err(ControlError::engine)?;
        self.session.position_seconds = self.session.clamp_position(self.engine.current_time());
        self.transition(PlaybackState::Paused);
        self.relay.flush();
        Ok(())
    }

    /// Moves the playhead and returns the effective position.
    ///
    /// Out-of-range targets are clamped to `[0, duration]`.
    pub fn seek(&mut self, position_seconds: f64) -> Result<f64, ControlError> {
        let state = self.session.state;
        if !state.has_prepared_item() {
            return Err(ControlError::invalid_state("seek", state.as_str()));
        }

        let target = self.session.clamp_position(position_seconds);
        self.engine
            .set_current_time(target)
            .map_err(ControlError::engine)?;
        self.session.position_seconds = target;

        if let Some(descriptor_id) = self.session.current_id() {
            debug!(descriptor = descriptor_id, requested = position_seconds, effective = target, "Seek");
            self.relay.emit(PlaybackEvent::Seeked {
                descriptor_id: descriptor_id.to_string(),
                position_seconds: target,
            });
        }
        self.relay.flush();
        Ok(target)
    }

    /// Releases the current item and returns to `Idle`.
    pub fn teardown(&mut self) {
        let from = self.session.state;
        if from == PlaybackState::Idle && self.session.current_descriptor.is_none() {
            return;
        }

        let descriptor_id = self.session.current_id().map(str::to_string);

        if from != PlaybackState::Failed && from != PlaybackState::Idle {
            self.transition(PlaybackState::Stopping);
            if let Err(err) = self.engine.stop() {
                warn!(error = %err, "Engine stop failed during teardown");
            }
        }

        self.active_ticket = None;
        self.session.current_descriptor = None;
        self.session.position_seconds = 0.0;
        self.session.duration_seconds = None;
        self.transition(PlaybackState::Idle);
        self.relay.emit(PlaybackEvent::TornDown {
            descriptor_id: descriptor_id.clone(),
        });

        info!(descriptor = ?descriptor_id, "Playback torn down");
        self.relay.flush();
    }

    // ------------------------------------------------------------------
    // Position ticks
    // ------------------------------------------------------------------

    /// Starts publishing `PositionTick` events while playing.
    ///
    /// `None` (or a zero interval) uses the configured default. Subscribing
    /// again replaces the running ticker.
    pub fn subscribe_position_ticks(&mut self, interval: Option<Duration>) -> Result<(), ControlError> {
        let interval = interval
            .filter(|d| !d.is_zero())
            .unwrap_or(self.options.position_tick_interval);

        self.unsubscribe_position_ticks();

        let ticker = PositionTicker::spawn(interval, self.inbox.handle(), || LocalMessage::Tick)
            .map_err(|e| ControlError::Engine(format!("cannot spawn position ticker: {}", e)))?;
        self.ticker = Some(ticker);
        Ok(())
    }

    pub fn unsubscribe_position_ticks(&mut self) {
        if let Some(mut ticker) = self.ticker.take() {
            ticker.stop();
        }
    }

    /// Interval of the running ticker, if any.
    pub fn position_tick_interval(&self) -> Option<Duration> {
        self.ticker.as_ref().map(|t| t.interval())
    }

    // ------------------------------------------------------------------
    // Inbox processing
    // ------------------------------------------------------------------

    /// Applies every engine callback already waiting in the inbox.
    pub fn process_pending(&mut self) -> usize {
        let mut processed = 0;
        while let Some(message) = self.inbox.try_next() {
            self.handle_message(message);
            processed += 1;
        }
        self.relay.flush();
        processed
    }

    /// Waits up to `timeout` for a callback, then drains the inbox.
    pub fn wait_and_process(&mut self, timeout: Duration) -> usize {
        match self.inbox.next_timeout(timeout) {
            Some(message) => {
                self.handle_message(message);
                1 + self.process_pending()
            }
            None => 0,
        }
    }

    /// Processes callbacks until `state` is reached or `timeout` expires.
    pub fn wait_for_state(&mut self, state: PlaybackState, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.process_pending();
        while self.session.state != state {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.wait_and_process(deadline - now);
        }
        true
    }

    fn handle_message(&mut self, message: LocalMessage) {
        match message {
            LocalMessage::Prepared { ticket, result } => self.on_prepared(ticket, result),
            LocalMessage::Player(event) => self.on_player_event(event),
            LocalMessage::Tick => self.on_tick(),
        }
    }

    fn on_prepared(&mut self, ticket: LoadTicket, result: Result<PreparedMedia, PrepareFailure>) {
        if self.session.state != PlaybackState::Preparing
            || self.active_ticket.as_ref() != Some(&ticket)
        {
            debug!(ticket = %ticket, "Discarding stale prepare result");
            return;
        }

        match result {
            Ok(prepared) => {
                let duration = prepared
                    .duration_seconds
                    .or_else(|| self.engine.duration())
                    .filter(|d| d.is_finite() && *d >= 0.0)
                    .or(self.session.duration_seconds);
                self.session.duration_seconds = duration;
                self.session.position_seconds =
                    self.session.clamp_position(self.session.position_seconds);

                self.transition(PlaybackState::Ready);
                info!(ticket = %ticket, duration = ?duration, "Media ready");
                self.relay.emit(PlaybackEvent::Ready {
                    ticket,
                    duration_seconds: duration,
                });
            }
            Err(reason) => {
                let error = ControlError::prepare_failed(&ticket.descriptor_id, reason);
                warn!(ticket = %ticket, error = %error, "Prepare failed");
                self.active_ticket = None;
                self.transition(PlaybackState::Failed);
                self.relay.emit(PlaybackEvent::PrepareFailed { ticket, error });
            }
        }
    }

    fn on_player_event(&mut self, event: PlayerEvent) {
        if self.active_ticket.as_ref() != Some(event.ticket())
            || !self.session.state.has_prepared_item()
        {
            debug!(ticket = %event.ticket(), event = event.kind().name(), "Discarding stale player event");
            return;
        }

        let descriptor_id = event.ticket().descriptor_id.clone();
        match event {
            PlayerEvent::Ended { .. } => {
                self.session.position_seconds = self
                    .session
                    .duration_seconds
                    .unwrap_or_else(|| self.engine.current_time().max(0.0));
                self.transition(PlaybackState::Paused);
                info!(descriptor = %descriptor_id, "Playback ended");
                self.relay.emit(PlaybackEvent::PlaybackEnded { descriptor_id });
            }
            PlayerEvent::Error { message, .. } => {
                warn!(descriptor = %descriptor_id, error = %message, "Player error");
                self.relay.emit(PlaybackEvent::PlaybackError {
                    descriptor_id,
                    error: ControlError::Engine(message),
                });
            }
        }
    }

    fn on_tick(&mut self) {
        if self.session.state != PlaybackState::Playing {
            return;
        }
        let Some(descriptor_id) = self.session.current_id().map(str::to_string) else {
            return;
        };

        let position = self.session.clamp_position(self.engine.current_time());
        self.session.position_seconds = position;
        self.relay.emit(PlaybackEvent::PositionTick {
            descriptor_id,
            position_seconds: position,
            duration_seconds: self.session.duration_seconds,
        });
    }

    /// Sets the state and queues a `StateChanged` event when it differs.
    fn transition(&mut self, to: PlaybackState) {
        let from = self.session.state;
        if from == to {
            return;
        }
        self.session.state = to;
        debug!(from = %from, to = %to, "Playback state changed");
        self.relay.emit(PlaybackEvent::StateChanged { from, to });
    }
}

impl<E: PlayerEngine> Drop for LocalPlaybackCoordinator<E> {
    fn drop(&mut self) {
        self.unsubscribe_position_ticks();
        self.engine.destroy();
    }
}
