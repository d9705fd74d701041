use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use tracing::{debug, info, warn};

use crate::capabilities::{
    AdInfoListener, CastEngine, InsertPosition, MediaStatus, MediaStatusListener,
    QueueInsertRequest, QueueLoadRequest, RequestListener, SessionEvent, SessionListener,
};
use crate::descriptor::MediaDescriptor;
use crate::errors::ControlError;
use crate::events::{EventObserver, EventRelay};
use crate::inbox::{Inbox, InboxHandle};
use crate::local::PlaybackState;
use crate::queue::CastQueue;
use crate::remote::queue_item::QueueItem;
use crate::remote::session::{CastSession, RemoteState};
use crate::remote::{EnqueueMode, RemoteEvent, RequestId};

#[derive(Debug)]
pub(crate) enum RemoteMessage {
    Session(SessionEvent),
    Request {
        request: RequestId,
        result: Result<(), String>,
    },
    Status(MediaStatus),
    AdInfo(serde_json::Value),
}

impl SessionListener for InboxHandle<RemoteMessage> {
    fn on_session_event(&self, event: SessionEvent) {
        self.post(RemoteMessage::Session(event));
    }
}

impl RequestListener for InboxHandle<RemoteMessage> {
    fn on_request_result(&self, request: RequestId, result: Result<(), String>) {
        self.post(RemoteMessage::Request { request, result });
    }
}

impl MediaStatusListener for InboxHandle<RemoteMessage> {
    fn on_media_status(&self, status: MediaStatus) {
        self.post(RemoteMessage::Status(status));
    }
}

impl AdInfoListener for InboxHandle<RemoteMessage> {
    fn on_ad_info(&self, info: serde_json::Value) {
        self.post(RemoteMessage::AdInfo(info));
    }
}

/// A queue request waiting for the receiver's answer.
#[derive(Debug)]
struct PendingRequest {
    mode: EnqueueMode,
    descriptor: MediaDescriptor,
    /// Value of the replace counter when the request was issued.
    replace_generation: u64,
}

/// Owns the lifecycle of one cast session.
///
/// Like the local coordinator it is single-owner: engine callbacks are
/// applied by [`process_pending`](Self::process_pending) or
/// [`wait_and_process`](Self::wait_and_process) on the owner's thread.
pub struct RemoteSessionCoordinator<C: CastEngine> {
    engine: C,
    session: CastSession,
    application_id: Option<String>,
    /// Set by `disconnect`, cleared by `connect`. A session start reported
    /// after a disconnect belongs to the abandoned connect.
    disconnect_requested: bool,
    next_request: u64,
    replace_generation: u64,
    /// Newest replace whose success was applied to the queue mirror.
    applied_replace: u64,
    pending: HashMap<RequestId, PendingRequest>,
    media_listeners_registered: bool,
    inbox: Inbox<RemoteMessage>,
    listener: Arc<InboxHandle<RemoteMessage>>,
    relay: EventRelay<RemoteEvent>,
}

impl<C: CastEngine> RemoteSessionCoordinator<C> {
    /// Wraps `engine` and registers the coordinator as its session listener.
    pub fn new(mut engine: C) -> Self {
        let inbox = Inbox::new();
        let listener = Arc::new(inbox.handle());
        engine.add_session_listener(listener.clone());

        Self {
            engine,
            session: CastSession::default(),
            application_id: None,
            disconnect_requested: false,
            next_request: 0,
            replace_generation: 0,
            applied_replace: 0,
            pending: HashMap::new(),
            media_listeners_registered: false,
            inbox,
            listener,
            relay: EventRelay::new(),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn remote_state(&self) -> RemoteState {
        self.session.remote_state
    }

    pub fn session(&self) -> &CastSession {
        &self.session
    }

    pub fn queue(&self) -> &CastQueue {
        &self.session.queue
    }

    pub fn active_index(&self) -> Option<usize> {
        self.session.active_index()
    }

    pub fn application_id(&self) -> Option<&str> {
        self.application_id.as_deref()
    }

    /// Number of queue requests still waiting for the receiver.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    pub fn media_listeners_registered(&self) -> bool {
        self.media_listeners_registered
    }

    pub fn engine(&self) -> &C {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut C {
        &mut self.engine
    }

    // ------------------------------------------------------------------
    // Observer
    // ------------------------------------------------------------------

    pub fn set_observer(&mut self, observer: Box<dyn EventObserver<RemoteEvent>>) -> bool {
        self.relay.set_observer(observer)
    }

    pub fn clear_observer(&mut self) {
        self.relay.clear_observer();
    }

    pub fn observe(&mut self) -> Receiver<RemoteEvent> {
        self.relay.observe()
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Starts a session with the receiver application `application_id`.
    ///
    /// Does nothing unless disconnected. The outcome arrives through the
    /// session listener; only a synchronous refusal is returned here.
    pub fn connect(&mut self, application_id: &str) -> Result<(), ControlError> {
        if self.session.remote_state != RemoteState::Disconnected {
            debug!(state = %self.session.remote_state, "connect ignored, already connecting or connected");
            return Ok(());
        }

        let application_id = application_id.trim();
        if application_id.is_empty() {
            return Err(ControlError::Connection(
                "application id must not be empty".to_string(),
            ));
        }

        self.disconnect_requested = false;
        self.transition(RemoteState::Connecting);
        info!(application = application_id, "Starting cast session");

        let started = self
            .engine
            .set_options(application_id)
            .and_then(|_| self.engine.start_session());

        if let Err(err) = started {
            warn!(application = application_id, error = %err, "Cast engine refused to start session");
            self.transition(RemoteState::Disconnected);
            self.relay.flush();
            return Err(ControlError::Connection(format!("{:#}", err)));
        }

        self.application_id = Some(application_id.to_string());
        self.relay.flush();
        Ok(())
    }

    /// Sends `descriptor` to the receiver.
    ///
    /// `Replace` loads a single-item queue at position 0 and keeps the
    /// receiver's repeat mode. `Append` inserts at the end of the queue; with
    /// no media on the receiver yet it behaves like `Replace`.
    pub fn load_or_append(
        &mut self,
        descriptor: MediaDescriptor,
        mode: EnqueueMode,
    ) -> Result<RequestId, ControlError> {
        let state = self.session.remote_state;
        if !state.accepts_requests() {
            return Err(ControlError::invalid_state("load_or_append", state.as_str()));
        }

        let status = self.engine.media_status();
        let mode = if mode == EnqueueMode::Append && status.is_none() {
            debug!(descriptor = descriptor.id(), "No media status yet, append falls back to replace");
            EnqueueMode::Replace
        } else {
            mode
        };

        if mode == EnqueueMode::Append && self.is_queued_or_pending(descriptor.id()) {
            return Err(ControlError::InvalidDescriptor(format!(
                "'{}' is already in the remote queue",
                descriptor.id()
            )));
        }

        let item = QueueItem::from_descriptor(&descriptor);
        self.ensure_media_listeners();

        self.next_request += 1;
        let request_id = RequestId(self.next_request);
        let listener: Arc<dyn RequestListener> = self.listener.clone();

        match mode {
            EnqueueMode::Replace => {
                let repeat_mode = status.map(|s| s.repeat_mode).unwrap_or_default();
                let request = QueueLoadRequest {
                    items: vec![item],
                    start_index: 0,
                    play_position: 0.0,
                    repeat_mode,
                    custom_data: None,
                };
                self.engine
                    .queue_load(request_id, request, listener)
                    .map_err(|e| ControlError::remote_request(request_id, &format!("{:#}", e)))?;

                self.replace_generation += 1;
                self.transition(RemoteState::SessionStarting);
                info!(
                    request = %request_id,
                    descriptor = descriptor.id(),
                    repeat = repeat_mode.as_str(),
                    "Queue load sent"
                );
            }
            EnqueueMode::Append => {
                let request = QueueInsertRequest {
                    items: vec![item],
                    position: InsertPosition::End,
                    custom_data: None,
                };
                self.engine
                    .queue_insert(request_id, request, listener)
                    .map_err(|e| ControlError::remote_request(request_id, &format!("{:#}", e)))?;
                info!(request = %request_id, descriptor = descriptor.id(), "Queue insert sent");
            }
        }

        self.pending.insert(
            request_id,
            PendingRequest {
                mode,
                descriptor,
                replace_generation: self.replace_generation,
            },
        );

        self.relay.flush();
        Ok(request_id)
    }

    /// Ends the session and clears the queue mirror.
    pub fn disconnect(&mut self) {
        if self.session.remote_state == RemoteState::Disconnected {
            return;
        }
        info!(session = ?self.session.session_id, "Ending cast session");
        self.disconnect_requested = true;
        self.end_session(None, true);
        self.relay.flush();
    }

    // ------------------------------------------------------------------
    // Inbox processing
    // ------------------------------------------------------------------

    pub fn process_pending(&mut self) -> usize {
        let mut processed = 0;
        while let Some(message) = self.inbox.try_next() {
            self.handle_message(message);
            processed += 1;
        }
        self.relay.flush();
        processed
    }

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
    pub fn wait_for_state(&mut self, state: RemoteState, timeout: Duration) -> bool {
        self.wait_until(timeout, |c| c.session.remote_state == state)
    }

    /// Processes callbacks until every queue request got an answer.
    pub fn wait_for_requests(&mut self, timeout: Duration) -> bool {
        self.wait_until(timeout, |c| c.pending.is_empty())
    }

    fn wait_until(&mut self, timeout: Duration, done: impl Fn(&Self) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        self.process_pending();
        while !done(self) {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.wait_and_process(deadline - now);
        }
        true
    }

    fn handle_message(&mut self, message: RemoteMessage) {
        match message {
            RemoteMessage::Session(event) => self.on_session_event(event),
            RemoteMessage::Request { request, result } => self.on_request_result(request, result),
            RemoteMessage::Status(status) => self.on_media_status(status),
            RemoteMessage::AdInfo(info) => {
                if self.session.remote_state.is_connected() {
                    self.relay.emit(RemoteEvent::AdInfo(info));
                }
            }
        }
    }

    fn on_session_event(&mut self, event: SessionEvent) {
        let state = self.session.remote_state;
        match event {
            SessionEvent::Started { session_id } | SessionEvent::Resumed { session_id }
                if !matches!(state, RemoteState::Connecting | RemoteState::Disconnected) =>
            {
                debug!(session = %session_id, state = %state, "Ignoring session start while connected");
            }
            SessionEvent::Started { session_id } | SessionEvent::Resumed { session_id }
                if state == RemoteState::Disconnected && self.disconnect_requested =>
            {
                info!(session = %session_id, "Session started after disconnect, ending it");
                if let Err(err) = self.engine.end_session() {
                    warn!(session = %session_id, error = %err, "Cast engine failed to end late session");
                }
            }
            SessionEvent::Started { session_id } => {
                info!(session = %session_id, "Cast session started");
                self.open_session(session_id.clone());
                self.relay.emit(RemoteEvent::SessionStarted { session_id });
            }
            SessionEvent::Resumed { session_id } => {
                info!(session = %session_id, "Cast session resumed");
                self.open_session(session_id.clone());
                self.relay.emit(RemoteEvent::SessionResumed { session_id });
            }
            SessionEvent::StartFailed { reason } => {
                if state != RemoteState::Connecting {
                    debug!(reason = %reason, "Ignoring start failure, not connecting");
                    return;
                }
                warn!(reason = %reason, "Cast session failed to start");
                self.transition(RemoteState::Disconnected);
                self.relay.emit(RemoteEvent::ConnectionFailed {
                    error: ControlError::Connection(reason),
                });
            }
            SessionEvent::Ended { session_id, error } => {
                if self.session.session_id.as_deref() != Some(session_id.as_str()) {
                    debug!(session = %session_id, "Ignoring end of unknown session");
                    return;
                }
                info!(session = %session_id, error = ?error, "Cast session ended by receiver");
                self.end_session(error, false);
            }
            SessionEvent::MediaSessionStarted {
                session_id,
                media_session_id,
            } => {
                if self.session.session_id.as_deref() != Some(session_id.as_str()) {
                    debug!(session = %session_id, "Ignoring media session of unknown session");
                    return;
                }
                debug!(session = %session_id, media_session_id, "Media session started");
                self.session.media_session_id = Some(media_session_id);
                self.relay
                    .emit(RemoteEvent::MediaSessionStarted { media_session_id });
            }
        }
    }

    fn on_request_result(&mut self, request: RequestId, result: Result<(), String>) {
        let Some(pending) = self.pending.remove(&request) else {
            debug!(request = %request, "Ignoring result of unknown request");
            return;
        };
        let descriptor_id = pending.descriptor.id().to_string();
        let generation = pending.replace_generation;

        match result {
            Ok(()) => {
                match pending.mode {
                    EnqueueMode::Replace if generation > self.applied_replace => {
                        // Le récepteur joue ce média tant qu'un replace plus récent n'a pas abouti
                        self.applied_replace = generation;
                        self.session.queue.replace(vec![pending.descriptor], Some(0));
                        if !self.replace_pending_after(generation) {
                            self.transition(RemoteState::SessionActive);
                        }
                        self.relay
                            .emit(RemoteEvent::QueueChanged(self.session.queue.snapshot()));
                    }
                    EnqueueMode::Replace => {
                        debug!(request = %request, "Replace superseded by a newer one, queue untouched");
                    }
                    EnqueueMode::Append => {
                        self.session.queue.append(pending.descriptor);
                        self.relay
                            .emit(RemoteEvent::QueueChanged(self.session.queue.snapshot()));
                    }
                }
                info!(request = %request, descriptor = %descriptor_id, "Queue request completed");
                self.relay.emit(RemoteEvent::RequestCompleted {
                    request,
                    mode: pending.mode,
                    descriptor_id,
                });
            }
            Err(reason) => {
                let error = ControlError::remote_request(request, &reason);
                warn!(request = %request, descriptor = %descriptor_id, error = %error, "Queue request failed");

                if pending.mode == EnqueueMode::Replace
                    && !self.replace_pending_after(0)
                    && self.session.remote_state == RemoteState::SessionStarting
                {
                    let fallback = self.settled_state();
                    self.transition(fallback);
                }
                self.relay.emit(RemoteEvent::RequestFailed {
                    request,
                    mode: pending.mode,
                    descriptor_id,
                    error,
                });
            }
        }
    }

    fn on_media_status(&mut self, status: MediaStatus) {
        if !self.session.remote_state.is_connected() {
            debug!("Ignoring media status while disconnected");
            return;
        }

        self.session.player_state = status.player_state;
        self.session.repeat_mode = status.repeat_mode;
        if status.media_session_id.is_some() {
            self.session.media_session_id = status.media_session_id;
        }
        if let Some(index) = status.active_index {
            if let Err(err) = self.session.queue.set_index(Some(index)) {
                debug!(index, error = %err, "Receiver reported an index outside the mirror");
            }
        }

        self.relay.emit(RemoteEvent::StatusUpdated(status));
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn open_session(&mut self, session_id: String) {
        self.session.session_id = Some(session_id);
        self.session.connected = true;
        self.transition(RemoteState::Connected);
    }

    /// Common path of `disconnect` and of a receiver-initiated end.
    fn end_session(&mut self, error: Option<String>, notify_engine: bool) {
        let state = self.session.remote_state;

        if matches!(state, RemoteState::SessionStarting | RemoteState::SessionActive) {
            self.transition(RemoteState::SessionEnding);
        }

        if notify_engine {
            if let Err(err) = self.engine.end_session() {
                warn!(error = %err, "Cast engine failed to end session");
            }
        }

        if self.media_listeners_registered {
            self.engine.remove_media_listeners();
            self.media_listeners_registered = false;
        }

        if !self.pending.is_empty() {
            debug!(dropped = self.pending.len(), "Dropping pending queue requests");
            self.pending.clear();
        }

        if self.session.remote_state == RemoteState::SessionEnding {
            self.transition(RemoteState::Connected);
        }

        let session_id = self.session.session_id.clone();
        let had_queue = !self.session.queue.is_empty();
        self.session.reset();
        self.session.player_state = PlaybackState::Idle;

        if had_queue {
            self.relay
                .emit(RemoteEvent::QueueChanged(self.session.queue.snapshot()));
        }
        if state != RemoteState::Connecting {
            self.relay
                .emit(RemoteEvent::SessionEnded { session_id, error });
        }
        self.transition(RemoteState::Disconnected);
    }

    fn ensure_media_listeners(&mut self) {
        if self.media_listeners_registered {
            return;
        }
        debug!("Registering media status and ad info listeners");
        self.engine
            .add_media_listeners(self.listener.clone(), self.listener.clone());
        self.media_listeners_registered = true;
    }

    fn is_queued_or_pending(&self, descriptor_id: &str) -> bool {
        self.session.queue.contains(descriptor_id)
            || self
                .pending
                .values()
                .any(|p| p.mode == EnqueueMode::Append && p.descriptor.id() == descriptor_id)
    }

    /// Whether a replace issued after `generation` still waits for its answer.
    fn replace_pending_after(&self, generation: u64) -> bool {
        self.pending
            .values()
            .any(|p| p.mode == EnqueueMode::Replace && p.replace_generation > generation)
    }

    /// State matching what the receiver holds once no replace is in flight.
    fn settled_state(&self) -> RemoteState {
        if self.session.queue.is_empty() {
            RemoteState::Connected
        } else {
            RemoteState::SessionActive
        }
    }

    fn transition(&mut self, to: RemoteState) {
        let from = self.session.remote_state;
        if from == to {
            return;
        }
        self.session.remote_state = to;
        debug!(from = %from, to = %to, "Remote state changed");
        self.relay.emit(RemoteEvent::StateChanged { from, to });
    }
}

impl<C: CastEngine> Drop for RemoteSessionCoordinator<C> {
    fn drop(&mut self) {
        if self.session.remote_state != RemoteState::Disconnected {
            self.end_session(None, true);
        }
        self.engine.remove_session_listener();
    }
}
