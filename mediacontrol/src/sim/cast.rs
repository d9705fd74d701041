use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, bail};
use tracing::{debug, info};

use crate::capabilities::{
    AdInfoListener, CastEngine, InsertPosition, MediaStatus, MediaStatusListener,
    QueueInsertRequest, QueueLoadRequest, RepeatMode, RequestListener, SessionEvent,
    SessionListener,
};
use crate::local::PlaybackState;
use crate::remote::RequestId;
use crate::sim::{SimulationOptions, lock, spawn_delayed};

/// What the pretend receiver knows. Shared with the worker threads.
#[derive(Debug, Default)]
struct Receiver {
    session_id: Option<String>,
    /// Number of the session start not yet completed, if any.
    starting: Option<u64>,
    status: Option<MediaStatus>,
    /// Descriptor ids in receiver queue order.
    queue: Vec<String>,
    next_media_session: i64,
    /// Repeat mode the receiver starts with once media is loaded.
    repeat_mode: RepeatMode,
}

type MediaListeners = (Arc<dyn MediaStatusListener>, Arc<dyn AdInfoListener>);

/// Cast engine backed by an in-memory receiver.
pub struct SimulatedCastEngine {
    request_delay: Duration,
    receiver: Arc<Mutex<Receiver>>,
    application_id: Option<String>,
    session_listener: Option<Arc<dyn SessionListener>>,
    media_listeners: Option<MediaListeners>,
    sessions_started: u64,
    fail_connect: Option<String>,
    fail_next_request: Option<String>,
    media_listener_registrations: usize,
}

impl Default for SimulatedCastEngine {
    fn default() -> Self {
        Self::new(&SimulationOptions::default())
    }
}

impl SimulatedCastEngine {
    pub fn new(options: &SimulationOptions) -> Self {
        Self {
            request_delay: options.request_delay,
            receiver: Arc::new(Mutex::new(Receiver::default())),
            application_id: None,
            session_listener: None,
            media_listeners: None,
            sessions_started: 0,
            fail_connect: None,
            fail_next_request: None,
            media_listener_registrations: 0,
        }
    }

    pub fn application_id(&self) -> Option<&str> {
        self.application_id.as_deref()
    }

    /// Makes the next `start_session` fail with `reason`.
    pub fn fail_connect(&mut self, reason: &str) {
        self.fail_connect = Some(reason.to_string());
    }

    /// Makes the next queue request fail with `reason`.
    pub fn fail_next_request(&mut self, reason: &str) {
        self.fail_next_request = Some(reason.to_string());
    }

    /// Changes the receiver repeat mode, as a user would from another sender.
    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        let mut receiver = lock(&self.receiver);
        receiver.repeat_mode = mode;
        if let Some(status) = receiver.status.as_mut() {
            status.repeat_mode = mode;
        }
    }

    /// Descriptor ids currently queued on the receiver.
    pub fn receiver_queue(&self) -> Vec<String> {
        lock(&self.receiver).queue.clone()
    }

    /// How many times media listeners were registered.
    pub fn media_listener_registrations(&self) -> usize {
        self.media_listener_registrations
    }

    pub fn has_media_listeners(&self) -> bool {
        self.media_listeners.is_some()
    }

    /// Ends the session from the receiver side.
    pub fn drop_session(&mut self, error: Option<&str>) {
        let session_id = {
            let mut receiver = lock(&self.receiver);
            receiver.status = None;
            receiver.queue.clear();
            receiver.session_id.take()
        };
        if let (Some(session_id), Some(listener)) = (session_id, self.session_listener.as_ref()) {
            listener.on_session_event(SessionEvent::Ended {
                session_id,
                error: error.map(str::to_string),
            });
        }
    }

    /// Pushes an ad break description to the media listeners.
    pub fn announce_ad(&self, info: serde_json::Value) {
        if let Some((_, ads)) = self.media_listeners.as_ref() {
            ads.on_ad_info(info);
        }
    }

    fn take_request_failure(&mut self) -> Option<String> {
        self.fail_next_request.take()
    }
}

impl CastEngine for SimulatedCastEngine {
    fn set_options(&mut self, application_id: &str) -> Result<()> {
        debug!(application = application_id, "Cast options set");
        self.application_id = Some(application_id.to_string());
        Ok(())
    }

    fn add_session_listener(&mut self, listener: Arc<dyn SessionListener>) {
        self.session_listener = Some(listener);
    }

    fn remove_session_listener(&mut self) {
        self.session_listener = None;
    }

    fn start_session(&mut self) -> Result<()> {
        if self.application_id.is_none() {
            bail!("no receiver application configured");
        }
        let Some(listener) = self.session_listener.clone() else {
            bail!("no session listener registered");
        };

        let failure = self.fail_connect.take();
        self.sessions_started += 1;
        let start = self.sessions_started;
        let session_id = format!("sim-session-{}", start);
        let receiver = Arc::clone(&self.receiver);
        lock(&self.receiver).starting = Some(start);

        spawn_delayed("sim-session", self.request_delay, move || {
            let event = {
                let mut receiver = lock(&receiver);
                if receiver.starting != Some(start) {
                    debug!(session = %session_id, "Session start cancelled");
                    return;
                }
                receiver.starting = None;
                match failure {
                    Some(reason) => SessionEvent::StartFailed { reason },
                    None => {
                        receiver.session_id = Some(session_id.clone());
                        SessionEvent::Started { session_id }
                    }
                }
            };
            listener.on_session_event(event);
        })
    }

    fn end_session(&mut self) -> Result<()> {
        let session_id = {
            let mut receiver = lock(&self.receiver);
            receiver.starting = None;
            receiver.status = None;
            receiver.queue.clear();
            receiver.session_id.take()
        };
        let Some(session_id) = session_id else {
            return Ok(());
        };
        info!(session = %session_id, "Simulated receiver session ended");

        if let Some(listener) = self.session_listener.clone() {
            spawn_delayed("sim-session-end", Duration::ZERO, move || {
                listener.on_session_event(SessionEvent::Ended {
                    session_id,
                    error: None,
                });
            })?;
        }
        Ok(())
    }

    fn has_current_session(&self) -> bool {
        lock(&self.receiver).session_id.is_some()
    }

    fn media_status(&self) -> Option<MediaStatus> {
        lock(&self.receiver).status.clone()
    }

    fn queue_load(
        &mut self,
        request_id: RequestId,
        request: QueueLoadRequest,
        listener: Arc<dyn RequestListener>,
    ) -> Result<()> {
        if !self.has_current_session() {
            bail!("no current session");
        }

        let failure = self.take_request_failure();
        let receiver = Arc::clone(&self.receiver);
        let status_listener = self.media_listeners.as_ref().map(|(s, _)| Arc::clone(s));
        let session_listener = self.session_listener.clone();

        spawn_delayed("sim-queue-load", self.request_delay, move || {
            if let Some(reason) = failure {
                listener.on_request_result(request_id, Err(reason));
                return;
            }

            let (status, new_media_session) = {
                let mut receiver = lock(&receiver);
                let new_media_session = receiver.status.is_none();
                if new_media_session {
                    receiver.next_media_session += 1;
                }
                receiver.queue = request.items.iter().map(|i| i.descriptor_id.clone()).collect();
                receiver.repeat_mode = request.repeat_mode;
                let status = MediaStatus {
                    media_session_id: Some(receiver.next_media_session),
                    player_state: PlaybackState::Playing,
                    repeat_mode: request.repeat_mode,
                    current_time: request.play_position,
                    active_index: Some(request.start_index),
                };
                receiver.status = Some(status.clone());
                let session = receiver.session_id.clone();
                (status, new_media_session.then_some(session).flatten())
            };

            listener.on_request_result(request_id, Ok(()));
            if let (Some(session_id), Some(sessions)) = (new_media_session, session_listener) {
                sessions.on_session_event(SessionEvent::MediaSessionStarted {
                    session_id,
                    media_session_id: status.media_session_id.unwrap_or_default(),
                });
            }
            if let Some(status_listener) = status_listener {
                status_listener.on_media_status(status);
            }
        })
    }

    fn queue_insert(
        &mut self,
        request_id: RequestId,
        request: QueueInsertRequest,
        listener: Arc<dyn RequestListener>,
    ) -> Result<()> {
        if !self.has_current_session() {
            bail!("no current session");
        }

        let failure = self.take_request_failure();
        let receiver = Arc::clone(&self.receiver);

        spawn_delayed("sim-queue-insert", self.request_delay, move || {
            if let Some(reason) = failure {
                listener.on_request_result(request_id, Err(reason));
                return;
            }
            {
                let mut receiver = lock(&receiver);
                let ids = request.items.iter().map(|i| i.descriptor_id.clone());
                match request.position {
                    InsertPosition::End => receiver.queue.extend(ids),
                    InsertPosition::Before(item_id) => {
                        let at = (item_id as usize).min(receiver.queue.len());
                        let tail = receiver.queue.split_off(at);
                        receiver.queue.extend(ids);
                        receiver.queue.extend(tail);
                    }
                }
            }
            listener.on_request_result(request_id, Ok(()));
        })
    }

    fn add_media_listeners(
        &mut self,
        status: Arc<dyn MediaStatusListener>,
        ads: Arc<dyn AdInfoListener>,
    ) {
        self.media_listener_registrations += 1;
        self.media_listeners = Some((status, ads));
    }

    fn remove_media_listeners(&mut self) {
        self.media_listeners = None;
    }
}
