//! `CastEngine` adapter over the rust_cast client.
//!
//! A worker thread owns the `CastDevice` for the whole session: it launches
//! the receiver application, executes queue requests sent over a crossbeam
//! channel and polls the media status between two requests. Listeners are
//! called from that thread.
//!
//! The default media receiver has no queue support through rust_cast, so a
//! queue load plays its first item and a queue insert is reported as failed.
//! The repeat mode is remembered locally and echoed in the media status.
//!
//! Ending a session never waits for the worker: it may be stuck in a TCP
//! connect or an application launch. The worker is flagged as cancelled and
//! stays silent from then on. Only `Drop` waits for it, for a bounded time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Once};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow, bail};
use crossbeam_channel::{RecvTimeoutError, Sender, unbounded};
use rust_cast::CastDevice;
use rust_cast::channels::media::{
    Image, Media, Metadata, MovieMediaMetadata, PlayerState, StatusEntry,
    StreamType as CastStreamType,
};
use rust_cast::channels::receiver::{Application, CastDeviceApp};
use tracing::{debug, info, warn};

use crate::capabilities::{
    AdInfoListener, CastEngine, MediaStatus, MediaStatusListener, QueueInsertRequest,
    QueueLoadRequest, RepeatMode, RequestListener, SessionEvent, SessionListener,
};
use crate::config_ext::ChromecastOptions;
use crate::local::PlaybackState;
use crate::remote::{QueueItem, RequestId, StreamType};

const DEFAULT_DESTINATION_ID: &str = "receiver-0";
const DEFAULT_MEDIA_RECEIVER_ID: &str = "CC1AD845";
const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Installs the rustls crypto provider once per process.
fn ensure_crypto_provider_initialized() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let _ = rustls::crypto::CryptoProvider::install_default(
            rustls::crypto::aws_lc_rs::default_provider(),
        );
    });
}

enum Command {
    Load {
        request_id: RequestId,
        request: QueueLoadRequest,
        listener: Arc<dyn RequestListener>,
    },
    Stop,
}

/// State shared between the engine handle and its worker.
#[derive(Default)]
struct Shared {
    session_id: Option<String>,
    status: Option<MediaStatus>,
    repeat_mode: RepeatMode,
    session_listener: Option<Arc<dyn SessionListener>>,
    status_listener: Option<Arc<dyn MediaStatusListener>>,
    ad_listener: Option<Arc<dyn AdInfoListener>>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct ChromecastEngine {
    options: ChromecastOptions,
    application_id: Option<String>,
    shared: Arc<Mutex<Shared>>,
    commands: Option<Sender<Command>>,
    /// Stop flag of the running worker.
    cancelled: Option<Arc<AtomicBool>>,
    /// Workers told to stop and not joined yet.
    retired: Vec<JoinHandle<()>>,
}

impl ChromecastEngine {
    pub fn new(options: ChromecastOptions) -> Self {
        Self {
            options,
            application_id: None,
            shared: Arc::new(Mutex::new(Shared::default())),
            commands: None,
            cancelled: None,
            retired: Vec::new(),
        }
    }

    pub fn options(&self) -> &ChromecastOptions {
        &self.options
    }

    fn send(&self, command: Command) -> Result<()> {
        let commands = self
            .commands
            .as_ref()
            .ok_or_else(|| anyhow!("no Chromecast session"))?;
        commands
            .send(command)
            .map_err(|_| anyhow!("Chromecast worker has stopped"))
    }

    /// Joins the retired workers that already exited.
    fn reap_workers(&mut self) {
        let (finished, running): (Vec<_>, Vec<_>) = std::mem::take(&mut self.retired)
            .into_iter()
            .partition(|handle| handle.is_finished());
        for handle in finished {
            let _ = handle.join();
        }
        self.retired = running;
    }

    /// Waits up to `timeout` for the retired workers, then detaches the rest.
    fn join_workers(&mut self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        while !self.retired.is_empty() && Instant::now() < deadline {
            self.reap_workers();
            if !self.retired.is_empty() {
                thread::sleep(Duration::from_millis(10));
            }
        }
        if !self.retired.is_empty() {
            debug!(workers = self.retired.len(), "Detaching Chromecast workers still running");
            self.retired.clear();
        }
    }
}

impl CastEngine for ChromecastEngine {
    fn set_options(&mut self, application_id: &str) -> Result<()> {
        self.application_id = Some(application_id.to_string());
        Ok(())
    }

    fn add_session_listener(&mut self, listener: Arc<dyn SessionListener>) {
        lock(&self.shared).session_listener = Some(listener);
    }

    fn remove_session_listener(&mut self) {
        lock(&self.shared).session_listener = None;
    }

    fn start_session(&mut self) -> Result<()> {
        if self.commands.is_some() {
            bail!("a Chromecast session is already running");
        }
        let application_id = self
            .application_id
            .clone()
            .ok_or_else(|| anyhow!("no receiver application configured"))?;

        ensure_crypto_provider_initialized();
        self.reap_workers();

        let (tx, rx) = unbounded::<Command>();
        let options = self.options.clone();
        let shared = Arc::clone(&self.shared);
        let cancelled = Arc::new(AtomicBool::new(false));
        let worker_cancelled = Arc::clone(&cancelled);

        let handle = thread::Builder::new()
            .name(format!("chromecast-{}", options.host))
            .spawn(move || {
                let worker = Worker {
                    options,
                    shared,
                    cancelled: worker_cancelled,
                    last_status: None,
                };
                worker.run(&application_id, rx);
            })
            .map_err(|e| anyhow!("cannot spawn Chromecast worker: {}", e))?;

        self.commands = Some(tx);
        self.cancelled = Some(cancelled);
        self.retired.push(handle);
        Ok(())
    }

    fn end_session(&mut self) -> Result<()> {
        if self.commands.is_none() {
            return Ok(());
        }
        {
            let mut shared = lock(&self.shared);
            if let Some(cancelled) = self.cancelled.take() {
                cancelled.store(true, Ordering::SeqCst);
            }
            shared.session_id = None;
            shared.status = None;
        }
        // Le worker peut déjà être terminé (connexion perdue)
        let _ = self.send(Command::Stop);
        self.commands = None;
        self.reap_workers();
        Ok(())
    }

    fn has_current_session(&self) -> bool {
        lock(&self.shared).session_id.is_some()
    }

    fn media_status(&self) -> Option<MediaStatus> {
        lock(&self.shared).status.clone()
    }

    fn queue_load(
        &mut self,
        request_id: RequestId,
        request: QueueLoadRequest,
        listener: Arc<dyn RequestListener>,
    ) -> Result<()> {
        if request.items.is_empty() {
            bail!("empty queue load");
        }
        self.send(Command::Load {
            request_id,
            request,
            listener,
        })
    }

    fn queue_insert(
        &mut self,
        request_id: RequestId,
        _request: QueueInsertRequest,
        listener: Arc<dyn RequestListener>,
    ) -> Result<()> {
        if self.commands.is_none() {
            bail!("no Chromecast session");
        }
        listener.on_request_result(
            request_id,
            Err("queue insert is not supported by the default media receiver".to_string()),
        );
        Ok(())
    }

    fn add_media_listeners(
        &mut self,
        status: Arc<dyn MediaStatusListener>,
        ads: Arc<dyn AdInfoListener>,
    ) {
        let mut shared = lock(&self.shared);
        shared.status_listener = Some(status);
        shared.ad_listener = Some(ads);
    }

    fn remove_media_listeners(&mut self) {
        let mut shared = lock(&self.shared);
        shared.status_listener = None;
        shared.ad_listener = None;
    }
}

impl Drop for ChromecastEngine {
    fn drop(&mut self) {
        let _ = self.end_session();
        self.join_workers(WORKER_JOIN_TIMEOUT);
    }
}

struct Worker {
    options: ChromecastOptions,
    shared: Arc<Mutex<Shared>>,
    cancelled: Arc<AtomicBool>,
    last_status: Option<MediaStatus>,
}

impl Worker {
    fn run(mut self, application_id: &str, commands: crossbeam_channel::Receiver<Command>) {
        let (device, app) = match self.open(application_id) {
            Ok(opened) => opened,
            Err(err) => {
                warn!(host = %self.options.host, error = %err, "Chromecast session failed to start");
                self.notify_session(SessionEvent::StartFailed {
                    reason: format!("{:#}", err),
                });
                return;
            }
        };

        {
            let mut shared = lock(&self.shared);
            if self.is_cancelled() {
                drop(shared);
                info!(session = %app.session_id, "Session ended before it started, stopping receiver app");
                let _ = device.receiver.stop_app(app.session_id.as_str());
                return;
            }
            shared.session_id = Some(app.session_id.clone());
        }
        info!(host = %self.options.host, session = %app.session_id, "Chromecast session started");
        self.notify_session(SessionEvent::Started {
            session_id: app.session_id.clone(),
        });

        loop {
            match commands.recv_timeout(self.options.status_poll_interval) {
                Ok(Command::Load {
                    request_id,
                    request,
                    listener,
                }) => {
                    let result = self.load(&device, &app, &request).map_err(|e| format!("{:#}", e));
                    listener.on_request_result(request_id, result);
                }
                Ok(Command::Stop) | Err(RecvTimeoutError::Disconnected) => {
                    if let Err(e) = device.receiver.stop_app(app.session_id.as_str()) {
                        debug!(error = %e, "Failed to stop receiver application");
                    }
                    debug!("Chromecast worker exiting");
                    return;
                }
                Err(RecvTimeoutError::Timeout) => {}
            }

            if let Err(err) = self.poll(&device, &app) {
                warn!(error = %err, "Lost Chromecast connection");
                {
                    let mut shared = lock(&self.shared);
                    if !self.is_cancelled() {
                        shared.session_id = None;
                        shared.status = None;
                    }
                }
                self.notify_session(SessionEvent::Ended {
                    session_id: app.session_id.clone(),
                    error: Some(format!("{:#}", err)),
                });
                return;
            }
        }
    }

    fn open(&self, application_id: &str) -> Result<(CastDevice<'static>, Application)> {
        debug!(host = %self.options.host, port = self.options.port, "Connecting to Chromecast");

        let device =
            CastDevice::connect_without_host_verification(self.options.host.clone(), self.options.port)
                .map_err(|e| anyhow!("Failed to connect to Chromecast: {}", e))?;

        device
            .connection
            .connect(DEFAULT_DESTINATION_ID.to_string())
            .map_err(|e| anyhow!("Failed to connect receiver channel: {}", e))?;
        device
            .heartbeat
            .ping()
            .map_err(|e| anyhow!("Failed to send initial ping: {}", e))?;

        let receiver_app = if application_id == DEFAULT_MEDIA_RECEIVER_ID {
            CastDeviceApp::DefaultMediaReceiver
        } else {
            CastDeviceApp::Custom(application_id.to_string())
        };
        let app = device
            .receiver
            .launch_app(&receiver_app)
            .map_err(|e| anyhow!("Failed to launch app: {}", e))?;

        device
            .connection
            .connect(app.transport_id.as_str())
            .map_err(|e| anyhow!("Failed to connect to app transport: {}", e))?;

        Ok((device, app))
    }

    fn load(&mut self, device: &CastDevice<'static>, app: &Application, request: &QueueLoadRequest) -> Result<()> {
        let item = request
            .items
            .get(request.start_index)
            .or_else(|| request.items.first())
            .ok_or_else(|| anyhow!("empty queue load"))?;

        let status = device
            .media
            .load(app.transport_id.as_str(), app.session_id.as_str(), &to_cast_media(item))
            .map_err(|e| anyhow!("Failed to load media: {}", e))?;

        lock(&self.shared).repeat_mode = request.repeat_mode;
        debug!(descriptor = %item.descriptor_id, entries = status.entries.len(), "Media loaded");

        if let Some(entry) = status.entries.first() {
            self.publish(app, entry);
        }
        Ok(())
    }

    fn poll(&mut self, device: &CastDevice<'static>, app: &Application) -> Result<()> {
        device
            .heartbeat
            .ping()
            .map_err(|e| anyhow!("Heartbeat failed: {}", e))?;

        let status = device
            .media
            .get_status(app.transport_id.as_str(), None)
            .map_err(|e| anyhow!("Failed to get media status: {}", e))?;

        if let Some(entry) = status.entries.first() {
            self.publish(app, entry);
        }
        Ok(())
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Stores the status and notifies the listeners when something changed.
    fn publish(&mut self, app: &Application, entry: &StatusEntry) {
        let (status, status_listener, session_listener) = {
            let mut shared = lock(&self.shared);
            if self.is_cancelled() {
                return;
            }
            let status = to_media_status(entry, shared.repeat_mode);
            shared.status = Some(status.clone());
            (
                status,
                shared.status_listener.clone(),
                shared.session_listener.clone(),
            )
        };

        let previous = self.last_status.replace(status.clone());
        if previous.as_ref().and_then(|s| s.media_session_id) != status.media_session_id {
            if let (Some(listener), Some(media_session_id)) = (session_listener, status.media_session_id) {
                listener.on_session_event(SessionEvent::MediaSessionStarted {
                    session_id: app.session_id.clone(),
                    media_session_id,
                });
            }
        }

        let changed = match previous {
            None => true,
            Some(prev) => {
                prev.player_state != status.player_state
                    || prev.media_session_id != status.media_session_id
                    || prev.current_time.floor() != status.current_time.floor()
            }
        };
        if changed {
            if let Some(listener) = status_listener {
                listener.on_media_status(status);
            }
        }
    }

    fn notify_session(&self, event: SessionEvent) {
        let listener = {
            let shared = lock(&self.shared);
            if self.is_cancelled() {
                debug!(event = ?event, "Worker cancelled, session event dropped");
                return;
            }
            shared.session_listener.clone()
        };
        if let Some(listener) = listener {
            listener.on_session_event(event);
        }
    }
}

fn to_cast_media(item: &QueueItem) -> Media {
    let metadata = item.media.metadata.as_ref().map(|m| {
        Metadata::Movie(MovieMediaMetadata {
            title: m.title.clone(),
            subtitle: m.subtitle.clone(),
            images: m
                .images
                .iter()
                .map(|image| Image {
                    url: image.url.clone(),
                    dimensions: image.width.zip(image.height),
                })
                .collect(),
            ..Default::default()
        })
    });

    Media {
        content_id: item.media.content_id.clone(),
        content_type: item.media.content_type.clone(),
        stream_type: match item.media.stream_type {
            StreamType::Buffered => CastStreamType::Buffered,
            StreamType::Live => CastStreamType::Live,
            StreamType::None => CastStreamType::None,
        },
        duration: item.media.duration.map(|d| d as f32),
        metadata,
    }
}

fn to_media_status(entry: &StatusEntry, repeat_mode: RepeatMode) -> MediaStatus {
    let player_state = match entry.player_state {
        PlayerState::Playing => PlaybackState::Playing,
        PlayerState::Paused => PlaybackState::Paused,
        PlayerState::Buffering => PlaybackState::Preparing,
        PlayerState::Idle => PlaybackState::Idle,
    };

    MediaStatus {
        media_session_id: Some(entry.media_session_id as i64),
        player_state,
        repeat_mode,
        current_time: entry.current_time.map(|t| t as f64).unwrap_or(0.0),
        active_index: Some(0),
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use super::*;
    use crate::capabilities::InsertPosition;
    use crate::descriptor::MediaDescriptor;

    #[test]
    fn test_cast_media_from_queue_item() {
        let descriptor = MediaDescriptor::builder("coffee", "https://example/a.m3u8")
            .title("Folger's coffee")
            .image("https://example/thumb.jpg", 780, 1200)
            .duration(30.0)
            .build()
            .unwrap();
        let media = to_cast_media(&QueueItem::from_descriptor(&descriptor));

        assert_eq!(media.content_id, "https://example/a.m3u8");
        assert_eq!(media.content_type, "application/x-mpegURL");
        assert_eq!(media.duration, Some(30.0));
        match media.metadata {
            Some(Metadata::Movie(movie)) => {
                assert_eq!(movie.title.as_deref(), Some("Folger's coffee"));
                assert_eq!(movie.images.len(), 1);
                assert_eq!(movie.images[0].dimensions, Some((780, 1200)));
            }
            _ => panic!("expected movie metadata"),
        }
    }

    #[derive(Default)]
    struct Recorder {
        sessions: Mutex<Vec<SessionEvent>>,
        requests: Mutex<Vec<(RequestId, Result<(), String>)>>,
    }

    impl SessionListener for Recorder {
        fn on_session_event(&self, event: SessionEvent) {
            self.sessions.lock().unwrap().push(event);
        }
    }

    impl RequestListener for Recorder {
        fn on_request_result(&self, request: RequestId, result: Result<(), String>) {
            self.requests.lock().unwrap().push((request, result));
        }
    }

    fn local_options(port: u16) -> ChromecastOptions {
        ChromecastOptions {
            host: "127.0.0.1".to_string(),
            port,
            status_poll_interval: Duration::from_millis(500),
        }
    }

    #[test]
    fn test_queue_insert_without_session_fails() {
        let mut engine = ChromecastEngine::new(local_options(8009));
        let recorder = Arc::new(Recorder::default());
        let descriptor = MediaDescriptor::builder("coffee", "https://example/a.m3u8")
            .build()
            .unwrap();
        let request = QueueInsertRequest {
            items: vec![QueueItem::from_descriptor(&descriptor)],
            position: InsertPosition::End,
            custom_data: None,
        };

        let result = engine.queue_insert(RequestId(1), request, recorder.clone());

        assert!(result.is_err());
        assert!(recorder.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn test_session_calls_without_application() {
        let mut engine = ChromecastEngine::new(local_options(8009));
        assert!(!engine.has_current_session());
        assert!(engine.end_session().is_ok());
        assert!(engine.start_session().is_err(), "no application configured");
    }

    #[test]
    fn test_end_session_does_not_wait_for_connect() {
        // Accepte la connexion TCP sans jamais répondre au handshake TLS
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut engine = ChromecastEngine::new(local_options(port));
        let recorder = Arc::new(Recorder::default());
        engine.add_session_listener(recorder.clone());
        engine.set_options(DEFAULT_MEDIA_RECEIVER_ID).unwrap();
        engine.start_session().unwrap();
        let (socket, _) = listener.accept().unwrap();

        let started = Instant::now();
        engine.end_session().unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(!engine.has_current_session());

        drop(socket);
        drop(engine);
        assert!(recorder.sessions.lock().unwrap().is_empty());
    }
}
