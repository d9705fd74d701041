use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use tracing::{debug, trace};

use crate::capabilities::{
    LoadTicket, PlayerEngine, PlayerEvent, PlayerEventKind, PlayerEventListener, PrepareRequest,
    PreparedMedia,
};
use crate::errors::PrepareFailure;
use crate::sim::{SimulationOptions, spawn_delayed};

/// Duration reported for items whose descriptor does not carry one.
const DEFAULT_MEDIA_DURATION: f64 = 600.0;

/// Playhead driven by the wall clock while playing.
#[derive(Debug, Default)]
struct Playhead {
    base: f64,
    started: Option<Instant>,
}

impl Playhead {
    fn position(&self) -> f64 {
        match self.started {
            Some(at) => self.base + at.elapsed().as_secs_f64(),
            None => self.base,
        }
    }

    fn resume(&mut self) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
    }

    fn freeze(&mut self) {
        self.base = self.position();
        self.started = None;
    }

    fn jump(&mut self, seconds: f64) {
        self.base = seconds;
        if self.started.is_some() {
            self.started = Some(Instant::now());
        }
    }
}

/// Player engine that pretends to buffer for a fixed delay.
pub struct SimulatedPlayerEngine {
    prepare_delay: Duration,
    media_duration: f64,
    failures: HashMap<String, PrepareFailure>,
    refuse_prepare: bool,
    listeners: Vec<(Vec<PlayerEventKind>, Arc<dyn PlayerEventListener>)>,
    current: Option<LoadTicket>,
    /// Cancels the in-flight prepare of `current`.
    cancel: Option<Arc<AtomicBool>>,
    prepared: bool,
    playing: bool,
    playhead: Playhead,
    duration: Option<f64>,
    stop_count: usize,
    destroyed: bool,
}

impl Default for SimulatedPlayerEngine {
    fn default() -> Self {
        Self::new(&SimulationOptions::default())
    }
}

impl SimulatedPlayerEngine {
    pub fn new(options: &SimulationOptions) -> Self {
        Self {
            prepare_delay: options.prepare_delay,
            media_duration: DEFAULT_MEDIA_DURATION,
            failures: HashMap::new(),
            refuse_prepare: false,
            listeners: Vec::new(),
            current: None,
            cancel: None,
            prepared: false,
            playing: false,
            playhead: Playhead::default(),
            duration: None,
            stop_count: 0,
            destroyed: false,
        }
    }

    /// Duration found "in the stream" when the descriptor has none.
    pub fn with_media_duration(mut self, seconds: f64) -> Self {
        self.media_duration = seconds;
        self
    }

    /// Makes every prepare of `descriptor_id` fail with `failure`.
    pub fn fail_prepare(&mut self, descriptor_id: &str, failure: PrepareFailure) {
        self.failures.insert(descriptor_id.to_string(), failure);
    }

    /// Makes `prepare` return an error synchronously.
    pub fn refuse_prepare(&mut self, refuse: bool) {
        self.refuse_prepare = refuse;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Number of `stop` calls so far.
    pub fn stop_count(&self) -> usize {
        self.stop_count
    }

    pub fn current_ticket(&self) -> Option<&LoadTicket> {
        self.current.as_ref()
    }

    /// Reaches the end of the current item and notifies the subscribers.
    pub fn finish(&mut self) {
        let Some(ticket) = self.current.clone().filter(|_| self.prepared) else {
            return;
        };
        self.playing = false;
        self.playhead = Playhead {
            base: self.duration.unwrap_or(0.0),
            started: None,
        };
        self.notify(PlayerEvent::Ended { ticket });
    }

    /// Reports a runtime failure of the current item.
    pub fn raise_error(&mut self, message: &str) {
        if let Some(ticket) = self.current.clone() {
            self.notify(PlayerEvent::Error {
                ticket,
                message: message.to_string(),
            });
        }
    }

    fn notify(&self, event: PlayerEvent) {
        let kind = event.kind();
        for (kinds, listener) in &self.listeners {
            if kinds.contains(&kind) {
                listener.on_player_event(event.clone());
            }
        }
    }

    fn release(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.store(true, Ordering::SeqCst);
        }
        self.current = None;
        self.prepared = false;
        self.playing = false;
        self.playhead = Playhead::default();
        self.duration = None;
    }
}

impl PlayerEngine for SimulatedPlayerEngine {
    fn subscribe(
        &mut self,
        events: &[PlayerEventKind],
        listener: Arc<dyn PlayerEventListener>,
    ) -> Result<()> {
        debug!(events = ?events.iter().map(|k| k.name()).collect::<Vec<_>>(), "Player subscription");
        self.listeners.push((events.to_vec(), listener));
        Ok(())
    }

    fn prepare(&mut self, request: PrepareRequest) -> Result<()> {
        if self.destroyed {
            bail!("player engine destroyed");
        }
        if self.refuse_prepare {
            bail!("player refused to prepare '{}'", request.descriptor.id());
        }
        if self.current.is_some() {
            // Un nouvel item remplace l'ancien sans stop explicite
            self.release();
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let duration = request
            .descriptor
            .duration_seconds()
            .unwrap_or(self.media_duration);
        let result = match self.failures.get(request.descriptor.id()) {
            Some(failure) => Err(failure.clone()),
            None => Ok(PreparedMedia {
                duration_seconds: Some(duration),
            }),
        };

        self.current = Some(request.ticket.clone());
        self.cancel = Some(Arc::clone(&cancel));
        self.duration = Some(duration);
        self.prepared = result.is_ok();
        self.playhead = Playhead {
            base: request.descriptor.start_position_seconds().min(duration),
            started: None,
        };

        let PrepareRequest {
            ticket, listener, ..
        } = request;
        spawn_delayed("sim-prepare", self.prepare_delay, move || {
            if cancel.load(Ordering::SeqCst) {
                trace!(ticket = %ticket, "prepare cancelled");
                return;
            }
            listener.on_prepare_result(ticket, result);
        })
    }

    fn play(&mut self) -> Result<()> {
        if !self.prepared {
            bail!("nothing prepared");
        }
        self.playing = true;
        self.playhead.resume();
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.playing = false;
        self.playhead.freeze();
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.stop_count += 1;
        self.release();
        Ok(())
    }

    fn current_time(&self) -> f64 {
        let position = self.playhead.position();
        match self.duration {
            Some(duration) => position.min(duration),
            None => position,
        }
    }

    fn set_current_time(&mut self, seconds: f64) -> Result<()> {
        if !self.prepared {
            bail!("cannot seek without a prepared item");
        }
        self.playhead.jump(seconds);
        Ok(())
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }

    fn destroy(&mut self) {
        self.release();
        self.listeners.clear();
        self.destroyed = true;
    }
}
