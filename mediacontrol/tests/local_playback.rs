use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use crossbeam_channel::Receiver;
use mediacontrol::capabilities::{PlayerEventListener, PrepareRequest};
use mediacontrol::{
    LoadTicket, LocalPlaybackCoordinator, MediaDescriptor, MediaFormat, PlaybackEvent,
    PlaybackState, PlayerEngine, PlayerEvent, PlayerEventKind, PreparedMedia, PrepareFailure,
    SimulatedPlayerEngine, SimulationOptions,
};

/// What the scripted player saw and what it will answer.
#[derive(Default)]
struct Script {
    calls: Vec<String>,
    requests: Vec<PrepareRequest>,
    listeners: Vec<Arc<dyn PlayerEventListener>>,
    time: f64,
    refuse_prepare: bool,
    fail_stop: bool,
}

/// Player engine whose callbacks are triggered by the test itself.
#[derive(Clone, Default)]
struct ScriptedPlayer {
    script: Arc<Mutex<Script>>,
}

impl ScriptedPlayer {
    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    fn calls(&self) -> Vec<String> {
        self.script().calls.clone()
    }

    /// Answers the prepare request issued for `descriptor_id`.
    fn complete(&self, descriptor_id: &str, result: Result<PreparedMedia, PrepareFailure>) {
        let request = {
            let mut script = self.script();
            let at = script
                .requests
                .iter()
                .position(|r| r.ticket.descriptor_id == descriptor_id)
                .expect("no prepare request for this descriptor");
            script.requests.remove(at)
        };
        request.listener.on_prepare_result(request.ticket, result);
    }

    fn emit(&self, event: PlayerEvent) {
        let listeners = self.script().listeners.clone();
        for listener in listeners {
            listener.on_player_event(event.clone());
        }
    }
}

impl PlayerEngine for ScriptedPlayer {
    fn subscribe(
        &mut self,
        events: &[PlayerEventKind],
        listener: Arc<dyn PlayerEventListener>,
    ) -> Result<()> {
        let mut script = self.script();
        let names: Vec<&str> = events.iter().map(|k| k.name()).collect();
        script.calls.push(format!("subscribe:{}", names.join(",")));
        script.listeners.push(listener);
        Ok(())
    }

    fn prepare(&mut self, request: PrepareRequest) -> Result<()> {
        let mut script = self.script();
        script.calls.push(format!("prepare:{}", request.descriptor.id()));
        if script.refuse_prepare {
            bail!("decoder unavailable");
        }
        script.requests.push(request);
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        self.script().calls.push("play".to_string());
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.script().calls.push("pause".to_string());
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut script = self.script();
        script.calls.push("stop".to_string());
        if script.fail_stop {
            bail!("stuck decoder");
        }
        Ok(())
    }

    fn current_time(&self) -> f64 {
        self.script().time
    }

    fn set_current_time(&mut self, seconds: f64) -> Result<()> {
        let mut script = self.script();
        script.calls.push(format!("seek:{}", seconds));
        script.time = seconds;
        Ok(())
    }

    fn duration(&self) -> Option<f64> {
        None
    }

    fn destroy(&mut self) {
        self.script().calls.push("destroy".to_string());
    }
}

fn descriptor(id: &str) -> MediaDescriptor {
    MediaDescriptor::builder(id, format!("https://example/{}.m3u8", id))
        .format(MediaFormat::Hls)
        .start_position(0.0)
        .build()
        .unwrap()
}

fn ready(duration: f64) -> Result<PreparedMedia, PrepareFailure> {
    Ok(PreparedMedia {
        duration_seconds: Some(duration),
    })
}

fn coordinator() -> (ScriptedPlayer, LocalPlaybackCoordinator<ScriptedPlayer>, Receiver<PlaybackEvent>) {
    let player = ScriptedPlayer::default();
    let mut coordinator = LocalPlaybackCoordinator::new(player.clone()).unwrap();
    let events = coordinator.observe();
    (player, coordinator, events)
}

/// Loads `id` and drives it to `Ready`.
fn load_ready(
    player: &ScriptedPlayer,
    coordinator: &mut LocalPlaybackCoordinator<ScriptedPlayer>,
    id: &str,
    duration: f64,
) -> LoadTicket {
    let ticket = coordinator.load(descriptor(id)).unwrap();
    player.complete(id, ready(duration));
    coordinator.process_pending();
    assert_eq!(coordinator.state(), PlaybackState::Ready);
    ticket
}

fn state_changes(events: &Receiver<PlaybackEvent>) -> Vec<(PlaybackState, PlaybackState)> {
    events
        .try_iter()
        .filter_map(|e| match e {
            PlaybackEvent::StateChanged { from, to } => Some((from, to)),
            _ => None,
        })
        .collect()
}

#[test]
fn test_subscribes_to_ended_and_error() {
    let (player, _coordinator, _events) = coordinator();
    assert_eq!(player.calls(), vec!["subscribe:ended,error"]);
}

#[test]
fn test_sintel_lifecycle() {
    let (player, mut coordinator, events) = coordinator();

    let ticket = coordinator.load(descriptor("sintel")).unwrap();
    assert_eq!(ticket.descriptor_id, "sintel");
    assert_eq!(coordinator.state(), PlaybackState::Preparing);

    player.complete("sintel", ready(888.0));
    coordinator.process_pending();
    assert_eq!(coordinator.state(), PlaybackState::Ready);
    assert_eq!(coordinator.duration_seconds(), Some(888.0));

    coordinator.play().unwrap();
    assert_eq!(coordinator.state(), PlaybackState::Playing);

    coordinator.pause().unwrap();
    assert_eq!(coordinator.state(), PlaybackState::Paused);

    coordinator.teardown();
    assert_eq!(coordinator.state(), PlaybackState::Idle);
    assert!(coordinator.current_descriptor().is_none());

    assert_eq!(
        state_changes(&events),
        vec![
            (PlaybackState::Idle, PlaybackState::Preparing),
            (PlaybackState::Preparing, PlaybackState::Ready),
            (PlaybackState::Ready, PlaybackState::Playing),
            (PlaybackState::Playing, PlaybackState::Paused),
            (PlaybackState::Paused, PlaybackState::Stopping),
            (PlaybackState::Stopping, PlaybackState::Idle),
        ]
    );
}

#[test]
fn test_events_follow_emission_order() {
    let (player, mut coordinator, events) = coordinator();

    let ticket = coordinator.load(descriptor("a")).unwrap();
    player.complete("a", ready(60.0));
    coordinator.process_pending();

    let received: Vec<PlaybackEvent> = events.try_iter().collect();
    assert_eq!(
        received,
        vec![
            PlaybackEvent::StateChanged {
                from: PlaybackState::Idle,
                to: PlaybackState::Preparing,
            },
            PlaybackEvent::LoadStarted {
                ticket: ticket.clone(),
                replaced: None,
            },
            PlaybackEvent::StateChanged {
                from: PlaybackState::Preparing,
                to: PlaybackState::Ready,
            },
            PlaybackEvent::Ready {
                ticket,
                duration_seconds: Some(60.0),
            },
        ]
    );
}

#[test]
fn test_second_load_supersedes_first() {
    let (player, mut coordinator, events) = coordinator();

    coordinator.load(descriptor("d1")).unwrap();
    coordinator.load(descriptor("d2")).unwrap();
    // Ce qui suit le second load ne doit plus parler de d1
    let _ = events.try_iter().count();

    player.complete("d1", ready(30.0));
    coordinator.process_pending();
    assert_eq!(coordinator.state(), PlaybackState::Preparing);

    player.complete("d2", ready(45.0));
    coordinator.process_pending();

    assert_eq!(coordinator.state(), PlaybackState::Ready);
    assert_eq!(coordinator.current_descriptor().map(|d| d.id()), Some("d2"));
    assert_eq!(coordinator.duration_seconds(), Some(45.0));

    let late: Vec<PlaybackEvent> = events.try_iter().collect();
    assert!(!late.is_empty());
    assert!(late.iter().all(|e| e.descriptor_id() != Some("d1")), "{:?}", late);
}

#[test]
fn test_stop_precedes_prepare_on_switch() {
    let (player, mut coordinator, events) = coordinator();
    load_ready(&player, &mut coordinator, "a", 100.0);
    coordinator.play().unwrap();
    let _ = events.try_iter().count();

    let ticket = coordinator.load(descriptor("b")).unwrap();

    let calls = player.calls();
    assert_eq!(
        &calls[calls.len() - 2..],
        &["stop".to_string(), "prepare:b".to_string()]
    );

    // Un seul changement d'état visible pour la bascule
    let received: Vec<PlaybackEvent> = events.try_iter().collect();
    assert_eq!(
        received,
        vec![
            PlaybackEvent::StateChanged {
                from: PlaybackState::Playing,
                to: PlaybackState::Preparing,
            },
            PlaybackEvent::LoadStarted {
                ticket,
                replaced: Some("a".to_string()),
            },
        ]
    );
}

#[test]
fn test_load_from_idle_does_not_stop() {
    let (player, mut coordinator, _events) = coordinator();
    coordinator.load(descriptor("a")).unwrap();
    assert!(!player.calls().contains(&"stop".to_string()));
}

#[test]
fn test_play_from_idle_is_rejected() {
    let (player, mut coordinator, events) = coordinator();

    let err = coordinator.play().unwrap_err();
    assert!(err.is_invalid_state());
    assert_eq!(coordinator.state(), PlaybackState::Idle);
    assert!(events.try_recv().is_err());
    assert!(!player.calls().contains(&"play".to_string()));
}

#[test]
fn test_play_while_preparing_is_rejected() {
    let (_player, mut coordinator, _events) = coordinator();
    coordinator.load(descriptor("a")).unwrap();

    assert!(coordinator.play().unwrap_err().is_invalid_state());
    assert_eq!(coordinator.state(), PlaybackState::Preparing);
}

#[test]
fn test_play_and_pause_are_idempotent() {
    let (player, mut coordinator, _events) = coordinator();
    load_ready(&player, &mut coordinator, "a", 100.0);

    coordinator.pause().unwrap();
    assert_eq!(coordinator.state(), PlaybackState::Ready);

    coordinator.play().unwrap();
    coordinator.play().unwrap();
    assert_eq!(coordinator.state(), PlaybackState::Playing);

    let plays = player.calls().iter().filter(|c| *c == "play").count();
    assert_eq!(plays, 1);
}

#[test]
fn test_seek_clamps_to_media_bounds() {
    let (player, mut coordinator, events) = coordinator();
    load_ready(&player, &mut coordinator, "a", 120.0);
    let _ = events.try_iter().count();

    assert_eq!(coordinator.seek(500.0).unwrap(), 120.0);
    assert_eq!(coordinator.position_seconds(), 120.0);

    assert_eq!(coordinator.seek(-4.0).unwrap(), 0.0);
    assert_eq!(coordinator.position_seconds(), 0.0);

    assert_eq!(coordinator.seek(42.5).unwrap(), 42.5);

    let seeks: Vec<f64> = events
        .try_iter()
        .filter_map(|e| match e {
            PlaybackEvent::Seeked { position_seconds, .. } => Some(position_seconds),
            _ => None,
        })
        .collect();
    assert_eq!(seeks, vec![120.0, 0.0, 42.5]);
}

#[test]
fn test_seek_without_media_is_rejected() {
    let (_player, mut coordinator, _events) = coordinator();
    assert!(coordinator.seek(10.0).unwrap_err().is_invalid_state());
}

#[test]
fn test_prepare_failure_moves_to_failed() {
    let (player, mut coordinator, events) = coordinator();
    coordinator.load(descriptor("broken")).unwrap();

    player.complete("broken", Err(PrepareFailure::Network("timeout".to_string())));
    coordinator.process_pending();

    assert_eq!(coordinator.state(), PlaybackState::Failed);
    let failure = events.try_iter().find_map(|e| match e {
        PlaybackEvent::PrepareFailed { error, .. } => Some(error),
        _ => None,
    });
    assert!(failure.unwrap().to_string().contains("timeout"));

    // Un nouveau load repart de FAILED
    load_ready(&player, &mut coordinator, "fine", 10.0);
}

#[test]
fn test_refused_prepare_is_returned() {
    let (player, mut coordinator, _events) = coordinator();
    player.script().refuse_prepare = true;

    let err = coordinator.load(descriptor("a")).unwrap_err();
    assert!(err.to_string().contains("decoder unavailable"));
    assert_eq!(coordinator.state(), PlaybackState::Failed);
}

#[test]
fn test_stop_failure_during_switch() {
    let (player, mut coordinator, _events) = coordinator();
    load_ready(&player, &mut coordinator, "a", 100.0);
    player.script().fail_stop = true;

    assert!(coordinator.load(descriptor("b")).is_err());
    assert_eq!(coordinator.state(), PlaybackState::Failed);
    assert!(!player.calls().contains(&"prepare:b".to_string()));
}

#[test]
fn test_ended_pauses_at_duration() {
    let (player, mut coordinator, events) = coordinator();
    let ticket = load_ready(&player, &mut coordinator, "a", 90.0);
    coordinator.play().unwrap();
    let _ = events.try_iter().count();

    player.emit(PlayerEvent::Ended { ticket });
    coordinator.process_pending();

    assert_eq!(coordinator.state(), PlaybackState::Paused);
    assert_eq!(coordinator.session().position_seconds, 90.0);
    assert!(events.try_iter().any(|e| e
        == PlaybackEvent::PlaybackEnded {
            descriptor_id: "a".to_string()
        }));
}

#[test]
fn test_events_of_replaced_item_are_dropped() {
    let (player, mut coordinator, events) = coordinator();
    let old = load_ready(&player, &mut coordinator, "a", 90.0);
    coordinator.play().unwrap();

    coordinator.load(descriptor("b")).unwrap();
    let _ = events.try_iter().count();

    player.emit(PlayerEvent::Ended { ticket: old.clone() });
    player.emit(PlayerEvent::Error {
        ticket: old,
        message: "late".to_string(),
    });
    coordinator.process_pending();

    assert_eq!(coordinator.state(), PlaybackState::Preparing);
    assert!(events.try_recv().is_err());
}

#[test]
fn test_runtime_error_keeps_state() {
    let (player, mut coordinator, events) = coordinator();
    let ticket = load_ready(&player, &mut coordinator, "a", 90.0);
    coordinator.play().unwrap();
    let _ = events.try_iter().count();

    player.emit(PlayerEvent::Error {
        ticket,
        message: "decoder hiccup".to_string(),
    });
    coordinator.process_pending();

    assert_eq!(coordinator.state(), PlaybackState::Playing);
    let received: Vec<PlaybackEvent> = events.try_iter().collect();
    assert!(matches!(
        received.as_slice(),
        [PlaybackEvent::PlaybackError { descriptor_id, .. }] if descriptor_id == "a"
    ));
}

#[test]
fn test_teardown_from_idle_is_silent() {
    let (player, mut coordinator, events) = coordinator();
    coordinator.teardown();

    assert!(events.try_recv().is_err());
    assert!(!player.calls().contains(&"stop".to_string()));
}

#[test]
fn test_drop_destroys_engine() {
    let (player, coordinator, _events) = coordinator();
    drop(coordinator);
    assert_eq!(player.calls().last().map(String::as_str), Some("destroy"));
}

#[test]
fn test_position_ticks_only_while_playing() {
    let (player, mut coordinator, events) = coordinator();
    coordinator
        .subscribe_position_ticks(Some(Duration::from_millis(10)))
        .unwrap();
    assert_eq!(coordinator.position_tick_interval(), Some(Duration::from_millis(10)));

    load_ready(&player, &mut coordinator, "a", 300.0);
    std::thread::sleep(Duration::from_millis(50));
    coordinator.process_pending();
    let before_play: Vec<PlaybackEvent> = events.try_iter().collect();
    assert!(!before_play
        .iter()
        .any(|e| matches!(e, PlaybackEvent::PositionTick { .. })));

    player.script().time = 12.0;
    coordinator.play().unwrap();
    std::thread::sleep(Duration::from_millis(50));
    coordinator.process_pending();

    let ticks: Vec<f64> = events
        .try_iter()
        .filter_map(|e| match e {
            PlaybackEvent::PositionTick { position_seconds, .. } => Some(position_seconds),
            _ => None,
        })
        .collect();
    assert!(!ticks.is_empty());
    assert!(ticks.iter().all(|p| *p == 12.0));

    coordinator.unsubscribe_position_ticks();
    assert_eq!(coordinator.position_tick_interval(), None);
}

#[test]
fn test_default_tick_interval() {
    let (_player, mut coordinator, _events) = coordinator();
    coordinator.subscribe_position_ticks(Some(Duration::ZERO)).unwrap();
    assert_eq!(
        coordinator.position_tick_interval(),
        Some(mediacontrol::local::DEFAULT_POSITION_TICK_INTERVAL)
    );
}

// ----------------------------------------------------------------------------
// Simulated engine, callbacks from worker threads
// ----------------------------------------------------------------------------

fn fast_options() -> SimulationOptions {
    SimulationOptions {
        prepare_delay: Duration::from_millis(20),
        request_delay: Duration::from_millis(10),
    }
}

#[test]
fn test_simulated_switch_settles_on_last_load() {
    let engine = SimulatedPlayerEngine::new(&fast_options());
    let mut coordinator = LocalPlaybackCoordinator::new(engine).unwrap();
    let events = coordinator.observe();

    coordinator.load(descriptor("d1")).unwrap();
    coordinator.load(descriptor("d2")).unwrap();
    let _ = events.try_iter().count();

    assert!(coordinator.wait_for_state(PlaybackState::Ready, Duration::from_secs(2)));
    assert_eq!(coordinator.current_descriptor().map(|d| d.id()), Some("d2"));
    assert_eq!(coordinator.engine().stop_count(), 1);

    // Laisse le temps à un éventuel callback tardif
    let deadline = Instant::now() + Duration::from_millis(100);
    while Instant::now() < deadline {
        coordinator.wait_and_process(Duration::from_millis(10));
    }
    assert!(events.try_iter().all(|e| e.descriptor_id() != Some("d1")));
}

#[test]
fn test_simulated_playback_reports_progress() {
    let engine = SimulatedPlayerEngine::new(&fast_options()).with_media_duration(30.0);
    let mut coordinator = LocalPlaybackCoordinator::new(engine).unwrap();
    let events = coordinator.observe();
    coordinator
        .subscribe_position_ticks(Some(Duration::from_millis(20)))
        .unwrap();

    coordinator.load(descriptor("sintel")).unwrap();
    assert!(coordinator.wait_for_state(PlaybackState::Ready, Duration::from_secs(2)));
    assert_eq!(coordinator.duration_seconds(), Some(30.0));
    coordinator.play().unwrap();

    let deadline = Instant::now() + Duration::from_millis(200);
    while Instant::now() < deadline {
        coordinator.wait_and_process(Duration::from_millis(20));
    }
    let ticks = events
        .try_iter()
        .filter(|e| matches!(e, PlaybackEvent::PositionTick { .. }))
        .count();
    assert!(ticks > 0);
    assert!(coordinator.position_seconds() > 0.0);

    coordinator.engine_mut().finish();
    assert!(coordinator.wait_for_state(PlaybackState::Paused, Duration::from_secs(1)));
    assert_eq!(coordinator.session().position_seconds, 30.0);
}

#[test]
fn test_simulated_prepare_failure() {
    let mut engine = SimulatedPlayerEngine::new(&fast_options());
    engine.fail_prepare("drm", PrepareFailure::Drm("no license".to_string()));
    let mut coordinator = LocalPlaybackCoordinator::new(engine).unwrap();

    coordinator.load(descriptor("drm")).unwrap();
    assert!(coordinator.wait_for_state(PlaybackState::Failed, Duration::from_secs(2)));
}
