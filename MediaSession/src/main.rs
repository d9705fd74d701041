use std::env;
use std::process;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use mediaconfig::{Config, get_config};
use mediacontrol::time_utils::{format_progress, parse_playhead};
use mediacontrol::{
    CastEngine, ControlConfigExt, EnqueueMode, LocalPlaybackCoordinator, MediaDescriptor,
    PlaybackEvent, PlaybackState, RemoteEvent, RemoteSessionCoordinator, RemoteState,
    SimulatedCastEngine, SimulatedPlayerEngine,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const STEP_TIMEOUT: Duration = Duration::from_secs(10);

struct AppOptions {
    local: bool,
    remote: bool,
    chromecast: bool,
    play_for: Duration,
    seek_to: Option<f64>,
}

fn main() -> Result<()> {
    let config = get_config();
    init_tracing(&config);

    let options = resolve_options()?;
    info!(config = config.file_path(), "MediaSession démarré");

    let descriptors = config.demo_descriptors()?;
    let [first, second, ..] = descriptors.as_slice() else {
        bail!("demo.media doit contenir au moins deux entrées");
    };

    if options.local {
        run_local(&config, &options, first, second)?;
    }

    if options.remote {
        let application_id = config.cast_application_id()?;
        if options.chromecast {
            run_chromecast(&config, &application_id, first, second)?;
        } else {
            let engine = SimulatedCastEngine::new(&config.simulation_options()?);
            run_remote(engine, &application_id, first, second)?;
        }
    }

    info!("Au revoir !");
    Ok(())
}

fn init_tracing(config: &Config) {
    if !config.get_log_enable_console().unwrap_or(true) {
        return;
    }
    let level = config
        .get_log_min_level()
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase();
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init();
}

fn resolve_options() -> Result<AppOptions> {
    let mut options = AppOptions {
        local: true,
        remote: true,
        chromecast: false,
        play_for: Duration::from_secs(2),
        seek_to: None,
    };

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--local-only" => options.remote = false,
            "--remote-only" => options.local = false,
            "--chromecast" => options.chromecast = true,
            "--play-ms" => {
                let value = args
                    .next()
                    .ok_or_else(|| anyhow!("--play-ms requiert une valeur"))?;
                let millis: u64 = value
                    .parse()
                    .with_context(|| format!("Valeur invalide pour --play-ms: {value}"))?;
                options.play_for = Duration::from_millis(millis);
            }
            "--seek" => {
                let value = args
                    .next()
                    .ok_or_else(|| anyhow!("--seek requiert une valeur"))?;
                options.seek_to = Some(parse_playhead(&value)?);
            }
            "--help" | "-h" => {
                print_usage();
                process::exit(0);
            }
            other => bail!("Argument inconnu: {other}. Utilise --help pour l'aide."),
        }
    }
    Ok(options)
}

fn print_usage() {
    println!("Usage: MediaSession [options]");
    println!("  --local-only        only run the local playback scenario");
    println!("  --remote-only       only run the cast scenario");
    println!("  --chromecast        cast to cast.chromecast.host instead of the simulated receiver");
    println!("  --play-ms <ms>      how long each item plays (default 2000)");
    println!("  --seek <HH:MM:SS>   seek the first item before switching");
}

// ============================================================================
// Local playback
// ============================================================================

fn run_local(
    config: &Config,
    options: &AppOptions,
    first: &MediaDescriptor,
    second: &MediaDescriptor,
) -> Result<()> {
    info!("📺 Local playback scenario");

    let engine = SimulatedPlayerEngine::new(&config.simulation_options()?);
    let mut player = LocalPlaybackCoordinator::with_options(engine, config.local_playback_options()?)?;
    player.set_observer(Box::new(log_playback_event));
    player.subscribe_position_ticks(None)?;

    player.load(first.clone())?;
    wait_for_local(&mut player, PlaybackState::Ready)?;
    player.play()?;
    pump_local(&mut player, options.play_for);

    if let Some(target) = options.seek_to {
        let effective = player.seek(target)?;
        info!(requested = target, effective, "Seek");
    }

    // Bascule vers le second média sans passer par teardown
    player.load(second.clone())?;
    wait_for_local(&mut player, PlaybackState::Ready)?;
    player.play()?;
    pump_local(&mut player, options.play_for);

    player.pause()?;
    info!(
        progress = %format_progress(player.position_seconds(), player.duration_seconds()),
        "Paused"
    );

    player.teardown();
    Ok(())
}

fn wait_for_local(
    player: &mut LocalPlaybackCoordinator<SimulatedPlayerEngine>,
    state: PlaybackState,
) -> Result<()> {
    if player.wait_for_state(state, STEP_TIMEOUT) {
        return Ok(());
    }
    bail!("player still {} after {:?}, expected {}", player.state(), STEP_TIMEOUT, state)
}

fn pump_local(player: &mut LocalPlaybackCoordinator<SimulatedPlayerEngine>, period: Duration) {
    let deadline = Instant::now() + period;
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        if left.is_zero() {
            break;
        }
        player.wait_and_process(left);
    }
}

fn log_playback_event(event: &PlaybackEvent) {
    match event {
        PlaybackEvent::StateChanged { from, to } => info!(%from, %to, "Player state"),
        PlaybackEvent::LoadStarted { ticket, replaced } => {
            info!(%ticket, replaced = ?replaced, "Load started")
        }
        PlaybackEvent::Ready {
            ticket,
            duration_seconds,
        } => info!(
            %ticket,
            duration = %format_progress(0.0, *duration_seconds),
            "Ready"
        ),
        PlaybackEvent::PrepareFailed { ticket, error } => warn!(%ticket, %error, "Prepare failed"),
        PlaybackEvent::PositionTick {
            descriptor_id,
            position_seconds,
            duration_seconds,
        } => info!(
            descriptor = %descriptor_id,
            progress = %format_progress(*position_seconds, *duration_seconds),
            "Position"
        ),
        PlaybackEvent::PlaybackError { descriptor_id, error } => {
            warn!(descriptor = %descriptor_id, %error, "Playback error")
        }
        other => info!(event = ?other, "Player event"),
    }
}

// ============================================================================
// Remote session
// ============================================================================

#[cfg(feature = "chromecast")]
fn run_chromecast(
    config: &Config,
    application_id: &str,
    first: &MediaDescriptor,
    second: &MediaDescriptor,
) -> Result<()> {
    let engine = mediacontrol::ChromecastEngine::new(config.chromecast_options()?);
    run_remote(engine, application_id, first, second)
}

#[cfg(not(feature = "chromecast"))]
fn run_chromecast(
    _config: &Config,
    _application_id: &str,
    _first: &MediaDescriptor,
    _second: &MediaDescriptor,
) -> Result<()> {
    bail!("MediaSession was built without the `chromecast` feature")
}

fn run_remote<C: CastEngine>(
    engine: C,
    application_id: &str,
    first: &MediaDescriptor,
    second: &MediaDescriptor,
) -> Result<()> {
    info!("📡 Cast scenario");

    let mut cast = RemoteSessionCoordinator::new(engine);
    cast.set_observer(Box::new(|event: &RemoteEvent| match event {
        RemoteEvent::StateChanged { from, to } => info!(%from, %to, "Remote state"),
        RemoteEvent::QueueChanged(snapshot) => info!(queue = ?snapshot.ids(), "Remote queue"),
        RemoteEvent::RequestFailed { request, error, .. } => {
            warn!(%request, %error, "Queue request failed")
        }
        other => info!(event = ?other, "Remote event"),
    }));

    cast.connect(application_id)?;
    if !cast.wait_for_state(RemoteState::Connected, STEP_TIMEOUT) {
        bail!("cast session not connected after {:?}", STEP_TIMEOUT);
    }

    cast.load_or_append(first.clone(), EnqueueMode::Replace)?;
    if !cast.wait_for_requests(STEP_TIMEOUT) {
        warn!("replace still pending");
    }

    cast.load_or_append(second.clone(), EnqueueMode::Append)?;
    if !cast.wait_for_requests(STEP_TIMEOUT) {
        warn!("append still pending");
    }

    info!(
        state = %cast.remote_state(),
        queue = ?cast.queue().snapshot().ids(),
        active = ?cast.active_index(),
        "Remote session"
    );

    cast.disconnect();
    Ok(())
}
