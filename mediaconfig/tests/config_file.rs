use std::fs;

use mediaconfig::Config;
use tempfile::TempDir;

fn load(dir: &TempDir) -> Config {
    Config::load_config(dir.path().to_str().unwrap()).unwrap()
}

#[test]
fn test_defaults_are_written_to_a_fresh_directory() {
    let dir = TempDir::new().unwrap();
    let config = load(&dir);

    assert_eq!(config.get_cast_application_id().unwrap(), "CC1AD845");
    assert_eq!(config.get_chromecast_host(), None);
    assert_eq!(config.get_chromecast_port(), 8009);
    assert_eq!(config.get_position_tick_interval_ms().unwrap(), 500);
    assert_eq!(config.get_simulated_prepare_delay_ms().unwrap(), 150);
    assert_eq!(config.get_log_min_level().unwrap(), "INFO");
    assert!(config.get_log_enable_console().unwrap());
    assert_eq!(config.get_demo_media().unwrap().len(), 2);

    let saved = fs::read_to_string(dir.path().join("config.yaml")).unwrap();
    assert!(saved.contains("application_id"));
}

#[test]
fn test_user_file_overrides_defaults() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("config.yaml"),
        "Cast:\n  Application_ID: ABCD1234\n  chromecast:\n    host: 192.168.1.20\nplayback:\n  position_tick_interval_ms: 250\n",
    )
    .unwrap();

    let config = load(&dir);
    assert_eq!(config.get_cast_application_id().unwrap(), "ABCD1234");
    assert_eq!(config.get_chromecast_host().as_deref(), Some("192.168.1.20"));
    assert_eq!(config.get_position_tick_interval_ms().unwrap(), 250);
    // Les clés absentes du fichier gardent leur valeur par défaut
    assert_eq!(config.get_chromecast_port(), 8009);
}

#[test]
fn test_setters_persist_values() {
    let dir = TempDir::new().unwrap();
    {
        let config = load(&dir);
        config.set_chromecast_port(8010).unwrap();
        config.set_log_enable_console(false).unwrap();
        config.set_simulated_request_delay_ms(5).unwrap();
    }

    let reloaded = load(&dir);
    assert_eq!(reloaded.get_chromecast_port(), 8010);
    assert!(!reloaded.get_log_enable_console().unwrap());
    assert_eq!(reloaded.get_simulated_request_delay_ms().unwrap(), 5);
}

#[test]
fn test_env_override() {
    let dir = TempDir::new().unwrap();
    std::env::set_var("MEDIASESSION_CONFIG__TESTS__ENV_MARKER", "17");

    let config = load(&dir);
    let value = config.get_value(&["tests", "env_marker"]).unwrap();
    assert_eq!(value.as_u64(), Some(17));

    std::env::remove_var("MEDIASESSION_CONFIG__TESTS__ENV_MARKER");
}

#[test]
fn test_invalid_values_fall_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("config.yaml"),
        "cast:\n  chromecast:\n    port: not-a-port\nplayback:\n  position_tick_interval_ms: [1, 2]\n",
    )
    .unwrap();

    let config = load(&dir);
    assert_eq!(config.get_chromecast_port(), 8009);
    assert_eq!(config.get_position_tick_interval_ms().unwrap(), 500);
}
