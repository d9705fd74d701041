//! # MediaSession configuration
//!
//! YAML configuration for the media session workspace:
//! - embedded defaults (`mediasession.yaml`) merged with `config.yaml`
//! - keys lower-cased on load
//! - environment overrides `MEDIASESSION_CONFIG__SECTION__KEY=value`
//! - typed getters and setters, every setter saves the file
//!
//! ```no_run
//! use mediaconfig::get_config;
//!
//! let config = get_config();
//! let app_id = config.get_cast_application_id()?;
//! config.set_position_tick_interval_ms(250)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Result};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::{info, warn};

const DEFAULT_CONFIG: &str = include_str!("mediasession.yaml");

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load_config("").expect("Failed to load MediaSession configuration"));
}

const ENV_CONFIG_DIR: &str = "MEDIASESSION_CONFIG";
const ENV_PREFIX: &str = "MEDIASESSION_CONFIG__";
const CONFIG_DIR_NAME: &str = ".mediasession";

const DEFAULT_CAST_APPLICATION_ID: &str = "CC1AD845";
const DEFAULT_CHROMECAST_PORT: u16 = 8009;
const DEFAULT_STATUS_POLL_INTERVAL_MS: usize = 500;
const DEFAULT_POSITION_TICK_INTERVAL_MS: usize = 500;
const DEFAULT_PREPARE_DELAY_MS: usize = 150;
const DEFAULT_REQUEST_DELAY_MS: usize = 100;
const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";
const DEFAULT_LOG_ENABLE_CONSOLE: bool = true;

macro_rules! impl_usize_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<usize> {
            match self.get_value($path) {
                Ok(Value::Number(n)) => Ok(n.as_u64().map(|v| v as usize).unwrap_or($default)),
                Ok(Value::String(s)) => Ok(s.trim().parse().unwrap_or($default)),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: usize) -> Result<()> {
            self.set_value($path, Value::Number(Number::from(value as u64)))
        }
    };
}

macro_rules! impl_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<bool> {
            match self.get_value($path) {
                Ok(Value::Bool(b)) => Ok(b),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
}

/// One entry of the `demo.media` list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaEntry {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub image: Option<ImageEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageEntry {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

/// Configuration manager.
///
/// Values live in a YAML tree behind a mutex; the tree is written back to
/// `config.yaml` after every change.
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        let data = self.data().clone();
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(data),
        }
    }
}

impl Config {
    /// Search order: `directory`, `$MEDIASESSION_CONFIG`, `./.mediasession`,
    /// `~/.mediasession`.
    fn find_config_dir(directory: &str) -> String {
        if !directory.is_empty() {
            return directory.to_string();
        }

        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return env_path;
        }

        if Path::new(CONFIG_DIR_NAME).exists() {
            return CONFIG_DIR_NAME.to_string();
        }

        if let Some(home) = home_dir() {
            let home_config = home.join(CONFIG_DIR_NAME);
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        CONFIG_DIR_NAME.to_string()
    }

    /// Creates the directory if needed and checks it is readable and writable.
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!("{} is not a directory", path.display()));
        }

        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;
        fs::read_dir(path)?;

        Ok(())
    }

    /// Resolves and validates the configuration directory.
    pub fn config_dir(directory: &str) -> Result<String> {
        let dir_path = Self::find_config_dir(directory);
        Self::validate_config_dir(Path::new(&dir_path))?;
        Ok(dir_path)
    }

    /// Loads `config.yaml` from `directory` (or the search path when empty),
    /// merges it over the embedded defaults, applies the environment
    /// overrides and saves the result.
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::config_dir(directory)?;
        info!(config_dir = %config_dir, "Using config directory");

        let path = Path::new(&config_dir)
            .join("config.yaml")
            .to_string_lossy()
            .to_string();

        let mut config_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        match fs::read(&path) {
            Ok(data) => {
                info!(config_file = %path, "Loaded config file");
                let external: Value = serde_yaml::from_slice(&data)?;
                merge_yaml(&mut config_value, &Self::lower_keys_value(external));
            }
            Err(_) => {
                info!(config_file = %path, "Config file not found, using default embedded config");
            }
        }

        let mut config_value = Self::lower_keys_value(config_value);
        Self::apply_env_overrides(&mut config_value);

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
        };

        config.save()?;
        Ok(config)
    }

    pub fn directory(&self) -> &str {
        &self.config_dir
    }

    pub fn file_path(&self) -> &str {
        &self.path
    }

    fn data(&self) -> MutexGuard<'_, Value> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn save(&self) -> Result<()> {
        let yaml = serde_yaml::to_string(&*self.data())?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Sets the value at `path` (e.g. `&["cast", "application_id"]`) and saves.
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        {
            let mut data = self.data();
            Self::set_value_internal(&mut data, path, value)?;
        }
        self.save()
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        let Some((first, rest)) = path.split_first() else {
            *data = value;
            return Ok(());
        };

        let Value::Mapping(map) = data else {
            return Err(anyhow!("Current node is not a map"));
        };

        let key = Value::String(first.to_lowercase());
        if rest.is_empty() {
            map.insert(key, value);
        } else {
            let entry = map.entry(key).or_insert(Value::Mapping(Mapping::new()));
            Self::set_value_internal(entry, rest, value)?;
        }
        Ok(())
    }

    /// Returns the value at `path`, or an error when the path is missing.
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data();
        Self::get_value_internal(&data, path)
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            let Value::Mapping(map) = current else {
                return Err(anyhow!("Path {} is not a map", path[..i].join(".")));
            };
            current = map
                .get(&Value::String(key.to_lowercase()))
                .ok_or_else(|| anyhow!("Path {} does not exist", path[..=i].join(".")))?;
        }
        Ok(current.clone())
    }

    fn apply_env_overrides(config: &mut Value) {
        for (key, value) in env::vars() {
            let Some(suffix) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let key_path: Vec<&str> = suffix.split("__").collect();
            if let Err(err) = Self::set_value_internal(config, &key_path, Self::convert_env_value(&value)) {
                warn!(variable = %key, error = %err, "Ignoring environment override");
            }
        }
    }

    fn convert_env_value(value: &str) -> Value {
        serde_yaml::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => Value::Mapping(
                map.into_iter()
                    .map(|(k, v)| {
                        let k = match k {
                            Value::String(s) => Value::String(s.to_lowercase()),
                            other => other,
                        };
                        (k, Self::lower_keys_value(v))
                    })
                    .collect(),
            ),
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    // ------------------------------------------------------------------
    // Cast
    // ------------------------------------------------------------------

    pub fn get_cast_application_id(&self) -> Result<String> {
        match self.get_value(&["cast", "application_id"]) {
            Ok(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            _ => Ok(DEFAULT_CAST_APPLICATION_ID.to_string()),
        }
    }

    pub fn set_cast_application_id(&self, application_id: &str) -> Result<()> {
        self.set_value(
            &["cast", "application_id"],
            Value::String(application_id.to_string()),
        )
    }

    /// Chromecast host, `None` when not configured.
    pub fn get_chromecast_host(&self) -> Option<String> {
        match self.get_value(&["cast", "chromecast", "host"]) {
            Ok(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        }
    }

    pub fn set_chromecast_host(&self, host: &str) -> Result<()> {
        self.set_value(&["cast", "chromecast", "host"], Value::String(host.to_string()))
    }

    pub fn get_chromecast_port(&self) -> u16 {
        match self.get_value(&["cast", "chromecast", "port"]) {
            Ok(Value::Number(n)) => match n.as_u64().and_then(|p| u16::try_from(p).ok()) {
                Some(port) => port,
                None => {
                    warn!("Invalid Chromecast port '{}', using default {}", n, DEFAULT_CHROMECAST_PORT);
                    DEFAULT_CHROMECAST_PORT
                }
            },
            Ok(Value::String(s)) => s.trim().parse().unwrap_or_else(|_| {
                warn!("Invalid Chromecast port '{}', using default {}", s, DEFAULT_CHROMECAST_PORT);
                DEFAULT_CHROMECAST_PORT
            }),
            _ => DEFAULT_CHROMECAST_PORT,
        }
    }

    pub fn set_chromecast_port(&self, port: u16) -> Result<()> {
        self.set_value(&["cast", "chromecast", "port"], Value::Number(Number::from(port)))
    }

    impl_usize_config!(
        get_chromecast_status_poll_interval_ms,
        set_chromecast_status_poll_interval_ms,
        &["cast", "chromecast", "status_poll_interval_ms"],
        DEFAULT_STATUS_POLL_INTERVAL_MS
    );

    // ------------------------------------------------------------------
    // Playback
    // ------------------------------------------------------------------

    impl_usize_config!(
        get_position_tick_interval_ms,
        set_position_tick_interval_ms,
        &["playback", "position_tick_interval_ms"],
        DEFAULT_POSITION_TICK_INTERVAL_MS
    );

    impl_usize_config!(
        get_simulated_prepare_delay_ms,
        set_simulated_prepare_delay_ms,
        &["playback", "simulated", "prepare_delay_ms"],
        DEFAULT_PREPARE_DELAY_MS
    );

    impl_usize_config!(
        get_simulated_request_delay_ms,
        set_simulated_request_delay_ms,
        &["playback", "simulated", "request_delay_ms"],
        DEFAULT_REQUEST_DELAY_MS
    );

    /// Media list played by the demo binary.
    pub fn get_demo_media(&self) -> Result<Vec<MediaEntry>> {
        match self.get_value(&["demo", "media"]) {
            Ok(value @ Value::Sequence(_)) => Ok(serde_yaml::from_value(value)?),
            Ok(_) => Err(anyhow!("demo.media must be a list")),
            Err(_) => Ok(Vec::new()),
        }
    }

    // ------------------------------------------------------------------
    // Logger
    // ------------------------------------------------------------------

    impl_bool_config!(
        get_log_enable_console,
        set_log_enable_console,
        &["logger", "enable_console"],
        DEFAULT_LOG_ENABLE_CONSOLE
    );

    pub fn get_log_min_level(&self) -> Result<String> {
        match self.get_value(&["logger", "min_level"]) {
            Ok(Value::String(s)) => Ok(s),
            _ => Ok(DEFAULT_LOG_MIN_LEVEL.to_string()),
        }
    }

    pub fn set_log_min_level(&self, level: String) -> Result<()> {
        self.set_value(&["logger", "min_level"], Value::String(level))
    }
}

/// Returns the global configuration, loaded on first access.
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

/// Recursively merges `external` into `default`.
///
/// Mappings are merged key by key; scalars and sequences are replaced.
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_yaml_replaces_scalars_and_keeps_defaults() {
        let mut default: Value = serde_yaml::from_str("a: 1\nb:\n  c: 2\n  d: 3\n").unwrap();
        let external: Value = serde_yaml::from_str("b:\n  c: 20\ne: x\n").unwrap();
        merge_yaml(&mut default, &external);

        assert_eq!(Config::get_value_internal(&default, &["a"]).unwrap(), Value::from(1));
        assert_eq!(Config::get_value_internal(&default, &["b", "c"]).unwrap(), Value::from(20));
        assert_eq!(Config::get_value_internal(&default, &["b", "d"]).unwrap(), Value::from(3));
        assert_eq!(Config::get_value_internal(&default, &["e"]).unwrap(), Value::from("x"));
    }

    #[test]
    fn test_lower_keys_value() {
        let value: Value = serde_yaml::from_str("Cast:\n  Application_ID: X\n").unwrap();
        let lowered = Config::lower_keys_value(value);
        assert_eq!(
            Config::get_value_internal(&lowered, &["cast", "application_id"]).unwrap(),
            Value::from("X")
        );
    }

    #[test]
    fn test_set_value_internal_creates_maps() {
        let mut value = Value::Mapping(Mapping::new());
        Config::set_value_internal(&mut value, &["A", "b"], Value::from(true)).unwrap();
        assert_eq!(Config::get_value_internal(&value, &["a", "B"]).unwrap(), Value::from(true));

        let mut scalar = Value::from(3);
        assert!(Config::set_value_internal(&mut scalar, &["x"], Value::from(1)).is_err());
    }

    #[test]
    fn test_convert_env_value() {
        assert_eq!(Config::convert_env_value("42"), Value::from(42));
        assert_eq!(Config::convert_env_value("true"), Value::from(true));
        assert_eq!(Config::convert_env_value("CC1AD845"), Value::from("CC1AD845"));
    }

    #[test]
    fn test_embedded_defaults_parse() {
        let value: Value = serde_yaml::from_str(DEFAULT_CONFIG).unwrap();
        let media = Config::get_value_internal(&value, &["demo", "media"]).unwrap();
        let entries: Vec<MediaEntry> = serde_yaml::from_value(media).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "sintel");
        assert_eq!(entries[1].image.as_ref().map(|i| i.width), Some(780));
    }
}
