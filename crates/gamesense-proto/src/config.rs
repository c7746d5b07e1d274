use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

use super::platform;
use super::protocol::{HandlerOptions, GAME_NAME};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub clock: ClockConfig,
    #[serde(default)]
    pub samplers: SamplerConfig,
}

/// Where and how to reach the GameSense engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fixed `host:port` of the engine.  When unset the address is read from
    /// `core_props` every time a client is created.
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default = "default_core_props")]
    pub core_props: PathBuf,
    #[serde(default = "default_game")]
    pub game: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Local control API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Columns the device shows before a seconds clock starts scrolling.
    #[serde(default = "default_display_width")]
    pub display_width: usize,
}

/// Command overrides for the OS samplers.  A command is split on whitespace;
/// no shell is involved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    #[serde(default)]
    pub volume_command: Option<String>,
    #[serde(default)]
    pub song_command: Option<String>,
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            address: None,
            core_props: default_core_props(),
            game: default_game(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            display_width: default_display_width(),
        }
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            volume_command: None,
            song_command: None,
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

fn default_core_props() -> PathBuf {
    platform::core_props_path()
}

fn default_game() -> String {
    GAME_NAME.to_string()
}

fn default_connect_timeout_ms() -> u64 {
    200
}

fn default_request_timeout_ms() -> u64 {
    500
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8977
}

fn default_display_width() -> usize {
    6
}

fn default_command_timeout_ms() -> u64 {
    250
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

// ── Preferences ───────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum PreferenceError {
    #[error("unknown preference key: {0}")]
    UnknownKey(String),
    #[error("preference {key} expects true or false, got {value:?}")]
    InvalidBool { key: String, value: String },
    #[error("tick rate must be a positive number of milliseconds, got {0:?}")]
    InvalidTickRate(String),
    #[error("preference file is empty")]
    Empty,
    #[error("preference file I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("preference file is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to encode preferences: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// User-facing switches.  Written by the control surface, read by the
/// scheduler on every tick.  Keys keep the names the control panel has
/// always used (`clockPeriodically`, `tickRate`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub clock: bool,
    pub clock_icon: bool,
    pub clock_periodically: bool,
    pub volume: bool,
    pub song_info: bool,
    pub song_icon: bool,
    pub song_info_flip: bool,
    pub clock_show_date: bool,
    pub clock_show_seconds: bool,
    #[serde(rename = "clock12h")]
    pub clock_12h: bool,
    /// Milliseconds between ticks.  Always > 0 once validated.
    pub tick_rate: u64,
    pub language: String,
}

pub const DEFAULT_TICK_RATE_MS: u64 = 100;

impl Default for Preferences {
    fn default() -> Self {
        Self {
            clock: true,
            clock_icon: true,
            clock_periodically: false,
            volume: true,
            song_info: true,
            song_icon: true,
            song_info_flip: false,
            clock_show_date: false,
            clock_show_seconds: false,
            clock_12h: false,
            tick_rate: DEFAULT_TICK_RATE_MS,
            language: "en".to_string(),
        }
    }
}

impl Preferences {
    pub const KEYS: [&'static str; 12] = [
        "clock",
        "clockIcon",
        "clockPeriodically",
        "volume",
        "songInfo",
        "songIcon",
        "songInfoFlip",
        "clockShowDate",
        "clockShowSeconds",
        "clock12h",
        "tickRate",
        "language",
    ];

    pub fn validate(&self) -> Result<(), PreferenceError> {
        if self.tick_rate == 0 {
            return Err(PreferenceError::InvalidTickRate(self.tick_rate.to_string()));
        }
        Ok(())
    }

    pub fn handler_options(&self) -> HandlerOptions {
        HandlerOptions {
            clock_icon: self.clock_icon,
            song_icon: self.song_icon,
            song_flip: self.song_info_flip,
        }
    }

    /// Apply one `key = value` change as typed by a user.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), PreferenceError> {
        let value = value.trim();
        match key {
            "tickRate" => {
                self.tick_rate = parse_tick_rate(value)?;
                return Ok(());
            }
            "language" => {
                self.language = value.to_ascii_lowercase();
                return Ok(());
            }
            _ => {}
        }

        let flag = match key {
            "clock" => &mut self.clock,
            "clockIcon" => &mut self.clock_icon,
            "clockPeriodically" => &mut self.clock_periodically,
            "volume" => &mut self.volume,
            "songInfo" => &mut self.song_info,
            "songIcon" => &mut self.song_icon,
            "songInfoFlip" => &mut self.song_info_flip,
            "clockShowDate" => &mut self.clock_show_date,
            "clockShowSeconds" => &mut self.clock_show_seconds,
            "clock12h" => &mut self.clock_12h,
            _ => return Err(PreferenceError::UnknownKey(key.to_string())),
        };
        *flag = value.parse().map_err(|_| PreferenceError::InvalidBool {
            key: key.to_string(),
            value: value.to_string(),
        })?;
        Ok(())
    }
}

/// Positive integer milliseconds; anything else is rejected here so the
/// scheduler never sees it.
pub fn parse_tick_rate(value: &str) -> Result<u64, PreferenceError> {
    match value.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(ms),
        _ => Err(PreferenceError::InvalidTickRate(value.to_string())),
    }
}

/// File-backed preference store.
///
/// Each holder keeps its own instance on the same path; nothing is shared
/// in memory.  `current()` re-reads the file only when its modification
/// stamp changes, and a file that fails to parse or validate leaves the last
/// good preferences in effect.
pub struct PreferenceStore {
    path: PathBuf,
    current: Preferences,
    stamp: Option<(SystemTime, u64)>,
}

impl PreferenceStore {
    pub fn default_path() -> PathBuf {
        platform::config_dir().join("preferences.toml")
    }

    /// Open the store, writing defaults if the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut store = Self {
            path,
            current: Preferences::default(),
            stamp: None,
        };
        if !store.path.exists() {
            if let Err(e) = write_preferences(&store.path, &store.current) {
                warn!("Could not write default preferences to {:?}: {}", store.path, e);
            }
        }
        store.refresh();
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Latest valid preferences.
    pub fn current(&mut self) -> &Preferences {
        self.refresh();
        &self.current
    }

    /// Validate and persist one change.  Reads the file fresh first so edits
    /// made elsewhere are not lost.
    pub fn update(&mut self, key: &str, value: &str) -> Result<Preferences, PreferenceError> {
        let mut prefs = match read_preferences(&self.path) {
            Ok(p) => p,
            Err(PreferenceError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                self.current.clone()
            }
            Err(PreferenceError::Empty) => self.current.clone(),
            Err(e) => return Err(e),
        };
        prefs.set(key, value)?;
        prefs.validate()?;
        write_preferences(&self.path, &prefs)?;
        info!("Preference {} set to {}", key, value);
        self.current = prefs.clone();
        self.stamp = file_stamp(&self.path);
        Ok(prefs)
    }

    fn refresh(&mut self) {
        let stamp = file_stamp(&self.path);
        if stamp.is_none() || stamp == self.stamp {
            return;
        }
        self.stamp = stamp;
        match read_preferences(&self.path) {
            Ok(prefs) => {
                if prefs != self.current {
                    debug!("Preferences reloaded from {:?}", self.path);
                }
                self.current = prefs;
            }
            Err(e) => {
                warn!(
                    "Ignoring invalid preferences in {:?}: {} (keeping previous values)",
                    self.path, e
                );
            }
        }
    }
}

fn file_stamp(path: &Path) -> Option<(SystemTime, u64)> {
    let meta = std::fs::metadata(path).ok()?;
    Some((meta.modified().ok()?, meta.len()))
}

fn read_preferences(path: &Path) -> Result<Preferences, PreferenceError> {
    let content = std::fs::read_to_string(path)?;
    // A truncated file would otherwise decode as all defaults
    if content.trim().is_empty() {
        return Err(PreferenceError::Empty);
    }
    let prefs: Preferences = toml::from_str(&content)?;
    prefs.validate()?;
    Ok(prefs)
}

fn write_preferences(path: &Path, prefs: &Preferences) -> Result<(), PreferenceError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(prefs)?;

    // Readers must never observe a half-written file
    let tmp_path = path.with_extension("toml.tmp");
    let mut file = std::fs::File::create(&tmp_path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.http.enabled);
        assert_eq!(config.http.bind_address, "127.0.0.1");
        assert_eq!(config.engine.game, "GAMESENSE_ESSENTIALS");
        assert!(config.engine.address.is_none());
        assert!(config.engine.core_props.ends_with("coreProps.json"));
        assert_eq!(config.clock.display_width, 6);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config = toml::from_str("[engine]\naddress = \"127.0.0.1:51248\"\n").unwrap();
        assert_eq!(config.engine.address.as_deref(), Some("127.0.0.1:51248"));
        assert_eq!(config.engine.request_timeout_ms, 500);
        assert_eq!(config.http.port, 8977);
    }

    #[test]
    fn test_preference_keys_use_control_panel_names() {
        let prefs: Preferences =
            toml::from_str("clockPeriodically = true\nclock12h = true\ntickRate = 250\n").unwrap();
        assert!(prefs.clock_periodically);
        assert!(prefs.clock_12h);
        assert_eq!(prefs.tick_rate, 250);
        // Unset keys keep their defaults
        assert!(prefs.song_info);
        assert_eq!(prefs.language, "en");

        let encoded = toml::to_string_pretty(&Preferences::default()).unwrap();
        for key in Preferences::KEYS {
            assert!(encoded.contains(key), "missing {key} in {encoded}");
        }
    }

    #[test]
    fn test_set_validates_values() {
        let mut prefs = Preferences::default();
        prefs.set("songInfo", "false").unwrap();
        assert!(!prefs.song_info);
        prefs.set("tickRate", " 200 ").unwrap();
        assert_eq!(prefs.tick_rate, 200);

        assert!(matches!(
            prefs.set("tickRate", "fast"),
            Err(PreferenceError::InvalidTickRate(_))
        ));
        assert!(matches!(
            prefs.set("tickRate", "0"),
            Err(PreferenceError::InvalidTickRate(_))
        ));
        assert!(matches!(
            prefs.set("tickRate", "-5"),
            Err(PreferenceError::InvalidTickRate(_))
        ));
        assert!(matches!(
            prefs.set("volume", "yes"),
            Err(PreferenceError::InvalidBool { .. })
        ));
        assert!(matches!(
            prefs.set("theme", "dark"),
            Err(PreferenceError::UnknownKey(_))
        ));
        assert_eq!(prefs.tick_rate, 200);
    }

    #[test]
    fn test_store_writes_defaults_and_updates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.toml");
        let mut store = PreferenceStore::open(&path);
        assert!(path.exists());
        assert_eq!(store.current(), &Preferences::default());

        let updated = store.update("tickRate", "40").unwrap();
        assert_eq!(updated.tick_rate, 40);

        let mut other = PreferenceStore::open(&path);
        assert_eq!(other.current().tick_rate, 40);
    }

    #[test]
    fn test_store_keeps_last_good_preferences() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.toml");
        std::fs::write(&path, "tickRate = 300\n").unwrap();
        let mut store = PreferenceStore::open(&path);
        assert_eq!(store.current().tick_rate, 300);

        std::fs::write(&path, "tickRate = 0\nclock = false\n").unwrap();
        assert_eq!(store.current().tick_rate, 300);
        assert!(store.current().clock);

        std::fs::write(&path, "tickRate = \"soon\"\n").unwrap();
        assert_eq!(store.current().tick_rate, 300);
    }

    #[test]
    fn test_truncated_file_keeps_last_good_preferences() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.toml");
        std::fs::write(&path, "tickRate = 250\nclock = false\n").unwrap();
        let mut store = PreferenceStore::open(&path);
        assert_eq!(store.current().tick_rate, 250);

        std::fs::write(&path, "").unwrap();
        assert_eq!(store.current().tick_rate, 250);
        assert!(!store.current().clock);

        std::fs::write(&path, " \n\t\n").unwrap();
        assert_eq!(store.current().tick_rate, 250);
        assert!(matches!(read_preferences(&path), Err(PreferenceError::Empty)));

        // an update over an empty file starts from the values in effect
        let updated = store.update("volume", "false").unwrap();
        assert_eq!(updated.tick_rate, 250);
        assert!(!updated.clock);
    }

    #[test]
    fn test_write_replaces_file_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.toml");
        let mut store = PreferenceStore::open(&path);
        store.update("tickRate", "40").unwrap();
        store.update("clock12h", "true").unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("preferences.toml")]);
        let on_disk = read_preferences(&path).unwrap();
        assert_eq!(on_disk.tick_rate, 40);
        assert!(on_disk.clock_12h);
    }

    #[test]
    fn test_update_rejects_invalid_tick_rate_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.toml");
        let mut store = PreferenceStore::open(&path);
        assert!(store.update("tickRate", "abc").is_err());
        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert!(on_disk.contains("tickRate = 100"));
    }
}
