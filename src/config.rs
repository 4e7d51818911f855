//! Persistent client configuration model and defaults.

use log::warn;

use crate::transport::SUPPORTED_SPEEDS;

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Session backend connection settings.
    pub backend: BackendConfig,
    #[serde(default)]
    /// Poll and animation cadence.
    pub playback: PlaybackConfig,
    #[serde(default)]
    /// Thresholds of the reset-to-zero heuristic.
    pub glitch: GlitchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Session backend connection settings.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct BackendConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Upper bound for `POST /set-mode/session`, reported separately from connection failures.
    #[serde(default = "default_activation_timeout_ms")]
    pub activation_timeout_ms: u64,
    /// Client-side request budget; the backend enforces 60 requests per minute.
    #[serde(default = "default_max_requests_per_minute")]
    pub max_requests_per_minute: u32,
}

/// Poll and animation cadence.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    #[serde(default = "default_speed")]
    pub default_speed: f64,
}

/// A paused reading below `reset_position_ceiling_sec` that follows a playing
/// reading beyond `playing_position_floor_sec` is treated as a glitch.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct GlitchConfig {
    #[serde(default = "default_reset_position_ceiling_sec")]
    pub reset_position_ceiling_sec: f64,
    #[serde(default = "default_playing_position_floor_sec")]
    pub playing_position_floor_sec: f64,
}

#[derive(Debug, Clone, Copy, serde::Deserialize, serde::Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            activation_timeout_ms: default_activation_timeout_ms(),
            max_requests_per_minute: default_max_requests_per_minute(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            frame_interval_ms: default_frame_interval_ms(),
            default_speed: default_speed(),
        }
    }
}

impl Default for GlitchConfig {
    fn default() -> Self {
        Self {
            reset_position_ceiling_sec: default_reset_position_ceiling_sec(),
            playing_position_floor_sec: default_playing_position_floor_sec(),
        }
    }
}

fn default_api_base() -> String {
    "http://localhost:8000".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

fn default_activation_timeout_ms() -> u64 {
    8_000
}

fn default_max_requests_per_minute() -> u32 {
    60
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_frame_interval_ms() -> u64 {
    16
}

fn default_speed() -> f64 {
    1.0
}

fn default_reset_position_ceiling_sec() -> f64 {
    1.0
}

fn default_playing_position_floor_sec() -> f64 {
    5.0
}

/// Clamps loaded values into ranges the controller can run with.
pub fn sanitize_config(config: Config) -> Config {
    let mut config = config;
    let api_base = config.backend.api_base.trim().trim_end_matches('/').to_string();
    config.backend.api_base = if api_base.is_empty() {
        default_api_base()
    } else {
        api_base
    };
    config.backend.connect_timeout_ms = config.backend.connect_timeout_ms.clamp(250, 60_000);
    config.backend.request_timeout_ms = config.backend.request_timeout_ms.clamp(250, 120_000);
    config.backend.activation_timeout_ms =
        config.backend.activation_timeout_ms.clamp(1_000, 60_000);
    config.backend.max_requests_per_minute = config.backend.max_requests_per_minute.clamp(1, 600);
    // Polling faster than the request budget only produces skipped ticks.
    config.playback.poll_interval_ms = config.playback.poll_interval_ms.clamp(250, 60_000);
    config.playback.frame_interval_ms = config.playback.frame_interval_ms.clamp(4, 1_000);
    if !SUPPORTED_SPEEDS.contains(&config.playback.default_speed) {
        warn!(
            "Config: unsupported default_speed {}, falling back to 1.0",
            config.playback.default_speed
        );
        config.playback.default_speed = default_speed();
    }
    if !config.glitch.reset_position_ceiling_sec.is_finite()
        || config.glitch.reset_position_ceiling_sec < 0.0
    {
        config.glitch.reset_position_ceiling_sec = default_reset_position_ceiling_sec();
    }
    if !config.glitch.playing_position_floor_sec.is_finite()
        || config.glitch.playing_position_floor_sec < 0.0
    {
        config.glitch.playing_position_floor_sec = default_playing_position_floor_sec();
    }
    config
}

#[cfg(test)]
mod tests {
    use super::{sanitize_config, Config, LogLevel};

    #[test]
    fn test_default_config_has_expected_values() {
        let config = Config::default();

        assert_eq!(config.backend.api_base, "http://localhost:8000");
        assert_eq!(config.backend.connect_timeout_ms, 5_000);
        assert_eq!(config.backend.request_timeout_ms, 15_000);
        assert_eq!(config.backend.activation_timeout_ms, 8_000);
        assert_eq!(config.backend.max_requests_per_minute, 60);
        assert_eq!(config.playback.poll_interval_ms, 2_000);
        assert_eq!(config.playback.frame_interval_ms, 16);
        assert!((config.playback.default_speed - 1.0).abs() < f64::EPSILON);
        assert!((config.glitch.reset_position_ceiling_sec - 1.0).abs() < f64::EPSILON);
        assert!((config.glitch.playing_position_floor_sec - 5.0).abs() < f64::EPSILON);
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_partial_config_fills_missing_sections_with_defaults() {
        let partial = r#"
[backend]
api_base = "https://api.example.org/"

[playback]
poll_interval_ms = 3000
"#;
        let config: Config = toml::from_str(partial).expect("partial config should parse");

        assert_eq!(config.backend.api_base, "https://api.example.org/");
        assert_eq!(config.backend.activation_timeout_ms, 8_000);
        assert_eq!(config.playback.poll_interval_ms, 3_000);
        assert_eq!(config.playback.frame_interval_ms, 16);
        assert_eq!(config.glitch, super::GlitchConfig::default());
    }

    #[test]
    fn test_sanitize_config_trims_base_url_and_clamps_intervals() {
        let mut config = Config::default();
        config.backend.api_base = " https://api.example.org/ ".to_string();
        config.playback.poll_interval_ms = 10;
        config.playback.frame_interval_ms = 0;
        config.playback.default_speed = 3.0;
        config.backend.max_requests_per_minute = 0;

        let sanitized = sanitize_config(config);

        assert_eq!(sanitized.backend.api_base, "https://api.example.org");
        assert_eq!(sanitized.playback.poll_interval_ms, 250);
        assert_eq!(sanitized.playback.frame_interval_ms, 4);
        assert!((sanitized.playback.default_speed - 1.0).abs() < f64::EPSILON);
        assert_eq!(sanitized.backend.max_requests_per_minute, 1);
    }

    #[test]
    fn test_log_level_parses_snake_case() {
        let config: Config = toml::from_str("[logging]\nlevel = \"debug\"\n")
            .expect("logging section should parse");
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.level.to_filter(), log::LevelFilter::Debug);
    }
}
