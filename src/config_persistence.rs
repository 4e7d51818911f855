//! Loading and first-run creation of `config.toml`.

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::config::{sanitize_config, Config};

const CONFIG_DIR_NAME: &str = "brainreplay";
const CONFIG_FILE_NAME: &str = "config.toml";
/// Overrides `backend.api_base` without touching the file.
pub const API_BASE_ENV_VAR: &str = "BRAINREPLAY_API_BASE";

/// Default location of the config file under the platform config directory.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(CONFIG_DIR_NAME)
        .join(CONFIG_FILE_NAME)
}

/// Reads the config at `path`, writing defaults first when it does not exist.
///
/// A file that fails to parse is reported and replaced by defaults in memory;
/// it is never overwritten.
pub fn load_or_create_config(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        info!(
            "Config file not found. Creating default config. path={}",
            path.display()
        );
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| format!("failed to create config dir {}: {err}", parent.display()))?;
        }
        let default_text = toml::to_string(&Config::default())
            .map_err(|err| format!("failed to serialize default config: {err}"))?;
        std::fs::write(path, default_text)
            .map_err(|err| format!("failed to write default config {}: {err}", path.display()))?;
    }

    let content = std::fs::read_to_string(path)
        .map_err(|err| format!("failed to read config {}: {err}", path.display()))?;
    let config = match toml::from_str::<Config>(&content) {
        Ok(config) => config,
        Err(err) => {
            warn!(
                "Config file {} is invalid, using defaults: {}",
                path.display(),
                err
            );
            Config::default()
        }
    };
    Ok(sanitize_config(config))
}

/// Applies environment overrides on top of a loaded config.
pub fn apply_env_overrides(config: Config, api_base_override: Option<String>) -> Config {
    let mut config = config;
    if let Some(api_base) = api_base_override.filter(|value| !value.trim().is_empty()) {
        info!("Using {} override: {}", API_BASE_ENV_VAR, api_base.trim());
        config.backend.api_base = api_base;
    }
    sanitize_config(config)
}

#[cfg(test)]
mod tests {
    use super::{apply_env_overrides, load_or_create_config};
    use crate::config::Config;

    #[test]
    fn test_missing_config_is_created_with_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("config.toml");

        let config = load_or_create_config(&path).expect("config should load");

        assert!(path.exists());
        assert_eq!(config, Config::default());
        let written = std::fs::read_to_string(&path).expect("written config");
        assert!(written.contains("poll_interval_ms = 2000"));
    }

    #[test]
    fn test_existing_config_is_loaded_and_sanitized() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[backend]\napi_base = \"https://api.example.org/\"\n[playback]\ndefault_speed = 2.0\n",
        )
        .expect("write config");

        let config = load_or_create_config(&path).expect("config should load");

        assert_eq!(config.backend.api_base, "https://api.example.org");
        assert!((config.playback.default_speed - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_invalid_config_falls_back_to_defaults_without_overwriting() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[backend\nbroken").expect("write config");

        let config = load_or_create_config(&path).expect("invalid config is not fatal");

        assert_eq!(config, Config::default());
        let content = std::fs::read_to_string(&path).expect("read config");
        assert_eq!(content, "[backend\nbroken");
    }

    #[test]
    fn test_env_override_replaces_api_base() {
        let config = apply_env_overrides(
            Config::default(),
            Some("http://10.0.0.2:9000/".to_string()),
        );
        assert_eq!(config.backend.api_base, "http://10.0.0.2:9000");

        let untouched = apply_env_overrides(Config::default(), Some("  ".to_string()));
        assert_eq!(untouched.backend.api_base, "http://localhost:8000");
    }
}
