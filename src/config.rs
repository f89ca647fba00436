//! Application-level configuration loading, including the per-language topic pools.

use std::{collections::HashMap, env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "WORD_PARTY_BACK_CONFIG_PATH";
/// Topic pool used when a room requests an unknown language.
const FALLBACK_LANGUAGE: &str = "ar";

/// Minimum players required before the host may start, unless configured.
const DEFAULT_MIN_PLAYERS: usize = 2;
/// Pause between a round's results and the next round, in seconds.
const DEFAULT_ROUND_ADVANCE_DELAY_SECS: u64 = 5;
/// How long an ended room stays joinable for a rematch, in seconds.
const DEFAULT_ENDED_ROOM_RETENTION_SECS: u64 = 60;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    topics: HashMap<String, Vec<String>>,
    min_players: usize,
    round_advance_delay: Duration,
    ended_room_retention: Duration,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to the
    /// baked-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        languages = config.topics.len(),
                        "loaded topic pools from config"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Topic pool for `language`, falling back to the default language when
    /// the requested pool is missing or empty.
    pub fn topics_for(&self, language: &str) -> Vec<String> {
        self.topics
            .get(language)
            .filter(|pool| !pool.is_empty())
            .or_else(|| self.topics.get(FALLBACK_LANGUAGE))
            .cloned()
            .unwrap_or_else(|| default_topics_ar())
    }

    /// Minimum number of joined players required for a start to succeed.
    pub fn min_players(&self) -> usize {
        self.min_players
    }

    /// Pause between a round's results and the next round starting.
    pub fn round_advance_delay(&self) -> Duration {
        self.round_advance_delay
    }

    /// How long an ended room stays in the registry for a rematch join.
    pub fn ended_room_retention(&self) -> Duration {
        self.ended_room_retention
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            topics: default_topics(),
            min_players: DEFAULT_MIN_PLAYERS,
            round_advance_delay: Duration::from_secs(DEFAULT_ROUND_ADVANCE_DELAY_SECS),
            ended_room_retention: Duration::from_secs(DEFAULT_ENDED_ROOM_RETENTION_SECS),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    topics: HashMap<String, Vec<String>>,
    min_players: Option<usize>,
    round_advance_delay_secs: Option<u64>,
    ended_room_retention_secs: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = AppConfig::default();
        let topics = if raw.topics.is_empty() {
            defaults.topics
        } else {
            raw.topics
        };

        Self {
            topics,
            min_players: raw.min_players.unwrap_or(defaults.min_players).max(1),
            round_advance_delay: raw
                .round_advance_delay_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.round_advance_delay),
            ended_room_retention: raw
                .ended_room_retention_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.ended_room_retention),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in topic pools shipped with the binary.
fn default_topics() -> HashMap<String, Vec<String>> {
    HashMap::from([
        ("ar".to_string(), default_topics_ar()),
        ("en".to_string(), default_topics_en()),
    ])
}

fn default_topics_ar() -> Vec<String> {
    ["حيوانات", "طعام", "رياضة", "مدن", "مهن", "ألوان", "أفلام", "مشاهير"]
        .map(str::to_string)
        .to_vec()
}

fn default_topics_en() -> Vec<String> {
    [
        "animals",
        "food",
        "sports",
        "cities",
        "professions",
        "colors",
        "movies",
        "celebrities",
    ]
    .map(str::to_string)
    .to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_language_falls_back_to_the_default_pool() {
        let config = AppConfig::default();
        assert_eq!(config.topics_for("xx"), config.topics_for("ar"));
    }

    #[test]
    fn known_language_uses_its_own_pool() {
        let config = AppConfig::default();
        assert!(config.topics_for("en").contains(&"animals".to_string()));
    }

    #[test]
    fn raw_config_zero_minimum_is_clamped_to_one() {
        let raw = RawConfig {
            topics: HashMap::new(),
            min_players: Some(0),
            round_advance_delay_secs: None,
            ended_room_retention_secs: None,
        };
        let config: AppConfig = raw.into();
        assert_eq!(config.min_players(), 1);
    }
}
