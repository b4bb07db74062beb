//! Application-level configuration loading: runtime environment, coaching and live session knobs.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "SABRE_LOGGER_CONFIG_PATH";

const DEFAULT_COACH_MODEL: &str = "gpt-4o-mini";
const DEFAULT_COACH_TEMPERATURE: f32 = 0.7;
const DEFAULT_COACH_MAX_POINTS: usize = 100;
const DEFAULT_COACH_MAX_MATCHES: usize = 10;
const DEFAULT_INDICATOR_CLEAR_MS: u64 = 3000;

/// Deployment flavour; diagnostic details are only exposed outside production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    /// Local development: error payloads carry diagnostic details.
    Development,
    /// Production: error payloads only carry the message.
    #[default]
    Production,
}

/// Settings of the AI coaching summary.
#[derive(Debug, Clone, PartialEq)]
pub struct CoachSettings {
    /// Completion model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum number of points sent to the completion service.
    pub max_points: usize,
    /// Number of most recent matches the points are drawn from.
    pub max_matches: usize,
}

impl Default for CoachSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_COACH_MODEL.to_owned(),
            temperature: DEFAULT_COACH_TEMPERATURE,
            max_points: DEFAULT_COACH_MAX_POINTS,
            max_matches: DEFAULT_COACH_MAX_MATCHES,
        }
    }
}

/// Settings of live match sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Delay after which the "last scored" indicator clears itself.
    pub indicator_clear_after: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            indicator_clear_after: Duration::from_millis(DEFAULT_INDICATOR_CLEAR_MS),
        }
    }
}

#[derive(Debug, Clone, Default)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Deployment flavour.
    pub environment: Environment,
    /// Coaching summary settings.
    pub coach: CoachSettings,
    /// Live session settings.
    pub session: SessionSettings,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        environment = ?app_config.environment,
                        model = %app_config.coach.model,
                        "loaded configuration"
                    );
                    app_config
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

    /// Parse a configuration document. Missing sections keep their defaults.
    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }

    /// Whether error payloads may carry diagnostic details.
    pub fn exposes_details(&self) -> bool {
        self.environment == Environment::Development
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    environment: Environment,
    coach: RawCoach,
    session: RawSession,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawCoach {
    model: Option<String>,
    temperature: Option<f32>,
    max_points: Option<usize>,
    max_matches: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawSession {
    indicator_clear_ms: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let coach_defaults = CoachSettings::default();
        let coach = CoachSettings {
            model: value
                .coach
                .model
                .filter(|model| !model.trim().is_empty())
                .unwrap_or(coach_defaults.model),
            temperature: value
                .coach
                .temperature
                .unwrap_or(coach_defaults.temperature),
            max_points: value
                .coach
                .max_points
                .filter(|max| *max > 0)
                .unwrap_or(coach_defaults.max_points),
            max_matches: value
                .coach
                .max_matches
                .filter(|max| *max > 0)
                .unwrap_or(coach_defaults.max_matches),
        };
        let session = SessionSettings {
            indicator_clear_after: Duration::from_millis(
                value
                    .session
                    .indicator_clear_ms
                    .unwrap_or(DEFAULT_INDICATOR_CLEAR_MS),
            ),
        };

        Self {
            environment: value.environment,
            coach,
            session,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = AppConfig::from_json("{}").unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.coach, CoachSettings::default());
        assert_eq!(config.session, SessionSettings::default());
        assert!(!config.exposes_details());
    }

    #[test]
    fn partial_sections_override_only_given_fields() {
        let config = AppConfig::from_json(
            r#"{
                "environment": "development",
                "coach": { "model": "gpt-4o", "max_points": 0 },
                "session": { "indicator_clear_ms": 1500 }
            }"#,
        )
        .unwrap();

        assert!(config.exposes_details());
        assert_eq!(config.coach.model, "gpt-4o");
        assert_eq!(config.coach.max_points, DEFAULT_COACH_MAX_POINTS);
        assert_eq!(config.coach.max_matches, DEFAULT_COACH_MAX_MATCHES);
        assert_eq!(
            config.session.indicator_clear_after,
            Duration::from_millis(1500)
        );
    }

    #[test]
    fn unknown_environment_is_rejected() {
        assert!(AppConfig::from_json(r#"{"environment":"staging"}"#).is_err());
    }
}
