//! Configuration file loading for the arena.
//!
//! This module provides types and functions for loading and managing
//! arena configuration from TOML files, and for turning it into the
//! per-side [`PlayerConfig`] values and the [`RateLimits`] used at runtime.

use crate::board::Side;
use rate_governor::{DayBoundary, LimitsError, RateLimits};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse the configuration file as valid TOML.
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    /// Rate limits that would never admit a call.
    #[error("Invalid rate limits: {0}")]
    Limits(#[from] LimitsError),
    /// A value outside its allowed range.
    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    /// The API key environment variable is unset or empty.
    #[error("Missing API key: set the {0} environment variable")]
    MissingApiKey(String),
}

/// Settings for the completion endpoint.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct EndpointConfig {
    /// Base URL of the generative language API.
    pub base_url: String,
    /// Model name, inserted into the request path.
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-1.5-flash".to_string(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            timeout_secs: 30,
        }
    }
}

impl EndpointConfig {
    /// Reads the API key from the configured environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingApiKey`] if the variable is unset or blank.
    pub fn api_key(&self) -> Result<String, ConfigError> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
            _ => Err(ConfigError::MissingApiKey(self.api_key_env.clone())),
        }
    }

    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Call budgets, mirrored into [`RateLimits`].
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    pub per_minute: u32,
    pub per_day: u32,
    pub day_boundary: DayBoundary,
    /// Seconds added to every per-minute wait.
    pub wait_margin_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        let limits = RateLimits::default();
        Self {
            per_minute: limits.per_minute,
            per_day: limits.per_day,
            day_boundary: limits.day_boundary,
            wait_margin_secs: limits.wait_margin.as_secs(),
        }
    }
}

impl LimitsConfig {
    pub fn rate_limits(&self) -> RateLimits {
        RateLimits {
            per_minute: self.per_minute,
            per_day: self.per_day,
            day_boundary: self.day_boundary,
            wait_margin: Duration::from_secs(self.wait_margin_secs),
        }
    }
}

/// Game-level settings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct GameConfig {
    /// Ply ceiling. The game stops once this many moves have been played.
    pub max_moves: u32,
    /// Completion requests per ply before giving up on that ply.
    pub max_attempts: u32,
    /// Failed plies in a row before the game is abandoned.
    pub max_consecutive_errors: u32,
    /// How many legal moves to list in the prompt before the final attempt.
    pub legal_moves_in_prompt: usize,
    /// Directory receiving board images and game records.
    pub output_dir: PathBuf,
    /// Starting position. Defaults to the standard initial position.
    pub start_fen: Option<String>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            max_moves: 100,
            max_attempts: 3,
            max_consecutive_errors: 5,
            legal_moves_in_prompt: 15,
            output_dir: PathBuf::from("moves"),
            start_fen: None,
        }
    }
}

/// Per-side settings as written in the config file.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct PlayerSettings {
    /// Display name. Defaults to `Player_White` / `Player_Black`.
    pub name: Option<String>,
    /// Replaces the default system instruction.
    pub system_prompt: Option<String>,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            name: None,
            system_prompt: None,
            temperature: 0.3,
            max_output_tokens: 20,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct PlayersConfig {
    pub white: PlayerSettings,
    pub black: PlayerSettings,
}

/// Main arena configuration structure.
///
/// Uses `arena.toml` in the current directory by default. Every section and
/// field is optional.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct ArenaConfig {
    pub endpoint: EndpointConfig,
    pub limits: LimitsConfig,
    pub game: GameConfig,
    pub players: PlayersConfig,
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub max_moves: Option<u32>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub per_minute: Option<u32>,
    pub per_day: Option<u32>,
    pub output_dir: Option<PathBuf>,
    pub start_fen: Option<String>,
}

impl ArenaConfig {
    /// Loads the configuration from `path`.
    ///
    /// Returns the default configuration if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ReadError`] if the file exists but cannot be read,
    /// or [`ConfigError::ParseError`] if it contains invalid TOML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Returns the default path to the configuration file.
    pub fn config_path() -> PathBuf {
        PathBuf::from("arena.toml")
    }

    /// Applies command-line overrides. Temperature and output cap apply to
    /// both sides.
    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(max_moves) = overrides.max_moves {
            self.game.max_moves = max_moves;
        }
        if let Some(temperature) = overrides.temperature {
            self.players.white.temperature = temperature;
            self.players.black.temperature = temperature;
        }
        if let Some(cap) = overrides.max_output_tokens {
            self.players.white.max_output_tokens = cap;
            self.players.black.max_output_tokens = cap;
        }
        if let Some(per_minute) = overrides.per_minute {
            self.limits.per_minute = per_minute;
        }
        if let Some(per_day) = overrides.per_day {
            self.limits.per_day = per_day;
        }
        if let Some(dir) = &overrides.output_dir {
            self.game.output_dir = dir.clone();
        }
        if let Some(fen) = &overrides.start_fen {
            self.game.start_fen = Some(fen.clone());
        }
    }

    /// Checks every value the game depends on.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.limits.rate_limits().validate()?;
        if self.game.max_moves == 0 {
            return Err(invalid("game.max_moves", "must be at least 1"));
        }
        if self.game.max_attempts == 0 {
            return Err(invalid("game.max_attempts", "must be at least 1"));
        }
        if self.game.max_consecutive_errors == 0 {
            return Err(invalid("game.max_consecutive_errors", "must be at least 1"));
        }
        if self.endpoint.timeout_secs == 0 {
            return Err(invalid("endpoint.timeout_secs", "must be at least 1"));
        }
        for (field, player) in [
            ("players.white", &self.players.white),
            ("players.black", &self.players.black),
        ] {
            if !(0.0..=2.0).contains(&player.temperature) {
                return Err(invalid(
                    field,
                    format!("temperature {} outside 0.0..=2.0", player.temperature),
                ));
            }
            if player.max_output_tokens == 0 {
                return Err(invalid(field, "max_output_tokens must be at least 1"));
            }
        }
        Ok(())
    }

    /// Builds the immutable configuration for one side.
    pub fn player(&self, side: Side) -> PlayerConfig {
        let settings = match side {
            Side::White => &self.players.white,
            Side::Black => &self.players.black,
        };
        PlayerConfig {
            side,
            name: settings
                .name
                .clone()
                .unwrap_or_else(|| PlayerConfig::default_name(side)),
            system_prompt: settings
                .system_prompt
                .clone()
                .unwrap_or_else(|| PlayerConfig::default_system_prompt(side)),
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Immutable per-side configuration, fixed at game start.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerConfig {
    pub side: Side,
    pub name: String,
    /// Instruction text placed at the top of every prompt.
    pub system_prompt: String,
    pub temperature: f32,
    /// Output-length cap sent with each request.
    pub max_output_tokens: u32,
}

impl PlayerConfig {
    /// Default settings for `side`.
    pub fn new(side: Side) -> Self {
        let settings = PlayerSettings::default();
        Self {
            side,
            name: Self::default_name(side),
            system_prompt: Self::default_system_prompt(side),
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
        }
    }

    fn default_name(side: Side) -> String {
        match side {
            Side::White => "Player_White".to_string(),
            Side::Black => "Player_Black".to_string(),
        }
    }

    /// Instruction text asking for a single coordinate move.
    pub fn default_system_prompt(side: Side) -> String {
        format!(
            "You are a strong chess player with the {side} pieces; your opponent has the {opponent} pieces.\n\
             Answer with exactly one move in UCI coordinate notation, such as e2e4, g1f3, e1g1 or a7a8q.\n\
             Do not use algebraic notation like Nf3. Do not add explanations or any other text.\n\
             The move must be legal in the given position.",
            opponent = side.opposite()
        )
    }
}
