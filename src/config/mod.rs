//! Configuration module - environment variable parsing

use std::env;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Round duration in seconds once a match reaches Playing
    pub match_duration_secs: f32,
    /// Players (human or bot) required before the countdown starts
    pub min_players: usize,
    /// Hard player cap per match
    pub max_players: usize,

    /// Bots the headless runner fills a match with
    pub bot_fill: usize,
    /// Optional fixed RNG seed for reproducible matches
    pub rng_seed: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let match_duration_secs = parse_var("MATCH_DURATION_SECS", 180.0)?;
        let min_players = parse_var("MIN_PLAYERS", 2)?;
        let max_players = parse_var("MAX_PLAYERS", 6)?;
        let bot_fill = parse_var("BOT_FILL", 4)?;

        let rng_seed = match env::var("RNG_SEED") {
            Ok(raw) => Some(raw.parse().map_err(|_| ConfigError::Invalid("RNG_SEED"))?),
            Err(_) => None,
        };

        if max_players == 0 || min_players > max_players {
            return Err(ConfigError::Invalid("MIN_PLAYERS/MAX_PLAYERS"));
        }

        Ok(Self {
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            match_duration_secs,
            min_players,
            max_players,
            bot_fill,
            rng_seed,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
