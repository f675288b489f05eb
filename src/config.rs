use std::env;
use std::path::PathBuf;

use thiserror::Error;

use crate::quiz::archetype::ArchetypeSet;
use crate::quiz::difficulty::ScoringPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value \"{value}\" for {key}")]
    Invalid { key: &'static str, value: String },
}

/// Bot settings, read from the environment (and `.env`).
///
/// The Telegram token itself is read by `Bot::from_env` from `TELOXIDE_TOKEN`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// SQLite file holding the chats' dialogue state.
    pub dialogue_db: String,
    /// JSON file with documents, word tables and finished sessions.
    pub store_path: PathBuf,
    pub stopwords_path: PathBuf,
    /// Every `*.txt` in here is indexed at startup.
    pub documents_dir: PathBuf,
    pub archetypes: ArchetypeSet,
    pub scoring: ScoringPolicy,
    pub leaderboard_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dialogue_db: "db.sqlite".to_string(),
            store_path: PathBuf::from("quiz_store.json"),
            stopwords_path: PathBuf::from("stopwords.txt"),
            documents_dir: PathBuf::from("documents"),
            archetypes: ArchetypeSet::Extended,
            scoring: ScoringPolicy::Flat,
            leaderboard_size: 5,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; missing keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(value) = lookup("QUIZ_DIALOGUE_DB") {
            config.dialogue_db = value;
        }
        if let Some(value) = lookup("QUIZ_STORE_PATH") {
            config.store_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("QUIZ_STOPWORDS") {
            config.stopwords_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("QUIZ_DOCUMENTS_DIR") {
            config.documents_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup("QUIZ_ARCHETYPES") {
            config.archetypes = value.parse().map_err(|_| ConfigError::Invalid {
                key: "QUIZ_ARCHETYPES",
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup("QUIZ_SCORING") {
            config.scoring = value.parse().map_err(|_| ConfigError::Invalid {
                key: "QUIZ_SCORING",
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup("QUIZ_LEADERBOARD_SIZE") {
            config.leaderboard_size = value.parse().map_err(|_| ConfigError::Invalid {
                key: "QUIZ_LEADERBOARD_SIZE",
                value: value.clone(),
            })?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(Config::from_lookup(lookup(&[])).unwrap(), Config::default());
    }

    #[test]
    fn overrides_are_applied() {
        let config = Config::from_lookup(lookup(&[
            ("QUIZ_STORE_PATH", "/var/lib/quiz/store.json"),
            ("QUIZ_ARCHETYPES", "classic"),
            ("QUIZ_SCORING", "difficulty"),
            ("QUIZ_LEADERBOARD_SIZE", "10"),
        ]))
        .unwrap();
        assert_eq!(config.store_path, PathBuf::from("/var/lib/quiz/store.json"));
        assert_eq!(config.archetypes, ArchetypeSet::Classic);
        assert_eq!(config.scoring, ScoringPolicy::PerDifficulty);
        assert_eq!(config.leaderboard_size, 10);
        assert_eq!(config.dialogue_db, "db.sqlite");
    }

    #[test]
    fn bad_values_are_rejected() {
        let err = Config::from_lookup(lookup(&[("QUIZ_SCORING", "double")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "QUIZ_SCORING",
                value: "double".to_string()
            }
        );
        assert!(Config::from_lookup(lookup(&[("QUIZ_LEADERBOARD_SIZE", "many")])).is_err());
    }
}
