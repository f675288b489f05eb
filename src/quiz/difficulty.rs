use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Points for a correct answer under the flat scoring rule.
pub const FLAT_POINTS: u32 = 10;

/// Used when a difficulty label is not recognised.
pub const FALLBACK_CONFIG: DifficultyConfig = DifficultyConfig {
    max_questions: 10,
    timeout_seconds: 20,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DifficultyConfig {
    pub max_questions: u32,
    pub timeout_seconds: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown difficulty \"{0}\"")]
pub struct InvalidDifficulty(pub String);

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    pub fn config(&self) -> DifficultyConfig {
        match self {
            Difficulty::Easy => DifficultyConfig {
                max_questions: 5,
                timeout_seconds: 30,
            },
            Difficulty::Medium => DifficultyConfig {
                max_questions: 10,
                timeout_seconds: 20,
            },
            Difficulty::Hard => DifficultyConfig {
                max_questions: 15,
                timeout_seconds: 10,
            },
        }
    }

    /// Points per correct answer when scoring depends on difficulty.
    pub fn max_points_per_question(&self) -> u32 {
        match self {
            Difficulty::Easy => 10,
            Difficulty::Medium => 20,
            Difficulty::Hard => 30,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Difficulty::Easy => "EASY",
            Difficulty::Medium => "MEDIUM",
            Difficulty::Hard => "HARD",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Difficulty {
    type Err = InvalidDifficulty;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "EASY" => Ok(Difficulty::Easy),
            "MEDIUM" => Ok(Difficulty::Medium),
            "HARD" => Ok(Difficulty::Hard),
            _ => Err(InvalidDifficulty(s.to_string())),
        }
    }
}

/// Looks up the configuration for a difficulty label.
/// Unknown labels get [`FALLBACK_CONFIG`] instead of an error.
pub fn difficulty_config(label: &str) -> DifficultyConfig {
    match label.parse::<Difficulty>() {
        Ok(difficulty) => difficulty.config(),
        Err(err) => {
            log::warn!("{}, falling back to {:?}", err, FALLBACK_CONFIG);
            FALLBACK_CONFIG
        }
    }
}

/// How many points a correct answer is worth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ScoringPolicy {
    /// Every correct answer is worth [`FLAT_POINTS`].
    #[default]
    Flat,
    /// Harder games pay more per answer, see [`Difficulty::max_points_per_question`].
    PerDifficulty,
}

impl ScoringPolicy {
    pub fn points(&self, difficulty: Option<Difficulty>) -> u32 {
        match (self, difficulty) {
            (ScoringPolicy::Flat, _) => FLAT_POINTS,
            (ScoringPolicy::PerDifficulty, Some(d)) => d.max_points_per_question(),
            (ScoringPolicy::PerDifficulty, None) => FLAT_POINTS,
        }
    }
}

impl FromStr for ScoringPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "flat" => Ok(ScoringPolicy::Flat),
            "difficulty" | "per-difficulty" => Ok(ScoringPolicy::PerDifficulty),
            other => Err(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("EASY", 5, 30)]
    #[case("MEDIUM", 10, 20)]
    #[case("HARD", 15, 10)]
    #[case("easy", 5, 30)]
    #[case(" Hard ", 15, 10)]
    fn known_labels_resolve(#[case] label: &str, #[case] max: u32, #[case] timeout: u32) {
        let config = difficulty_config(label);
        assert_eq!(config.max_questions, max);
        assert_eq!(config.timeout_seconds, timeout);
    }

    #[rstest]
    #[case("NONSENSE")]
    #[case("")]
    #[case("extreme")]
    fn unknown_labels_fall_back(#[case] label: &str) {
        assert_eq!(difficulty_config(label).max_questions, 10);
        assert!(label.parse::<Difficulty>().is_err());
    }

    #[test]
    fn labels_round_trip_through_display() {
        for difficulty in Difficulty::ALL {
            assert_eq!(difficulty.to_string().parse::<Difficulty>(), Ok(difficulty));
        }
    }

    #[rstest]
    #[case(ScoringPolicy::Flat, Some(Difficulty::Hard), 10)]
    #[case(ScoringPolicy::PerDifficulty, Some(Difficulty::Easy), 10)]
    #[case(ScoringPolicy::PerDifficulty, Some(Difficulty::Medium), 20)]
    #[case(ScoringPolicy::PerDifficulty, Some(Difficulty::Hard), 30)]
    #[case(ScoringPolicy::PerDifficulty, None, 10)]
    fn scoring_policy_points(
        #[case] policy: ScoringPolicy,
        #[case] difficulty: Option<Difficulty>,
        #[case] points: u32,
    ) {
        assert_eq!(policy.points(difficulty), points);
    }
}
