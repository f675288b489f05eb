use chrono::{DateTime, Utc};
use thiserror::Error;

use super::difficulty::{
    difficulty_config, Difficulty, DifficultyConfig, ScoringPolicy, FALLBACK_CONFIG,
};
use crate::store::{SessionRecord, SessionSink};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SessionState {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("cannot {operation} a session that is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
}

/// Result of recording one answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerOutcome {
    pub points: u32,
    pub completed: bool,
}

/// One playthrough of the quiz for a player, a document and a difficulty.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Session {
    player: String,
    document_id: i64,
    difficulty_label: String,
    difficulty: Option<Difficulty>,
    config: Option<DifficultyConfig>,
    scoring: ScoringPolicy,
    questions_answered: u32,
    correct_answers: u32,
    score: u32,
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    finished_at: Option<DateTime<Utc>>,
    state: SessionState,
    saved: bool,
}

impl Session {
    pub fn new(scoring: ScoringPolicy) -> Self {
        Self {
            scoring,
            ..Self::default()
        }
    }

    /// Starts the session. Unknown difficulty labels fall back to a default
    /// configuration instead of failing.
    pub fn start(
        &mut self,
        player: &str,
        document_id: i64,
        difficulty: &str,
    ) -> Result<(), SessionError> {
        self.expect_state("start", &[SessionState::NotStarted])?;

        let parsed = difficulty.parse::<Difficulty>().ok();

        self.player = player.to_string();
        self.document_id = document_id;
        self.difficulty_label = parsed
            .map(|d| d.label().to_string())
            .unwrap_or_else(|| difficulty.trim().to_string());
        self.difficulty = parsed;
        self.config = Some(difficulty_config(difficulty));
        self.questions_answered = 0;
        self.correct_answers = 0;
        self.score = 0;
        self.started_at = Some(Utc::now());
        self.finished_at = None;
        self.state = SessionState::InProgress;
        self.saved = false;

        log::info!(
            "{} started a {} session on document {}",
            self.player,
            self.difficulty_label,
            self.document_id
        );
        Ok(())
    }

    /// Records a submitted, skipped or timed-out answer. Only a correct
    /// submission scores.
    pub fn record_answer(&mut self, is_correct: bool) -> Result<AnswerOutcome, SessionError> {
        self.expect_state("record an answer in", &[SessionState::InProgress])?;

        self.questions_answered += 1;
        let points = if is_correct {
            self.correct_answers += 1;
            self.scoring.points(self.difficulty)
        } else {
            0
        };
        self.score += points;

        let completed = self.questions_answered >= self.max_questions();
        if completed {
            self.finish();
            log::info!(
                "{} completed the session: {} points, {}/{} correct",
                self.player,
                self.score,
                self.correct_answers,
                self.questions_answered
            );
        }
        Ok(AnswerOutcome { points, completed })
    }

    /// Freezes the session and hands it to `sink`.
    ///
    /// A failing sink is logged and otherwise ignored: the returned record is
    /// still good to show to the player. Concluding twice writes only once.
    pub fn conclude(&mut self, sink: &dyn SessionSink) -> Result<SessionRecord, SessionError> {
        self.expect_state(
            "conclude",
            &[SessionState::InProgress, SessionState::Completed],
        )?;
        self.finish();

        let record = self.record();
        if !self.saved {
            match sink.save_session(&record) {
                Ok(()) => log::debug!("Saved session of {}", self.player),
                Err(err) => log::error!("Failed to save session of {}: {}", self.player, err),
            }
            self.saved = true;
        }
        Ok(record)
    }

    /// Drops the session without saving anything.
    pub fn discard(self) {
        log::info!(
            "Discarded {:?} session of {} after {} answers",
            self.state,
            self.player,
            self.questions_answered
        );
    }

    /// Snapshot of the session. A finished session always carries the moment
    /// it finished; one still in play is stamped with the current time.
    pub fn record(&self) -> SessionRecord {
        SessionRecord {
            username: self.player.clone(),
            score: self.score,
            timestamp: self.finished_at.unwrap_or_else(Utc::now),
            difficulty: self.difficulty_label.clone(),
            document_id: self.document_id,
            correct_answers: self.correct_answers,
            questions_answered: self.questions_answered,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_completed(&self) -> bool {
        self.state == SessionState::Completed
    }

    pub fn player(&self) -> &str {
        &self.player
    }

    pub fn document_id(&self) -> i64 {
        self.document_id
    }

    pub fn difficulty(&self) -> &str {
        &self.difficulty_label
    }

    pub fn max_questions(&self) -> u32 {
        self.config.unwrap_or(FALLBACK_CONFIG).max_questions
    }

    pub fn timeout_seconds(&self) -> u32 {
        self.config.unwrap_or(FALLBACK_CONFIG).timeout_seconds
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn correct_answers(&self) -> u32 {
        self.correct_answers
    }

    pub fn questions_answered(&self) -> u32 {
        self.questions_answered
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    fn finish(&mut self) {
        self.state = SessionState::Completed;
        self.finished_at.get_or_insert_with(Utc::now);
    }

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: &[SessionState],
    ) -> Result<(), SessionError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }
}
