use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use thiserror::Error;

use super::difficulty::ScoringPolicy;
use super::frequency::FrequencyEntry;
use super::generator::{GenerateQuestionError, QuestionGenerator};
use super::session::{Session, SessionError};
use super::timer::{Countdown, TimerEvent};
use super::Question;
use crate::store::{SessionRecord, SessionSink};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error(transparent)]
    Generation(#[from] GenerateQuestionError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("there is no question waiting for an answer")]
    NoPendingQuestion,
    #[error("the current question has not been answered yet")]
    QuestionPending,
    #[error("the quiz is already over")]
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feedback {
    Correct { points: u32 },
    Incorrect { correct_answer: String },
    Skipped { correct_answer: String },
    TimedOut { correct_answer: String },
}

/// What happened to the question that was just resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub feedback: Feedback,
    /// Set on the turn that finished the quiz.
    pub result: Option<SessionRecord>,
}

impl Turn {
    pub fn is_final(&self) -> bool {
        self.result.is_some()
    }
}

/// Drives one session: asks questions, times them and scores the answers.
///
/// The caller owns the game; the bot keeps it in the chat's dialogue state.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QuizGame {
    session: Session,
    pending: Option<Pending>,
    asked: u32,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Pending {
    question: Question,
    countdown: Countdown,
    /// Wall-clock end of the countdown. Survives restarts of whatever drives the ticks.
    #[serde(default)]
    deadline: Option<DateTime<Utc>>,
}

impl QuizGame {
    pub fn start(
        player: &str,
        document_id: i64,
        difficulty: &str,
        scoring: ScoringPolicy,
    ) -> Result<Self, GameError> {
        let mut session = Session::new(scoring);
        session.start(player, document_id, difficulty)?;
        Ok(Self {
            session,
            pending: None,
            asked: 0,
        })
    }

    /// Generates the next question and starts its countdown.
    pub fn next_question<R: Rng>(
        &mut self,
        generator: &mut QuestionGenerator<R>,
        words: &[FrequencyEntry],
    ) -> Result<&Question, GameError> {
        if self.session.is_completed() {
            return Err(GameError::Finished);
        }
        if self.pending.is_some() {
            return Err(GameError::QuestionPending);
        }

        let question = generator.generate_next(words, self.asked as usize)?;
        self.asked += 1;
        let timeout = self.session.timeout_seconds();
        let pending = self.pending.insert(Pending {
            question,
            countdown: Countdown::new(timeout),
            deadline: Some(Utc::now() + Duration::seconds(i64::from(timeout))),
        });
        Ok(&pending.question)
    }

    pub fn submit(&mut self, answer: &str, sink: &dyn SessionSink) -> Result<Turn, GameError> {
        let pending = self.take_pending()?;
        let feedback = if pending.question.is_correct(answer) {
            Feedback::Correct { points: 0 }
        } else {
            Feedback::Incorrect {
                correct_answer: pending.question.correct_answer,
            }
        };
        self.resolve(feedback, sink)
    }

    pub fn skip(&mut self, sink: &dyn SessionSink) -> Result<Turn, GameError> {
        let pending = self.take_pending()?;
        self.resolve(
            Feedback::Skipped {
                correct_answer: pending.question.correct_answer,
            },
            sink,
        )
    }

    /// Advances the countdown of the pending question by one second.
    /// Returns the timed-out turn when the time has run out.
    pub fn tick(&mut self, sink: &dyn SessionSink) -> Result<Option<Turn>, GameError> {
        let pending = self.pending.as_mut().ok_or(GameError::NoPendingQuestion)?;
        match pending.countdown.tick() {
            TimerEvent::Running(_) | TimerEvent::Cancelled => Ok(None),
            TimerEvent::Expired => self.time_out(sink).map(Some),
        }
    }

    /// Times out the pending question if its deadline passed before `now`,
    /// e.g. while nothing was ticking the countdown.
    pub fn expire_overdue(
        &mut self,
        now: DateTime<Utc>,
        sink: &dyn SessionSink,
    ) -> Result<Option<Turn>, GameError> {
        let overdue = self
            .pending
            .as_ref()
            .and_then(|p| p.deadline)
            .map_or(false, |deadline| now >= deadline);
        if !overdue {
            return Ok(None);
        }
        self.time_out(sink).map(Some)
    }

    /// Ends the game early without saving it.
    pub fn abandon(self) {
        self.session.discard();
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.pending.as_ref().map(|p| &p.question)
    }

    /// Number of questions asked so far, including the pending one.
    pub fn question_number(&self) -> u32 {
        self.asked
    }

    pub fn seconds_left(&self) -> Option<u32> {
        self.pending.as_ref().map(|p| p.countdown.remaining())
    }

    pub fn is_over(&self) -> bool {
        self.session.is_completed()
    }

    fn take_pending(&mut self) -> Result<Pending, GameError> {
        let mut pending = self.pending.take().ok_or(GameError::NoPendingQuestion)?;
        pending.countdown.cancel();
        Ok(pending)
    }

    fn time_out(&mut self, sink: &dyn SessionSink) -> Result<Turn, GameError> {
        let pending = self.take_pending()?;
        log::debug!(
            "{} ran out of time on question #{}",
            self.session.player(),
            self.asked
        );
        self.resolve(
            Feedback::TimedOut {
                correct_answer: pending.question.correct_answer,
            },
            sink,
        )
    }

    fn resolve(&mut self, feedback: Feedback, sink: &dyn SessionSink) -> Result<Turn, GameError> {
        let correct = matches!(feedback, Feedback::Correct { .. });
        let outcome = self.session.record_answer(correct)?;
        let feedback = match feedback {
            Feedback::Correct { .. } => Feedback::Correct {
                points: outcome.points,
            },
            other => other,
        };
        let result = if outcome.completed {
            Some(self.session.conclude(sink)?)
        } else {
            None
        };
        Ok(Turn { feedback, result })
    }
}
