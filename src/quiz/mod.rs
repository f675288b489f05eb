pub mod archetype;
pub mod difficulty;
pub mod frequency;
pub mod game;
pub mod generator;
pub mod session;
pub mod timer;

/// Every question is shown with exactly this many options.
pub const OPTIONS_PER_QUESTION: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Question {
    pub text: String,
    pub correct_answer: String,
    pub options: Vec<String>,
}

impl Question {
    pub fn new(text: String, correct_answer: String, options: Vec<String>) -> Self {
        Self {
            text,
            correct_answer,
            options,
        }
    }

    pub fn is_correct(&self, answer: &str) -> bool {
        answer.trim() == self.correct_answer
    }

    pub fn has_option(&self, answer: &str) -> bool {
        let answer = answer.trim();
        self.options.iter().any(|o| o == answer)
    }
}
