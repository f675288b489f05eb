use rand::rngs::ThreadRng;
use rand::seq::SliceRandom;
use rand::{thread_rng, Rng};
use thiserror::Error;

use super::archetype::{Archetype, ArchetypeSet, Clash, DistractorStrategy};
use super::frequency::{distinct_terms, FrequencyEntry};
use super::{Question, OPTIONS_PER_QUESTION};

/// Distractor draws allowed per question before padding kicks in.
pub const MAX_DISTRACTOR_ATTEMPTS: usize = 20;
/// Retries when a nudged count collides with an existing option.
const MAX_COUNT_RETRIES: usize = 10;
const COUNT_OFFSET: i64 = 2;
pub const PLACEHOLDER: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerateQuestionError {
    #[error("not enough words to build a question: {distinct} distinct, {required} required")]
    InsufficientData { distinct: usize, required: usize },
}

/// Turns a frequency table into multiple-choice questions.
pub struct QuestionGenerator<R = ThreadRng> {
    archetypes: ArchetypeSet,
    rng: R,
}

impl QuestionGenerator<ThreadRng> {
    pub fn new(archetypes: ArchetypeSet) -> Self {
        Self::with_rng(archetypes, thread_rng())
    }
}

impl<R: Rng> QuestionGenerator<R> {
    pub fn with_rng(archetypes: ArchetypeSet, rng: R) -> Self {
        Self { archetypes, rng }
    }

    pub fn archetype_set(&self) -> ArchetypeSet {
        self.archetypes
    }

    /// Generates the next question using an archetype drawn from the configured set.
    pub fn generate_next(
        &mut self,
        words: &[FrequencyEntry],
        asked_count: usize,
    ) -> Result<Question, GenerateQuestionError> {
        check_enough_words(words)?;
        let archetype = *self
            .archetypes
            .archetypes()
            .choose(&mut self.rng)
            .unwrap_or(&Archetype::MostFrequent);
        log::debug!(
            "Question #{}: drew {:?} from {} archetypes",
            asked_count + 1,
            archetype,
            self.archetypes
        );
        self.generate(archetype, words)
    }

    /// Generates a question of the given archetype.
    pub fn generate(
        &mut self,
        archetype: Archetype,
        words: &[FrequencyEntry],
    ) -> Result<Question, GenerateQuestionError> {
        check_enough_words(words)?;
        let draft = archetype
            .draft(words, &mut self.rng)
            .ok_or(GenerateQuestionError::InsufficientData {
                distinct: 0,
                required: OPTIONS_PER_QUESTION,
            })?;

        let mut options = vec![draft.correct_answer.clone()];
        let mut attempts = 0;
        while options.len() < OPTIONS_PER_QUESTION && attempts < MAX_DISTRACTOR_ATTEMPTS {
            attempts += 1;
            let candidate =
                self.distractor(archetype.distractor(), &draft.correct_answer, words, &options);
            if let Some(candidate) = candidate {
                if !options.contains(&candidate) {
                    options.push(candidate);
                }
            }
        }

        if options.len() < OPTIONS_PER_QUESTION {
            log::warn!(
                "Only {} options for {:?} after {} attempts, padding",
                options.len(),
                archetype,
                attempts
            );
            pad_options(&mut options);
        }

        options.shuffle(&mut self.rng);
        Ok(Question::new(draft.text, draft.correct_answer, options))
    }

    fn distractor(
        &mut self,
        strategy: DistractorStrategy,
        correct_answer: &str,
        words: &[FrequencyEntry],
        options: &[String],
    ) -> Option<String> {
        match strategy {
            DistractorStrategy::Count => {
                let correct = correct_answer.parse::<i64>().ok()?;
                Some(self.nudged_count(correct, options).to_string())
            }
            DistractorStrategy::Length => words
                .choose(&mut self.rng)
                .map(|w| w.length().to_string()),
            DistractorStrategy::Term(clash) => {
                let answer = words.iter().find(|w| w.term == correct_answer)?;
                words
                    .iter()
                    .filter(|w| !options.contains(&w.term) && !clash.clashes(w, answer))
                    .collect::<Vec<_>>()
                    .choose(&mut self.rng)
                    .map(|w| w.term.clone())
            }
        }
    }

    /// A count near `correct`, never below one. Gives up avoiding collisions
    /// after a few retries and returns whatever it drew last.
    fn nudged_count(&mut self, correct: i64, options: &[String]) -> i64 {
        let mut value = correct;
        for _ in 0..MAX_COUNT_RETRIES {
            let offset = self.rng.gen_range(-COUNT_OFFSET..=COUNT_OFFSET);
            value = (correct + offset).max(1);
            if !options.contains(&value.to_string()) {
                break;
            }
        }
        value
    }
}

fn check_enough_words(words: &[FrequencyEntry]) -> Result<(), GenerateQuestionError> {
    let distinct = distinct_terms(words);
    if distinct < OPTIONS_PER_QUESTION {
        return Err(GenerateQuestionError::InsufficientData {
            distinct,
            required: OPTIONS_PER_QUESTION,
        });
    }
    Ok(())
}

/// Fills the remaining slots with unique placeholders.
fn pad_options(options: &mut Vec<String>) {
    let mut n = 1;
    while options.len() < OPTIONS_PER_QUESTION {
        let placeholder = if n == 1 {
            PLACEHOLDER.to_string()
        } else {
            format!("{} ({})", PLACEHOLDER, n)
        };
        if !options.contains(&placeholder) {
            options.push(placeholder);
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn table(entries: &[(&str, u32)]) -> Vec<FrequencyEntry> {
        entries
            .iter()
            .map(|(t, c)| FrequencyEntry::new(*t, *c))
            .collect()
    }

    fn generator(seed: u64) -> QuestionGenerator<StdRng> {
        QuestionGenerator::with_rng(ArchetypeSet::Extended, StdRng::seed_from_u64(seed))
    }

    fn assert_well_formed(question: &Question) {
        assert_eq!(question.options.len(), OPTIONS_PER_QUESTION);
        let unique = question.options.iter().collect::<HashSet<_>>();
        assert_eq!(unique.len(), OPTIONS_PER_QUESTION, "{:?}", question.options);
        assert_eq!(
            question
                .options
                .iter()
                .filter(|o| **o == question.correct_answer)
                .count(),
            1
        );
    }

    #[test]
    fn three_terms_are_not_enough() {
        let words = crate::quiz::frequency::build(
            "cat dog cat bird cat dog",
            &crate::quiz::frequency::StopWords::default(),
        );
        assert_eq!(words, table(&[("cat", 3), ("dog", 2), ("bird", 1)]));

        let err = generator(1).generate_next(&words, 0).unwrap_err();
        assert_eq!(
            err,
            GenerateQuestionError::InsufficientData {
                distinct: 3,
                required: 4
            }
        );
    }

    #[test]
    fn empty_table_is_rejected() {
        assert!(matches!(
            generator(1).generate_next(&[], 0),
            Err(GenerateQuestionError::InsufficientData { distinct: 0, .. })
        ));
    }

    #[test]
    fn duplicate_terms_do_not_count_twice() {
        let words = table(&[("cat", 1), ("dog", 1), ("bird", 1), ("cat", 4)]);
        assert!(generator(2).generate_next(&words, 0).is_err());
    }

    #[test]
    fn forced_most_frequent_question() {
        let words = table(&[("cat", 5), ("dog", 3), ("bird", 2), ("fish", 1)]);
        for seed in 0..10 {
            let question = generator(seed)
                .generate(Archetype::MostFrequent, &words)
                .unwrap();
            assert_eq!(question.correct_answer, "cat");
            assert_well_formed(&question);
            let mut options = question.options.clone();
            options.sort();
            assert_eq!(options, vec!["bird", "cat", "dog", "fish"]);
        }
    }

    #[test]
    fn count_distractors_stay_positive() {
        let words = table(&[("cat", 1), ("dog", 1), ("bird", 1), ("fish", 1)]);
        for seed in 0..10 {
            let question = generator(seed)
                .generate(Archetype::FrequencyOf, &words)
                .unwrap();
            assert_eq!(question.correct_answer, "1");
            assert_well_formed(&question);
            // 1, 2 and 3 are the only reachable counts
            assert!(question.options.iter().any(|o| o.starts_with(PLACEHOLDER)));
            for option in question.options.iter().filter(|o| !o.starts_with(PLACEHOLDER)) {
                let n: i64 = option.parse().unwrap();
                assert!((1..=3).contains(&n));
            }
        }
    }

    #[test]
    fn same_length_words_are_padded() {
        let words = table(&[("cat", 1), ("dog", 1), ("cow", 1), ("pig", 1)]);
        let question = generator(7).generate(Archetype::LengthOf, &words).unwrap();
        assert_eq!(question.correct_answer, "3");
        assert_well_formed(&question);
        assert!(question.options.contains(&PLACEHOLDER.to_string()));
        assert!(question.options.contains(&format!("{} (2)", PLACEHOLDER)));
    }

    #[test]
    fn classic_set_only_asks_classic_questions() {
        let words = table(&[("cat", 5), ("dog", 3), ("bird", 2), ("fish", 1), ("horse", 4)]);
        let mut generator =
            QuestionGenerator::with_rng(ArchetypeSet::Classic, StdRng::seed_from_u64(9));
        assert_eq!(generator.archetype_set(), ArchetypeSet::Classic);
        for asked in 0..30 {
            let question = generator.generate_next(&words, asked).unwrap();
            assert!(
                question.text.contains("most often")
                    || question.text.contains("least often")
                    || question.text.contains("How many"),
                "{}",
                question.text
            );
        }
    }

    /// Asserts that no wrong option of `archetype` questions would also be right.
    fn assert_single_answer(archetype: Archetype, words: &[FrequencyEntry], clash: Clash) {
        for seed in 0..20 {
            let question = generator(seed).generate(archetype, words).unwrap();
            assert_well_formed(&question);
            let answer = words
                .iter()
                .find(|w| w.term == question.correct_answer)
                .unwrap();
            for option in question.options.iter().filter(|o| **o != question.correct_answer) {
                if let Some(other) = words.iter().find(|w| w.term == *option) {
                    assert!(
                        !clash.clashes(other, answer),
                        "{:?}: {} also answers \"{}\"",
                        archetype,
                        option,
                        question.text
                    );
                }
            }
        }
    }

    #[test]
    fn least_frequent_offers_no_other_rare_word() {
        let words = table(&[("cat", 5), ("dog", 3), ("cow", 2), ("fish", 1), ("horse", 1)]);
        assert_single_answer(Archetype::LeastFrequent, &words, Clash::SameCount);
        let question = generator(0)
            .generate(Archetype::LeastFrequent, &words)
            .unwrap();
        let mut options = question.options.clone();
        options.sort();
        assert_eq!(options, vec!["cat", "cow", "dog", "fish"]);
    }

    #[test]
    fn tied_top_words_are_not_offered_as_distractors() {
        let words = table(&[
            ("alpha", 3),
            ("beta", 3),
            ("gamma", 2),
            ("delta", 2),
            ("eps", 1),
            ("zeta", 4),
        ]);
        assert_single_answer(Archetype::MostFrequent, &words, Clash::SameCount);
        assert_single_answer(Archetype::SecondMostFrequent, &words, Clash::SameCount);
        assert_single_answer(Archetype::MostFrequentInSubset, &words, Clash::SameCount);
    }

    #[test]
    fn word_of_length_offers_no_other_word_of_that_length() {
        let words = table(&[
            ("cat", 5),
            ("dog", 3),
            ("cow", 2),
            ("fish", 1),
            ("horse", 1),
            ("zebra", 1),
            ("ox", 1),
        ]);
        assert_single_answer(Archetype::WordOfLength, &words, Clash::SameLength);
        assert_single_answer(Archetype::Longest, &words, Clash::SameLength);
    }

    #[test]
    fn only_tied_words_left_means_padding() {
        let words = table(&[("cat", 1), ("dog", 1), ("cow", 1), ("pig", 1)]);
        let question = generator(3)
            .generate(Archetype::LeastFrequent, &words)
            .unwrap();
        assert_eq!(question.correct_answer, "cat");
        assert_well_formed(&question);
        assert!(question
            .options
            .iter()
            .filter(|o| **o != "cat")
            .all(|o| o.starts_with(PLACEHOLDER)));
    }

    #[test]
    fn pad_options_fills_unique_slots() {
        let mut options = vec!["cat".to_string()];
        pad_options(&mut options);
        assert_eq!(options, vec!["cat", "N/A", "N/A (2)", "N/A (3)"]);
    }

    fn word_table() -> impl Strategy<Value = Vec<FrequencyEntry>> {
        proptest::collection::btree_map("[a-z]{1,8}", 1u32..20, 4..12).prop_map(|map| {
            map.into_iter()
                .map(|(term, count)| FrequencyEntry::new(term, count))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn every_question_has_four_unique_options(words in word_table(), seed in any::<u64>()) {
            let mut generator = generator(seed);
            for asked in 0..10 {
                let question = generator.generate_next(&words, asked).unwrap();
                prop_assert_eq!(question.options.len(), OPTIONS_PER_QUESTION);
                prop_assert_eq!(
                    question.options.iter().collect::<HashSet<_>>().len(),
                    OPTIONS_PER_QUESTION
                );
                prop_assert!(question.options.contains(&question.correct_answer));
            }
        }

        #[test]
        fn small_tables_always_fail(
            words in proptest::collection::btree_map("[a-z]{1,8}", 1u32..20, 0..4),
            seed in any::<u64>(),
        ) {
            let words = words
                .into_iter()
                .map(|(term, count)| FrequencyEntry::new(term, count))
                .collect::<Vec<_>>();
            let is_insufficient = matches!(
                generator(seed).generate_next(&words, 0),
                Err(GenerateQuestionError::InsufficientData { .. })
            );
            prop_assert!(is_insufficient);
        }
    }
}
