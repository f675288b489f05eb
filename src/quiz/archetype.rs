use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;
use rand::{Rng, RngCore};

use super::frequency::FrequencyEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Archetype {
    MostFrequent,
    FrequencyOf,
    LeastFrequent,
    LengthOf,
    MostFrequentInSubset,
    Longest,
    WordOfLength,
    FirstWord,
    FollowingWord,
    SecondMostFrequent,
}

/// How wrong options are made up for a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistractorStrategy {
    /// Nudge the correct count by a small offset.
    Count,
    /// Take the length of some other word.
    Length,
    /// Take some word that is not offered yet and would not answer the
    /// question as well.
    Term(Clash),
}

/// Which other words would also be a right answer to a word question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clash {
    /// The answer is the only word that fits.
    Unique,
    /// Any word with the answer's count fits too.
    SameCount,
    /// Any word with the answer's length fits too.
    SameLength,
}

impl Clash {
    pub fn clashes(self, candidate: &FrequencyEntry, answer: &FrequencyEntry) -> bool {
        match self {
            Clash::Unique => false,
            Clash::SameCount => candidate.count == answer.count,
            Clash::SameLength => candidate.length() == answer.length(),
        }
    }
}

/// Prompt and correct answer, before any options are added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub text: String,
    pub correct_answer: String,
}

pub struct ArchetypeDescriptor {
    pub archetype: Archetype,
    pub distractor: DistractorStrategy,
    draft: fn(&[FrequencyEntry], &mut dyn RngCore) -> Option<Draft>,
}

// Indexed by `Archetype as usize`.
static DESCRIPTORS: [ArchetypeDescriptor; 10] = [
    ArchetypeDescriptor {
        archetype: Archetype::MostFrequent,
        distractor: DistractorStrategy::Term(Clash::SameCount),
        draft: most_frequent,
    },
    ArchetypeDescriptor {
        archetype: Archetype::FrequencyOf,
        distractor: DistractorStrategy::Count,
        draft: frequency_of,
    },
    ArchetypeDescriptor {
        archetype: Archetype::LeastFrequent,
        distractor: DistractorStrategy::Term(Clash::SameCount),
        draft: least_frequent,
    },
    ArchetypeDescriptor {
        archetype: Archetype::LengthOf,
        distractor: DistractorStrategy::Length,
        draft: length_of,
    },
    ArchetypeDescriptor {
        archetype: Archetype::MostFrequentInSubset,
        distractor: DistractorStrategy::Term(Clash::SameCount),
        draft: most_frequent_in_subset,
    },
    ArchetypeDescriptor {
        archetype: Archetype::Longest,
        distractor: DistractorStrategy::Term(Clash::SameLength),
        draft: longest,
    },
    ArchetypeDescriptor {
        archetype: Archetype::WordOfLength,
        distractor: DistractorStrategy::Term(Clash::SameLength),
        draft: word_of_length,
    },
    ArchetypeDescriptor {
        archetype: Archetype::FirstWord,
        distractor: DistractorStrategy::Term(Clash::Unique),
        draft: first_word,
    },
    ArchetypeDescriptor {
        archetype: Archetype::FollowingWord,
        distractor: DistractorStrategy::Term(Clash::Unique),
        draft: following_word,
    },
    ArchetypeDescriptor {
        archetype: Archetype::SecondMostFrequent,
        distractor: DistractorStrategy::Term(Clash::SameCount),
        draft: second_most_frequent,
    },
];

impl Archetype {
    pub const ALL: [Archetype; 10] = [
        Archetype::MostFrequent,
        Archetype::FrequencyOf,
        Archetype::LeastFrequent,
        Archetype::LengthOf,
        Archetype::MostFrequentInSubset,
        Archetype::Longest,
        Archetype::WordOfLength,
        Archetype::FirstWord,
        Archetype::FollowingWord,
        Archetype::SecondMostFrequent,
    ];

    pub fn descriptor(self) -> &'static ArchetypeDescriptor {
        &DESCRIPTORS[self as usize]
    }

    pub fn distractor(self) -> DistractorStrategy {
        self.descriptor().distractor
    }

    /// Builds the prompt and correct answer. `None` only for an empty table.
    pub fn draft(self, words: &[FrequencyEntry], rng: &mut dyn RngCore) -> Option<Draft> {
        if words.is_empty() {
            return None;
        }
        (self.descriptor().draft)(words, rng)
    }
}

/// Which archetypes a generator draws from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ArchetypeSet {
    /// The first four archetypes only.
    Classic,
    #[default]
    Extended,
}

impl ArchetypeSet {
    pub fn archetypes(&self) -> &'static [Archetype] {
        match self {
            ArchetypeSet::Classic => &CLASSIC,
            ArchetypeSet::Extended => &Archetype::ALL,
        }
    }
}

impl fmt::Display for ArchetypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchetypeSet::Classic => f.write_str("classic"),
            ArchetypeSet::Extended => f.write_str("extended"),
        }
    }
}

impl FromStr for ArchetypeSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "classic" => Ok(ArchetypeSet::Classic),
            "extended" => Ok(ArchetypeSet::Extended),
            other => Err(other.to_string()),
        }
    }
}

const CLASSIC: [Archetype; 4] = [
    Archetype::MostFrequent,
    Archetype::FrequencyOf,
    Archetype::LeastFrequent,
    Archetype::LengthOf,
];

const MOST_FREQUENT_TEXT: &str = "Which word appears most often in the document?";

fn draft(text: String, correct_answer: String) -> Option<Draft> {
    Some(Draft {
        text,
        correct_answer,
    })
}

/// Highest count first, ties kept in source order.
fn by_count_desc(words: &[FrequencyEntry]) -> Vec<&FrequencyEntry> {
    let mut sorted = words.iter().collect::<Vec<_>>();
    sorted.sort_by(|a, b| b.count.cmp(&a.count));
    sorted
}

fn most_frequent(words: &[FrequencyEntry], _rng: &mut dyn RngCore) -> Option<Draft> {
    let top = by_count_desc(words).into_iter().next()?;
    draft(MOST_FREQUENT_TEXT.to_string(), top.term.clone())
}

fn frequency_of(words: &[FrequencyEntry], rng: &mut dyn RngCore) -> Option<Draft> {
    let entry = words.choose(rng)?;
    draft(
        format!(
            "How many times does the word \"{}\" appear in the document?",
            entry.term
        ),
        entry.count.to_string(),
    )
}

fn least_frequent(words: &[FrequencyEntry], _rng: &mut dyn RngCore) -> Option<Draft> {
    // min_by_key keeps the first of equal elements
    let bottom = words.iter().min_by_key(|w| w.count)?;
    draft(
        "Which word appears least often in the document?".to_string(),
        bottom.term.clone(),
    )
}

fn length_of(words: &[FrequencyEntry], rng: &mut dyn RngCore) -> Option<Draft> {
    let entry = words.choose(rng)?;
    draft(
        format!("How many letters does the word \"{}\" have?", entry.term),
        entry.length().to_string(),
    )
}

fn most_frequent_in_subset(words: &[FrequencyEntry], rng: &mut dyn RngCore) -> Option<Draft> {
    let subset = words
        .choose_multiple(rng, words.len().min(4))
        .collect::<Vec<_>>();
    let top = subset
        .iter()
        .copied()
        .reduce(|best, w| if w.count > best.count { w } else { best })?;
    let listed = subset
        .iter()
        .map(|w| w.term.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    draft(
        format!("Which of these words appears most often: {}?", listed),
        top.term.clone(),
    )
}

fn longest(words: &[FrequencyEntry], _rng: &mut dyn RngCore) -> Option<Draft> {
    let top = words
        .iter()
        .reduce(|best, w| if w.length() > best.length() { w } else { best })?;
    draft(
        "Which is the longest word in the document?".to_string(),
        top.term.clone(),
    )
}

fn word_of_length(words: &[FrequencyEntry], rng: &mut dyn RngCore) -> Option<Draft> {
    let mut seen = HashSet::new();
    let lengths = words
        .iter()
        .map(|w| w.length())
        .filter(|l| seen.insert(*l))
        .collect::<Vec<_>>();
    let length = *lengths.choose(rng)?;
    let candidates = words
        .iter()
        .filter(|w| w.length() == length)
        .collect::<Vec<_>>();
    let entry = candidates.choose(rng)?;
    draft(
        format!("Which word from the document has exactly {} letters?", length),
        entry.term.clone(),
    )
}

fn first_word(words: &[FrequencyEntry], _rng: &mut dyn RngCore) -> Option<Draft> {
    let first = words.first()?;
    draft(
        "Which word appears first in the document?".to_string(),
        first.term.clone(),
    )
}

fn following_word(words: &[FrequencyEntry], rng: &mut dyn RngCore) -> Option<Draft> {
    if words.len() < 2 {
        return draft(MOST_FREQUENT_TEXT.to_string(), words.first()?.term.clone());
    }
    let idx = rng.gen_range(1..words.len());
    draft(
        format!(
            "Which new word first appears right after \"{}\" in the document?",
            words[idx - 1].term
        ),
        words[idx].term.clone(),
    )
}

fn second_most_frequent(words: &[FrequencyEntry], rng: &mut dyn RngCore) -> Option<Draft> {
    let sorted = by_count_desc(words);
    match sorted.get(1) {
        Some(second) => draft(
            "Which word is the second most frequent in the document?".to_string(),
            second.term.clone(),
        ),
        None => most_frequent(words, rng),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rstest::rstest;

    fn table(entries: &[(&str, u32)]) -> Vec<FrequencyEntry> {
        entries
            .iter()
            .map(|(t, c)| FrequencyEntry::new(*t, *c))
            .collect()
    }

    fn pool() -> Vec<FrequencyEntry> {
        table(&[("cat", 5), ("dog", 3), ("bird", 2), ("fish", 1), ("horse", 3)])
    }

    fn answer(archetype: Archetype, words: &[FrequencyEntry], seed: u64) -> String {
        let mut rng = StdRng::seed_from_u64(seed);
        archetype.draft(words, &mut rng).unwrap().correct_answer
    }

    #[test]
    fn descriptor_table_matches_variant_order() {
        for archetype in Archetype::ALL {
            assert_eq!(archetype.descriptor().archetype, archetype);
        }
    }

    #[rstest]
    #[case(Archetype::MostFrequent, "cat")]
    #[case(Archetype::LeastFrequent, "fish")]
    #[case(Archetype::Longest, "horse")]
    #[case(Archetype::FirstWord, "cat")]
    #[case(Archetype::SecondMostFrequent, "dog")]
    fn fixed_answers(#[case] archetype: Archetype, #[case] expected: &str) {
        for seed in 0..5 {
            assert_eq!(answer(archetype, &pool(), seed), expected);
        }
    }

    #[test]
    fn frequency_answer_is_the_count_of_the_named_word() {
        let words = pool();
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let draft = Archetype::FrequencyOf.draft(&words, &mut rng).unwrap();
            let named = words
                .iter()
                .find(|w| draft.text.contains(&format!("\"{}\"", w.term)))
                .unwrap();
            assert_eq!(draft.correct_answer, named.count.to_string());
        }
    }

    #[test]
    fn length_answer_counts_letters_not_bytes() {
        let words = table(&[("niño", 1)]);
        assert_eq!(answer(Archetype::LengthOf, &words, 1), "4");
    }

    #[test]
    fn subset_answer_is_most_frequent_of_the_listed_words() {
        let words = pool();
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let draft = Archetype::MostFrequentInSubset.draft(&words, &mut rng).unwrap();
            let listed = words
                .iter()
                .filter(|w| draft.text.contains(&w.term))
                .collect::<Vec<_>>();
            assert_eq!(listed.len(), 4);
            let best = listed.iter().map(|w| w.count).max().unwrap();
            let chosen = words.iter().find(|w| w.term == draft.correct_answer).unwrap();
            assert_eq!(chosen.count, best);
        }
    }

    #[test]
    fn word_of_length_matches_the_prompt() {
        let words = pool();
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let draft = Archetype::WordOfLength.draft(&words, &mut rng).unwrap();
            let length = draft.correct_answer.chars().count();
            assert!(draft.text.contains(&format!("exactly {} letters", length)));
        }
    }

    #[test]
    fn following_word_names_the_previous_term() {
        let words = pool();
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let draft = Archetype::FollowingWord.draft(&words, &mut rng).unwrap();
            let idx = words
                .iter()
                .position(|w| w.term == draft.correct_answer)
                .unwrap();
            assert!(idx >= 1);
            assert!(draft.text.contains(&format!("\"{}\"", words[idx - 1].term)));
        }
    }

    #[test]
    fn single_entry_tables_degrade_to_most_frequent() {
        let words = table(&[("alone", 2)]);
        let mut rng = StdRng::seed_from_u64(3);
        for archetype in [Archetype::FollowingWord, Archetype::SecondMostFrequent] {
            let draft = archetype.draft(&words, &mut rng).unwrap();
            assert_eq!(draft.text, MOST_FREQUENT_TEXT);
            assert_eq!(draft.correct_answer, "alone");
        }
    }

    #[test]
    fn empty_table_has_no_draft() {
        let mut rng = StdRng::seed_from_u64(0);
        for archetype in Archetype::ALL {
            assert!(archetype.draft(&[], &mut rng).is_none());
        }
    }

    #[test]
    fn ties_resolve_to_source_order() {
        let words = table(&[("alpha", 2), ("beta", 2), ("gamma", 1), ("delta", 1)]);
        assert_eq!(answer(Archetype::MostFrequent, &words, 0), "alpha");
        assert_eq!(answer(Archetype::SecondMostFrequent, &words, 0), "beta");
        assert_eq!(answer(Archetype::LeastFrequent, &words, 0), "gamma");
        assert_eq!(answer(Archetype::Longest, &words, 0), "alpha");
    }

    #[test]
    fn archetype_sets() {
        assert_eq!(ArchetypeSet::Extended.archetypes().len(), 10);
        assert_eq!(
            ArchetypeSet::Classic.archetypes(),
            &[
                Archetype::MostFrequent,
                Archetype::FrequencyOf,
                Archetype::LeastFrequent,
                Archetype::LengthOf
            ]
        );
        assert_eq!("Classic".parse::<ArchetypeSet>(), Ok(ArchetypeSet::Classic));
        assert!("everything".parse::<ArchetypeSet>().is_err());
    }
}
