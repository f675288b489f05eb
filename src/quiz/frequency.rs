use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{self, BufRead, BufReader};

use unicode_normalization::UnicodeNormalization;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FrequencyEntry {
    pub term: String,
    pub count: u32,
}

impl FrequencyEntry {
    pub fn new(term: impl Into<String>, count: u32) -> Self {
        Self {
            term: term.into(),
            count,
        }
    }

    /// Length in letters, not bytes.
    pub fn length(&self) -> usize {
        self.term.chars().count()
    }
}

/// Words that never make it into a frequency table.
#[derive(Debug, Clone, Default)]
pub struct StopWords {
    words: HashSet<String>,
}

impl StopWords {
    /// Reads one stop-word per line. Blank lines and `#` comments are skipped.
    pub fn new(file: File) -> io::Result<Self> {
        let reader = BufReader::new(file);
        let mut words = HashSet::new();

        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let word = normalize(line);
            if !word.is_empty() {
                words.insert(word);
            }
        }

        Ok(Self { words })
    }

    pub fn contains(&self, term: &str) -> bool {
        self.words.contains(term)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for StopWords {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            words: iter
                .into_iter()
                .map(|w| normalize(w.as_ref()))
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }
}

/// Lowercases a token and drops everything that is not a letter.
/// Letters with diacritics count as letters, whether or not the accent was
/// stored as a separate combining mark.
fn normalize(token: &str) -> String {
    token
        .nfc()
        .collect::<String>()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphabetic())
        .collect()
}

/// Builds the term -> count table of `text`.
///
/// Tokens are the maximal runs of letters; each one is normalized and dropped if
/// it is a stop-word. The result keeps the order in which terms first appear,
/// which the "first word" and "following word" questions rely on.
pub fn build(text: &str, stopwords: &StopWords) -> Vec<FrequencyEntry> {
    let mut entries: Vec<FrequencyEntry> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    // Combining marks are not alphabetic, so compose them into their letters first
    let text = text.nfc().collect::<String>();

    for token in text.split(|c: char| !c.is_alphabetic()) {
        let term = normalize(token);
        if term.is_empty() || stopwords.contains(&term) {
            continue;
        }

        match positions.get(&term) {
            Some(&idx) => entries[idx].count += 1,
            None => {
                positions.insert(term.clone(), entries.len());
                entries.push(FrequencyEntry::new(term, 1));
            }
        }
    }

    entries
}

/// Number of distinct terms in `words`.
pub fn distinct_terms(words: &[FrequencyEntry]) -> usize {
    words
        .iter()
        .map(|w| w.term.as_str())
        .collect::<HashSet<_>>()
        .len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;

    fn table(entries: &[(&str, u32)]) -> Vec<FrequencyEntry> {
        entries
            .iter()
            .map(|(t, c)| FrequencyEntry::new(*t, *c))
            .collect()
    }

    #[test]
    fn counts_terms_in_first_seen_order() {
        let words = build("cat dog cat bird cat dog", &StopWords::default());
        assert_eq!(words, table(&[("cat", 3), ("dog", 2), ("bird", 1)]));
    }

    #[test]
    fn splits_on_punctuation_and_digits() {
        let words = build("Hello, world!! hello...World42world", &StopWords::default());
        assert_eq!(words, table(&[("hello", 2), ("world", 3)]));
    }

    #[test]
    fn drops_stop_words_after_lowercasing() {
        let stopwords: StopWords = ["The", "and"].into_iter().collect();
        let words = build("The cat AND the dog and THE bird", &stopwords);
        assert_eq!(words, table(&[("cat", 1), ("dog", 1), ("bird", 1)]));
    }

    #[test]
    fn keeps_letters_with_diacritics() {
        let words = build("Café, CAFÉ; niño año", &StopWords::default());
        assert_eq!(words, table(&[("café", 2), ("niño", 1), ("año", 1)]));
    }

    #[test]
    fn decomposed_accents_stay_on_their_letters() {
        let composed = build("perch\u{e9} citt\u{e0} perche", &StopWords::default());
        let decomposed = build("perche\u{301} citta\u{300} perche", &StopWords::default());
        assert_eq!(composed, table(&[("perché", 1), ("città", 1), ("perche", 1)]));
        assert_eq!(decomposed, composed);
    }

    #[test]
    fn decomposed_stop_words_match_composed_text() {
        let stopwords: StopWords = ["perche\u{301}"].into_iter().collect();
        let words = build("perch\u{e9} no", &stopwords);
        assert_eq!(words, table(&[("no", 1)]));
    }

    #[test]
    fn empty_text_gives_empty_table() {
        assert!(build("", &StopWords::default()).is_empty());
        assert!(build(" 123 ... !!", &StopWords::default()).is_empty());
    }

    #[test]
    fn loads_stop_words_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# common words").unwrap();
        writeln!(file, "The").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "  of  ").unwrap();

        let stopwords = StopWords::new(file.reopen().unwrap()).unwrap();
        assert_eq!(stopwords.len(), 2);
        assert!(stopwords.contains("the"));
        assert!(stopwords.contains("of"));
        assert!(!stopwords.contains("# common words"));
    }

    #[test]
    fn distinct_terms_ignores_duplicates() {
        let words = table(&[("cat", 1), ("dog", 1), ("cat", 2)]);
        assert_eq!(distinct_terms(&words), 2);
    }

    proptest! {
        #[test]
        fn building_is_deterministic(text in "[a-zA-Zé ,.!0-9]{0,200}") {
            let stopwords: StopWords = ["a", "the"].into_iter().collect();
            prop_assert_eq!(build(&text, &stopwords), build(&text, &stopwords));
        }

        #[test]
        fn every_entry_is_distinct_and_counted(text in "[a-z ]{0,200}") {
            let words = build(&text, &StopWords::default());
            prop_assert_eq!(distinct_terms(&words), words.len());
            prop_assert!(words.iter().all(|w| w.count >= 1 && !w.term.is_empty()));
            let total: u32 = words.iter().map(|w| w.count).sum();
            prop_assert_eq!(total as usize, text.split_whitespace().count());
        }
    }
}
