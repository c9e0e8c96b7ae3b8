//! Word-frequency table and round bookkeeping.

use std::collections::{BTreeMap, HashMap, HashSet};

/// Case-sensitive token frequencies of an uploaded text.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WordTable {
    counts: HashMap<String, usize>,
}

impl WordTable {
    /// Counts whitespace-delimited tokens; blank lines contribute nothing.
    pub fn from_text(text: &str) -> Self {
        let mut counts = HashMap::new();
        for token in text.split_whitespace() {
            *counts.entry(token.to_string()).or_insert(0) += 1;
        }
        Self { counts }
    }

    pub fn count(&self, word: &str) -> Option<usize> {
        self.counts.get(word).copied()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// State of the current guessing round.
#[derive(Debug, Default)]
pub(crate) struct Round {
    target: Option<String>,
    guessing_open: bool,
    guesses: BTreeMap<String, i64>,
    used_words: HashSet<String>,
}

impl Round {
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn is_used(&self, word: &str) -> bool {
        self.used_words.contains(word)
    }

    pub fn guessing_open(&self) -> bool {
        self.guessing_open
    }

    /// Sets the target word and opens the guessing window.
    pub fn open(&mut self, word: String) {
        self.target = Some(word);
        self.guesses.clear();
        self.guessing_open = true;
    }

    /// Records (or overwrites) a player's guess.
    pub fn record(&mut self, name: &str, guess: i64) {
        self.guesses.insert(name.to_string(), guess);
    }

    pub fn has_guessed(&self, name: &str) -> bool {
        self.guesses.contains_key(name)
    }

    pub fn close_window(&mut self) {
        self.guessing_open = false;
    }

    /// Retires the consumed target word and forgets all guesses.
    pub fn reset(&mut self) {
        if let Some(word) = self.target.take() {
            self.used_words.insert(word);
        }
        self.guesses.clear();
        self.guessing_open = false;
    }

    /// The player among `eligible` whose guess is closest to `actual`.
    ///
    /// Guesses are scanned in ascending name order and only a strictly
    /// smaller difference replaces the current best, so ties go to the
    /// lexicographically smallest name.
    pub fn winner<'a>(
        &self,
        actual: usize,
        eligible: impl IntoIterator<Item = &'a str>,
    ) -> Option<String> {
        let eligible: HashSet<&str> = eligible.into_iter().collect();
        let actual = actual as i128;
        let mut best: Option<(&str, i128)> = None;
        for (name, guess) in &self.guesses {
            if !eligible.contains(name.as_str()) {
                continue;
            }
            let diff = (*guess as i128 - actual).abs();
            if best.map_or(true, |(_, current)| diff < current) {
                best = Some((name.as_str(), diff));
            }
        }
        best.map(|(name, _)| name.to_string())
    }
}
