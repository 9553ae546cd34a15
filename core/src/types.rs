//! Value types returned by the Elpis endpoints.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Word type to frequency, from `dataset/prepare`.
pub type WordList = BTreeMap<String, u64>;

/// Metric name to value, from `model/results`.
pub type ModelResults = BTreeMap<String, String>;

/// One pronunciation-dictionary entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexiconEntry {
    pub word: String,
    pub pronunciation: String,
}

/// Ordered word to pronunciation mapping.
///
/// Entries keep the order they were first inserted in; inserting a word that
/// is already present replaces its pronunciation in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lexicon {
    entries: Vec<LexiconEntry>,
}

impl Lexicon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the service's lexicon text: `word pronunciation` per line, split
    /// at the first space. Lines without a word before a space are skipped.
    pub fn parse(text: &str) -> Self {
        let mut lexicon = Lexicon::new();
        for (number, line) in text.lines().enumerate() {
            match line.find(' ') {
                Some(space) if space > 0 => {
                    lexicon.insert(&line[..space], &line[space + 1..]);
                }
                _ => {
                    if !line.is_empty() {
                        warn!(line = number, content = line, "ignoring lexicon line with no space");
                    }
                }
            }
        }
        lexicon
    }

    pub fn insert(&mut self, word: impl Into<String>, pronunciation: impl Into<String>) {
        let word = word.into();
        let pronunciation = pronunciation.into();
        match self.entries.iter_mut().find(|e| e.word == word) {
            Some(entry) => entry.pronunciation = pronunciation,
            None => self.entries.push(LexiconEntry {
                word,
                pronunciation,
            }),
        }
    }

    pub fn get(&self, word: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.word == word)
            .map(|e| e.pronunciation.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LexiconEntry> {
        self.entries.iter()
    }
}

impl<W: Into<String>, P: Into<String>> FromIterator<(W, P)> for Lexicon {
    fn from_iter<I: IntoIterator<Item = (W, P)>>(iter: I) -> Self {
        let mut lexicon = Lexicon::new();
        for (word, pronunciation) in iter {
            lexicon.insert(word, pronunciation);
        }
        lexicon
    }
}

/// The upload format: `word pronunciation\n` per entry.
impl fmt::Display for Lexicon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{} {}", entry.word, entry.pronunciation)?;
        }
        Ok(())
    }
}

/// Read a lexicon file for upload.
///
/// Lines are re-joined with `\n` (CRLF endings are normalised) and a final
/// `\n` is added when the last line is not empty. An empty file yields an
/// empty string.
pub fn read_lexicon_file(path: &Path) -> std::io::Result<String> {
    let text = std::fs::read_to_string(path)?;
    let lines: Vec<&str> = text.lines().collect();
    let mut content = lines.join("\n");
    if lines.last().is_some_and(|last| !last.is_empty()) {
        content.push('\n');
    }
    Ok(content)
}
