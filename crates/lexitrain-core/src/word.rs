//! Word catalog contract.
//!
//! The catalog is owned outside the training core. The core only reads a
//! word's id, frequency rank and part of speech; `lemma` and `translations`
//! ride along for front ends that need to build prompts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;

pub type WordId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartOfSpeech {
    Noun,
    Verb,
    #[serde(alias = "adjective")]
    Adj,
    #[serde(alias = "adverb")]
    Adv,
    #[serde(alias = "preposition")]
    Prep,
    #[serde(alias = "conjunction")]
    Conj,
    #[serde(alias = "pronoun")]
    Pron,
    #[serde(alias = "determiner")]
    Det,
    #[serde(alias = "interjection")]
    Intj,
}

/// Inclusive frequency-rank range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankRange {
    pub start: u32,
    pub end: u32,
}

impl RankRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, rank: u32) -> bool {
        self.start <= rank && rank <= self.end
    }
}

/// Immutable catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordRef {
    pub id: WordId,
    pub frequency_rank: u32,
    #[serde(default)]
    pub part_of_speech: Option<PartOfSpeech>,
    #[serde(default)]
    pub lemma: String,
    #[serde(default)]
    pub translations: Vec<String>,
}

impl WordRef {
    pub fn first_translation(&self) -> &str {
        self.translations.first().map(String::as_str).unwrap_or("")
    }
}

/// Read-only access to the frequency-ranked word catalog.
pub trait WordCatalog {
    fn lookup(&self, id: WordId) -> Option<WordRef>;

    /// Word ids whose rank falls inside `range`, in ascending rank order.
    fn list_by_rank_range(&self, range: RankRange) -> Vec<WordId>;
}

/// In-memory catalog, typically loaded from a JSON file.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    words: BTreeMap<WordId, WordRef>,
}

impl MemoryCatalog {
    pub fn new(words: impl IntoIterator<Item = WordRef>) -> Self {
        Self {
            words: words.into_iter().map(|w| (w.id, w)).collect(),
        }
    }

    /// Load a JSON array of words.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not a valid word list.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let words: Vec<WordRef> = serde_json::from_str(&content)?;
        tracing::debug!(path = %path.display(), words = words.len(), "catalog loaded");
        Ok(Self::new(words))
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WordRef> {
        self.words.values()
    }

    /// Words sharing a part of speech with `word`, for multiple-choice distractors.
    pub fn distractors(&self, word: &WordRef, count: usize) -> Vec<&WordRef> {
        let mut pool: Vec<&WordRef> = self
            .words
            .values()
            .filter(|w| w.id != word.id && w.part_of_speech == word.part_of_speech)
            .collect();
        // Nearest ranks first keeps options at a similar difficulty.
        pool.sort_by_key(|w| w.frequency_rank.abs_diff(word.frequency_rank));
        pool.truncate(count);
        pool
    }
}

impl WordCatalog for MemoryCatalog {
    fn lookup(&self, id: WordId) -> Option<WordRef> {
        self.words.get(&id).cloned()
    }

    fn list_by_rank_range(&self, range: RankRange) -> Vec<WordId> {
        let mut hits: Vec<&WordRef> = self
            .words
            .values()
            .filter(|w| range.contains(w.frequency_rank))
            .collect();
        hits.sort_by_key(|w| (w.frequency_rank, w.id));
        hits.into_iter().map(|w| w.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(id: WordId, rank: u32) -> WordRef {
        WordRef {
            id,
            frequency_rank: rank,
            part_of_speech: Some(PartOfSpeech::Noun),
            lemma: format!("word{id}"),
            translations: vec![format!("slovo{id}")],
        }
    }

    #[test]
    fn list_by_rank_range_is_inclusive_and_sorted() {
        let catalog = MemoryCatalog::new(vec![word(1, 30), word(2, 10), word(3, 20), word(4, 31)]);
        assert_eq!(catalog.list_by_rank_range(RankRange::new(10, 30)), vec![2, 3, 1]);
    }

    #[test]
    fn parses_json_with_pos_aliases() {
        let json = r#"[
            {"id": 1, "lemma": "run", "frequency_rank": 5, "part_of_speech": "verb", "translations": ["бежать"]},
            {"id": 2, "lemma": "quickly", "frequency_rank": 9, "part_of_speech": "adverb"}
        ]"#;
        let words: Vec<WordRef> = serde_json::from_str(json).unwrap();
        assert_eq!(words[1].part_of_speech, Some(PartOfSpeech::Adv));
        assert_eq!(words[0].first_translation(), "бежать");
        assert_eq!(words[1].first_translation(), "");
    }

    #[test]
    fn distractors_share_part_of_speech() {
        let mut verb = word(9, 12);
        verb.part_of_speech = Some(PartOfSpeech::Verb);
        let catalog = MemoryCatalog::new(vec![word(1, 10), word(2, 11), verb, word(3, 50)]);
        let target = catalog.lookup(1).unwrap();
        let picked: Vec<WordId> = catalog.distractors(&target, 2).iter().map(|w| w.id).collect();
        assert_eq!(picked, vec![2, 3]);
    }
}
