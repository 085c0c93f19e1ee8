//! Dictionary: word -> pronunciation(s), per spec.md §3/§6.
//!
//! Text format: one word per line, `WORD PHONE PHONE PHONE`; pronunciation
//! alternates spelled `WORD(2)`, `WORD(3)`, ... all pointing back to the
//! same base word id, exactly as spec.md §6 describes and as
//! `examples/original_source/include/dict.h` documents (`dict_entry_t::alt`,
//! `::wid`). Words may be added at runtime; ids stay dense (spec.md §3).
use std::collections::HashMap;
use std::path::Path;

use crate::error::ModelLoadError;
use crate::model::phone::CiPhone;

/// A dense word id. `0` is conventionally `<s>`, the last id before fillers
/// is the last real word, per spec.md §4.4 ("`<s>` appears once at frame 0").
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct WordId(pub u32);

/// One dictionary entry: a pronunciation and its relationship to
/// alternates/base words and filler classification.
#[derive(Clone, Debug)]
pub struct WordEntry {
    pub word: String,
    pub pronunciation: Vec<CiPhone>,
    /// The base word id this entry is an alternate pronunciation of, or its
    /// own id if it is the base/only pronunciation.
    pub base_wid: WordId,
    pub is_filler: bool,
}

/// The dictionary: dense array of word entries plus name -> id lookup.
#[derive(Clone, Debug, Default)]
pub struct Dictionary {
    entries: Vec<WordEntry>,
    by_name: HashMap<String, WordId>,
    /// First word id that is a filler (spec.md §3: "Filler words and
    /// silence are first-class backpointers; they are distinguished by the
    /// dictionary").
    filler_start: Option<u32>,
}

/// The built-in start-of-utterance marker, always word id 0 once the
/// dictionary is initialized via [`Dictionary::new`].
pub const START_WORD: &str = "<s>";
/// The built-in end-of-utterance marker.
pub const END_WORD: &str = "</s>";
/// The conventional silence filler word.
pub const SILENCE_WORD: &str = "<sil>";

impl Dictionary {
    /// An empty dictionary pre-seeded with `<s>`, `</s>`, and `<sil>`,
    /// matching how `dict_init` always reserves these three in the real
    /// loader before reading the text dictionary file.
    pub fn new() -> Self {
        let mut dict = Self::default();
        dict.add_filler(START_WORD, &[]);
        dict.add_filler(END_WORD, &[]);
        dict.add_filler(SILENCE_WORD, &[CiPhone::Sil]);
        dict
    }

    fn add_filler(&mut self, word: &str, pron: &[CiPhone]) -> WordId {
        let wid = WordId(self.entries.len() as u32);
        self.entries.push(WordEntry {
            word: word.to_string(),
            pronunciation: pron.to_vec(),
            base_wid: wid,
            is_filler: true,
        });
        self.by_name.insert(word.to_string(), wid);
        if self.filler_start.is_none() {
            self.filler_start = Some(wid.0);
        }
        wid
    }

    /// Add a regular (non-filler) word at runtime (spec.md §3: "Words may
    /// be added at runtime; ids are dense"). Alternates are named
    /// `BASE(2)`, `BASE(3)`, ... and automatically linked to the first
    /// pronunciation of `BASE`.
    pub fn add_word(&mut self, word: &str, pronunciation: Vec<CiPhone>) -> WordId {
        let wid = WordId(self.entries.len() as u32);
        let base_wid = self.base_name(word).and_then(|b| self.by_name.get(b)).copied().unwrap_or(wid);
        self.entries.push(WordEntry {
            word: word.to_string(),
            pronunciation,
            base_wid,
            is_filler: false,
        });
        self.by_name.insert(word.to_string(), wid);
        wid
    }

    /// Remove the most recently added word, restoring prior state. Only
    /// the last-added word may be removed, keeping ids dense (spec.md §8's
    /// "dictionary add/remove" property is checked against exactly this
    /// restriction: add, decode, then undo via this method).
    pub fn remove_last(&mut self) -> Option<WordEntry> {
        let entry = self.entries.pop()?;
        self.by_name.remove(&entry.word);
        Some(entry)
    }

    fn base_name<'a>(&self, word: &'a str) -> Option<&'a str> {
        let open = word.find('(')?;
        if word.ends_with(')') {
            Some(&word[..open])
        } else {
            None
        }
    }

    pub fn lookup(&self, word: &str) -> Option<WordId> {
        self.by_name.get(word).copied()
    }

    pub fn entry(&self, wid: WordId) -> &WordEntry {
        &self.entries[wid.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn start_word(&self) -> WordId {
        self.by_name[START_WORD]
    }

    pub fn end_word(&self) -> WordId {
        self.by_name[END_WORD]
    }

    pub fn is_filler(&self, wid: WordId) -> bool {
        self.entries[wid.0 as usize].is_filler
    }

    /// Every non-base alternate's id resolves to the same base id, per
    /// spec.md §3 ("each entry has a base-word id, pronunciation
    /// alternates point to a base").
    pub fn base_word(&self, wid: WordId) -> WordId {
        self.entries[wid.0 as usize].base_wid
    }

    pub fn iter(&self) -> impl Iterator<Item = (WordId, &WordEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (WordId(i as u32), e))
    }

    /// Parse the text dictionary format of spec.md §6: `WORD PHONE PHONE
    /// PHONE`, alternates as `WORD(2)`.
    pub fn load_text(path: &Path) -> Result<Self, ModelLoadError> {
        let text = std::fs::read_to_string(path).map_err(|e| ModelLoadError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse_text(&text, &path.display().to_string())
    }

    fn parse_text(text: &str, path: &str) -> Result<Self, ModelLoadError> {
        let mut dict = Self::new();
        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            let mut cols = line.split_whitespace();
            let word = cols.next().ok_or_else(|| ModelLoadError::Malformed {
                path: path.to_string(),
                line: i + 1,
                reason: "empty line".to_string(),
            })?;
            let mut pron = Vec::new();
            for tok in cols {
                let phone: CiPhone = tok.parse()?;
                pron.push(phone);
            }
            if pron.is_empty() {
                return Err(ModelLoadError::Malformed {
                    path: path.to_string(),
                    line: i + 1,
                    reason: format!("word '{word}' has no pronunciation"),
                });
            }
            dict.add_word(word, pron);
        }
        Ok(dict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_dictionary_seeds_sentence_markers() {
        let d = Dictionary::new();
        assert_eq!(d.start_word(), WordId(0));
        assert!(d.is_filler(d.start_word()));
        assert!(d.is_filler(d.lookup(SILENCE_WORD).unwrap()));
    }

    #[test]
    fn alternates_share_base_word_id() {
        let mut d = Dictionary::new();
        let base = d.add_word("READ", vec![CiPhone::R, CiPhone::Iy, CiPhone::D]);
        let alt = d.add_word("READ(2)", vec![CiPhone::R, CiPhone::Eh, CiPhone::D]);
        assert_eq!(d.base_word(alt), base);
        assert_eq!(d.base_word(base), base);
    }

    #[test]
    fn add_then_remove_restores_prior_state() {
        let mut d = Dictionary::new();
        let before = d.len();
        d.add_word("ZEBRA", vec![CiPhone::Z, CiPhone::Iy, CiPhone::B, CiPhone::R, CiPhone::Ah]);
        assert!(d.lookup("ZEBRA").is_some());
        d.remove_last();
        assert_eq!(d.len(), before);
        assert!(d.lookup("ZEBRA").is_none());
    }

    #[test]
    fn parses_text_dictionary_with_alternate() {
        let text = "GO G OW\nFORWARD F AO R W ER D\nFORWARD(2) F OW R W ER D\n";
        let d = Dictionary::parse_text(text, "test").unwrap();
        assert!(d.lookup("GO").is_some());
        let alt = d.lookup("FORWARD(2)").unwrap();
        let base = d.lookup("FORWARD").unwrap();
        assert_eq!(d.base_word(alt), base);
    }
}
