//! The N-gram language model contract of spec.md §3: `G` exposes
//! `score(w | h) -> log-prob` and `n_used(h) -> n`; the core treats it as a
//! pure function and never mutates it mid-utterance ("reload swaps the
//! table atomically between utterances").
//!
//! spec.md §1 excludes the binary/ARPA *loader* internals; what the core
//! needs is the trait plus, for testability (SPEC_FULL.md §8), a real ARPA
//! text parser and a simple backing store, grounded on the wire format
//! spec.md §6 names ("LM: ARPA text or proprietary binary; core only calls
//! the opaque score API").
use std::collections::HashMap;
use std::path::Path;

use crate::error::ModelLoadError;
use crate::model::dict::WordId;

/// The opaque N-gram scoring contract every search pass consults.
///
/// `history` is ordered most-recent-first (`history[0]` is the word
/// immediately preceding `word`), matching how fwdtree/fwdflat walk the
/// backpointer chain backwards from the current word.
pub trait NGramModel {
    /// `log10 P(word | history)`, backing off through shorter histories as
    /// needed. Returns a finite, non-positive value.
    fn score(&self, word: WordId, history: &[WordId]) -> f32;

    /// The n-gram order actually applied for this query (spec.md §3:
    /// "back-off order actually applied"), e.g. 3 if a full trigram hit,
    /// 2 if it backed off to a bigram, 1 for unigram.
    fn n_used(&self, word: WordId, history: &[WordId]) -> usize;

    /// Highest order the model supports (2 = bigram, 3 = trigram, ...).
    fn order(&self) -> usize;
}

/// One explicit n-gram entry: `log_prob` in log10, plus an optional
/// back-off weight applied when a higher-order query must fall through to
/// this context.
#[derive(Clone, Copy, Debug)]
struct Entry {
    log_prob: f32,
    backoff: f32,
}

/// A standard ARPA back-off N-gram model, read from the ARPA text format
/// (`\data\`, `\1-grams:`, `\2-grams:`, ... sections). This is the "ARPA
/// text" branch of spec.md §6; the "proprietary binary" branch is out of
/// scope per spec.md §1 (the core only ever calls [`NGramModel`]).
#[derive(Debug, Default)]
pub struct ArpaLm {
    order: usize,
    /// context (oldest..newest word ids, length 0..=order-1) -> entry.
    tables: Vec<HashMap<Vec<WordId>, Entry>>,
}

impl ArpaLm {
    pub fn load(path: &Path) -> Result<Self, ModelLoadError> {
        let text = std::fs::read_to_string(path).map_err(|e| ModelLoadError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse(&text, &path.display().to_string(), |_| None)
    }

    /// Parse ARPA text, resolving each token via `resolve`. Words not
    /// resolvable (e.g. `<unk>` entries when the caller's dictionary
    /// doesn't carry it) are silently skipped, matching how Sphinx's ARPA
    /// reader tolerates vocabulary mismatches between LM and dictionary.
    pub fn parse(
        text: &str,
        path: &str,
        resolve: impl Fn(&str) -> Option<WordId>,
    ) -> Result<Self, ModelLoadError> {
        let mut order = 0usize;
        let mut counts: Vec<usize> = Vec::new();
        let mut tables: Vec<HashMap<Vec<WordId>, Entry>> = Vec::new();
        let mut current_order = 0usize;
        let mut in_data = false;

        for (lineno, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }
            if line == "\\data\\" {
                in_data = true;
                continue;
            }
            if line == "\\end\\" {
                break;
            }
            if let Some(rest) = line.strip_prefix("\\") {
                if let Some(n_str) = rest.strip_suffix("-grams:") {
                    current_order = n_str.parse().map_err(|_| ModelLoadError::Malformed {
                        path: path.to_string(),
                        line: lineno + 1,
                        reason: format!("bad section header '{line}'"),
                    })?;
                    order = order.max(current_order);
                    while tables.len() < current_order {
                        tables.push(HashMap::new());
                    }
                    in_data = false;
                    continue;
                }
            }
            if in_data {
                if let Some(rest) = line.strip_prefix("ngram ") {
                    if let Some((n, c)) = rest.split_once('=') {
                        let n: usize = n.trim().parse().unwrap_or(0);
                        let c: usize = c.trim().parse().unwrap_or(0);
                        if n > 0 {
                            while counts.len() < n {
                                counts.push(0);
                            }
                            counts[n - 1] = c;
                        }
                    }
                }
                continue;
            }
            if current_order == 0 {
                continue;
            }
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 1 + current_order {
                continue;
            }
            let log_prob: f32 = cols[0].parse().map_err(|_| ModelLoadError::Malformed {
                path: path.to_string(),
                line: lineno + 1,
                reason: format!("bad log-prob in '{line}'"),
            })?;
            let words: Option<Vec<WordId>> = cols[1..1 + current_order].iter().map(|w| resolve(w)).collect();
            let words = match words {
                Some(w) => w,
                None => continue,
            };
            let backoff = cols
                .get(1 + current_order)
                .and_then(|s| s.parse::<f32>().ok())
                .unwrap_or(0.0);
            let (ctx, word) = words.split_at(words.len() - 1);
            let mut key = ctx.to_vec();
            key.push(word[0]);
            tables[current_order - 1].insert(key, Entry { log_prob, backoff });
        }
        Ok(Self { order, tables })
    }

    fn lookup(&self, n: usize, words: &[WordId]) -> Option<Entry> {
        self.tables.get(n - 1)?.get(words).copied()
    }

    fn backoff_weight(&self, context: &[WordId]) -> f32 {
        if context.is_empty() {
            return 0.0;
        }
        self.lookup(context.len(), context).map(|e| e.backoff).unwrap_or(0.0)
    }
}

impl NGramModel for ArpaLm {
    fn score(&self, word: WordId, history: &[WordId]) -> f32 {
        let max_order = self.order.max(1);
        let take = history.len().min(max_order - 1);
        // Try longest context first, backing off per the standard ARPA
        // recursion: P(w|h) = P(w|h') * backoff(h) if no direct entry.
        for n in (1..=take + 1).rev() {
            let ctx: Vec<WordId> = history[..n - 1].iter().rev().copied().collect();
            let mut key = ctx.clone();
            key.push(word);
            if let Some(entry) = self.lookup(n, &key) {
                let mut bo = 0.0f32;
                for k in (n..=take).rev() {
                    let shorter_ctx: Vec<WordId> = history[..k].iter().rev().copied().collect();
                    bo += self.backoff_weight(&shorter_ctx);
                }
                return entry.log_prob + bo;
            }
        }
        // Total miss: treat as a very low-probability unigram.
        -99.0
    }

    fn n_used(&self, word: WordId, history: &[WordId]) -> usize {
        let max_order = self.order.max(1);
        let take = history.len().min(max_order - 1);
        for n in (1..=take + 1).rev() {
            let ctx: Vec<WordId> = history[..n - 1].iter().rev().copied().collect();
            let mut key = ctx;
            key.push(word);
            if self.lookup(n, &key).is_some() {
                return n;
            }
        }
        1
    }

    fn order(&self) -> usize {
        self.order.max(1)
    }
}

/// A trivial zero-information LM (every word equally likely), used as the
/// default language model for FSG/JSGF/keyphrase/alignment searches, which
/// supply their own transition scores and only need `NGramModel` for the
/// parts of the pipeline that unconditionally consult one.
#[derive(Debug, Default, Clone, Copy)]
pub struct UniformLm {
    pub log_prob: f32,
}

impl NGramModel for UniformLm {
    fn score(&self, _word: WordId, _history: &[WordId]) -> f32 {
        self.log_prob
    }
    fn n_used(&self, _word: WordId, _history: &[WordId]) -> usize {
        1
    }
    fn order(&self) -> usize {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(n: u32) -> WordId {
        WordId(n)
    }

    #[test]
    fn parses_simple_trigram_arpa() {
        let text = "\\data\\\nngram 1=2\nngram 2=1\nngram 3=1\n\n\\1-grams:\n-1.0 GO -0.3\n-1.0 FORWARD 0.0\n\n\\2-grams:\n-0.5 GO FORWARD -0.1\n\n\\3-grams:\n-0.2 GO FORWARD GO\n\n\\end\\\n";
        let ids = ["GO", "FORWARD"];
        let lm = ArpaLm::parse(text, "test", |tok| {
            ids.iter().position(|&x| x == tok).map(|i| w(i as u32))
        })
        .unwrap();
        assert_eq!(lm.order(), 3);
        let score = lm.score(w(1), &[w(0)]);
        assert_eq!(score, -0.5);
        assert_eq!(lm.n_used(w(1), &[w(0)]), 2);
    }

    #[test]
    fn backs_off_when_no_higher_order_entry() {
        let text = "\\data\\\nngram 1=2\nngram 2=1\n\n\\1-grams:\n-1.0 GO -0.3\n-2.0 FORWARD 0.0\n\n\\2-grams:\n-0.5 GO FORWARD -0.1\n\n\\end\\\n";
        let ids = ["GO", "FORWARD"];
        let lm = ArpaLm::parse(text, "test", |tok| {
            ids.iter().position(|&x| x == tok).map(|i| w(i as u32))
        })
        .unwrap();
        // bigram (FORWARD, GO) doesn't exist: backs off to unigram(GO) + bo(FORWARD)
        let score = lm.score(w(0), &[w(1)]);
        assert_eq!(score, -1.0 + -0.1);
        assert_eq!(lm.n_used(w(0), &[w(1)]), 1);
    }

    #[test]
    fn uniform_lm_is_history_independent() {
        let lm = UniformLm { log_prob: -2.0 };
        assert_eq!(lm.score(w(0), &[w(1), w(2)]), -2.0);
        assert_eq!(lm.n_used(w(0), &[]), 1);
    }
}
