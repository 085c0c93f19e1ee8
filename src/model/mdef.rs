//! The model-definition table: ciphone table, triphone table, and
//! senone-sequence table of spec.md §3 ("The model-definition table maps
//! every triphone to a senone-sequence id ... and each ssid maps to the
//! ordered tuple of senones for that phone's HMM states").
//!
//! spec.md §1 excludes the on-disk `mdef` binary/text reader itself (it's
//! one of the "model-file parsers" collaborators); what the core actually
//! needs is the in-memory shape this module provides plus enough of a
//! parser to make it testable without a real acoustic model, per
//! SPEC_FULL.md §6. The text `mdef` format (the historical Sphinx3 ASCII
//! variant) is what we parse; it is line-oriented and documented in
//! `examples/original_source/include/mdef.h`.
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::error::ModelLoadError;
use crate::model::phone::{CiPhone, Triphone, WordPosition};

/// A senone id: an index into the shared pool of tied HMM states.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct SenoneId(pub u32);

/// A senone-sequence id: identifies the ordered tuple of senones used by
/// one phone's HMM states (spec.md glossary "SSID").
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Ssid(pub u32);

/// A transition-matrix id, shared by all HMMs of the same topology.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct TmatId(pub u32);

impl fmt::Display for SenoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The model-definition table: maps triphones to senone-sequence ids, and
/// senone-sequence ids to their ordered senone tuples.
///
/// Construction mirrors `mdef_init`/`mdef_read` in
/// `examples/original_source/src/libpocketsphinx/mdef.c`: a ciphone table
/// is built first (so CI triphones always resolve even for contexts never
/// seen in training), then explicit triphone entries refine that with
/// context-dependent ssids.
#[derive(Debug)]
pub struct ModelDefinition {
    n_senone: usize,
    n_state_per_hmm: usize,
    /// ssid -> ordered senone tuple (one entry per emitting HMM state).
    senone_seqs: Vec<Vec<SenoneId>>,
    /// Context-independent fallback: base phone -> ssid.
    ci_ssid: HashMap<CiPhone, Ssid>,
    /// Full triphone table: triphone -> ssid.
    triphone_ssid: HashMap<Triphone, Ssid>,
    /// Every triphone (and CI phone) shares one of a small number of
    /// transition-matrix topologies; here we keep it simple and give every
    /// ssid the same tmat id, as the 3-state left-to-right topology is
    /// universal in default Sphinx models.
    tmat: TmatId,
}

impl ModelDefinition {
    /// Build a definition from explicit tables (used by tests and by the
    /// text-format loader below).
    pub fn new(
        n_state_per_hmm: usize,
        senone_seqs: Vec<Vec<SenoneId>>,
        ci_ssid: HashMap<CiPhone, Ssid>,
        triphone_ssid: HashMap<Triphone, Ssid>,
    ) -> Self {
        let n_senone = senone_seqs
            .iter()
            .flat_map(|seq| seq.iter().map(|s| s.0))
            .max()
            .map(|m| m as usize + 1)
            .unwrap_or(0);
        Self {
            n_senone,
            n_state_per_hmm,
            senone_seqs,
            ci_ssid,
            triphone_ssid,
            tmat: TmatId(0),
        }
    }

    /// A minimal definition covering exactly the CI phone set, one senone
    /// per phone per state (a "flat" tied-state model with no context
    /// dependence), entirely synthetic. This is what lets unit/integration
    /// tests exercise the full search stack without a vendored acoustic
    /// model: every context-dependent lookup falls back to the CI ssid.
    pub fn synthetic_ci(n_state_per_hmm: usize) -> Self {
        let mut senone_seqs = Vec::with_capacity(CiPhone::ALL.len());
        let mut ci_ssid = HashMap::new();
        let mut next_senone = 0u32;
        for (i, phone) in CiPhone::ALL.into_iter().enumerate() {
            let seq: Vec<SenoneId> = (0..n_state_per_hmm)
                .map(|_| {
                    let id = SenoneId(next_senone);
                    next_senone += 1;
                    id
                })
                .collect();
            senone_seqs.push(seq);
            ci_ssid.insert(phone, Ssid(i as u32));
        }
        Self::new(n_state_per_hmm, senone_seqs, ci_ssid, HashMap::new())
    }

    pub fn n_senone(&self) -> usize {
        self.n_senone
    }

    pub fn n_state_per_hmm(&self) -> usize {
        self.n_state_per_hmm
    }

    pub fn n_ssid(&self) -> usize {
        self.senone_seqs.len()
    }

    /// The senones making up one ssid's HMM, in state order.
    pub fn senones(&self, ssid: Ssid) -> &[SenoneId] {
        &self.senone_seqs[ssid.0 as usize]
    }

    /// The transition-matrix id for any ssid (uniform topology).
    pub fn tmat(&self, _ssid: Ssid) -> TmatId {
        self.tmat
    }

    /// Natural-log self-loop and forward-advance transition probabilities
    /// for `tmat`. Every default Sphinx acoustic model ships the same
    /// left-to-right 3-state topology with no skip transitions, so a
    /// single uniform pair suffices; real tmat files (excluded per spec.md
    /// §1, a model-file parser concern) would vary this per state.
    pub fn tmat_ln_probs(&self, _tmat: TmatId) -> (f32, f32) {
        (std::f32::consts::LN_2 * -1.0, std::f32::consts::LN_2 * -1.0)
    }

    /// Resolve a triphone to its ssid, falling back to the CI phone's ssid
    /// if no context-dependent entry exists for this specific context —
    /// exactly the fallback spec.md §3 describes ("The core treats
    /// triphones as opaque ssid+tmatid pairs").
    pub fn ssid_for_triphone(&self, tri: &Triphone) -> Option<Ssid> {
        self.triphone_ssid
            .get(tri)
            .copied()
            .or_else(|| self.ci_ssid.get(&tri.base).copied())
    }

    /// Resolve a bare CI phone (no context) to its ssid.
    pub fn ssid_for_ciphone(&self, phone: CiPhone) -> Option<Ssid> {
        self.ci_ssid.get(&phone).copied()
    }

    /// Parse the historical Sphinx3 text `mdef` format: a header giving
    /// counts, then one line per model:
    /// `base left right position n_state s1 s2 ... N`, where the last
    /// "state" is the non-emitting exit state and is dropped.
    pub fn load_text(path: &Path) -> Result<Self, ModelLoadError> {
        let text = std::fs::read_to_string(path).map_err(|e| ModelLoadError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse_text(&text, &path.display().to_string())
    }

    fn parse_text(text: &str, path: &str) -> Result<Self, ModelLoadError> {
        let mut senone_seqs: Vec<Vec<SenoneId>> = Vec::new();
        let mut ci_ssid = HashMap::new();
        let mut triphone_ssid = HashMap::new();
        let mut n_state_per_hmm = 3usize;
        let mut lineno = 0usize;

        for line in text.lines() {
            lineno += 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with("0.3") {
                continue;
            }
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 6 {
                return Err(ModelLoadError::Malformed {
                    path: path.to_string(),
                    line: lineno,
                    reason: format!("expected at least 6 columns, got {}", cols.len()),
                });
            }
            let base: CiPhone = cols[0].parse()?;
            let left = parse_ctx(cols[1]);
            let right = parse_ctx(cols[2]);
            let position = parse_position(cols[3]).map_err(|reason| ModelLoadError::Malformed {
                path: path.to_string(),
                line: lineno,
                reason,
            })?;
            let senone_cols = &cols[5..];
            if senone_cols.is_empty() {
                return Err(ModelLoadError::Malformed {
                    path: path.to_string(),
                    line: lineno,
                    reason: "no senone ids given".to_string(),
                });
            }
            n_state_per_hmm = senone_cols.len();
            let mut seq = Vec::with_capacity(senone_cols.len());
            for s in senone_cols {
                let id: u32 = s.parse().map_err(|_| ModelLoadError::Malformed {
                    path: path.to_string(),
                    line: lineno,
                    reason: format!("invalid senone id '{s}'"),
                })?;
                seq.push(SenoneId(id));
            }
            let ssid = Ssid(senone_seqs.len() as u32);
            senone_seqs.push(seq);

            if left.is_none() && right.is_none() {
                ci_ssid.insert(base, ssid);
            } else {
                triphone_ssid.insert(Triphone::new(base, left, right, position), ssid);
            }
        }
        Ok(Self::new(n_state_per_hmm, senone_seqs, ci_ssid, triphone_ssid))
    }
}

fn parse_ctx(s: &str) -> Option<CiPhone> {
    if s == "-" {
        None
    } else {
        s.parse().ok()
    }
}

fn parse_position(s: &str) -> Result<WordPosition, String> {
    match s {
        "b" => Ok(WordPosition::Begin),
        "e" => Ok(WordPosition::End),
        "i" => Ok(WordPosition::Internal),
        "s" => Ok(WordPosition::Single),
        "-" => Ok(WordPosition::Single),
        other => Err(format!("unknown word position code '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_ci_covers_every_phone() {
        let mdef = ModelDefinition::synthetic_ci(3);
        for phone in CiPhone::ALL {
            assert!(mdef.ssid_for_ciphone(phone).is_some());
        }
        assert_eq!(mdef.n_senone(), CiPhone::ALL.len() * 3);
    }

    #[test]
    fn triphone_falls_back_to_ci_ssid() {
        let mdef = ModelDefinition::synthetic_ci(3);
        let tri = Triphone::new(CiPhone::Aa, Some(CiPhone::B), Some(CiPhone::K), WordPosition::Internal);
        let ssid = mdef.ssid_for_triphone(&tri).unwrap();
        assert_eq!(ssid, mdef.ssid_for_ciphone(CiPhone::Aa).unwrap());
    }

    #[test]
    fn parses_text_mdef_with_explicit_triphone() {
        let text = "AA b k i 3 10 11 12 N\nAA - - - 3 0 1 2 N\n";
        let mdef = ModelDefinition::parse_text(text, "test").unwrap();
        assert_eq!(mdef.n_ssid(), 2);
        let tri = Triphone::new(CiPhone::Aa, Some(CiPhone::B), Some(CiPhone::K), WordPosition::Internal);
        let ssid = mdef.ssid_for_triphone(&tri).unwrap();
        assert_eq!(mdef.senones(ssid), &[SenoneId(10), SenoneId(11), SenoneId(12)]);
    }
}
