//! The context-independent phone inventory and triphone/word-position types
//! of spec.md §3 ("CI phone / triphone").
//!
//! `CiPhone`'s 40 variants and their two-letter `Display` forms follow the
//! standard CMU ARPABET inventory plus one addition: CMU Sphinx treats
//! silence (`SIL`) and a handful of non-speech noise phones as ordinary
//! entries in the CI phone table, so they are added here as variants rather
//! than modeled out-of-band.
use std::fmt;
use std::str::FromStr;

use crate::error::ModelLoadError;

/// A context-independent phone, including the non-speech phones Sphinx
/// treats as first-class members of the CI phone table.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum CiPhone {
    Aa,
    Ae,
    Ah,
    Ao,
    Aw,
    Ay,
    B,
    Ch,
    D,
    Dh,
    Eh,
    Er,
    Ey,
    F,
    G,
    Hh,
    Ih,
    Iy,
    Jh,
    K,
    L,
    M,
    N,
    Ng,
    Ow,
    Oy,
    P,
    R,
    S,
    Sh,
    T,
    Th,
    Uh,
    Uw,
    V,
    W,
    Y,
    Z,
    Zh,
    /// Silence.
    Sil,
}

impl CiPhone {
    /// All 40 CI phones in a fixed, dense order matching their eventual
    /// `CiPhoneId` assignment (used by [`crate::model::mdef::ModelDefinition`]
    /// to build its ciphone table).
    pub const ALL: [CiPhone; 40] = [
        CiPhone::Aa,
        CiPhone::Ae,
        CiPhone::Ah,
        CiPhone::Ao,
        CiPhone::Aw,
        CiPhone::Ay,
        CiPhone::B,
        CiPhone::Ch,
        CiPhone::D,
        CiPhone::Dh,
        CiPhone::Eh,
        CiPhone::Er,
        CiPhone::Ey,
        CiPhone::F,
        CiPhone::G,
        CiPhone::Hh,
        CiPhone::Ih,
        CiPhone::Iy,
        CiPhone::Jh,
        CiPhone::K,
        CiPhone::L,
        CiPhone::M,
        CiPhone::N,
        CiPhone::Ng,
        CiPhone::Ow,
        CiPhone::Oy,
        CiPhone::P,
        CiPhone::R,
        CiPhone::S,
        CiPhone::Sh,
        CiPhone::T,
        CiPhone::Th,
        CiPhone::Uh,
        CiPhone::Uw,
        CiPhone::V,
        CiPhone::W,
        CiPhone::Y,
        CiPhone::Z,
        CiPhone::Zh,
        CiPhone::Sil,
    ];

    /// Whether this phone is silence. Used by word-exit and filler logic
    /// throughout the search.
    pub fn is_silence(&self) -> bool {
        matches!(self, CiPhone::Sil)
    }
}

impl fmt::Display for CiPhone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CiPhone::Aa => "AA",
            CiPhone::Ae => "AE",
            CiPhone::Ah => "AH",
            CiPhone::Ao => "AO",
            CiPhone::Aw => "AW",
            CiPhone::Ay => "AY",
            CiPhone::B => "B",
            CiPhone::Ch => "CH",
            CiPhone::D => "D",
            CiPhone::Dh => "DH",
            CiPhone::Eh => "EH",
            CiPhone::Er => "ER",
            CiPhone::Ey => "EY",
            CiPhone::F => "F",
            CiPhone::G => "G",
            CiPhone::Hh => "HH",
            CiPhone::Ih => "IH",
            CiPhone::Iy => "IY",
            CiPhone::Jh => "JH",
            CiPhone::K => "K",
            CiPhone::L => "L",
            CiPhone::M => "M",
            CiPhone::N => "N",
            CiPhone::Ng => "NG",
            CiPhone::Ow => "OW",
            CiPhone::Oy => "OY",
            CiPhone::P => "P",
            CiPhone::R => "R",
            CiPhone::S => "S",
            CiPhone::Sh => "SH",
            CiPhone::T => "T",
            CiPhone::Th => "TH",
            CiPhone::Uh => "UH",
            CiPhone::Uw => "UW",
            CiPhone::V => "V",
            CiPhone::W => "W",
            CiPhone::Y => "Y",
            CiPhone::Z => "Z",
            CiPhone::Zh => "ZH",
            CiPhone::Sil => "SIL",
        };
        write!(f, "{s}")
    }
}

impl FromStr for CiPhone {
    type Err = ModelLoadError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        // Strip a CMU dict stress marker (e.g. "AH0", "IY2") if present.
        let base = upper.trim_end_matches(['0', '1', '2']);
        Ok(match base {
            "AA" => CiPhone::Aa,
            "AE" => CiPhone::Ae,
            "AH" => CiPhone::Ah,
            "AO" => CiPhone::Ao,
            "AW" => CiPhone::Aw,
            "AY" => CiPhone::Ay,
            "B" => CiPhone::B,
            "CH" => CiPhone::Ch,
            "D" => CiPhone::D,
            "DH" => CiPhone::Dh,
            "EH" => CiPhone::Eh,
            "ER" => CiPhone::Er,
            "EY" => CiPhone::Ey,
            "F" => CiPhone::F,
            "G" => CiPhone::G,
            "HH" => CiPhone::Hh,
            "IH" => CiPhone::Ih,
            "IY" => CiPhone::Iy,
            "JH" => CiPhone::Jh,
            "K" => CiPhone::K,
            "L" => CiPhone::L,
            "M" => CiPhone::M,
            "N" => CiPhone::N,
            "NG" => CiPhone::Ng,
            "OW" => CiPhone::Ow,
            "OY" => CiPhone::Oy,
            "P" => CiPhone::P,
            "R" => CiPhone::R,
            "S" => CiPhone::S,
            "SH" => CiPhone::Sh,
            "T" => CiPhone::T,
            "TH" => CiPhone::Th,
            "UH" => CiPhone::Uh,
            "UW" => CiPhone::Uw,
            "V" => CiPhone::V,
            "W" => CiPhone::W,
            "Y" => CiPhone::Y,
            "Z" => CiPhone::Z,
            "ZH" => CiPhone::Zh,
            "SIL" | "SILENCE" => CiPhone::Sil,
            other => {
                return Err(ModelLoadError::UnknownSymbol {
                    what: "CI phone",
                    name: other.to_string(),
                })
            }
        })
    }
}

/// A word's position within its pronunciation, used to pick the correct
/// triphone variant at word boundaries (spec.md §3).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum WordPosition {
    /// First phone of a multi-phone word.
    Begin,
    /// Last phone of a multi-phone word.
    End,
    /// Neither first nor last phone of a multi-phone word.
    Internal,
    /// The only phone of a single-phone word.
    Single,
}

/// A context-dependent phone: a base phone plus left/right context and
/// word position. The core only ever looks this up to obtain an
/// [`crate::model::mdef::Ssid`]; it never inspects its fields beyond
/// equality, so `Hash`/`Eq` is what matters for the triphone table lookup.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Triphone {
    pub base: CiPhone,
    pub left: Option<CiPhone>,
    pub right: Option<CiPhone>,
    pub position: WordPosition,
}

impl Triphone {
    pub fn new(base: CiPhone, left: Option<CiPhone>, right: Option<CiPhone>, position: WordPosition) -> Self {
        Self {
            base,
            left,
            right,
            position,
        }
    }

    /// A context-independent triphone (used when no mdef entry exists for
    /// the specific context, the standard CI fallback).
    pub fn context_independent(base: CiPhone) -> Self {
        Self {
            base,
            left: None,
            right: None,
            position: WordPosition::Single,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_round_trips_through_from_str() {
        for p in CiPhone::ALL {
            let s = p.to_string();
            assert_eq!(s.parse::<CiPhone>().unwrap(), p);
        }
    }

    #[test]
    fn from_str_strips_stress_markers() {
        assert_eq!("AH0".parse::<CiPhone>().unwrap(), CiPhone::Ah);
        assert_eq!("IY2".parse::<CiPhone>().unwrap(), CiPhone::Iy);
    }

    #[test]
    fn unknown_phone_is_an_error() {
        assert!("XX".parse::<CiPhone>().is_err());
    }
}
