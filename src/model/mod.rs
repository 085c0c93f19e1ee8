//! Pinned-down contracts for the "excluded collaborators" of spec.md §1:
//! model-file parsers (acoustic model means/vars/mixture-weights readers,
//! ARPA/binary LM readers, dictionary loaders, HMM definition readers).
//!
//! spec.md excludes their *internal organization* from the core's scope,
//! but the core still needs a concrete in-memory shape to compile and test
//! against (SPEC_FULL.md §6); this module provides that shape along with
//! working text-format parsers (ARPA LM, text dictionary, text mdef) for
//! the parts spec.md §8 needs to test without a vendored binary model.
pub mod dict;
pub mod mdef;
pub mod means;
pub mod ngram;
pub mod phone;

pub use dict::{Dictionary, WordEntry, WordId};
pub use mdef::{ModelDefinition, SenoneId, Ssid, TmatId};
pub use means::{Codebook, MixtureWeights};
pub use ngram::{ArpaLm, NGramModel, UniformLm};
pub use phone::{CiPhone, Triphone, WordPosition};
