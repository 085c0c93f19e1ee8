//! VAD-based utterance endpointing (spec.md §4.7), grounded on
//! `examples/original_source/include/pocketsphinx/endpointer.h`.
pub mod endpointer;
pub mod vad;

pub use endpointer::Endpointer;
pub use vad::{Vad, VadClass, VadMode};
