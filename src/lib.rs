//! Continuous-audio speech recognition core: front end, tied-mixture
//! acoustic scorer, multi-pass Viterbi search, lattice, and VAD/endpointer,
//! behind a single streaming [`decoder::Decoder`].
use std::env;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::{Layer, Registry};

pub mod acoustic;
pub mod bp;
pub mod config;
pub mod decoder;
pub mod endpointer;
pub mod error;
pub mod frontend;
pub mod logmath;
pub mod model;
pub mod search;

pub use decoder::{Decoder, InputMode, SearchSpec};
pub use error::{DecoderError, Result};
pub use logmath::LogMath;

/// Convenience function to set up logging for any binaries built against
/// this crate. Defaults all binaries and this library crate to `info`.
pub fn setup_logging() {
    let filter = match env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_env("RUST_LOG"),
        _ => EnvFilter::new("pocketsphinx_core=info,ps_batch=info,ps_vad=info"),
    };

    let fmt = tracing_subscriber::fmt::Layer::default();

    let subscriber = filter.and_then(fmt).with_subscriber(Registry::default());

    tracing::subscriber::set_global_default(subscriber).unwrap();
}
