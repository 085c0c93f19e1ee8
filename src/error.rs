//! The uniform error surface for the recognition core.
//!
//! The original C library reports failures through a single `int` return
//! convention (negative = error, 0 = ok, positive = count) and logs fatal
//! conditions through a configurable sink before returning a sentinel. We
//! replace that with a finite `DecoderError` enum: callers match on the
//! variant instead of re-deriving meaning from a magic number, and every
//! fallible entry point returns `Result<T, DecoderError>`.
use thiserror::Error;

/// Errors raised while validating or building a [`crate::config::DecoderConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A beam width must be a negative log-probability (i.e. <= 0.0).
    #[error("invalid beam width {name}: {value} (must be <= 0.0)")]
    InvalidBeam {
        /// Which beam parameter failed validation.
        name: &'static str,
        /// The offending value.
        value: f64,
    },
    /// FFT size must be a power of two, and >= frame size in samples.
    #[error("fft size {nfft} must be a power of two >= frame size {frame_size}")]
    InvalidFftSize {
        /// Requested FFT size.
        nfft: usize,
        /// Frame size in samples implied by window length and sample rate.
        frame_size: usize,
    },
    /// The requested upper mel-filterbank edge exceeds Nyquist.
    #[error("upper filter edge {upperf} exceeds Nyquist frequency {nyquist}")]
    UpperBandAboveNyquist {
        /// Requested upper edge in Hz.
        upperf: f32,
        /// Nyquist frequency implied by the sample rate.
        nyquist: f32,
    },
    /// An unknown warp transform name was given.
    #[error("unknown frequency warp transform: {0}")]
    UnknownTransform(String),
    /// An unknown VAD aggressiveness mode was given.
    #[error("unknown VAD mode: {0}")]
    UnknownVadMode(String),
    /// An unknown DCT variant name was given.
    #[error("unknown DCT type: {0}")]
    UnknownDctType(String),
}

/// Errors raised while loading model artifacts (dictionary, model
/// definition, language model, Gaussian parameters).
#[derive(Debug, Error)]
pub enum ModelLoadError {
    /// The named file could not be opened.
    #[error("could not open model file '{path}': {source}")]
    Io {
        /// Path that failed to open.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A line or record in a text-format model file was malformed.
    #[error("malformed entry in '{path}' at line {line}: {reason}")]
    Malformed {
        /// Path of the file being parsed.
        path: String,
        /// 1-based line number.
        line: usize,
        /// Human-readable reason.
        reason: String,
    },
    /// Two model components disagree on a shared dimension (e.g. the
    /// acoustic model and the model-definition file disagree on senone
    /// count).
    #[error("dimension mismatch: {what} expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Which dimension disagreed.
        what: &'static str,
        /// Expected value (from the first-loaded component).
        expected: usize,
        /// Actual value (from the component being checked).
        actual: usize,
    },
    /// A referenced word, phone, or senone id was not found.
    #[error("unknown {what}: '{name}'")]
    UnknownSymbol {
        /// Kind of symbol (word, phone, ...).
        what: &'static str,
        /// The symbol's text.
        name: String,
    },
}

/// Errors raised by the streaming entry points ([`crate::decoder::Decoder::process_raw`], etc).
#[derive(Debug, Error)]
pub enum InputError {
    /// `process_raw`/`process_cep` was called with zero-length input.
    #[error("zero-length audio buffer")]
    EmptyInput,
    /// A streaming call arrived before `start_utt` was invoked.
    #[error("utterance not started: call start_utt() first")]
    UtteranceNotStarted,
    /// `start_utt` was called while an utterance was already active.
    #[error("utterance already started: call end_utt() first")]
    UtteranceAlreadyStarted,
    /// Raw PCM was given to a decoder configured for cepstral (pre-computed
    /// feature) input, or vice versa.
    #[error("input mode mismatch: decoder expects {expected}, got {actual}")]
    ModeMismatch {
        /// What the decoder was configured to accept.
        expected: &'static str,
        /// What was actually supplied.
        actual: &'static str,
    },
}

/// Errors raised by the search passes.
#[derive(Debug, Error)]
pub enum SearchError {
    /// No `</s>` (or final) backpointer was reachable at utterance end.
    #[error("no hypothesis: search produced no reachable final backpointer")]
    NoHypothesis,
    /// A word referenced by an FSG/JSGF transition is not in the dictionary.
    #[error("word '{0}' not found in the active dictionary")]
    WordNotInDictionary(String),
}

/// Errors raised by lattice construction and query operations.
#[derive(Debug, Error)]
pub enum LatticeError {
    /// `get_lattice` was called before the utterance finished.
    #[error("lattice requested before utterance end")]
    UtteranceNotFinished,
    /// `get_lattice` was called after a new utterance started and the
    /// previous lattice was not retained.
    #[error("lattice not available: not retained across start_utt()")]
    NotRetained,
    /// The lattice has no nodes reachable from both `<s>` and `</s>`.
    #[error("lattice is empty after reachability pruning")]
    Empty,
}

/// The crate's top-level error type. Every fallible public entry point
/// returns `Result<T, DecoderError>`.
#[derive(Debug, Error)]
pub enum DecoderError {
    /// Invalid configuration detected at initialization time.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
    /// A model artifact failed to load or was internally inconsistent.
    #[error("model load error: {0}")]
    ModelLoad(#[from] ModelLoadError),
    /// Allocation or other unrecoverable resource failure. Fatal: the
    /// decoder instance should be discarded.
    #[error("resource error: {0}")]
    Resource(String),
    /// A soft input error. The decoder's state is unchanged; the caller
    /// may retry with corrected input.
    #[error("input error: {0}")]
    Input(#[from] InputError),
    /// A search pass could not produce a result.
    #[error("search error: {0}")]
    Search(#[from] SearchError),
    /// A lattice operation could not be completed.
    #[error("lattice error: {0}")]
    Lattice(#[from] LatticeError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DecoderError>;
