//! Decoder configuration: the typed equivalent of the `cmd_ln` flag surface
//! described in spec.md §6.
//!
//! [`DecoderConfig`] is what the library itself consumes; it has no
//! dependency on `clap`. [`CliArgs`] is the `clap::Parser` derive used by
//! the `ps_batch` binary: the library doesn't know CLI flags exist, only
//! the binary does.
use crate::error::ConfigError;
use clap::Parser;
use std::path::PathBuf;
use std::str::FromStr;

/// The three DCT variants accepted by the front end (spec.md §4.1).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DctType {
    /// The original, non-orthogonal Sphinx DCT.
    Legacy,
    /// Standard orthogonal DCT-II.
    DctII,
    /// HTK-compatible DCT variant.
    Htk,
}

impl FromStr for DctType {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "legacy" | "1" => Ok(Self::Legacy),
            "dct2" | "dct-ii" | "2" => Ok(Self::DctII),
            "htk" => Ok(Self::Htk),
            other => Err(ConfigError::UnknownDctType(other.to_string())),
        }
    }
}

/// Frequency-warp transforms composable with the mel scale (spec.md §4.1).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WarpKind {
    /// No warp: identity.
    Identity,
    /// `w' = a*w + b`.
    Affine {
        /// Scale, clamped to `[0.1, 10.0]`.
        scale: f32,
        /// Offset in Hz, clamped to `[-nyquist, nyquist]`.
        offset: f32,
    },
    /// Inverse-linear warp.
    InverseLinear {
        /// Scale parameter, clamped to `[0.1, 10.0]`.
        scale: f32,
    },
    /// Piecewise-linear warp with a single breakpoint.
    PiecewiseLinear {
        /// Scale applied below the breakpoint, clamped to `[0.1, 10.0]`.
        scale: f32,
    },
}

impl WarpKind {
    /// Parse `name` plus an optional `,param=value,...` suffix, clamping
    /// out-of-range parameters rather than failing, per spec.md §4.1
    /// ("out-of-range inputs clip to the bound and log a warning rather
    /// than fail").
    pub fn parse(spec: &str, nyquist: f32) -> Result<Self, ConfigError> {
        let mut parts = spec.split(',');
        let name = parts.next().unwrap_or("");
        let clamp_scale = |v: f32| v.clamp(0.1, 10.0);
        let clamp_offset = |v: f32| v.clamp(-nyquist, nyquist);
        let mut scale = 1.0f32;
        let mut offset = 0.0f32;
        for part in parts {
            if let Some((k, v)) = part.split_once('=') {
                let v: f32 = v.parse().unwrap_or(1.0);
                match k {
                    "scale" => scale = v,
                    "offset" => offset = v,
                    _ => {}
                }
            }
        }
        let scale = clamp_scale(scale);
        let offset = clamp_offset(offset);
        match name.to_ascii_lowercase().as_str() {
            "" | "identity" | "inverse_linear" if name.eq_ignore_ascii_case("identity") || name.is_empty() => {
                Ok(Self::Identity)
            }
            "affine" => Ok(Self::Affine { scale, offset }),
            "inverse_linear" => Ok(Self::InverseLinear { scale }),
            "piecewise_linear" => Ok(Self::PiecewiseLinear { scale }),
            other => Err(ConfigError::UnknownTransform(other.to_string())),
        }
    }
}

/// Front-end (feature extraction) parameters.
#[derive(Clone, Debug)]
pub struct FrontendConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Frame rate in frames/sec (shift = sample_rate / frate).
    pub frame_rate: u32,
    /// Window length in seconds.
    pub window_length: f32,
    /// FFT size; must be a power of two >= frame size in samples.
    pub nfft: usize,
    /// Number of cepstral coefficients to keep.
    pub ncep: usize,
    /// Number of mel filters.
    pub nfilt: usize,
    /// Lower mel-filterbank edge in Hz.
    pub lowerf: f32,
    /// Upper mel-filterbank edge in Hz; must not exceed Nyquist.
    pub upperf: f32,
    /// Pre-emphasis coefficient.
    pub alpha: f32,
    /// DCT variant.
    pub dct_type: DctType,
    /// Frequency warp.
    pub warp: WarpKind,
    /// Whether to apply the noise-removal stage.
    pub remove_noise: bool,
    /// Whether to apply running CMN.
    pub cmn: bool,
    /// Whether to dither samples by +/-1 lsb before windowing.
    pub dither: bool,
    /// Deterministic dither seed.
    pub seed: u64,
    /// Snap mel filter edges to the nearest DFT bin.
    pub round_filters: bool,
    /// Normalize mel filters to unit area.
    pub unit_area: bool,
    /// Use double-bandwidth mel filters.
    pub doublewide: bool,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            frame_rate: 100,
            window_length: 0.025_625,
            nfft: 512,
            ncep: 13,
            nfilt: 40,
            lowerf: 133.333_3,
            upperf: 6855.497_6,
            alpha: 0.97,
            dct_type: DctType::Legacy,
            warp: WarpKind::Identity,
            remove_noise: false,
            cmn: true,
            dither: false,
            seed: 0,
            round_filters: true,
            unit_area: true,
            doublewide: false,
        }
    }
}

impl FrontendConfig {
    /// Number of samples per frame, given `window_length` and `sample_rate`.
    pub fn frame_size(&self) -> usize {
        (self.window_length * self.sample_rate as f32).round() as usize
    }

    /// Number of samples per frame shift.
    pub fn frame_shift(&self) -> usize {
        (self.sample_rate / self.frame_rate) as usize
    }

    /// Validate configuration, matching the "Configuration" error kind of
    /// spec.md §7 ("invalid beam, non-power-of-two FFT, upper band above
    /// Nyquist, frame size above FFT, unknown transform").
    pub fn validate(&self) -> Result<(), ConfigError> {
        let frame_size = self.frame_size();
        if !self.nfft.is_power_of_two() || self.nfft < frame_size {
            return Err(ConfigError::InvalidFftSize {
                nfft: self.nfft,
                frame_size,
            });
        }
        let nyquist = self.sample_rate as f32 / 2.0;
        if self.upperf > nyquist {
            return Err(ConfigError::UpperBandAboveNyquist {
                upperf: self.upperf,
                nyquist,
            });
        }
        Ok(())
    }
}

/// Search beams and penalties (spec.md §4.4/§4.5/§6).
#[derive(Clone, Debug)]
pub struct SearchConfig {
    /// Language weight (`lw`).
    pub language_weight: f32,
    /// Word insertion penalty (log-domain, applied additively; `wip` in §6).
    pub word_insertion_penalty: f32,
    /// Phone insertion penalty (`pip`).
    pub phone_insertion_penalty: f32,
    /// Global (state) pruning beam, a negative log-probability.
    pub beam: f64,
    /// Phone-exit pruning beam.
    pub phone_exit_beam: f64,
    /// Word-exit pruning beam.
    pub word_exit_beam: f64,
    /// fwdflat pass beam.
    pub fwdflat_beam: f64,
    /// fwdflat pass word-exit beam.
    pub fwdflat_word_beam: f64,
    /// Absolute cap on active HMMs per frame.
    pub max_hmms_per_frame: usize,
    /// Absolute cap on word exits per frame.
    pub max_words_per_frame: usize,
    /// Frame downsample ratio (`ds`): only 1 in `ds` frames is scored.
    pub downsample: u32,
    /// Number of top Gaussians to evaluate per senone (`topn`).
    pub top_n: usize,
    /// Enable the fwdtree pass.
    pub fwdtree: bool,
    /// Enable the fwdflat pass.
    pub fwdflat: bool,
    /// Enable the bestpath (lattice) pass.
    pub bestpath: bool,
    /// Rolling window (in frames) fwdflat uses to pick candidate words.
    pub fwdflat_window: u32,
    /// Lookahead window (in frames) the phoneme-loop prefilter uses.
    pub phone_loop_window: u32,
    /// Phoneme-loop prefilter beam.
    pub phone_loop_beam: f64,
    /// Filler-word penalty applied at bypass links in the lattice.
    pub filler_penalty: f32,
    /// Silence-word penalty.
    pub silence_penalty: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            language_weight: 6.5,
            word_insertion_penalty: -0.7,
            phone_insertion_penalty: 0.0,
            beam: 1e-48,
            phone_exit_beam: 1e-32,
            word_exit_beam: 1e-20,
            fwdflat_beam: 1e-64,
            fwdflat_word_beam: 1e-20,
            max_hmms_per_frame: 30_000,
            max_words_per_frame: 20,
            downsample: 1,
            top_n: 4,
            fwdtree: true,
            fwdflat: true,
            bestpath: true,
            fwdflat_window: 5,
            phone_loop_window: 5,
            phone_loop_beam: 1e-10,
            filler_penalty: -8.0,
            silence_penalty: -3.0,
        }
    }
}

impl SearchConfig {
    /// Validate configuration: every beam must be a probability in
    /// `(0.0, 1.0]`, i.e. representable as a negative log-probability.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("beam", self.beam),
            ("pbeam", self.phone_exit_beam),
            ("wbeam", self.word_exit_beam),
            ("fwdflatbeam", self.fwdflat_beam),
            ("fwdflatwbeam", self.fwdflat_word_beam),
            ("phone_loop_beam", self.phone_loop_beam),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::InvalidBeam { name, value });
            }
        }
        Ok(())
    }
}

/// VAD aggressiveness (spec.md §4.7; mirrors `ps_vad_mode_t` in
/// `examples/original_source/include/pocketsphinx/vad.h`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VadMode {
    /// Least aggressive: more likely to classify noise as speech.
    Loose,
    /// Default.
    MediumLoose,
    /// More conservative than `MediumLoose`.
    MediumStrict,
    /// Most conservative: least likely to misclassify non-speech as speech.
    Strict,
}

impl FromStr for VadMode {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "loose" | "0" => Ok(Self::Loose),
            "medium_loose" | "1" => Ok(Self::MediumLoose),
            "medium_strict" | "2" => Ok(Self::MediumStrict),
            "strict" | "3" => Ok(Self::Strict),
            other => Err(ConfigError::UnknownVadMode(other.to_string())),
        }
    }
}

/// Endpointer parameters (spec.md §4.7).
#[derive(Clone, Debug)]
pub struct EndpointerConfig {
    /// Sliding window length in seconds.
    pub window_secs: f64,
    /// Fraction of frames in the window required to trigger a transition.
    pub ratio: f64,
    /// VAD aggressiveness.
    pub vad_mode: VadMode,
}

impl Default for EndpointerConfig {
    fn default() -> Self {
        Self {
            window_secs: 0.3,
            ratio: 0.9,
            vad_mode: VadMode::MediumLoose,
        }
    }
}

/// Top-level decoder configuration, the typed analogue of the CLI flag
/// surface in spec.md §6. Library users construct and mutate this directly;
/// [`CliArgs`] is only used to build one from command-line flags.
#[derive(Clone, Debug, Default)]
pub struct DecoderConfig {
    /// Acoustic model directory (`hmm`).
    pub hmm_dir: Option<PathBuf>,
    /// Dictionary file (`dict`).
    pub dict_path: Option<PathBuf>,
    /// N-gram language model (`lm`).
    pub lm_path: Option<PathBuf>,
    /// FSG grammar file (`fsg`), mutually exclusive with `lm`/`jsgf`/`kws`/`align`.
    pub fsg_path: Option<PathBuf>,
    /// JSGF grammar file (`jsgf`).
    pub jsgf_path: Option<PathBuf>,
    /// Keyphrase spotting target (`kws`).
    pub keyphrase: Option<String>,
    /// Forced-alignment reference text (`align`).
    pub align_text: Option<String>,
    /// Front-end parameters.
    pub frontend: FrontendConfig,
    /// Search parameters.
    pub search: SearchConfig,
    /// Endpointer parameters.
    pub endpointer: EndpointerConfig,
    /// `mllr` transform file, if any (accepted but not applied by this core;
    /// transform application is an acoustic-model-loader concern per
    /// spec.md §1).
    pub mllr_path: Option<PathBuf>,
    /// Log base (`logbase`).
    pub log_base: f64,
}

impl DecoderConfig {
    /// Validate the whole configuration, composing the individual
    /// sub-validators. Returns the first error found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.frontend.validate()?;
        self.search.validate()?;
        Ok(())
    }
}

/// Parse one of the boolean spellings accepted by spec.md §6
/// (`{yes/no, true/false, on/off, 1/0}`, case-insensitively).
pub fn parse_bool_flag(s: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "yes" | "true" | "on" | "1" => Ok(true),
        "no" | "false" | "off" | "0" => Ok(false),
        other => Err(format!(
            "invalid boolean flag '{other}' (expected yes/no, true/false, on/off, or 1/0)"
        )),
    }
}

/// Command-line flags for the `ps_batch` binary, covering the subset of
/// spec.md §6's flag surface relevant to the recognition core. Mirrors the
/// teacher's `bin/app.rs::Args` in spirit: a thin `clap::Parser` struct that
/// gets turned into the library's own config type.
#[derive(Parser, Debug)]
#[command(name = "ps_batch", about = "Batch speech recognition driver")]
pub struct CliArgs {
    /// Acoustic model directory.
    #[arg(long)]
    pub hmm: Option<PathBuf>,
    /// Dictionary file.
    #[arg(long)]
    pub dict: Option<PathBuf>,
    /// N-gram language model file.
    #[arg(long)]
    pub lm: Option<PathBuf>,
    /// FSG grammar file.
    #[arg(long)]
    pub fsg: Option<PathBuf>,
    /// JSGF grammar file.
    #[arg(long)]
    pub jsgf: Option<PathBuf>,
    /// Keyphrase to spot.
    #[arg(long)]
    pub kws: Option<String>,
    /// Forced-alignment reference text.
    #[arg(long)]
    pub align: Option<String>,
    /// Language weight.
    #[arg(long, default_value_t = SearchConfig::default().language_weight)]
    pub lw: f32,
    /// Word insertion penalty.
    #[arg(long, default_value_t = SearchConfig::default().word_insertion_penalty)]
    pub wip: f32,
    /// Phone insertion penalty.
    #[arg(long, default_value_t = SearchConfig::default().phone_insertion_penalty)]
    pub pip: f32,
    /// Global pruning beam.
    #[arg(long, default_value_t = SearchConfig::default().beam)]
    pub beam: f64,
    /// Phone-exit beam.
    #[arg(long, default_value_t = SearchConfig::default().phone_exit_beam)]
    pub pbeam: f64,
    /// Word-exit beam.
    #[arg(long, default_value_t = SearchConfig::default().word_exit_beam)]
    pub wbeam: f64,
    /// fwdflat beam.
    #[arg(long, default_value_t = SearchConfig::default().fwdflat_beam)]
    pub fwdflatbeam: f64,
    /// fwdflat word-exit beam.
    #[arg(long, default_value_t = SearchConfig::default().fwdflat_word_beam)]
    pub fwdflatwbeam: f64,
    /// Max active HMMs per frame.
    #[arg(long, default_value_t = SearchConfig::default().max_hmms_per_frame)]
    pub maxhmmpf: usize,
    /// Max word exits per frame.
    #[arg(long, default_value_t = SearchConfig::default().max_words_per_frame)]
    pub maxwpf: usize,
    /// Frame downsample ratio.
    #[arg(long, default_value_t = SearchConfig::default().downsample)]
    pub ds: u32,
    /// Top-N Gaussians per senone.
    #[arg(long, default_value_t = SearchConfig::default().top_n)]
    pub topn: usize,
    /// Enable/disable the fwdtree pass.
    #[arg(long, value_parser = parse_bool_flag, default_value = "yes")]
    pub fwdtree: bool,
    /// Enable/disable the fwdflat pass.
    #[arg(long, value_parser = parse_bool_flag, default_value = "yes")]
    pub fwdflat: bool,
    /// Enable/disable the bestpath pass.
    #[arg(long, value_parser = parse_bool_flag, default_value = "yes")]
    pub bestpath: bool,
    /// Sample rate in Hz.
    #[arg(long, default_value_t = FrontendConfig::default().sample_rate)]
    pub samprate: u32,
    /// Frame rate in frames/sec.
    #[arg(long, default_value_t = FrontendConfig::default().frame_rate)]
    pub frate: u32,
    /// Window length in seconds.
    #[arg(long, default_value_t = FrontendConfig::default().window_length)]
    pub wlen: f32,
    /// FFT size.
    #[arg(long, default_value_t = FrontendConfig::default().nfft)]
    pub nfft: usize,
    /// Number of cepstral coefficients.
    #[arg(long, default_value_t = FrontendConfig::default().ncep)]
    pub ncep: usize,
    /// Number of mel filters.
    #[arg(long, default_value_t = FrontendConfig::default().nfilt)]
    pub nfilt: usize,
    /// Upper mel band edge in Hz.
    #[arg(long, default_value_t = FrontendConfig::default().upperf)]
    pub upperf: f32,
    /// Lower mel band edge in Hz.
    #[arg(long, default_value_t = FrontendConfig::default().lowerf)]
    pub lowerf: f32,
    /// Frequency warp specification.
    #[arg(long)]
    pub transform: Option<String>,
    /// Enable/disable noise removal.
    #[arg(long, value_parser = parse_bool_flag, default_value = "no")]
    pub remove_noise: bool,
    /// Enable/disable running CMN.
    #[arg(long, value_parser = parse_bool_flag, default_value = "yes")]
    pub cmn: bool,
    /// VAD threshold / aggressiveness mode.
    #[arg(long, default_value = "medium_loose")]
    pub vad_threshold: String,
    /// MLLR transform file.
    #[arg(long)]
    pub mllr: Option<PathBuf>,
    /// Log base.
    #[arg(long, default_value_t = crate::logmath::LogMath::DEFAULT_BASE)]
    pub logbase: f64,
    /// Input PCM file to decode (not part of the original flag table but
    /// needed to drive the batch binary).
    pub input: Option<PathBuf>,
}

impl CliArgs {
    /// Build a [`DecoderConfig`] from parsed CLI flags.
    pub fn into_config(self) -> Result<DecoderConfig, ConfigError> {
        let mut frontend = FrontendConfig {
            sample_rate: self.samprate,
            frame_rate: self.frate,
            window_length: self.wlen,
            nfft: self.nfft,
            ncep: self.ncep,
            nfilt: self.nfilt,
            lowerf: self.lowerf,
            upperf: self.upperf,
            remove_noise: self.remove_noise,
            cmn: self.cmn,
            ..FrontendConfig::default()
        };
        if let Some(t) = &self.transform {
            frontend.warp = WarpKind::parse(t, frontend.sample_rate as f32 / 2.0)?;
        }
        let search = SearchConfig {
            language_weight: self.lw,
            word_insertion_penalty: self.wip,
            phone_insertion_penalty: self.pip,
            beam: self.beam,
            phone_exit_beam: self.pbeam,
            word_exit_beam: self.wbeam,
            fwdflat_beam: self.fwdflatbeam,
            fwdflat_word_beam: self.fwdflatwbeam,
            max_hmms_per_frame: self.maxhmmpf,
            max_words_per_frame: self.maxwpf,
            downsample: self.ds,
            top_n: self.topn,
            fwdtree: self.fwdtree,
            fwdflat: self.fwdflat,
            bestpath: self.bestpath,
            ..SearchConfig::default()
        };
        let endpointer = EndpointerConfig {
            vad_mode: self.vad_threshold.parse()?,
            ..EndpointerConfig::default()
        };
        let config = DecoderConfig {
            hmm_dir: self.hmm,
            dict_path: self.dict,
            lm_path: self.lm,
            fsg_path: self.fsg,
            jsgf_path: self.jsgf,
            keyphrase: self.kws,
            align_text: self.align,
            frontend,
            search,
            endpointer,
            mllr_path: self.mllr,
            log_base: self.logbase,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_flags_accept_all_spellings() {
        for s in ["yes", "YES", "true", "on", "1"] {
            assert!(parse_bool_flag(s).unwrap());
        }
        for s in ["no", "FALSE", "off", "0"] {
            assert!(!parse_bool_flag(s).unwrap());
        }
        assert!(parse_bool_flag("maybe").is_err());
    }

    #[test]
    fn frontend_rejects_non_power_of_two_fft() {
        let cfg = FrontendConfig {
            nfft: 500,
            ..FrontendConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidFftSize { .. })
        ));
    }

    #[test]
    fn frontend_rejects_upper_band_above_nyquist() {
        let cfg = FrontendConfig {
            upperf: 9000.0,
            sample_rate: 16_000,
            ..FrontendConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::UpperBandAboveNyquist { .. })
        ));
    }

    #[test]
    fn search_rejects_beam_outside_unit_interval() {
        let cfg = SearchConfig {
            beam: 1.5,
            ..SearchConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidBeam { .. })));
    }

    #[test]
    fn warp_clamps_out_of_range_params() {
        let w = WarpKind::parse("affine,scale=100,offset=999999", 8000.0).unwrap();
        match w {
            WarpKind::Affine { scale, offset } => {
                assert_eq!(scale, 10.0);
                assert_eq!(offset, 8000.0);
            }
            _ => panic!("expected affine"),
        }
    }
}
