//! Batch speech recognition driver (spec.md §6): decode a single raw PCM
//! file end to end and print the best hypothesis, mirroring
//! `examples/original_source/examples/simple.c`'s `ps_start_utt` /
//! `ps_process_raw` / `ps_end_utt` / `ps_get_hyp` sequence.
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;

use pocketsphinx_core::acoustic::{AcousticModel, StreamModel};
use pocketsphinx_core::config::CliArgs;
use pocketsphinx_core::model::dict::Dictionary;
use pocketsphinx_core::model::mdef::ModelDefinition;
use pocketsphinx_core::model::means::{Codebook, MixtureWeights};
use pocketsphinx_core::model::ngram::{ArpaLm, NGramModel, UniformLm};
use pocketsphinx_core::{Decoder, InputMode, LogMath, SearchSpec};

/// Build the acoustic scorer for `mdef`.
///
/// The Gaussian mean/variance/mixture-weight binary reader is one of the
/// "model-file parsers" spec.md §1 explicitly excludes from this crate's
/// scope, so there is no real loader to call here. In its place we build a
/// single-stream, single-density codebook shared by every senone: every
/// frame scores identically regardless of input, which makes this binary
/// useful for exercising the pipeline (front end -> search -> lattice) end
/// to end, but not for recognizing real speech. A production build links a
/// real acoustic-model loader and passes its output to [`Decoder::new`]
/// instead of this function.
fn placeholder_acoustic_model(logmath: Arc<LogMath>, mdef: &ModelDefinition, top_n: usize) -> AcousticModel {
    let n_senone = mdef.n_senone().max(1);
    let veclen = 13;
    let means = vec![0.0f32; veclen];
    let variances = vec![1.0f32; veclen];
    let codebook = Codebook::new(means, variances, 1, veclen);
    let mixture_weights = MixtureWeights::from_log_probs(&vec![0.0f32; n_senone], n_senone, 1);
    let stream = StreamModel {
        codebook,
        mixture_weights,
        bbi: None,
    };
    AcousticModel::new(logmath, vec![stream], top_n, n_senone, 16)
}

fn read_pcm(path: &Path) -> anyhow::Result<Vec<i16>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    if bytes.len() % 2 != 0 {
        bail!("input file {} has an odd number of bytes, not 16-bit PCM", path.display());
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect())
}

fn main() -> anyhow::Result<()> {
    pocketsphinx_core::setup_logging();
    let args = CliArgs::parse();
    let input = args.input.clone();
    let config = args.into_config()?;

    let logmath = Arc::new(LogMath::new(config.log_base));

    let dict = if let Some(path) = &config.dict_path {
        Arc::new(Dictionary::load_text(path)?)
    } else {
        Arc::new(Dictionary::new())
    };

    let mdef = if let Some(path) = &config.hmm_dir {
        Arc::new(ModelDefinition::load_text(path)?)
    } else {
        Arc::new(ModelDefinition::synthetic_ci(3))
    };

    let acoustic = placeholder_acoustic_model(logmath.clone(), &mdef, config.search.top_n);

    let lm: Arc<dyn NGramModel> = match &config.lm_path {
        Some(path) => {
            let resolve = |w: &str| dict.lookup(w);
            let text = std::fs::read_to_string(path)?;
            Arc::new(ArpaLm::parse(&text, &path.display().to_string(), resolve)?)
        }
        None => Arc::new(UniformLm::default()),
    };

    let input_path = input.context("no input file given; usage: ps_batch --hmm DIR --dict FILE --lm FILE FILE.raw")?;
    let pcm = read_pcm(&input_path)?;

    let mut decoder = Decoder::new(config, logmath, dict, mdef, acoustic, SearchSpec::NGram { lm }, InputMode::RawPcm)?;

    info!("decoding {} ({} samples)", input_path.display(), pcm.len());
    decoder.start_utt()?;
    decoder.process_raw(&pcm)?;
    decoder.end_utt()?;

    match decoder.hypothesis() {
        Some(hyp) => println!("{}", hyp.text(decoder.dictionary())),
        None => info!("no hypothesis"),
    }

    Ok(())
}
