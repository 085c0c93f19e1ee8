//! The acoustic model's Gaussian parameter and mixture-weight tables of
//! spec.md §6: "Mean/var/mixture-weight files produce a `(n_mgau, n_feat,
//! n_density, veclen)`-shaped table of diagonal Gaussians and an `(n_senone,
//! n_feat, n_density)` mixture-weight table (values may be 8-bit-quantized
//! log probabilities)."
//!
//! The binary readers for these files are explicitly out of scope
//! (spec.md §1, "model-file parsers"); this module pins down the in-memory
//! shape the acoustic scorer (`src/acoustic`) consumes, using `ndarray` for
//! the tensor storage.
use ndarray::{Array1, Array3};

/// Diagonal-covariance Gaussian mixture parameters for one feature stream,
/// shared ("tied") across all senones that use it — the semi-continuous
/// model of spec.md §4.2.
///
/// Shape: `means`/`variances` are `(n_density, veclen)`; `log_det` is
/// precomputed per density (the normalization term `-0.5 * sum(log(var)) -
/// 0.5*veclen*log(2*pi)`) so scoring a frame is a single multiply-add per
/// dimension.
#[derive(Clone, Debug)]
pub struct Codebook {
    pub means: Array3<f32>,
    pub variances: Array3<f32>,
    pub log_det: Array1<f32>,
    pub n_density: usize,
    pub veclen: usize,
}

impl Codebook {
    /// Build a codebook from flat `(n_density, veclen)` means/variances,
    /// precomputing the per-density normalization term.
    pub fn new(means: Vec<f32>, variances: Vec<f32>, n_density: usize, veclen: usize) -> Self {
        assert_eq!(means.len(), n_density * veclen);
        assert_eq!(variances.len(), n_density * veclen);
        let means = Array3::from_shape_vec((1, n_density, veclen), means).unwrap();
        let variances = Array3::from_shape_vec((1, n_density, veclen), variances).unwrap();
        let ln_2pi = (2.0 * std::f32::consts::PI).ln();
        let mut log_det = Array1::zeros(n_density);
        for d in 0..n_density {
            let mut sum = 0.0f32;
            for k in 0..veclen {
                sum += variances[[0, d, k]].max(1e-6).ln();
            }
            log_det[d] = -0.5 * sum - 0.5 * veclen as f32 * ln_2pi;
        }
        Self {
            means,
            variances,
            log_det,
            n_density,
            veclen,
        }
    }

    /// Diagonal-Gaussian log-likelihood of `frame` under density `d`.
    pub fn log_density(&self, d: usize, frame: &[f32]) -> f32 {
        let mut acc = 0.0f32;
        for k in 0..self.veclen {
            let diff = frame[k] - self.means[[0, d, k]];
            let var = self.variances[[0, d, k]].max(1e-6);
            acc += diff * diff / var;
        }
        self.log_det[d] - 0.5 * acc
    }
}

/// Per-senone, per-stream mixture weights over a shared codebook's
/// densities, as an 8-bit-quantized log-probability table (spec.md §6).
/// `weight(senone, density)` dequantizes on read.
#[derive(Clone, Debug)]
pub struct MixtureWeights {
    /// `(n_senone, n_density)` quantized log-weights, most negative = least
    /// likely. Quantization step mirrors Sphinx's `mixw` convention: stored
    /// value `v` means `log_prob = -(v as f32) * QUANT_STEP`.
    weights: Array1<u8>,
    n_senone: usize,
    n_density: usize,
}

/// Quantization step (log-probability units per LSB) for 8-bit mixture
/// weights, matching the typical Sphinx3 `mixw` quantizer.
pub const QUANT_STEP: f32 = 0.1;

impl MixtureWeights {
    pub fn from_log_probs(log_probs: &[f32], n_senone: usize, n_density: usize) -> Self {
        assert_eq!(log_probs.len(), n_senone * n_density);
        let weights = log_probs
            .iter()
            .map(|&lp| (-lp / QUANT_STEP).round().clamp(0.0, 255.0) as u8)
            .collect::<Vec<_>>();
        Self {
            weights: Array1::from_vec(weights),
            n_senone,
            n_density,
        }
    }

    pub fn log_weight(&self, senone: usize, density: usize) -> f32 {
        let q = self.weights[senone * self.n_density + density];
        -(q as f32) * QUANT_STEP
    }

    pub fn n_senone(&self) -> usize {
        self.n_senone
    }

    pub fn n_density(&self) -> usize {
        self.n_density
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codebook_scores_exact_mean_highest() {
        let means = vec![0.0, 0.0, 5.0, 5.0];
        let vars = vec![1.0, 1.0, 1.0, 1.0];
        let cb = Codebook::new(means, vars, 2, 2);
        let at_mean0 = cb.log_density(0, &[0.0, 0.0]);
        let at_mean1 = cb.log_density(0, &[3.0, 3.0]);
        assert!(at_mean0 > at_mean1);
    }

    #[test]
    fn mixture_weights_round_trip_approximately() {
        let log_probs = vec![-0.0, -1.0, -5.0, -10.0];
        let mw = MixtureWeights::from_log_probs(&log_probs, 2, 2);
        for (i, &lp) in log_probs.iter().enumerate() {
            let senone = i / 2;
            let density = i % 2;
            assert!((mw.log_weight(senone, density) - lp).abs() < QUANT_STEP);
        }
    }
}
