//! Triangular mel filterbank, magnitude spectrum, and the three DCT
//! variants of spec.md §4.1 steps 4-8.
use ndarray::Array2;
use rustfft::{num_complex::Complex, FftPlanner};
use std::sync::Arc;

use crate::config::{DctType, FrontendConfig};
use crate::frontend::warp;

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10f32.powf(mel / 2595.0) - 1.0)
}

/// A precomputed real-FFT + triangular mel filterbank + DCT pipeline,
/// built once at front-end construction time, stored as `Array2<f32>`,
/// and reused every frame: PCM in, mel-cepstral energies out.
pub struct MelFilterbank {
    fft: Arc<dyn rustfft::Fft<f32>>,
    nfft: usize,
    /// `(nfilt, nfft/2+1)` triangular filter weights.
    filters: Array2<f32>,
    /// `(ncep, nfilt)` DCT basis matrix.
    dct: Array2<f32>,
}

impl MelFilterbank {
    pub fn new(cfg: &FrontendConfig) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(cfg.nfft);
        let n_bins = cfg.nfft / 2 + 1;

        let nyquist = cfg.sample_rate as f32 / 2.0;
        let lower = warp::apply(&cfg.warp, cfg.lowerf);
        let upper = warp::apply(&cfg.warp, cfg.upperf.min(nyquist));
        let mel_lo = hz_to_mel(lower);
        let mel_hi = hz_to_mel(upper);

        // nfilt + 2 edges: center[0]..center[nfilt+1].
        let mut edges_hz: Vec<f32> = (0..cfg.nfilt + 2)
            .map(|i| {
                let mel = mel_lo + (mel_hi - mel_lo) * i as f32 / (cfg.nfilt as f32 + 1.0);
                mel_to_hz(mel)
            })
            .collect();
        if cfg.round_filters {
            let bin_hz = cfg.sample_rate as f32 / cfg.nfft as f32;
            for e in edges_hz.iter_mut() {
                *e = (*e / bin_hz).round() * bin_hz;
            }
        }

        let mut filters = Array2::<f32>::zeros((cfg.nfilt, n_bins));
        let bin_hz = cfg.sample_rate as f32 / cfg.nfft as f32;
        for m in 0..cfg.nfilt {
            let (lo, center, hi) = (edges_hz[m], edges_hz[m + 1], edges_hz[m + 2]);
            let width = if cfg.doublewide { (hi - lo) * 2.0 } else { hi - lo };
            for k in 0..n_bins {
                let f = k as f32 * bin_hz;
                let w = if f >= lo && f <= center {
                    if center > lo {
                        (f - lo) / (center - lo)
                    } else {
                        0.0
                    }
                } else if f > center && f <= hi {
                    if hi > center {
                        (hi - f) / (hi - center)
                    } else {
                        0.0
                    }
                } else {
                    0.0
                };
                filters[[m, k]] = if cfg.unit_area && width > 0.0 {
                    w * 2.0 / width
                } else {
                    w
                };
            }
        }

        let dct = build_dct(cfg.dct_type, cfg.ncep, cfg.nfilt);

        Self {
            fft,
            nfft: cfg.nfft,
            filters,
            dct,
        }
    }

    /// Magnitude-squared spectrum of a (Hamming-windowed) frame, zero-padded
    /// to `nfft`.
    pub fn power_spectrum(&self, windowed_frame: &[f32]) -> Vec<f32> {
        let mut buf: Vec<Complex<f32>> = windowed_frame
            .iter()
            .map(|&x| Complex::new(x, 0.0))
            .collect();
        buf.resize(self.nfft, Complex::new(0.0, 0.0));
        self.fft.process(&mut buf);
        let n_bins = self.nfft / 2 + 1;
        buf[..n_bins].iter().map(|c| c.norm_sqr()).collect()
    }

    /// Sum the power spectrum against each triangular filter, returning
    /// `nfilt` mel-band energies (pre-log).
    pub fn mel_energies(&self, power_spectrum: &[f32]) -> Vec<f32> {
        let nfilt = self.filters.nrows();
        (0..nfilt)
            .map(|m| {
                self.filters
                    .row(m)
                    .iter()
                    .zip(power_spectrum.iter())
                    .map(|(w, p)| w * p)
                    .sum()
            })
            .collect()
    }

    /// Apply `log` then the configured DCT, producing `ncep` cepstra.
    pub fn log_and_dct(&self, mel_energies: &[f32]) -> Vec<f32> {
        const FLOOR: f32 = 1e-8;
        let logged: Vec<f32> = mel_energies.iter().map(|&e| e.max(FLOOR).ln()).collect();
        let ncep = self.dct.nrows();
        (0..ncep)
            .map(|c| self.dct.row(c).iter().zip(logged.iter()).map(|(d, l)| d * l).sum())
            .collect()
    }
}

fn build_dct(kind: DctType, ncep: usize, nfilt: usize) -> Array2<f32> {
    let mut dct = Array2::<f32>::zeros((ncep, nfilt));
    match kind {
        DctType::Legacy => {
            // Sphinx's non-orthogonal DCT-II variant: no 1/sqrt(2) scaling
            // of the DC term, matching `fe_sigproc.c`'s `fe_spec2cep`.
            for c in 0..ncep {
                for n in 0..nfilt {
                    let v = (std::f32::consts::PI * c as f32 * (n as f32 + 0.5) / nfilt as f32).cos();
                    dct[[c, n]] = v * (2.0 / nfilt as f32).sqrt();
                }
            }
        }
        DctType::DctII => {
            for c in 0..ncep {
                for n in 0..nfilt {
                    let v = (std::f32::consts::PI * c as f32 * (n as f32 + 0.5) / nfilt as f32).cos();
                    let scale = if c == 0 {
                        (1.0 / nfilt as f32).sqrt()
                    } else {
                        (2.0 / nfilt as f32).sqrt()
                    };
                    dct[[c, n]] = v * scale;
                }
            }
        }
        DctType::Htk => {
            for c in 0..ncep {
                for n in 0..nfilt {
                    let v = (std::f32::consts::PI * (c as f32 + 1.0) * (n as f32 + 0.5) / nfilt as f32).cos();
                    dct[[c, n]] = v * (2.0 / nfilt as f32).sqrt();
                }
            }
        }
    }
    dct
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mel_energies_are_nonnegative_for_nonnegative_spectrum() {
        let cfg = FrontendConfig::default();
        let fb = MelFilterbank::new(&cfg);
        let power: Vec<f32> = (0..cfg.nfft / 2 + 1).map(|k| k as f32).collect();
        let e = fb.mel_energies(&power);
        assert_eq!(e.len(), cfg.nfilt);
        assert!(e.iter().all(|&x| x >= 0.0));
    }

    #[test]
    fn dct_output_has_ncep_coefficients() {
        let cfg = FrontendConfig::default();
        let fb = MelFilterbank::new(&cfg);
        let mel = vec![1.0; cfg.nfilt];
        let cep = fb.log_and_dct(&mel);
        assert_eq!(cep.len(), cfg.ncep);
    }

    #[test]
    fn power_spectrum_of_silence_is_near_zero() {
        let cfg = FrontendConfig::default();
        let fb = MelFilterbank::new(&cfg);
        let frame = vec![0.0f32; cfg.frame_size()];
        let p = fb.power_spectrum(&frame);
        assert!(p.iter().all(|&x| x.abs() < 1e-6));
    }
}
