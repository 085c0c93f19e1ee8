//! Per-band noise removal (spec.md §4.1 "Noise removal (optional)"):
//! tracks smoothed power, noise floor, and signal floor per mel band with
//! asymmetric exponential filters, applies a temporal-masking peak
//! tracker, and a clamped gain.
//!
//! Grounded on `examples/original_source/src/fe/fe_noise.c`'s three-state
//! tracker (power/noise/signal) and its fast-attack/slow-decay asymmetry.

/// Maximum gain applied by the noise-removal stage (spec.md: "clamped gain
/// `G = clip(signal / P, 1/MAX_GAIN, MAX_GAIN)`").
const MAX_GAIN: f32 = 20.0;

/// Power smoothing: fast attack, slow decay.
const POWER_ATTACK: f32 = 0.7;
const POWER_DECAY: f32 = 0.1;
/// Noise floor: slow attack, fast decay (tracks quiet periods quickly,
/// rises slowly so a burst of speech doesn't immediately raise "noise").
const NOISE_ATTACK: f32 = 0.05;
const NOISE_DECAY: f32 = 0.5;
/// Peak tracker forget factor for the temporal-masking suppressor.
const PEAK_DECAY: f32 = 0.9;

#[derive(Clone, Debug)]
struct BandState {
    power: f32,
    noise: f32,
    signal: f32,
    peak: f32,
}

impl Default for BandState {
    fn default() -> Self {
        Self {
            power: 0.0,
            noise: 0.0,
            signal: 0.0,
            peak: 0.0,
        }
    }
}

/// Per-mel-band noise tracker and gain computer, stateful across frames
/// within one utterance. "Undefined until the first frame of an utterance"
/// per spec.md — [`NoiseRemoval::process`] seeds every band's state
/// directly from the first frame it sees.
#[derive(Clone, Debug)]
pub struct NoiseRemoval {
    bands: Vec<BandState>,
    initialized: bool,
}

impl NoiseRemoval {
    pub fn new(nfilt: usize) -> Self {
        Self {
            bands: vec![BandState::default(); nfilt],
            initialized: false,
        }
    }

    pub fn reset(&mut self) {
        self.initialized = false;
        for b in &mut self.bands {
            *b = BandState::default();
        }
    }

    /// Apply noise removal in place to one frame's mel energies.
    pub fn process(&mut self, mel_energies: &mut [f32]) {
        assert_eq!(mel_energies.len(), self.bands.len());
        if !self.initialized {
            for (b, &e) in self.bands.iter_mut().zip(mel_energies.iter()) {
                b.power = e;
                b.noise = e;
                b.signal = e;
                b.peak = e;
            }
            self.initialized = true;
            return;
        }
        for (b, e) in self.bands.iter_mut().zip(mel_energies.iter_mut()) {
            let energy = *e;

            // Asymmetric smoothing of instantaneous power.
            let alpha_p = if energy > b.power { POWER_ATTACK } else { POWER_DECAY };
            b.power += alpha_p * (energy - b.power);

            // Noise floor: slow attack (rising noise), fast decay (quiet
            // periods pull it down quickly).
            let alpha_n = if b.power > b.noise { NOISE_ATTACK } else { NOISE_DECAY };
            b.noise += alpha_n * (b.power - b.noise);

            // Temporal-masking peak tracker: a short spike decays toward
            // the smoothed power rather than being treated as sustained
            // signal.
            b.peak = b.peak.max(b.power) * PEAK_DECAY + b.power * (1.0 - PEAK_DECAY);
            b.signal = b.peak.max(b.noise);

            let gain = (b.signal / b.power.max(1e-8)).clamp(1.0 / MAX_GAIN, MAX_GAIN);
            *e = energy * gain;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_frame_seeds_state_unchanged() {
        let mut nr = NoiseRemoval::new(3);
        let mut frame = vec![1.0, 2.0, 3.0];
        let orig = frame.clone();
        nr.process(&mut frame);
        assert_eq!(frame, orig);
    }

    #[test]
    fn gain_is_bounded() {
        let mut nr = NoiseRemoval::new(2);
        let mut frame = vec![0.01, 0.01];
        nr.process(&mut frame); // seed
        for _ in 0..50 {
            let mut spike = vec![1000.0, 1000.0];
            nr.process(&mut spike);
            for &v in &spike {
                assert!(v.is_finite() && v >= 0.0);
            }
        }
    }

    #[test]
    fn reset_clears_initialization() {
        let mut nr = NoiseRemoval::new(1);
        let mut frame = vec![5.0];
        nr.process(&mut frame);
        nr.reset();
        let mut frame2 = vec![9.0];
        let before = frame2.clone();
        nr.process(&mut frame2);
        assert_eq!(frame2, before);
    }
}
