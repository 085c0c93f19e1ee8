//! Running cepstral mean normalization (spec.md §4.1 "CMN"): a causal
//! running estimate of the cepstral mean, subtracted per frame, updated
//! with an exponential forget factor. The caller may read a stable
//! snapshot of the current mean (spec.md: "must receive it as a stable
//! snapshot").
#[derive(Clone, Debug)]
pub struct RunningCmn {
    mean: Vec<f32>,
    /// Forget factor: weight given to the new frame when updating the
    /// running mean (higher = adapts faster).
    forget_factor: f32,
    n_seen: u64,
}

/// Default forget factor, matching Sphinx's default `cmninit` update
/// constant for streaming CMN (`cmn_prior_update`).
pub const DEFAULT_FORGET_FACTOR: f32 = 0.5;

impl RunningCmn {
    pub fn new(ncep: usize, forget_factor: f32) -> Self {
        Self {
            mean: vec![0.0; ncep],
            forget_factor,
            n_seen: 0,
        }
    }

    pub fn reset(&mut self) {
        self.mean.iter_mut().for_each(|m| *m = 0.0);
        self.n_seen = 0;
    }

    /// Subtract the current running mean from `cep` in place, then update
    /// the mean with this frame.
    pub fn apply(&mut self, cep: &mut [f32]) {
        assert_eq!(cep.len(), self.mean.len());
        for (c, m) in cep.iter_mut().zip(self.mean.iter()) {
            *c -= m;
        }
        let alpha = if self.n_seen == 0 { 1.0 } else { self.forget_factor };
        for (m, c_orig) in self.mean.iter_mut().zip(cep.iter()) {
            // `c_orig` is already mean-subtracted above, so add the mean
            // back to get the pre-subtraction value for the update.
            let unsub = *c_orig + *m;
            *m += alpha * (unsub - *m) * (1.0 / (self.n_seen as f32 + 1.0)).max(1.0 / 200.0);
        }
        self.n_seen += 1;
    }

    /// A stable snapshot of the current running mean.
    pub fn current_mean(&self) -> Vec<f32> {
        self.mean.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_frame_is_unaffected_by_cmn() {
        let mut cmn = RunningCmn::new(3, DEFAULT_FORGET_FACTOR);
        let mut f = vec![1.0, 2.0, 3.0];
        let orig = f.clone();
        cmn.apply(&mut f);
        assert_eq!(f, orig);
    }

    #[test]
    fn constant_input_converges_mean_toward_input() {
        let mut cmn = RunningCmn::new(1, 0.9);
        let mut last = 0.0;
        for _ in 0..500 {
            let mut f = vec![10.0];
            cmn.apply(&mut f);
            last = f[0];
        }
        assert!(last.abs() < 1.0, "expected near-zero residual, got {last}");
    }

    #[test]
    fn reset_clears_running_mean() {
        let mut cmn = RunningCmn::new(1, 0.5);
        let mut f = vec![10.0];
        cmn.apply(&mut f);
        cmn.reset();
        assert_eq!(cmn.current_mean(), vec![0.0]);
    }
}
