//! Integer log-domain arithmetic ("logmath").
//!
//! PocketSphinx and its underlying sphinxbase represent every probability as
//! a quantized integer logarithm in a configurable base, rather than as a
//! floating-point probability. This lets the search add, compare, and prune
//! scores with integer arithmetic, and lets "adding" two probabilities (the
//! `logmath_add` operation used throughout the lattice and acoustic scorer)
//! be implemented as a small table lookup instead of a call to `exp`/`log`.
//!
//! spec.md §1 excludes this module's *origin* (it's listed among the
//! "excluded collaborators" only in the sense that a production build loads
//! a shared instance once); every other module in this crate depends on it,
//! so it lives here as ambient infrastructure per the REDESIGN FLAGS note
//! in spec.md §9 ("inject a `LogMath` handle ... no file-scope mutables").
use std::fmt;

/// A value considered "zero probability" in a given [`LogMath`]'s domain.
/// Chosen far enough from any real score that arithmetic never overflows
/// `i32`, matching sphinxbase's `logmath_get_zero`.
pub const LOGMATH_ZERO: i32 = i32::MIN / 2;

/// Quantized-log arithmetic in a configurable base.
///
/// `LogMath::log(base, p)` is conceptually `round(log(p) / log(base))`.
/// `base` is typically close to 1 (e.g. 1.0001) so that probabilities in
/// `[0, 1]` map to a wide, precise integer range.
#[derive(Clone)]
pub struct LogMath {
    base: f64,
    ln_base: f64,
    /// Precomputed `add_table[d] = log_base(1 + base^-d)` for `d` in
    /// `0..table_size`, used by [`LogMath::add`]. Beyond `table_size` the
    /// correction term is negligible and `add` degenerates to `max(a, b)`.
    add_table: Vec<i32>,
}

impl fmt::Debug for LogMath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogMath")
            .field("base", &self.base)
            .field("table_size", &self.add_table.len())
            .finish()
    }
}

impl LogMath {
    /// Default log base used when a decoder does not override `logbase`.
    pub const DEFAULT_BASE: f64 = 1.000_1;

    /// Build a new logmath context for the given base. `base` must be
    /// strictly greater than 1.0.
    pub fn new(base: f64) -> Self {
        assert!(base > 1.0, "logmath base must be > 1.0, got {base}");
        let ln_base = base.ln();
        // The correction term log_base(1 + base^-d) underflows to 0 well
        // before d reaches a few thousand for any sane base; 2^14 entries
        // is comfortably enough headroom while staying small.
        let table_size = 1usize << 14;
        let mut add_table = Vec::with_capacity(table_size);
        for d in 0..table_size {
            let x = base.powi(-(d as i32));
            let v = (1.0 + x).ln() / ln_base;
            add_table.push(v.round() as i32);
        }
        Self {
            base,
            ln_base,
            add_table,
        }
    }

    /// The log base in use.
    pub fn base(&self) -> f64 {
        self.base
    }

    /// The quantized representation of probability zero.
    pub fn zero(&self) -> i32 {
        LOGMATH_ZERO
    }

    /// Convert a linear probability `p` (in `(0.0, 1.0]`) into this log
    /// domain.
    pub fn log(&self, p: f64) -> i32 {
        if p <= 0.0 {
            return LOGMATH_ZERO;
        }
        (p.ln() / self.ln_base).round() as i32
    }

    /// Convert a natural log-probability into this log domain.
    pub fn ln_to_log(&self, ln_p: f64) -> i32 {
        (ln_p / self.ln_base).round() as i32
    }

    /// Convert a quantized log-domain value back to a linear probability.
    pub fn exp(&self, log_p: i32) -> f64 {
        if log_p <= LOGMATH_ZERO {
            0.0
        } else {
            self.base.powi(log_p)
        }
    }

    /// Convert a quantized log-domain value to a natural logarithm.
    pub fn log_to_ln(&self, log_p: i32) -> f64 {
        if log_p <= LOGMATH_ZERO {
            f64::NEG_INFINITY
        } else {
            log_p as f64 * self.ln_base
        }
    }

    /// `log(a + b)` given `a = log(p_a)` and `b = log(p_b)`, computed
    /// without leaving the log domain. This is the operation used to
    /// accumulate lattice-link posteriors and to combine Gaussian mixture
    /// components.
    pub fn add(&self, a: i32, b: i32) -> i32 {
        if a == LOGMATH_ZERO {
            return b;
        }
        if b == LOGMATH_ZERO {
            return a;
        }
        let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
        let d = (hi - lo) as usize;
        let correction = self
            .add_table
            .get(d)
            .copied()
            .unwrap_or(0);
        hi + correction
    }

    /// `log(a - b)` given `a >= b` in linear domain (i.e. `a`'s linear value
    /// is larger). Used rarely (posterior renormalization); implemented
    /// directly via `exp`/`log` since subtraction has no stable table form.
    pub fn sub(&self, a: i32, b: i32) -> i32 {
        if b == LOGMATH_ZERO {
            return a;
        }
        let diff = self.exp(a) - self.exp(b);
        self.log(diff.max(0.0))
    }
}

impl Default for LogMath {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_exp_log() {
        let lm = LogMath::default();
        for p in [0.001, 0.01, 0.1, 0.5, 0.9, 1.0] {
            let l = lm.log(p);
            let back = lm.exp(l);
            assert!((back - p).abs() / p < 1e-3, "{p} -> {l} -> {back}");
        }
    }

    #[test]
    fn zero_is_additive_identity() {
        let lm = LogMath::default();
        let a = lm.log(0.3);
        assert_eq!(lm.add(a, lm.zero()), a);
        assert_eq!(lm.add(lm.zero(), a), a);
    }

    #[test]
    fn add_matches_linear_sum() {
        let lm = LogMath::default();
        let a = lm.log(0.3);
        let b = lm.log(0.4);
        let summed = lm.add(a, b);
        let linear = lm.exp(summed);
        assert!((linear - 0.7).abs() < 1e-2, "got {linear}");
    }

    #[test]
    fn add_is_commutative() {
        let lm = LogMath::default();
        let a = lm.log(0.2);
        let b = lm.log(0.55);
        assert_eq!(lm.add(a, b), lm.add(b, a));
    }
}
