//! Top-N Gaussian selection per feature stream (spec.md §4.2 step 2).
use crate::model::means::Codebook;

/// One selected density and its log-likelihood, from a single stream's
/// top-N search.
#[derive(Clone, Copy, Debug)]
pub struct TopDensity {
    pub density: usize,
    pub log_likelihood: f32,
}

/// Evaluate every density in `codebook` against `frame` and return the
/// `top_n` highest-scoring densities, sorted best-first. `allowed`, if
/// given, restricts evaluation to that subset of density indices (the BBI
/// shortlist of spec.md §4.2 step 1).
pub fn top_n_densities(
    codebook: &Codebook,
    frame: &[f32],
    top_n: usize,
    allowed: Option<&[usize]>,
) -> Vec<TopDensity> {
    let mut scored: Vec<TopDensity> = match allowed {
        Some(idxs) => idxs
            .iter()
            .map(|&d| TopDensity {
                density: d,
                log_likelihood: codebook.log_density(d, frame),
            })
            .collect(),
        None => (0..codebook.n_density)
            .map(|d| TopDensity {
                density: d,
                log_likelihood: codebook.log_density(d, frame),
            })
            .collect(),
    };
    scored.sort_unstable_by(|a, b| b.log_likelihood.partial_cmp(&a.log_likelihood).unwrap());
    scored.truncate(top_n.max(1));
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_n_returns_best_first() {
        let means = vec![0.0, 0.0, 5.0, 5.0, -5.0, -5.0];
        let vars = vec![1.0; 6];
        let cb = Codebook::new(means, vars, 3, 2);
        let top = top_n_densities(&cb, &[0.1, -0.1], 2, None);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].density, 0);
        assert!(top[0].log_likelihood >= top[1].log_likelihood);
    }

    #[test]
    fn allowed_subset_restricts_candidates() {
        let means = vec![0.0, 0.0, 5.0, 5.0, -5.0, -5.0];
        let vars = vec![1.0; 6];
        let cb = Codebook::new(means, vars, 3, 2);
        let top = top_n_densities(&cb, &[0.1, -0.1], 5, Some(&[1, 2]));
        assert_eq!(top.len(), 2);
        assert!(top.iter().all(|t| t.density == 1 || t.density == 2));
    }
}
