//! Randomized hyperparameter search with time-ordered cross-validation.
//!
//! Candidates are sampled from a discrete grid with a seeded RNG, then scored in
//! parallel on the rayon pool. Each candidate is evaluated on expanding-window
//! folds where every validation block lies strictly after its training block, so
//! no fold trains on the future. Results do not depend on thread count.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::debug;

use super::gradient_boosted::{boost, GbmParams};
use super::ModelError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchGrid {
    pub n_estimators: Vec<usize>,
    pub learning_rate: Vec<f64>,
    pub max_depth: Vec<usize>,
    pub subsample: Vec<f64>,
    pub colsample: Vec<f64>,
    /// Number of sampled candidates.
    pub candidates: usize,
    /// Number of time-ordered folds.
    pub folds: usize,
}

impl Default for SearchGrid {
    fn default() -> Self {
        Self {
            n_estimators: vec![100, 300, 500],
            learning_rate: vec![0.01, 0.05, 0.1],
            max_depth: vec![3, 5, 7],
            subsample: vec![0.7, 0.8, 1.0],
            colsample: vec![0.7, 0.8, 1.0],
            candidates: 10,
            folds: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub best: GbmParams,
    /// Mean squared error across folds of the winner.
    pub best_score: f64,
    /// Every candidate with its score, in sampling order.
    pub scores: Vec<(GbmParams, f64)>,
}

/// One fold: train on `train`, validate on `validation`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Range<usize>,
    pub validation: Range<usize>,
}

/// Expanding-window folds over `n` time-ordered rows.
///
/// The rows are cut into `k + 1` equal blocks (the remainder goes to the first
/// training block). Fold i trains on everything before block i+1 and validates on
/// block i+1.
pub fn time_series_folds(n: usize, k: usize) -> Vec<Fold> {
    if k == 0 {
        return Vec::new();
    }
    let block = n / (k + 1);
    if block == 0 {
        return Vec::new();
    }
    (0..k)
        .map(|i| {
            let start = n - (k - i) * block;
            Fold {
                train: 0..start,
                validation: start..start + block,
            }
        })
        .collect()
}

fn pick<T: Copy>(rng: &mut StdRng, values: &[T], fallback: T) -> T {
    if values.is_empty() {
        fallback
    } else {
        values[rng.gen_range(0..values.len())]
    }
}

/// Sample `grid.candidates` parameter sets. Unsampled fields come from `base`.
pub fn sample_candidates(base: &GbmParams, grid: &SearchGrid) -> Vec<GbmParams> {
    let mut rng = StdRng::seed_from_u64(base.seed);
    (0..grid.candidates)
        .map(|_| GbmParams {
            n_estimators: pick(&mut rng, &grid.n_estimators, base.n_estimators),
            learning_rate: pick(&mut rng, &grid.learning_rate, base.learning_rate),
            max_depth: pick(&mut rng, &grid.max_depth, base.max_depth),
            subsample: pick(&mut rng, &grid.subsample, base.subsample),
            colsample: pick(&mut rng, &grid.colsample, base.colsample),
            ..base.clone()
        })
        .collect()
}

fn cross_validate(params: &GbmParams, x: &[Vec<f64>], y: &[f64], folds: &[Fold]) -> f64 {
    let mut total = 0.0;
    for fold in folds {
        let ensemble = boost(params, &x[fold.train.clone()], &y[fold.train.clone()]);
        let mse = fold
            .validation
            .clone()
            .map(|i| (ensemble.predict(&x[i]) - y[i]).powi(2))
            .sum::<f64>()
            / fold.validation.len() as f64;
        total += mse;
    }
    total / folds.len() as f64
}

/// Pick the candidate with the lowest mean fold MSE. Ties go to the earlier candidate.
pub fn randomized_search(
    base: &GbmParams,
    grid: &SearchGrid,
    x: &[Vec<f64>],
    y: &[f64],
) -> Result<SearchOutcome, ModelError> {
    let folds = time_series_folds(y.len(), grid.folds);
    if folds.is_empty() {
        return Err(ModelError::Fit(format!(
            "cannot build {} folds from {} rows",
            grid.folds,
            y.len()
        )));
    }
    let candidates = sample_candidates(base, grid);
    if candidates.is_empty() {
        return Err(ModelError::Fit("search grid produced no candidates".into()));
    }

    let scores: Vec<(GbmParams, f64)> = candidates
        .into_par_iter()
        .map(|params| {
            let score = cross_validate(&params, x, y, &folds);
            debug!(
                n_estimators = params.n_estimators,
                learning_rate = params.learning_rate,
                max_depth = params.max_depth,
                subsample = params.subsample,
                colsample = params.colsample,
                score,
                "search candidate scored"
            );
            (params, score)
        })
        .collect();

    let mut best_idx = 0;
    for (i, (_, score)) in scores.iter().enumerate() {
        if *score < scores[best_idx].1 {
            best_idx = i;
        }
    }
    let (best, best_score) = scores[best_idx].clone();
    if !best_score.is_finite() {
        return Err(ModelError::Fit("search produced no finite score".into()));
    }

    Ok(SearchOutcome {
        best,
        best_score,
        scores,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_are_time_ordered_and_expanding() {
        let folds = time_series_folds(100, 3);
        assert_eq!(folds.len(), 3);
        // block = 25
        assert_eq!(folds[0], Fold { train: 0..25, validation: 25..50 });
        assert_eq!(folds[2], Fold { train: 0..75, validation: 75..100 });
        for fold in &folds {
            assert!(fold.train.end <= fold.validation.start);
        }
        for pair in folds.windows(2) {
            assert!(pair[1].train.end > pair[0].train.end);
        }
    }

    #[test]
    fn folds_remainder_goes_to_first_training_block() {
        let folds = time_series_folds(103, 3);
        assert_eq!(folds[0].train, 0..28);
        assert_eq!(folds[2].validation, 78..103);
    }

    #[test]
    fn too_few_rows_for_folds() {
        assert!(time_series_folds(3, 3).is_empty());
    }

    #[test]
    fn candidates_come_from_grid_and_are_seeded() {
        let grid = SearchGrid::default();
        let base = GbmParams::default();
        let a = sample_candidates(&base, &grid);
        let b = sample_candidates(&base, &grid);
        assert_eq!(a, b);
        assert_eq!(a.len(), 10);
        for c in &a {
            assert!(grid.n_estimators.contains(&c.n_estimators));
            assert!(grid.learning_rate.contains(&c.learning_rate));
            assert!(grid.max_depth.contains(&c.max_depth));
            assert_eq!(c.seed, base.seed);
        }
    }

    #[test]
    fn search_returns_lowest_score() {
        let x: Vec<Vec<f64>> = (0..60).map(|i| vec![i as f64, (i % 5) as f64]).collect();
        let y: Vec<f64> = (0..60).map(|i| i as f64 * 0.5 + (i % 5) as f64).collect();
        let grid = SearchGrid {
            n_estimators: vec![5, 10],
            learning_rate: vec![0.1, 0.3],
            max_depth: vec![2, 3],
            candidates: 4,
            ..SearchGrid::default()
        };
        let outcome = randomized_search(&GbmParams::default(), &grid, &x, &y).unwrap();
        assert_eq!(outcome.scores.len(), 4);
        let min = outcome
            .scores
            .iter()
            .map(|(_, s)| *s)
            .fold(f64::INFINITY, f64::min);
        assert_eq!(outcome.best_score, min);
    }
}
