//! A small, deterministic, non-negative-coefficients elastic-net solver.
//!
//! `spec.md` §9 allows "a coordinate-descent solver" as an implementation
//! choice for the regression at the heart of [`crate::model::PowerModel`];
//! none of the retrieved example repositories pull in an external numerics
//! crate (`linfa`, `smartcore`, `ndarray`...) so this mirrors what
//! `sklearn.linear_model.ElasticNet(positive=True)` (used by the original
//! Python implementation) computes, with the same default hyperparameters
//! (`alpha = 1.0`, `l1_ratio = 0.5`), via cyclical coordinate descent with a
//! projection onto the non-negative orthant after every soft-threshold step.

/// `alpha` in `sklearn.linear_model.ElasticNet`'s default constructor.
const ALPHA: f64 = 1.0;
/// `l1_ratio` in `sklearn.linear_model.ElasticNet`'s default constructor.
const L1_RATIO: f64 = 0.5;
const MAX_ITER: usize = 1000;
const TOLERANCE: f64 = 1e-4;

/// Result of a coordinate-descent fit.
#[derive(Debug, Clone, PartialEq)]
pub struct Fit {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

fn dot(row: &[f64], coef: &[f64]) -> f64 {
    row.iter().zip(coef).map(|(x, c)| x * c).sum()
}

fn soft_threshold(rho: f64, lambda: f64) -> f64 {
    if rho > lambda {
        rho - lambda
    } else if rho < -lambda {
        rho + lambda
    } else {
        0.0
    }
}

/// Fits `y ~ intercept + coefficients . x` by coordinate descent, with
/// coefficients constrained to be non-negative.
///
/// `fit_intercept = false` forces the intercept to stay at `0.0` for the
/// whole fit (used while the sample history has not yet reached its
/// capacity, per `spec.md` §4.3).
///
/// Returns `None` if `x`/`y` are empty or of mismatched length, or if every
/// feature column is constant (degenerate design matrix).
pub fn fit_non_negative(x: &[Vec<f64>], y: &[f64], fit_intercept: bool) -> Option<Fit> {
    let n = x.len();
    if n == 0 || n != y.len() {
        return None;
    }
    let p = x[0].len();
    if p == 0 || x.iter().any(|row| row.len() != p) {
        return None;
    }

    let col_sq_norm: Vec<f64> = (0..p).map(|j| x.iter().map(|row| row[j] * row[j]).sum()).collect();

    let mut coefficients = vec![0.0_f64; p];
    let mut intercept = 0.0_f64;
    let n_f = n as f64;
    let l1 = n_f * ALPHA * L1_RATIO;
    let l2_penalty = n_f * ALPHA * (1.0 - L1_RATIO);

    for _ in 0..MAX_ITER {
        if fit_intercept {
            let residual_mean: f64 = (0..n).map(|i| y[i] - dot(&x[i], &coefficients)).sum::<f64>() / n_f;
            intercept = residual_mean;
        }

        let mut max_update = 0.0_f64;
        for j in 0..p {
            if col_sq_norm[j] == 0.0 {
                continue;
            }
            let rho: f64 = (0..n)
                .map(|i| {
                    let prediction_without_j = intercept + dot(&x[i], &coefficients) - x[i][j] * coefficients[j];
                    x[i][j] * (y[i] - prediction_without_j)
                })
                .sum();
            let denom = col_sq_norm[j] + l2_penalty;
            let updated = (soft_threshold(rho, l1) / denom).max(0.0);
            max_update = max_update.max((updated - coefficients[j]).abs());
            coefficients[j] = updated;
        }

        if max_update < TOLERANCE {
            break;
        }
    }

    Some(Fit { intercept, coefficients })
}
