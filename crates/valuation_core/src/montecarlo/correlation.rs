//! Rank correlation between sampled parameters
//!
//! Correlation is induced after the marginals are drawn, by reordering each
//! column rather than changing any value (Iman & Conover, 1982):
//!
//! 1. Build an `n × k` score matrix `R` whose columns are independent random
//!    permutations of the van der Waerden scores `Φ⁻¹(i / (n + 1))`.
//! 2. Factor the target correlation `C = P Pᵀ` and the achieved correlation of
//!    the scores `T = Q Qᵀ` (Cholesky).
//! 3. `R* = R (P Q⁻¹)ᵀ` has correlation close to `C`.
//! 4. Rearrange every sampled column so its ranks match the ranks of the
//!    corresponding column of `R*`.
//!
//! Because step 4 only permutes values, each parameter's marginal sample is
//! exactly the one that was drawn.

use std::cmp::Ordering;
use std::f64::consts::{PI, SQRT_2};

use nalgebra::DMatrix;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use statrs::function::erf::erfc_inv;

use crate::error::CorrelationError;
use crate::model::ParamKey;

/// Target Spearman rank correlation between two uncertain parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationSpec {
    pub first: ParamKey,
    pub second: ParamKey,
    pub coefficient: f64,
}

impl CorrelationSpec {
    pub fn new(first: impl Into<ParamKey>, second: impl Into<ParamKey>, coefficient: f64) -> Self {
        Self {
            first: first.into(),
            second: second.into(),
            coefficient,
        }
    }
}

/// Pearson correlation of normal scores giving Spearman correlation `rho`
#[must_use]
pub fn spearman_to_pearson(rho: f64) -> f64 {
    2.0 * (PI * rho / 6.0).sin()
}

/// Target correlation matrix over `keys` (in that order), built from the
/// declared Spearman coefficients. Undeclared pairs are uncorrelated.
pub fn target_matrix(
    keys: &[ParamKey],
    specs: &[CorrelationSpec],
) -> Result<DMatrix<f64>, CorrelationError> {
    let k = keys.len();
    let mut matrix = DMatrix::<f64>::identity(k, k);
    let mut declared = vec![false; k * k];

    for spec in specs {
        if !(spec.coefficient.is_finite() && (-1.0..=1.0).contains(&spec.coefficient)) {
            return Err(CorrelationError::OutOfRange {
                first: spec.first.clone(),
                second: spec.second.clone(),
                coefficient: spec.coefficient,
            });
        }
        if spec.first == spec.second {
            return Err(CorrelationError::SelfCorrelation(spec.first.clone()));
        }
        let position = |key: &ParamKey| {
            keys.iter()
                .position(|k| k == key)
                .ok_or_else(|| CorrelationError::UnknownParameter(key.clone()))
        };
        let i = position(&spec.first)?;
        let j = position(&spec.second)?;
        if declared[i * k + j] {
            return Err(CorrelationError::Duplicate {
                first: spec.first.clone(),
                second: spec.second.clone(),
            });
        }
        declared[i * k + j] = true;
        declared[j * k + i] = true;

        let pearson = spearman_to_pearson(spec.coefficient);
        matrix[(i, j)] = pearson;
        matrix[(j, i)] = pearson;
    }

    if matrix.clone().cholesky().is_none() {
        return Err(CorrelationError::NotPositiveDefinite);
    }
    Ok(matrix)
}

/// `Φ⁻¹(i / (n + 1))` for `i = 1..=n`
#[must_use]
pub fn van_der_waerden_scores(n: usize) -> Vec<f64> {
    (1..=n)
        .map(|i| {
            let p = i as f64 / (n + 1) as f64;
            -SQRT_2 * erfc_inv(2.0 * p)
        })
        .collect()
}

/// Reorder `columns` in place so their rank correlation approximates
/// `target`. All columns must have the same length.
pub fn induce_rank_correlation<R: Rng + ?Sized>(
    columns: &mut [Vec<f64>],
    target: &DMatrix<f64>,
    rng: &mut R,
) -> Result<(), CorrelationError> {
    let k = columns.len();
    if k < 2 {
        return Ok(());
    }
    let n = columns[0].len();
    if n <= k || columns.iter().any(|c| c.len() != n) {
        return Err(CorrelationError::TooFewSamples {
            samples: n,
            dimensions: k,
        });
    }

    let scores = van_der_waerden_scores(n);
    let mut score_columns = Vec::with_capacity(k);
    for _ in 0..k {
        let mut column = scores.clone();
        column.shuffle(rng);
        score_columns.push(column);
    }

    let achieved = correlation_matrix(&score_columns);
    let p = target
        .clone()
        .cholesky()
        .ok_or(CorrelationError::NotPositiveDefinite)?
        .l();
    let q = achieved
        .cholesky()
        .ok_or(CorrelationError::TooFewSamples {
            samples: n,
            dimensions: k,
        })?
        .l();
    let q_inv = q.try_inverse().ok_or(CorrelationError::TooFewSamples {
        samples: n,
        dimensions: k,
    })?;
    let s = p * q_inv;

    let r = DMatrix::from_fn(n, k, |i, j| score_columns[j][i]);
    let adjusted = r * s.transpose();

    for (j, column) in columns.iter_mut().enumerate() {
        let latent: Vec<f64> = adjusted.column(j).iter().copied().collect();
        let ranks = ordinal_ranks(&latent);

        let mut sorted = column.clone();
        sorted.sort_by(f64::total_cmp);
        for (slot, rank) in column.iter_mut().zip(ranks) {
            *slot = sorted[rank];
        }
    }
    Ok(())
}

/// Zero-based rank of every value; ties broken by position
fn ordinal_ranks(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]).then(a.cmp(&b)));
    let mut ranks = vec![0; values.len()];
    for (rank, idx) in order.into_iter().enumerate() {
        ranks[idx] = rank;
    }
    ranks
}

/// One-based ranks with ties sharing their average rank
#[must_use]
pub fn fractional_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len()
            && values[order[end]].total_cmp(&values[order[start]]) == Ordering::Equal
        {
            end += 1;
        }
        // Positions start..end share ranks start+1..=end
        let average = (start + 1 + end) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = average;
        }
        start = end;
    }
    ranks
}

/// Pearson correlation; 0 when either side has no spread
#[must_use]
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let mean_a = a[..n].iter().sum::<f64>() / n as f64;
    let mean_b = b[..n].iter().sum::<f64>() / n as f64;
    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (x, y) in a[..n].iter().zip(&b[..n]) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    if var_a <= 0.0 || var_b <= 0.0 {
        0.0
    } else {
        cov / (var_a * var_b).sqrt()
    }
}

/// Spearman rank correlation
#[must_use]
pub fn spearman(a: &[f64], b: &[f64]) -> f64 {
    pearson(&fractional_ranks(a), &fractional_ranks(b))
}

fn correlation_matrix(columns: &[Vec<f64>]) -> DMatrix<f64> {
    let k = columns.len();
    let mut matrix = DMatrix::<f64>::identity(k, k);
    for i in 0..k {
        for j in (i + 1)..k {
            let r = pearson(&columns[i], &columns[j]);
            matrix[(i, j)] = r;
            matrix[(j, i)] = r;
        }
    }
    matrix
}
