//! Joint sampling of uncertain parameters
//!
//! Sampling is done up front for the whole run in two stages: every
//! parameter's marginal is drawn independently from a single seeded stream,
//! then the correlated subset of columns is reordered to match the declared
//! rank correlations. A given seed therefore always produces the same matrix,
//! whatever the thread count used to evaluate it.

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use super::correlation::{CorrelationSpec, induce_rank_correlation, spearman, target_matrix};
use crate::error::{Result, ValuationError};
use crate::model::ParamKey;
use crate::sensitivity::SensitivityParameter;

/// One Monte Carlo draw
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub iteration: usize,
    pub values: BTreeMap<ParamKey, f64>,
}

/// Declared and achieved Spearman correlation of one parameter pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievedCorrelation {
    pub first: ParamKey,
    pub second: ParamKey,
    pub target: f64,
    pub achieved: f64,
}

/// Column-major matrix of sampled values, one column per parameter
#[derive(Debug, Clone, PartialEq)]
pub struct SampleMatrix {
    keys: Vec<ParamKey>,
    columns: Vec<Vec<f64>>,
    iterations: usize,
}

impl SampleMatrix {
    /// Draw `iterations` joint samples of `parameters`
    pub fn draw(
        parameters: &[SensitivityParameter],
        correlations: &[CorrelationSpec],
        iterations: usize,
        seed: u64,
    ) -> Result<Self> {
        let mut seen = FxHashSet::default();
        for param in parameters {
            if !seen.insert(&param.key) {
                return Err(ValuationError::InvalidInput(format!(
                    "uncertain parameter '{}' is listed more than once",
                    param.key
                )));
            }
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let keys: Vec<ParamKey> = parameters.iter().map(|p| p.key.clone()).collect();
        let mut columns = Vec::with_capacity(parameters.len());
        for param in parameters {
            let column = param
                .marginal()
                .sample_n(&mut rng, iterations)
                .map_err(|source| ValuationError::Distribution {
                    parameter: param.key.clone(),
                    source,
                })?;
            columns.push(column);
        }

        let correlated: Vec<usize> = (0..keys.len())
            .filter(|&i| {
                correlations
                    .iter()
                    .any(|c| c.first == keys[i] || c.second == keys[i])
            })
            .collect();

        if !correlations.is_empty() {
            let subset_keys: Vec<ParamKey> = correlated.iter().map(|&i| keys[i].clone()).collect();
            let target = target_matrix(&subset_keys, correlations)?;
            if iterations > 0 {
                let mut subset: Vec<Vec<f64>> = correlated
                    .iter()
                    .map(|&i| std::mem::take(&mut columns[i]))
                    .collect();
                let induced = induce_rank_correlation(&mut subset, &target, &mut rng);
                for (&i, column) in correlated.iter().zip(subset) {
                    columns[i] = column;
                }
                induced?;
            }
        }

        Ok(Self {
            keys,
            columns,
            iterations,
        })
    }

    #[must_use]
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    #[must_use]
    pub fn keys(&self) -> &[ParamKey] {
        &self.keys
    }

    #[must_use]
    pub fn column(&self, key: &ParamKey) -> Option<&[f64]> {
        let idx = self.keys.iter().position(|k| k == key)?;
        Some(&self.columns[idx])
    }

    /// `(key, value)` pairs for one iteration, in parameter order
    #[must_use]
    pub fn overrides(&self, iteration: usize) -> Vec<(ParamKey, f64)> {
        self.keys
            .iter()
            .zip(&self.columns)
            .filter_map(|(k, c)| c.get(iteration).map(|v| (k.clone(), *v)))
            .collect()
    }

    #[must_use]
    pub fn sample(&self, iteration: usize) -> Sample {
        Sample {
            iteration,
            values: self.overrides(iteration).into_iter().collect(),
        }
    }

    /// Spearman correlation actually present in the matrix for each pair
    #[must_use]
    pub fn achieved_correlations(&self, correlations: &[CorrelationSpec]) -> Vec<AchievedCorrelation> {
        correlations
            .iter()
            .filter_map(|spec| {
                let a = self.column(&spec.first)?;
                let b = self.column(&spec.second)?;
                Some(AchievedCorrelation {
                    first: spec.first.clone(),
                    second: spec.second.clone(),
                    target: spec.coefficient,
                    achieved: spearman(a, b),
                })
            })
            .collect()
    }
}
