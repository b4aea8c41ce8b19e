//! Declarative table of derived configuration fields
//!
//! A derived field is a numeric parameter computed from other parameters
//! (for example a total cable cost from a per-km rate and a route length).
//! The table is the single place where propagation is described: both
//! mutation pathways of [`Configuration`](super::Configuration) walk the
//! same dependents list after setting a raw value.

use std::collections::VecDeque;
use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::ConfigError;
use crate::model::ParamKey;

use super::Configuration;

/// Pure recompute function for a derived field.
///
/// Reads its inputs from the configuration it is handed and returns the new
/// value of the target field.
pub type DeriveFn = fn(&Configuration) -> Result<f64, ConfigError>;

/// One entry of the rule table: `inputs -> target` via `compute`
#[derive(Clone)]
pub struct DerivedField {
    pub target: ParamKey,
    pub inputs: Vec<ParamKey>,
    pub compute: DeriveFn,
}

impl DerivedField {
    pub fn new(target: impl Into<ParamKey>, inputs: &[&str], compute: DeriveFn) -> Self {
        Self {
            target: target.into(),
            inputs: inputs.iter().map(|k| ParamKey::from(*k)).collect(),
            compute,
        }
    }
}

impl fmt::Debug for DerivedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedField")
            .field("target", &self.target)
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

/// Derived fields in evaluation order plus an index from every parameter to
/// the derived fields that must be recomputed when it changes.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    /// Topologically sorted: a field appears after every field it reads
    fields: Vec<DerivedField>,
    /// Transitive dependents of each key, as indices into `fields` in
    /// ascending (evaluation) order
    dependents: FxHashMap<ParamKey, Vec<usize>>,
    targets: FxHashSet<ParamKey>,
}

impl RuleTable {
    /// Build the table, ordering fields so that each one is computed after
    /// the derived fields it reads.
    pub fn new(fields: Vec<DerivedField>) -> Result<Self, ConfigError> {
        let mut targets = FxHashSet::default();
        for field in &fields {
            if !targets.insert(field.target.clone()) {
                return Err(ConfigError::DuplicateParameter(field.target.clone()));
            }
        }

        let fields = topological_order(fields, &targets)?;

        // Direct readers of each key
        let mut readers: FxHashMap<&ParamKey, Vec<usize>> = FxHashMap::default();
        for (i, field) in fields.iter().enumerate() {
            for input in &field.inputs {
                readers.entry(input).or_default().push(i);
            }
        }

        let mut dependents = FxHashMap::default();
        for key in readers.keys() {
            let mut seen = FxHashSet::default();
            let mut queue: VecDeque<usize> = readers[key].iter().copied().collect();
            while let Some(i) = queue.pop_front() {
                if !seen.insert(i) {
                    continue;
                }
                if let Some(next) = readers.get(&fields[i].target) {
                    queue.extend(next.iter().copied());
                }
            }
            let mut ordered: Vec<usize> = seen.into_iter().collect();
            ordered.sort_unstable();
            dependents.insert((*key).clone(), ordered);
        }

        Ok(Self {
            fields,
            dependents,
            targets,
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_derived(&self, key: &ParamKey) -> bool {
        self.targets.contains(key)
    }

    /// All derived fields in evaluation order
    pub fn fields(&self) -> impl Iterator<Item = &DerivedField> {
        self.fields.iter()
    }

    /// Derived fields affected (directly or transitively) by `key`, in the
    /// order they must be recomputed
    pub fn dependents(&self, key: &ParamKey) -> impl Iterator<Item = &DerivedField> {
        self.dependents
            .get(key)
            .into_iter()
            .flatten()
            .map(|&i| &self.fields[i])
    }
}

/// Kahn's algorithm over derived-to-derived edges
fn topological_order(
    fields: Vec<DerivedField>,
    targets: &FxHashSet<ParamKey>,
) -> Result<Vec<DerivedField>, ConfigError> {
    let index: FxHashMap<ParamKey, usize> = fields
        .iter()
        .enumerate()
        .map(|(i, f)| (f.target.clone(), i))
        .collect();

    let mut in_degree = vec![0usize; fields.len()];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); fields.len()];
    for (i, field) in fields.iter().enumerate() {
        for input in field.inputs.iter().filter(|k| targets.contains(*k)) {
            let parent = index[input];
            children[parent].push(i);
            in_degree[i] += 1;
        }
    }

    // Seed in declaration order so the result is stable
    let mut ready: VecDeque<usize> = (0..fields.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(fields.len());
    while let Some(i) = ready.pop_front() {
        order.push(i);
        for &child in &children[i] {
            in_degree[child] -= 1;
            if in_degree[child] == 0 {
                ready.push_back(child);
            }
        }
    }

    if order.len() != fields.len() {
        let stuck = (0..fields.len())
            .find(|&i| in_degree[i] > 0)
            .map(|i| fields[i].target.clone())
            .unwrap_or_else(|| ParamKey::from(""));
        return Err(ConfigError::DerivationCycle(stuck));
    }

    let mut slots: Vec<Option<DerivedField>> = fields.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}
