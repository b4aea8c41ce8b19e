//! Configuration store
//!
//! A [`Configuration`] is a tree of named parameters organized into groups
//! (`economics.discount_rate`, `technology.pv_kw`, ...). Some parameters are
//! derived from others through a [`RuleTable`]; derived values are computed
//! when the configuration is built and recomputed whenever one of their inputs
//! is set.
//!
//! There are two ways to change a value, and both go through the same
//! propagation step so they cannot drift apart:
//!
//! - [`Configuration::with_override`] clones and returns the modified copy,
//!   leaving the original untouched (sensitivity sweeps).
//! - [`Configuration::mutate_in_place`] changes the configuration directly and
//!   hands back a [`Snapshot`] that [`Configuration::restore`] uses to undo
//!   it (Monte Carlo loops, one configuration per worker).
//!
//! ```ignore
//! let config = ConfigurationBuilder::new()
//!     .number("technology.cable_km", 12.0)
//!     .number("economics.cable_cost_per_km", 25_000.0)
//!     .derived(DerivedField::new(
//!         "economics.cable_capex",
//!         &["technology.cable_km", "economics.cable_cost_per_km"],
//!         |c| Ok(c.number("technology.cable_km")? * c.number("economics.cable_cost_per_km")?),
//!     ))
//!     .build()?;
//!
//! let high = config.with_override("economics.cable_cost_per_km", 30_000.0)?;
//! assert_eq!(high.number("economics.cable_capex")?, 360_000.0);
//! ```

use std::collections::BTreeMap;
use std::hash::Hasher;
use std::sync::Arc;

use rustc_hash::FxHasher;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::ConfigError;
use crate::model::ParamKey;

pub mod builder;
pub mod rules;
pub mod snapshot;

pub use builder::ConfigurationBuilder;
pub use rules::{DeriveFn, DerivedField, RuleTable};
pub use snapshot::Snapshot;

/// A single parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Text(String),
}

impl ParamValue {
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ParamValue::Number(v) => Some(*v),
            ParamValue::Text(_) => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Number(_) => None,
            ParamValue::Text(s) => Some(s),
        }
    }
}

/// Inclusive physical limits on a numeric parameter
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HardBound {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl HardBound {
    #[must_use]
    pub fn non_negative() -> Self {
        Self {
            min: Some(0.0),
            max: None,
        }
    }

    #[must_use]
    pub fn between(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    pub(crate) fn check(&self, key: &ParamKey, value: f64) -> Result<(), ConfigError> {
        let reason = match (self.min, self.max) {
            (Some(min), _) if value < min => format!("below the physical minimum {min}"),
            (_, Some(max)) if value > max => format!("above the physical maximum {max}"),
            _ => return Ok(()),
        };
        Err(ConfigError::InvalidParameterValue {
            key: key.clone(),
            value,
            reason,
        })
    }
}

/// Named parameters with derived-field propagation.
///
/// Cloning is cheap apart from the value map itself: the rule table is shared
/// behind an `Arc` and never mutated after construction.
#[derive(Debug, Clone)]
pub struct Configuration {
    values: BTreeMap<ParamKey, ParamValue>,
    bounds: BTreeMap<ParamKey, HardBound>,
    rules: Arc<RuleTable>,
}

impl PartialEq for Configuration {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values && self.bounds == other.bounds
    }
}

/// Serializes as `{ group: { name: value } }`
impl Serialize for Configuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tree: BTreeMap<&str, BTreeMap<&str, &ParamValue>> = BTreeMap::new();
        for (key, value) in &self.values {
            tree.entry(key.group())
                .or_default()
                .insert(key.name(), value);
        }
        let mut map = serializer.serialize_map(Some(tree.len()))?;
        for (group, params) in &tree {
            map.serialize_entry(group, params)?;
        }
        map.end()
    }
}

impl Configuration {
    pub(crate) fn from_parts(
        values: BTreeMap<ParamKey, ParamValue>,
        bounds: BTreeMap<ParamKey, HardBound>,
        rules: RuleTable,
    ) -> Result<Self, ConfigError> {
        let mut config = Self {
            values,
            bounds,
            rules: Arc::new(rules),
        };
        config.recompute_all()?;
        Ok(config)
    }

    // === Reads ===

    pub fn get(&self, key: impl Into<ParamKey>) -> Result<&ParamValue, ConfigError> {
        let key = key.into();
        self.values
            .get(&key)
            .ok_or(ConfigError::UnknownParameter(key))
    }

    /// Numeric value of a parameter
    pub fn number(&self, key: impl Into<ParamKey>) -> Result<f64, ConfigError> {
        let key = key.into();
        match self.values.get(&key) {
            Some(ParamValue::Number(v)) => Ok(*v),
            Some(ParamValue::Text(_)) => Err(ConfigError::NotNumeric(key)),
            None => Err(ConfigError::UnknownParameter(key)),
        }
    }

    pub fn text(&self, key: impl Into<ParamKey>) -> Result<&str, ConfigError> {
        let key = key.into();
        match self.values.get(&key) {
            Some(ParamValue::Text(s)) => Ok(s),
            Some(ParamValue::Number(_)) => Err(ConfigError::NotText(key)),
            None => Err(ConfigError::UnknownParameter(key)),
        }
    }

    #[must_use]
    pub fn contains(&self, key: &ParamKey) -> bool {
        self.values.contains_key(key)
    }

    /// All parameter keys in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &ParamKey> {
        self.values.keys()
    }

    /// Parameters of one group as `(name, value)` pairs
    pub fn group<'a>(&'a self, group: &'a str) -> impl Iterator<Item = (&'a str, &'a ParamValue)> {
        self.values
            .iter()
            .filter(move |(k, _)| k.group() == group)
            .map(|(k, v)| (k.name(), v))
    }

    /// Distinct group names in sorted order
    #[must_use]
    pub fn groups(&self) -> Vec<&str> {
        let mut groups: Vec<&str> = self.values.keys().map(ParamKey::group).collect();
        groups.dedup();
        groups
    }

    #[must_use]
    pub fn is_derived(&self, key: &ParamKey) -> bool {
        self.rules.is_derived(key)
    }

    /// Whether `key` names a raw numeric parameter that overrides may set
    pub fn check_settable(&self, key: &ParamKey) -> Result<(), ConfigError> {
        match self.values.get(key) {
            Some(ParamValue::Number(_)) if self.rules.is_derived(key) => {
                Err(ConfigError::DerivedParameter(key.clone()))
            }
            Some(ParamValue::Number(_)) => Ok(()),
            Some(ParamValue::Text(_)) => Err(ConfigError::NotNumeric(key.clone())),
            None => Err(ConfigError::UnknownParameter(key.clone())),
        }
    }

    #[must_use]
    pub fn bound(&self, key: &ParamKey) -> Option<&HardBound> {
        self.bounds.get(key)
    }

    #[must_use]
    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Derived fields recomputed when `key` changes
    pub fn dependents_of(&self, key: &ParamKey) -> Vec<&ParamKey> {
        self.rules.dependents(key).map(|f| &f.target).collect()
    }

    /// Stable hash of every parameter value.
    ///
    /// Two configurations with the same keys and bit-identical values share a
    /// fingerprint; used to prove a base configuration survived a sweep.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = FxHasher::default();
        for (key, value) in &self.values {
            hasher.write(key.as_str().as_bytes());
            hasher.write_u8(0xff);
            match value {
                ParamValue::Number(v) => {
                    hasher.write_u8(0);
                    hasher.write_u64(v.to_bits());
                }
                ParamValue::Text(s) => {
                    hasher.write_u8(1);
                    hasher.write(s.as_bytes());
                    hasher.write_u8(0xff);
                }
            }
        }
        hasher.finish()
    }

    // === Copy-then-mutate ===

    /// Independent copy differing from `self` only in `key` and the fields
    /// derived from it.
    pub fn with_override(
        &self,
        key: impl Into<ParamKey>,
        value: f64,
    ) -> Result<Configuration, ConfigError> {
        let key = key.into();
        let mut copy = self.clone();
        let mut journal = Snapshot::new();
        copy.set_and_propagate(&key, value, &mut journal)?;
        Ok(copy)
    }

    /// Independent copy with several overrides applied in order
    pub fn with_overrides(&self, overrides: &[(ParamKey, f64)]) -> Result<Configuration, ConfigError> {
        let mut copy = self.clone();
        let mut journal = Snapshot::new();
        for (key, value) in overrides {
            copy.set_and_propagate(key, *value, &mut journal)?;
        }
        Ok(copy)
    }

    // === Mutate-in-place-then-restore ===

    /// Set `key` directly, returning the snapshot needed to undo it.
    ///
    /// On error nothing is left modified.
    pub fn mutate_in_place(
        &mut self,
        key: impl Into<ParamKey>,
        value: f64,
    ) -> Result<Snapshot, ConfigError> {
        let key = key.into();
        let mut journal = Snapshot::new();
        if let Err(e) = self.set_and_propagate(&key, value, &mut journal) {
            self.restore(journal);
            return Err(e);
        }
        Ok(journal)
    }

    /// Apply several values in place under a single snapshot.
    ///
    /// On error every field already touched is restored before returning.
    pub fn mutate_many_in_place(
        &mut self,
        overrides: &[(ParamKey, f64)],
    ) -> Result<Snapshot, ConfigError> {
        let mut journal = Snapshot::new();
        for (key, value) in overrides {
            if let Err(e) = self.set_and_propagate(key, *value, &mut journal) {
                self.restore(journal);
                return Err(e);
            }
        }
        Ok(journal)
    }

    /// Put back every field recorded in `snapshot`
    pub fn restore(&mut self, snapshot: Snapshot) {
        for (key, previous) in snapshot.into_undo_order() {
            self.values.insert(key, previous);
        }
    }

    // === Propagation ===

    /// The only place values change after construction. Validates, records
    /// the prior value, sets, then recomputes every dependent derived field.
    fn set_and_propagate(
        &mut self,
        key: &ParamKey,
        value: f64,
        journal: &mut Snapshot,
    ) -> Result<(), ConfigError> {
        self.check_settable(key)?;
        let previous = &self.values[key];
        if !value.is_finite() {
            return Err(ConfigError::InvalidParameterValue {
                key: key.clone(),
                value,
                reason: "value must be finite".to_string(),
            });
        }
        if let Some(bound) = self.bounds.get(key) {
            bound.check(key, value)?;
        }

        journal.record(key, previous);
        self.values.insert(key.clone(), ParamValue::Number(value));

        let rules = Arc::clone(&self.rules);
        for field in rules.dependents(key) {
            let derived = (field.compute)(self)?;
            self.store_derived(&field.target, derived, journal)?;
        }
        Ok(())
    }

    fn store_derived(
        &mut self,
        target: &ParamKey,
        value: f64,
        journal: &mut Snapshot,
    ) -> Result<(), ConfigError> {
        if !value.is_finite() {
            return Err(ConfigError::Derivation {
                target: target.clone(),
                reason: format!("computed non-finite value {value}"),
            });
        }
        if let Some(previous) = self.values.get(target) {
            journal.record(target, previous);
        }
        self.values.insert(target.clone(), ParamValue::Number(value));
        Ok(())
    }

    /// Compute every derived field from scratch (construction time)
    fn recompute_all(&mut self) -> Result<(), ConfigError> {
        let rules = Arc::clone(&self.rules);
        let mut journal = Snapshot::new();
        for field in rules.fields() {
            for input in &field.inputs {
                if !self.values.contains_key(input) {
                    return Err(ConfigError::UnresolvedInput {
                        target: field.target.clone(),
                        input: input.clone(),
                    });
                }
            }
            let derived = (field.compute)(self)?;
            self.store_derived(&field.target, derived, &mut journal)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capex(c: &Configuration) -> Result<f64, ConfigError> {
        Ok(c.number("technology.cable_km")? * c.number("economics.cable_cost_per_km")?)
    }

    fn capex_with_contingency(c: &Configuration) -> Result<f64, ConfigError> {
        Ok(c.number("economics.cable_capex")? * (1.0 + c.number("economics.contingency")?))
    }

    fn sample_config() -> Configuration {
        ConfigurationBuilder::new()
            .number("technology.cable_km", 10.0)
            .bounded("economics.cable_cost_per_km", 20_000.0, HardBound::non_negative())
            .number("economics.contingency", 0.1)
            .text("technology.grid_type", "three_phase")
            .derived(DerivedField::new(
                "economics.cable_capex",
                &["technology.cable_km", "economics.cable_cost_per_km"],
                capex,
            ))
            .derived(DerivedField::new(
                "economics.cable_capex_total",
                &["economics.cable_capex", "economics.contingency"],
                capex_with_contingency,
            ))
            .build()
            .unwrap()
    }

    #[test]
    fn test_derived_fields_computed_at_build() {
        let config = sample_config();
        assert_eq!(config.number("economics.cable_capex").unwrap(), 200_000.0);
        assert!((config.number("economics.cable_capex_total").unwrap() - 220_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_with_override_leaves_base_untouched() {
        let base = sample_config();
        let before = serde_json::to_string(&base).unwrap();
        let fingerprint = base.fingerprint();

        let modified = base
            .with_override("economics.cable_cost_per_km", 30_000.0)
            .unwrap();

        assert_eq!(serde_json::to_string(&base).unwrap(), before);
        assert_eq!(base.fingerprint(), fingerprint);
        assert_ne!(modified.fingerprint(), fingerprint);
        assert_eq!(modified.number("economics.cable_capex").unwrap(), 300_000.0);
        assert!((modified.number("economics.cable_capex_total").unwrap() - 330_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_mutate_in_place_and_restore() {
        let mut config = sample_config();
        let original = config.clone();

        let snapshot = config.mutate_in_place("technology.cable_km", 15.0).unwrap();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(config.number("economics.cable_capex").unwrap(), 300_000.0);

        config.restore(snapshot);
        assert_eq!(config, original);
        assert_eq!(config.fingerprint(), original.fingerprint());
    }

    #[test]
    fn test_both_pathways_agree() {
        let base = sample_config();
        let copied = base.with_override("economics.contingency", 0.25).unwrap();

        let mut in_place = base.clone();
        let _snapshot = in_place.mutate_in_place("economics.contingency", 0.25).unwrap();

        assert_eq!(copied, in_place);
    }

    #[test]
    fn test_unknown_parameter() {
        let base = sample_config();
        let err = base.with_override("economics.nope", 1.0).unwrap_err();
        assert_eq!(err, ConfigError::UnknownParameter(ParamKey::from("economics.nope")));
    }

    #[test]
    fn test_hard_bound_rejected_without_side_effects() {
        let mut config = sample_config();
        let original = config.clone();

        let err = config
            .mutate_in_place("economics.cable_cost_per_km", -5.0)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParameterValue { .. }));
        assert_eq!(config, original);
    }

    #[test]
    fn test_many_in_place_rolls_back_on_error() {
        let mut config = sample_config();
        let original = config.clone();

        let err = config
            .mutate_many_in_place(&[
                (ParamKey::from("technology.cable_km"), 40.0),
                (ParamKey::from("economics.missing"), 1.0),
            ])
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownParameter(_)));
        assert_eq!(config, original);
    }

    #[test]
    fn test_derived_and_text_cannot_be_set() {
        let base = sample_config();
        assert!(matches!(
            base.with_override("economics.cable_capex", 1.0),
            Err(ConfigError::DerivedParameter(_))
        ));
        assert!(matches!(
            base.with_override("technology.grid_type", 1.0),
            Err(ConfigError::NotNumeric(_))
        ));
        assert!(matches!(
            base.with_override("technology.cable_km", f64::NAN),
            Err(ConfigError::InvalidParameterValue { .. })
        ));
    }

    #[test]
    fn test_check_settable() {
        let config = sample_config();
        assert!(config.check_settable(&ParamKey::from("technology.cable_km")).is_ok());
        assert!(matches!(
            config.check_settable(&ParamKey::from("economics.cable_capex_total")),
            Err(ConfigError::DerivedParameter(_))
        ));
        assert!(matches!(
            config.check_settable(&ParamKey::from("technology.grid_type")),
            Err(ConfigError::NotNumeric(_))
        ));
        assert!(matches!(
            config.check_settable(&ParamKey::from("economics.nope")),
            Err(ConfigError::UnknownParameter(_))
        ));
    }

    #[test]
    fn test_serializes_as_group_tree() {
        let config = sample_config();
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["technology"]["grid_type"], "three_phase");
        assert_eq!(value["economics"]["cable_capex"], 200_000.0);
        assert_eq!(config.groups(), ["economics", "technology"]);
        assert_eq!(config.group("technology").count(), 2);
    }
}
