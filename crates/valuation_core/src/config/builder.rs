//! Configuration Builder
//!
//! Fluent construction of a [`Configuration`]: raw parameters first, then the
//! derived fields computed from them. Validation is deferred to [`build`],
//! which resolves the rule table and computes every derived value once.
//!
//! [`build`]: ConfigurationBuilder::build

use std::collections::BTreeMap;

use super::{Configuration, DerivedField, HardBound, ParamValue, RuleTable};
use crate::error::ConfigError;
use crate::model::ParamKey;

/// Builder for a [`Configuration`]
#[derive(Debug, Default)]
pub struct ConfigurationBuilder {
    values: BTreeMap<ParamKey, ParamValue>,
    bounds: BTreeMap<ParamKey, HardBound>,
    derived: Vec<DerivedField>,
    // First problem seen while chaining; reported by build()
    pending_error: Option<ConfigError>,
}

impl ConfigurationBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Raw parameters
    // =========================================================================

    /// Declare a numeric parameter
    #[must_use]
    pub fn number(mut self, key: impl Into<ParamKey>, value: f64) -> Self {
        let key = key.into();
        if !value.is_finite() {
            self.fail(ConfigError::InvalidParameterValue {
                key,
                value,
                reason: "value must be finite".to_string(),
            });
            return self;
        }
        self.insert(key, ParamValue::Number(value));
        self
    }

    /// Declare a numeric parameter with a hard physical bound
    #[must_use]
    pub fn bounded(self, key: impl Into<ParamKey>, value: f64, bound: HardBound) -> Self {
        let key = key.into();
        let mut this = self.number(key.clone(), value);
        if this.pending_error.is_none() {
            if let Err(e) = bound.check(&key, value) {
                this.fail(e);
            }
        }
        this.bounds.insert(key, bound);
        this
    }

    /// Declare a text parameter
    #[must_use]
    pub fn text(mut self, key: impl Into<ParamKey>, value: impl Into<String>) -> Self {
        self.insert(key.into(), ParamValue::Text(value.into()));
        self
    }

    // =========================================================================
    // Derived parameters
    // =========================================================================

    /// Declare a derived field; its value is computed at build time
    #[must_use]
    pub fn derived(mut self, field: DerivedField) -> Self {
        self.derived.push(field);
        self
    }

    /// Resolve the rule table and compute every derived field
    pub fn build(self) -> Result<Configuration, ConfigError> {
        if let Some(e) = self.pending_error {
            return Err(e);
        }

        let mut values = self.values;
        for field in &self.derived {
            if values.contains_key(&field.target) {
                return Err(ConfigError::DuplicateParameter(field.target.clone()));
            }
        }

        let rules = RuleTable::new(self.derived)?;
        for field in rules.fields() {
            for input in &field.inputs {
                if !values.contains_key(input) && !rules.is_derived(input) {
                    return Err(ConfigError::UnresolvedInput {
                        target: field.target.clone(),
                        input: input.clone(),
                    });
                }
            }
        }
        // Placeholders so propagation can record prior values
        for field in rules.fields() {
            values.insert(field.target.clone(), ParamValue::Number(0.0));
        }

        Configuration::from_parts(values, self.bounds, rules)
    }

    fn insert(&mut self, key: ParamKey, value: ParamValue) {
        if self.values.insert(key.clone(), value).is_some() {
            self.fail(ConfigError::DuplicateParameter(key));
        }
    }

    fn fail(&mut self, error: ConfigError) {
        if self.pending_error.is_none() {
            self.pending_error = Some(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn double(c: &Configuration) -> Result<f64, ConfigError> {
        Ok(2.0 * c.number("a.x")?)
    }

    #[test]
    fn test_duplicate_raw_parameter() {
        let result = ConfigurationBuilder::new()
            .number("a.x", 1.0)
            .number("a.x", 2.0)
            .build();
        assert_eq!(
            result.unwrap_err(),
            ConfigError::DuplicateParameter(ParamKey::from("a.x"))
        );
    }

    #[test]
    fn test_derived_target_clashes_with_raw() {
        let result = ConfigurationBuilder::new()
            .number("a.x", 1.0)
            .number("a.y", 1.0)
            .derived(DerivedField::new("a.y", &["a.x"], double))
            .build();
        assert!(matches!(result, Err(ConfigError::DuplicateParameter(_))));
    }

    #[test]
    fn test_unresolved_input() {
        let result = ConfigurationBuilder::new()
            .derived(DerivedField::new("a.y", &["a.x"], double))
            .build();
        assert_eq!(
            result.unwrap_err(),
            ConfigError::UnresolvedInput {
                target: ParamKey::from("a.y"),
                input: ParamKey::from("a.x"),
            }
        );
    }

    #[test]
    fn test_initial_value_outside_bound() {
        let result = ConfigurationBuilder::new()
            .bounded("a.x", -1.0, HardBound::non_negative())
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidParameterValue { .. })
        ));
    }

    #[test]
    fn test_build_computes_derived() {
        let config = ConfigurationBuilder::new()
            .number("a.x", 4.0)
            .derived(DerivedField::new("a.y", &["a.x"], double))
            .build()
            .unwrap();
        assert_eq!(config.number("a.y").unwrap(), 8.0);
        assert!(config.is_derived(&ParamKey::from("a.y")));
    }
}
