//! Identifiers for scenarios and configuration parameters
//!
//! Both are string newtypes so that exported tables stay readable and map
//! keys serialize as plain strings.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a scenario (investment pathway) known to the evaluator
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioId(pub String);

impl ScenarioId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScenarioId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Dotted `group.name` key of a configuration parameter.
///
/// Everything before the first `.` is the group; a key without a dot lives in
/// the unnamed group `""`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamKey(String);

impl ParamKey {
    pub fn new(group: &str, name: &str) -> Self {
        Self(format!("{group}.{name}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn group(&self) -> &str {
        self.0.split_once('.').map_or("", |(group, _)| group)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.0.split_once('.').map_or(self.0.as_str(), |(_, name)| name)
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParamKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for ParamKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&ParamKey> for ParamKey {
    fn from(key: &ParamKey) -> Self {
        key.clone()
    }
}
