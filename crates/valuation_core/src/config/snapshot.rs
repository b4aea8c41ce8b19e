//! Undo journal for in-place mutation
//!
//! Records the prior value of every field touched by
//! [`Configuration::mutate_in_place`](super::Configuration::mutate_in_place)
//! so the configuration can be put back exactly as it was.

use crate::model::ParamKey;

use super::ParamValue;

/// Prior values of the fields touched by one or more in-place mutations.
///
/// Only the first recorded value of each key is kept, so restoring a
/// snapshot that spans several mutations returns to the state before the
/// first one.
#[derive(Debug, Clone, Default, PartialEq)]
#[must_use = "a snapshot must be passed to `restore` to undo the mutation"]
pub struct Snapshot {
    touched: Vec<(ParamKey, ParamValue)>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, key: &ParamKey, previous: &ParamValue) {
        if !self.touched.iter().any(|(k, _)| k == key) {
            self.touched.push((key.clone(), previous.clone()));
        }
    }

    /// Keys whose values will be put back on restore
    pub fn keys(&self) -> impl Iterator<Item = &ParamKey> {
        self.touched.iter().map(|(k, _)| k)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.touched.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.touched.is_empty()
    }

    /// Take the recorded values, most recent first
    pub(crate) fn into_undo_order(self) -> impl Iterator<Item = (ParamKey, ParamValue)> {
        self.touched.into_iter().rev()
    }
}
