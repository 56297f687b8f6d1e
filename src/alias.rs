//! User-defined place name substitutions.

use std::collections::HashMap;

use crate::location::PlaceName;

/// Exact-match rewrites applied to resolved place names
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    rules: HashMap<String, String>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `source -> destination`. A later rule for the same source
    /// replaces the earlier one.
    pub fn insert(&mut self, source: impl Into<String>, destination: impl Into<String>) {
        self.rules.insert(source.into(), destination.into());
    }

    /// Rewrites `name` if it matches a source exactly. Destinations are not
    /// looked up again, and unresolved names pass through.
    pub fn apply(&self, name: PlaceName) -> PlaceName {
        match name {
            PlaceName::Named(ref value) => match self.rules.get(value) {
                Some(destination) => PlaceName::Named(destination.clone()),
                None => name,
            },
            PlaceName::Unresolved => PlaceName::Unresolved,
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules sorted by source, for display
    pub fn rules(&self) -> Vec<(&str, &str)> {
        let mut rules: Vec<_> = self
            .rules
            .iter()
            .map(|(source, destination)| (source.as_str(), destination.as_str()))
            .collect();
        rules.sort();
        rules
    }
}

impl<S: Into<String>, D: Into<String>> FromIterator<(S, D)> for AliasTable {
    fn from_iter<I: IntoIterator<Item = (S, D)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (source, destination) in iter {
            table.insert(source, destination);
        }
        table
    }
}
