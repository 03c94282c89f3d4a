// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Ignore policy.
//!
//! Forgejo generates some secrets the first time it starts and writes them
//! back into its own configuration file, e.g., `INTERNAL_TOKEN` under
//! `[security]`. A freshly rendered candidate either lacks these or carries a
//! throwaway value. An __ignore policy__ lists these volatile keys so that
//! they never count as a change and never get overwritten by a merge.
//!
//! # External Shape
//!
//! Callers hand over the policy as a section to key-list mapping, either as a
//! JSON literal or as a TOML table:
//!
//! ```json
//! { "security": ["INTERNAL_TOKEN"], "oauth2": ["JWT_SECRET"] }
//! ```
//!
//! No policy is ever applied implicitly. Every comparison and merge takes the
//! policy as an explicit argument.

use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

/// Set of `(section, key)` pairs excluded from comparison and overwrite.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(transparent)]
pub struct IgnorePolicy(BTreeMap<String, BTreeSet<String>>);

impl IgnorePolicy {
    /// Construct new empty policy that ignores nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy covering the secrets Forgejo persists on its own.
    ///
    /// Ignores `INTERNAL_TOKEN` under `[security]`, and `JWT_SECRET` under
    /// `[oauth2]`.
    pub fn forgejo_default() -> Self {
        Self::new()
            .with("security", "INTERNAL_TOKEN")
            .with("oauth2", "JWT_SECRET")
    }

    /// Parse policy from a JSON mapping literal.
    ///
    /// # Errors
    ///
    /// - Return [`PolicyError::Json`] if literal is not a mapping of section
    ///   names to lists of key names.
    pub fn from_json(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }

    /// Add `key` under `section` to policy, builder style.
    pub fn with(mut self, section: impl Into<String>, key: impl Into<String>) -> Self {
        self.insert(section, key);
        self
    }

    /// Add `key` under `section` to policy.
    pub fn insert(&mut self, section: impl Into<String>, key: impl Into<String>) {
        self.0.entry(section.into()).or_default().insert(key.into());
    }

    /// Check if `key` under `section` is ignored.
    pub fn is_ignored(&self, section: impl AsRef<str>, key: impl AsRef<str>) -> bool {
        self.0
            .get(section.as_ref())
            .is_some_and(|keys| keys.contains(key.as_ref()))
    }

    /// Iterate through every ignored `(section, key)` pair.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().flat_map(|(section, keys)| {
            keys.iter().map(move |key| (section.as_str(), key.as_str()))
        })
    }

    /// Check if policy ignores nothing.
    pub fn is_empty(&self) -> bool {
        self.0.values().all(BTreeSet::is_empty)
    }
}

impl FromStr for IgnorePolicy {
    type Err = PolicyError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        Self::from_json(data)
    }
}

impl Display for IgnorePolicy {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let pairs = self
            .iter()
            .map(|(section, key)| format!("{section}.{key}"))
            .collect::<Vec<_>>();
        fmt.write_str(pairs.join(", ").as_str())
    }
}

impl<S, K> FromIterator<(S, K)> for IgnorePolicy
where
    S: Into<String>,
    K: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (S, K)>>(iter: I) -> Self {
        let mut policy = Self::new();
        for (section, key) in iter {
            policy.insert(section, key);
        }
        policy
    }
}

/// Ignore policy error types.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// Policy literal is not valid.
    #[error("invalid ignore policy: {0}")]
    Json(#[from] serde_json::Error),
}

/// Friendly result alias :3
pub type Result<T, E = PolicyError> = std::result::Result<T, E>;
