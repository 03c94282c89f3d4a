// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! INI document model.
//!
//! A forge configuration file is a flat INI file: a list of bracketed
//! __sections__, each holding `KEY = value` lines. Forgejo treats keys as
//! case-sensitive, so the model never folds case.
//!
//! # Document Layout
//!
//! A [`Document`] is a two-level map of section name to [`Section`], and a
//! [`Section`] is a map of key to value. Both levels are kept sorted, because
//! the only rendering Forgeini ever produces is the canonical dump found in
//! [`canon`]. Insertion order carries no meaning in the source files either.
//!
//! Values are opaque strings. They are trimmed on read, but never interpreted,
//! so something like `text/html; charset=utf-8` survives untouched.
//!
//! ## Preamble
//!
//! Some files start with bare `KEY = value` lines before the first bracketed
//! header, e.g., `APP_NAME` and `RUN_USER` in a stock Forgejo configuration.
//! These keys are captured under the synthetic section [`DEFAULT_SECTION`].
//! The synthetic name never shows up in rendered output. Its keys are written
//! bare at the top of the file instead.
//!
//! # Information Loss
//!
//! Comments and blank lines are dropped on read. Rendering is always a fresh
//! canonical dump, so there is nowhere to put them back.

pub mod canon;
pub mod parse;

use crate::policy::IgnorePolicy;

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, instrument};

/// Name of the synthetic section holding keys that precede any header.
pub const DEFAULT_SECTION: &str = "__default__";

/// Parsed INI document.
///
/// # Invariant
///
/// - Section names are unique.
/// - Keys are unique within their section.
#[derive(Default, Debug, PartialEq, Eq, Clone)]
pub struct Document {
    sections: BTreeMap<String, Section>,
}

impl Document {
    /// Construct new empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load document from file at `path`.
    ///
    /// # Errors
    ///
    /// - Return [`IniError::NotFound`] if file does not exist.
    /// - Return [`IniError::Read`] if file cannot be read.
    /// - Return [`IniError::Parse`] if file content is malformed.
    #[instrument(skip(path), level = "debug")]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("load ini document: {:?}", path.display());
        let bytes = fs::read(path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => IniError::NotFound {
                path: path.to_path_buf(),
            },
            _ => IniError::Read {
                source: err,
                path: path.to_path_buf(),
            },
        })?;

        parse::parse_bytes(&bytes).map_err(|err| IniError::Parse {
            source: err,
            path: path.to_path_buf(),
        })
    }

    /// Load document from file at `path`, or an empty document if missing.
    ///
    /// # Errors
    ///
    /// - Return [`IniError::Read`] if file exists but cannot be read.
    /// - Return [`IniError::Parse`] if file content is malformed.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        match Self::load(path.as_ref()) {
            Err(IniError::NotFound { path }) => {
                debug!("{:?} does not exist, use empty document", path.display());
                Ok(Self::default())
            }
            result => result,
        }
    }

    /// Get section by name, creating it if it does not exist yet.
    pub fn get_or_create_section(&mut self, name: impl Into<String>) -> &mut Section {
        self.sections.entry(name.into()).or_default()
    }

    /// Get section by name.
    pub fn section(&self, name: impl AsRef<str>) -> Option<&Section> {
        self.sections.get(name.as_ref())
    }

    /// Check if `key` is defined under `section`.
    pub fn has(&self, section: impl AsRef<str>, key: impl AsRef<str>) -> bool {
        self.section(section)
            .is_some_and(|section| section.contains_key(key))
    }

    /// Get value of `key` under `section`.
    pub fn get(&self, section: impl AsRef<str>, key: impl AsRef<str>) -> Option<&str> {
        self.section(section).and_then(|section| section.get(key))
    }

    /// Set value of `key` under `section`, creating the section if needed.
    ///
    /// Returns the previous value if there was one.
    pub fn set(
        &mut self,
        section: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Option<String> {
        self.get_or_create_section(section).insert(key, value)
    }

    /// Remove `key` from `section`.
    ///
    /// The section itself stays, even if it becomes empty.
    pub fn remove(&mut self, section: impl AsRef<str>, key: impl AsRef<str>) -> Option<String> {
        self.sections
            .get_mut(section.as_ref())
            .and_then(|section| section.remove(key))
    }

    /// Iterate through sections sorted by name.
    pub fn sections(&self) -> impl Iterator<Item = (&str, &Section)> {
        self.sections
            .iter()
            .map(|(name, section)| (name.as_str(), section))
    }

    /// Check if document defines no keys at all.
    pub fn is_empty(&self) -> bool {
        self.sections.values().all(Section::is_empty)
    }

    /// Render canonical text while leaving out keys matched by `policy`.
    ///
    /// See [`canon::canonical`].
    pub fn canonical(&self, policy: &IgnorePolicy) -> String {
        canon::canonical(self, policy)
    }
}

impl FromStr for Document {
    type Err = parse::ParseError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        parse::parse(data)
    }
}

impl Display for Document {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(canon::canonical(self, &IgnorePolicy::default()).as_str())
    }
}

/// Section of an INI document.
#[derive(Default, Debug, PartialEq, Eq, Clone)]
pub struct Section {
    entries: BTreeMap<String, String>,
}

impl Section {
    /// Construct new empty section.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get value of `key`.
    pub fn get(&self, key: impl AsRef<str>) -> Option<&str> {
        self.entries.get(key.as_ref()).map(String::as_str)
    }

    /// Insert key-value pair, overwriting any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    /// Remove `key`.
    pub fn remove(&mut self, key: impl AsRef<str>) -> Option<String> {
        self.entries.remove(key.as_ref())
    }

    /// Check if `key` is defined.
    pub fn contains_key(&self, key: impl AsRef<str>) -> bool {
        self.entries.contains_key(key.as_ref())
    }

    /// Iterate through key-value pairs sorted by key.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if section defines no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Section
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

/// INI document loading error types.
#[derive(Debug, thiserror::Error)]
pub enum IniError {
    /// File does not exist.
    #[error("ini file {:?} does not exist", path.display())]
    NotFound { path: PathBuf },

    /// File exists but cannot be read.
    #[error("failed to read ini file {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// File content is malformed.
    #[error("failed to parse ini file {:?}", path.display())]
    Parse {
        #[source]
        source: parse::ParseError,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = IniError> = std::result::Result<T, E>;
