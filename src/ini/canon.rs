// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Canonical form, fingerprints, and equality.
//!
//! Deciding whether the deployed configuration needs replacing (and the forge
//! restarting) cannot rely on raw text. Templates reorder keys, add blank
//! lines, and the forge rewrites some secrets on its own. So both sides are
//! reduced to a __canonical form__ first:
//!
//! 1. Keys of the [`DEFAULT_SECTION`] come first, bare and sorted.
//! 2. Named sections follow, sorted by name, each under its `[name]` header.
//! 3. Keys within a section are sorted, one `key = value` per line.
//! 4. Pairs matched by the [`IgnorePolicy`] are left out.
//! 5. Sections with no remaining keys are left out entirely, so an empty
//!    section and a missing one compare equal.
//! 6. Blocks are separated by exactly one blank line.
//!
//! A [`Fingerprint`] is the SHA-256 digest of that text. Because the same text
//! feeds both the digest and the human readable dump, fingerprint equality
//! and canonical text equality always agree.
//!
//! Rendering with an empty policy is also how documents get written back to
//! disk.

use crate::{
    ini::{Document, Section, DEFAULT_SECTION},
    policy::IgnorePolicy,
};

use sha2::{Digest, Sha256};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{Display, Formatter, Result as FmtResult},
};

/// Render canonical text of `document`, leaving out keys matched by `policy`.
pub fn canonical(document: &Document, policy: &IgnorePolicy) -> String {
    let mut blocks = Vec::new();

    // INVARIANT: Synthetic section is written first and without a header.
    if let Some(section) = document.section(DEFAULT_SECTION) {
        let body = render_entries(DEFAULT_SECTION, section, policy);
        if !body.is_empty() {
            blocks.push(body);
        }
    }

    for (name, section) in document.sections() {
        if name == DEFAULT_SECTION {
            continue;
        }

        let body = render_entries(name, section, policy);
        if !body.is_empty() {
            blocks.push(format!("[{name}]\n{body}"));
        }
    }

    blocks.join("\n")
}

/// Compute fingerprint of `document`, leaving out keys matched by `policy`.
pub fn fingerprint(document: &Document, policy: &IgnorePolicy) -> Fingerprint {
    Fingerprint::of(canonical(document, policy))
}

/// Check if two documents are equal under `policy`.
pub fn equal(left: &Document, right: &Document, policy: &IgnorePolicy) -> bool {
    fingerprint(left, policy) == fingerprint(right, policy)
}

/// Compute fingerprint of each section in `document`.
///
/// Sections with no keys left after applying `policy` are omitted, mirroring
/// [`canonical`].
pub fn section_fingerprints(
    document: &Document,
    policy: &IgnorePolicy,
) -> BTreeMap<String, Fingerprint> {
    document
        .sections()
        .filter_map(|(name, section)| {
            let body = render_entries(name, section, policy);
            (!body.is_empty()).then(|| (name.to_string(), Fingerprint::of(body)))
        })
        .collect()
}

/// List names of sections whose content differs between two documents.
///
/// A section present on one side only counts as changed, unless it is empty
/// after applying `policy`.
pub fn changed_sections(
    left: &Document,
    right: &Document,
    policy: &IgnorePolicy,
) -> Vec<String> {
    let left = section_fingerprints(left, policy);
    let right = section_fingerprints(right, policy);

    left.keys()
        .chain(right.keys())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .filter(|name| left.get(*name) != right.get(*name))
        .cloned()
        .collect()
}

fn render_entries(name: &str, section: &Section, policy: &IgnorePolicy) -> String {
    let mut out = String::new();
    for (key, value) in section.iter() {
        if policy.is_ignored(name, key) {
            continue;
        }

        if value.is_empty() {
            out.push_str(format!("{key} =\n").as_str());
        } else {
            out.push_str(format!("{key} = {value}\n").as_str());
        }
    }

    out
}

/// Hex encoded SHA-256 digest of canonical text.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub struct Fingerprint(String);

impl Fingerprint {
    fn of(text: impl AsRef<str>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(text.as_ref().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// View hex digest as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for Fingerprint {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}
