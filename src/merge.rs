// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration merging.
//!
//! A merge folds a freshly rendered __candidate__ configuration into the
//! __base__ configuration currently deployed:
//!
//! - Keys the candidate defines overwrite the base, unless the
//!   [`IgnorePolicy`] lists them. Ignored keys always keep the base value, or
//!   stay absent if the base never had them.
//! - Keys the candidate introduces are added.
//! - Keys only the base defines are handled by [`StaleKeys`].
//!
//! # Stale Keys
//!
//! A candidate is usually a complete re-render, but it does not know about
//! settings added by hand on the target. Retaining base-only keys keeps those
//! settings alive, at the cost of never forgetting a setting that was
//! deliberately dropped from the template. [`StaleKeys::Retain`] is the
//! default. [`StaleKeys::Prune`] makes the candidate authoritative for every
//! key the policy does not ignore.

use crate::{
    ini::{canon, Document, IniError},
    policy::IgnorePolicy,
};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, info, instrument};

/// Treatment of keys defined by base but not by candidate.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StaleKeys {
    /// Keep base-only keys.
    #[default]
    Retain,

    /// Drop base-only keys that the ignore policy does not cover.
    Prune,
}

impl FromStr for StaleKeys {
    type Err = MergeError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        match data {
            "retain" => Ok(Self::Retain),
            "prune" => Ok(Self::Prune),
            _ => Err(MergeError::UnknownStaleKeys(data.to_string())),
        }
    }
}

impl Display for StaleKeys {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Retain => fmt.write_str("retain"),
            Self::Prune => fmt.write_str("prune"),
        }
    }
}

/// Merge `candidate` into `base`.
pub fn merge(
    base: &Document,
    candidate: &Document,
    policy: &IgnorePolicy,
    stale: StaleKeys,
) -> Document {
    let mut result = base.clone();

    if stale == StaleKeys::Prune {
        let stale_pairs = base
            .sections()
            .flat_map(|(name, section)| section.iter().map(move |(key, _)| (name, key)))
            .filter(|(name, key)| !policy.is_ignored(name, key) && !candidate.has(name, key))
            .collect::<Vec<_>>();

        for (name, key) in stale_pairs {
            debug!("prune stale key {name}.{key}");
            result.remove(name, key);
        }
    }

    for (name, section) in candidate.sections() {
        let target = result.get_or_create_section(name);
        for (key, value) in section.iter() {
            // INVARIANT: Ignored keys keep whatever base had, including nothing.
            if policy.is_ignored(name, key) {
                debug!("keep base value of ignored key {name}.{key}");
                continue;
            }

            target.insert(key, value);
        }
    }

    result
}

/// Merge candidate file into base file, and write result to output path.
///
/// A missing base file counts as an empty document. Stale keys are retained.
/// The output is written in canonical form with nothing left out. The write is
/// a plain write, not an atomic replacement.
///
/// # Errors
///
/// - Return [`MergeError::Load`] if base cannot be read or parsed.
/// - Return [`MergeError::Load`] if candidate is missing, or cannot be read
///   or parsed.
/// - Return [`MergeError::Write`] if output cannot be written.
pub fn merge_files(
    base_path: impl AsRef<Path>,
    candidate_path: impl AsRef<Path>,
    policy: &IgnorePolicy,
    output_path: impl AsRef<Path>,
) -> Result<MergeReport> {
    merge_files_with(
        base_path,
        candidate_path,
        policy,
        StaleKeys::default(),
        output_path,
    )
}

/// Merge candidate file into base file with explicit stale key treatment.
///
/// # Errors
///
/// - Same as [`merge_files`].
#[instrument(skip(base_path, candidate_path, policy, output_path), level = "debug")]
pub fn merge_files_with(
    base_path: impl AsRef<Path>,
    candidate_path: impl AsRef<Path>,
    policy: &IgnorePolicy,
    stale: StaleKeys,
    output_path: impl AsRef<Path>,
) -> Result<MergeReport> {
    let base = Document::load_or_default(base_path.as_ref())?;
    let candidate = Document::load(candidate_path.as_ref())?;
    let report = MergeReport::new(&base, &candidate, policy, stale);

    let output_path = output_path.as_ref();
    info!(
        "write merged configuration to {:?} ({} changed sections)",
        output_path.display(),
        report.changed_sections.len()
    );
    write_document(&report.document, output_path)?;

    Ok(report)
}

/// Write canonical form of `document` to `path`.
///
/// Parent directories are not created.
///
/// # Errors
///
/// - Return [`MergeError::Write`] if file cannot be written.
pub fn write_document(document: &Document, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, document.to_string()).map_err(|err| MergeError::Write {
        source: err,
        path: path.to_path_buf(),
    })
}

/// Result of a merge.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct MergeReport {
    /// Merged document.
    pub document: Document,

    /// Sections of merged document that differ from base under the policy.
    pub changed_sections: Vec<String>,
}

impl MergeReport {
    /// Merge `candidate` into `base`, and record what changed.
    pub fn new(
        base: &Document,
        candidate: &Document,
        policy: &IgnorePolicy,
        stale: StaleKeys,
    ) -> Self {
        let document = merge(base, candidate, policy, stale);
        let changed_sections = canon::changed_sections(base, &document, policy);

        Self {
            document,
            changed_sections,
        }
    }

    /// Check if merged document differs from base under the policy.
    pub fn changed(&self) -> bool {
        !self.changed_sections.is_empty()
    }
}

/// Merge error types.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// Base or candidate cannot be loaded.
    #[error(transparent)]
    Load(#[from] IniError),

    /// Merged result cannot be written.
    #[error("failed to write merged configuration to {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Stale key treatment is not recognized.
    #[error("unknown stale key treatment {0:?}, expected \"retain\" or \"prune\"")]
    UnknownStaleKeys(String),
}

/// Friendly result alias :3
pub type Result<T, E = MergeError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ini::{canon::equal, DEFAULT_SECTION};
    use indoc::indoc;
    use simple_test_case::test_case;

    fn doc(text: &str) -> Document {
        text.parse().unwrap()
    }

    #[test]
    fn merge_keeps_ignored_base_value() {
        let base = doc("[security]\nINTERNAL_TOKEN = abc123\n");
        let candidate = doc("[security]\nINTERNAL_TOKEN = xyz999\nINSTALL_LOCK = true\n");

        let result = merge(
            &base,
            &candidate,
            &IgnorePolicy::forgejo_default(),
            StaleKeys::Retain,
        );
        let expect = doc("[security]\nINSTALL_LOCK = true\nINTERNAL_TOKEN = abc123\n");
        assert_eq!(result, expect);
    }

    #[test]
    fn merge_never_introduces_ignored_key() {
        let candidate = doc("[oauth2]\nJWT_SECRET = fresh\nENABLED = true\n");

        let result = merge(
            &Document::new(),
            &candidate,
            &IgnorePolicy::forgejo_default(),
            StaleKeys::Retain,
        );
        assert!(!result.has("oauth2", "JWT_SECRET"));
        assert_eq!(result.get("oauth2", "ENABLED"), Some("true"));
    }

    #[test]
    fn merge_overrides_and_adds() {
        let base = doc(indoc! {r#"
            [server]
            HTTP_PORT = 3000
            DOMAIN = localhost
        "#});
        let candidate = doc(indoc! {r#"
            [server]
            HTTP_PORT = 3001
            [mailer]
            ENABLED = false
        "#});

        let result = merge(&base, &candidate, &IgnorePolicy::new(), StaleKeys::Retain);
        let expect = doc(indoc! {r#"
            [mailer]
            ENABLED = false
            [server]
            DOMAIN = localhost
            HTTP_PORT = 3001
        "#});
        assert_eq!(result, expect);
    }

    #[test]
    fn merge_retains_section_candidate_omits() {
        let base = doc("[repository]\nDEFAULT_BRANCH = main\n[server]\nHTTP_PORT = 3000\n");
        let candidate = doc("[server]\nHTTP_PORT = 3000\n");

        let result = merge(&base, &candidate, &IgnorePolicy::new(), StaleKeys::Retain);
        assert_eq!(result.get("repository", "DEFAULT_BRANCH"), Some("main"));
    }

    #[test]
    fn merge_prune_drops_stale_keys_but_keeps_ignored() {
        let base = doc(indoc! {r#"
            [repository]
            DEFAULT_BRANCH = main
            [security]
            INTERNAL_TOKEN = abc123
            SECRET_KEY = old
            [server]
            HTTP_PORT = 3000
        "#});
        let candidate = doc("[server]\nHTTP_PORT = 3001\n");

        let result = merge(
            &base,
            &candidate,
            &IgnorePolicy::forgejo_default(),
            StaleKeys::Prune,
        );
        let expect = indoc! {r#"
            [security]
            INTERNAL_TOKEN = abc123

            [server]
            HTTP_PORT = 3001
        "#};
        assert_eq!(result.to_string(), expect);
    }

    #[test_case(StaleKeys::Retain; "retain")]
    #[test_case(StaleKeys::Prune; "prune")]
    #[test]
    fn merge_is_idempotent(stale: StaleKeys) {
        let policy = IgnorePolicy::forgejo_default();
        let base = doc(indoc! {r#"
            APP_NAME = Forgejo
            [security]
            INTERNAL_TOKEN = abc123
            [server]
            HTTP_PORT = 3000
        "#});
        let candidate = doc(indoc! {r#"
            APP_NAME = Forge
            [security]
            INTERNAL_TOKEN = xyz999
            INSTALL_LOCK = true
        "#});

        let first = merge(&base, &candidate, &policy, stale);
        let second = merge(&first, &first, &policy, stale);
        assert!(equal(&first, &second, &policy));
        assert_eq!(first, second);
    }

    #[test]
    fn merge_report_detects_adoption_into_empty_base() {
        let candidate = doc("[server]\nHTTP_PORT = 3000\n");

        let report = MergeReport::new(
            &Document::new(),
            &candidate,
            &IgnorePolicy::forgejo_default(),
            StaleKeys::Retain,
        );
        assert_eq!(report.document, candidate);
        assert!(report.changed());
        assert_eq!(report.changed_sections, vec!["server".to_string()]);
    }

    #[test]
    fn merge_report_unchanged_when_only_volatile_keys_differ() {
        let base = doc("[security]\nINTERNAL_TOKEN = abc123\nINSTALL_LOCK = true\n");
        let candidate = doc("\n[security]\n\nINSTALL_LOCK=true\nINTERNAL_TOKEN = xyz999\n");

        let report = MergeReport::new(
            &base,
            &candidate,
            &IgnorePolicy::forgejo_default(),
            StaleKeys::Retain,
        );
        assert!(!report.changed());
        assert_eq!(report.document, base);
    }

    #[test]
    fn merge_files_writes_canonical_output() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let base = dir.path().join("forgejo.ini");
        let candidate = dir.path().join("forgejo.new");
        let output = dir.path().join("forgejo.merged");
        fs::write(
            &base,
            indoc! {r#"
                RUN_USER = git
                [security]
                INTERNAL_TOKEN = abc123
            "#},
        )?;
        fs::write(
            &candidate,
            indoc! {r#"
                RUN_USER = forgejo
                APP_NAME = Forgejo
                [security]
                INSTALL_LOCK = true
                INTERNAL_TOKEN = xyz999
            "#},
        )?;

        let report = merge_files(&base, &candidate, &IgnorePolicy::forgejo_default(), &output)?;
        assert!(report.changed());

        let result = fs::read_to_string(&output)?;
        let expect = indoc! {r#"
            APP_NAME = Forgejo
            RUN_USER = forgejo

            [security]
            INSTALL_LOCK = true
            INTERNAL_TOKEN = abc123
        "#};
        assert_eq!(result, expect);
        assert!(!result.contains(DEFAULT_SECTION));

        Ok(())
    }

    #[test]
    fn merge_files_missing_base_adopts_candidate() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let candidate = dir.path().join("forgejo.new");
        let output = dir.path().join("forgejo.ini");
        fs::write(&candidate, "[server]\nHTTP_PORT = 3000\n")?;

        let report = merge_files(
            dir.path().join("missing.ini"),
            &candidate,
            &IgnorePolicy::new(),
            &output,
        )?;
        assert!(report.changed());
        assert_eq!(fs::read_to_string(&output)?, "[server]\nHTTP_PORT = 3000\n");

        Ok(())
    }

    #[test]
    fn merge_files_missing_candidate_fails() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let output = dir.path().join("forgejo.ini");

        let result = merge_files(
            dir.path().join("forgejo.ini"),
            dir.path().join("forgejo.new"),
            &IgnorePolicy::new(),
            &output,
        );
        assert!(matches!(
            result,
            Err(MergeError::Load(IniError::NotFound { .. }))
        ));
        assert!(!output.exists());

        Ok(())
    }

    #[test]
    fn merge_files_does_not_create_parent_dirs() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let candidate = dir.path().join("forgejo.new");
        fs::write(&candidate, "[server]\nHTTP_PORT = 3000\n")?;

        let result = merge_files(
            dir.path().join("forgejo.ini"),
            &candidate,
            &IgnorePolicy::new(),
            dir.path().join("missing").join("forgejo.ini"),
        );
        assert!(matches!(result, Err(MergeError::Write { .. })));

        Ok(())
    }

    #[test_case("retain", Some(StaleKeys::Retain); "retain")]
    #[test_case("prune", Some(StaleKeys::Prune); "prune")]
    #[test_case("Prune", None; "case sensitive")]
    #[test]
    fn stale_keys_from_str(input: &str, expect: Option<StaleKeys>) {
        assert_eq!(input.parse::<StaleKeys>().ok(), expect);
    }
}
