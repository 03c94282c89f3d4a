// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration reconciliation.
//!
//! Reconciliation is the whole "should the forge be restarted?" flow built on
//! top of [`merge`](crate::merge) and [`canon`](crate::ini::canon):
//!
//! 1. Validate that the candidate exists, and that the deployed path is not
//!    something other than a regular file.
//! 2. Load both sides. A missing deployed file is an empty document.
//! 3. Merge the candidate into the deployed document under the ignore policy.
//! 4. Compare the merged document with the deployed one under the same policy.
//! 5. If they differ, optionally back up the deployed file, then atomically
//!    replace it with the merged result.
//!
//! The caller acts on [`Outcome::changed`], typically by restarting the forge.
//! Ownership of the resulting file is left to the caller. Permission bits of
//! an existing deployed file are carried over to its replacement.
//!
//! # Atomic Replacement
//!
//! The merged text is written to a temporary file inside the target's own
//! directory, synced, and then renamed over the target. Rename is atomic only
//! within one filesystem, hence the same-directory temporary file.

use crate::{
    ini::Document,
    merge::{MergeReport, StaleKeys},
    path::backup_path,
    policy::IgnorePolicy,
};

use chrono::Local;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

/// Reconcile deployed configuration with a candidate configuration.
#[derive(Debug, Clone)]
pub struct Reconciler {
    deployed: PathBuf,
    candidate: PathBuf,
    policy: IgnorePolicy,
    stale: StaleKeys,
    backup: bool,
    dry_run: bool,
}

impl Reconciler {
    /// Construct new reconciler.
    ///
    /// Retains stale keys, takes no backup, and writes for real by default.
    pub fn new(
        deployed: impl Into<PathBuf>,
        candidate: impl Into<PathBuf>,
        policy: IgnorePolicy,
    ) -> Self {
        Self {
            deployed: deployed.into(),
            candidate: candidate.into(),
            policy,
            stale: StaleKeys::default(),
            backup: false,
            dry_run: false,
        }
    }

    /// Set treatment of keys the candidate no longer defines.
    pub fn stale_keys(mut self, stale: StaleKeys) -> Self {
        self.stale = stale;
        self
    }

    /// Keep a timestamped copy of the deployed file before replacing it.
    pub fn backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    /// Only report what would happen, never touch the file system.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Run reconciliation.
    ///
    /// # Errors
    ///
    /// - Return [`ReconcileError::CandidateMissing`] if candidate does not
    ///   exist.
    /// - Return [`ReconcileError::NotAFile`] if either path exists but is not
    ///   a regular file.
    /// - Return [`ReconcileError::Load`] if either side cannot be loaded.
    /// - Return [`ReconcileError::Backup`] if backup copy fails.
    /// - Return [`ReconcileError::Persist`] if replacement fails.
    #[instrument(skip(self), level = "debug")]
    pub fn run(&self) -> Result<Report> {
        let exists = self.validate()?;

        let base = if exists {
            Document::load(&self.deployed)?
        } else {
            Document::new()
        };
        let candidate = Document::load(&self.candidate)?;
        let merged = MergeReport::new(&base, &candidate, &self.policy, self.stale);

        let outcome = if !exists {
            Outcome::Created
        } else if merged.changed() {
            Outcome::Updated {
                sections: merged.changed_sections.clone(),
                backup: None,
            }
        } else {
            debug!("{:?} is up-to-date", self.deployed.display());
            return Ok(self.report(Outcome::Unchanged));
        };

        if self.dry_run {
            info!("check mode, leave {:?} untouched", self.deployed.display());
            return Ok(self.report(outcome));
        }

        let outcome = match outcome {
            Outcome::Updated { sections, .. } => Outcome::Updated {
                sections,
                backup: self.take_backup()?,
            },
            outcome => outcome,
        };

        info!("write {:?}", self.deployed.display());
        persist(&merged.document.to_string(), &self.deployed)?;

        Ok(self.report(outcome))
    }

    fn validate(&self) -> Result<bool> {
        if !self.candidate.exists() {
            return Err(ReconcileError::CandidateMissing {
                path: self.candidate.clone(),
            });
        }

        if !self.candidate.is_file() {
            return Err(ReconcileError::NotAFile {
                path: self.candidate.clone(),
            });
        }

        if !self.deployed.exists() {
            return Ok(false);
        }

        if !self.deployed.is_file() {
            return Err(ReconcileError::NotAFile {
                path: self.deployed.clone(),
            });
        }

        Ok(true)
    }

    fn take_backup(&self) -> Result<Option<PathBuf>> {
        if !self.backup {
            return Ok(None);
        }

        let backup = backup_path(&self.deployed, &Local::now());
        info!(
            "back up {:?} to {:?}",
            self.deployed.display(),
            backup.display()
        );
        copy_backup(&self.deployed, &backup).map_err(|err| ReconcileError::Backup {
            source: err,
            path: backup.clone(),
        })?;

        Ok(Some(backup))
    }

    fn report(&self, outcome: Outcome) -> Report {
        Report {
            path: self.deployed.clone(),
            outcome,
            dry_run: self.dry_run,
        }
    }
}

// INVARIANT: Never overwrite an earlier backup.
fn copy_backup(source: &Path, backup: &Path) -> io::Result<()> {
    let mut reader = fs::File::open(source)?;
    let mut writer = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(backup)?;
    io::copy(&mut reader, &mut writer)?;
    writer.set_permissions(reader.metadata()?.permissions())?;

    Ok(())
}

/// Atomically replace `target` with `content`.
///
/// Permission bits of an existing target are kept.
///
/// # Errors
///
/// - Return [`ReconcileError::Persist`] if any step of the replacement fails.
pub fn persist(content: &str, target: impl AsRef<Path>) -> Result<()> {
    let target = target.as_ref();
    let persist_err = |err: std::io::Error| ReconcileError::Persist {
        source: err,
        path: target.to_path_buf(),
    };

    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir).map_err(persist_err)?;
    file.write_all(content.as_bytes()).map_err(persist_err)?;
    file.as_file().sync_all().map_err(persist_err)?;

    // INVARIANT: Replacement keeps permission bits of what it replaces.
    if let Ok(metadata) = fs::metadata(target) {
        fs::set_permissions(file.path(), metadata.permissions()).map_err(persist_err)?;
    }

    file.persist(target)
        .map_err(|err| persist_err(err.error))?;

    Ok(())
}

/// What reconciliation did, or would do in check mode.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Outcome {
    /// Deployed file did not exist, and was created from the candidate.
    Created,

    /// Deployed file differed, and was replaced with the merged result.
    Updated {
        /// Sections that changed.
        sections: Vec<String>,

        /// Location of backup copy, if one was taken.
        backup: Option<PathBuf>,
    },

    /// Deployed file already matches the candidate.
    Unchanged,
}

impl Outcome {
    /// Check if deployed configuration changed, i.e., service needs a restart.
    pub fn changed(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Reconciliation report for a deployed file.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Report {
    /// Deployed file.
    pub path: PathBuf,

    /// What happened.
    pub outcome: Outcome,

    /// Whether this was a check mode run.
    pub dry_run: bool,
}

impl Report {
    /// Check if deployed configuration changed, or would have in check mode.
    pub fn changed(&self) -> bool {
        self.outcome.changed()
    }
}

impl Display for Report {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string());

        match (&self.outcome, self.dry_run) {
            (Outcome::Created, false) => write!(fmt, "{name} was created"),
            (Outcome::Created, true) => write!(fmt, "{name} would be created (check mode)"),
            (Outcome::Updated { sections, .. }, false) => {
                write!(fmt, "{name} was changed [{}]", sections.join(", "))
            }
            (Outcome::Updated { sections, .. }, true) => write!(
                fmt,
                "{name} would be changed [{}] (check mode)",
                sections.join(", ")
            ),
            (Outcome::Unchanged, _) => write!(fmt, "{name} is up-to-date"),
        }
    }
}

/// Reconciliation error types.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Candidate configuration does not exist.
    #[error("candidate configuration {:?} does not exist", path.display())]
    CandidateMissing { path: PathBuf },

    /// Path exists but is not a regular file.
    #[error("{:?} exists but is not a file", path.display())]
    NotAFile { path: PathBuf },

    /// Deployed or candidate configuration cannot be loaded.
    #[error(transparent)]
    Load(#[from] crate::ini::IniError),

    /// Backup copy cannot be made.
    #[error("failed to back up configuration to {:?}", path.display())]
    Backup {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Deployed configuration cannot be replaced.
    #[error("failed to write {:?}", path.display())]
    Persist {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ReconcileError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    fn report(outcome: Outcome, dry_run: bool) -> Report {
        Report {
            path: PathBuf::from("/etc/forgejo/forgejo.ini"),
            outcome,
            dry_run,
        }
    }

    #[test_case(Outcome::Created, false, "forgejo.ini was created"; "created")]
    #[test_case(Outcome::Created, true, "forgejo.ini would be created (check mode)"; "created check")]
    #[test_case(
        Outcome::Updated { sections: vec!["server".into(), "ui".into()], backup: None },
        false,
        "forgejo.ini was changed [server, ui]";
        "updated"
    )]
    #[test_case(
        Outcome::Updated { sections: vec!["server".into()], backup: None },
        true,
        "forgejo.ini would be changed [server] (check mode)";
        "updated check"
    )]
    #[test_case(Outcome::Unchanged, true, "forgejo.ini is up-to-date"; "unchanged")]
    #[test]
    fn report_message(outcome: Outcome, dry_run: bool, expect: &str) {
        assert_eq!(report(outcome, dry_run).to_string(), expect);
    }

    #[test]
    fn outcome_changed() {
        assert!(Outcome::Created.changed());
        assert!(Outcome::Updated {
            sections: Vec::new(),
            backup: None
        }
        .changed());
        assert!(!Outcome::Unchanged.changed());
    }

    #[test]
    fn copy_backup_refuses_to_overwrite() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let deployed = dir.path().join("forgejo.ini");
        let backup = dir.path().join("forgejo_20250614_093059.ini");

        fs::write(&deployed, "first\n")?;
        copy_backup(&deployed, &backup)?;
        assert_eq!(fs::read_to_string(&backup)?, "first\n");

        fs::write(&deployed, "second\n")?;
        let result = copy_backup(&deployed, &backup);
        assert!(matches!(result, Err(err) if err.kind() == io::ErrorKind::AlreadyExists));
        assert_eq!(fs::read_to_string(&backup)?, "first\n");

        Ok(())
    }

    #[test]
    fn persist_replaces_content() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("forgejo.ini");
        fs::write(&target, "old\n")?;

        persist("[server]\nHTTP_PORT = 3000\n", &target)?;
        assert_eq!(fs::read_to_string(&target)?, "[server]\nHTTP_PORT = 3000\n");

        // No temporary files left behind.
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn persist_keeps_permissions() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        let target = dir.path().join("forgejo.ini");
        fs::write(&target, "old\n")?;
        fs::set_permissions(&target, fs::Permissions::from_mode(0o640))?;

        persist("new\n", &target)?;
        let mode = fs::metadata(&target)?.permissions().mode() & 0o7777;
        assert_eq!(mode, 0o640);

        Ok(())
    }

    #[test]
    fn persist_fails_without_parent_dir() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("missing").join("forgejo.ini");

        let result = persist("new\n", &target);
        assert!(matches!(result, Err(ReconcileError::Persist { .. })));

        Ok(())
    }
}
