// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for files Forgeini reads or writes
//! besides the two configuration files it is handed.

use chrono::{DateTime, TimeZone};
use std::path::{Path, PathBuf};

/// Default path of the deployed forge configuration.
pub const DEFAULT_DEPLOYED_CONFIG: &str = "/etc/forgejo/forgejo.ini";

/// Default path of the freshly rendered candidate configuration.
pub const DEFAULT_CANDIDATE_CONFIG: &str = "/etc/forgejo/forgejo.new";

/// Determine default absolute path to Forgeini settings file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/forgeini/forgeini.toml` as
/// the default. Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoConfigDir`] if configuration directory cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_settings_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("forgeini").join("forgeini.toml"))
        .ok_or(NoConfigDir)
}

/// Determine backup path for `target` stamped with `time`.
///
/// The stamp goes between file stem and extension with second precision, so
/// `/etc/forgejo/forgejo.ini` becomes
/// `/etc/forgejo/forgejo_20250614_093059.ini`.
pub fn backup_path<Tz>(target: impl AsRef<Path>, time: &DateTime<Tz>) -> PathBuf
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let target = target.as_ref();
    let stamp = time.format("%Y%m%d_%H%M%S");
    let stem = target
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match target.extension() {
        Some(ext) => format!("{stem}_{stamp}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{stamp}"),
    };

    target.with_file_name(name)
}

/// No way to determine user's configuration directory.
///
/// # See Also
///
/// - [`dirs::config_dir`](https://docs.rs/dirs/latest/dirs/fn.config_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's configuration directory")]
pub struct NoConfigDir;

/// Friendly result alias :3
pub type Result<T, E = NoConfigDir> = std::result::Result<T, E>;
