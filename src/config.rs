// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the settings file that Forgeini reads to simplify
//! the process of serialization and deserialization. File I/O is left to the
//! caller to figure out.

use crate::{
    merge::StaleKeys,
    path::{DEFAULT_CANDIDATE_CONFIG, DEFAULT_DEPLOYED_CONFIG},
    policy::IgnorePolicy,
};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
};

/// Forgeini settings layout.
///
/// # General Layout
///
/// The settings file is composed of three parts: paths, reconcile behavior,
/// and the ignore policy. Every part is optional. Missing parts fall back to
/// the stock Forgejo layout, along with an ignore policy covering the secrets
/// Forgejo persists on its own.
///
/// ```toml
/// [paths]
/// config = "/etc/forgejo/forgejo.ini"
/// new_config = "/etc/forgejo/forgejo.new"
///
/// [reconcile]
/// backup = true
/// stale_keys = "retain"
///
/// [ignore]
/// security = ["INTERNAL_TOKEN"]
/// oauth2 = ["JWT_SECRET"]
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Locations of configuration files.
    #[serde(default)]
    pub paths: PathSettings,

    /// How reconciliation behaves.
    #[serde(default)]
    pub reconcile: ReconcileSettings,

    /// Keys excluded from comparison and overwrite.
    #[serde(default = "IgnorePolicy::forgejo_default")]
    pub ignore: IgnorePolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            paths: PathSettings::default(),
            reconcile: ReconcileSettings::default(),
            ignore: IgnorePolicy::forgejo_default(),
        }
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: Settings = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on path fields.
        settings.paths.config = expand_path(&settings.paths.config)?;
        settings.paths.new_config = expand_path(&settings.paths.new_config)?;

        Ok(settings)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Locations of the deployed and candidate configuration files.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathSettings {
    /// Deployed configuration, e.g., `forgejo.ini`.
    pub config: PathBuf,

    /// Freshly rendered candidate configuration, e.g., `forgejo.new`.
    pub new_config: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            config: PathBuf::from(DEFAULT_DEPLOYED_CONFIG),
            new_config: PathBuf::from(DEFAULT_CANDIDATE_CONFIG),
        }
    }
}

/// Reconcile behavior settings.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconcileSettings {
    /// Keep a timestamped copy of the deployed configuration before replacing.
    pub backup: bool,

    /// Treatment of keys the candidate no longer defines.
    pub stale_keys: StaleKeys,
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("FORGEJO_HOME", "/srv/forgejo")])]
    fn deserialize_settings() -> anyhow::Result<()> {
        let result: Settings = r#"
            [paths]
            config = "$FORGEJO_HOME/custom/conf/app.ini"
            new_config = "${FORGEJO_HOME}/custom/conf/app.new"

            [reconcile]
            backup = true
            stale_keys = "prune"

            [ignore]
            security = ["INTERNAL_TOKEN", "SECRET_KEY"]
            oauth2 = ["JWT_SECRET"]
        "#
        .parse()?;

        let expect = Settings {
            paths: PathSettings {
                config: "/srv/forgejo/custom/conf/app.ini".into(),
                new_config: "/srv/forgejo/custom/conf/app.new".into(),
            },
            reconcile: ReconcileSettings {
                backup: true,
                stale_keys: StaleKeys::Prune,
            },
            ignore: IgnorePolicy::forgejo_default().with("security", "SECRET_KEY"),
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn deserialize_empty_settings_uses_defaults() -> anyhow::Result<()> {
        let result: Settings = "".parse()?;
        assert_eq!(result, Settings::default());
        assert_eq!(result.paths.config, PathBuf::from(DEFAULT_DEPLOYED_CONFIG));
        assert_eq!(result.reconcile.stale_keys, StaleKeys::Retain);
        assert!(result.ignore.is_ignored("security", "INTERNAL_TOKEN"));

        Ok(())
    }

    #[test]
    fn deserialize_empty_ignore_table_ignores_nothing() -> anyhow::Result<()> {
        let result: Settings = "[ignore]\n".parse()?;
        assert!(result.ignore.is_empty());

        Ok(())
    }

    #[test]
    fn serialize_settings_parses_back() -> anyhow::Result<()> {
        let settings = Settings {
            paths: PathSettings {
                config: "/srv/forgejo/app.ini".into(),
                new_config: "/srv/forgejo/app.new".into(),
            },
            reconcile: ReconcileSettings {
                backup: true,
                stale_keys: StaleKeys::Prune,
            },
            ignore: IgnorePolicy::forgejo_default(),
        };

        let result: Settings = settings.to_string().parse()?;
        assert_eq!(result, settings);

        Ok(())
    }

    #[test]
    fn deserialize_settings_undefined_variable() {
        let result = r#"
            [paths]
            config = "$FORGEJO_UNDEFINED_VAR_FOR_TEST/app.ini"
        "#
        .parse::<Settings>();
        assert!(matches!(result, Err(ConfigError::ShellExpansion(_))));
    }
}
