// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Reconcile forge INI configuration files.
//!
//! Forgeini keeps a deployed Forgejo configuration in line with a freshly
//! rendered candidate without disturbing the secrets Forgejo writes back into
//! its own configuration file. It only reports a change, and only rewrites the
//! deployed file, when something meaningful differs. Key order, blank lines,
//! comments, and ignored keys never count.
//!
//! # Overview
//!
//! - [`ini`] models and parses INI documents.
//! - [`ini::canon`] renders canonical text, fingerprints, and equality.
//! - [`policy`] lists keys excluded from comparison and overwrite.
//! - [`merge`] folds a candidate into a base document.
//! - [`reconcile`] runs the full compare, back up, and replace flow.

pub mod config;
pub mod ini;
pub mod merge;
pub mod path;
pub mod policy;
pub mod reconcile;

pub use crate::{
    ini::{
        canon::{equal, fingerprint, Fingerprint},
        Document, Section, DEFAULT_SECTION,
    },
    merge::{merge, merge_files, MergeReport, StaleKeys},
    policy::IgnorePolicy,
    reconcile::{Outcome, Reconciler, Report},
};
