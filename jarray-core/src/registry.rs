//! Snapshot cache for the scraped flag registry.
//!
//! Scraping `sbatch --help` on every submission makes the hot path depend
//! on text-scraping succeeding every run. Instead the scraped descriptors
//! are captured once into a JSON snapshot stamped with the scheduler
//! version, and later invocations reuse the snapshot after a soft version
//! check: a mismatch refreshes the snapshot, an unreadable live version
//! downgrades to a warning, and a failed scrape falls back to whatever
//! snapshot exists.

use std::{
    fs,
    io,
    path::{Path, PathBuf},
};

use chrono::Local;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    error::define_error_codes,
    introspect::{FlagDescriptor, parse_help_text},
    scheduler::{Scheduler, SchedulerError, SchedulerInfo},
};

/// Errors raised while capturing or persisting the registry snapshot.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The help text scraped into zero usable flag definitions.
    #[error("help text from `{command}` yielded no flag definitions")]
    NoFlags {
        /// The command whose output was scraped.
        command: String,
    },
    /// Reading or writing the snapshot file failed.
    #[error("cannot access registry snapshot `{}`: {source}", path.display())]
    Io {
        /// The snapshot file.
        path: PathBuf,
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },
    /// The snapshot file exists but does not deserialise.
    #[error("registry snapshot `{}` is not valid JSON: {source}", path.display())]
    Malformed {
        /// The snapshot file.
        path: PathBuf,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },
    /// The scheduler tool could not be scraped.
    #[error("scraping the submission tool failed: {source}")]
    Scheduler {
        /// Underlying scheduler invocation failure.
        #[from]
        source: SchedulerError,
    },
}

define_error_codes! {
    /// Stable codes describing [`RegistryError`] variants.
    enum RegistryErrorCode for RegistryError {
        /// The help text scraped into zero usable flag definitions.
        NoFlags => NoFlags { .. } => "REGISTRY_NO_FLAGS",
        /// Reading or writing the snapshot file failed.
        Io => Io { .. } => "REGISTRY_IO",
        /// The snapshot file exists but does not deserialise.
        Malformed => Malformed { .. } => "REGISTRY_MALFORMED",
        /// The scheduler tool could not be scraped.
        Scheduler => Scheduler { .. } => "REGISTRY_SCRAPE_FAILED",
    }
}

/// Scraped flag descriptors plus the provenance needed for soft checks.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RegistrySnapshot {
    /// Scheduler version the snapshot was captured against.
    pub scheduler_version: Option<String>,
    /// Capture date, informational only.
    pub captured_on: String,
    /// The scraped descriptors.
    pub descriptors: Vec<FlagDescriptor>,
}

impl RegistrySnapshot {
    /// Scrapes the live tool into a fresh snapshot.
    ///
    /// # Errors
    /// Returns [`RegistryError::Scheduler`] when the tool cannot be
    /// invoked and [`RegistryError::NoFlags`] when its output contains no
    /// recognisable flag definitions — both fatal, since every downstream
    /// classification depends on this data.
    pub fn capture(
        scheduler: &dyn Scheduler,
        live_version: Option<&str>,
    ) -> Result<Self, RegistryError> {
        let help = scheduler.help_text()?;
        let descriptors = parse_help_text(&help);
        if descriptors.is_empty() {
            return Err(RegistryError::NoFlags {
                command: "sbatch --help".to_owned(),
            });
        }
        debug!(flags = descriptors.len(), "captured flag registry");
        Ok(Self {
            scheduler_version: live_version.map(ToOwned::to_owned),
            captured_on: Local::now().format("%Y-%m-%d").to_string(),
            descriptors,
        })
    }

    /// Loads a snapshot from `path`, `None` when the file does not exist.
    ///
    /// # Errors
    /// Returns [`RegistryError::Io`] for unreadable files and
    /// [`RegistryError::Malformed`] for undecodable contents.
    pub fn load(path: &Path) -> Result<Option<Self>, RegistryError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(RegistryError::Io {
                    path: path.to_owned(),
                    source,
                });
            }
        };
        let snapshot = serde_json::from_str(&text).map_err(|source| RegistryError::Malformed {
            path: path.to_owned(),
            source,
        })?;
        Ok(Some(snapshot))
    }

    /// Persists the snapshot as JSON at `path`, creating parent
    /// directories as needed.
    ///
    /// # Errors
    /// Returns [`RegistryError::Io`] when the file cannot be written.
    pub fn store(&self, path: &Path) -> Result<(), RegistryError> {
        let io_err = |source| RegistryError::Io {
            path: path.to_owned(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let text = serde_json::to_string_pretty(self).map_err(|source| {
            RegistryError::Malformed {
                path: path.to_owned(),
                source,
            }
        })?;
        fs::write(path, text).map_err(io_err)
    }
}

/// Returns a usable snapshot, refreshing or falling back as needed.
///
/// The decision table, in order:
/// - no snapshot on disk → scrape and store (scrape failure is fatal);
/// - snapshot present, live version readable and equal → reuse;
/// - snapshot present, live version readable but different → warn,
///   re-scrape and store; if the re-scrape fails, reuse the stale
///   snapshot with a warning;
/// - snapshot present, live version unreadable → reuse with a warning.
///
/// Also returns whatever [`SchedulerInfo`] the soft check obtained, so
/// callers do not query the scheduler twice.
///
/// # Errors
/// Returns [`RegistryError`] only when no snapshot can be produced at
/// all: nothing on disk and the live scrape failed.
pub fn ensure_snapshot(
    scheduler: &dyn Scheduler,
    path: &Path,
) -> Result<(RegistrySnapshot, Option<SchedulerInfo>), RegistryError> {
    let live = match scheduler.info() {
        Ok(info) => Some(info),
        Err(err) => {
            debug!(error = %err, "scheduler configuration unavailable for version check");
            None
        }
    };
    let live_version = live.as_ref().and_then(|info| info.version.as_deref());

    let existing = RegistrySnapshot::load(path)?;
    let snapshot = match existing {
        None => {
            info!(path = %path.display(), "no registry snapshot, capturing one");
            let fresh = RegistrySnapshot::capture(scheduler, live_version)?;
            fresh.store(path)?;
            fresh
        }
        Some(snapshot) => match live_version {
            None => {
                warn!(
                    path = %path.display(),
                    "cannot read live scheduler version; reusing registry snapshot unchecked"
                );
                snapshot
            }
            Some(version) if snapshot.scheduler_version.as_deref() == Some(version) => snapshot,
            Some(version) => {
                warn!(
                    snapshot_version = snapshot.scheduler_version.as_deref().unwrap_or("unknown"),
                    live_version = version,
                    "scheduler version changed since the registry snapshot; refreshing"
                );
                match RegistrySnapshot::capture(scheduler, live_version) {
                    Ok(fresh) => {
                        fresh.store(path)?;
                        fresh
                    }
                    Err(err) => {
                        warn!(error = %err, "refresh failed; reusing stale registry snapshot");
                        snapshot
                    }
                }
            }
        },
    };
    Ok((snapshot, live))
}
