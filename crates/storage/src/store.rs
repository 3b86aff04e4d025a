// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only directory of per-job files.
//!
//! Each active job owns one file, `job-<id>.json`, holding the full record
//! as pretty-printed JSON with sorted keys. A file present at startup means
//! the job never completed and must be restarted; absence means it is done.

use mqsf_core::{json_format, JobRecord};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed creating job directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed persisting job file {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed encoding job record {id}: {source}")]
    Encode {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed removing job file {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed listing job directory {path}: {source}")]
    List {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Filesystem store for the jobs a stage is currently responsible for.
#[derive(Debug, Clone)]
pub struct JobStore {
    dir: PathBuf,
}

impl JobStore {
    /// Open the store, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|source| StoreError::CreateDir { path: dir.clone(), source })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing a given job id.
    pub fn job_file(&self, id: &str) -> PathBuf {
        self.dir.join(format!("job-{id}.json"))
    }

    /// Write the record to its job file, replacing any previous contents.
    pub fn persist(&self, record: &JobRecord) -> Result<(), StoreError> {
        let contents = json_format::to_pretty_sorted(record)
            .map_err(|source| StoreError::Encode { id: record.id.clone(), source })?;
        let path = self.job_file(&record.id);
        std::fs::write(&path, contents).map_err(|source| StoreError::Persist { path, source })
    }

    /// Remove the job file. Missing files are not an error.
    pub fn remove(&self, id: &str) -> Result<(), StoreError> {
        let path = self.job_file(id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Remove { path, source }),
        }
    }

    /// Whether a job file exists for the given id.
    pub fn contains(&self, id: &str) -> bool {
        self.job_file(id).exists()
    }

    /// Read every record present in the directory, exactly once each.
    ///
    /// Unreadable or unparseable files are logged and skipped; after a
    /// crash every job whose file survived must be restarted, and one bad
    /// file must not block the rest.
    pub fn enumerate(&self) -> Result<Vec<JobRecord>, StoreError> {
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|source| StoreError::List { path: self.dir.clone(), source })?;

        let mut records = Vec::new();
        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(error) => {
                    warn!("skipping unreadable job directory entry: {error}");
                    continue;
                }
            };
            let contents = match std::fs::read(&path) {
                Ok(contents) => contents,
                Err(error) => {
                    warn!(path = %path.display(), "skipping unreadable job file: {error}");
                    continue;
                }
            };
            match serde_json::from_slice::<JobRecord>(&contents) {
                Ok(record) => records.push(record),
                Err(error) => {
                    warn!(path = %path.display(), "skipping malformed job file: {error}");
                }
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
