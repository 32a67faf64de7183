//! Fetcher: turn a `DatasetKey` into a file in the staging directory.
//!
//! One `stage` call is a self-contained, sequential attempt loop:
//! 1. Resolve the source URL and cache entry from the key
//! 2. If the entry is already staged, return without touching the network
//! 3. Otherwise GET the URL up to `max_attempts` times
//!    - not-found status: stop, permanent failure
//!    - other error status, timeout, connect error, broken body: retry
//!    - success: stream into `.part`, rename into place
//!    - local write failure: clean up, stop, not retried
//!    - anything unrecognised: propagated as `StageError::Unclassified`
//!
//! The fetcher keeps no per-call state, so one instance can serve many
//! threads as long as they stage different keys.

use crate::backoff::Backoff;
use crate::key::DatasetKey;
use crate::source::{SourceEndpoint, SourceLocation};
use crate::staging::{CacheEntry, PersistError, StagingDir};
use crate::transport::{Transport, TransportError};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, info, warn};

/// Statuses treated as "resource does not exist" by default.
pub const DEFAULT_NOT_FOUND_STATUSES: [u16; 2] = [404, 410];

/// How a staged file came to be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Already in the staging directory. No request was made.
    Cached,
    /// Downloaded by this call.
    Downloaded { attempts: u32, bytes: u64 },
}

/// A failure that may succeed on a later attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransientFailure {
    #[error("timed out: {0}")]
    Timeout(String),

    #[error("connection error: {0}")]
    Connect(String),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("{0}")]
    Body(String),
}

/// Result of one `stage` call. Every variant except `Staged` is a failure
/// the caller is expected to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum FetchOutcome {
    Staged {
        entry: CacheEntry,
        provenance: Provenance,
    },
    /// Upstream has no such file. Retrying the same key will not help.
    NotFound { url: SourceLocation, attempt: u32 },
    /// Every attempt failed transiently. Worth retrying later.
    RetriesExhausted {
        attempts: u32,
        last_failure: TransientFailure,
    },
    /// Local filesystem fault. Any partial output has been removed.
    WriteFailed { path: PathBuf, reason: String },
}

impl FetchOutcome {
    pub fn is_staged(&self) -> bool {
        matches!(self, FetchOutcome::Staged { .. })
    }

    /// Short lowercase label for logs and reports.
    pub fn label(&self) -> &'static str {
        match self {
            FetchOutcome::Staged {
                provenance: Provenance::Cached,
                ..
            } => "cached",
            FetchOutcome::Staged { .. } => "staged",
            FetchOutcome::NotFound { .. } => "not_found",
            FetchOutcome::RetriesExhausted { .. } => "retries_exhausted",
            FetchOutcome::WriteFailed { .. } => "write_failed",
        }
    }
}

/// Failures that are not part of the outcome taxonomy.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,

    #[error("unclassified failure fetching {url}: {source}")]
    Unclassified {
        url: String,
        #[source]
        source: TransportError,
    },
}

/// Stages trip-record files from one endpoint into one directory.
pub struct Fetcher<T> {
    transport: T,
    endpoint: SourceEndpoint,
    staging: StagingDir,
    backoff: Backoff,
    not_found_statuses: Vec<u16>,
}

impl<T: Transport> Fetcher<T> {
    pub fn new(transport: T, endpoint: SourceEndpoint, staging: StagingDir) -> Self {
        Self {
            transport,
            endpoint,
            staging,
            backoff: Backoff::default(),
            not_found_statuses: DEFAULT_NOT_FOUND_STATUSES.to_vec(),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Replace the set of statuses that end the attempt loop as `NotFound`.
    pub fn with_not_found_statuses(mut self, statuses: impl Into<Vec<u16>>) -> Self {
        self.not_found_statuses = statuses.into();
        self
    }

    pub fn endpoint(&self) -> &SourceEndpoint {
        &self.endpoint
    }

    pub fn staging(&self) -> &StagingDir {
        &self.staging
    }

    pub fn location(&self, key: &DatasetKey) -> SourceLocation {
        self.endpoint.location(key)
    }

    pub fn entry(&self, key: &DatasetKey) -> CacheEntry {
        self.staging.entry(key)
    }

    /// Make sure the file for `key` is present, downloading it if needed.
    pub fn stage(&self, key: &DatasetKey, max_attempts: u32) -> Result<FetchOutcome, StageError> {
        self.run(key, max_attempts, false)
    }

    /// Download `key` even if it is already staged. The old file is replaced
    /// only by a complete new one.
    pub fn restage(&self, key: &DatasetKey, max_attempts: u32) -> Result<FetchOutcome, StageError> {
        self.run(key, max_attempts, true)
    }

    fn run(
        &self,
        key: &DatasetKey,
        max_attempts: u32,
        force: bool,
    ) -> Result<FetchOutcome, StageError> {
        if max_attempts == 0 {
            return Err(StageError::ZeroAttempts);
        }

        let entry = self.staging.entry(key);
        let result = if !force && entry.is_staged() {
            Ok(FetchOutcome::Staged {
                entry,
                provenance: Provenance::Cached,
            })
        } else {
            self.download(key, entry, max_attempts)
        };

        match &result {
            Ok(outcome) if outcome.is_staged() => {
                info!(%key, outcome = outcome.label(), "stage finished")
            }
            Ok(outcome) => warn!(%key, outcome = outcome.label(), "stage finished"),
            Err(e) => error!(%key, error = %e, "stage aborted"),
        }
        result
    }

    fn download(
        &self,
        key: &DatasetKey,
        entry: CacheEntry,
        max_attempts: u32,
    ) -> Result<FetchOutcome, StageError> {
        if let Err(e) = self.staging.ensure() {
            error!(%key, dir = %self.staging.root().display(), error = %e, "cannot create staging directory");
            return Ok(FetchOutcome::WriteFailed {
                path: self.staging.root().to_path_buf(),
                reason: format!("create staging directory: {e}"),
            });
        }

        let url = self.endpoint.location(key);
        let mut attempt = 1;
        loop {
            let delay = self.backoff.delay_before(attempt);
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }

            let failure = match self.transport.get(url.as_str()) {
                Ok(resp) if self.not_found_statuses.contains(&resp.status) => {
                    warn!(attempt, max_attempts, %url, status = resp.status, "not found upstream");
                    return Ok(FetchOutcome::NotFound { url, attempt });
                }
                Ok(resp) if !(200..300).contains(&resp.status) => {
                    TransientFailure::Status(resp.status)
                }
                Ok(mut resp) => match entry.write_atomically(&mut *resp.body, resp.content_length) {
                    Ok(bytes) => {
                        info!(attempt, max_attempts, %url, bytes, path = %entry.path().display(), "downloaded");
                        return Ok(FetchOutcome::Staged {
                            entry,
                            provenance: Provenance::Downloaded {
                                attempts: attempt,
                                bytes,
                            },
                        });
                    }
                    Err(PersistError::Write(e)) => {
                        error!(attempt, max_attempts, %url, path = %entry.path().display(), error = %e, "write failed");
                        return Ok(FetchOutcome::WriteFailed {
                            path: entry.path().to_path_buf(),
                            reason: e.to_string(),
                        });
                    }
                    Err(e) => TransientFailure::Body(e.to_string()),
                },
                Err(TransportError::Timeout(msg)) => TransientFailure::Timeout(msg),
                Err(TransportError::Connect(msg)) => TransientFailure::Connect(msg),
                Err(source) => {
                    error!(attempt, max_attempts, %url, error = %source, "unclassified failure");
                    return Err(StageError::Unclassified {
                        url: url.to_string(),
                        source,
                    });
                }
            };

            warn!(attempt, max_attempts, %url, failure = %failure, "attempt failed");
            if attempt >= max_attempts {
                return Ok(FetchOutcome::RetriesExhausted {
                    attempts: attempt,
                    last_failure: failure,
                });
            }
            attempt += 1;
        }
    }
}
