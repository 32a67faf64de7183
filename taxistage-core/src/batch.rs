//! Batch staging: run independent `stage` calls over many keys.
//!
//! Keys are deduplicated first so that no two concurrent calls ever target
//! the same cache entry. With `jobs > 1` calls fan out on a rayon pool; the
//! fetcher itself stays single-threaded per call.

use crate::fetcher::{FetchOutcome, Fetcher, Provenance, StageError};
use crate::key::DatasetKey;
use crate::transport::Transport;
use rayon::prelude::*;
use std::collections::HashSet;

/// Progress callback for multi-key staging.
pub trait StageProgress: Sync {
    /// Called before a key is staged.
    fn on_start(&self, key: &DatasetKey, index: usize, total: usize);

    /// Called when a key finishes, whatever the outcome.
    fn on_complete(
        &self,
        key: &DatasetKey,
        index: usize,
        total: usize,
        result: &Result<FetchOutcome, StageError>,
    );

    /// Called once after every key has finished.
    fn on_batch_complete(&self, summary: &BatchSummary);
}

/// Prints one line per key to stdout.
pub struct StdoutProgress;

impl StageProgress for StdoutProgress {
    fn on_start(&self, key: &DatasetKey, index: usize, total: usize) {
        println!("[{}/{}] Staging {key}...", index + 1, total);
    }

    fn on_complete(
        &self,
        key: &DatasetKey,
        _index: usize,
        _total: usize,
        result: &Result<FetchOutcome, StageError>,
    ) {
        match result {
            Ok(FetchOutcome::Staged { entry, .. }) => {
                println!("  OK: {key} -> {}", entry.path().display())
            }
            Ok(FetchOutcome::NotFound { url, .. }) => println!("  NOT FOUND: {key} ({url})"),
            Ok(FetchOutcome::RetriesExhausted {
                attempts,
                last_failure,
            }) => println!("  FAIL: {key}: gave up after {attempts} attempts ({last_failure})"),
            Ok(FetchOutcome::WriteFailed { path, reason }) => {
                println!("  WRITE ERROR: {key}: {}: {reason}", path.display())
            }
            Err(e) => println!("  ERROR: {key}: {e}"),
        }
    }

    fn on_batch_complete(&self, summary: &BatchSummary) {
        println!(
            "\nStaging complete: {}/{} present ({} downloaded, {} cached), {} not found, {} exhausted, {} write errors, {} unclassified, {} rejected",
            summary.staged + summary.cached,
            summary.total(),
            summary.staged,
            summary.cached,
            summary.not_found,
            summary.exhausted,
            summary.write_failed,
            summary.unclassified,
            summary.rejected,
        );
    }
}

/// Reports nothing.
pub struct SilentProgress;

impl StageProgress for SilentProgress {
    fn on_start(&self, _key: &DatasetKey, _index: usize, _total: usize) {}
    fn on_complete(
        &self,
        _key: &DatasetKey,
        _index: usize,
        _total: usize,
        _result: &Result<FetchOutcome, StageError>,
    ) {
    }
    fn on_batch_complete(&self, _summary: &BatchSummary) {}
}

/// Per-key results in input order, plus counts.
#[derive(Debug)]
pub struct BatchSummary {
    pub results: Vec<(DatasetKey, Result<FetchOutcome, StageError>)>,
    pub staged: usize,
    pub cached: usize,
    pub not_found: usize,
    pub exhausted: usize,
    pub write_failed: usize,
    pub unclassified: usize,
    /// Calls refused before any I/O, e.g. a zero attempt budget.
    pub rejected: usize,
}

impl BatchSummary {
    fn from_results(results: Vec<(DatasetKey, Result<FetchOutcome, StageError>)>) -> Self {
        let mut summary = Self {
            results: Vec::new(),
            staged: 0,
            cached: 0,
            not_found: 0,
            exhausted: 0,
            write_failed: 0,
            unclassified: 0,
            rejected: 0,
        };
        for (_, result) in &results {
            match result {
                Ok(FetchOutcome::Staged {
                    provenance: Provenance::Cached,
                    ..
                }) => summary.cached += 1,
                Ok(FetchOutcome::Staged {
                    provenance: Provenance::Downloaded { .. },
                    ..
                }) => summary.staged += 1,
                Ok(FetchOutcome::NotFound { .. }) => summary.not_found += 1,
                Ok(FetchOutcome::RetriesExhausted { .. }) => summary.exhausted += 1,
                Ok(FetchOutcome::WriteFailed { .. }) => summary.write_failed += 1,
                Err(StageError::Unclassified { .. }) => summary.unclassified += 1,
                Err(StageError::ZeroAttempts) => summary.rejected += 1,
            }
        }
        summary.results = results;
        summary
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn all_staged(&self) -> bool {
        self.staged + self.cached == self.total()
    }

    /// True when every failure was a permanent not-found.
    pub fn only_missing(&self) -> bool {
        !self.all_staged() && self.staged + self.cached + self.not_found == self.total()
    }
}

/// Stage every key, `jobs` at a time. Duplicate keys are staged once.
pub fn stage_batch<T: Transport>(
    fetcher: &Fetcher<T>,
    keys: &[DatasetKey],
    max_attempts: u32,
    jobs: usize,
    force: bool,
    progress: &dyn StageProgress,
) -> BatchSummary {
    let mut seen = HashSet::new();
    let keys: Vec<DatasetKey> = keys.iter().copied().filter(|k| seen.insert(*k)).collect();
    let total = keys.len();

    let stage_one = |(i, key): (usize, &DatasetKey)| {
        progress.on_start(key, i, total);
        let result = if force {
            fetcher.restage(key, max_attempts)
        } else {
            fetcher.stage(key, max_attempts)
        };
        progress.on_complete(key, i, total, &result);
        (*key, result)
    };

    let results: Vec<_> = if jobs <= 1 {
        keys.iter().enumerate().map(stage_one).collect()
    } else {
        match rayon::ThreadPoolBuilder::new().num_threads(jobs).build() {
            Ok(pool) => pool.install(|| keys.par_iter().enumerate().map(stage_one).collect()),
            Err(e) => {
                tracing::warn!(error = %e, "cannot build worker pool, staging sequentially");
                keys.iter().enumerate().map(stage_one).collect()
            }
        }
    };

    let summary = BatchSummary::from_results(results);
    progress.on_batch_complete(&summary);
    summary
}
