//! Staging directory and cache entries.
//!
//! Layout: `{staging_dir}/{category}_tripdata_{year}-{month:02}.parquet`
//!
//! - An entry counts as staged when a non-empty regular file sits at its path
//! - Writes go to `{file}.part` and are renamed into place
//! - Any failure removes the `.part` file. A local write failure also removes
//!   whatever sits at the entry path

use crate::key::DatasetKey;
use chrono::{DateTime, Local};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

const PART_EXTENSION: &str = "parquet.part";

/// Root of the local cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingDir {
    root: PathBuf,
}

impl StagingDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory (and parents) if absent. No-op when it exists.
    pub fn ensure(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root)
    }

    pub fn entry(&self, key: &DatasetKey) -> CacheEntry {
        CacheEntry {
            key: *key,
            path: self.root.join(key.file_name()),
        }
    }

    /// Files in the staging directory that look like staged data or leftovers.
    ///
    /// A missing directory lists as empty. Unrelated files are skipped.
    pub fn list(&self) -> io::Result<Vec<StagedFile>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let (key, partial) = match name.strip_suffix(".part") {
                Some(stem) => (DatasetKey::from_file_name(stem), true),
                None => (DatasetKey::from_file_name(&name), false),
            };
            let Some(key) = key else { continue };

            files.push(StagedFile {
                key,
                path: entry.path(),
                size: meta.len(),
                modified: meta.modified().ok().map(DateTime::<Local>::from),
                partial,
            });
        }

        files.sort_by(|a, b| a.key.cmp(&b.key).then(a.partial.cmp(&b.partial)));
        Ok(files)
    }
}

/// Local path for one `DatasetKey`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    key: DatasetKey,
    path: PathBuf,
}

impl CacheEntry {
    pub fn key(&self) -> &DatasetKey {
        &self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Temporary sibling the body is streamed into before the rename.
    pub fn part_path(&self) -> PathBuf {
        self.path.with_extension(PART_EXTENSION)
    }

    /// True when a non-empty regular file exists at the entry path.
    pub fn is_staged(&self) -> bool {
        fs::metadata(&self.path)
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }

    /// Remove the entry and its `.part` sibling. Missing files are not an error.
    pub fn remove(&self) -> io::Result<()> {
        remove_file_if_present(&self.part_path())?;
        remove_file_if_present(&self.path)
    }

    /// Stream `body` into the entry via the `.part` file and an atomic rename.
    ///
    /// When `expected_len` is known, a shorter or longer body is reported as
    /// [`PersistError::Truncated`]. An empty body is reported as
    /// [`PersistError::Empty`] since it would not count as staged.
    pub fn write_atomically(
        &self,
        body: &mut dyn Read,
        expected_len: Option<u64>,
    ) -> Result<u64, PersistError> {
        let part = self.part_path();
        let result = self.write_part(&part, body, expected_len).and_then(|bytes| {
            fs::rename(&part, &self.path).map_err(PersistError::Write)?;
            Ok(bytes)
        });

        if result.is_err() {
            let _ = remove_file_if_present(&part);
            if matches!(result, Err(PersistError::Write(_))) {
                let _ = remove_file_if_present(&self.path);
            }
        }
        result
    }

    fn write_part(
        &self,
        part: &Path,
        body: &mut dyn Read,
        expected_len: Option<u64>,
    ) -> Result<u64, PersistError> {
        let mut file = fs::File::create(part).map_err(PersistError::Write)?;
        let bytes = copy_classified(body, &mut file)?;
        file.sync_all().map_err(PersistError::Write)?;
        drop(file);

        if bytes == 0 {
            return Err(PersistError::Empty);
        }
        if let Some(expected) = expected_len {
            if expected != bytes {
                return Err(PersistError::Truncated {
                    expected,
                    received: bytes,
                });
            }
        }
        Ok(bytes)
    }
}

/// Failure while persisting a response body.
///
/// `Read`, `Truncated` and `Empty` come from the remote side. `Write` is a
/// local filesystem fault.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("body interrupted: {0}")]
    Read(#[source] io::Error),

    #[error("body truncated: expected {expected} bytes, received {received}")]
    Truncated { expected: u64, received: u64 },

    #[error("empty response body")]
    Empty,

    #[error("{0}")]
    Write(#[source] io::Error),
}

/// `io::copy` that keeps read-side and write-side failures apart.
fn copy_classified(reader: &mut dyn Read, writer: &mut dyn Write) -> Result<u64, PersistError> {
    let mut buf = vec![0u8; 64 * 1024];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(PersistError::Read(e)),
        };
        writer.write_all(&buf[..n]).map_err(PersistError::Write)?;
        total += n as u64;
    }
    writer.flush().map_err(PersistError::Write)?;
    Ok(total)
}

fn remove_file_if_present(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_file() => fs::remove_file(path),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// One file found by [`StagingDir::list`].
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub key: DatasetKey,
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<DateTime<Local>>,
    /// Leftover `.part` file from an interrupted write.
    pub partial: bool,
}
