//! TaxiStage Core: stage monthly NYC TLC trip-record files into a local directory.
//!
//! This crate contains:
//! - Dataset keys (year, month, category) and the file naming template
//! - Source endpoint and staging directory layout
//! - The retrying fetcher with its outcome taxonomy
//! - Batch staging over many keys
//! - TOML configuration
//! - Parquet inspection of staged files

pub mod backoff;
pub mod batch;
pub mod config;
pub mod fetcher;
pub mod inspect;
pub mod key;
pub mod source;
pub mod staging;
pub mod transport;

pub use backoff::Backoff;
pub use batch::{stage_batch, BatchSummary, SilentProgress, StageProgress, StdoutProgress};
pub use config::{ConfigError, StagerConfig};
pub use fetcher::{FetchOutcome, Fetcher, Provenance, StageError, TransientFailure};
pub use inspect::{summarize, InspectError, ParquetSummary};
pub use key::{DatasetKey, KeyError, KeyRange, Period, TripCategory};
pub use source::{SourceEndpoint, SourceLocation, DEFAULT_BASE_URL};
pub use staging::{CacheEntry, StagedFile, StagingDir};
pub use transport::{HttpTransport, Response, Timeouts, Transport, TransportError};
