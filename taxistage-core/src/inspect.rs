//! Quick look at a staged Parquet file: row count, schema and first rows.

use polars::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InspectError {
    #[error("open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("read parquet {}: {message}", .path.display())]
    Parquet { path: PathBuf, message: String },
}

/// Name and Polars dtype of one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub dtype: String,
}

#[derive(Debug, Clone)]
pub struct ParquetSummary {
    pub path: PathBuf,
    pub rows: usize,
    pub columns: Vec<ColumnInfo>,
    pub head: DataFrame,
}

impl ParquetSummary {
    /// First rows rendered cell by cell, for JSON output.
    pub fn head_rows(&self) -> Vec<Vec<String>> {
        let columns = self.head.get_columns();
        (0..self.head.height())
            .map(|i| {
                columns
                    .iter()
                    .map(|c| c.get(i).map(|v| v.to_string()).unwrap_or_default())
                    .collect()
            })
            .collect()
    }
}

/// Read `path` and keep its first `rows` rows.
pub fn summarize(path: &Path, rows: usize) -> Result<ParquetSummary, InspectError> {
    let file = fs::File::open(path).map_err(|source| InspectError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| InspectError::Parquet {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let columns = df
        .get_columns()
        .iter()
        .map(|c| ColumnInfo {
            name: c.name().to_string(),
            dtype: c.dtype().to_string(),
        })
        .collect();

    Ok(ParquetSummary {
        path: path.to_path_buf(),
        rows: df.height(),
        columns,
        head: df.head(Some(rows)),
    })
}
