// 📂 Raw Dataset - tabular input with unknown column naming
//
// Whatever the bank export looks like, it lands here first as ordered
// columns of optional string cells. Nothing is interpreted yet.

use crate::error::{AnalyticsError, Result};
use anyhow::Context;
use csv::ReaderBuilder;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// RawDataset - column names plus rows of optional cells (empty cell = null)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDataset {
    headers: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl RawDataset {
    /// Read a CSV file from disk
    pub fn from_path(path: &Path) -> Result<Self> {
        let mut file = File::open(path)
            .with_context(|| format!("Failed to open file: {}", path.display()))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        Self::from_bytes(&bytes)
    }

    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }

    /// Parse CSV bytes. Non-UTF-8 input is decoded as Latin-1 so that
    /// exports from older banking portals still load.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let text = match std::str::from_utf8(bytes) {
            Ok(text) => text.to_string(),
            Err(_) => bytes.iter().map(|&b| b as char).collect(),
        };

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for (line_num, result) in reader.records().enumerate() {
            let record = result.map_err(|source| AnalyticsError::MalformedCsv {
                line: line_num + 2,
                source,
            })?;

            // Ragged rows: pad short ones, drop overflow cells
            let row = (0..headers.len())
                .map(|i| record.get(i).and_then(normalize_cell))
                .collect();
            rows.push(row);
        }

        Ok(RawDataset { headers, rows })
    }

    /// Build from an in-memory column map (column order is preserved).
    /// Shorter columns are padded with nulls.
    pub fn from_columns(columns: Vec<(String, Vec<Option<String>>)>) -> Self {
        let row_count = columns.iter().map(|(_, c)| c.len()).max().unwrap_or(0);
        let headers = columns.iter().map(|(name, _)| name.clone()).collect();

        let rows = (0..row_count)
            .map(|r| {
                columns
                    .iter()
                    .map(|(_, values)| values.get(r).cloned().flatten())
                    .collect()
            })
            .collect();

        RawDataset { headers, rows }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    /// Cell at (row, column index); None for null or out of range
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .and_then(|c| c.as_deref())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// All values of a named column
    pub fn column(&self, name: &str) -> Option<Vec<Option<&str>>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r[idx].as_deref()).collect())
    }
}

fn normalize_cell(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
