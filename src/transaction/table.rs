//! Comma-delimited response bodies.
//!
//! Administrative queries answer with a grid: one header row naming the
//! columns followed by zero or more data rows. Cells follow the same quoting
//! rules as key/value bodies, so quoted commas and newlines belong to the cell.

use super::params::{split_unquoted, unescape_value};

/// A parsed tabular response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Parse a comma-delimited body. The first row becomes the header.
    #[must_use]
    pub fn parse(body: &[u8]) -> Self {
        let mut lines = split_unquoted(body, b'\n').into_iter().map(|line| {
            split_unquoted(line, b',')
                .into_iter()
                .map(|cell| unescape_value(cell.trim_ascii()))
                .collect::<Vec<_>>()
        });
        let headers = lines.next().unwrap_or_default();
        Self {
            headers,
            rows: lines.collect(),
        }
    }

    /// Column names from the header row.
    #[must_use]
    pub fn headers(&self) -> &[String] { &self.headers }

    /// Name of column `col`.
    #[must_use]
    pub fn header(&self, col: usize) -> Option<&str> { self.headers.get(col).map(String::as_str) }

    /// Number of columns in the header row.
    #[must_use]
    pub const fn columns(&self) -> usize { self.headers.len() }

    /// Number of data rows, excluding the header.
    #[must_use]
    pub const fn rows(&self) -> usize { self.rows.len() }

    /// Cells of data row `row`.
    #[must_use]
    pub fn row(&self, row: usize) -> Option<&[String]> { self.rows.get(row).map(Vec::as_slice) }

    /// Cell at column index `col` of data row `row`.
    #[must_use]
    pub fn cell_at(&self, col: usize, row: usize) -> Option<&str> {
        self.rows.get(row)?.get(col).map(String::as_str)
    }

    /// Cell under the column named `column` (matched case-insensitively).
    #[must_use]
    pub fn cell(&self, column: &str, row: usize) -> Option<&str> {
        let col = self
            .headers
            .iter()
            .position(|name| name.eq_ignore_ascii_case(column))?;
        self.cell_at(col, row)
    }
}
