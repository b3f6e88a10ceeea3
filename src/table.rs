use crate::error::Result;
use anyhow::Context;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

pub const DEFAULT_CATEGORY: &str = "Uncategorized";
pub const DEFAULT_DESCRIPTION: &str = "Unknown";

/// Canonical column order of a clean export
pub const CANONICAL_COLUMNS: [&str; 5] = ["Date", "Amount", "Category", "Description", "Type"];

// ============================================================================
// TRANSACTION TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TransactionType {
    Income,
    Expense,
}

impl TransactionType {
    /// Positive amounts are income; zero and negative amounts are expenses.
    pub fn from_amount(amount: f64) -> Self {
        if amount > 0.0 {
            TransactionType::Income
        } else {
            TransactionType::Expense
        }
    }

    /// Parse a source label, case-insensitively
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "income" => Some(TransactionType::Income),
            "expense" => Some(TransactionType::Expense),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Income => "Income",
            TransactionType::Expense => "Expense",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// TRANSACTION
// ============================================================================

/// One normalized row. Field names on the wire are the canonical headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "Date")]
    pub date: NaiveDate,

    /// Signed; positive = inflow
    #[serde(rename = "Amount")]
    pub amount: f64,

    #[serde(rename = "Category")]
    pub category: String,

    #[serde(rename = "Description")]
    pub description: String,

    #[serde(rename = "Type")]
    pub transaction_type: TransactionType,
}

impl Transaction {
    pub fn new(date: NaiveDate, amount: f64) -> Self {
        Transaction {
            date,
            amount,
            category: DEFAULT_CATEGORY.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
            transaction_type: TransactionType::from_amount(amount),
        }
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_type(mut self, transaction_type: TransactionType) -> Self {
        self.transaction_type = transaction_type;
        self
    }

    pub fn is_expense(&self) -> bool {
        self.transaction_type == TransactionType::Expense
    }
}

// ============================================================================
// TRANSACTION TABLE
// ============================================================================

/// Normalized rows plus the source cells they came from.
///
/// `source_rows[i]` always belongs to `transactions[i]`; the anomaly export
/// needs the original columns next to the canonical ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionTable {
    transactions: Vec<Transaction>,
    source_headers: Vec<String>,
    source_rows: Vec<Vec<Option<String>>>,
}

impl TransactionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table without source columns (synthetic data, canonical reloads)
    pub fn from_transactions(transactions: Vec<Transaction>) -> Self {
        let source_rows = vec![Vec::new(); transactions.len()];
        TransactionTable {
            transactions,
            source_headers: Vec::new(),
            source_rows,
        }
    }

    pub(crate) fn with_source(
        transactions: Vec<Transaction>,
        source_headers: Vec<String>,
        source_rows: Vec<Vec<Option<String>>>,
    ) -> Self {
        debug_assert_eq!(transactions.len(), source_rows.len());
        TransactionTable {
            transactions,
            source_headers,
            source_rows,
        }
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn source_headers(&self) -> &[String] {
        &self.source_headers
    }

    pub fn source_row(&self, idx: usize) -> &[Option<String>] {
        self.source_rows.get(idx).map(|r| r.as_slice()).unwrap_or(&[])
    }

    pub fn amounts(&self) -> Vec<f64> {
        self.transactions.iter().map(|t| t.amount).collect()
    }

    /// Distinct categories, sorted
    pub fn categories(&self) -> Vec<String> {
        self.transactions
            .iter()
            .map(|t| t.category.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let min = self.transactions.iter().map(|t| t.date).min()?;
        let max = self.transactions.iter().map(|t| t.date).max()?;
        Some((min, max))
    }

    /// Keep the rows matching `filter`, together with their source cells
    pub fn filter(&self, filter: &TableFilter) -> TransactionTable {
        let (transactions, source_rows) = self
            .transactions
            .iter()
            .zip(self.source_rows.iter())
            .filter(|(t, _)| filter.matches(t))
            .map(|(t, r)| (t.clone(), r.clone()))
            .unzip();

        TransactionTable {
            transactions,
            source_headers: self.source_headers.clone(),
            source_rows,
        }
    }

    /// Write the canonical five-column CSV
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create CSV: {}", path.display()))?;
        // Header is written explicitly so an empty table still has one
        writer.write_record(CANONICAL_COLUMNS)?;
        for tx in &self.transactions {
            writer.write_record([
                tx.date.format("%Y-%m-%d").to_string(),
                tx.amount.to_string(),
                tx.category.clone(),
                tx.description.clone(),
                tx.transaction_type.as_str().to_string(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Read a CSV previously written by `write_csv`
    pub fn read_canonical(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open CSV: {}", path.display()))?;

        let mut transactions = Vec::new();
        for (line_num, result) in reader.deserialize().enumerate() {
            let tx: Transaction = result
                .with_context(|| format!("Failed to parse CSV line {}", line_num + 2))?;
            transactions.push(tx);
        }

        Ok(Self::from_transactions(transactions))
    }
}

// ============================================================================
// FILTERING
// ============================================================================

/// Date range (inclusive on both ends) and category set.
/// An empty category list means no category filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableFilter {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    #[serde(default)]
    pub categories: Vec<String>,
}

impl TableFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_start(mut self, start: NaiveDate) -> Self {
        self.start = Some(start);
        self
    }

    pub fn with_end(mut self, end: NaiveDate) -> Self {
        self.end = Some(end);
        self
    }

    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none() && self.categories.is_empty()
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        if let Some(start) = self.start {
            if tx.date < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if tx.date > end {
                return false;
            }
        }
        self.categories.is_empty() || self.categories.iter().any(|c| c == &tx.category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn sample() -> TransactionTable {
        TransactionTable::from_transactions(vec![
            Transaction::new(d(2024, 1, 5), -50.0)
                .with_category("Food")
                .with_description("McDonalds"),
            Transaction::new(d(2024, 1, 10), 1000.0)
                .with_category("Income")
                .with_description("Salary"),
            Transaction::new(d(2024, 2, 3), -60.0)
                .with_category("Transport")
                .with_description("Uber"),
        ])
    }

    #[test]
    fn test_type_from_amount() {
        assert_eq!(TransactionType::from_amount(10.0), TransactionType::Income);
        assert_eq!(TransactionType::from_amount(-10.0), TransactionType::Expense);
        assert_eq!(TransactionType::from_amount(0.0), TransactionType::Expense);
    }

    #[test]
    fn test_type_parse() {
        assert_eq!(TransactionType::parse(" INCOME "), Some(TransactionType::Income));
        assert_eq!(TransactionType::parse("expense"), Some(TransactionType::Expense));
        assert_eq!(TransactionType::parse("transfer"), None);
    }

    #[test]
    fn test_categories_sorted_distinct() {
        assert_eq!(sample().categories(), vec!["Food", "Income", "Transport"]);
    }

    #[test]
    fn test_filter_date_range_inclusive() {
        let filter = TableFilter::new().with_start(d(2024, 1, 10)).with_end(d(2024, 2, 3));
        let filtered = sample().filter(&filter);
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered.transactions()[0].description, "Salary");
    }

    #[test]
    fn test_filter_categories() {
        let filter = TableFilter::new().with_categories(vec!["Food".to_string()]);
        let filtered = sample().filter(&filter);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.transactions()[0].amount, -50.0);
    }

    #[test]
    fn test_empty_filter_keeps_everything() {
        let filter = TableFilter::new();
        assert!(filter.is_empty());
        assert_eq!(sample().filter(&filter), sample());
    }

    #[test]
    fn test_csv_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("clean.csv");

        let table = sample();
        table.write_csv(&path).unwrap();
        let reloaded = TransactionTable::read_canonical(&path).unwrap();

        assert_eq!(reloaded.transactions(), table.transactions());

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Date,Amount,Category,Description,Type\n"));
        assert!(text.contains("2024-01-05,-50,Food,McDonalds,Expense"));
    }

    #[test]
    fn test_empty_table_csv_has_header() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("empty.csv");

        TransactionTable::new().write_csv(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.trim(), "Date,Amount,Category,Description,Type");
    }
}
