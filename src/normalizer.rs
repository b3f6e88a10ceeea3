// 🧹 Dataset Normalizer - raw export -> canonical transaction table
//
// Steps per row: parse date, parse amount (or credit - debit), drop the
// row if either is missing, clip the amount, backfill category and
// description, take the source type label or derive it from the sign.

use crate::columns::{discover_columns, AmountIndices, ColumnMapping, Discovery};
use crate::dataset::RawDataset;
use crate::error::{AnalyticsError, Result};
use crate::table::{
    Transaction, TransactionTable, TransactionType, DEFAULT_CATEGORY, DEFAULT_DESCRIPTION,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Amounts are clipped to [-AMOUNT_LIMIT, AMOUNT_LIMIT]
pub const AMOUNT_LIMIT: f64 = 1_000_000.0;

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Warning, // Rows were lost or a column is unusable
    Info,    // Data was adjusted but nothing was lost
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataWarning {
    pub severity: Severity,
    pub field: String,
    pub message: String,
}

impl DataWarning {
    fn warning(field: &str, message: String) -> Self {
        DataWarning {
            severity: Severity::Warning,
            field: field.to_string(),
            message,
        }
    }

    fn info(field: &str, message: String) -> Self {
        DataWarning {
            severity: Severity::Info,
            field: field.to_string(),
            message,
        }
    }
}

/// What happened during normalization. Advisory only, never blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationReport {
    pub rows_in: usize,
    pub rows_out: usize,
    pub dropped_bad_date: usize,
    pub dropped_bad_amount: usize,
    pub clipped: usize,
    pub mapping: ColumnMapping,
    pub warnings: Vec<DataWarning>,
}

impl NormalizationReport {
    pub fn rows_dropped(&self) -> usize {
        self.rows_in - self.rows_out
    }

    pub fn has_warnings(&self) -> bool {
        self.warnings.iter().any(|w| w.severity == Severity::Warning)
    }

    pub fn summary(&self) -> String {
        format!(
            "Rows: {} in, {} out ({} bad date, {} bad amount), {} clipped, {} warning(s)",
            self.rows_in,
            self.rows_out,
            self.dropped_bad_date,
            self.dropped_bad_amount,
            self.clipped,
            self.warnings.len()
        )
    }
}

/// Canonical table plus the report that produced it
#[derive(Debug, Clone)]
pub struct NormalizedDataset {
    pub table: TransactionTable,
    pub report: NormalizationReport,
}

// ============================================================================
// NORMALIZER
// ============================================================================

#[derive(Debug, Clone)]
pub struct DatasetNormalizer {
    amount_limit: f64,
}

impl Default for DatasetNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetNormalizer {
    pub fn new() -> Self {
        DatasetNormalizer {
            amount_limit: AMOUNT_LIMIT,
        }
    }

    /// Normalize a raw dataset.
    ///
    /// Fails only when no date column or no amount source can be found.
    /// Zero surviving rows is not an error: the table is simply empty.
    pub fn normalize(&self, raw: &RawDataset) -> Result<NormalizedDataset> {
        let mapping = match discover_columns(raw.headers()) {
            Discovery::Mapped(mapping) => mapping,
            Discovery::MissingDate => return Err(AnalyticsError::NoDateColumnFound),
            Discovery::MissingAmount => return Err(AnalyticsError::NoAmountColumnFound),
        };
        let idx = mapping.indices.clone();

        let mut transactions = Vec::with_capacity(raw.row_count());
        let mut source_rows = Vec::with_capacity(raw.row_count());
        let mut dropped_bad_date = 0;
        let mut dropped_bad_amount = 0;
        let mut clipped = 0;
        let mut unknown_type_labels = 0;

        for (row_idx, row) in raw.rows().iter().enumerate() {
            let Some(date) = raw.cell(row_idx, idx.date).and_then(parse_date) else {
                dropped_bad_date += 1;
                continue;
            };

            let amount = match &idx.amount {
                AmountIndices::Direct(col) => raw.cell(row_idx, *col).and_then(parse_amount),
                AmountIndices::DebitCredit { debit, credit } => {
                    let debit = raw.cell(row_idx, *debit).and_then(parse_amount);
                    let credit = raw.cell(row_idx, *credit).and_then(parse_amount);
                    if debit.is_none() && credit.is_none() {
                        None
                    } else {
                        Some(credit.unwrap_or(0.0) - debit.unwrap_or(0.0))
                    }
                }
            };
            let Some(amount) = amount else {
                dropped_bad_amount += 1;
                continue;
            };

            let bounded = amount.clamp(-self.amount_limit, self.amount_limit);
            if bounded != amount {
                clipped += 1;
            }

            let category = idx
                .category
                .and_then(|c| raw.cell(row_idx, c))
                .unwrap_or(DEFAULT_CATEGORY);
            let description = idx
                .description
                .and_then(|c| raw.cell(row_idx, c))
                .unwrap_or(DEFAULT_DESCRIPTION);

            let source_type = idx.transaction_type.and_then(|c| raw.cell(row_idx, c));
            let transaction_type = match source_type.map(TransactionType::parse) {
                Some(Some(t)) => t,
                Some(None) => {
                    unknown_type_labels += 1;
                    TransactionType::from_amount(bounded)
                }
                None => TransactionType::from_amount(bounded),
            };

            transactions.push(
                Transaction::new(date, bounded)
                    .with_category(category)
                    .with_description(description)
                    .with_type(transaction_type),
            );
            source_rows.push(row.clone());
        }

        let rows_in = raw.row_count();
        let rows_out = transactions.len();

        let mut warnings = Vec::new();
        if rows_in > 0 && dropped_bad_date == rows_in {
            warnings.push(DataWarning::warning(
                &mapping.date,
                "no valid dates found, every row was dropped".to_string(),
            ));
        } else if dropped_bad_date > 0 {
            warnings.push(DataWarning::warning(
                &mapping.date,
                format!("{} row(s) with unparseable dates dropped", dropped_bad_date),
            ));
        }
        if rows_in > dropped_bad_date && dropped_bad_amount == rows_in - dropped_bad_date {
            warnings.push(DataWarning::warning(
                "amount",
                "all amounts unparseable, every dated row was dropped".to_string(),
            ));
        } else if dropped_bad_amount > 0 {
            warnings.push(DataWarning::warning(
                "amount",
                format!("{} row(s) with unparseable amounts dropped", dropped_bad_amount),
            ));
        }
        if clipped > 0 {
            warnings.push(DataWarning::info(
                "amount",
                format!("{} amount(s) clipped to ±{}", clipped, self.amount_limit),
            ));
        }
        if mapping.category.is_none() {
            warnings.push(DataWarning::info(
                "category",
                format!("no category column, defaulted to '{}'", DEFAULT_CATEGORY),
            ));
        }
        if mapping.description.is_none() {
            warnings.push(DataWarning::info(
                "description",
                format!("no description column, defaulted to '{}'", DEFAULT_DESCRIPTION),
            ));
        }
        if unknown_type_labels > 0 {
            warnings.push(DataWarning::info(
                "type",
                format!("{} unrecognized type label(s), derived from sign", unknown_type_labels),
            ));
        }

        for w in warnings.iter().filter(|w| w.severity == Severity::Warning) {
            warn!(field = %w.field, "{}", w.message);
        }
        info!(rows_in, rows_out, columns = %mapping.summary(), "normalized dataset");

        let report = NormalizationReport {
            rows_in,
            rows_out,
            dropped_bad_date,
            dropped_bad_amount,
            clipped,
            mapping,
            warnings,
        };
        let table =
            TransactionTable::with_source(transactions, raw.headers().to_vec(), source_rows);

        Ok(NormalizedDataset { table, report })
    }
}

// ============================================================================
// DATE PARSING
// ============================================================================

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const TEXT_DATE_FORMATS: &[&str] = &[
    "%d %b %Y",
    "%d %B %Y",
    "%d-%b-%Y",
    "%d-%b-%y",
    "%b %d %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%B %d, %Y",
    "%a, %d %b %Y",
];

/// Parse a date leniently.
///
/// Ambiguous numeric dates are read day-first (05/01/2024 is 5 January);
/// month-first is used only when day-first is impossible (01/25/2024).
/// Offsets are dropped and the local wall-clock date is kept.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local().date());
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.naive_local().date());
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    if let Some(date) = parse_numeric_date(s) {
        return Some(date);
    }
    for fmt in TEXT_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }

    // "05/01/2024 13:45" and friends: retry on the date part alone
    let prefix = s.split([' ', 'T']).next().unwrap_or(s);
    if prefix.len() < s.len() {
        return parse_numeric_date(prefix);
    }
    None
}

/// Three digit groups separated by '/', '-' or '.', or a compact YYYYMMDD
fn parse_numeric_date(s: &str) -> Option<NaiveDate> {
    if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDate::parse_from_str(s, "%Y%m%d").ok();
    }

    let parts: Vec<&str> = s.split(['/', '-', '.']).collect();
    if parts.len() != 3
        || parts
            .iter()
            .any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }

    let nums: Vec<u32> = parts.iter().filter_map(|p| p.parse().ok()).collect();
    if nums.len() != 3 {
        return None;
    }

    if parts[0].len() == 4 {
        return NaiveDate::from_ymd_opt(nums[0] as i32, nums[1], nums[2]);
    }

    let year = match parts[2].len() {
        2 if nums[2] < 70 => 2000 + nums[2] as i32,
        2 => 1900 + nums[2] as i32,
        4 => nums[2] as i32,
        _ => return None,
    };

    NaiveDate::from_ymd_opt(year, nums[1], nums[0])
        .or_else(|| NaiveDate::from_ymd_opt(year, nums[0], nums[1]))
}

// ============================================================================
// AMOUNT PARSING
// ============================================================================

/// Parse a numeric amount. Accepts currency symbols, thousands separators
/// and accounting negatives like "(1,234.50)". Non-finite values are rejected.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let mut s = raw.trim();
    let mut negative = false;
    if s.starts_with('(') && s.ends_with(')') && s.len() > 2 {
        negative = true;
        s = &s[1..s.len() - 1];
    }

    let cleaned: String = s
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | '¥' | ',' | ' ' | '\u{a0}'))
        .map(|c| if c == '\u{2212}' { '-' } else { c })
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if negative { -value.abs() } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::AmountSource;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn raw(csv: &str) -> RawDataset {
        RawDataset::from_bytes(csv.as_bytes()).unwrap()
    }

    #[test]
    fn test_parse_date_iso_and_datetime() {
        assert_eq!(parse_date("2024-01-05"), Some(d(2024, 1, 5)));
        assert_eq!(parse_date("2024-01-05 13:45:00"), Some(d(2024, 1, 5)));
        assert_eq!(parse_date("2024-01-05T13:45:00"), Some(d(2024, 1, 5)));
        assert_eq!(parse_date("20240105"), Some(d(2024, 1, 5)));
    }

    #[test]
    fn test_parse_date_day_first() {
        assert_eq!(parse_date("05/01/2024"), Some(d(2024, 1, 5)));
        assert_eq!(parse_date("05-01-2024"), Some(d(2024, 1, 5)));
        assert_eq!(parse_date("05.01.24"), Some(d(2024, 1, 5)));
    }

    #[test]
    fn test_parse_date_month_first_when_day_first_impossible() {
        assert_eq!(parse_date("01/25/2024"), Some(d(2024, 1, 25)));
    }

    #[test]
    fn test_parse_date_timezone_keeps_local_date() {
        assert_eq!(parse_date("2024-01-05T23:30:00-05:00"), Some(d(2024, 1, 5)));
        assert_eq!(parse_date("2024-01-05T00:30:00+09:00"), Some(d(2024, 1, 5)));
        assert_eq!(parse_date("2024-01-05 23:30:00+0100"), Some(d(2024, 1, 5)));
    }

    #[test]
    fn test_parse_date_text_and_prefix() {
        assert_eq!(parse_date("5 Jan 2024"), Some(d(2024, 1, 5)));
        assert_eq!(parse_date("Jan 5, 2024"), Some(d(2024, 1, 5)));
        assert_eq!(parse_date("05/01/2024 13:45"), Some(d(2024, 1, 5)));
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        assert_eq!(parse_date("not a date"), None);
        assert_eq!(parse_date("31/31/2024"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("-50"), Some(-50.0));
        assert_eq!(parse_amount("$1,234.50"), Some(1234.5));
        assert_eq!(parse_amount("(12.00)"), Some(-12.0));
        assert_eq!(parse_amount("€ 3"), Some(3.0));
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount("NaN"), None);
        assert_eq!(parse_amount("inf"), None);
    }

    #[test]
    fn test_scenario_types() {
        let data = raw(
            "Date,Amount,Category,Description\n\
             2024-01-05,-50,Food,McDonalds\n\
             2024-01-10,1000,Income,Salary\n\
             2024-02-05,-60,Food,KFC\n",
        );
        let out = DatasetNormalizer::new().normalize(&data).unwrap();
        let types: Vec<TransactionType> = out
            .table
            .transactions()
            .iter()
            .map(|t| t.transaction_type)
            .collect();

        assert_eq!(out.table.len(), 3);
        assert_eq!(
            types,
            vec![TransactionType::Expense, TransactionType::Income, TransactionType::Expense]
        );
        assert_eq!(out.report.rows_dropped(), 0);
        assert!(!out.report.has_warnings());
    }

    #[test]
    fn test_debit_credit_fallback() {
        let data = RawDataset::from_columns(vec![
            (
                "TxnDate".to_string(),
                vec![Some("2024-01-05".to_string()), Some("2024-01-06".to_string())],
            ),
            ("Debit".to_string(), vec![Some("50".to_string()), None]),
            ("Credit".to_string(), vec![None, Some("1000".to_string())]),
        ]);
        let out = DatasetNormalizer::new().normalize(&data).unwrap();

        assert!(matches!(out.report.mapping.amount, AmountSource::DebitCredit { .. }));
        assert_eq!(out.table.amounts(), vec![-50.0, 1000.0]);
        assert_eq!(out.table.transactions()[0].category, "Uncategorized");
        assert_eq!(out.table.transactions()[0].description, "Unknown");
    }

    #[test]
    fn test_missing_columns_are_fatal() {
        let no_date = raw("Amount,Memo\n1,x\n");
        assert!(matches!(
            DatasetNormalizer::new().normalize(&no_date),
            Err(AnalyticsError::NoDateColumnFound)
        ));

        let no_amount = raw("Date,Memo\n2024-01-01,x\n");
        assert!(matches!(
            DatasetNormalizer::new().normalize(&no_amount),
            Err(AnalyticsError::NoAmountColumnFound)
        ));
    }

    #[test]
    fn test_bad_rows_dropped_and_reported() {
        let data = raw(
            "Date,Amount\n\
             2024-01-05,-50\n\
             garbage,-10\n\
             2024-01-07,n/a\n\
             2024-01-08,\n",
        );
        let out = DatasetNormalizer::new().normalize(&data).unwrap();

        assert_eq!(out.table.len(), 1);
        assert_eq!(out.report.dropped_bad_date, 1);
        assert_eq!(out.report.dropped_bad_amount, 2);
        assert!(out.report.has_warnings());
    }

    #[test]
    fn test_all_amounts_unparseable_returns_empty_table() {
        let data = raw("Date,Amount\n2024-01-05,x\n2024-01-06,y\n");
        let out = DatasetNormalizer::new().normalize(&data).unwrap();

        assert!(out.table.is_empty());
        assert!(out
            .report
            .warnings
            .iter()
            .any(|w| w.message.contains("all amounts unparseable")));
    }

    #[test]
    fn test_amounts_clipped() {
        let data = raw("Date,Amount\n2024-01-05,-5000000\n2024-01-06,2000000\n2024-01-07,10\n");
        let out = DatasetNormalizer::new().normalize(&data).unwrap();

        assert_eq!(out.table.amounts(), vec![-1_000_000.0, 1_000_000.0, 10.0]);
        assert_eq!(out.report.clipped, 2);
        assert!(out.table.amounts().iter().all(|a| a.abs() <= AMOUNT_LIMIT));
    }

    #[test]
    fn test_zero_amount_is_expense() {
        let data = raw("Date,Amount\n2024-01-05,0\n");
        let out = DatasetNormalizer::new().normalize(&data).unwrap();
        assert_eq!(out.table.transactions()[0].transaction_type, TransactionType::Expense);
    }

    #[test]
    fn test_source_type_column_is_used() {
        let data = raw("Date,Amount,Type\n2024-01-05,25,expense\n2024-01-06,-3,refund\n");
        let out = DatasetNormalizer::new().normalize(&data).unwrap();
        let tx = out.table.transactions();

        assert_eq!(tx[0].transaction_type, TransactionType::Expense);
        assert_eq!(tx[1].transaction_type, TransactionType::Expense);
        assert!(out.report.warnings.iter().any(|w| w.field == "type"));
    }

    #[test]
    fn test_normalizing_canonical_table_is_idempotent() {
        let data = raw(
            "Date,Amount,Category,Description\n\
             05/01/2024,-50,Food,McDonalds\n\
             2024-01-10,\"1,000\",Income,Salary\n",
        );
        let first = DatasetNormalizer::new().normalize(&data).unwrap();

        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("clean.csv");
        first.table.write_csv(&path).unwrap();

        let second = DatasetNormalizer::new()
            .normalize(&RawDataset::from_path(&path).unwrap())
            .unwrap();

        assert_eq!(second.table.transactions(), first.table.transactions());
    }
}
