// 🔎 Column Discovery - map arbitrary headers onto canonical roles
//
// Precedence is part of the contract, so it lives here as data:
//
//   1. Date         {"date", "time", "day"}
//   2. Amount       {"amount", "value", "money", "transaction"}
//   3. Debit+Credit both present  -> amount = credit - debit
//   4. Lone debit or credit column -> used directly as amount
//   5. Category     {"category", "type"}
//   6. Description  {"desc", "merchant", "details"}
//
// Within a role the match is keyword-major: every header is tested
// against the first keyword before the second keyword is tried, and the
// left-most header wins. A header claimed by an earlier role is never
// reused, so "Transaction Date" stays the date column.

use serde::{Deserialize, Serialize};

pub const DATE_KEYWORDS: &[&str] = &["date", "time", "day"];
pub const AMOUNT_KEYWORDS: &[&str] = &["amount", "value", "money", "transaction"];
pub const DEBIT_KEYWORDS: &[&str] = &["debit"];
pub const CREDIT_KEYWORDS: &[&str] = &["credit"];
pub const CATEGORY_KEYWORDS: &[&str] = &["category", "type"];
pub const DESCRIPTION_KEYWORDS: &[&str] = &["desc", "merchant", "details"];

/// Find the column for a role.
///
/// Matching is keyword-major, not column-major: each keyword is tried in
/// list order against every header, and the first header containing it
/// wins. A stronger keyword later in the file therefore beats a weaker one
/// earlier, so `["Posting Day", "Booking Date"]` resolves to column 1 for
/// the date keywords, where a left-to-right column scan would pick column 0.
/// Headers listed in `taken` are skipped.
pub fn detect_column(headers: &[String], keywords: &[&str], taken: &[usize]) -> Option<usize> {
    keywords.iter().find_map(|kw| {
        headers.iter().enumerate().find_map(|(idx, header)| {
            if taken.contains(&idx) {
                return None;
            }
            if header.to_lowercase().contains(kw) {
                Some(idx)
            } else {
                None
            }
        })
    })
}

// ============================================================================
// COLUMN MAPPING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AmountSource {
    /// A single signed amount column
    Direct { column: String },
    /// amount = credit - debit, missing cells count as 0
    DebitCredit { debit: String, credit: String },
}

/// Which source header feeds which canonical field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub date: String,
    pub amount: AmountSource,
    pub category: Option<String>,
    pub description: Option<String>,
    /// Source column literally named "type" (any case)
    pub transaction_type: Option<String>,

    #[serde(skip)]
    pub(crate) indices: MappingIndices,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct MappingIndices {
    pub date: usize,
    pub amount: AmountIndices,
    pub category: Option<usize>,
    pub description: Option<usize>,
    pub transaction_type: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum AmountIndices {
    Direct(usize),
    DebitCredit { debit: usize, credit: usize },
}

impl Default for AmountIndices {
    fn default() -> Self {
        AmountIndices::Direct(0)
    }
}

/// Outcome of column discovery, before any row is parsed
#[derive(Debug, Clone, PartialEq)]
pub enum Discovery {
    Mapped(ColumnMapping),
    MissingDate,
    MissingAmount,
}

/// Run every role in precedence order against a header row.
pub fn discover_columns(headers: &[String]) -> Discovery {
    let mut taken = Vec::new();

    let date = match detect_column(headers, DATE_KEYWORDS, &taken) {
        Some(idx) => idx,
        None => return Discovery::MissingDate,
    };
    taken.push(date);

    let amount = if let Some(idx) = detect_column(headers, AMOUNT_KEYWORDS, &taken) {
        taken.push(idx);
        AmountIndices::Direct(idx)
    } else {
        let debit = detect_column(headers, DEBIT_KEYWORDS, &taken);
        let credit = detect_column(headers, CREDIT_KEYWORDS, &taken);
        match (debit, credit) {
            (Some(debit), Some(credit)) if debit != credit => {
                taken.push(debit);
                taken.push(credit);
                AmountIndices::DebitCredit { debit, credit }
            }
            (Some(idx), _) | (None, Some(idx)) => {
                taken.push(idx);
                AmountIndices::Direct(idx)
            }
            (None, None) => return Discovery::MissingAmount,
        }
    };

    // A literal "type" column carries Income/Expense labels, keep it out of
    // the category search so "category" columns are not shadowed by it.
    let transaction_type = headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case("type"))
        .filter(|idx| !taken.contains(idx));

    let mut category_taken = taken.clone();
    if let Some(idx) = transaction_type {
        category_taken.push(idx);
    }
    let category = detect_column(headers, CATEGORY_KEYWORDS, &category_taken);
    if let Some(idx) = category {
        taken.push(idx);
    }

    let description = detect_column(headers, DESCRIPTION_KEYWORDS, &taken);
    if let Some(idx) = description {
        taken.push(idx);
    }

    let indices = MappingIndices {
        date,
        amount: amount.clone(),
        category,
        description,
        transaction_type,
    };

    let name = |idx: usize| headers[idx].clone();

    Discovery::Mapped(ColumnMapping {
        date: name(date),
        amount: match amount {
            AmountIndices::Direct(idx) => AmountSource::Direct { column: name(idx) },
            AmountIndices::DebitCredit { debit, credit } => AmountSource::DebitCredit {
                debit: name(debit),
                credit: name(credit),
            },
        },
        category: category.map(name),
        description: description.map(name),
        transaction_type: transaction_type.map(name),
        indices,
    })
}

impl ColumnMapping {
    /// Header names claimed by the mapping
    pub fn claimed_columns(&self) -> Vec<&str> {
        let mut cols = vec![self.date.as_str()];
        match &self.amount {
            AmountSource::Direct { column } => cols.push(column),
            AmountSource::DebitCredit { debit, credit } => {
                cols.push(debit);
                cols.push(credit);
            }
        }
        cols.extend(self.category.as_deref());
        cols.extend(self.description.as_deref());
        cols.extend(self.transaction_type.as_deref());
        cols
    }

    pub fn summary(&self) -> String {
        let amount = match &self.amount {
            AmountSource::Direct { column } => column.clone(),
            AmountSource::DebitCredit { debit, credit } => format!("{} - {}", credit, debit),
        };
        format!(
            "date={}, amount={}, category={}, description={}",
            self.date,
            amount,
            self.category.as_deref().unwrap_or("-"),
            self.description.as_deref().unwrap_or("-")
        )
    }
}
