// 📅 Monthly Series - per-month totals derived from the transaction table

use crate::table::{TransactionTable, TransactionType};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A calendar month
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) {
            Some(YearMonth { year, month })
        } else {
            None
        }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        YearMonth {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn succ(&self) -> Self {
        self.add_months(1)
    }

    pub fn add_months(&self, months: i64) -> Self {
        let index = self.index() + months;
        YearMonth {
            year: index.div_euclid(12) as i32,
            month: index.rem_euclid(12) as u32 + 1,
        }
    }

    /// Months since year 0, used for spacing and seasonality phase
    pub fn index(&self) -> i64 {
        self.year as i64 * 12 + (self.month as i64 - 1)
    }

    pub fn months_until(&self, other: &YearMonth) -> i64 {
        other.index() - self.index()
    }

    pub fn first_day(&self) -> NaiveDate {
        // Month is always 1..=12, so day 1 always exists
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default()
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

// ============================================================================
// MONTHLY SERIES
// ============================================================================

/// Absolute totals per (month, type), computed fresh from a table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "Vec<MonthRow>", from = "Vec<MonthRow>")]
pub struct MonthlySeries {
    totals: BTreeMap<YearMonth, MonthTotals>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthTotals {
    pub income: f64,
    pub expense: f64,
}

impl MonthTotals {
    pub fn get(&self, kind: TransactionType) -> f64 {
        match kind {
            TransactionType::Income => self.income,
            TransactionType::Expense => self.expense,
        }
    }

    pub fn net(&self) -> f64 {
        self.income - self.expense
    }
}

/// Wire form of one month (JSON object keys must be strings)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthRow {
    pub month: YearMonth,
    pub income: f64,
    pub expense: f64,
}

impl From<MonthlySeries> for Vec<MonthRow> {
    fn from(series: MonthlySeries) -> Self {
        series
            .totals
            .into_iter()
            .map(|(month, t)| MonthRow {
                month,
                income: t.income,
                expense: t.expense,
            })
            .collect()
    }
}

impl From<Vec<MonthRow>> for MonthlySeries {
    fn from(rows: Vec<MonthRow>) -> Self {
        let totals = rows
            .into_iter()
            .map(|r| {
                (
                    r.month,
                    MonthTotals {
                        income: r.income,
                        expense: r.expense,
                    },
                )
            })
            .collect();
        MonthlySeries { totals }
    }
}

impl MonthlySeries {
    /// Income and expense totals split by amount sign, as absolute values.
    /// Zero amounts keep their month but add nothing.
    pub fn from_table(table: &TransactionTable) -> Self {
        let mut totals: BTreeMap<YearMonth, MonthTotals> = BTreeMap::new();
        for tx in table.transactions() {
            let entry = totals.entry(YearMonth::from_date(tx.date)).or_default();
            if tx.amount > 0.0 {
                entry.income += tx.amount;
            } else if tx.amount < 0.0 {
                entry.expense += tx.amount.abs();
            }
        }
        MonthlySeries { totals }
    }

    /// Expense totals only: rows with a negative amount, |sum| per month
    pub fn expenses(table: &TransactionTable) -> Self {
        let mut sums: BTreeMap<YearMonth, f64> = BTreeMap::new();
        for tx in table.transactions().iter().filter(|t| t.amount < 0.0) {
            *sums.entry(YearMonth::from_date(tx.date)).or_default() += tx.amount;
        }

        let totals = sums
            .into_iter()
            .map(|(month, sum)| {
                (
                    month,
                    MonthTotals {
                        income: 0.0,
                        expense: sum.abs(),
                    },
                )
            })
            .collect();
        MonthlySeries { totals }
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    pub fn months(&self) -> Vec<YearMonth> {
        self.totals.keys().copied().collect()
    }

    pub fn first_month(&self) -> Option<YearMonth> {
        self.totals.keys().next().copied()
    }

    pub fn last_month(&self) -> Option<YearMonth> {
        self.totals.keys().next_back().copied()
    }

    pub fn get(&self, month: &YearMonth) -> Option<&MonthTotals> {
        self.totals.get(month)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&YearMonth, &MonthTotals)> {
        self.totals.iter()
    }

    /// (month, value) pairs for one transaction type, in month order
    pub fn values(&self, kind: TransactionType) -> Vec<(YearMonth, f64)> {
        self.totals.iter().map(|(m, t)| (*m, t.get(kind))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Transaction;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn table() -> TransactionTable {
        TransactionTable::from_transactions(vec![
            Transaction::new(d(2024, 1, 5), -50.0),
            Transaction::new(d(2024, 1, 10), 1000.0),
            Transaction::new(d(2024, 1, 20), -25.0),
            Transaction::new(d(2024, 3, 5), -60.0),
        ])
    }

    #[test]
    fn test_year_month_arithmetic() {
        let dec = YearMonth::new(2023, 12).unwrap();
        assert_eq!(dec.succ(), YearMonth::new(2024, 1).unwrap());
        assert_eq!(dec.add_months(14), YearMonth::new(2025, 2).unwrap());
        assert_eq!(dec.add_months(-12), YearMonth::new(2022, 12).unwrap());
        assert_eq!(dec.months_until(&YearMonth::new(2024, 6).unwrap()), 6);
        assert_eq!(dec.first_day(), d(2023, 12, 1));
        assert_eq!(dec.to_string(), "2023-12");
        assert!(YearMonth::new(2024, 13).is_none());
    }

    #[test]
    fn test_expense_series() {
        let series = MonthlySeries::expenses(&table());

        assert_eq!(series.len(), 2);
        assert_eq!(
            series.values(TransactionType::Expense),
            vec![
                (YearMonth::new(2024, 1).unwrap(), 75.0),
                (YearMonth::new(2024, 3).unwrap(), 60.0)
            ]
        );
        assert_eq!(series.last_month(), YearMonth::new(2024, 3));
    }

    #[test]
    fn test_from_table_by_sign() {
        let series = MonthlySeries::from_table(&table());
        let jan = series.get(&YearMonth::new(2024, 1).unwrap()).unwrap();

        assert_eq!(jan.income, 1000.0);
        assert_eq!(jan.expense, 75.0);
        assert_eq!(jan.net(), 925.0);
    }

    #[test]
    fn test_type_label_does_not_override_sign() {
        let table = TransactionTable::from_transactions(vec![
            Transaction::new(d(2024, 1, 5), 50.0).with_type(TransactionType::Expense),
            Transaction::new(d(2024, 1, 6), -20.0).with_type(TransactionType::Expense),
        ]);
        let series = MonthlySeries::from_table(&table);
        let jan = series.get(&YearMonth::new(2024, 1).unwrap()).unwrap();

        assert_eq!(jan.income, 50.0);
        assert_eq!(jan.expense, 20.0);
    }

    #[test]
    fn test_series_serializes_as_list() {
        let json = serde_json::to_value(MonthlySeries::expenses(&table())).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 2);
        assert_eq!(json[0]["month"]["month"], 1);
        assert_eq!(json[0]["expense"], 75.0);
    }

    #[test]
    fn test_empty_table() {
        let series = MonthlySeries::expenses(&TransactionTable::new());
        assert!(series.is_empty());
        assert_eq!(series.first_month(), None);
    }
}
