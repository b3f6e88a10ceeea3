// 📊 Financial Summary - KPI numbers consumed by reports
//
// Read-only aggregation; nothing here feeds back into the models.

use crate::series::{MonthlySeries, YearMonth};
use crate::table::TransactionTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const TOP_N: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendEntry {
    pub name: String,
    /// Absolute expense total
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyBreakdown {
    pub month: YearMonth,
    pub income: f64,
    pub expenses: f64,
    pub net: f64,
    /// max(net, 0) / income × 100, or 0 without income
    pub savings_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialSummary {
    pub transaction_count: usize,
    pub total_income: f64,
    pub total_expenses: f64,
    pub net_savings: f64,
    /// net / income × 100, or 0 when there is no income
    pub savings_rate: f64,
    pub top_categories: Vec<SpendEntry>,
    pub top_merchants: Vec<SpendEntry>,
    pub monthly: Vec<MonthlyBreakdown>,
}

impl FinancialSummary {
    pub fn from_table(table: &TransactionTable) -> Self {
        let transactions = table.transactions();

        let total_income: f64 = transactions
            .iter()
            .filter(|t| t.amount > 0.0)
            .map(|t| t.amount)
            .sum();
        let total_expenses: f64 = transactions
            .iter()
            .filter(|t| t.amount < 0.0)
            .map(|t| t.amount)
            .sum::<f64>()
            .abs();
        let net_savings = total_income - total_expenses;

        let mut by_category: BTreeMap<&str, f64> = BTreeMap::new();
        let mut by_merchant: BTreeMap<&str, f64> = BTreeMap::new();
        for tx in transactions.iter().filter(|t| t.amount < 0.0) {
            *by_category.entry(tx.category.as_str()).or_default() += tx.amount;
            *by_merchant.entry(tx.description.as_str()).or_default() += tx.amount;
        }

        let monthly = MonthlySeries::from_table(table)
            .iter()
            .map(|(month, totals)| MonthlyBreakdown {
                month: *month,
                income: totals.income,
                expenses: totals.expense,
                net: totals.net(),
                savings_rate: rate(totals.net().max(0.0), totals.income),
            })
            .collect();

        FinancialSummary {
            transaction_count: transactions.len(),
            total_income,
            total_expenses,
            net_savings,
            savings_rate: rate(net_savings, total_income),
            top_categories: top_spend(by_category),
            top_merchants: top_spend(by_merchant),
            monthly,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Income: {:.2}, Expenses: {:.2}, Net: {:.2}, Savings rate: {:.1}%",
            self.total_income, self.total_expenses, self.net_savings, self.savings_rate
        )
    }
}

fn rate(savings: f64, income: f64) -> f64 {
    if income > 0.0 {
        savings / income * 100.0
    } else {
        0.0
    }
}

/// Largest absolute spend first; equal amounts keep name order
fn top_spend(sums: BTreeMap<&str, f64>) -> Vec<SpendEntry> {
    let mut entries: Vec<SpendEntry> = sums
        .into_iter()
        .map(|(name, sum)| SpendEntry {
            name: name.to_string(),
            amount: sum.abs(),
        })
        .collect();
    entries.sort_by(|a, b| b.amount.total_cmp(&a.amount));
    entries.truncate(TOP_N);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Transaction, TransactionType};
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn scenario() -> TransactionTable {
        TransactionTable::from_transactions(vec![
            Transaction::new(d(2024, 1, 5), -50.0)
                .with_category("Food")
                .with_description("McDonalds"),
            Transaction::new(d(2024, 1, 10), 1000.0)
                .with_category("Income")
                .with_description("Salary"),
            Transaction::new(d(2024, 2, 5), -60.0)
                .with_category("Food")
                .with_description("KFC"),
        ])
    }

    #[test]
    fn test_scenario_kpis() {
        let summary = FinancialSummary::from_table(&scenario());

        assert_eq!(summary.transaction_count, 3);
        assert_eq!(summary.total_income, 1000.0);
        assert_eq!(summary.total_expenses, 110.0);
        assert_eq!(summary.net_savings, 890.0);
        assert!((summary.savings_rate - 89.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_income_rate_is_zero() {
        let table = TransactionTable::from_transactions(vec![Transaction::new(d(2024, 1, 5), -50.0)]);
        let summary = FinancialSummary::from_table(&table);

        assert_eq!(summary.savings_rate, 0.0);
        assert_eq!(summary.monthly[0].savings_rate, 0.0);
        assert_eq!(summary.net_savings, -50.0);
    }

    #[test]
    fn test_top_lists() {
        let summary = FinancialSummary::from_table(&scenario());

        assert_eq!(
            summary.top_categories,
            vec![SpendEntry { name: "Food".to_string(), amount: 110.0 }]
        );
        assert_eq!(summary.top_merchants[0].name, "KFC");
        assert_eq!(summary.top_merchants[1].name, "McDonalds");
    }

    #[test]
    fn test_top_lists_capped_at_five() {
        let table = TransactionTable::from_transactions(
            (1..=8)
                .map(|i| {
                    Transaction::new(d(2024, 1, i), -(i as f64))
                        .with_category(&format!("C{}", i))
                })
                .collect(),
        );
        let summary = FinancialSummary::from_table(&table);

        assert_eq!(summary.top_categories.len(), 5);
        assert_eq!(summary.top_categories[0].name, "C8");
        assert_eq!(summary.top_categories[4].name, "C4");
    }

    #[test]
    fn test_monthly_breakdown() {
        let summary = FinancialSummary::from_table(&scenario());

        assert_eq!(summary.monthly.len(), 2);
        let jan = &summary.monthly[0];
        assert_eq!(jan.income, 1000.0);
        assert_eq!(jan.expenses, 50.0);
        assert!((jan.savings_rate - 95.0).abs() < 1e-9);

        let feb = &summary.monthly[1];
        assert_eq!(feb.net, -60.0);
        assert_eq!(feb.savings_rate, 0.0);
    }

    #[test]
    fn test_monthly_totals_agree_with_headline() {
        let table = TransactionTable::from_transactions(vec![
            Transaction::new(d(2024, 1, 5), 50.0).with_type(TransactionType::Expense),
            Transaction::new(d(2024, 1, 6), -20.0).with_type(TransactionType::Expense),
            Transaction::new(d(2024, 2, 1), -30.0).with_type(TransactionType::Income),
        ]);
        let summary = FinancialSummary::from_table(&table);

        assert_eq!(summary.total_income, 50.0);
        assert_eq!(summary.total_expenses, 50.0);
        let monthly_income: f64 = summary.monthly.iter().map(|m| m.income).sum();
        let monthly_expenses: f64 = summary.monthly.iter().map(|m| m.expenses).sum();
        assert_eq!(monthly_income, summary.total_income);
        assert_eq!(monthly_expenses, summary.total_expenses);
    }

    #[test]
    fn test_empty_table() {
        let summary = FinancialSummary::from_table(&TransactionTable::new());
        assert_eq!(summary.total_income, 0.0);
        assert!(summary.top_categories.is_empty());
        assert!(summary.monthly.is_empty());
    }
}
