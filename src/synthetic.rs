// 🎲 Synthetic transactions for demos and tests
//
// Seeded, so the same settings always produce the same file.

use crate::table::{Transaction, TransactionTable};
use chrono::{Days, NaiveDate};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

const MERCHANTS: &[(&str, &[&str])] = &[
    ("Food", &["McDonalds", "Subway", "Uber Eats", "KFC", "Dominos"]),
    ("Transport", &["Uber", "Lyft", "Shell", "BP Petrol", "Metro Ticket"]),
    ("Shopping", &["Amazon", "eBay", "Walmart", "Target", "Best Buy"]),
    ("Entertainment", &["Netflix", "Spotify", "Steam", "YouTube Premium"]),
    ("Bills", &["Electricity Co", "Water Works", "Internet ISP", "Phone Carrier"]),
    ("Income", &["Salary", "Freelance Payment", "Dividends"]),
];

#[derive(Debug, Clone)]
pub struct SyntheticGenerator {
    rows: usize,
    start: NaiveDate,
    end: NaiveDate,
    seed: u64,
}

impl Default for SyntheticGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticGenerator {
    pub fn new() -> Self {
        SyntheticGenerator {
            rows: 500,
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            end: NaiveDate::from_ymd_opt(2024, 6, 30).unwrap_or_default(),
            seed: 42,
        }
    }

    pub fn with_rows(mut self, rows: usize) -> Self {
        self.rows = rows;
        self
    }

    /// Inclusive date range; swapped if given backwards
    pub fn with_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start = start.min(end);
        self.end = start.max(end);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Income rows draw 500..3000, expenses -200..-5, both rounded to cents.
    /// Rows are sorted by date.
    pub fn generate(&self) -> TransactionTable {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let span_days = (self.end - self.start).num_days().max(0) as u64;

        let mut transactions: Vec<Transaction> = (0..self.rows)
            .filter_map(|_| {
                let (category, merchants) = MERCHANTS.choose(&mut rng)?;
                let merchant = merchants.choose(&mut rng)?;
                let date = self.start + Days::new(rng.gen_range(0..=span_days));
                let amount = if *category == "Income" {
                    rng.gen_range(500.0..3000.0)
                } else {
                    rng.gen_range(-200.0..-5.0)
                };
                let amount = (amount * 100.0_f64).round() / 100.0;

                Some(
                    Transaction::new(date, amount)
                        .with_category(category)
                        .with_description(merchant),
                )
            })
            .collect();

        transactions.sort_by_key(|t| t.date);
        TransactionTable::from_transactions(transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::TransactionType;

    #[test]
    fn test_generate_defaults() {
        let table = SyntheticGenerator::new().generate();
        let (first, last) = table.date_range().unwrap();

        assert_eq!(table.len(), 500);
        assert!(first >= NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert!(last <= NaiveDate::from_ymd_opt(2024, 6, 30).unwrap());
        assert!(table.transactions().windows(2).all(|w| w[0].date <= w[1].date));
    }

    #[test]
    fn test_amount_ranges_by_category() {
        let table = SyntheticGenerator::new().with_rows(200).generate();
        for tx in table.transactions() {
            if tx.category == "Income" {
                assert!(tx.amount >= 500.0 && tx.amount <= 3000.0);
                assert_eq!(tx.transaction_type, TransactionType::Income);
            } else {
                assert!(tx.amount >= -200.0 && tx.amount <= -5.0);
                assert_eq!(tx.transaction_type, TransactionType::Expense);
            }
        }
    }

    #[test]
    fn test_seeded_output_is_stable() {
        let a = SyntheticGenerator::new().with_seed(7).with_rows(50).generate();
        let b = SyntheticGenerator::new().with_seed(7).with_rows(50).generate();
        let c = SyntheticGenerator::new().with_seed(8).with_rows(50).generate();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
