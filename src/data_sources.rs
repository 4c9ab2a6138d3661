use crate::{
    error::SourceError,
    types::{TimeRange, Transaction},
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use polars::prelude::*;
use std::path::Path;
use tracing::debug;

/// TransactionSource
///
/// A generic trait across different data sources.
///
/// Returns every transaction touching `address` inside `range`. An empty `Ok` means the
/// address has no transactions there; `Err` means the source could not answer, after
/// whatever retrying the source does itself. Results are expected to be complete and
/// deduplicated for the call.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    async fn get_transactions(
        &self,
        address: &str,
        range: &TimeRange,
    ) -> Result<Vec<Transaction>, SourceError>;
}

/// CsvTransactionSource
///
/// An offline data source that wraps a polars DataFrame of already-exported transactions.
///
/// Each row of the DataFrame should be a single sender -> receiver movement, and it should
/// have the following columns:
/// - `txid`
/// - `from`
/// - `to`
/// - `amount` (integer base units)
/// - `timestamp` (unix seconds)
///
pub struct CsvTransactionSource {
    pub transactions: DataFrame,
}

impl CsvTransactionSource {
    pub fn new(transactions: DataFrame) -> Self {
        Self { transactions }
    }

    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let transactions = CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))
            .with_context(|| format!("Failed to open {}", path.display()))?
            .finish()
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Self::new(transactions))
    }

    fn query(&self, address: &str, range: &TimeRange) -> Result<Vec<Transaction>> {
        let mut predicate = col("from").eq(lit(address)).or(col("to").eq(lit(address)));
        if let Some(start) = range.start {
            predicate = predicate.and(col("timestamp").gt_eq(lit(start.timestamp())));
        }
        if let Some(end) = range.end {
            predicate = predicate.and(col("timestamp").lt_eq(lit(end.timestamp())));
        }

        let rows = self
            .transactions
            .clone()
            .lazy()
            .select([
                col("txid").cast(DataType::String),
                col("from").cast(DataType::String),
                col("to").cast(DataType::String),
                col("amount").cast(DataType::Int64),
                col("timestamp").cast(DataType::Int64),
            ])
            .filter(predicate)
            .collect()?;

        debug!("{} rows matched {} in {}", rows.height(), address, range);

        let col_txid = rows.column("txid")?.str()?;
        let col_from = rows.column("from")?.str()?;
        let col_to = rows.column("to")?.str()?;
        let col_amount = rows.column("amount")?.i64()?;
        let col_timestamp = rows.column("timestamp")?.i64()?;

        let mut transactions = Vec::with_capacity(rows.height());
        for row in 0..rows.height() {
            let amount = col_amount
                .get(row)
                .with_context(|| format!("Failed to get amount for {}", row))?;
            let seconds = col_timestamp
                .get(row)
                .with_context(|| format!("Failed to get timestamp for {}", row))?;

            transactions.push(Transaction::new(
                col_txid
                    .get(row)
                    .with_context(|| format!("Failed to get txid for {}", row))?,
                col_from
                    .get(row)
                    .with_context(|| format!("Failed to get from for {}", row))?,
                col_to
                    .get(row)
                    .with_context(|| format!("Failed to get to for {}", row))?,
                u64::try_from(amount)
                    .with_context(|| format!("Negative amount {} in row {}", amount, row))?,
                DateTime::<Utc>::from_timestamp(seconds, 0)
                    .with_context(|| format!("Timestamp {} out of range in row {}", seconds, row))?,
            ));
        }

        Ok(transactions)
    }
}

#[async_trait]
impl TransactionSource for CsvTransactionSource {
    async fn get_transactions(
        &self,
        address: &str,
        range: &TimeRange,
    ) -> Result<Vec<Transaction>, SourceError> {
        Ok(self.query(address, range)?)
    }
}
