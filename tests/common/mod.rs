#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
    time::Duration,
};
use txntracer::{
    SourceError, StopHandle, TimeRange, Transaction, data_sources::TransactionSource,
};

pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

pub fn tx(txid: &str, from: &str, to: &str, when: DateTime<Utc>) -> Transaction {
    Transaction::new(txid, from, to, 1_000, when)
}

pub fn seeds(addrs: &[&str]) -> Vec<String> {
    addrs.iter().map(|a| a.to_string()).collect()
}

/// In-memory source answering from a fixed transaction list.
///
/// Records every query so tests can check which addresses were expanded and with which
/// windows.
#[derive(Default)]
pub struct ScriptedSource {
    transactions: Vec<Transaction>,
    outgoing_only: bool,
    unfiltered: bool,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    stop_on: Mutex<Option<(String, StopHandle)>>,
    calls: Mutex<Vec<(String, TimeRange)>>,
}

impl ScriptedSource {
    pub fn new(transactions: Vec<Transaction>) -> Self {
        Self {
            transactions,
            ..Default::default()
        }
    }

    /// Only report transactions the queried address sent.
    pub fn outgoing_only(mut self) -> Self {
        self.outgoing_only = true;
        self
    }

    /// Report every transaction regardless of address or window.
    pub fn unfiltered(mut self) -> Self {
        self.unfiltered = true;
        self
    }

    pub fn failing(mut self, address: &str) -> Self {
        self.failing.insert(address.to_string());
        self
    }

    pub fn delayed(mut self, address: &str, delay: Duration) -> Self {
        self.delays.insert(address.to_string(), delay);
        self
    }

    pub fn stop_when_queried(&self, address: &str, handle: StopHandle) {
        *self.stop_on.lock().unwrap() = Some((address.to_string(), handle));
    }

    pub fn calls(&self) -> Vec<(String, TimeRange)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn queried(&self) -> Vec<String> {
        let mut addrs: Vec<String> = self.calls().into_iter().map(|(a, _)| a).collect();
        addrs.sort();
        addrs
    }

    pub fn window_for(&self, address: &str) -> Option<TimeRange> {
        self.calls()
            .into_iter()
            .find(|(a, _)| a == address)
            .map(|(_, window)| window)
    }
}

#[async_trait]
impl TransactionSource for ScriptedSource {
    async fn get_transactions(
        &self,
        address: &str,
        range: &TimeRange,
    ) -> Result<Vec<Transaction>, SourceError> {
        self.calls
            .lock()
            .unwrap()
            .push((address.to_string(), *range));

        if let Some((trigger, handle)) = self.stop_on.lock().unwrap().as_ref() {
            if trigger == address {
                handle.stop();
            }
        }

        if let Some(delay) = self.delays.get(address) {
            tokio::time::sleep(*delay).await;
        }

        if self.failing.contains(address) {
            return Err(SourceError::Http { status: 503 });
        }

        if self.unfiltered {
            return Ok(self.transactions.clone());
        }

        Ok(self
            .transactions
            .iter()
            .filter(|tx| {
                let involved = if self.outgoing_only {
                    tx.from == address
                } else {
                    tx.touches(address)
                };
                involved && range.contains(tx.timestamp)
            })
            .cloned()
            .collect())
    }
}

/// Source that never gets to the end of an address's history.
pub struct TruncatingSource;

#[async_trait]
impl TransactionSource for TruncatingSource {
    async fn get_transactions(
        &self,
        address: &str,
        _range: &TimeRange,
    ) -> Result<Vec<Transaction>, SourceError> {
        Err(SourceError::HistoryTruncated {
            address: address.to_string(),
            pages: 10,
        })
    }
}
