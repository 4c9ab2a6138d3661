use crate::{data_sources::TransactionSource, error::SourceError, types::*};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    fmt::Display,
    time::Duration,
};
use tokio::time::sleep;
use tracing::{debug, warn};

pub const DEFAULT_API_URL: &str = "https://blockchain.info";

/// Settings for `BlockchainInfoSource`.
#[derive(Debug, Clone)]
pub struct BlockchainInfoConfig {
    pub base_url: String,
    pub page_size: usize,
    pub max_pages: usize,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub request_delay: Duration,
    pub timeout: Duration,
}

impl Default for BlockchainInfoConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            page_size: 50,
            max_pages: 10,
            max_retries: 3,
            retry_backoff: Duration::from_secs(1),
            request_delay: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
        }
    }
}

/// BlockchainInfoSource fetches Bitcoin transactions from the public blockchain.info API.
///
/// Uses the `rawaddr` endpoint, which pages an address's history newest-first. Pages are
/// fetched until the reported `n_tx` is reached, a page comes back empty, or a page reaches
/// back past the start of the requested range. Running out of `max_pages` before that is a
/// `HistoryTruncated` error rather than a silently partial answer.
#[derive(Debug)]
pub struct BlockchainInfoSource {
    client: reqwest::Client,
    config: BlockchainInfoConfig,
}

impl Display for BlockchainInfoSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BlockchainInfoSource({})", self.config.base_url)
    }
}

#[derive(Debug, Deserialize)]
struct RawAddrResponse {
    #[serde(default)]
    n_tx: Option<usize>,
    #[serde(default)]
    txs: Vec<RawTx>,
}

#[derive(Debug, Deserialize)]
struct RawTx {
    hash: String,
    #[serde(default)]
    time: i64,
    #[serde(default)]
    inputs: Vec<RawInput>,
    #[serde(default)]
    out: Vec<RawOutput>,
}

#[derive(Debug, Deserialize)]
struct RawInput {
    prev_out: Option<RawOutput>,
}

#[derive(Debug, Deserialize)]
struct RawOutput {
    addr: Option<String>,
    #[serde(default)]
    value: u64,
}

impl BlockchainInfoSource {
    pub fn new(config: BlockchainInfoConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }

    async fn fetch_page(&self, address: &str, offset: usize) -> Result<RawAddrResponse, SourceError> {
        let mut attempt = 0;
        let mut backoff = self.config.retry_backoff;
        loop {
            match self.fetch_page_once(address, offset).await {
                Ok(page) => return Ok(page),
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        "Fetching {} (offset {}) failed: {}. Retry {}/{} in {:?}",
                        address, offset, err, attempt, self.config.max_retries, backoff
                    );
                    sleep(backoff).await;
                    backoff *= 2;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn fetch_page_once(
        &self,
        address: &str,
        offset: usize,
    ) -> Result<RawAddrResponse, SourceError> {
        let url = format!(
            "{}/rawaddr/{}",
            self.config.base_url.trim_end_matches('/'),
            address
        );
        let response = self
            .client
            .get(&url)
            .query(&[("limit", self.config.page_size), ("offset", offset)])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimited);
        }
        if !status.is_success() {
            return Err(SourceError::Http {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        parse_rawaddr(&body)
    }
}

#[async_trait]
impl TransactionSource for BlockchainInfoSource {
    async fn get_transactions(
        &self,
        address: &str,
        range: &TimeRange,
    ) -> Result<Vec<Transaction>, SourceError> {
        let mut transactions = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        // The API may cap `limit` below `page_size`, so advance by what actually came back
        let mut offset = 0;

        for page_no in 0..self.config.max_pages {
            if page_no > 0 {
                sleep(self.config.request_delay).await;
            }
            let page = self.fetch_page(address, offset).await?;
            offset += page.txs.len();
            debug!(
                "{}: page {} has {} txs ({} of {:?} fetched)",
                address,
                page_no,
                page.txs.len(),
                offset,
                page.n_tx
            );

            for raw in &page.txs {
                if !seen.insert(raw.hash.clone()) {
                    continue;
                }
                transactions.extend(
                    expand_transaction(raw)
                        .into_iter()
                        .filter(|tx| range.contains(tx.timestamp)),
                );
            }

            if history_exhausted(&page, offset, range) {
                return Ok(transactions);
            }
        }

        warn!(
            "{}: history still incomplete after {} pages",
            address, self.config.max_pages
        );
        Err(SourceError::HistoryTruncated {
            address: address.to_string(),
            pages: self.config.max_pages,
        })
    }
}

fn parse_rawaddr(body: &str) -> Result<RawAddrResponse, SourceError> {
    serde_json::from_str(body).map_err(|e| SourceError::Decode(e.to_string()))
}

// One Transaction per (sender, receiver) pair. Inputs do not say which output they fund, so
// every sender's edge carries the receiver's full total.
fn expand_transaction(raw: &RawTx) -> Vec<Transaction> {
    let Some(timestamp) = DateTime::<Utc>::from_timestamp(raw.time, 0) else {
        warn!("Skipping {}: invalid time {}", raw.hash, raw.time);
        return Vec::new();
    };

    let senders: BTreeSet<&str> = raw
        .inputs
        .iter()
        .filter_map(|input| input.prev_out.as_ref())
        .filter_map(|prev| prev.addr.as_deref())
        .collect();

    let mut receivers: BTreeMap<&str, u64> = BTreeMap::new();
    for output in &raw.out {
        if let Some(addr) = output.addr.as_deref() {
            *receivers.entry(addr).or_insert(0) += output.value;
        }
    }

    let mut transactions = Vec::new();
    for sender in &senders {
        for (receiver, value) in &receivers {
            if sender != receiver {
                transactions.push(Transaction::new(
                    raw.hash.clone(),
                    *sender,
                    *receiver,
                    *value,
                    timestamp,
                ));
            }
        }
    }
    transactions
}

// Pages are newest-first, so once a page reaches back before the range start nothing older
// can match.
fn history_exhausted(page: &RawAddrResponse, fetched: usize, range: &TimeRange) -> bool {
    if page.txs.is_empty() || page.n_tx.is_some_and(|n_tx| fetched >= n_tx) {
        return true;
    }
    match (range.start, page.txs.iter().map(|tx| tx.time).min()) {
        (Some(start), Some(oldest)) => oldest < start.timestamp(),
        _ => false,
    }
}
