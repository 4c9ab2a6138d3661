use crate::{
    data_sources::TransactionSource,
    error::TraceError,
    graph_store::GraphStore,
    types::*,
    window::{seed_window, window_for_node},
};
use chrono::NaiveDate;
use std::{fmt::Display, sync::Arc, time::Duration};
use tokio::{
    sync::{Semaphore, watch},
    time::Instant,
};
use tracing::{debug, info, warn};

/// Parameters for one trace.
#[derive(Debug, Clone)]
pub struct TraceConfig {
    pub max_level: usize,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Upper bound on concurrent `TransactionSource` calls.
    pub concurrency: usize,
    /// Wall-clock budget for the whole trace.
    pub deadline: Option<Duration>,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            max_level: 1,
            start_date: None,
            end_date: None,
            concurrency: 4,
            deadline: None,
        }
    }
}

impl TraceConfig {
    pub fn validate(&self, seeds: &[String]) -> Result<(), TraceError> {
        if seeds.is_empty() {
            return Err(TraceError::InvalidInput(
                "at least one seed address is required".into(),
            ));
        }
        if seeds.iter().any(|seed| seed.trim().is_empty()) {
            return Err(TraceError::InvalidInput("seed addresses must not be blank".into()));
        }
        if self.max_level == 0 {
            return Err(TraceError::InvalidInput("level must be at least 1".into()));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(TraceError::InvalidInput(format!(
                    "start date {} is after end date {}",
                    start, end
                )));
            }
        }
        if self.concurrency == 0 {
            return Err(TraceError::InvalidInput("concurrency must be at least 1".into()));
        }
        Ok(())
    }
}

///
/// TraceWarning
///
/// A frontier address whose fetch failed. The address contributes no edges at `level`.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceWarning {
    pub address: String,
    pub level: usize,
    pub message: String,
}

impl Display for TraceWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "level {}: {}: {}", self.level, self.address, self.message)
    }
}

///
/// TraceReport
///
/// The expanded graph plus everything the caller needs to judge whether it is complete.
///
#[derive(Debug)]
pub struct TraceReport {
    pub graph: GraphStore,
    pub warnings: Vec<TraceWarning>,
    pub cancelled: bool,
    pub levels_completed: usize,
}

impl TraceReport {
    pub fn is_partial(&self) -> bool {
        self.cancelled || !self.warnings.is_empty()
    }
}

/// Cooperative stop signal for a running trace.
#[derive(Debug, Clone)]
pub struct StopHandle {
    signal: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    fn new() -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            signal: Arc::new(signal),
        }
    }

    pub fn stop(&self) {
        self.signal.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.signal.borrow()
    }

    fn reset(&self) {
        self.signal.send_replace(false);
    }
}

struct FrontierFetch {
    address: String,
    window: TimeRange,
    outcome: Result<Vec<Transaction>, String>,
}

/// Tracer
///
/// Expands a `GraphStore` level by level from the seed addresses.
///
/// Within a level every frontier address is fetched on its own task, with at most
/// `concurrency` fetches in flight. Workers only fetch: once the whole level is back, this
/// task folds the results into the graph in frontier order. The graph therefore has a
/// single writer, and the next frontier is read only after the level is fully committed.
pub struct Tracer<S: ?Sized> {
    source: Arc<S>,
    config: TraceConfig,
    stop: StopHandle,
}

impl<S> Tracer<S>
where
    S: TransactionSource + ?Sized + 'static,
{
    pub fn new(source: Arc<S>, config: TraceConfig) -> Self {
        Self {
            source,
            config,
            stop: StopHandle::new(),
        }
    }

    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    /// Handle for stopping the current trace, or the next one if none is running.
    ///
    /// The signal is cleared whenever `trace` returns, so a stopped tracer can be reused and
    /// a stop never carries over into a later trace.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub async fn trace(&self, seeds: &[String]) -> Result<TraceReport, TraceError> {
        let report = self.trace_levels(seeds).await;
        self.stop.reset();
        report
    }

    async fn trace_levels(&self, seeds: &[String]) -> Result<TraceReport, TraceError> {
        self.config.validate(seeds)?;

        let started = Instant::now();
        let seed_range = seed_window(self.config.start_date, self.config.end_date);
        let mut graph = GraphStore::with_seeds(seeds.iter().cloned());
        let mut warnings = Vec::new();
        let mut cancelled = false;
        let mut levels_completed = 0;

        info!(
            "Tracing {} seed addresses to level {} (seed range {})",
            graph.seeds().len(),
            self.config.max_level,
            seed_range
        );

        for level in 1..=self.config.max_level {
            if self.should_stop(started) {
                warn!("Trace stopped before level {}", level);
                cancelled = true;
                break;
            }

            let frontier = graph
                .frontier(level - 1)
                .into_iter()
                .map(|node| {
                    window_for_node(node, &seed_range).map(|window| (node.address.clone(), window))
                })
                .collect::<Result<Vec<_>, _>>()?;

            if frontier.is_empty() {
                info!("Level {} has nothing to expand", level);
                break;
            }

            info!("Analyzing level {} ({} addresses)", level, frontier.len());
            let (fetches, stopped) = self.fetch_frontier(frontier, started).await;

            for fetch in fetches {
                Self::commit(&mut graph, &mut warnings, fetch, level);
            }

            info!(
                "Level {} done: {} nodes, {} edges",
                level,
                graph.node_count(),
                graph.edge_count()
            );

            if stopped {
                warn!("Trace stopped during level {}", level);
                cancelled = true;
                break;
            }
            levels_completed = level;
        }

        Ok(TraceReport {
            graph,
            warnings,
            cancelled,
            levels_completed,
        })
    }

    fn should_stop(&self, started: Instant) -> bool {
        self.stop.is_stopped()
            || self
                .config
                .deadline
                .is_some_and(|deadline| started.elapsed() >= deadline)
    }

    // Returns the fetches in frontier order, and whether dispatch was cut short.
    async fn fetch_frontier(
        &self,
        frontier: Vec<(String, TimeRange)>,
        started: Instant,
    ) -> (Vec<FrontierFetch>, bool) {
        let permits = Arc::new(Semaphore::new(self.config.concurrency));
        let mut handles = Vec::with_capacity(frontier.len());
        let mut stopped = false;

        for (address, window) in frontier {
            if self.should_stop(started) {
                stopped = true;
                break;
            }
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };
            // Waiting for the permit may have outlasted a stop or the deadline
            if self.should_stop(started) {
                stopped = true;
                break;
            }

            let source = Arc::clone(&self.source);
            let task_address = address.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                source.get_transactions(&task_address, &window).await
            });
            handles.push((address, window, handle));
        }

        let mut fetches = Vec::with_capacity(handles.len());
        for (address, window, handle) in handles {
            let outcome = match handle.await {
                Ok(Ok(transactions)) => Ok(transactions),
                Ok(Err(err)) => Err(err.to_string()),
                Err(err) => Err(format!("worker failed: {}", err)),
            };
            fetches.push(FrontierFetch {
                address,
                window,
                outcome,
            });
        }

        (fetches, stopped)
    }

    fn commit(
        graph: &mut GraphStore,
        warnings: &mut Vec<TraceWarning>,
        fetch: FrontierFetch,
        level: usize,
    ) {
        let transactions = match fetch.outcome {
            Ok(transactions) => transactions,
            Err(message) => {
                warn!("Skipping {} at level {}: {}", fetch.address, level, message);
                warnings.push(TraceWarning {
                    address: fetch.address,
                    level,
                    message,
                });
                return;
            }
        };

        let mut edges_added = 0;
        let mut new_nodes = 0;
        let mut ignored = 0;
        for tx in &transactions {
            // Sources are asked for exactly this; anything else is not ours to fold in
            if !tx.touches(&fetch.address) || !fetch.window.contains(tx.timestamp) {
                ignored += 1;
                continue;
            }
            let outcome = graph.insert_transaction(tx, level);
            edges_added += usize::from(outcome.edge_added);
            new_nodes += outcome.new_nodes;
        }

        debug!(
            "{} in {}: {} txs, {} new edges, {} new nodes, {} ignored",
            fetch.address,
            fetch.window,
            transactions.len(),
            edges_added,
            new_nodes,
            ignored
        );
    }
}
