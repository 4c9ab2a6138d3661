use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{info, warn};
use txntracer::{
    blockchain_info::{BlockchainInfoConfig, BlockchainInfoSource, DEFAULT_API_URL},
    data_sources::{CsvTransactionSource, TransactionSource},
    filter_relevant,
    graph_utils::{save_graph_as_dot, save_trace_data},
    summary::TransferSummary,
    traversal::{TraceConfig, Tracer},
};

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SourceKind {
    BlockchainInfo,
    Csv,
}

/// Trace fund flows between addresses.
#[derive(Parser, Debug)]
struct Args {
    /// Seed addresses to trace from
    #[arg(value_name = "ADDR", required = true, num_args = 1..)]
    addresses: Vec<String>,
    /// Depth of analysis
    #[arg(short, long, default_value = "1")]
    level: usize,
    /// Start date for seed addresses (YYYY-MM-DD)
    #[arg(short = 's', long)]
    start_date: Option<NaiveDate>,
    /// End date for seed addresses (YYYY-MM-DD), inclusive
    #[arg(short = 'e', long)]
    end_date: Option<NaiveDate>,
    #[arg(long, value_enum, default_value = "blockchain-info")]
    source: SourceKind,
    /// Transaction CSV for `--source csv` (txid,from,to,amount,timestamp)
    #[arg(long)]
    csv_path: Option<PathBuf>,
    #[arg(long, default_value = DEFAULT_API_URL)]
    api_url: String,
    /// Maximum concurrent fetches
    #[arg(long, default_value = "4")]
    concurrency: usize,
    /// Stop tracing after this many seconds and keep what was found
    #[arg(long)]
    timeout_secs: Option<u64>,
    #[arg(long, default_value = "3")]
    max_retries: u32,
    #[arg(long, default_value = "500")]
    request_delay_ms: u64,
    /// DOT file for the filtered graph
    #[arg(short, long, default_value = "graph.dot")]
    output: PathBuf,
    /// Save full and filtered graph data to JSON
    #[arg(long)]
    save_data: bool,
    #[arg(long, default_value = "analysis_result")]
    data_prefix: String,
}

fn build_source(args: &Args) -> Result<Arc<dyn TransactionSource>> {
    match args.source {
        SourceKind::BlockchainInfo => {
            let config = BlockchainInfoConfig {
                base_url: args.api_url.clone(),
                max_retries: args.max_retries,
                request_delay: Duration::from_millis(args.request_delay_ms),
                ..Default::default()
            };
            let source = BlockchainInfoSource::new(config)?;
            info!("Using {}", source);
            Ok(Arc::new(source))
        }
        SourceKind::Csv => {
            let Some(path) = &args.csv_path else {
                bail!("--csv-path is required with --source csv");
            };
            info!("Loading transactions from {}", path.display());
            Ok(Arc::new(CsvTransactionSource::from_csv(path)?))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    info!("Starting txntracer");
    let args = Args::parse();
    info!("Seed addresses: {:?}", args.addresses);
    info!("Level: {}", args.level);
    if let Some(start) = args.start_date {
        info!("Start date: {}", start);
    }
    if let Some(end) = args.end_date {
        info!("End date: {}", end);
    }

    let config = TraceConfig {
        max_level: args.level,
        start_date: args.start_date,
        end_date: args.end_date,
        concurrency: args.concurrency,
        deadline: args.timeout_secs.map(Duration::from_secs),
    };
    // Fail on bad input before building any client
    config.validate(&args.addresses)?;

    let source = build_source(&args)?;
    let tracer = Tracer::new(source, config);

    let stop = tracer.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; finishing in-flight fetches");
            stop.stop();
        }
    });

    let report = tracer.trace(&args.addresses).await?;
    for warning in &report.warnings {
        warn!("Partial result: {}", warning);
    }
    if report.cancelled {
        warn!(
            "Trace cancelled after {} complete levels; results are partial",
            report.levels_completed
        );
    }

    let full = &report.graph;
    info!(
        "Full graph: {} nodes, {} edges",
        full.node_count(),
        full.edge_count()
    );

    let filtered = filter_relevant(full);

    if args.save_data {
        save_trace_data(&args.data_prefix, full, &filtered)
            .context("Failed to save trace data")?;
    }

    if filtered.edge_count() == 0 {
        info!("No relevant transactions found between the provided addresses.");
    } else {
        print!("{}", TransferSummary::from_graph(&filtered));
    }
    save_graph_as_dot(&filtered, &args.output)?;

    Ok(())
}
