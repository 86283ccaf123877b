//! Arkiv command-line client
//!
//! Runs entity queries and watches lifecycle events against an Arkiv node.
//! Results go to stdout as JSON lines; logs go to stderr.
//!
//! Usage:
//!   arkiv query --where 'type = "user" AND age >= 18' --fields key,attributes
//!   arkiv count --where 'type = "user"'
//!   arkiv watch --events created,deleted --from latest

use anyhow::{Context, Result};
use arkiv_cli::{EntityView, parse_block, parse_fields, parse_kinds, parse_order};
use arkiv_client::{ArkivClient, ClientConfig, LifecycleEvent, QueryBuilder};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "arkiv")]
#[command(about = "Query entities and watch lifecycle events on an Arkiv node")]
struct Args {
    /// JSON-RPC endpoint of the node
    #[arg(long, default_value = "http://127.0.0.1:8545")]
    rpc_url: String,

    /// Request timeout in milliseconds
    #[arg(long, default_value = "30000")]
    timeout_ms: u64,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every entity matching a predicate
    Query {
        /// Predicate; omit to match every entity
        #[arg(short, long = "where")]
        predicate: Option<String>,

        /// Comma-separated fields to return
        #[arg(short, long, default_value = "all")]
        fields: String,

        /// Sort key as name[:int|str][:asc|desc]; repeatable
        #[arg(long = "order-by")]
        order_by: Vec<String>,

        /// Stop after this many entities
        #[arg(short, long)]
        limit: Option<u64>,

        /// Entities per page request
        #[arg(long)]
        page_size: Option<u32>,

        /// Evaluate at this block instead of the head
        #[arg(long)]
        at_block: Option<u64>,
    },

    /// Print the number of entities matching a predicate
    Count {
        /// Predicate; omit to match every entity
        #[arg(short, long = "where")]
        predicate: Option<String>,

        /// Evaluate at this block instead of the head
        #[arg(long)]
        at_block: Option<u64>,
    },

    /// Print lifecycle events as they happen
    Watch {
        /// Comma-separated event kinds, or `all`
        #[arg(short, long, default_value = "all")]
        events: String,

        /// First block to report: `latest` or a block number
        #[arg(long, default_value = "latest")]
        from: String,

        /// Poll interval in milliseconds
        #[arg(long, default_value = "2000", value_parser = clap::value_parser!(u64).range(1..))]
        poll_ms: u64,

        /// Poll once and exit instead of running until interrupted
        #[arg(long)]
        once: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let mut config = ClientConfig::new(&args.rpc_url);
    config.rpc.request_timeout_ms = args.timeout_ms;

    match args.command {
        Command::Query {
            predicate,
            fields,
            order_by,
            limit,
            page_size,
            at_block,
        } => {
            let client = ArkivClient::connect(config)?;
            let mut builder = filtered(client.select(parse_fields(&fields)?), predicate)?;
            for spec in &order_by {
                builder = builder.order_by(parse_order(spec)?);
            }
            if let Some(limit) = limit {
                builder = builder.limit(limit);
            }
            if let Some(size) = page_size {
                builder = builder.page_size(size);
            }
            if let Some(block) = at_block {
                builder = builder.at_block(block);
            }

            let mut iter = builder.fetch()?;
            let mut printed = 0u64;
            while let Some(entity) = iter.try_next().await? {
                let line = serde_json::to_string(&EntityView::from(&entity))?;
                println!("{line}");
                printed += 1;
            }
            info!(
                "{printed} entities at block {}",
                iter.block_number().unwrap_or_default()
            );
        }
        Command::Count {
            predicate,
            at_block,
        } => {
            let client = ArkivClient::connect(config)?;
            let mut builder = filtered(client.select(arkiv_client::Fields::KEY), predicate)?;
            if let Some(block) = at_block {
                builder = builder.at_block(block);
            }
            println!("{}", builder.count().await?);
        }
        Command::Watch {
            events,
            from,
            poll_ms,
            once,
        } => {
            config.watcher.poll_interval_ms = poll_ms;
            let client = ArkivClient::connect(config)?;
            let kinds = parse_kinds(&events)?;
            let from = parse_block(&from)?;

            let watcher = client.watch(kinds, from, print_event).await?;
            if once {
                let delivered = watcher.poll().await?;
                info!("{delivered} events delivered");
            } else {
                watcher.run().await?;
                info!("Watching {:?} from {from}; press Ctrl-C to stop", watcher.kinds());
                tokio::signal::ctrl_c()
                    .await
                    .context("Failed to listen for Ctrl-C")?;
            }

            let report = client.close().await;
            for (id, e) in &report.failures {
                warn!("Watcher {id} was not released cleanly: {e}");
            }
        }
    }
    Ok(())
}

fn filtered(builder: QueryBuilder, predicate: Option<String>) -> Result<QueryBuilder> {
    match predicate {
        Some(text) => builder
            .where_raw(text)
            .context("Failed to parse predicate"),
        None => Ok(builder),
    }
}

fn print_event(event: LifecycleEvent) {
    match serde_json::to_string(&event) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!("Failed to encode event at block {}: {e}", event.block_number),
    }
}
