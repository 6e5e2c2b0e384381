use anyhow::Result;
use aws_sdk_dynamodb::types::AttributeValue;
use clap::{Parser, Subcommand};
use dynamo_copy::types::{into_document, QueryRequest, SortKeyPredicate};
use dynamo_copy::{
    Client, Config, CopyOrchestrator, DynamodbClient, QueryMode, QueryRunner, QueryStats,
};
use std::process;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "dynamo")]
#[command(about = "Copy, query and restore DynamoDB tables across environments", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy a table or the items under a partition key from source to target
    Copy {
        /// Table to copy
        #[arg(short, long)]
        table: String,
        /// Partition key of the items to copy; copies the whole table when omitted
        #[arg(long)]
        pk: Option<String>,
        /// Sort key prefix of the items to copy
        #[arg(long, requires = "pk")]
        sk: Option<String>,
        /// Secondary index to query the items in
        #[arg(short, long, requires = "pk")]
        index: Option<String>,
        /// Environment to copy from
        #[arg(long)]
        source: String,
        /// Environment to wipe and repopulate
        #[arg(long)]
        target: String,
    },
    /// Query items in one environment
    Query {
        /// Table to query
        #[arg(short, long)]
        table: String,
        /// Partition key of the items
        #[arg(long)]
        pk: String,
        /// Sort key prefix of the items
        #[arg(long)]
        sk: Option<String>,
        /// Secondary index to query in
        #[arg(short, long)]
        index: Option<String>,
        /// Environment to query
        #[arg(short, long)]
        env: String,
        /// Print the first item as JSON
        #[arg(long)]
        head: bool,
        /// Print the unique string values of this attribute
        #[arg(short, long)]
        unique: Option<String>,
    },
    /// Refill a table from its backup table and drop the backup table
    Restore {
        /// Table to restore
        #[arg(short, long)]
        table: String,
        /// Backup table to copy from
        #[arg(short, long)]
        backup: String,
        /// Environment both tables live in
        #[arg(short, long)]
        env: String,
    },
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::new();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(err) = run(Cli::parse()).await {
        error!("{err:?}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::new();

    match cli.command {
        Commands::Copy {
            table,
            pk,
            sk,
            index,
            source,
            target,
        } => {
            let source = connect(&config, &source).await;
            let target = connect(&config, &target).await;
            let mut orchestrator = CopyOrchestrator::new(&config, source, target);

            match pk {
                Some(pk) => {
                    let request = query_request(&table, pk, sk, index);
                    orchestrator.copy_items(request, &table).await?;
                }
                None => orchestrator.copy_table(&table, &table).await?,
            }
        }
        Commands::Query {
            table,
            pk,
            sk,
            index,
            env,
            head,
            unique,
        } => {
            let client = connect(&config, &env).await;
            let mode = match unique {
                Some(name) => QueryMode::UniqueAttribute(name),
                None => QueryMode::Head,
            };

            let stats = QueryRunner::new(&config, client)
                .run(query_request(&table, pk, sk, index), mode)
                .await?;
            print_stats(stats, head)?;
        }
        Commands::Restore { table, backup, env } => {
            let client = connect(&config, &env).await;
            let mut orchestrator = CopyOrchestrator::new(&config, Arc::clone(&client), client);
            orchestrator.restore(&table, &backup).await?;
        }
    }

    Ok(())
}

async fn connect(config: &Config, name: &str) -> Arc<dyn Client> {
    let environment = config.environment(name);
    let client = DynamodbClient::builder(&environment).await.build();
    Arc::new(client)
}

fn query_request(
    table: &str,
    pk: String,
    sk: Option<String>,
    index: Option<String>,
) -> QueryRequest {
    QueryRequest::new(table, AttributeValue::S(pk))
        .set_sort_key(sk.map(SortKeyPredicate::BeginsWith))
        .set_index(index)
}

fn print_stats(stats: QueryStats, head: bool) -> Result<()> {
    let Some(first) = stats.first else {
        println!("No item was found.");
        return Ok(());
    };

    println!("{} items queried.", stats.count);

    if head {
        println!("{}", serde_json::to_string_pretty(&into_document(&first))?);
        println!("{}", "-".repeat(30));
    }

    if let Some(unique) = stats.unique {
        for value in unique {
            println!("{value}");
        }
    }

    Ok(())
}
