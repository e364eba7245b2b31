//! CLI entry point for irgraph.

use std::io::Read;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use irgraph_core::config::Settings;
use irgraph_core::program::ProgramGraph;
use irgraph_core::{demangle, TenantId};
use irgraph_graph::{GraphClient, GraphConfig, GraphStore, QueryGateway};

use irgraph_ingest::AnalysisJob;

#[derive(Parser)]
#[command(name = "irgraph")]
#[command(about = "Persist program graphs to Neo4j and query them per project")]
struct Cli {
    /// Config file prefix (default: irgraph).
    #[arg(short, long, default_value = "irgraph", global = true)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replace a project's stored graph with the given program graph.
    Ingest {
        /// Project id; a new one is generated when omitted.
        #[arg(short, long)]
        tenant: Option<String>,

        /// Program graph exported by the analysis frontend (JSON).
        #[arg(short, long)]
        graph: PathBuf,
    },

    /// Run a read query scoped to a project. Reads stdin when no query is given.
    Query {
        #[arg(short, long)]
        tenant: String,

        #[arg(short, long)]
        query: Option<String>,
    },

    /// List the tracked variables of a project.
    Tracked {
        #[arg(short, long)]
        tenant: String,
    },

    /// Delete every stored node of a project.
    Clear {
        #[arg(short, long)]
        tenant: String,
    },

    /// Print the readable form of mangled symbols.
    Demangle {
        #[arg(required = true)]
        symbols: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Command::Demangle { symbols } = &cli.command {
        for symbol in symbols {
            println!("{}", demangle(symbol));
        }
        return Ok(());
    }

    let settings = Settings::load(&cli.config)?;
    let client = GraphClient::connect(&GraphConfig::from(&settings.neo4j)).await?;

    match cli.command {
        Command::Ingest { tenant, graph } => {
            let tenant = tenant.map(TenantId::from).unwrap_or_default();
            let program = ProgramGraph::from_json_file(&graph)?;
            tracing::info!(tenant = %tenant, nodes = program.len(), "Starting analysis pass");

            let job = AnalysisJob::spawn(client, &settings, tenant, program);
            let mut status = job.subscribe();
            while status.changed().await.is_ok() {
                let current = status.borrow_and_update().clone();
                tracing::info!(tenant = %job.tenant(), status = current.stage_name(), "Status changed");
                if current.is_terminal() {
                    break;
                }
            }

            let report = job.wait().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Query { tenant, query } => {
            let query = match query {
                Some(q) => q,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };
            let gateway = QueryGateway::new(client, &settings.query);
            let data = gateway.query_graph(&TenantId::from(tenant), &query).await?;
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        Command::Tracked { tenant } => {
            let gateway = QueryGateway::new(client, &settings.query);
            for name in gateway.tracked_variables(&TenantId::from(tenant)).await? {
                println!("{name}");
            }
        }
        Command::Clear { tenant } => {
            let tenant = TenantId::from(tenant);
            let deleted = client.clear_tenant(&tenant).await?;
            println!("{deleted}");
        }
        Command::Demangle { .. } => {}
    }

    Ok(())
}
