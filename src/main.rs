use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use codelore_core::Config;
use codelore_core::bootstrap::{Services, resolve_config_path};
use codelore_graph::{EstablishRelationsRequest, IngestRequest};
use codelore_index::{DocsAnswer, Importance, Retrieval};
use codelore_index::retriever::{NO_REFERENCES, format_as_context};

/// Build a code knowledge graph from a TypeScript/JavaScript codebase and
/// answer questions against it.
#[derive(Debug, Parser)]
#[command(name = "codelore", version)]
struct Cli {
    /// Configuration file; falls back to `CODELORE_CONFIG`, then `config/codelore.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Purge the graph and ingest every source file under a directory.
    Ingest { root: PathBuf },
    /// Add Markdown documentation under a directory to the graph.
    IngestDocs { root: PathBuf },
    /// Embed and commit a JSON `{batchID, nodes}` batch.
    IngestBatch { file: PathBuf },
    /// Create the edges listed in a JSON `{relations}` file.
    EstablishRelations { file: PathBuf },
    /// Delete every node and edge and recreate the vector indexes.
    Purge,
    /// Retrieve nodes relevant to a query.
    Query {
        query: String,
        /// Treat the query as a code snippet and find similar code.
        #[arg(long, conflicts_with = "docs")]
        similar: bool,
        /// Search documentation instead of code.
        #[arg(long)]
        docs: bool,
    },
    /// Answer a question using retrieved code as context.
    Ask {
        question: String,
        /// Answer from documentation and list its sources.
        #[arg(long)]
        docs: bool,
    },
    /// Degree-based importance and size of the symbol best matching a name.
    Importance { query: String },
    /// Run the HTTP gateway until interrupted.
    #[cfg(feature = "gateway")]
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    config.validate()?;

    let services = Services::from_config(&config);
    run(cli.command, &config, &services).await
}

#[cfg_attr(not(feature = "gateway"), allow(unused_variables))]
async fn run(command: Command, config: &Config, services: &Services) -> anyhow::Result<()> {
    match command {
        Command::Ingest { root } => {
            ensure_dir(&root)?;
            let report = services.pipeline.ingest_codebase(&root).await?;
            print_json(&report)?;
            if !report.failed_batches.is_empty() {
                tracing::warn!(failed = ?report.failed_batches, "some batches were not committed");
            }
        }
        Command::IngestDocs { root } => {
            ensure_dir(&root)?;
            let report = services.pipeline.ingest_docs(&root).await?;
            print_json(&report)?;
        }
        Command::IngestBatch { file } => {
            let request: IngestRequest = read_json(&file)?;
            let response = services.pipeline.ingest_request(request).await;
            print_json(&response)?;
            if !response.is_ok() {
                bail!("batch {} was rolled back", response.batch_id);
            }
        }
        Command::EstablishRelations { file } => {
            let request: EstablishRelationsRequest = read_json(&file)?;
            let report = services.pipeline.establish_relations(&request.relations).await;
            print_json(&report)?;
        }
        Command::Purge => {
            services.pipeline.purge().await?;
            println!("graph purged");
        }
        Command::Query {
            query,
            similar,
            docs,
        } => {
            let retrieval = if similar {
                services.retriever.find_similar(&query).await?
            } else if docs {
                services.retriever.find_docs(&query).await?
            } else {
                services.retriever.find_code(&query).await?
            };
            println!("{}", render_retrieval(&retrieval));
        }
        Command::Ask {
            question,
            docs: false,
        } => {
            let answer = services.retriever.ask(&question).await?;
            println!("{answer}");
        }
        Command::Ask {
            question,
            docs: true,
        } => {
            let answer = services.retriever.ask_docs(&question).await?;
            println!("{}", render_docs_answer(&answer));
        }
        Command::Importance { query } => match services.retriever.importance(&query).await? {
            Some(report) => println!("{}", render_importance(&report)),
            None => bail!("no symbol matches {query}, cannot calculate its importance"),
        },
        #[cfg(feature = "gateway")]
        Command::Serve => serve(config, services).await?,
    }
    Ok(())
}

#[cfg(feature = "gateway")]
async fn serve(config: &Config, services: &Services) -> anyhow::Result<()> {
    use std::sync::Arc;

    use codelore_gateway::GatewayServer;
    use tokio::sync::watch;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e:#}");
            return;
        }
        tracing::info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let gw = &config.gateway;
    GatewayServer::new(
        &gw.bind,
        gw.port,
        Arc::clone(&services.pipeline),
        Arc::clone(&services.retriever),
        shutdown_rx,
    )
    .with_auth(gw.auth_token.clone())
    .with_rate_limit(gw.rate_limit)
    .with_max_body_size(gw.max_body_size)
    .serve()
    .await?;
    Ok(())
}

fn ensure_dir(root: &Path) -> anyhow::Result<()> {
    if !root.is_dir() {
        bail!("{} is not a directory", root.display());
    }
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_retrieval(retrieval: &Retrieval) -> String {
    match retrieval {
        Retrieval::NoKeywords => NO_REFERENCES.to_owned(),
        Retrieval::NoMatches { keywords } => {
            format!("{NO_REFERENCES}\nkeywords: {}", keywords.join(", "))
        }
        Retrieval::Found { keywords, hits } => {
            format!("keywords: {}\n{}", keywords.join(", "), format_as_context(hits))
        }
    }
}

fn render_docs_answer(answer: &DocsAnswer) -> String {
    if answer.sources.is_empty() {
        return answer.answer.clone();
    }
    let sources: Vec<_> = answer.sources.iter().map(|s| format!("- {s}")).collect();
    format!("{}\n\nsources:\n{}", answer.answer, sources.join("\n"))
}

fn render_importance(report: &Importance) -> String {
    format!(
        "{}\n1. Criticality: {}%\n2. Centrality: {}%\n3. Importance: {}%\n4. LOC: {}",
        report.node_id,
        Importance::percent(report.criticality),
        Importance::percent(report.centrality),
        Importance::percent(report.importance),
        report.loc
    )
}
