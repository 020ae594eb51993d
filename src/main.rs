//! # gigpulse CLI Application
//!
//! This module implements the command-line interface for the driver stress
//! study jobs, one subcommand per job.
//!
//! ## Key Components
//!
//! - CLI argument parsing with clap
//! - Subcommands for the study jobs:
//!   - `load-drivers` / `load-rides`: replace the staging tables from CSV
//!   - `ingest-rss`: stream the entries of an RSS feed into the news table
//!   - `scrape-news`: download the articles of a feed to a local file
//!   - `ingest-articles`: stream a curated article file into the news table
//!   - `create-views`: create the generative AI views
//!   - `embed-reasons`: materialize the stress reason embeddings
//!   - `analyze`: explore the embedding table and write a report
//!
//! ## Features
//!
//! - Configuration from the environment (and `.env`), validated up front
//! - Progress output for long-running jobs
//! - Telemetry integration for monitoring

mod telemetry;

use clap::{Args, Parser, Subcommand};
use gigpulse::analysis::{AnalysisOptions, run_analysis};
use gigpulse::analysis::tsne::TsneOptions;
use gigpulse::catalog::Tables;
use gigpulse::config::Config;
use gigpulse::embedding::GeminiEmbedder;
use gigpulse::http::{HttpClient, RetryPolicy};
use gigpulse::news::{self, IngestReport, ScraperOptions};
use gigpulse::pipeline::{MaterializationJob, MaterializeOutcome, materialize};
use gigpulse::warehouse::{BigQuery, TableId};
use std::path::PathBuf;
use telemetry::OtelGuard;
use tracing::instrument;

#[derive(Parser)]
#[command(author, version, about = "Warehouse jobs for the rideshare driver stress study", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replace the drivers staging table with a CSV file
    LoadDrivers(CsvArgs),

    /// Replace the rides staging table with a CSV file
    LoadRides(CsvArgs),

    /// Stream the entries of an RSS feed into the news table
    IngestRss(IngestRssArgs),

    /// Download the articles linked from an RSS feed
    ScrapeNews(ScrapeNewsArgs),

    /// Stream a curated article file into the news content table
    IngestArticles(IngestArticlesArgs),

    /// Create the generative AI views
    CreateViews(CreateViewsArgs),

    /// Embed the driver stress reasons into the marts dataset
    EmbedReasons(EmbedReasonsArgs),

    /// Analyze the stress reason embeddings
    Analyze(AnalyzeArgs),
}

#[derive(Args, Debug)]
struct CsvArgs {
    /// CSV file with a header row
    #[arg(required = true)]
    path: PathBuf,
}

#[derive(Args, Debug)]
struct IngestRssArgs {
    /// Feed URL
    #[arg(required = true)]
    url: String,

    /// Destination table as project.dataset.table (default: the staging news feed table)
    #[arg(short, long)]
    table: Option<TableId>,
}

#[derive(Args, Debug)]
struct ScrapeNewsArgs {
    /// Feed URL
    #[arg(required = true)]
    url: String,

    /// Number of feed entries to download
    #[arg(short, long, default_value = "5")]
    max: usize,

    /// Output file (newline-delimited JSON)
    #[arg(short, long, default_value = "scraped_articles.ndjson")]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct IngestArticlesArgs {
    /// JSON file with an array of articles
    #[arg(required = true)]
    file: PathBuf,
}

#[derive(Args, Debug)]
struct CreateViewsArgs {
    /// Also snapshot the driver metrics view into its table
    #[arg(short, long)]
    materialize: bool,
}

#[derive(Args, Debug)]
struct EmbedReasonsArgs {
    /// Source table as project.dataset.table (default: the materialized driver metrics)
    #[arg(short, long)]
    source_table: Option<TableId>,

    /// Destination table as project.dataset.table
    #[arg(short, long)]
    destination_table: Option<TableId>,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Report file
    #[arg(short, long, default_value = "driver_reason_analysis.json")]
    output: PathBuf,

    /// Embedding table as project.dataset.table (default: the stress reason embeddings)
    #[arg(short, long)]
    table: Option<TableId>,

    /// Minimum cosine similarity for a graph edge
    #[arg(long, default_value = "0.8")]
    threshold: f32,

    /// Number of histogram bins
    #[arg(long, default_value = "20")]
    bins: usize,

    /// t-SNE perplexity
    #[arg(long, default_value = "30")]
    perplexity: f64,

    /// Seed for the projection and the layout
    #[arg(long, default_value = "42")]
    seed: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    let _otel: OtelGuard = telemetry::init_tracing_subscriber()?;

    // Execute the appropriate command
    match cli.command {
        Some(Commands::LoadDrivers(args)) => load_command(args, true).await?,
        Some(Commands::LoadRides(args)) => load_command(args, false).await?,
        Some(Commands::IngestRss(args)) => ingest_rss_command(args).await?,
        Some(Commands::ScrapeNews(args)) => scrape_news_command(args).await?,
        Some(Commands::IngestArticles(args)) => ingest_articles_command(args).await?,
        Some(Commands::CreateViews(args)) => create_views_command(args).await?,
        Some(Commands::EmbedReasons(args)) => embed_reasons_command(args).await?,
        Some(Commands::Analyze(args)) => analyze_command(args).await?,
        None => {
            // If no command is provided, show help
            let _ = Cli::parse_from(["gigpulse", "--help"]);
        }
    }

    Ok(())
}

/// Configuration, table ids and warehouse client shared by the warehouse jobs
fn warehouse_setup() -> anyhow::Result<(Config, Tables, BigQuery)> {
    let config = Config::from_env()?;
    let tables = Tables::new(&config);
    let warehouse = BigQuery::from_config(&config)?;
    Ok((config, tables, warehouse))
}

fn print_ingest_report(report: &IngestReport) {
    println!("Added {} rows", report.added);
    if !report.failed.is_empty() {
        println!("{} rows were rejected", report.failed.len());
    }
}

#[instrument(skip_all, fields(path = %args.path.display()))]
async fn load_command(args: CsvArgs, drivers: bool) -> anyhow::Result<()> {
    let (_, tables, warehouse) = warehouse_setup()?;

    let (table, summary) = if drivers {
        let summary = gigpulse::loader::load_drivers(&warehouse, &tables, &args.path).await?;
        (&tables.drivers_data, summary)
    } else {
        let summary = gigpulse::loader::load_rides(&warehouse, &tables, &args.path).await?;
        (&tables.rides_data, summary)
    };

    println!(
        "Loaded {} rows into {} (job {})",
        summary.output_rows, table, summary.job_id
    );
    Ok(())
}

#[instrument(skip_all, fields(url = %args.url))]
async fn ingest_rss_command(args: IngestRssArgs) -> anyhow::Result<()> {
    let (_, tables, warehouse) = warehouse_setup()?;
    let http = HttpClient::new(RetryPolicy::default())?;
    let table = args.table.unwrap_or_else(|| tables.rss_news.clone());

    println!("Fetching {}...", args.url);
    let report = news::rss::ingest_feed(&warehouse, &http, &args.url, &table).await?;
    print_ingest_report(&report);
    Ok(())
}

#[instrument(skip_all, fields(url = %args.url))]
async fn scrape_news_command(args: ScrapeNewsArgs) -> anyhow::Result<()> {
    let http = HttpClient::new(RetryPolicy::default())?;

    println!("Fetching {}...", args.url);
    let entries = news::rss::fetch_feed(&http, &args.url).await?;
    println!("Feed has {} entries", entries.len());

    let options = ScraperOptions {
        max_articles: args.max,
        ..ScraperOptions::default()
    };
    let articles = news::article::scrape_articles(&http, &entries, &options).await?;
    news::article::write_ndjson(&args.output, &articles).await?;

    println!(
        "Saved {} articles to {}",
        articles.len(),
        args.output.display()
    );
    Ok(())
}

#[instrument(skip_all, fields(file = %args.file.display()))]
async fn ingest_articles_command(args: IngestArticlesArgs) -> anyhow::Result<()> {
    let (_, tables, warehouse) = warehouse_setup()?;

    let report =
        news::curated::ingest_articles(&warehouse, &args.file, &tables.news_content).await?;
    print_ingest_report(&report);
    Ok(())
}

#[instrument(skip_all)]
async fn create_views_command(args: CreateViewsArgs) -> anyhow::Result<()> {
    let (config, tables, warehouse) = warehouse_setup()?;

    let written = gigpulse::views::create_views(
        &warehouse,
        &tables,
        &config.connection_path(),
        args.materialize,
    )
    .await?;
    println!("Created {} objects", written.len());
    Ok(())
}

#[instrument(skip_all)]
async fn embed_reasons_command(args: EmbedReasonsArgs) -> anyhow::Result<()> {
    let (config, tables, warehouse) = warehouse_setup()?;
    let embedder = GeminiEmbedder::new(config.genai_api_key()?.to_string())?;

    let mut job = MaterializationJob::driver_reasons(&tables);
    if let Some(source) = args.source_table {
        job.source_table = source;
    }
    if let Some(destination) = args.destination_table {
        job.destination_table = destination;
    }

    println!("Embedding {} from {}...", job.text_column, job.source_table);
    let report = materialize(&warehouse, &embedder, &job).await?;

    match report.outcome {
        MaterializeOutcome::SkippedEmpty => {
            println!(
                "No {} values found in {}; nothing was embedded or written.",
                job.text_column, job.source_table
            );
        }
        MaterializeOutcome::Written => {
            println!(
                "Embedded {} distinct texts in {} calls with {}",
                report.distinct_texts,
                report.provider_calls,
                report.model.as_deref().unwrap_or("unknown model")
            );
            println!(
                "Wrote {} rows to {}",
                report.written_rows, job.destination_table
            );
        }
    }
    Ok(())
}

#[instrument(skip_all, fields(output = %args.output.display()))]
async fn analyze_command(args: AnalyzeArgs) -> anyhow::Result<()> {
    let (_, tables, warehouse) = warehouse_setup()?;
    let reasons = MaterializationJob::driver_reasons(&tables);
    let table = args
        .table
        .unwrap_or_else(|| reasons.destination_table.clone());

    let options = AnalysisOptions {
        histogram_bins: args.bins,
        similarity_threshold: args.threshold,
        tsne: TsneOptions {
            perplexity: args.perplexity,
            seed: args.seed,
            ..TsneOptions::default()
        },
        ..AnalysisOptions::default()
    };

    run_analysis(
        &warehouse,
        &table,
        &reasons.id_column,
        &reasons.text_column,
        &options,
        &args.output,
    )
    .await?;
    Ok(())
}
