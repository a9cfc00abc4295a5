mod corpus;
mod db;
mod embedding;
mod fetcher;
mod parser;
mod store;

use std::collections::BTreeMap;
use std::time::Instant;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tracing::warn;

use embedding::EmbeddingClient;
use parser::ProgramRecord;
use store::{ProgramInput, VectorStore};

const DATA_DIR: &str = "data";

#[derive(Parser)]
#[command(
    name = "abit_kb",
    about = "ITMO admissions knowledge base: fetch program pages, build a vector index, search it"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch program pages and curriculum PDFs into the local cache
    Fetch,
    /// Parse cached pages and rebuild the vector database
    Build,
    /// Fetch + build in one pipeline
    Run,
    /// Semantic search over the built corpus
    Search {
        /// Free-text query
        query: String,
        /// Max results to return
        #[arg(short = 'k', long, default_value_t = store::DEFAULT_TOP_K)]
        top_k: usize,
        /// Similarity cut-off; results at or below it are dropped
        #[arg(short, long, default_value_t = store::DEFAULT_MIN_SCORE)]
        min_score: f32,
    },
    /// Show cache and corpus statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Fetch => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            run_fetch(&conn).await
        }
        Commands::Build => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            run_build(&conn).await
        }
        Commands::Run => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            run_fetch(&conn).await?;
            run_build(&conn).await
        }
        Commands::Search {
            query,
            top_k,
            min_score,
        } => run_search(&query, top_k, min_score).await,
        Commands::Stats => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            run_stats(&conn)
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Fetch program pages, then chase each page's curriculum PDF.
async fn run_fetch(conn: &Connection) -> Result<()> {
    let client = fetcher::http_client()?;

    let pages = fetcher::fetch_program_pages(&client).await;
    let ok = pages.iter().filter(|p| p.html.is_some()).count();
    for row in &pages {
        db::save_page(conn, row)?;
    }
    println!("Fetched {} pages ({} ok, {} errors)", pages.len(), ok, pages.len() - ok);

    for page in pages.iter().filter(|p| p.html.is_some()) {
        let html = page.html.as_deref().unwrap_or_default();
        let Some(record) = parser::parse_program(&page.key, &page.url, html) else {
            continue;
        };
        let Some(info) = record.curriculum_info else {
            continue;
        };
        let link = match fetcher::resolve_link(&page.url, &info.link) {
            Ok(link) => link,
            Err(e) => {
                warn!("Skipping curriculum for {}: {}", page.key, e);
                continue;
            }
        };
        match fetcher::fetch_curriculum_text(&client, &link).await {
            Ok(text) => {
                db::save_curriculum(conn, &page.key, &link, Some(&text), None)?;
                println!("Cached curriculum for {} ({} chars)", page.key, text.chars().count());
            }
            Err(e) => {
                warn!("Curriculum fetch failed for {}: {}", page.key, e);
                db::save_curriculum(conn, &page.key, &link, None, Some(&e.to_string()))?;
            }
        }
    }

    Ok(())
}

/// Parse cached pages into records and rebuild the vector database wholesale.
async fn run_build(conn: &Connection) -> Result<()> {
    let pages = db::fetch_pages(conn)?;
    if pages.is_empty() {
        println!("No cached pages. Run 'fetch' first.");
        return Ok(());
    }

    let mut programs = Vec::new();
    for page in &pages {
        let html = page.html.as_deref().unwrap_or_default();
        let Some(record) = parser::parse_program(&page.key, &page.url, html) else {
            continue;
        };
        let curriculum = db::fetch_curriculum_text(conn, &page.key)?
            .map(|text| parser::curriculum::extract(&text))
            .filter(|table| !table.is_empty());
        programs.push(ProgramInput { record, curriculum });
    }
    if programs.is_empty() {
        println!("No cached page produced a usable record.");
        return Ok(());
    }

    save_records(&programs)?;

    let store = VectorStore::new(EmbeddingClient::from_env(), DATA_DIR);
    let count = store.build(&programs).await?;
    println!("Indexed {} documents from {} programs.", count, programs.len());
    Ok(())
}

async fn run_search(query: &str, top_k: usize, min_score: f32) -> Result<()> {
    let store = VectorStore::new(EmbeddingClient::from_env(), DATA_DIR);
    if !store.load()? {
        println!("No vector database found. Run 'build' first.");
        return Ok(());
    }

    let hits = store.search(query, top_k, min_score).await?;
    if hits.is_empty() {
        println!("No relevant context found.");
        return Ok(());
    }

    println!("{:>2} | {:<5} | {:<10} | {:<16} | Document", "#", "Score", "Program", "Type");
    println!("{}", "-".repeat(110));
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{:>2} | {:<5.3} | {:<10} | {:<16} | {}",
            i + 1,
            hit.score,
            hit.metadata.program,
            hit.metadata.doc_type,
            truncate(&hit.document, 70)
        );
    }
    Ok(())
}

fn run_stats(conn: &Connection) -> Result<()> {
    let s = db::get_stats(conn)?;
    println!("Programs:  {}", s.programs);
    println!("Pages:     {}", s.pages);
    println!("Errors:    {}", s.errors);
    println!("Curricula: {}", s.curricula);

    let store = VectorStore::new(EmbeddingClient::from_env(), DATA_DIR);
    match store.load_summary() {
        Some(summary) => {
            println!("Corpus:    {} documents, built {}", summary.documents, summary.built_at);
            for (program, types) in &summary.programs {
                let parts: Vec<String> =
                    types.iter().map(|(t, n)| format!("{} {}", n, t)).collect();
                println!("  {}: {}", program, parts.join(", "));
            }
        }
        None => println!("Corpus:    not built"),
    }
    Ok(())
}

/// Keep the parsed records next to the corpus for inspection.
fn save_records(programs: &[ProgramInput]) -> Result<()> {
    let map: BTreeMap<&str, &ProgramRecord> = programs
        .iter()
        .map(|p| (p.record.key.as_str(), &p.record))
        .collect();
    std::fs::create_dir_all(DATA_DIR)?;
    std::fs::write(
        format!("{DATA_DIR}/programs.json"),
        serde_json::to_string_pretty(&map)?,
    )?;
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
