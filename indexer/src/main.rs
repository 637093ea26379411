use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use lexis_core::tokenizer::{Analyzer, SpanishAnalyzer};
use lexis_core::{IndexHandle, IngestReport, DEFAULT_MAX_HITS};
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "lexis-indexer")]
#[command(about = "Build, extend and query a plain-text inverted index", long_about = None)]
struct Cli {
    /// Index directory
    #[arg(long, default_value = "./index", global = true)]
    index: PathBuf,
    /// Disable Spanish stemming (must match the setting used to build the index)
    #[arg(long, default_value_t = false, global = true)]
    no_stem: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the index from every .txt file directly inside a directory
    Create {
        /// Directory holding the documents
        #[arg(long)]
        docs: PathBuf,
    },
    /// Add documents to an existing index
    Append {
        /// Files to add
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Run a query
    Search {
        query: String,
        /// Maximum number of hits
        #[arg(long, default_value_t = DEFAULT_MAX_HITS)]
        max_hits: usize,
        /// Print results as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Exact frequency of a term in one document
    Freq {
        term: String,
        doc_id: u32,
    },
    /// Document and term counts
    Stats,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let analyzer: Arc<dyn Analyzer> = if cli.no_stem {
        Arc::new(SpanishAnalyzer::without_stemming())
    } else {
        Arc::new(SpanishAnalyzer::new())
    };

    match cli.command {
        Commands::Create { docs } => create_index(&cli.index, analyzer, &docs),
        Commands::Append { files } => append_files(&cli.index, analyzer, &files),
        Commands::Search { query, max_hits, json } => search(&cli.index, analyzer, &query, max_hits, json),
        Commands::Freq { term, doc_id } => {
            let handle = IndexHandle::open(&cli.index, analyzer)?;
            if handle.snapshot().doc(doc_id).is_none() {
                bail!("no document with id {doc_id}");
            }
            println!("{}", handle.exact_term_frequency(&term, doc_id));
            Ok(())
        }
        Commands::Stats => {
            let snapshot = IndexHandle::open(&cli.index, analyzer)?.snapshot();
            println!("documents: {}", snapshot.document_count());
            println!("terms: {}", snapshot.num_terms());
            Ok(())
        }
    }
}

/// `*.txt` files directly inside `dir`, sorted so ids are assigned reproducibly.
fn discover_txt(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && p.extension().and_then(|s| s.to_str()) == Some("txt"))
        .collect();
    files.sort();
    files
}

fn create_index(index: &Path, analyzer: Arc<dyn Analyzer>, docs: &Path) -> Result<()> {
    if !docs.is_dir() {
        bail!("{} is not a directory", docs.display());
    }
    let files = discover_txt(docs);
    tracing::info!(docs = %docs.display(), files = files.len(), "discovered documents");
    let handle = IndexHandle::new(index, analyzer);
    let mut writer = handle.create()?;
    let report = writer.add_files(&files);
    print_report(&report);
    let info = writer.commit()?;
    println!("Indexing complete: {} documents (generation {}).", info.meta.num_docs, info.meta.generation);
    Ok(())
}

fn append_files(index: &Path, analyzer: Arc<dyn Analyzer>, files: &[PathBuf]) -> Result<()> {
    let handle = IndexHandle::new(index, analyzer);
    let mut writer = handle.append()?;
    let report = writer.add_files(files);
    print_report(&report);
    let info = writer.commit()?;
    println!("Added {} documents; index now holds {}.", info.added, info.meta.num_docs);
    Ok(())
}

fn print_report(report: &IngestReport) {
    for (path, err) in &report.failed {
        eprintln!("[{}] {}: {}", err.kind(), path, err);
    }
}

fn search(index: &Path, analyzer: Arc<dyn Analyzer>, query: &str, max_hits: usize, json: bool) -> Result<()> {
    let handle = IndexHandle::open(index, analyzer)?;
    let results = match handle.search(query, max_hits) {
        Ok(results) => results,
        Err(e) => bail!("[{}] {}", e.kind(), e),
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }
    println!("Searching \"{}\": {} hits.", query, results.total_hits);
    for (i, hit) in results.hits.iter().enumerate() {
        println!("{}. {}\tScore: {}", i + 1, hit.path, hit.score);
        if let Some(freq) = hit.frequency {
            println!("Frequency: {freq}");
        }
    }
    Ok(())
}
