use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use docqa_core::config::Config;
use docqa_query::{DocQa, IngestRequest, QueryRequest};

#[derive(Debug, Parser)]
#[command(name = "docqa", about = "Ask questions against ingested documents")]
struct Cli {
    /// Directory holding config.toml; relative data paths resolve against it.
    #[arg(long, env = "DOCQA_BASE_DIR", default_value = ".")]
    base_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ingest .txt files (directories are walked recursively).
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Only valid with a single file.
        #[arg(long)]
        document_id: Option<String>,
        #[arg(long)]
        domain: Option<String>,
        #[arg(long)]
        total_pages: Option<u32>,
        /// Replace the document if `--document-id` already exists.
        #[arg(long)]
        replace: bool,
    },
    Ask {
        question: String,
        #[arg(long)]
        document: Option<String>,
        #[arg(long)]
        max_results: Option<usize>,
        #[arg(long)]
        domain: Option<String>,
        /// Print the full response as JSON.
        #[arg(long)]
        json: bool,
    },
    Delete {
        document_id: String,
    },
    List {
        #[arg(long)]
        domain: Option<String>,
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    Chunks {
        document_id: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    Stats,
    /// Drop soft-deleted rows from the vector index.
    Compact,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load_in(&cli.base_dir).map_err(|e| {
        eprintln!("Error loading config: {e}");
        e
    })?;
    let settings = config.settings()?;
    let qa = DocQa::open(&settings, &cli.base_dir)?;

    match cli.command {
        Command::Ingest { paths, document_id, domain, total_pages, replace } => {
            ingest(&qa, &paths, document_id, domain, total_pages, replace)
        }
        Command::Ask { question, document, max_results, domain, json } => {
            let request = QueryRequest { query: question, document_id: document, domain, max_results };
            let response = qa.orchestrator().process_query(&request);
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
                return Ok(());
            }
            println!("{}", response.answer);
            if let Some(decision) = response.decision {
                println!("\nDecision: {decision:?} (confidence {:.2})", response.rationale.confidence_score);
            }
            for (i, m) in response.matched_clauses.iter().enumerate() {
                let snippet: String = m.clause_text.chars().take(160).collect();
                println!("\n  {}. score={:.4}  {}", i + 1, m.relevance_score, m.clause_id);
                println!("     {snippet}");
            }
            if response.is_degraded() {
                println!("\n(fallback used for: {:?})", response.degraded_stages);
            }
            Ok(())
        }
        Command::Delete { document_id } => {
            if qa.ingestor().delete_document(&document_id)? {
                println!("Deleted {document_id}");
            } else {
                println!("No document {document_id}");
            }
            Ok(())
        }
        Command::List { domain, limit } => {
            for d in qa.ingestor().list_documents(domain.as_deref(), limit)? {
                println!(
                    "{}  {:?}  chunks={}  {}  {}",
                    d.document_id,
                    d.processing_status,
                    d.total_chunks,
                    d.upload_timestamp.format("%Y-%m-%d %H:%M"),
                    d.filename
                );
            }
            Ok(())
        }
        Command::Chunks { document_id, limit } => {
            let chunks = qa.ingestor().get_document_chunks(&document_id, limit)?;
            if chunks.is_empty() {
                println!("No chunks for {document_id}");
            }
            for c in chunks {
                println!(
                    "[{}] words={} page={} section={}",
                    c.chunk_id,
                    c.word_count,
                    c.page_number.map_or_else(|| "-".to_string(), |p| p.to_string()),
                    c.section.as_deref().unwrap_or("-")
                );
                println!("    phrases: {}", c.key_phrases.join(", "));
            }
            Ok(())
        }
        Command::Stats => {
            let s = qa.stats()?;
            println!("slots:     {}", s.total_slots);
            println!("live:      {}", s.live_entries);
            println!("deleted:   {}", s.deleted_entries);
            println!("documents: {}", s.unique_documents);
            println!("dimension: {}", s.dimension);
            Ok(())
        }
        Command::Compact => {
            let removed = qa.compact()?;
            println!("Removed {removed} deleted rows");
            Ok(())
        }
    }
}

fn ingest(
    qa: &DocQa,
    paths: &[PathBuf],
    document_id: Option<String>,
    domain: Option<String>,
    total_pages: Option<u32>,
    replace: bool,
) -> Result<()> {
    let files = collect_text_files(paths);
    if document_id.is_some() && files.len() != 1 {
        bail!("--document-id needs exactly one input file, found {}", files.len());
    }
    if replace && document_id.is_none() {
        bail!("--replace needs --document-id");
    }

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files ({percent}%) {msg}")?
            .progress_chars("#>-"),
    );

    let mut failed = 0usize;
    for file in &files {
        pb.set_message(file.display().to_string());
        let text = fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
        let filename = file.file_name().map_or_else(|| file.display().to_string(), |n| n.to_string_lossy().into_owned());
        let request = IngestRequest {
            document_id: document_id.clone(),
            filename,
            text,
            domain: domain.clone(),
            total_pages,
        };
        let result = match (&document_id, replace) {
            (Some(id), true) => qa.ingestor().replace_document(id, request),
            _ => qa.ingestor().ingest(request),
        };
        match result {
            Ok(info) => pb.println(format!("{}  {} chunks  {}", info.document_id, info.total_chunks, file.display())),
            Err(e) => {
                failed += 1;
                pb.println(format!("failed: {}: {e:#}", file.display()));
            }
        }
        pb.inc(1);
    }
    pb.finish_with_message("done");

    println!("Ingested {} of {} files", files.len() - failed, files.len());
    Ok(())
}

fn collect_text_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        for entry in WalkDir::new(path).sort_by_file_name().into_iter().filter_map(Result::ok) {
            if entry.file_type().is_file() && is_text_file(entry.path()) {
                files.push(entry.into_path());
            }
        }
    }
    files
}

fn is_text_file(path: &Path) -> bool {
    path.extension().is_some_and(|e| e.eq_ignore_ascii_case("txt"))
}
