//! CLI for Knowledge Architect: Map of Content generation over an Obsidian
//! vault's Smart Connections embeddings.
//!
//! Subcommands:
//!  - `generate` : rank a note's neighbours, ask Gemini for a MOC draft and
//!    render it through the user's template.
//!  - `similar`  : print the notes most similar to a given note.
//!  - `stats`    : print what the embedding store loader found.
//!
//! Usage examples:
//!  knowledge-architect generate -p "UPSC/GS2/Polity.md"
//!  knowledge-architect similar "UPSC/GS2/Polity.md" --top-k 10 --granularity block --json
//!  knowledge-architect --config ~/vault.toml stats

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::debug;

use knowledge_architect::{find_similar, load_index, utils::logging, EmbeddingIndex, Granularity};

mod config;
mod console;
mod gemini;
mod moc;
mod pipeline;
mod prompt;

use crate::config::{AppConfig, DEFAULT_CONFIG_FILE};
use crate::console::Activity;
use crate::gemini::GeminiClient;
use crate::pipeline::{build_moc, MocJob, MocOutcome};

/// CLI entrypoint.
#[derive(Parser)]
#[command(
    name = "knowledge-architect",
    about = "Knowledge Architect: Maps of Content from Smart Connections embeddings",
    version
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, value_name = "PATH", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Enable debug logging on stderr (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Subcommands
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a Map of Content for a note and its closest neighbours.
    Generate(GenerateArgs),

    /// List the notes most similar to a note.
    Similar(SimilarArgs),

    /// Show embedding store statistics.
    Stats(StatsArgs),
}

/// Arguments for the `generate` subcommand.
#[derive(Args, Debug)]
struct GenerateArgs {
    /// Vault-relative path of the note to process (prompted for when omitted).
    #[arg(short = 'p', long = "process-file", value_name = "REL_PATH")]
    process_file: Option<String>,

    /// Number of neighbours to include (defaults to `[retrieval].top_k`).
    #[arg(long)]
    top_k: Option<usize>,

    /// Query granularity: note|block (defaults to `[retrieval].granularity`).
    #[arg(long)]
    granularity: Option<Granularity>,

    /// Print the rendered MOC instead of writing it.
    #[arg(long)]
    dry_run: bool,
}

/// Arguments for the `similar` subcommand.
#[derive(Args, Debug)]
struct SimilarArgs {
    /// Vault-relative path of the note (block keys `note.md#Heading` are accepted).
    #[arg(value_name = "REL_PATH")]
    note: String,

    /// Number of results to return.
    #[arg(long)]
    top_k: Option<usize>,

    /// Query granularity: note|block.
    #[arg(long)]
    granularity: Option<Granularity>,

    /// Emit JSON instead of a plain list.
    #[arg(long)]
    json: bool,
}

/// Arguments for the `stats` subcommand.
#[derive(Args, Debug)]
struct StatsArgs {
    /// Emit JSON instead of plain text.
    #[arg(long)]
    json: bool,
}

/// Application entry point.
fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = AppConfig::load(&cli.config)?;
    debug!(
        config = %cli.config.display(),
        vault = %config.paths.vault_path.display(),
        "loaded config"
    );

    match cli.command {
        Commands::Generate(args) => run_generate(&config, args),
        Commands::Similar(args) => run_similar(&config, args),
        Commands::Stats(args) => run_stats(&config, args),
    }
}

/// Load the vault's embedding index.
fn load_vault_index(config: &AppConfig) -> Result<EmbeddingIndex> {
    let vault = &config.paths.vault_path;
    load_index(vault, &config.loader_config())
        .with_context(|| format!("loading embedding store of vault {}", vault.display()))
}

/// Load the vault's embedding index with a spinner.
fn open_index(config: &AppConfig) -> Result<EmbeddingIndex> {
    let activity = Activity::start("Loading embedding store");
    match load_vault_index(config) {
        Ok(index) => {
            activity.finish("Embedding store loaded.");
            Ok(index)
        }
        Err(err) => {
            activity.abandon();
            Err(err)
        }
    }
}

/// Run the `generate` subcommand.
///
/// Config problems (API key, template, save path) are reported before the
/// store is loaded so a misconfigured run fails fast.
fn run_generate(config: &AppConfig, args: GenerateArgs) -> Result<()> {
    let api_key = config.api_key()?;
    let template_path = config.moc_template_path()?;
    let template = fs::read_to_string(template_path)
        .with_context(|| format!("MOC template file not found at {}", template_path.display()))?;
    let save_dir = config.moc_save_path()?;

    console::banner();
    let index = open_index(config)?;
    console::loaded(index.note_count(), index.block_count());

    let target = match args.process_file {
        Some(path) => {
            let path = console::clean_path_input(&path);
            console::processing(&path);
            path
        }
        None => console::prompt_path(
            "Enter the relative path of the new note (e.g., 'UPSC/GS2/Polity.md')",
        )?,
    };

    let generator = GeminiClient::new(
        api_key,
        &config.gemini.model_name,
        Duration::from_secs(config.gemini.timeout_secs),
    )
    .context("building Gemini client")?;

    let job = MocJob {
        vault: &config.paths.vault_path,
        index: &index,
        template: &template,
        top_k: args.top_k.unwrap_or(config.retrieval.top_k),
        granularity: args.granularity.unwrap_or(config.retrieval.granularity),
        now: Local::now().naive_local(),
    };

    match build_moc(&job, &target, &generator)? {
        MocOutcome::Rendered(moc) if args.dry_run => {
            println!("\n--- {} ---\n{}", moc.file_name, moc.content);
        }
        MocOutcome::Rendered(moc) => {
            let path = moc::save_moc(save_dir, &moc).map_err(|err| {
                console::error("Failed to save file.");
                err
            })?;
            console::success(&path.display().to_string());
        }
        MocOutcome::NoConnections => console::warning(
            "No strong connections found. Consider refining your note or adding more context.",
        ),
        MocOutcome::NoReadableConnections => {
            console::warning("No readable content from connected notes. Cannot generate MOC.")
        }
    }
    Ok(())
}

/// Run the `similar` subcommand.
fn run_similar(config: &AppConfig, args: SimilarArgs) -> Result<()> {
    let index = load_vault_index(config)?;

    let input = console::clean_path_input(&args.note);
    let key = index
        .resolve_key(&input)
        .or_else(|| index.block(&input).map(|b| b.key.as_str()))
        .ok_or_else(|| anyhow!("note '{}' not found in the embedding store", input))?;

    let top_k = args.top_k.unwrap_or(config.retrieval.top_k);
    let granularity = args.granularity.unwrap_or(config.retrieval.granularity);
    let result = find_similar(&index, key, top_k, granularity)
        .with_context(|| format!("ranking notes similar to '{key}'"))?;

    if args.json {
        let out = json!({
            "target": key,
            "granularity": result.granularity,
            "matches": result.matches,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if result.is_empty() {
        console::warning("No similar notes found.");
        return Ok(());
    }
    println!(
        "Top {} notes similar to {:?} ({} granularity):",
        result.len(),
        key,
        result.granularity
    );
    for (i, m) in result.iter().enumerate() {
        println!("{}. {} (score: {:.4})", i + 1, m.key, m.score);
    }
    Ok(())
}

/// Run the `stats` subcommand.
fn run_stats(config: &AppConfig, args: StatsArgs) -> Result<()> {
    let index = load_vault_index(config)?;
    let stats = index.stats();

    if args.json {
        let out = json!({
            "notes": index.note_count(),
            "blocks": index.block_count(),
            "vectors": index.vector_count(),
            "note_dim": index.note_dim(),
            "block_dim": index.block_dim(),
            "embedding_model": index.embedding_model(),
            "load": stats,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!(
        "Embedding store: {} notes, {} blocks, {} vectors",
        index.note_count(),
        index.block_count(),
        index.vector_count()
    );
    println!(
        "Dimensions: note = {}, block = {}",
        dim_label(index.note_dim()),
        dim_label(index.block_dim())
    );
    println!("Embedding model: {}", index.embedding_model().unwrap_or("-"));
    println!(
        "Files scanned: {}, fragments parsed: {}, fragments skipped: {}",
        stats.files_scanned, stats.fragments_parsed, stats.fragments_skipped
    );
    println!(
        "Records skipped: {}, missing vectors: {}, dimension mismatches: {}, \
         orphaned blocks: {}, deleted: {}",
        stats.records_skipped,
        stats.missing_vectors,
        stats.dimension_mismatches,
        stats.orphaned_blocks,
        stats.deleted_records
    );
    Ok(())
}

fn dim_label(dim: Option<usize>) -> String {
    dim.map_or_else(|| "-".to_string(), |d| d.to_string())
}
