//! loomgraph CLI — knowledge graph ingestion and hybrid retrieval engine.
//!
//! Usage:
//!   loomgraph box --file <in> [--output <out>] [--tag]
//!   loomgraph audit --file <src> --output <boxed>
//!   loomgraph ingest [--file <f> | --dir <d>] [--settings <path>]
//!   loomgraph daemon <start|stop|status>
//!   loomgraph harvest [<dir>]
//!   loomgraph mcp [--transport stdio] [--db path]

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use once_cell::sync::Lazy;
use regex::Regex;

use loomgraph::bento::BentoBoxer;
use loomgraph::config::Settings;
#[cfg(feature = "embeddings")]
use loomgraph::embed::FallbackEmbedder;
use loomgraph::embed::{Embedder, NullEmbedder};
use loomgraph::ingest::{parse_frontmatter, LexiconEntryJson};
use loomgraph::locus::LocusLedger;
use loomgraph::normalize::Normalizer;
use loomgraph::storage::{OpenStore, SqliteStore};
use loomgraph::Ingestor;

#[derive(Parser)]
#[command(name = "loomgraph", version, about = "Knowledge graph ingestion and hybrid retrieval engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Segment a Markdown file into bento boxes.
    Box {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
        /// Invoke the LLM oracle per box (defaults to a no-op stub).
        #[arg(long)]
        tag: bool,
    },
    /// Verify whitespace-normalized content equivalence between a source
    /// file and its boxed output.
    Audit {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Run the full ingestion pipeline.
    Ingest {
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        dir: Option<PathBuf>,
        #[arg(long, default_value = "polyvis.settings.json")]
        settings: PathBuf,
    },
    /// Lifecycle for the embedding HTTP service (out of core scope).
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },
    /// Emit a Markdown report of unknown `tag-<slug>` tokens.
    Harvest {
        dir: Option<PathBuf>,
        #[arg(long, default_value = "polyvis.settings.json")]
        settings: PathBuf,
    },
    /// Start the MCP (Model Context Protocol) server.
    Mcp {
        #[arg(long, default_value = "stdio")]
        transport: String,
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum DaemonAction {
    Start,
    Stop,
    Status,
}

/// Per-box auto-tagging collaborator. spec.md §7: "LLM failure -> return
/// empty tag set; never block." The default stub never succeeds, so
/// `--tag` is safe to pass with no provider configured.
trait LlmOracle {
    fn tag(&self, content: &str) -> Vec<String>;
}

struct NoopOracle;

impl LlmOracle for NoopOracle {
    fn tag(&self, _content: &str) -> Vec<String> {
        Vec::new()
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Box { file, output, tag } => cmd_box(&file, output.as_deref(), tag),
        Commands::Audit { file, output } => cmd_audit(&file, &output),
        Commands::Ingest { file, dir, settings } => cmd_ingest(file, dir, &settings).await,
        Commands::Daemon { action } => cmd_daemon(action),
        Commands::Harvest { dir, settings } => cmd_harvest(dir.as_deref(), &settings),
        Commands::Mcp { transport, db } => {
            if transport != "stdio" {
                eprintln!("error: only 'stdio' transport is currently supported");
                1
            } else {
                loomgraph::mcp::run_mcp_server(db)
            }
        }
    };
    std::process::exit(code);
}

fn cmd_box(file: &Path, output: Option<&Path>, tag: bool) -> i32 {
    let raw = match std::fs::read_to_string(file) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("❌ failed to read {}: {e}", file.display());
            return 1;
        }
    };

    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("untitled.md");
    let (frontmatter, body) = parse_frontmatter(&raw);
    let normalized = Normalizer::normalize(&body, filename);

    let ledger_path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| file.with_extension("locus.db"));
    let ledger = match LocusLedger::open(&ledger_path) {
        Ok(ledger) => ledger,
        Err(e) => {
            eprintln!("❌ failed to open locus ledger at {}: {e}", ledger_path.display());
            return 1;
        }
    };

    let boxer = BentoBoxer::default();
    let boxes = boxer.process(&ledger, &normalized);
    let oracle = NoopOracle;

    let mut rendered = String::new();
    if !frontmatter.is_empty() {
        rendered.push_str("---\n");
        for (key, value) in &frontmatter {
            let rendered_value = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
            rendered.push_str(&format!("{key}: {rendered_value}\n"));
        }
        rendered.push_str("---\n\n");
    }

    for b in &boxes {
        rendered.push_str(&format!("<!-- locus:{} -->\n", b.id));
        if tag {
            let tags = oracle.tag(&b.content);
            if !tags.is_empty() {
                let pairs: Vec<String> = tags.iter().map(|t| format!("[Tag: {t}]")).collect();
                rendered.push_str(&format!("<!-- tags: {} -->\n", pairs.join(", ")));
            }
        }
        rendered.push_str(&b.content);
        rendered.push_str("\n\n");
    }

    match output {
        Some(out) => {
            if let Err(e) = std::fs::write(out, &rendered) {
                eprintln!("❌ failed to write {}: {e}", out.display());
                return 1;
            }
        }
        None => print!("{rendered}"),
    }

    eprintln!("✅ boxed {} into {} box(es)", file.display(), boxes.len());
    0
}

static LOCUS_OR_TAGS_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^<!--\s*(locus|tags):[^\n]*-->[ \t]*\n?").unwrap());

fn cmd_audit(file: &Path, output: &Path) -> i32 {
    let src = match std::fs::read_to_string(file) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("❌ failed to read {}: {e}", file.display());
            return 1;
        }
    };
    let boxed = match std::fs::read_to_string(output) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("❌ failed to read {}: {e}", output.display());
            return 1;
        }
    };

    let stripped = LOCUS_OR_TAGS_MARKER.replace_all(&boxed, "");
    let normalize = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");

    if normalize(&src) == normalize(&stripped) {
        eprintln!("✅ {} and {} are content-equivalent", file.display(), output.display());
        0
    } else {
        eprintln!(
            "❌ {} and {} diverge after stripping locus/tags markers",
            file.display(),
            output.display()
        );
        1
    }
}

async fn cmd_ingest(file: Option<PathBuf>, dir: Option<PathBuf>, settings_path: &Path) -> i32 {
    let mut settings = match Settings::load(settings_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("❌ failed to load settings: {e}");
            return 1;
        }
    };

    if let Some(dir) = dir {
        settings.paths.sources.experience = vec![loomgraph::config::ExperienceSource { path: dir }];
    } else if let Some(file) = file {
        let parent = file.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        settings.paths.sources.experience = vec![loomgraph::config::ExperienceSource { path: parent }];
    }

    let store = match SqliteStore::open(&settings.paths.database.resonance) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("❌ failed to open store: {e}");
            return 1;
        }
    };
    let ledger_path = settings
        .paths
        .database
        .resonance
        .with_extension("locus.db");
    let ledger = match LocusLedger::open(&ledger_path) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("❌ failed to open locus ledger: {e}");
            return 1;
        }
    };
    let embedder = build_embedder();
    let ingestor = Ingestor::new(&store, &ledger, embedder.as_ref());

    match ingestor.run(&settings).await {
        Ok(report) => {
            eprintln!(
                "✅ ingested {} file(s): +{} nodes, +{} edges, +{} vectors, {} skipped, {} failed",
                report.stats.files_processed,
                report.stats.nodes_added,
                report.stats.edges_added,
                report.stats.vectors_added,
                report.stats.nodes_skipped,
                report.stats.files_failed,
            );
            eprintln!(
                "✅ finalization: +{} timeline edges, +{} semantic edges",
                report.timeline_edges, report.semantic_edges
            );
            for warning in &report.validation.warnings {
                eprintln!("⚠️ {warning}");
            }
            if report.validation.passed {
                eprintln!("✅ {}", report.validation.summary);
                0
            } else {
                for error in &report.validation.errors {
                    eprintln!("❌ {error}");
                }
                2
            }
        }
        Err(e) => {
            eprintln!("❌ ingestion failed: {e}");
            1
        }
    }
}

#[cfg(feature = "embeddings")]
fn build_embedder() -> Box<dyn Embedder> {
    match loomgraph::embed::local::FastEmbedEmbedder::new() {
        Ok(local) => Box::new(FallbackEmbedder::new(None, Box::new(local))),
        Err(_) => Box::new(NullEmbedder),
    }
}

#[cfg(not(feature = "embeddings"))]
fn build_embedder() -> Box<dyn Embedder> {
    Box::new(NullEmbedder)
}

fn cmd_daemon(action: DaemonAction) -> i32 {
    match action {
        DaemonAction::Start => {
            eprintln!("⚠️ daemon lifecycle is external to this crate; start the embedding service yourself");
            0
        }
        DaemonAction::Stop => {
            eprintln!("⚠️ daemon lifecycle is external to this crate; nothing to stop here");
            0
        }
        DaemonAction::Status => {
            eprintln!("⚠️ daemon lifecycle is external to this crate; status unknown");
            0
        }
    }
}

static TAG_STUB: Lazy<Regex> = Lazy::new(|| Regex::new(r"\btag-([a-z0-9-]+)\b").unwrap());

fn cmd_harvest(dir: Option<&Path>, settings_path: &Path) -> i32 {
    let settings = Settings::load(settings_path).unwrap_or_default();
    let known: std::collections::HashSet<String> = match std::fs::read_to_string(&settings.paths.sources.persona.lexicon) {
        Ok(raw) => serde_json::from_str::<Vec<LexiconEntryJson>>(&raw)
            .map(|entries| entries.into_iter().map(|e| e.id).collect())
            .unwrap_or_default(),
        Err(_) => Default::default(),
    };

    let roots: Vec<PathBuf> = match dir {
        Some(dir) => vec![dir.to_path_buf()],
        None => settings
            .paths
            .sources
            .experience
            .iter()
            .map(|s| s.path.clone())
            .collect(),
    };

    let mut unknown: std::collections::HashMap<String, Vec<String>> = std::collections::HashMap::new();
    for root in &roots {
        for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.path().extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(entry.path()) else {
                continue;
            };
            for cap in TAG_STUB.captures_iter(&content) {
                let slug = cap[1].to_string();
                if !known.contains(&slug) {
                    unknown
                        .entry(slug)
                        .or_default()
                        .push(entry.path().display().to_string());
                }
            }
        }
    }

    if unknown.is_empty() {
        println!("# Harvest report\n\nNo unknown `tag-<slug>` tokens found.");
        return 0;
    }

    println!("# Harvest report\n");
    let mut slugs: Vec<&String> = unknown.keys().collect();
    slugs.sort();
    for slug in slugs {
        let locations = &unknown[slug];
        println!("- `tag-{slug}` ({} occurrence(s))", locations.len());
        for loc in locations {
            println!("  - {loc}");
        }
    }
    0
}
