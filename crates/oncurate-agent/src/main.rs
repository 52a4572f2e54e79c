//! oncurate — curation review, history and annotation tooling.
//! Entry point for the command-line binary.

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use oncurate_annotation::{AnnotationCache, HttpAnnotator, MutationQuery};
use oncurate_common::time::parse_millis;
use oncurate_common::{Drug, GeneticType, Meta, StaticReferenceData};
use oncurate_history::{
    decode_vus_list, diff, get_all_gene_history_for_date_range, get_history_for_range, render, vus_rows,
    write_vus_tsv, DateRange, DiffMethod, DiffView, HistoryLog,
};
use oncurate_review::{compact, lock_state, needs_review, prune_to_pending, ReviewTreeBuilder};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "oncurate")]
#[command(about = "Review trees, change history and alteration annotation for curated genes")]
struct Cli {
    /// JSON list of drugs used to turn drug uuids into names
    #[arg(long, global = true)]
    drugs: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the review tree of a gene document
    ReviewTree {
        gene: PathBuf,
        meta: PathBuf,
        #[arg(long)]
        germline: bool,
        /// Keep only levels waiting for review
        #[arg(long)]
        pending: bool,
        /// Collapse single-child chains
        #[arg(long)]
        compact: bool,
    },
    /// Print whether a gene has anything waiting for review
    NeedsReview {
        gene: PathBuf,
        meta: PathBuf,
        #[arg(long)]
        germline: bool,
    },
    /// Print the grouped history download text
    History {
        history: PathBuf,
        /// Gene the log belongs to
        #[arg(long, required_unless_present = "all")]
        gene: Option<String>,
        /// Treat the file as a collection of logs keyed by gene
        #[arg(long)]
        all: bool,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        /// Render free-text changes as diffs in this view (defaults to history.diff_view)
        #[arg(long)]
        view: Option<DiffView>,
    },
    /// Print a rendered diff of two text files
    Diff {
        old: PathBuf,
        new: PathBuf,
        #[arg(long)]
        view: Option<DiffView>,
        /// Diff characters instead of words
        #[arg(long)]
        chars: bool,
    },
    /// Annotate mutation names against the configured annotator
    Annotate {
        hugo: String,
        #[arg(required = true)]
        mutations: Vec<String>,
    },
    /// Print the tab-separated VUS export
    VusExport { vus: PathBuf },
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn load_reference(path: Option<&Path>) -> anyhow::Result<StaticReferenceData> {
    let Some(path) = path else {
        return Ok(StaticReferenceData::new());
    };
    let drugs: Vec<Drug> = serde_json::from_value(read_json(path)?)
        .with_context(|| format!("{} is not a list of drugs", path.display()))?;
    info!(n_drugs = drugs.len(), "Loaded drug reference data");
    Ok(StaticReferenceData::new().with_drugs(drugs))
}

fn parse_bound(bound: Option<&str>) -> anyhow::Result<Option<i64>> {
    bound
        .map(|b| parse_millis(b).with_context(|| format!("Invalid date '{b}'")))
        .transpose()
}

/// `--view` when given, else the configured `[history] diff_view`.
fn history_view(flag: Option<DiffView>, config: &config::Config) -> DiffView {
    flag.unwrap_or(config.history.diff_view)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("oncurate=debug,info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match config::Config::load() {
        Ok(c) => c,
        Err(e) => {
            warn!("Could not load oncurate.toml, using defaults: {e}");
            let mut c = config::Config::default();
            c.apply_overrides(|key| std::env::var(key).ok());
            c
        }
    };
    let reference = load_reference(cli.drugs.as_deref())?;
    let configured_germline = config.review.genetic_type == GeneticType::Germline;

    match cli.command {
        Command::ReviewTree { gene, meta, germline, pending, compact: collapse } => {
            let document = read_json(&gene)?;
            let meta = Meta::from_snapshot(Some(&read_json(&meta)?))?;
            let tree = ReviewTreeBuilder::new(&reference).build(&document, &meta, germline || configured_germline);
            for issue in &tree.issues {
                warn!(issue = %issue, "Skipped malformed element");
            }
            let root = if pending { prune_to_pending(&tree.root) } else { Some(tree.root) };
            match root {
                Some(root) if collapse => print!("{}", compact(root).outline()),
                Some(root) => print!("{}", root.outline()),
                None => println!("Nothing to review"),
            }
        }
        Command::NeedsReview { gene, meta, germline } => {
            let document = read_json(&gene)?;
            let meta = Meta::from_snapshot(Some(&read_json(&meta)?))?;
            let tree = ReviewTreeBuilder::new(&reference).build(&document, &meta, germline || configured_germline);
            let lock = lock_state(&meta.review, &config.review.current_user);
            println!("{}", needs_review(&tree.root));
            println!("{}", serde_json::to_string(&lock)?);
        }
        Command::History { history, gene, all, start, end, view } => {
            let range = DateRange::new(parse_bound(start.as_deref())?, parse_bound(end.as_deref())?);
            let snapshot = read_json(&history)?;
            let grouped = match gene {
                Some(hugo) if !all => {
                    let log = HistoryLog::from_snapshot(Some(&snapshot));
                    for issue in &log.issues {
                        warn!(hugo = %hugo, issue = %issue, "Skipped history batch");
                    }
                    get_history_for_range(&hugo, &log, &reference, range)
                }
                _ => get_all_gene_history_for_date_range(Some(&snapshot), &reference, range),
            };
            println!("{}", grouped.to_download_text(Some(history_view(view, &config))));
        }
        Command::Diff { old, new, view, chars } => {
            let read = |p: &Path| std::fs::read_to_string(p).with_context(|| format!("Failed to read {}", p.display()));
            let method = if chars { DiffMethod::Chars } else { DiffMethod::Words };
            let spans = diff(&read(&old)?, &read(&new)?, method);
            println!("{}", render(&spans, history_view(view, &config)));
        }
        Command::Annotate { hugo, mutations } => {
            let annotator = Arc::new(HttpAnnotator::new(&config.annotation)?);
            let cache = AnnotationCache::new(annotator, config.annotation.clone());
            let queries: Vec<MutationQuery> = mutations.into_iter().map(MutationQuery::from_name).collect();
            let results = cache.fetch(&hugo, &queries).await;
            if let Some(error) = cache.error() {
                anyhow::bail!("Annotation failed: {error}");
            }
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Command::VusExport { vus } => {
            let (list, issues) = decode_vus_list(Some(&read_json(&vus)?));
            for issue in &issues {
                warn!(issue = %issue, "Skipped malformed VUS entry");
            }
            print!("{}", write_vus_tsv(&vus_rows(&list))?);
        }
    }

    Ok(())
}
