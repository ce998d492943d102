// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Juxta: side-by-side asset comparison
//!
//! Aligns several directories of renders into comparison rows and records
//! per-category votes and tags in a portable results file.

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use juxta::align::ComparisonRow;
use juxta::config::{AppConfig, ViewerSource};
use juxta::judgment::{RowFilter, VoteStatus, VoteSummary};
use juxta::key::normalize_key;
use juxta::snapshot;
use juxta::watcher::FileWatcher;
use juxta::Workspace;

/// Juxta CLI - side-by-side asset comparison
#[derive(Parser, Debug)]
#[command(name = "juxta")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Align asset collections into comparison rows and record judgments", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "juxta.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format for results
    #[arg(long, global = true, default_value = "text", value_parser = ["text", "json", "jsonl"])]
    format: String,

    /// Viewer as TITLE=PATH (repeatable, replaces configured viewers)
    #[arg(long = "viewer", global = true)]
    viewers: Vec<String>,

    /// Manifest file (overrides config)
    #[arg(long, global = true)]
    manifest: Option<PathBuf>,

    /// Results file (overrides config)
    #[arg(long, global = true)]
    results: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Align viewer directories and list the comparison rows
    Align,

    /// Show the matching key derived from raw paths
    Key {
        /// Paths including their root directory, e.g. renders/chair.png
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Toggle a vote for one category of a row
    Vote {
        /// Row key
        key: String,
        /// Vote category
        category: String,
        /// Viewer title, id, 1-based position, or all_bad
        value: String,
    },

    /// Set every category of a row at once
    BatchVote {
        /// Row key
        key: String,
        /// Viewer title, id, 1-based position, or all_bad
        #[arg(required_unless_present = "clear")]
        value: Option<String>,
        /// Clear all votes on the row instead
        #[arg(long, conflicts_with = "value")]
        clear: bool,
    },

    /// Edit a row's tags
    Tag {
        /// Row key
        key: String,
        #[command(subcommand)]
        action: TagCommands,
    },

    /// Summarize votes and tags
    Summary,

    /// List rows carrying all given tags, or any vote for a value
    Filter {
        /// Required tag (repeatable)
        #[arg(short, long)]
        tag: Vec<String>,
        /// Vote value: viewer title, id, position, or all_bad
        #[arg(long)]
        vote: Option<String>,
    },

    /// Check a manifest file and list its keys
    Manifest {
        /// Manifest JSON file
        file: PathBuf,
    },

    /// Manage vote categories
    Categories {
        #[command(subcommand)]
        action: CategoryCommands,
    },

    /// Watch viewer directories and realign on changes
    Watch,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Initialize a new comparison project
    Init {
        /// Directory to initialize (default: current)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Force overwrite existing configuration
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum TagCommands {
    /// Add tags (rejects tags already present)
    Add {
        #[arg(required = true)]
        tags: Vec<String>,
    },
    /// Remove tags
    Remove {
        #[arg(required = true)]
        tags: Vec<String>,
    },
    /// Replace all tags
    Set { tags: Vec<String> },
}

#[derive(Subcommand, Debug)]
enum CategoryCommands {
    /// List configured categories
    List,
    /// Add a category
    Add { name: String },
    /// Remove a category (existing votes are kept in results)
    Remove { name: String },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "juxta.json")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; RUST_LOG applies when no level flag is given
    let filter = match log_level(&cli) {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = AppConfig::load(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;
    apply_overrides(&mut config, &cli)?;

    match cli.command {
        Some(Commands::Align) | None => run_align(&config, &cli.format),
        Some(Commands::Key { paths }) => {
            for path in paths {
                let key = normalize_key(&path);
                if key.is_empty() {
                    println!("{}\t(no key)", path);
                } else {
                    println!("{}\t{}", path, key);
                }
            }
            Ok(())
        }
        Some(Commands::Vote { key, category, value }) => run_vote(&config, &key, &category, &value),
        Some(Commands::BatchVote { key, value, clear }) => {
            run_batch_vote(&config, &key, if clear { None } else { value })
        }
        Some(Commands::Tag { key, action }) => run_tag(&config, &key, action),
        Some(Commands::Summary) => run_summary(&config, &cli.format),
        Some(Commands::Filter { tag, vote }) => run_filter(&config, tag, vote, &cli.format),
        Some(Commands::Manifest { file }) => {
            let keys = snapshot::load_manifest(&file)
                .with_context(|| format!("reading manifest {}", file.display()))?;
            for key in &keys {
                println!("{}", key);
            }
            println!("\n{} keys", keys.len());
            Ok(())
        }
        Some(Commands::Categories { action }) => run_categories(config, action, &cli.config),
        Some(Commands::Watch) => run_watch(&config),
        Some(Commands::Config { action }) => run_config_command(&config, action, &cli.config),
        Some(Commands::Init { dir, force }) => run_init(dir, force),
    }
}

fn log_level(cli: &Cli) -> Option<&'static str> {
    if cli.trace {
        Some("trace")
    } else if cli.verbose {
        Some("debug")
    } else if cli.quiet {
        Some("warn")
    } else {
        None
    }
}

fn apply_overrides(config: &mut AppConfig, cli: &Cli) -> anyhow::Result<()> {
    if !cli.viewers.is_empty() {
        config.viewers = cli
            .viewers
            .iter()
            .map(|spec| ViewerSource::parse_override(spec))
            .collect::<juxta::Result<Vec<_>>>()?;
    }
    if let Some(manifest) = &cli.manifest {
        config.manifest = Some(manifest.to_string_lossy().into_owned());
    }
    if let Some(results) = &cli.results {
        config.results.path = results.to_string_lossy().into_owned();
    }
    Ok(())
}

/// Align the configured viewers and merge the results file if present
fn open_session(config: &AppConfig) -> anyhow::Result<Workspace> {
    let mut workspace = Workspace::open(config).context("aligning viewer directories")?;
    let results = config.results_path();
    if results.exists() {
        let text = std::fs::read_to_string(&results)
            .with_context(|| format!("reading results {}", results.display()))?;
        workspace
            .import_results(&text)
            .with_context(|| format!("importing results {}", results.display()))?;
    }
    Ok(workspace)
}

fn save_session(workspace: &Workspace, config: &AppConfig) -> anyhow::Result<()> {
    let path = config.results_path();
    snapshot::save(workspace.store(), &path, config.results.pretty)
        .with_context(|| format!("writing results {}", path.display()))?;
    Ok(())
}

fn row_json(workspace: &Workspace, row: &ComparisonRow) -> serde_json::Value {
    let assets: serde_json::Map<String, serde_json::Value> = workspace
        .viewers()
        .iter()
        .zip(&row.assets)
        .map(|(viewer, asset)| {
            let path = asset.as_ref().map(|a| a.path.clone());
            (viewer.title.clone(), serde_json::json!(path))
        })
        .collect();

    serde_json::json!({
        "key": row.key,
        "assets": assets,
        "votes": row.votes,
        "tags": row.tags,
        "status": VoteStatus::of(row),
    })
}

fn print_rows(workspace: &Workspace, rows: &[&ComparisonRow], format: &str) -> anyhow::Result<()> {
    match format {
        "json" => {
            let output: Vec<_> = rows.iter().map(|r| row_json(workspace, r)).collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        "jsonl" => {
            for row in rows {
                println!("{}", serde_json::to_string(&row_json(workspace, row))?);
            }
        }
        _ => {
            let titles: Vec<&str> = workspace.viewers().iter().map(|v| v.title.as_str()).collect();
            println!("key\t{}", titles.join("\t"));
            for row in rows {
                let paths: Vec<&str> = row
                    .assets
                    .iter()
                    .map(|a| a.as_ref().map_or("-", |a| a.path.as_str()))
                    .collect();
                println!("{}\t{}", row.key, paths.join("\t"));

                if !row.votes.is_empty() {
                    let votes: Vec<String> = row
                        .votes
                        .iter()
                        .map(|(cat, v)| format!("{}={}", cat, workspace.vote_label(v.as_str())))
                        .collect();
                    println!("  votes: {}", votes.join(", "));
                }
                if !row.tags.is_empty() {
                    println!("  tags: {}", row.tags.join(", "));
                }
            }
            println!("\n{} rows ({:?} mode)", rows.len(), workspace.mode());
        }
    }
    Ok(())
}

fn run_align(config: &AppConfig, format: &str) -> anyhow::Result<()> {
    let workspace = open_session(config)?;
    let rows: Vec<&ComparisonRow> = workspace.rows().iter().collect();
    print_rows(&workspace, &rows, format)
}

fn run_vote(config: &AppConfig, key: &str, category: &str, value: &str) -> anyhow::Result<()> {
    let mut workspace = open_session(config)?;
    if !workspace.categories().iter().any(|c| c == category) {
        bail!(
            "Unknown category '{}'. Configured: {}",
            category,
            workspace.categories().join(", ")
        );
    }
    let value = workspace.resolve_vote(value)?;
    match workspace.set_vote(key, category, value)? {
        Some(v) => println!("{} / {}: {}", key, category, workspace.vote_label(v.as_str())),
        None => println!("{} / {}: cleared", key, category),
    }
    save_session(&workspace, config)
}

fn run_batch_vote(config: &AppConfig, key: &str, value: Option<String>) -> anyhow::Result<()> {
    let mut workspace = open_session(config)?;
    let value = value.map(|v| workspace.resolve_vote(&v)).transpose()?;
    let label = value.as_ref().map(|v| workspace.vote_label(v.as_str()));
    workspace.set_batch_vote(key, value)?;
    match label {
        Some(label) => println!("{}: all categories -> {}", key, label),
        None => println!("{}: votes cleared", key),
    }
    save_session(&workspace, config)
}

fn run_tag(config: &AppConfig, key: &str, action: TagCommands) -> anyhow::Result<()> {
    let mut workspace = open_session(config)?;
    match action {
        TagCommands::Add { tags } => {
            for tag in &tags {
                workspace.add_tag(key, tag)?;
            }
        }
        TagCommands::Remove { tags } => {
            for tag in &tags {
                if !workspace.remove_tag(key, tag)? {
                    warn!("Row '{}' has no tag '{}'", key, tag);
                }
            }
        }
        TagCommands::Set { tags } => {
            let mut cleaned: Vec<String> = Vec::with_capacity(tags.len());
            for tag in tags {
                let tag = tag.trim().to_string();
                if tag.is_empty() {
                    continue;
                }
                if cleaned.contains(&tag) {
                    bail!("Tag '{}' given twice", tag);
                }
                cleaned.push(tag);
            }
            workspace.set_tags(key, cleaned)?;
        }
    }

    let tags = workspace.row(key).map(|r| r.tags.join(", ")).unwrap_or_default();
    println!("{}: [{}]", key, tags);
    save_session(&workspace, config)
}

fn print_summary(workspace: &Workspace, summary: &VoteSummary) {
    println!("Results Summary");
    println!("===============");
    println!("Voted rows: {} of {}", summary.voted, workspace.rows().len());

    println!("\nOverall:");
    for tally in &summary.totals {
        println!("  {:<24} {}", workspace.vote_label(&tally.value), tally.count);
    }

    for breakdown in &summary.breakdown {
        println!("\n{}:", breakdown.category);
        for tally in &breakdown.tallies {
            println!("  {:<24} {}", workspace.vote_label(&tally.value), tally.count);
        }
    }

    if !summary.tags.is_empty() {
        println!("\nTags:");
        for tally in &summary.tags {
            println!("  {:<24} {}", tally.value, tally.count);
        }
    }
}

fn run_summary(config: &AppConfig, format: &str) -> anyhow::Result<()> {
    let workspace = open_session(config)?;
    let summary = workspace.summary();
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
        "jsonl" => println!("{}", serde_json::to_string(&summary)?),
        _ => print_summary(&workspace, &summary),
    }
    Ok(())
}

fn run_filter(config: &AppConfig, tags: Vec<String>, vote: Option<String>, format: &str) -> anyhow::Result<()> {
    let workspace = open_session(config)?;
    let vote = vote.map(|v| workspace.resolve_vote(&v)).transpose()?;
    let filter = RowFilter { tags, vote };
    let rows = workspace.filter(&filter);
    print_rows(&workspace, &rows, format)
}

fn run_categories(mut config: AppConfig, action: CategoryCommands, config_path: &Path) -> anyhow::Result<()> {
    let mut store = juxta::judgment::JudgmentStore::new(config.categories.clone());
    match action {
        CategoryCommands::List => {
            for category in store.categories() {
                println!("{}", category);
            }
            return Ok(());
        }
        CategoryCommands::Add { name } => store.add_category(&name)?,
        CategoryCommands::Remove { name } => store.remove_category(&name)?,
    }

    config.categories = store.categories().to_vec();
    config
        .save(config_path)
        .with_context(|| format!("writing config {}", config_path.display()))?;
    println!("Categories: {}", config.categories.join(", "));
    Ok(())
}

/// Realign whenever a viewer directory changes, rewriting the results file
fn run_watch(config: &AppConfig) -> anyhow::Result<()> {
    let mut workspace = open_session(config)?;
    save_session(&workspace, config)?;

    let mut watcher = FileWatcher::new()?;
    for source in &config.viewers {
        if let Some(path) = &source.path {
            watcher
                .watch(Path::new(path))
                .with_context(|| format!("watching {}", path))?;
        }
    }
    if watcher.watched_paths().is_empty() {
        bail!("No viewer directories configured to watch");
    }

    let debounce = Duration::from_millis(config.watch.debounce_ms);
    info!("Watching {} viewer directories. Press Ctrl+C to stop.", watcher.watched_paths().len());

    loop {
        let changed = watcher.next_batch(Duration::from_secs(1), debounce);
        if changed.is_empty() {
            continue;
        }

        info!("{} files changed, realigning", changed.len());
        let report = workspace.reload(config)?;
        if !report.dropped.is_empty() {
            warn!("Judgments dropped for rows that disappeared: {:?}", report.dropped);
        }
        info!(
            "{} rows ({} carried over, {} new)",
            workspace.rows().len(),
            report.carried,
            report.fresh
        );
        save_session(&workspace, config)?;
    }
}

/// Run config commands
fn run_config_command(config: &AppConfig, action: ConfigCommands, config_path: &Path) -> anyhow::Result<()> {
    match action {
        ConfigCommands::Show => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        ConfigCommands::Generate { output } => {
            AppConfig::default().save(&output)?;
            println!("Generated config at {:?}", output);
        }
        ConfigCommands::Validate => {
            config.validate()?;
            println!("Configuration at {:?} is valid", config_path);
            for viewer in &config.viewers {
                println!("  Viewer: {} ({})", viewer.title, viewer.path.as_deref().unwrap_or("no directory"));
            }
            println!("  Categories: {}", config.categories.join(", "));
            println!("  Results: {}", config.results.path);
        }
    }
    Ok(())
}

/// Initialize a new comparison project
fn run_init(dir: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let target = dir.unwrap_or_else(|| PathBuf::from("."));
    let config_path = target.join("juxta.json");

    if config_path.exists() && !force {
        bail!("juxta.json already exists. Use --force to overwrite");
    }

    let mut config = AppConfig::default();
    for (viewer, name) in config.viewers.iter_mut().zip(["input", "old", "new"]) {
        let viewer_dir = target.join(name);
        std::fs::create_dir_all(&viewer_dir)
            .with_context(|| format!("creating {}", viewer_dir.display()))?;
        viewer.path = Some(viewer_dir.to_string_lossy().into_owned());
    }
    config.save(&config_path)?;

    println!("Juxta initialized in {:?}", target);
    println!("\nCreated:");
    println!("  - juxta.json");
    println!("  - input/ old/ new/");
    println!("\nNext steps:");
    println!("  1. Copy renders into the viewer directories");
    println!("  2. List rows: juxta align");
    println!("  3. Vote: juxta vote <KEY> Material new");
    println!("  (results go to {})", snapshot::export_filename(Utc::now()));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["juxta"]).unwrap();
        assert!(!cli.verbose);
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from("juxta.json"));
    }

    #[test]
    fn test_log_level_flags() {
        let cli = Cli::try_parse_from(["juxta"]).unwrap();
        assert_eq!(log_level(&cli), None);
        let cli = Cli::try_parse_from(["juxta", "-v", "summary"]).unwrap();
        assert_eq!(log_level(&cli), Some("debug"));
        let cli = Cli::try_parse_from(["juxta", "--trace", "-q"]).unwrap();
        assert_eq!(log_level(&cli), Some("trace"));
    }

    #[test]
    fn test_cli_vote_command() {
        let cli = Cli::try_parse_from([
            "juxta", "vote", "chair_01", "Texture", "all_bad", "--viewer", "Old=/tmp/old"
        ]).unwrap();

        assert_eq!(cli.viewers, vec!["Old=/tmp/old".to_string()]);
        match cli.command {
            Some(Commands::Vote { key, category, value }) => {
                assert_eq!(key, "chair_01");
                assert_eq!(category, "Texture");
                assert_eq!(value, "all_bad");
            }
            _ => panic!("Expected Vote command"),
        }
    }

    #[test]
    fn test_cli_batch_vote_clear() {
        let cli = Cli::try_parse_from(["juxta", "batch-vote", "chair", "--clear"]).unwrap();
        match cli.command {
            Some(Commands::BatchVote { key, value, clear }) => {
                assert_eq!(key, "chair");
                assert!(value.is_none());
                assert!(clear);
            }
            _ => panic!("Expected BatchVote command"),
        }

        assert!(Cli::try_parse_from(["juxta", "batch-vote", "chair"]).is_err());
    }

    #[test]
    fn test_cli_tag_and_filter() {
        let cli = Cli::try_parse_from(["juxta", "tag", "chair", "add", "blurry", "dark"]).unwrap();
        match cli.command {
            Some(Commands::Tag { key, action: TagCommands::Add { tags } }) => {
                assert_eq!(key, "chair");
                assert_eq!(tags, vec!["blurry".to_string(), "dark".to_string()]);
            }
            _ => panic!("Expected Tag add command"),
        }

        let cli = Cli::try_parse_from(["juxta", "--format", "json", "filter", "-t", "a", "--vote", "2"]).unwrap();
        assert_eq!(cli.format, "json");
        match cli.command {
            Some(Commands::Filter { tag, vote }) => {
                assert_eq!(tag, vec!["a".to_string()]);
                assert_eq!(vote.as_deref(), Some("2"));
            }
            _ => panic!("Expected Filter command"),
        }
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::try_parse_from([
            "juxta", "align", "--viewer", "A=/a", "--viewer", "B=/b", "--results", "out.json"
        ]).unwrap();
        let mut config = AppConfig::default();
        apply_overrides(&mut config, &cli).unwrap();

        assert_eq!(config.viewers.len(), 2);
        assert_eq!(config.viewers[1].title, "B");
        assert_eq!(config.results.path, "out.json");

        let bad = Cli::try_parse_from(["juxta", "align", "--viewer", "nopath"]).unwrap();
        assert!(apply_overrides(&mut AppConfig::default(), &bad).is_err());
    }
}
