use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::*;
use tokio::sync::watch;

mod client;
mod config;
mod detector;
mod matcher;
mod orchestrator;
mod output;
mod rules;
mod search;
mod stats;
mod types;

use crate::client::{GitLabClient, RepoClient};
use crate::config::{Config, SearchBatch};
use crate::detector::VersionDetector;
use crate::matcher::{CompiledMatcher, SearchSpec};
use crate::orchestrator::Orchestrator;
use crate::output::{ConsoleStreamer, FileLogger, LogFormat, ResultSink};
use crate::rules::RuleRegistry;
use crate::search::ContentScanner;
use crate::types::Project;

#[derive(Parser)]
#[command(name = "forgescan")]
#[command(about = "Scan GitLab groups for declared runtime versions and content matches", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Group to scan (overrides config)
    #[arg(short, long)]
    group: Option<String>,

    /// Maximum projects scanned at once
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Output format
    #[arg(short = 'o', long, value_enum)]
    output: Option<OutputFormat>,

    /// Append results to this file
    #[arg(long)]
    log_file: Option<String>,

    /// Log file format
    #[arg(long, value_enum)]
    log_format: Option<LogFormatArg>,

    /// Only print projects with something to report
    #[arg(short, long)]
    quiet: bool,

    /// Show extra detail (matched text, active rules)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect each project's declared runtime version
    Detect {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Search file contents across all projects
    Search {
        /// Literal term or regex to search for
        term: String,

        /// Treat the term as a regular expression
        #[arg(short, long)]
        regex: bool,

        /// Case-insensitive matching
        #[arg(short, long)]
        ignore_case: bool,

        /// Only scan files matching these globs (repeatable)
        #[arg(short = 'p', long = "file-pattern")]
        file_patterns: Vec<String>,

        /// Lines of context around each match
        #[arg(short = 'C', long, default_value_t = 0)]
        context: usize,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Run every search defined in a YAML or JSON batch file
    Batch {
        /// Path to the batch file
        path: String,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Generate example configuration files
    InitConfig {
        /// Path to write the config file
        #[arg(default_value = ".forgescan.toml")]
        path: String,

        /// Force overwrite existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Detect { common } => run_detect(common).await,
        Commands::Search {
            term,
            regex,
            ignore_case,
            file_patterns,
            context,
            common,
        } => {
            let spec = SearchSpec {
                term,
                is_regex: regex,
                case_sensitive: !ignore_case,
                file_patterns,
                context_lines: context,
            };
            run_search(vec![(None, spec)], common).await
        }
        Commands::Batch { path, common } => {
            let batch = SearchBatch::load(&path)?;
            let specs = batch
                .searches
                .into_iter()
                .map(|s| (Some(s.name), s.spec))
                .collect();
            run_search(specs, common).await
        }
        Commands::InitConfig { path, force } => run_init_config(&path, force),
    }
}

/// Shared setup: config, client, project listing, shutdown wiring.
struct Run {
    config: Config,
    client: Arc<dyn RepoClient>,
    projects: Vec<Project>,
    orchestrator: Orchestrator,
    sinks: Vec<Arc<dyn ResultSink>>,
    output: OutputFormat,
}

async fn prepare(common: &CommonArgs) -> Result<Run> {
    let mut config = Config::load_default()?;

    if let Some(group) = &common.group {
        config.group = Some(group.clone());
    }
    if let Some(concurrency) = common.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(log_file) = &common.log_file {
        config.log_file = Some(log_file.clone());
    }

    let group = config
        .group
        .clone()
        .context("no group configured; pass --group or set `group` in .forgescan.toml")?;

    let token = config.token();
    if token.is_none() {
        eprintln!(
            "{}: {} is not set, scanning anonymously",
            "warning".yellow(),
            config.token_env
        );
    }

    let client = GitLabClient::new(
        &config.base_url,
        &group,
        token.as_deref(),
        config.scan_ref.clone(),
    )?;
    let client: Arc<dyn RepoClient> = Arc::new(client);

    // Listing failure is fatal: nothing to scan.
    let mut projects = client
        .list_projects()
        .await
        .context("cannot list projects for the configured group")?;
    projects.retain(|p| !config.is_excluded(&p.path_with_namespace));

    let output = common.output.unwrap_or(OutputFormat::Text);

    let mut sinks: Vec<Arc<dyn ResultSink>> = Vec::new();
    if matches!(output, OutputFormat::Text) {
        sinks.push(Arc::new(ConsoleStreamer::new(common.quiet, common.verbose)));
    }
    if let Some(log_file) = &config.log_file {
        let format = common
            .log_format
            .map(LogFormat::from)
            .unwrap_or(match config.log_format.as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Text,
            });
        sinks.push(Arc::new(FileLogger::open(
            std::path::Path::new(log_file),
            format,
        )?));
    }

    let orchestrator = Orchestrator::new(config.concurrency, shutdown_on_ctrl_c());

    Ok(Run {
        config,
        client,
        projects,
        orchestrator,
        sinks,
        output,
    })
}

/// A watch channel flipped by ctrl-c so in-flight scans fail fast instead
/// of hanging.
fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n{}", "interrupted, finishing up...".yellow());
            let _ = tx.send(true);
        }
    });
    rx
}

async fn run_detect(common: CommonArgs) -> Result<()> {
    let run = prepare(&common).await?;

    let registry = Arc::new(RuleRegistry::default_rules());
    let detector = Arc::new(VersionDetector::new(Arc::clone(&registry))?);

    if matches!(run.output, OutputFormat::Text) {
        if common.verbose {
            let files: Vec<&str> = registry.enabled().iter().map(|r| r.target_file).collect();
            println!("Active rules: {}", files.join(", "));
        }
        println!(
            "Scanning {} projects (concurrency {})...\n",
            run.projects.len().to_string().bold(),
            run.config.concurrency
        );
    }

    let (counts, results) = run
        .orchestrator
        .run_detect(run.client, detector, run.projects, run.sinks)
        .await?;

    match run.output {
        OutputFormat::Json => {
            let mut results = results;
            results.sort_by_key(|r| r.index);
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        OutputFormat::Text => {
            print!("{}", counts.render());
        }
    }

    Ok(())
}

async fn run_search(specs: Vec<(Option<String>, SearchSpec)>, common: CommonArgs) -> Result<()> {
    // Compile every spec before touching any project, so a bad pattern in
    // a batch aborts the whole run up front.
    let mut compiled = Vec::with_capacity(specs.len());
    for (name, spec) in specs {
        let matcher = CompiledMatcher::compile(&spec)
            .with_context(|| match &name {
                Some(name) => format!("search {:?} failed to compile", name),
                None => "search term failed to compile".to_string(),
            })?;
        compiled.push((name, spec, Arc::new(matcher)));
    }

    let run = prepare(&common).await?;

    for (name, spec, matcher) in compiled {
        if matches!(run.output, OutputFormat::Text) {
            match &name {
                Some(name) => println!(
                    "Searching {} projects for {} ({})...\n",
                    run.projects.len().to_string().bold(),
                    spec.term.bold(),
                    name
                ),
                None => println!(
                    "Searching {} projects for {}...\n",
                    run.projects.len().to_string().bold(),
                    spec.term.bold()
                ),
            }
        }

        let scanner = Arc::new(ContentScanner::new(matcher, spec.context_lines));
        let (counts, results) = run
            .orchestrator
            .run_search(
                Arc::clone(&run.client),
                scanner,
                run.projects.clone(),
                run.sinks.clone(),
            )
            .await?;

        match run.output {
            OutputFormat::Json => {
                let mut results = results;
                results.sort_by_key(|r| r.index);
                println!("{}", serde_json::to_string_pretty(&results)?);
            }
            OutputFormat::Text => {
                print!("{}", counts.render());
            }
        }
    }

    Ok(())
}

fn run_init_config(path: &str, force: bool) -> Result<()> {
    let path = std::path::Path::new(path);

    if path.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }

    std::fs::write(path, crate::config::EXAMPLE_CONFIG)?;

    println!("Created configuration file at: {}", path.display());
    println!("\nEdit this file to point forgescan at your GitLab group.");
    println!("An example batch search file looks like:\n");
    println!("{}", crate::config::EXAMPLE_BATCH);

    Ok(())
}
