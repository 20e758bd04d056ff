//! CLI entry point for photofind.
//!
//! Describes images with a multimodal model, stores the embedded descriptions
//! in a persistent vector store, and answers free-text queries against it.

use anyhow::Context;
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use photofind::config::{CONFIG_DIR, SETTINGS_FILE, Settings};
use photofind::display::{
    THEME, create_matches_table, create_progress_bar, create_skipped_table, with_spinner,
};
use photofind::io::{ExitCode, IngestSummary, JsonResponse, OutputFormat, ResponseMeta};
use photofind::pipeline::{
    IngestOptions, IngestReport, IngestionPipeline, QueryEngine, QueryOutcome, TracingObserver,
    expand_sources,
};
use photofind::providers::{self, EmbeddingGenerator};
use photofind::vector::{FlatIndex, RankingPolicy, VectorIndex};
use photofind::AppError;
use serde::Serialize;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Natural-language search over an image collection
#[derive(Parser)]
#[command(
    name = "photofind",
    version = env!("CARGO_PKG_VERSION"),
    about = "Natural-language image search",
    long_about = "Describe images with a multimodal model, embed the descriptions, and find images by what they show.",
    next_line_help = true,
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output, including every candidate score
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Initialize project
    #[command(about = "Set up .photofind directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration settings
    #[command(about = "Display effective settings (defaults, file and PF_ variables)")]
    Config,

    /// Describe, embed and store images
    #[command(
        about = "Ingest image files or directories into the store",
        after_help = "Examples:\n  photofind ingest ~/Pictures/trip\n  photofind ingest a.jpg b.png --json"
    )]
    Ingest {
        /// Image files or directories, in addition to ingestion.sources
        #[arg(num_args = 0..)]
        sources: Vec<PathBuf>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Search stored images
    #[command(
        about = "Find the stored images that best match a description",
        after_help = "Examples:\n  photofind query \"a dog on the beach\"\n  photofind query \"sunset\" --top-k 3 --json"
    )]
    Query {
        /// What the image shows
        text: String,

        /// Number of matches to return (overrides ranking.top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Ingest, then answer one query
    #[command(
        about = "Ingest configured and given sources, then answer one query",
        long_about = "Ingest every configured source plus the given ones, then read one query from --query or an interactive prompt and print the best match."
    )]
    Run {
        /// Image files or directories, in addition to ingestion.sources
        #[arg(num_args = 0..)]
        sources: Vec<PathBuf>,

        /// Query text; prompted for when omitted
        #[arg(short, long)]
        query: Option<String>,

        /// Number of matches to return (overrides ranking.top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    fn format(&self) -> OutputFormat {
        match self {
            Self::Ingest { json, .. } | Self::Query { json, .. } | Self::Run { json, .. } => {
                OutputFormat::from_json_flag(*json)
            }
            Self::Init { .. } | Self::Config => OutputFormat::Text,
        }
    }
}

#[derive(Serialize)]
struct RunOutput {
    ingest: IngestSummary,
    query: QueryOutcome,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let format = cli.command.format();

    match run(cli).await {
        Ok(()) => ExitCode::Success.into(),
        Err(error) => {
            report_error(&error, format);
            ExitCode::from_error(&error).into()
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let Cli {
        config,
        verbose,
        command,
    } = cli;
    let format = command.format();

    match command {
        Commands::Init { force } => {
            init_tracing(verbose);
            init(force)
        }
        Commands::Config => {
            let settings = load_settings(config.as_deref())?;
            init_tracing(verbose || settings.debug);
            show_config(&settings)
        }
        Commands::Ingest { sources, .. } => {
            let app = App::start(config.as_deref(), verbose)?;
            let report = app.ingest(sources, format).await?;
            if format.is_json() {
                app.print_json(IngestSummary::from(&report), ingest_message(&report))
            } else {
                print_report(&report);
                Ok(())
            }
        }
        Commands::Query { text, top_k, .. } => {
            let app = App::start(config.as_deref(), verbose)?;
            let engine = app.query_engine(top_k).await?;
            let outcome = engine.search(&text).await?;
            if format.is_json() {
                app.print_json(&outcome, outcome_message(&outcome))
            } else {
                print_outcome(&outcome, engine.policy());
                Ok(())
            }
        }
        Commands::Run {
            sources,
            query,
            top_k,
            ..
        } => {
            let app = App::start(config.as_deref(), verbose)?;
            let report = app.ingest(sources, format).await?;
            if !format.is_json() {
                print_report(&report);
            }

            let text = match query {
                Some(text) => text,
                None => prompt_query()?,
            };
            let engine = app.query_engine(top_k).await?;
            let outcome = engine.search(&text).await?;

            if format.is_json() {
                let message = outcome_message(&outcome);
                app.print_json(
                    RunOutput {
                        ingest: IngestSummary::from(&report),
                        query: outcome,
                    },
                    message,
                )
            } else {
                print_outcome(&outcome, engine.policy());
                Ok(())
            }
        }
    }
}

/// Settings plus the opened store, shared by the ingest and query commands.
struct App {
    settings: Settings,
    index: Arc<dyn VectorIndex>,
    embedder: OnceCell<Arc<dyn EmbeddingGenerator>>,
    started: Instant,
}

impl App {
    /// Loads settings and opens the store.
    ///
    /// The store is opened before any provider is built, so a model mismatch
    /// fails without touching the network.
    fn start(config: Option<&Path>, verbose: bool) -> Result<Self, AppError> {
        let started = Instant::now();
        let settings = load_settings(config)?;
        init_tracing(verbose || settings.debug || settings.query.verbose);

        settings.validate().map_err(|message| {
            AppError::config(
                message,
                format!("Fix the value in {CONFIG_DIR}/{SETTINGS_FILE} or the matching PF_ variable"),
            )
        })?;

        let store_path = settings.resolved_store_path();
        let index = FlatIndex::open(&store_path, &settings.embedding.qualified_model())?;
        tracing::info!(
            "Opened store at {} with {} records",
            store_path.display(),
            index.len()
        );

        Ok(Self {
            settings,
            index: Arc::new(index),
            embedder: OnceCell::new(),
            started,
        })
    }

    /// The embedding generator, built on first use and shared by ingest and query.
    async fn embedder(&self) -> Result<Arc<dyn EmbeddingGenerator>, AppError> {
        self.embedder
            .get_or_try_init(|| async {
                with_spinner("Loading embedding model", || {
                    providers::embedding_generator(&self.settings)
                })
            })
            .await
            .map(Arc::clone)
    }

    async fn ingest(
        &self,
        sources: Vec<PathBuf>,
        format: OutputFormat,
    ) -> Result<IngestReport, AppError> {
        let mut roots: Vec<PathBuf> = self
            .settings
            .ingestion
            .sources
            .iter()
            .map(|source| match &self.settings.workspace_root {
                Some(root) if source.is_relative() => root.join(source),
                _ => source.clone(),
            })
            .collect();
        roots.extend(sources);

        let files = expand_sources(&roots);
        if files.is_empty() {
            tracing::debug!("Nothing to ingest");
            return Ok(IngestReport::default());
        }

        let captioner = providers::caption_generator(&self.settings)?;
        let embedder = self.embedder().await?;
        let options = IngestOptions {
            concurrency: self.settings.ingestion.concurrency,
            caption_timeout: Duration::from_secs(self.settings.caption.timeout_secs),
            embedding_timeout: Duration::from_secs(self.settings.embedding.timeout_secs),
        };
        let pipeline =
            IngestionPipeline::new(Arc::clone(&self.index), captioner, embedder, options);

        if format.is_json() {
            return Ok(pipeline.ingest(files).await);
        }

        let progress = create_progress_bar(files.len() as u64, "Describing images");
        let report = pipeline.with_progress(progress.clone()).ingest(files).await;
        progress.finish_and_clear();
        Ok(report)
    }

    async fn query_engine(&self, top_k: Option<usize>) -> Result<QueryEngine, AppError> {
        let engine = QueryEngine::new(
            Arc::clone(&self.index),
            self.embedder().await?,
            self.settings.ranking.policy(),
        )
        .with_top_k(top_k.unwrap_or(self.settings.ranking.top_k).max(1))
        .with_timeout(Duration::from_secs(self.settings.embedding.timeout_secs));

        Ok(if self.settings.query.verbose {
            engine.with_observer(Arc::new(TracingObserver))
        } else {
            engine
        })
    }

    fn print_json<T: Serialize>(&self, data: T, message: String) -> Result<(), AppError> {
        let elapsed = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let response = JsonResponse::success(data)
            .with_message(message)
            .with_meta(ResponseMeta::now(Some(elapsed)));
        let rendered =
            serde_json::to_string_pretty(&response).context("Failed to render JSON output")?;
        println!("{rendered}");
        Ok(())
    }
}

fn init_tracing(debug: bool) {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    // Ignore the error when a subscriber is already installed
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .try_init();
}

fn load_settings(config: Option<&Path>) -> Result<Settings, AppError> {
    let loaded = match config {
        Some(path) => {
            if !path.is_file() {
                return Err(AppError::config(
                    format!("Settings file not found: {}", path.display()),
                    "Check the --config path or run 'photofind init'",
                ));
            }
            Settings::load_from(path)
        }
        None => Settings::load(),
    };

    loaded.map_err(|e| {
        AppError::config(
            e.to_string(),
            "Check the TOML syntax and any PF_ environment variables",
        )
    })
}

fn init(force: bool) -> Result<(), AppError> {
    let dir = std::env::current_dir().map_err(|source| AppError::Io {
        action: "read the current directory",
        source,
    })?;
    let config_path = dir.join(CONFIG_DIR).join(SETTINGS_FILE);

    if config_path.exists() && !force {
        return Err(AppError::config(
            format!(
                "Configuration file already exists at: {}",
                config_path.display()
            ),
            "Use --force to overwrite",
        ));
    }

    let path = Settings::init_config_file(&dir, force)
        .map_err(|e| anyhow::anyhow!("Failed to write the settings file: {e}"))?;

    println!(
        "{}",
        THEME.success_with_icon(&format!("Created configuration file at: {}", path.display()))
    );
    println!("Edit this file to customize your settings.");
    println!(
        "{}",
        THEME.apply(
            &THEME.dim,
            "The API key is read from PF_API_KEY (or API_KEY), never from the file."
        )
    );
    Ok(())
}

fn show_config(settings: &Settings) -> Result<(), AppError> {
    let rendered = toml::to_string_pretty(settings).context("Failed to render settings")?;

    println!("{}", THEME.apply(&THEME.header, "Current Configuration:"));
    println!("{}", "=".repeat(50));
    println!("{rendered}");
    println!(
        "Store:   {}",
        THEME.apply(&THEME.path, settings.resolved_store_path().display())
    );
    println!(
        "API key: {}",
        if settings.api_key().is_some() {
            THEME.apply(&THEME.success, "set")
        } else {
            THEME.apply(&THEME.warning, "not set")
        }
    );
    Ok(())
}

/// Reads one line of query text from stdin after prompting on stderr.
fn prompt_query() -> Result<String, AppError> {
    let io_error = |source| AppError::Io {
        action: "read the query",
        source,
    };

    eprint!("{} ", THEME.apply(&THEME.header, "Enter your query:"));
    std::io::stderr().flush().map_err(io_error)?;

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line).map_err(io_error)?;
    Ok(line.trim().to_string())
}

fn score_label(policy: RankingPolicy) -> &'static str {
    match policy {
        RankingPolicy::Cosine => "Similarity",
        RankingPolicy::Threshold { .. } => "Distance",
    }
}

fn ingest_message(report: &IngestReport) -> String {
    format!(
        "Stored {} image(s), skipped {}",
        report.stored.len(),
        report.skipped.len()
    )
}

fn outcome_message(outcome: &QueryOutcome) -> String {
    match outcome {
        QueryOutcome::Found(matches) => format!("Found {} match(es)", matches.len()),
        QueryOutcome::NoMatch => "No image found matching your query.".to_string(),
        QueryOutcome::EmptyIndex => "No images have been ingested yet.".to_string(),
    }
}

fn print_report(report: &IngestReport) {
    if report.total() == 0 {
        return;
    }

    println!(
        "{}",
        THEME.success_with_icon(&format!("Stored {} image(s)", report.stored.len()))
    );
    if !report.skipped.is_empty() {
        eprintln!(
            "{}",
            THEME.warning_with_icon(&format!("Skipped {} image(s):", report.skipped.len()))
        );
        eprintln!("{}", create_skipped_table(report));
    }
}

fn print_outcome(outcome: &QueryOutcome, policy: RankingPolicy) {
    match outcome {
        QueryOutcome::Found(matches) => {
            let title = if matches.len() == 1 {
                "Best match:"
            } else {
                "Best matches:"
            };
            println!("{}", THEME.apply(&THEME.header, title));
            println!("{}", create_matches_table(matches, score_label(policy)));
        }
        QueryOutcome::NoMatch => println!("No image found matching your query."),
        QueryOutcome::EmptyIndex => {
            println!("No image found matching your query.");
            println!(
                "{}",
                THEME.apply(
                    &THEME.dim,
                    "The store is empty. Ingest images first with 'photofind ingest <DIR>'."
                )
            );
        }
    }
}

fn report_error(error: &AppError, format: OutputFormat) {
    if format.is_json() {
        match serde_json::to_string_pretty(&JsonResponse::from_error(error)) {
            Ok(rendered) => println!("{rendered}"),
            Err(e) => eprintln!("Error: {error} (JSON rendering failed: {e})"),
        }
        return;
    }

    eprintln!("{}", THEME.error_with_icon(&error.to_string()));
    for suggestion in error.recovery_suggestions() {
        eprintln!("  {}", THEME.apply(&THEME.dim, format!("- {suggestion}")));
    }
}
