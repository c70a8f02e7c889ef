use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use console::style;
use distill_core::{
    ChatCompletionClient, FileCacheStore, Provider, SummarizerConfig, SummaryCoordinator,
    SummaryPipeline, SummaryRequest, Transcript, format_summary_readable, get_summary_cache_dir,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.0}m {:.0}s", (secs / 60.0).floor(), secs % 60.0)
    }
}

/// CLI wrapper for Provider enum (needed for clap ValueEnum)
#[derive(Clone, Default, ValueEnum)]
enum CliProvider {
    #[default]
    Grok,
    Openai,
    Gemini,
}

impl From<CliProvider> for Provider {
    fn from(cli: CliProvider) -> Self {
        match cli {
            CliProvider::Grok => Provider::Grok,
            CliProvider::Openai => Provider::Openai,
            CliProvider::Gemini => Provider::Gemini,
        }
    }
}

#[derive(Parser)]
#[command(name = "distill")]
#[command(about = "Summarize long transcripts into a consolidated, non-redundant summary")]
struct Cli {
    /// Transcript file: JSON with text/segments/language, or plain text
    transcript: PathBuf,

    /// Stable identifier of the source. Defaults to the transcript path.
    #[arg(long)]
    source_id: Option<String>,

    /// Title shown to the executive summary stage. Defaults to the source id.
    #[arg(short, long)]
    title: Option<String>,

    /// AI provider for summarization
    #[arg(short, long, default_value = "grok")]
    provider: CliProvider,

    /// Regenerate even if a cached summary exists
    #[arg(short, long)]
    force: bool,

    /// Config file (defaults to ~/.config/distill/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the summary as JSON instead of Markdown
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "distill=debug,distill_core=debug"
    } else {
        "distill=info,distill_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<SummarizerConfig> {
    let config = match path.or_else(SummarizerConfig::default_path) {
        Some(path) => SummarizerConfig::load_or_default(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => SummarizerConfig::default(),
    };
    Ok(config.with_env_overrides())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let provider: Provider = cli.provider.into();

    // Validate API key early
    let client = match ChatCompletionClient::new(provider) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            std::process::exit(1);
        }
    };
    let provider_name = client.provider().name();

    let config = load_config(cli.config)?;
    let transcript = Transcript::load(&cli.transcript)
        .await
        .with_context(|| format!("failed to read transcript {}", cli.transcript.display()))?;

    eprintln!(
        "\n{}  {}\n",
        style("distill").cyan().bold(),
        style("Transcript Summarizer").dim()
    );
    eprintln!(
        "{} Loaded transcript: {} chars, {}{}",
        style("✓").green().bold(),
        transcript.text.chars().count(),
        style(&transcript.language).yellow(),
        if transcript.has_timestamps() {
            format!(", {:.1} min", transcript.duration_seconds() / 60.0)
        } else {
            String::new()
        }
    );

    let source_id = cli
        .source_id
        .unwrap_or_else(|| cli.transcript.display().to_string());
    let mut request = SummaryRequest::new(source_id, transcript).force_regenerate(cli.force);
    if let Some(title) = cli.title {
        request = request.with_title(title);
    }

    let store = FileCacheStore::new(get_summary_cache_dir());
    tracing::debug!(cache_dir = %store.root().display(), "using summary cache");
    let coordinator = SummaryCoordinator::new(
        SummaryPipeline::new(Arc::new(client), config),
        Arc::new(store),
    );

    let start = Instant::now();
    let spinner = create_spinner(&format!("Summarizing with {}...", provider_name));
    let summary = coordinator.generate_summary(request).await;

    if !summary.success {
        spinner.finish_and_clear();
        eprintln!(
            "{} {}",
            style("Error:").red().bold(),
            summary.error.as_deref().unwrap_or("summary generation failed")
        );
        std::process::exit(1);
    }

    let status = if summary.cached {
        style("(cached)").dim().to_string()
    } else {
        style(format!("[{}]", format_duration(start.elapsed())))
            .dim()
            .to_string()
    };
    spinner.finish_with_message(format!(
        "{} Summarized: {} sections ({}) {}",
        style("✓").green().bold(),
        summary.sections.len(),
        provider_name,
        status
    ));
    if !summary.metadata.consolidated {
        eprintln!(
            "{} Consolidation pass skipped, summary may repeat itself",
            style("!").yellow().bold()
        );
    }
    eprintln!("{}\n", style("─".repeat(60)).dim());

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", format_summary_readable(&summary));
    }

    Ok(())
}
