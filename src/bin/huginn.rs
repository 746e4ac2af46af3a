//! huginn: command-line client for a Joplin-style note server.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use futures_util::StreamExt;
use huginn::{
    CacheKind, FsStorageSink, HuginnClient, HuginnConfig, ResolveMode, ResolveProgress,
    SearchOptions, Secrets, progress_channel,
};

/// Huginn note server client
#[derive(Parser)]
#[command(name = "huginn")]
#[command(version = huginn::version::PKG_VERSION)]
#[command(about = "Search, preview and export notes from a Joplin-style note server")]
struct Args {
    /// Config file (default: ~/.huginn/config.toml, then /etc/huginn/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server base URL (overrides the config file)
    #[arg(long, env = "HUGINN_BASE_URL")]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check that the server is reachable
    Ping,

    /// Search notes
    Search {
        query: String,
        /// Page size per request
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
        /// Stop after this many results
        #[arg(short, long, default_value_t = 50)]
        max: usize,
    },

    /// Print a note, optionally resolving its embedded resources
    Note {
        id: String,
        /// Resolve resource references
        #[arg(long, value_enum)]
        resolve: Option<Mode>,
        /// Output directory for external resources
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },

    /// Show effective limits, queue and cache state
    Status,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Inline,
    External,
}

impl From<Mode> for ResolveMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Inline => ResolveMode::Inline,
            Mode::External => ResolveMode::External,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Default: warn; override with HUGINN_LOG or RUST_LOG.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("HUGINN_LOG")
                .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut config = HuginnConfig::load(args.config.as_deref())?;
    if let Some(url) = args.base_url {
        config.server.base_url = url;
    }
    let secrets = Secrets::load()?;

    let mut builder = config.to_builder(&secrets);
    if let Command::Note {
        resolve: Some(Mode::External),
        out,
        ..
    } = &args.command
    {
        builder = builder.storage_sink(Arc::new(FsStorageSink::new(out.clone())));
    }
    let client = builder.build()?;

    match args.command {
        Command::Ping => {
            if client.test_connection().await {
                println!("{}: reachable", config.server.base_url);
            } else {
                println!("{}: unreachable", config.server.base_url);
                return Ok(ExitCode::FAILURE);
            }
        }

        Command::Search { query, limit, max } => {
            let options = SearchOptions::new().limit(limit).max_results(max);
            let hits = client.search(&query, &options).await?;
            if hits.is_empty() {
                println!("no results");
            }
            for hit in hits {
                println!("{}  {}", hit.id, hit.title);
            }
        }

        Command::Note { id, resolve, .. } => {
            let Some(note) = client.get_note(&id).await? else {
                eprintln!("note {id} not found");
                return Ok(ExitCode::FAILURE);
            };

            println!("# {}", note.title);
            if !note.parent_id.is_empty()
                && let Some(folder) = client.get_folder(&note.parent_id).await?
            {
                println!("notebook: {}", folder.title);
            }
            let tags = client.get_note_tags(&note.id).await?;
            if !tags.is_empty() {
                let names: Vec<_> = tags.iter().map(|t| t.title.as_str()).collect();
                println!("tags: {}", names.join(", "));
            }
            println!();

            match resolve {
                Some(mode) => print_resolved(&client, &note.body, mode.into()).await?,
                None => println!("{}", note.body),
            }
        }

        Command::Status => {
            let status = serde_json::json!({
                "base_url": config.server.base_url,
                "reachable": client.test_connection().await,
                "limits": {
                    "max_concurrent_requests": config.limits.max_concurrent_requests,
                    "max_requests_per_minute": config.limits.max_requests_per_minute,
                },
                "queue": client.queue_status(),
                "cache": {
                    "results": client.cache_stats(CacheKind::Results),
                    "resources": client.cache_stats(CacheKind::Resources),
                },
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn print_resolved(
    client: &HuginnClient,
    body: &str,
    mode: ResolveMode,
) -> Result<(), Box<dyn std::error::Error>> {
    let (tx, mut events) = progress_channel(64);
    let reporter = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if let ResolveProgress::Resolved {
                resource_id,
                success,
                completed,
                total,
            } = event
            {
                let mark = if success { "ok" } else { "failed" };
                eprintln!("[{completed}/{total}] {resource_id} {mark}");
            }
        }
    });

    let resolved = client.resolve_body_with_progress(body, mode, tx).await?;
    let _ = reporter.await;

    println!("{}", resolved.body);
    eprintln!("{}", resolved.summary());
    for failure in resolved.failures() {
        if let Some(error) = &failure.error {
            eprintln!("  {}: {error}", failure.resource_id);
        }
    }
    Ok(())
}
