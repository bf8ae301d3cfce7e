//! Session Review - Reconstruct and review agent session logs.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use session_review::config::{ConfigLoader, ReviewConfig};
use session_review::conversation::{
    ConversationView, DirSource, LoadPhase, ReadState, ResolveInputs, SessionSource, SourceError,
};
use session_review::danger::{self, DangerMap, DangerRules};
use session_review::progress::ProgressStore;
use session_review::registry::SpawnRegistry;
use session_review::render::{self, TextRenderer};
use session_review::server::ReviewServer;
use session_review::session::{
    message_entries, parse_session_content, session_header, visible_entries,
};

#[derive(Parser)]
#[command(
    name = "session-review",
    about = "Reconstruct and review agent session logs",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file to use instead of the default search paths.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List session logs with message, unread, and danger counts.
    List {
        /// Directory containing session logs.
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Render one session log as a conversation tree.
    View {
        /// Log filename within the session directory.
        file: String,
        /// Directory containing session logs.
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Expand every nested conversation.
        #[arg(long)]
        all: bool,
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
    /// Record the read watermark for a conversation.
    Mark {
        /// Log key (filename for root logs, session key for nested ones).
        key: String,
        /// Entry id acknowledged as read.
        entry_id: String,
    },
    /// Serve the review API over HTTP.
    Serve {
        /// Directory containing session logs.
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Address to bind to.
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on.
        #[arg(long)]
        port: Option<u16>,
    },
}

/// Everything scanned up front from the session directory.
struct Scanned {
    names: Vec<String>,
    registry: SpawnRegistry,
    dangers: DangerMap,
    progress: ProgressStore,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

fn session_dir(config: &ReviewConfig, cli_dir: Option<PathBuf>) -> PathBuf {
    cli_dir
        .or_else(|| config.session_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn danger_rules(config: &ReviewConfig) -> DangerRules {
    if !config.danger.enabled {
        return DangerRules::new();
    }
    let mut rules = DangerRules::with_default_rules();
    rules.add_extra_patterns(&config.danger.extra_patterns);
    rules
}

async fn scan_directory(config: &ReviewConfig, source: &DirSource) -> Result<Scanned, SourceError> {
    let names = source.list().await?;
    let registry = SpawnRegistry::scan(source, &names).await;
    let rules = danger_rules(config);
    let dangers = danger::scan_all(source, &names, &rules).await;
    let progress = ProgressStore::load(ProgressStore::default_path()).await;

    Ok(Scanned {
        names,
        registry,
        dangers,
        progress,
    })
}

async fn list_sessions(
    config: &ReviewConfig,
    dir: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let source = DirSource::new(session_dir(config, dir));
    let scanned = scan_directory(config, &source).await?;

    if scanned.names.is_empty() {
        println!("No session logs in {}", source.root().display());
        return Ok(());
    }

    println!("{:<40} {:>6} {:>8} {:>8}  LABEL", "FILE", "MSGS", "UNREAD", "DANGERS");
    for name in &scanned.names {
        let Ok(content) = source.fetch(name).await else {
            continue;
        };
        let entries = parse_session_content(&content);
        let visible = visible_entries(&entries);
        let messages = message_entries(&entries);
        let watermark = scanned
            .progress
            .get(name)
            .map(|mark| mark.last_read_id.as_str());
        let read = ReadState::compute(&visible, &messages, watermark);
        let dangers = scanned.dangers.get(name).map_or(0, Vec::len);
        let label = session_header(&entries)
            .and_then(|header| header.label.clone())
            .unwrap_or_default();

        println!(
            "{name:<40} {:>6} {:>8} {dangers:>8}  {label}",
            read.total_messages,
            read.unread_messages()
        );
    }

    Ok(())
}

async fn view_session(
    config: &ReviewConfig,
    dir: Option<PathBuf>,
    file: &str,
    all: bool,
    plain: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let source = DirSource::new(session_dir(config, dir));
    let scanned = scan_directory(config, &source).await?;
    let inputs = ResolveInputs::new(
        scanned.registry,
        scanned.progress.marks().clone(),
        scanned.dangers,
        config.spawn_tool.clone(),
    );

    let ambient = all || config.expand_all;
    let mut view = ConversationView::root(file);
    if ambient {
        view.expand_all(&source, &inputs).await;
    } else {
        view.expand(&source, &inputs).await;
    }
    if view.phase() == LoadPhase::Failed {
        return Err(format!("failed to load session log {file}").into());
    }
    view.set_expanded(true);

    let mut renderer = TextRenderer::stdout(plain);
    render::walk(&view, &inputs, ambient, &mut renderer);
    Ok(())
}

async fn mark_read(key: &str, entry_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = ProgressStore::load(ProgressStore::default_path()).await;
    store.mark_read(key, entry_id);
    store.save().await?;
    println!("Marked {key} read through entry {entry_id}");
    Ok(())
}

async fn serve(
    config: &ReviewConfig,
    dir: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let source = DirSource::new(session_dir(config, dir));
    let scanned = scan_directory(config, &source).await?;

    let mut server_config = config.server.clone();
    if let Some(host) = host {
        server_config.host = host;
    }
    if let Some(port) = port {
        server_config.port = port;
    }

    let server = ReviewServer::new(source, scanned.registry, scanned.dangers, scanned.progress)
        .with_config(server_config);
    server.run().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let loader = match cli.config {
        Some(path) => ConfigLoader::with_path(path),
        None => ConfigLoader::new(),
    };
    let config = loader.load()?;

    match cli.command {
        Commands::List { dir } => list_sessions(&config, dir).await?,
        Commands::View {
            file,
            dir,
            all,
            plain,
        } => view_session(&config, dir, &file, all, plain).await?,
        Commands::Mark { key, entry_id } => mark_read(&key, &entry_id).await?,
        Commands::Serve { dir, host, port } => serve(&config, dir, host, port).await?,
    }

    Ok(())
}
