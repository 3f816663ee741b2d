use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tabchat_core::{Config, MemoryStore, OllamaClient, Session, SqliteStore, TabStore};
use tracing_subscriber::EnvFilter;

mod app;
mod clipboard;
mod handler;
mod markdown;
mod tui;
mod ui;

use app::{App, Store};
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "tabchat")]
#[command(about = "Tabbed terminal chat client for Ollama")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Ollama chat endpoint, e.g. http://localhost:11434/api/chat
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Model name sent with every request
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Directory for the tab database, logs and exports
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Keep every tab in memory only
    #[arg(long)]
    no_persist: bool,

    /// Log file (defaults to tabchat.log in the data directory)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List saved tabs in order
    List,
    /// Write a tab's conversation as an HTML page
    Export {
        /// Tab name
        tab: String,
        /// Output file (defaults to <tab>.html in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("Ignoring unreadable config: {e:#}");
        Config::from_env_defaults()
    });
    if let Some(endpoint) = &cli.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(model) = &cli.model {
        config.model = model.clone();
    }
    if let Some(timeout) = cli.timeout {
        config.request_timeout_secs = timeout;
    }
    if let Some(dir) = &cli.data_dir {
        config.data_dir = Some(dir.clone());
    }

    match &cli.command {
        Some(Commands::List) => list_tabs(&config),
        Some(Commands::Export { tab, output }) => export_tab(&config, tab, output.as_deref()),
        Some(Commands::ShowConfig) => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        None => run_tui(&cli, &config).await,
    }
}

fn init_logging(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))?;

    // Log to a file so output never lands on the alternate screen
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .init();
    Ok(())
}

fn open_store(config: &Config, in_memory: bool) -> Result<Store> {
    if in_memory {
        return Ok(Box::new(MemoryStore::new()));
    }
    Ok(Box::new(SqliteStore::open(&config.storage_path()?)?))
}

fn list_tabs(config: &Config) -> Result<()> {
    let tabs = TabStore::new(open_store(config, false)?, config.storage_prefix.clone());
    for name in tabs.list_tab_names()? {
        let messages = tabs.load(&name)?.len();
        println!("{name}\t{messages} messages");
    }
    Ok(())
}

fn export_tab(config: &Config, tab: &str, output: Option<&Path>) -> Result<()> {
    let tabs = TabStore::new(open_store(config, false)?, config.storage_prefix.clone());
    if !tabs.contains(tab)? {
        anyhow::bail!("no tab named \"{}\"", tab);
    }

    let mut view = tabchat_core::ConversationView::new();
    view.rebuild(&tabs.load(tab)?);

    let path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(format!("{}.html", app::export_file_stem(tab))));
    fs::write(&path, view.to_html_document(tab))
        .with_context(|| format!("writing {}", path.display()))?;
    println!("Exported \"{}\" to {}", tab, path.display());
    Ok(())
}

async fn run_tui(cli: &Cli, config: &Config) -> Result<()> {
    let data_dir = config.resolved_data_dir()?;
    let log_path = cli
        .log_file
        .clone()
        .unwrap_or_else(|| data_dir.join("tabchat.log"));
    init_logging(&log_path)?;

    let store = open_store(config, cli.no_persist)?;
    let session = Session::open(TabStore::new(store, config.storage_prefix.clone()))?;
    let ollama = OllamaClient::new(&config.endpoint, &config.model, config.request_timeout())?;
    tracing::info!(endpoint = %config.endpoint, model = %config.model, "starting tabchat");

    let mut app = App::new(session, ollama, data_dir.join("exports"));

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;
            match events.next().await {
                Some(event) => handler::handle_event(&mut app, event).await?,
                None => break,
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    app.abort_query_task();
    tui::restore()?;
    tracing::info!("tabchat exited");
    result
}
