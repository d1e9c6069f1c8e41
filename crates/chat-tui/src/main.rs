use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chat_core::{ChatSession, CompletionClient, Config, FileCredentialStore};

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "ai-chat")]
#[command(about = "Chat with a hosted language model from the terminal")]
#[command(version)]
struct Cli {
    /// Model identifier sent with each request
    #[arg(short, long)]
    model: Option<String>,

    /// Completion endpoint URL
    #[arg(long)]
    endpoint: Option<String>,

    /// Where to write logs (defaults to the config directory)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

/// Log to a file; the terminal belongs to the UI.
fn init_logging(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("could not open log file {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_path = match cli.log_file {
        Some(path) => path,
        None => Config::app_dir()?.join("ai-chat.log"),
    };
    init_logging(&log_path)?;

    let config = Config::load().unwrap_or_else(|e| {
        warn!(error = %e, "could not load config, using defaults");
        Config::new()
    });
    let mut settings = config.completion_settings();
    if let Some(model) = cli.model {
        settings.model = model;
    }
    if let Some(endpoint) = cli.endpoint {
        settings.endpoint = endpoint;
    }
    info!(endpoint = %settings.endpoint, model = %settings.model, "starting");

    let model = settings.model.clone();
    let store = FileCredentialStore::default_location()?;
    let session = ChatSession::new(Box::new(store));
    let mut app = App::new(session, Arc::new(CompletionClient::new(settings)), model);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();

    let result = run(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    info!(turns = app.session.conversation().len(), "exiting");
    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await?,
            None => break,
        }
    }
    Ok(())
}
