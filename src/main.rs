use anyhow::Result;
use clap::Parser;
use crossterm::{
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::prelude::*;
use std::io;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use roomchat::app::App;
use roomchat::config::{self, Config};
use roomchat::session::SessionStore;
use roomchat::ui;

#[derive(Debug, Parser)]
#[command(name = "roomchat", version, about = "Terminal client for a REST chat backend")]
struct Args {
    /// Base URL of the chat backend
    #[arg(long, env = "ROOMCHAT_API_URL")]
    api_url: Option<String>,

    /// Colour theme; remembered for later runs
    #[arg(long)]
    theme: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging to file (don't pollute the TUI)
    let log_dir = config::data_dir();
    std::fs::create_dir_all(&log_dir)?;
    let log_file = std::fs::File::create(log_dir.join("roomchat.log"))?;
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut cfg = Config::load()?;
    if let Some(theme) = args.theme {
        cfg.theme = theme;
        if let Err(e) = cfg.save() {
            warn!("Failed to save config: {}", e);
        }
    }
    if let Some(url) = args.api_url {
        cfg.api_url = url;
    }
    info!("Using backend {}", cfg.api_url);

    let theme = ui::theme_by_name(&cfg.theme);
    let mut app = App::new(cfg, SessionStore::default_location(), theme)?;

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    app.start();
    let result = app.run(&mut terminal).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}
