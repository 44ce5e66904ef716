mod app;
mod handler;
mod tui;
mod ui;

use anyhow::Result;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing::{error, info};

use app::App;
use refai_core::Config;

/// The terminal is taken by the UI, so logs go to a file in the config directory.
fn init_logging() -> Result<()> {
    let dir = Config::config_dir()?;
    std::fs::create_dir_all(&dir)?;
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("refai.log"))?;

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_writer(Mutex::new(log_file))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load config, using defaults: {}", e);
        Config::new()
    });
    let mut app = App::new(&config);
    info!("Starting RefAI, relay at {}", app.relay.endpoint());

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();
    let tx = events.sender();

    app.scroll_chat_to_bottom();
    let result = run(&mut terminal, &mut app, &mut events, &tx).await;

    tui::restore()?;
    result
}

async fn run(
    terminal: &mut tui::Tui,
    app: &mut App,
    events: &mut tui::EventHandler,
    tx: &tokio::sync::mpsc::UnboundedSender<tui::AppEvent>,
) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event, tx)?,
            None => break,
        }
    }
    Ok(())
}
