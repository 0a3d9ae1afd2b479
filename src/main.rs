use std::io;
use std::io::IsTerminal;

use anyhow::{Context, Result};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

use termtabs::app::App;
use termtabs::config::Config;
use termtabs::event_loop::run_app;
use termtabs::logging;

fn main() -> Result<()> {
    // Check if we're in a proper terminal
    if !std::io::stdin().is_terminal() {
        anyhow::bail!("termtabs must be run in an interactive terminal");
    }

    let config = Config::load().context("Failed to load configuration")?;
    logging::init(&logging::log_path()?).context("Failed to set up logging")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    let initial_tabs = config.terminal.initial_tabs;
    let mut app = App::new(config).context("Failed to initialize application")?;

    // Setup terminal
    enable_raw_mode().context("Failed to enable raw mode - are you in a terminal?")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("Failed to setup terminal")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("Failed to create terminal")?;

    for _ in 0..initial_tabs {
        app.open_tab();
    }

    let result = run_app(&mut terminal, &mut app).await;

    app.shutdown().await;

    // Restore terminal (always try to restore even on error)
    let _ = disable_raw_mode();
    let _ = execute!(terminal.backend_mut(), LeaveAlternateScreen);
    let _ = terminal.show_cursor();

    result
}
