use std::io;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{poll, read, Event};
use ratatui::{backend::CrosstermBackend, layout::Rect, Frame, Terminal};

use crate::app::App;
use crate::handlers::keyboard::{handle_key_event, KeyAction};
use crate::ui::layout::{create_layout, pane_grid};
use crate::ui::{SuggestionBar, TabBar, TerminalPane};

/// Longest wait for session output before input is polled again.
const FRAME_INTERVAL: Duration = Duration::from_millis(20);

/// Most events handled between two draws.
const MAX_EVENTS_PER_FRAME: usize = 512;

pub async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<()> {
    let size = terminal.size()?;
    app.resize(pane_grid(Rect::new(0, 0, size.width, size.height)));

    loop {
        terminal.draw(|f| draw_ui(f, app))?;

        // Keyboard and resize events
        while poll(Duration::ZERO)? {
            match read()? {
                Event::Key(key) => {
                    if handle_key_event(app, key) == KeyAction::Quit {
                        return Ok(());
                    }
                }
                Event::Resize(w, h) => {
                    app.resize(pane_grid(Rect::new(0, 0, w, h)));
                }
                _ => {}
            }
        }

        // Session output, surface reports and suggestion timers
        if let Ok(Some(event)) = tokio::time::timeout(FRAME_INTERVAL, app.next_event()).await {
            app.handle_event(event);
            for _ in 1..MAX_EVENTS_PER_FRAME {
                match tokio::time::timeout(Duration::ZERO, app.next_event()).await {
                    Ok(Some(event)) => app.handle_event(event),
                    _ => break,
                }
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn draw_ui(f: &mut Frame, app: &App) {
    let (tab_area, pane_area, suggestion_area) = create_layout(f.area());

    f.render_widget(TabBar::new(app.tabs()), tab_area);

    let screen = app.active_screen();
    let title = app
        .tabs()
        .active_tab()
        .map(|t| t.title.as_str())
        .unwrap_or("termtabs");
    f.render_widget(TerminalPane::new(screen.as_ref(), title), pane_area);

    f.render_widget(
        SuggestionBar::new(app.active_suggestions(), app.suggestions_enabled()),
        suggestion_area,
    );
}
