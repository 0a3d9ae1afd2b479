use ratatui::layout::{Constraint, Direction, Layout, Rect};

use crate::session::Dimensions;

/// Split the screen into tab bar, terminal pane and suggestion bar.
pub fn create_layout(area: Rect) -> (Rect, Rect, Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(area);

    (chunks[0], chunks[1], chunks[2])
}

/// Grid available to a terminal inside the bordered pane.
pub fn pane_grid(screen: Rect) -> Dimensions {
    let (_, pane, _) = create_layout(screen);
    Dimensions::new(pane.width.saturating_sub(2), pane.height.saturating_sub(2))
}
