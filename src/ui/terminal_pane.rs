use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Widget},
};

use crate::surface::{CellAttrs, ScreenState, TermColor};

/// Terminal pane widget for the foreground tab.
pub struct TerminalPane<'a> {
    screen: Option<&'a ScreenState>,
    title: &'a str,
}

impl<'a> TerminalPane<'a> {
    pub fn new(screen: Option<&'a ScreenState>, title: &'a str) -> Self {
        Self { screen, title }
    }
}

impl<'a> Widget for TerminalPane<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .title(format!(" {} ", self.title))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan));

        let inner_area = block.inner(area);
        block.render(area, buf);

        match self.screen {
            Some(screen) => render_screen_state(screen, inner_area, buf),
            None => {
                let placeholder = "No open tabs. Press Ctrl+T to open one";
                let x =
                    inner_area.x + (inner_area.width.saturating_sub(placeholder.len() as u16)) / 2;
                let y = inner_area.y + inner_area.height / 2;
                if y < inner_area.y + inner_area.height && x < inner_area.x + inner_area.width {
                    buf.set_string(x, y, placeholder, Style::default().fg(Color::DarkGray));
                }
            }
        }
    }
}

fn render_screen_state(screen: &ScreenState, area: Rect, buf: &mut Buffer) {
    for (row_idx, screen_row) in screen.rows.iter().enumerate() {
        if row_idx as u16 >= area.height {
            break;
        }
        let y = area.y + row_idx as u16;

        for (col_idx, cell) in screen_row.cells.iter().enumerate() {
            if col_idx as u16 >= area.width {
                break;
            }
            if !cell.contents.is_empty() {
                let x = area.x + col_idx as u16;
                buf.set_string(x, y, &cell.contents, convert_cell_style(&cell.fg, &cell.bg, &cell.attrs));
            }
        }
    }

    if screen.cursor_visible {
        let (cursor_row, cursor_col) = screen.cursor;
        let cursor_x = area.x + cursor_col;
        let cursor_y = area.y + cursor_row;

        if cursor_y < area.y + area.height && cursor_x < area.x + area.width {
            if let Some(cell) = buf.cell_mut((cursor_x, cursor_y)) {
                cell.set_style(Style::default().bg(Color::White).fg(Color::Black));
            }
        }
    }
}

fn convert_cell_style(fg: &TermColor, bg: &TermColor, attrs: &CellAttrs) -> Style {
    let mut style = Style::default().fg(fg.to_ratatui()).bg(bg.to_ratatui());

    if attrs.bold {
        style = style.add_modifier(Modifier::BOLD);
    }
    if attrs.italic {
        style = style.add_modifier(Modifier::ITALIC);
    }
    if attrs.underline {
        style = style.add_modifier(Modifier::UNDERLINED);
    }
    if attrs.inverse {
        style = style.add_modifier(Modifier::REVERSED);
    }

    style
}
