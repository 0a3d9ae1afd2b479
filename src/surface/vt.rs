//! Headless terminal surface backed by a `vt100` parser.
//!
//! The parser does the emulation; this type only turns its screen into
//! render state and snapshot events.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::{DisplaySurface, OutputSnapshot, SurfaceEvent, SurfaceMessage};
use crate::session::{Dimensions, InstanceId};

/// Number of scrollback lines kept by the parser.
pub const SCROLLBACK_LINES: usize = 10000;

/// Terminal screen state for rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenState {
    pub rows: Vec<ScreenRow>,
    /// Cursor position (row, col).
    pub cursor: (u16, u16),
    pub cursor_visible: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenRow {
    pub cells: Vec<ScreenCell>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenCell {
    pub contents: String,
    pub fg: TermColor,
    pub bg: TermColor,
    pub attrs: CellAttrs,
}

/// Terminal color representation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum TermColor {
    #[default]
    Default,
    /// 256-color palette index.
    Indexed(u8),
    /// 24-bit RGB color.
    Rgb(u8, u8, u8),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CellAttrs {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub inverse: bool,
}

impl TermColor {
    pub fn from_vt100(color: vt100::Color) -> Self {
        match color {
            vt100::Color::Default => TermColor::Default,
            vt100::Color::Idx(idx) => TermColor::Indexed(idx),
            vt100::Color::Rgb(r, g, b) => TermColor::Rgb(r, g, b),
        }
    }

    pub fn to_ratatui(self) -> ratatui::style::Color {
        match self {
            TermColor::Default => ratatui::style::Color::Reset,
            TermColor::Indexed(idx) => ratatui::style::Color::Indexed(idx),
            TermColor::Rgb(r, g, b) => ratatui::style::Color::Rgb(r, g, b),
        }
    }
}

impl CellAttrs {
    pub fn from_vt100_cell(cell: &vt100::Cell) -> Self {
        Self {
            bold: cell.bold(),
            italic: cell.italic(),
            underline: cell.underline(),
            inverse: cell.inverse(),
        }
    }
}

/// A terminal widget for one session.
pub struct VtSurface {
    instance_id: InstanceId,
    parser: vt100::Parser,
    events: mpsc::UnboundedSender<SurfaceMessage>,
    last_title: String,
    last_viewport: String,
}

impl VtSurface {
    pub fn new(
        instance_id: InstanceId,
        dimensions: Dimensions,
        events: mpsc::UnboundedSender<SurfaceMessage>,
    ) -> Self {
        Self {
            instance_id,
            parser: vt100::Parser::new(dimensions.rows, dimensions.cols, SCROLLBACK_LINES),
            events,
            last_title: String::new(),
            last_viewport: String::new(),
        }
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    pub fn dimensions(&self) -> Dimensions {
        let (rows, cols) = self.parser.screen().size();
        Dimensions::new(cols, rows)
    }

    /// Report keystrokes typed into this surface.
    pub fn input(&self, bytes: &[u8]) {
        if !bytes.is_empty() {
            self.emit(SurfaceEvent::Data(bytes.to_vec()));
        }
    }

    /// Current viewport and cursor line as plain text.
    pub fn snapshot(&self, is_appending: bool) -> OutputSnapshot {
        let screen = self.parser.screen();
        let (_, cols) = screen.size();
        let (cursor_row, _) = screen.cursor_position();
        let cursor_line = screen
            .rows(0, cols)
            .nth(cursor_row as usize)
            .unwrap_or_default();

        OutputSnapshot {
            viewport: screen.contents(),
            cursor_line: cursor_line.trim_end().to_string(),
            is_appending,
        }
    }

    /// Extract render state from the parser.
    pub fn screen_state(&self) -> ScreenState {
        let screen = self.parser.screen();
        let (rows, cols) = screen.size();

        let mut screen_rows = Vec::with_capacity(rows as usize);
        for row_idx in 0..rows {
            let mut cells = Vec::with_capacity(cols as usize);
            for col_idx in 0..cols {
                let Some(cell) = screen.cell(row_idx, col_idx) else {
                    continue;
                };
                cells.push(ScreenCell {
                    contents: cell.contents(),
                    fg: TermColor::from_vt100(cell.fgcolor()),
                    bg: TermColor::from_vt100(cell.bgcolor()),
                    attrs: CellAttrs::from_vt100_cell(cell),
                });
            }
            screen_rows.push(ScreenRow { cells });
        }

        ScreenState {
            rows: screen_rows,
            cursor: screen.cursor_position(),
            cursor_visible: !screen.hide_cursor(),
        }
    }

    fn emit(&self, event: SurfaceEvent) {
        // The receiver is gone only while the application shuts down.
        let _ = self.events.send(SurfaceMessage {
            instance_id: self.instance_id,
            event,
        });
    }

    fn report_title(&mut self) {
        let title = self.parser.screen().title();
        if !title.is_empty() && title != self.last_title {
            self.last_title = title.to_string();
            self.emit(SurfaceEvent::TitleChange(self.last_title.clone()));
        }
    }
}

impl DisplaySurface for VtSurface {
    fn write(&mut self, bytes: &[u8]) {
        self.parser.process(bytes);
        self.report_title();

        let snapshot = self.snapshot(true);
        if snapshot.viewport != self.last_viewport {
            self.last_viewport = snapshot.viewport.clone();
            self.emit(SurfaceEvent::OutputSnapshot(snapshot));
        }
    }

    fn refresh(&mut self) {
        let snapshot = self.snapshot(false);
        self.last_viewport = snapshot.viewport.clone();
        self.emit(SurfaceEvent::OutputSnapshot(snapshot));
    }

    fn fit(&mut self, area: Dimensions) -> Option<Dimensions> {
        if area.is_empty() {
            return None;
        }
        if area != self.dimensions() {
            self.parser.set_size(area.rows, area.cols);
            self.emit(SurfaceEvent::Resize(area));
        }
        Some(area)
    }
}
