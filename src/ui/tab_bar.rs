use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget},
};

use crate::tabs::TabModel;

/// One-line strip listing every tab, the foreground one highlighted.
pub struct TabBar<'a> {
    tabs: &'a TabModel,
}

impl<'a> TabBar<'a> {
    pub fn new(tabs: &'a TabModel) -> Self {
        Self { tabs }
    }

    fn line(&self) -> Line<'a> {
        let active = self.tabs.active_index();
        let mut spans = Vec::with_capacity(self.tabs.len() * 2);

        for (idx, tab) in self.tabs.iter().enumerate() {
            let style = if Some(idx) == active {
                Style::default()
                    .fg(Color::Black)
                    .bg(Color::Cyan)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::Gray)
            };
            spans.push(Span::styled(format!(" {}:{} ", idx + 1, tab.title), style));
            spans.push(Span::raw(" "));
        }
        Line::from(spans)
    }
}

impl<'a> Widget for TabBar<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        Paragraph::new(self.line()).render(area, buf);
    }
}
