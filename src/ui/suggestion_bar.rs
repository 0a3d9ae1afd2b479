use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget},
};

use crate::suggest::Suggestions;

/// Bottom bar with the foreground tab's suggestions and their Alt+N keys.
pub struct SuggestionBar<'a> {
    suggestions: Option<&'a Suggestions>,
    enabled: bool,
}

impl<'a> SuggestionBar<'a> {
    pub fn new(suggestions: Option<&'a Suggestions>, enabled: bool) -> Self {
        Self {
            suggestions,
            enabled,
        }
    }

    fn line(&self) -> Line<'a> {
        let dim = Style::default().fg(Color::DarkGray);
        let key_style = Style::default().fg(Color::Yellow);

        let Some(suggestions) = self.suggestions else {
            let hint = if self.enabled {
                " ^T new  ^W close  Alt+←/→ switch  ^Q quit"
            } else {
                " ^T new  ^W close  Alt+←/→ switch  ^Q quit  (suggestions off)"
            };
            return Line::from(Span::styled(hint, dim));
        };

        let mut spans = Vec::new();
        for (idx, item) in suggestions.items.iter().enumerate() {
            spans.push(Span::styled(format!(" Alt+{} ", idx + 1), key_style));
            spans.push(Span::raw(item.clone()));
            spans.push(Span::raw(" "));
        }
        if !suggestions.observation.is_empty() {
            spans.push(Span::styled(format!("│ {}", suggestions.observation), dim));
        }
        Line::from(spans)
    }
}

impl<'a> Widget for SuggestionBar<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        Paragraph::new(self.line()).render(area, buf);
    }
}
