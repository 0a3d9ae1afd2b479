//! Terminal UI components: tab bar, terminal pane and suggestion bar.

pub mod layout;
pub mod suggestion_bar;
pub mod tab_bar;
pub mod terminal_pane;

pub use suggestion_bar::SuggestionBar;
pub use tab_bar::TabBar;
pub use terminal_pane::TerminalPane;
