//! Configuration management for termtabs.
//!
//! Handles persistence and loading of user preferences: which shell to run,
//! default terminal size and how suggestions are produced.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::session::{Dimensions, DEFAULT_TITLE_DELIMITER};
use crate::suggest::coalescer::DEFAULT_DEBOUNCE;

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub terminal: TerminalConfig,

    #[serde(default)]
    pub suggestions: SuggestionConfig,
}

impl Config {
    /// Load configuration from disk, or return default if not found
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Config = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate();

        Ok(config)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Clamp out-of-range values.
    pub fn validate(&mut self) {
        self.terminal.validate();
        self.suggestions.validate();
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not find config directory")?;

        Ok(config_dir.join("termtabs").join("config.json"))
    }
}

/// Shell and terminal defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// Command each new tab runs
    #[serde(default = "default_shell")]
    pub shell: String,

    #[serde(default = "default_cols")]
    pub default_cols: u16,

    #[serde(default = "default_rows")]
    pub default_rows: u16,

    /// Separator between program and directory in shell titles
    #[serde(default = "default_title_delimiter")]
    pub title_delimiter: char,

    /// Title of a tab before its shell reports a directory
    #[serde(default = "default_tab_placeholder")]
    pub tab_placeholder: String,

    /// Tabs opened at startup (1-9)
    #[serde(default = "default_initial_tabs")]
    pub initial_tabs: u8,
}

fn default_shell() -> String {
    std::env::var("SHELL")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "zsh".to_string())
}

fn default_cols() -> u16 {
    80
}

fn default_rows() -> u16 {
    24
}

fn default_title_delimiter() -> char {
    DEFAULT_TITLE_DELIMITER
}

fn default_tab_placeholder() -> String {
    "New Tab".to_string()
}

fn default_initial_tabs() -> u8 {
    1
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            default_cols: default_cols(),
            default_rows: default_rows(),
            title_delimiter: default_title_delimiter(),
            tab_placeholder: default_tab_placeholder(),
            initial_tabs: default_initial_tabs(),
        }
    }
}

impl TerminalConfig {
    pub fn validate(&mut self) {
        self.initial_tabs = self.initial_tabs.clamp(1, 9);
        if self.default_cols == 0 {
            self.default_cols = default_cols();
        }
        if self.default_rows == 0 {
            self.default_rows = default_rows();
        }
        if self.shell.trim().is_empty() {
            self.shell = default_shell();
        }
    }

    pub fn default_dimensions(&self) -> Dimensions {
        Dimensions::new(self.default_cols, self.default_rows)
    }
}

/// AI suggestion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Quiet period after the last output before a query is sent
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

const MIN_DEBOUNCE_MS: u64 = 100;

fn default_enabled() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE.as_millis() as u64
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            debounce_ms: default_debounce_ms(),
            model: default_model(),
            api_base: default_api_base(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl SuggestionConfig {
    pub fn validate(&mut self) {
        self.debounce_ms = self.debounce_ms.max(MIN_DEBOUNCE_MS);
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
