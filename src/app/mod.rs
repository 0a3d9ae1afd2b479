//! Application state for termtabs.
//!
//! `App` ties the tab model to the session controller and the suggestion
//! coalescer, and owns the display surfaces the controller only holds weakly.

mod actions;
mod events;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::backend::{PtyBackend, SessionBackend};
use crate::config::Config;
use crate::session::{Dimensions, InstanceId, SessionController, SessionState};
use crate::suggest::{OpenAiSuggestions, SuggestionCoalescer, SuggestionService, Suggestions};
use crate::surface::{ScreenState, SurfaceMessage, VtSurface};
use crate::tabs::TabModel;

pub use events::AppEvent;

pub struct App {
    pub config: Config,
    controller: SessionController,
    /// Absent when suggestions are disabled or no API key is configured.
    coalescer: Option<SuggestionCoalescer>,
    tabs: TabModel,
    surfaces: HashMap<InstanceId, Rc<RefCell<VtSurface>>>,
    surface_tx: mpsc::UnboundedSender<SurfaceMessage>,
    surface_rx: mpsc::UnboundedReceiver<SurfaceMessage>,
    /// Last directory each shell reported through its title.
    directories: HashMap<InstanceId, String>,
    suggestions: HashMap<InstanceId, Suggestions>,
    /// Size of the terminal pane; new tabs start at this size.
    pane_size: Option<Dimensions>,
    pub should_quit: bool,
}

impl App {
    /// Create the application with the PTY backend and, if configured, the
    /// OpenAI suggestion service.
    pub fn new(config: Config) -> Result<Self> {
        let service: Option<Arc<dyn SuggestionService>> = if config.suggestions.enabled {
            match OpenAiSuggestions::from_config(&config.suggestions) {
                Some(service) => Some(Arc::new(service)),
                None => {
                    warn!(
                        env = %config.suggestions.api_key_env,
                        "no API key set, suggestions disabled"
                    );
                    None
                }
            }
        } else {
            None
        };

        Ok(Self::with_services(
            config,
            Arc::new(PtyBackend::new()),
            service,
        ))
    }

    /// Create the application around explicit services.
    pub fn with_services(
        config: Config,
        backend: Arc<dyn SessionBackend>,
        service: Option<Arc<dyn SuggestionService>>,
    ) -> Self {
        let coalescer = service
            .map(|service| SuggestionCoalescer::new(service, config.suggestions.debounce()));
        info!(
            shell = %config.terminal.shell,
            suggestions = coalescer.is_some(),
            "application initialized"
        );

        let (surface_tx, surface_rx) = mpsc::unbounded_channel();
        Self {
            config,
            controller: SessionController::new(backend),
            coalescer,
            tabs: TabModel::new(),
            surfaces: HashMap::new(),
            surface_tx,
            surface_rx,
            directories: HashMap::new(),
            suggestions: HashMap::new(),
            pane_size: None,
            should_quit: false,
        }
    }

    pub fn tabs(&self) -> &TabModel {
        &self.tabs
    }

    pub fn suggestions_enabled(&self) -> bool {
        self.coalescer.is_some()
    }

    pub fn active_instance(&self) -> Option<InstanceId> {
        self.tabs.active_instance()
    }

    /// Render state of the foreground terminal.
    pub fn active_screen(&self) -> Option<ScreenState> {
        let id = self.active_instance()?;
        self.surfaces.get(&id).map(|s| s.borrow().screen_state())
    }

    /// Latest suggestions for the foreground tab.
    pub fn active_suggestions(&self) -> Option<&Suggestions> {
        self.suggestions.get(&self.active_instance()?)
    }

    pub fn directory(&self, instance_id: InstanceId) -> Option<&str> {
        self.directories.get(&instance_id).map(String::as_str)
    }

    pub fn session_state(&self, instance_id: InstanceId) -> Option<SessionState> {
        self.controller.state(instance_id)
    }

    fn dimensions_for_new_tab(&self) -> Dimensions {
        self.pane_size
            .unwrap_or_else(|| self.config.terminal.default_dimensions())
    }

    /// Extra context sent along with every suggestion query.
    fn additional_context(&self, instance_id: InstanceId) -> String {
        self.directories
            .get(&instance_id)
            .map(|dir| format!("Current directory: {dir}"))
            .unwrap_or_default()
    }

    /// Forget everything kept for an instance whose session is gone.
    fn discard_instance(&mut self, instance_id: InstanceId) {
        self.tabs.remove(instance_id);
        self.surfaces.remove(&instance_id);
        self.directories.remove(&instance_id);
        self.suggestions.remove(&instance_id);
        if let Some(coalescer) = self.coalescer.as_mut() {
            coalescer.forget(instance_id);
        }
        if self.tabs.is_empty() {
            self.should_quit = true;
        }
    }
}
