//! Event dispatch: session completions, surface reports and suggestion
//! timers all funnel through `App::handle_event`.

use tracing::{debug, error, trace, warn};

use super::*;
use crate::session::{ControllerEvent, SessionNotice};
use crate::suggest::CoalescerEvent;
use crate::surface::SurfaceEvent;

#[derive(Debug)]
pub enum AppEvent {
    Session(ControllerEvent),
    Surface(SurfaceMessage),
    Suggestion(CoalescerEvent),
}

async fn next_suggestion_event(
    coalescer: &mut Option<SuggestionCoalescer>,
) -> Option<CoalescerEvent> {
    match coalescer {
        Some(coalescer) => coalescer.next_event().await,
        None => std::future::pending().await,
    }
}

impl App {
    /// Wait for whichever source produces an event first.
    pub async fn next_event(&mut self) -> Option<AppEvent> {
        tokio::select! {
            event = self.controller.next_event() => event.map(AppEvent::Session),
            message = self.surface_rx.recv() => message.map(AppEvent::Surface),
            event = next_suggestion_event(&mut self.coalescer) => event.map(AppEvent::Suggestion),
        }
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Session(event) => {
                if let Some(notice) = self.controller.handle_event(event) {
                    self.on_session_notice(notice);
                }
            }
            AppEvent::Surface(SurfaceMessage { instance_id, event }) => {
                self.on_surface_event(instance_id, event);
            }
            AppEvent::Suggestion(event) => {
                let update = self
                    .coalescer
                    .as_mut()
                    .and_then(|coalescer| coalescer.handle_event(event));
                if let Some(update) = update {
                    if self.tabs.get(update.instance_id).is_some() {
                        self.suggestions
                            .insert(update.instance_id, update.suggestions);
                    }
                }
            }
        }
    }

    fn on_session_notice(&mut self, notice: SessionNotice) {
        match notice {
            SessionNotice::Opened(instance_id) => {
                debug!(instance_id, "tab ready");
            }
            SessionNotice::OpenFailed { instance_id, error } => {
                error!(instance_id, error = %error, "could not start shell, closing tab");
                self.discard_instance(instance_id);
            }
            SessionNotice::Lost { instance_id, error } => {
                warn!(instance_id, error = %error, "shell went away, closing tab");
                self.discard_instance(instance_id);
            }
            SessionNotice::Closed(instance_id) => self.discard_instance(instance_id),
        }
    }

    fn on_surface_event(&mut self, instance_id: InstanceId, event: SurfaceEvent) {
        if !self.surfaces.contains_key(&instance_id) {
            trace!(instance_id, "event from discarded surface");
            return;
        }

        match event {
            SurfaceEvent::Data(bytes) => {
                if let Err(e) = self.controller.write(instance_id, &bytes) {
                    warn!(instance_id, error = %e, "input dropped");
                }
            }
            SurfaceEvent::Resize(dimensions) => {
                if let Err(e) = self.controller.resize(instance_id, dimensions) {
                    debug!(instance_id, error = %e, "resize dropped");
                }
            }
            SurfaceEvent::TitleChange(title) => {
                let delimiter = self.config.terminal.title_delimiter;
                if let Some(change) = self.controller.handle_title(instance_id, &title, delimiter) {
                    self.tabs.rename(instance_id, &change.name);
                    self.directories.insert(instance_id, change.directory);
                }
            }
            SurfaceEvent::OutputSnapshot(snapshot) => {
                let context = self.additional_context(instance_id);
                if let Some(coalescer) = self.coalescer.as_mut() {
                    coalescer.observe(instance_id, &snapshot, &context);
                }
            }
        }
    }
}
