//! Tab actions on App.

use tracing::{debug, info, warn};

use super::*;
use crate::error::SessionError;
use crate::surface::{DisplaySurface, SurfaceHandle};
use crate::tabs::Tab;

impl App {
    /// Open a new tab running the configured shell and bring it to front.
    pub fn open_tab(&mut self) -> InstanceId {
        let dimensions = self.dimensions_for_new_tab();
        let instance_id = self
            .controller
            .open(&self.config.terminal.shell, dimensions);

        let surface = Rc::new(RefCell::new(VtSurface::new(
            instance_id,
            dimensions,
            self.surface_tx.clone(),
        )));
        let handle: SurfaceHandle = surface.clone();
        self.controller.bind_surface(instance_id, &handle);
        self.surfaces.insert(instance_id, surface);

        let index = self.tabs.push(Tab::new(
            instance_id,
            self.config.terminal.tab_placeholder.clone(),
        ));
        self.tabs.set_active(index);
        instance_id
    }

    /// Close a tab and tear down its session.
    pub fn close_tab(&mut self, instance_id: InstanceId) -> Result<(), SessionError> {
        self.controller.close(instance_id)?;
        self.discard_instance(instance_id);
        info!(instance_id, remaining = self.tabs.len(), "tab closed");
        Ok(())
    }

    pub fn close_active_tab(&mut self) {
        let Some(instance_id) = self.active_instance() else {
            return;
        };
        if let Err(e) = self.close_tab(instance_id) {
            warn!(instance_id, error = %e, "close failed");
            // Keep the tab list consistent with the controller.
            self.discard_instance(instance_id);
        }
        self.refresh_active();
    }

    pub fn set_active_tab(&mut self, index: usize) -> bool {
        if !self.tabs.set_active(index) {
            return false;
        }
        self.refresh_active();
        true
    }

    pub fn next_tab(&mut self) {
        self.tabs.next();
        self.refresh_active();
    }

    pub fn prev_tab(&mut self) {
        self.tabs.prev();
        self.refresh_active();
    }

    fn refresh_active(&mut self) {
        let Some(instance_id) = self.active_instance() else {
            return;
        };
        if let Some(surface) = self.surfaces.get(&instance_id) {
            surface.borrow_mut().refresh();
        }
    }

    /// Type into the foreground terminal.
    pub fn write_active(&mut self, bytes: &[u8]) {
        let Some(instance_id) = self.active_instance() else {
            return;
        };
        if let Some(surface) = self.surfaces.get(&instance_id) {
            surface.borrow().input(bytes);
        }
    }

    /// Type the suggestion at `index` into the foreground terminal.
    pub fn accept_suggestion(&mut self, index: usize) -> bool {
        let Some(text) = self
            .active_suggestions()
            .and_then(|s| s.items.get(index))
            .cloned()
        else {
            return false;
        };
        debug!(index, "accepting suggestion");
        self.write_active(text.as_bytes());
        true
    }

    /// The terminal pane changed size.
    pub fn resize(&mut self, pane: Dimensions) {
        if pane.is_empty() {
            return;
        }
        self.pane_size = Some(pane);
        let issued = self.controller.resize_all(pane);
        debug!(cols = pane.cols, rows = pane.rows, issued, "pane resized");
    }

    /// Close every tab and wait for the sessions to go away.
    pub async fn shutdown(&mut self) {
        let ids: Vec<InstanceId> = self.tabs.iter().map(Tab::instance_id).collect();
        if let Some(coalescer) = self.coalescer.as_mut() {
            for instance_id in &ids {
                coalescer.forget(*instance_id);
            }
        }

        self.controller.shutdown().await;
        for instance_id in ids {
            self.discard_instance(instance_id);
        }
        info!("shutdown complete");
    }
}
