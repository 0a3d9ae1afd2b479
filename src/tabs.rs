//! Ordered tab registry.
//!
//! Each tab is bound to exactly one session instance for its whole life.
//! Exactly one tab is in the foreground; the rest keep running behind it.

use crate::session::InstanceId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tab {
    pub title: String,
    instance_id: InstanceId,
}

impl Tab {
    pub fn new(instance_id: InstanceId, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            instance_id,
        }
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }
}

#[derive(Debug, Default)]
pub struct TabModel {
    tabs: Vec<Tab>,
    active: usize,
}

impl TabModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a tab and return its position.
    pub fn push(&mut self, tab: Tab) -> usize {
        self.tabs.push(tab);
        self.tabs.len() - 1
    }

    /// Remove the tab bound to `instance_id`.
    ///
    /// When the active tab goes, its right neighbour (or the new last tab)
    /// becomes active. Tabs before the active one shift it left.
    pub fn remove(&mut self, instance_id: InstanceId) -> Option<Tab> {
        let index = self.position(instance_id)?;
        let tab = self.tabs.remove(index);

        if index < self.active {
            self.active -= 1;
        }
        if self.active >= self.tabs.len() {
            self.active = self.tabs.len().saturating_sub(1);
        }
        Some(tab)
    }

    /// Rename a tab. Returns `false` for unknown instances or unchanged titles.
    pub fn rename(&mut self, instance_id: InstanceId, title: &str) -> bool {
        match self.tabs.iter_mut().find(|t| t.instance_id == instance_id) {
            Some(tab) if tab.title != title => {
                tab.title = title.to_string();
                true
            }
            _ => false,
        }
    }

    pub fn set_active(&mut self, index: usize) -> bool {
        if index < self.tabs.len() {
            self.active = index;
            true
        } else {
            false
        }
    }

    pub fn set_active_instance(&mut self, instance_id: InstanceId) -> bool {
        match self.position(instance_id) {
            Some(index) => self.set_active(index),
            None => false,
        }
    }

    pub fn next(&mut self) {
        if !self.tabs.is_empty() {
            self.active = (self.active + 1) % self.tabs.len();
        }
    }

    pub fn prev(&mut self) {
        if !self.tabs.is_empty() {
            self.active = (self.active + self.tabs.len() - 1) % self.tabs.len();
        }
    }

    pub fn active_index(&self) -> Option<usize> {
        (!self.tabs.is_empty()).then_some(self.active)
    }

    pub fn active_tab(&self) -> Option<&Tab> {
        self.tabs.get(self.active)
    }

    pub fn active_instance(&self) -> Option<InstanceId> {
        self.active_tab().map(Tab::instance_id)
    }

    pub fn position(&self, instance_id: InstanceId) -> Option<usize> {
        self.tabs.iter().position(|t| t.instance_id == instance_id)
    }

    pub fn get(&self, instance_id: InstanceId) -> Option<&Tab> {
        self.tabs.iter().find(|t| t.instance_id == instance_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tab> {
        self.tabs.iter()
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }
}
