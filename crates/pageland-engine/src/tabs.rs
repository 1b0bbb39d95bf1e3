//! Per-tab navigation state reported by the host

use pageland_core::{Tab, TabId};
use std::collections::HashMap;

/// What an update changed compared to the previously known state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TabChange {
    pub is_new: bool,
    pub visibility_changed: bool,
    pub redirect_chain_changed: bool,
}

#[derive(Debug, Default)]
pub struct TabRegistry {
    tabs: HashMap<TabId, Tab>,
    focused: Option<TabId>,
}

impl TabRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_did_open_new_tab(&mut self, tab: Tab) -> TabChange {
        log::debug!("Opened tab {}", tab.id);
        self.update(tab)
    }

    pub fn on_tab_did_change(&mut self, tab: Tab) -> TabChange {
        self.update(tab)
    }

    pub fn on_did_close_tab(&mut self, tab_id: TabId) -> Option<Tab> {
        if self.focused == Some(tab_id) {
            self.focused = None;
        }
        let closed = self.tabs.remove(&tab_id);
        if closed.is_none() {
            log::debug!("Closed unknown tab {}", tab_id);
        }
        closed
    }

    /// Returns false if the tab is unknown
    pub fn on_tab_did_change_focus(&mut self, tab_id: TabId) -> bool {
        if !self.tabs.contains_key(&tab_id) {
            return false;
        }
        self.focused = Some(tab_id);
        true
    }

    pub fn on_media_playing(&mut self, tab_id: TabId) -> bool {
        self.set_playing_media(tab_id, true)
    }

    pub fn on_media_stopped(&mut self, tab_id: TabId) -> bool {
        self.set_playing_media(tab_id, false)
    }

    pub fn get(&self, tab_id: TabId) -> Option<&Tab> {
        self.tabs.get(&tab_id)
    }

    pub fn focused(&self) -> Option<&Tab> {
        self.focused.and_then(|id| self.tabs.get(&id))
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    fn update(&mut self, tab: Tab) -> TabChange {
        let change = match self.tabs.get(&tab.id) {
            Some(previous) => TabChange {
                is_new: false,
                visibility_changed: previous.is_visible != tab.is_visible,
                redirect_chain_changed: previous.redirect_chain != tab.redirect_chain,
            },
            None => TabChange {
                is_new: true,
                visibility_changed: false,
                redirect_chain_changed: !tab.redirect_chain.is_empty(),
            },
        };
        self.tabs.insert(tab.id, tab);
        change
    }

    fn set_playing_media(&mut self, tab_id: TabId, is_playing_media: bool) -> bool {
        match self.tabs.get_mut(&tab_id) {
            Some(tab) => {
                tab.is_playing_media = is_playing_media;
                true
            }
            None => false,
        }
    }
}
