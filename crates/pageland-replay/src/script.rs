//! Replay script format

use anyhow::Context;
use chrono::{DateTime, Utc};
use pageland_core::{AdType, ConfirmationType, CreativeAd, Tab, TabId};
use serde::Deserialize;
use std::path::Path;
use url::Url;

#[derive(Debug, Deserialize)]
pub struct Script {
    /// Wall clock time of step zero, defaults to now
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,

    /// Creatives the triggers may refer to
    #[serde(default)]
    pub creatives: Vec<CreativeAd>,

    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
pub struct Step {
    pub at_ms: u64,
    pub event: ScriptEvent,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScriptEvent {
    OpenTab(TabState),
    ChangeTab(TabState),
    CloseTab {
        tab_id: i32,
    },
    FocusTab {
        tab_id: i32,
    },
    Serve {
        ad_type: AdType,
        placement_id: String,
        creative_instance_id: String,
    },
    Trigger {
        ad_type: AdType,
        placement_id: String,
        creative_instance_id: String,
        confirmation_type: ConfirmationType,
    },
}

#[derive(Debug, Deserialize)]
pub struct TabState {
    pub tab_id: i32,
    #[serde(default)]
    pub redirect_chain: Vec<Url>,
    #[serde(default = "visible")]
    pub is_visible: bool,
    #[serde(default)]
    pub is_error_page: bool,
}

fn visible() -> bool {
    true
}

impl TabState {
    pub fn to_tab(&self) -> Tab {
        let mut tab = Tab::new(TabId(self.tab_id))
            .with_redirect_chain(self.redirect_chain.clone())
            .with_visibility(self.is_visible);
        tab.is_error_page = self.is_error_page;
        tab
    }
}

impl Script {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse script {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let mut script: Script = serde_json::from_str(content)?;
        // Stable, so steps sharing a time keep their order
        script.steps.sort_by_key(|step| step.at_ms);
        Ok(script)
    }
}
