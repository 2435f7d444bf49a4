//! Persisted "where was I" record: account, folder, selected message,
//! sidebar geometry and the last search.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::{log_debug, write_text_atomic};

pub const FRESHNESS_WINDOW_SECS: i64 = 24 * 60 * 60;
const DEFAULT_SIDEBAR_WIDTH: u16 = 40;

pub trait Clock {
    /// Current time in unix seconds.
    fn now(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SidebarPosition {
    #[default]
    Left,
    Right,
}

impl SidebarPosition {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "left" => Some(SidebarPosition::Left),
            "right" => Some(SidebarPosition::Right),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SidebarPosition::Left => "left",
            SidebarPosition::Right => "right",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub account: String,
    pub folder: String,
    pub selected_message: Option<String>,
    pub sidebar_width: u16,
    pub sidebar_position: SidebarPosition,
    pub last_search_query: String,
    pub last_search_results: Option<Vec<String>>,
    pub saved_at: Option<i64>,
}

impl Default for SessionRecord {
    fn default() -> Self {
        Self {
            account: String::new(),
            folder: String::new(),
            selected_message: None,
            sidebar_width: DEFAULT_SIDEBAR_WIDTH,
            sidebar_position: SidebarPosition::Left,
            last_search_query: String::new(),
            last_search_results: None,
            saved_at: None,
        }
    }
}

impl SessionRecord {
    /// Overlays every recognized, well-typed field of `value` onto
    /// `defaults`. Anything else in the document is ignored.
    fn merged_over(defaults: &SessionRecord, value: &JsonValue) -> Option<SessionRecord> {
        let obj = value.as_object()?;
        let mut record = defaults.clone();
        if let Some(v) = obj.get("account").and_then(|v| v.as_str()) {
            record.account = v.to_string();
        }
        if let Some(v) = obj.get("folder").and_then(|v| v.as_str()) {
            record.folder = v.to_string();
        }
        record.selected_message = obj
            .get("selected_message")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or(defaults.selected_message.clone());
        if let Some(v) = obj
            .get("sidebar_width")
            .and_then(|v| v.as_u64())
            .and_then(|v| u16::try_from(v).ok())
        {
            record.sidebar_width = v;
        }
        if let Some(v) = obj
            .get("sidebar_position")
            .and_then(|v| v.as_str())
            .and_then(SidebarPosition::parse)
        {
            record.sidebar_position = v;
        }
        if let Some(v) = obj.get("last_search_query").and_then(|v| v.as_str()) {
            record.last_search_query = v.to_string();
        }
        if let Some(list) = obj.get("last_search_results").and_then(|v| v.as_array()) {
            let ids: Vec<String> = list
                .iter()
                .filter_map(|item| match item {
                    JsonValue::String(s) => Some(s.clone()),
                    JsonValue::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect();
            record.last_search_results = Some(ids);
        }
        record.saved_at = obj.get("saved_at").and_then(|v| v.as_i64());
        Some(record)
    }
}

pub struct SessionStore {
    path: PathBuf,
    defaults: SessionRecord,
    record: SessionRecord,
    clock: Box<dyn Clock>,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_clock(path, Box::new(SystemClock))
    }

    pub fn with_clock(path: impl Into<PathBuf>, clock: Box<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            defaults: SessionRecord::default(),
            record: SessionRecord::default(),
            clock,
        }
    }

    /// Replaces the values `load` and `reset` fall back to. The timestamp of
    /// `defaults` is ignored.
    pub fn with_defaults(mut self, mut defaults: SessionRecord) -> Self {
        defaults.saved_at = None;
        self.record = defaults.clone();
        self.defaults = defaults;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    pub fn save(&mut self) -> Result<()> {
        let now = self.clock.now();
        let saved_at = self.record.saved_at.map_or(now, |prev| prev.max(now));
        let mut snapshot = self.record.clone();
        snapshot.saved_at = Some(saved_at);
        let text = serde_json::to_string_pretty(&snapshot)?;
        write_text_atomic(&self.path, &text)?;
        self.record.saved_at = Some(saved_at);
        Ok(())
    }

    /// Reloads the record from disk. Returns whether a prior record was
    /// found; a missing, unreadable or malformed file leaves defaults only.
    pub fn load(&mut self) -> bool {
        self.record = self.defaults.clone();
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    log_debug(&format!(
                        "session: cannot read {}: {}",
                        self.path.display(),
                        err
                    ));
                }
                return false;
            }
        };
        let value: JsonValue = match serde_json::from_str(&content) {
            Ok(value) => value,
            Err(err) => {
                log_debug(&format!("session: ignoring malformed state: {}", err));
                return false;
            }
        };
        match SessionRecord::merged_over(&self.defaults, &value) {
            Some(mut record) => {
                let now = self.clock.now();
                if let Some(saved_at) = record.saved_at.filter(|ts| *ts > now) {
                    log_debug(&format!(
                        "session: ignoring saved_at {} later than now {}",
                        saved_at, now
                    ));
                    record.saved_at = None;
                }
                let found = record.saved_at.is_some();
                self.record = record;
                found
            }
            None => {
                log_debug("session: state file is not an object");
                false
            }
        }
    }

    pub fn is_fresh(&self) -> bool {
        match self.record.saved_at {
            Some(saved_at) => {
                let age = self.clock.now() - saved_at;
                (0..FRESHNESS_WINDOW_SECS).contains(&age)
            }
            None => false,
        }
    }

    pub fn can_restore(&self) -> (bool, String) {
        if self.record.saved_at.is_none() {
            return (false, "No saved session".to_string());
        }
        if !self.is_fresh() {
            return (false, "Saved session is older than 24 hours".to_string());
        }
        if self.record.account.is_empty() || self.record.folder.is_empty() {
            return (
                false,
                "Saved session is missing an account or folder".to_string(),
            );
        }
        (
            true,
            format!(
                "Session available: {}/{}",
                self.record.account, self.record.folder
            ),
        )
    }

    /// Forgets the in-memory record, including its timestamp.
    pub fn reset(&mut self) {
        self.record = self.defaults.clone();
    }

    /// Resets the record and removes the session file, so the next `load`
    /// finds no saved session.
    pub fn discard(&mut self) -> Result<()> {
        self.reset();
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn account(&self) -> &str {
        &self.record.account
    }

    pub fn set_account(&mut self, account: impl Into<String>) {
        self.record.account = account.into();
    }

    pub fn folder(&self) -> &str {
        &self.record.folder
    }

    pub fn set_folder(&mut self, folder: impl Into<String>) {
        self.record.folder = folder.into();
    }

    pub fn selected_message(&self) -> Option<&str> {
        self.record.selected_message.as_deref()
    }

    pub fn set_selected_message(&mut self, id: Option<String>) {
        self.record.selected_message = id;
    }

    pub fn sidebar_width(&self) -> u16 {
        self.record.sidebar_width
    }

    pub fn set_sidebar_width(&mut self, width: u16) {
        self.record.sidebar_width = width;
    }

    pub fn sidebar_position(&self) -> SidebarPosition {
        self.record.sidebar_position
    }

    pub fn set_sidebar_position(&mut self, position: SidebarPosition) {
        self.record.sidebar_position = position;
    }

    pub fn last_search_query(&self) -> &str {
        &self.record.last_search_query
    }

    pub fn set_last_search_query(&mut self, query: impl Into<String>) {
        self.record.last_search_query = query.into();
    }

    pub fn last_search_results(&self) -> Option<&[String]> {
        self.record.last_search_results.as_deref()
    }

    pub fn set_last_search_results(&mut self, ids: Option<Vec<String>>) {
        self.record.last_search_results = ids;
    }

    pub fn saved_at(&self) -> Option<i64> {
        self.record.saved_at
    }
}
