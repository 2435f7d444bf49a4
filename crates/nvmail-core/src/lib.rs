use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use serde::{Deserialize, Serialize};

mod headless_mod;
mod session_mod;
mod stack_mod;

pub use headless_mod::HeadlessHost;
pub use session_mod::{
    Clock, FRESHNESS_WINDOW_SECS, SessionRecord, SessionStore, SidebarPosition, SystemClock,
};
pub use stack_mod::{StackHandle, SurfaceStack};

/// Opaque handle of a host UI region (a window, a floating pane).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SurfaceId(pub u64);

/// Opaque handle of a host text buffer displayed by a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BufferId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceKind {
    List,
    Reading,
    Compose,
    Other,
}

impl SurfaceKind {
    pub fn label(self) -> &'static str {
        match self {
            SurfaceKind::List => "list",
            SurfaceKind::Reading => "reading",
            SurfaceKind::Compose => "compose",
            SurfaceKind::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Surface {
    pub id: SurfaceId,
    pub kind: SurfaceKind,
    pub content: BufferId,
    pub parent: Option<SurfaceId>,
}

impl Surface {
    pub fn new(id: SurfaceId, kind: SurfaceKind, content: BufferId) -> Self {
        Self {
            id,
            kind,
            content,
            parent: None,
        }
    }
}

/// Window and buffer capabilities of the hosting editor.
///
/// Every query must tolerate handles that were closed behind the caller's
/// back: `is_valid` answers false and the lookups answer `None`.
pub trait SurfaceHost {
    fn create_buffer(&mut self) -> BufferId;
    fn open(&mut self, kind: SurfaceKind, content: BufferId) -> Result<SurfaceId>;
    fn close(&mut self, surface: SurfaceId);
    fn focus(&mut self, surface: SurfaceId) -> bool;
    fn resize(&mut self, surface: SurfaceId, width: u16) -> bool;
    fn is_valid(&self, surface: SurfaceId) -> bool;
    fn focused(&self) -> Option<SurfaceId>;
    fn content_of(&self, surface: SurfaceId) -> Option<BufferId>;
    fn open_surfaces(&self) -> Vec<SurfaceId>;
    fn read_buffer(&self, buffer: BufferId) -> Option<String>;
    fn write_buffer(&mut self, buffer: BufferId, text: &str) -> Result<()>;
}

/// Fire-and-forget channel for user-visible notices.
pub trait Notifier {
    fn info(&self, msg: &str);
    fn warn(&self, msg: &str);
    fn error(&self, msg: &str);
}

static LOG_FILE: OnceLock<Mutex<Option<std::fs::File>>> = OnceLock::new();

pub fn log_debug(msg: &str) {
    if std::env::var("NVMAIL_LOG").is_err() {
        return;
    }
    let path = xdg_state_dir().join("nvmail").join("nvmail.log");
    let lock = LOG_FILE.get_or_init(|| {
        let _ = std::fs::create_dir_all(
            path.parent()
                .unwrap_or_else(|| std::path::Path::new("/tmp")),
        );
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .ok();
        Mutex::new(file)
    });
    if let Ok(mut guard) = lock.lock() {
        if let Some(file) = guard.as_mut() {
            let ts = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            let _ = writeln!(file, "[{}] {}", ts, msg);
        }
    }
}

pub fn xdg_config_dir() -> PathBuf {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
        .unwrap_or_else(|| PathBuf::from("/tmp"))
}

pub fn xdg_state_dir() -> PathBuf {
    std::env::var_os("XDG_STATE_HOME")
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".local").join("state"))
        })
        .unwrap_or_else(|| PathBuf::from("/tmp"))
}

pub fn default_session_path() -> PathBuf {
    xdg_state_dir().join("nvmail").join("session.json")
}

/// Writes `content` to `path` through a sibling temp file so readers never
/// observe a half-written document.
pub fn write_text_atomic(path: &Path, content: &str) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, content.as_bytes())?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn temp_path(prefix: &str, ext: &str) -> PathBuf {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    std::env::temp_dir().join(format!(
        "{}-{}-{}.{}",
        prefix,
        std::process::id(),
        ts,
        ext
    ))
}

#[cfg(test)]
mod tests {
    use super::{temp_path, write_text_atomic};

    #[test]
    fn atomic_write_replaces_existing_content() -> anyhow::Result<()> {
        let path = temp_path("nvmail-core-atomic", "txt");
        write_text_atomic(&path, "first")?;
        write_text_atomic(&path, "second")?;
        assert_eq!(std::fs::read_to_string(&path)?, "second");
        assert!(!path.with_extension("tmp").exists());
        let _ = std::fs::remove_file(&path);
        Ok(())
    }
}
