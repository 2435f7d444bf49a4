use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use nvmail_core::{
    HeadlessHost, Notifier, SessionRecord, SessionStore, SidebarPosition, Surface, SurfaceHost,
    SurfaceStack, default_session_path, log_debug, write_text_atomic, xdg_config_dir,
};
use nvmail_mail::{HimalayaBackend, MailBackend, MailEngine, MailEvent};
use shell_words::split as shell_split;

mod app_lifecycle_mod;
mod cli;
mod navigation_mod;
mod notify_mod;
mod restore_mod;
#[cfg(test)]
mod test_support_mod;

use crate::cli::{
    Cli, load_cli_config, load_himalaya_config, load_session_config, load_ui_config,
    output_error, resolve_cli_command, run_cli, run_startup,
};
use crate::notify_mod::StderrNotifier;

const CLI_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RestorePolicy {
    Prompt,
    Auto,
    Never,
}

impl RestorePolicy {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "prompt" | "ask" => Some(RestorePolicy::Prompt),
            "auto" | "always" => Some(RestorePolicy::Auto),
            "never" | "off" => Some(RestorePolicy::Never),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct UiConfig {
    sidebar_width: u16,
    sidebar_position: SidebarPosition,
}

#[derive(Debug, Clone)]
struct SessionConfig {
    restore: RestorePolicy,
    file: Option<PathBuf>,
}

/// Application root: owns the surface stack, the session record and the
/// mail engine, and is the only place events are dispatched from.
struct App {
    host: Box<dyn SurfaceHost>,
    stack: SurfaceStack,
    session: SessionStore,
    backend: Arc<dyn MailBackend>,
    engine: MailEngine,
    events: tokio::sync::mpsc::Receiver<MailEvent>,
    runtime: Arc<tokio::runtime::Runtime>,
    notifier: Box<dyn Notifier>,
    list_surface: Option<Surface>,
    reading_surface: Option<Surface>,
    last_sync: Option<(bool, Option<String>)>,
    save_on_exit: bool,
}

fn config_path_candidates() -> Vec<PathBuf> {
    vec![
        PathBuf::from("nvmail.toml"),
        xdg_config_dir().join("nvmail").join("nvmail.toml"),
    ]
}

fn load_config_text() -> Option<String> {
    for path in config_path_candidates() {
        if let Ok(content) = std::fs::read_to_string(&path) {
            return Some(content);
        }
    }
    None
}

fn default_config_template() -> &'static str {
    r#"# Auto-generated by nvmail on first run.

[himalaya]
binary = "himalaya"
# config = "~/.config/himalaya/config.toml"
# sync_command = "mbsync {target}"
# refresh_command = "oauth-refresh {account}"

[ui]
sidebar_width = 40
sidebar_position = "left"

[session]
restore = "prompt"

[cli]
default_folder = "INBOX"
"#
}

fn ensure_default_config_exists() -> Result<()> {
    if load_config_text().is_some() {
        return Ok(());
    }
    let path = xdg_config_dir().join("nvmail").join("nvmail.toml");
    write_text_atomic(&path, default_config_template())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Err(err) = ensure_default_config_exists() {
        log_debug(&format!("config bootstrap failed: {}", err));
    }
    let command = match resolve_cli_command(cli) {
        Ok(command) => command,
        Err(err) => return output_error(&err.to_string()),
    };
    let cli_config = load_cli_config();
    if let Some(err) = cli_config.load_error.as_deref() {
        log_debug(&format!("config: {}", err));
    }
    let ui_config = load_ui_config();
    let session_config = load_session_config();
    let backend = Arc::new(HimalayaBackend::new(load_himalaya_config()));

    let session_path = session_config
        .file
        .clone()
        .unwrap_or_else(default_session_path);
    let mut session = SessionStore::new(session_path).with_defaults(SessionRecord {
        sidebar_width: ui_config.sidebar_width,
        sidebar_position: ui_config.sidebar_position,
        ..SessionRecord::default()
    });
    session.load();

    let runtime = Arc::new(tokio::runtime::Runtime::new()?);
    let mut app = App::new(
        Box::new(HeadlessHost::new()),
        session,
        backend,
        runtime,
        Box::new(StderrNotifier),
    );

    let result = match command {
        Some(command) => run_cli(&mut app, command, &cli_config, &session_config),
        None => run_startup(&mut app, &session_config),
    };
    app.shutdown();
    if let Err(err) = result {
        return output_error(&err.to_string());
    }
    Ok(())
}
