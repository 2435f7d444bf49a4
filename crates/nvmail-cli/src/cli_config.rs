use std::path::PathBuf;

use nvmail_core::SidebarPosition;
use nvmail_mail::HimalayaConfig;

use super::{CliConfig, RestorePolicy, SessionConfig, UiConfig, load_config_text};

const DEFAULT_SIDEBAR_WIDTH: u16 = 40;
const MIN_SIDEBAR_WIDTH: i64 = 20;
const MAX_SIDEBAR_WIDTH: i64 = 120;

pub(crate) fn clamp_sidebar_width(width: i64) -> u16 {
    width.clamp(MIN_SIDEBAR_WIDTH, MAX_SIDEBAR_WIDTH) as u16
}

pub(crate) fn load_himalaya_config() -> HimalayaConfig {
    himalaya_config_from(load_config_text().as_deref())
}

pub(crate) fn load_ui_config() -> UiConfig {
    ui_config_from(load_config_text().as_deref())
}

pub(crate) fn load_session_config() -> SessionConfig {
    session_config_from(load_config_text().as_deref())
}

pub(crate) fn load_cli_config() -> CliConfig {
    cli_config_from(load_config_text().as_deref())
}

fn section(content: Option<&str>, name: &str) -> Option<toml::Value> {
    let value: toml::Value = toml::from_str(content?).ok()?;
    value.get(name).cloned()
}

fn himalaya_config_from(content: Option<&str>) -> HimalayaConfig {
    let Some(himalaya) = section(content, "himalaya") else {
        return HimalayaConfig::default();
    };
    let binary = parse_string(&himalaya, "binary").unwrap_or_else(|| "himalaya".to_string());
    let config_path = parse_string(&himalaya, "config").map(|p| expand_home(&p));
    HimalayaConfig {
        binary,
        config_path: config_path.map(|p| p.to_string_lossy().into_owned()),
        sync_command: parse_string(&himalaya, "sync_command"),
        refresh_command: parse_string(&himalaya, "refresh_command"),
    }
}

fn ui_config_from(content: Option<&str>) -> UiConfig {
    let Some(ui) = section(content, "ui") else {
        return UiConfig {
            sidebar_width: DEFAULT_SIDEBAR_WIDTH,
            sidebar_position: SidebarPosition::Left,
        };
    };
    let sidebar_width = match ui.get("sidebar_width") {
        Some(v) => v.as_integer().unwrap_or(DEFAULT_SIDEBAR_WIDTH as i64),
        None => DEFAULT_SIDEBAR_WIDTH as i64,
    };
    let sidebar_position = ui
        .get("sidebar_position")
        .and_then(|v| v.as_str())
        .and_then(SidebarPosition::parse)
        .unwrap_or(SidebarPosition::Left);
    UiConfig {
        sidebar_width: clamp_sidebar_width(sidebar_width),
        sidebar_position,
    }
}

fn session_config_from(content: Option<&str>) -> SessionConfig {
    let Some(session) = section(content, "session") else {
        return SessionConfig {
            restore: RestorePolicy::Prompt,
            file: None,
        };
    };
    let restore = session
        .get("restore")
        .and_then(|v| {
            v.as_str().and_then(RestorePolicy::parse).or_else(|| {
                v.as_bool().map(|enabled| {
                    if enabled {
                        RestorePolicy::Auto
                    } else {
                        RestorePolicy::Never
                    }
                })
            })
        })
        .unwrap_or(RestorePolicy::Prompt);
    let file = parse_string(&session, "file").map(|p| expand_home(&p));
    SessionConfig { restore, file }
}

fn cli_config_from(content: Option<&str>) -> CliConfig {
    let Some(content) = content else {
        return CliConfig::default();
    };
    let value: toml::Value = match toml::from_str(content) {
        Ok(value) => value,
        Err(_) => {
            return CliConfig {
                load_error: Some("Invalid nvmail.toml".to_string()),
                ..CliConfig::default()
            };
        }
    };
    let cli = match value.get("cli") {
        Some(cli) => cli,
        None => return CliConfig::default(),
    };
    CliConfig {
        default_account: parse_string(cli, "default_account"),
        default_folder: parse_string(cli, "default_folder"),
        load_error: None,
    }
}

fn parse_string(value: &toml::Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(raw)
}
