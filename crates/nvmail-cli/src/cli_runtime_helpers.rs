use anyhow::{Result, anyhow};
use clap::Parser;
use nvmail_core::SessionStore;
use nvmail_mail::{MessageMeta, SyncTarget};
use serde_json::{Value as JsonValue, json};

use super::{CLI_SCHEMA_VERSION, Cli, CliCommand, CliConfig, shell_split};

const FALLBACK_FOLDER: &str = "INBOX";

pub(crate) fn output_ok(value: JsonValue) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string(&json!({
            "schema": CLI_SCHEMA_VERSION,
            "ok": true,
            "result": value
        }))?
    );
    Ok(())
}

pub(crate) fn output_error(message: &str) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string(&json!({
            "schema": CLI_SCHEMA_VERSION,
            "ok": false,
            "error": message
        }))?
    );
    Ok(())
}

/// Folds `-c "<command line>"` into the regular subcommand. `None` means no
/// command was given and the startup restore should run.
pub(crate) fn resolve_cli_command(cli: Cli) -> Result<Option<CliCommand>> {
    if let Some(cmd) = cli.cmd {
        let parts = shell_split(&cmd).map_err(|e| anyhow!(e.to_string()))?;
        if parts.is_empty() {
            return Ok(None);
        }
        let mut args = Vec::with_capacity(parts.len() + 1);
        args.push("nvmail".to_string());
        args.extend(parts);
        let parsed = Cli::try_parse_from(args).map_err(|e| anyhow!(e.to_string()))?;
        return Ok(parsed.command);
    }
    Ok(cli.command)
}

/// Explicit argument, then the session, then `[cli].default_account`.
pub(crate) fn resolve_account(
    config: &CliConfig,
    session: &SessionStore,
    requested: Option<&str>,
) -> Result<String> {
    requested
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .or_else(|| Some(session.account().to_string()).filter(|name| !name.is_empty()))
        .or_else(|| config.default_account.clone())
        .ok_or_else(|| anyhow!("Account not specified"))
}

/// Explicit argument, then the session, then `[cli].default_folder`, then
/// INBOX.
pub(crate) fn resolve_folder(
    config: &CliConfig,
    session: &SessionStore,
    requested: Option<&str>,
) -> String {
    requested
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .or_else(|| Some(session.folder().to_string()).filter(|name| !name.is_empty()))
        .or_else(|| config.default_folder.clone())
        .unwrap_or_else(|| FALLBACK_FOLDER.to_string())
}

pub(crate) fn parse_sync_target(raw: Option<&str>) -> SyncTarget {
    let raw = raw.map(str::trim).unwrap_or("");
    if raw.is_empty() || raw.eq_ignore_ascii_case("all") {
        return SyncTarget::All;
    }
    match raw.split_once('/') {
        Some((account, folder)) if !account.is_empty() && !folder.is_empty() => {
            SyncTarget::Folder {
                account: account.to_string(),
                folder: folder.to_string(),
            }
        }
        Some((account, _)) if !account.is_empty() => SyncTarget::Account(account.to_string()),
        _ => SyncTarget::Account(raw.trim_matches('/').to_string()),
    }
}

pub(crate) fn meta_to_json(meta: &MessageMeta) -> JsonValue {
    json!({
        "id": meta.id,
        "date": meta.date,
        "from": meta.from,
        "subject": meta.subject,
        "unread": meta.unread,
    })
}
