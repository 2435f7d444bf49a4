use std::time::Duration;

use anyhow::Result;
use nvmail_core::{SidebarPosition, log_debug};
use nvmail_mail::MailCommand;
use serde_json::{Value as JsonValue, json};

use super::cli_config::clamp_sidebar_width;
use super::cli_runtime_helpers::{
    meta_to_json, parse_sync_target, resolve_account, resolve_folder,
};
use super::{
    App, CliCommand, CliConfig, MessageCommand, MessagesCommand, RestorePolicy, SessionCommand,
    SessionConfig, output_error, output_ok,
};
use crate::restore_mod::{AutoAccept, RestoreOutcome, RestorePrompt, default_prompt};

pub(crate) fn run_cli(
    app: &mut App,
    command: CliCommand,
    config: &CliConfig,
    session_config: &SessionConfig,
) -> Result<()> {
    match command {
        CliCommand::Session(cmd) => match cmd.command {
            SessionCommand::Show => {
                let (available, reason) = app.session.can_restore();
                output_ok(json!({
                    "path": app.session.path().display().to_string(),
                    "record": serde_json::to_value(app.session.record())?,
                    "can_restore": available,
                    "reason": reason,
                }))
            }
            SessionCommand::Restore(args) => {
                let mut prompt: Box<dyn RestorePrompt> =
                    if args.yes || session_config.restore == RestorePolicy::Auto {
                        Box::new(AutoAccept)
                    } else {
                        default_prompt()
                    };
                let outcome = app.restore_session(prompt.as_mut(), !args.no_message);
                report_restore(app, outcome)
            }
            SessionCommand::Clear => {
                if let Err(err) = app.session.discard() {
                    return output_error(&format!("Could not clear session: {}", err));
                }
                app.save_on_exit = false;
                let (_, reason) = app.session.can_restore();
                output_ok(json!({ "cleared": true, "reason": reason }))
            }
            SessionCommand::Sidebar(args) => {
                let width = args
                    .width
                    .map(clamp_sidebar_width)
                    .unwrap_or_else(|| app.session.sidebar_width());
                let position = match args.position.as_deref() {
                    Some(raw) => match SidebarPosition::parse(raw) {
                        Some(position) => position,
                        None => return output_error(&format!("Unknown sidebar position: {}", raw)),
                    },
                    None => app.session.sidebar_position(),
                };
                app.resize_sidebar(width, position);
                if !app.save_session() {
                    return output_error("Could not save session");
                }
                output_ok(json!({
                    "sidebar_width": width,
                    "sidebar_position": position.as_str(),
                }))
            }
        },
        CliCommand::Messages(cmd) => match cmd.command {
            MessagesCommand::List(args) => {
                let account = resolve_account(config, &app.session, args.account.as_deref())?;
                let folder = resolve_folder(config, &app.session, args.folder.as_deref());
                let (_, messages) = app.show_list(&account, &folder)?;
                output_ok(json!({
                    "account": account,
                    "folder": folder,
                    "messages": messages.iter().map(meta_to_json).collect::<Vec<_>>(),
                }))
            }
            MessagesCommand::Search(args) => {
                enter_folder(app, config, args.account.as_deref(), args.folder.as_deref())?;
                let results = app.search(&args.query)?;
                output_ok(json!({
                    "query": args.query,
                    "messages": results.iter().map(meta_to_json).collect::<Vec<_>>(),
                }))
            }
        },
        CliCommand::Message(cmd) => match cmd.command {
            MessageCommand::Read(args) => {
                enter_folder(app, config, args.account.as_deref(), args.folder.as_deref())?;
                let (_, body) = app.read_message(&args.id)?;
                let headers: serde_json::Map<String, JsonValue> = body
                    .headers
                    .iter()
                    .map(|(key, value)| (key.clone(), json!(value)))
                    .collect();
                output_ok(json!({
                    "id": body.id,
                    "headers": headers,
                    "text": body.text,
                }))
            }
            MessageCommand::Move(args) => {
                enter_folder(app, config, args.account.as_deref(), args.folder.as_deref())?;
                app.move_message(&args.id, &args.target)?;
                output_ok(json!({ "id": args.id, "moved_to": args.target }))
            }
            MessageCommand::Delete(args) => {
                enter_folder(app, config, args.account.as_deref(), args.folder.as_deref())?;
                app.delete_message(&args.id)?;
                output_ok(json!({ "id": args.id, "deleted": true }))
            }
        },
        CliCommand::Sync(cmd) => {
            let target = parse_sync_target(cmd.target.as_deref());
            let label = target.label();
            app.engine.send(MailCommand::Sync(target))?;
            let (ok, error) = app.wait_for_sync(Duration::from_secs(cmd.timeout_secs))?;
            if ok {
                output_ok(json!({ "target": label, "synced": true }))
            } else {
                output_error(&format!(
                    "Sync failed: {}",
                    error.unwrap_or_else(|| "unknown error".to_string())
                ))
            }
        }
    }
}

/// Runs when nvmail is started without a command.
pub(crate) fn run_startup(app: &mut App, session_config: &SessionConfig) -> Result<()> {
    let mut prompt: Box<dyn RestorePrompt> = match session_config.restore {
        RestorePolicy::Never => {
            log_debug("startup restore disabled by config");
            return output_ok(json!({
                "restored": false,
                "reason": "Session restore is disabled",
            }));
        }
        RestorePolicy::Auto => Box::new(AutoAccept),
        RestorePolicy::Prompt => default_prompt(),
    };
    let outcome = app.restore_session(prompt.as_mut(), true);
    report_restore(app, outcome)
}

/// Points the session at the requested folder. Switching folders drops the
/// selection, which belonged to the previous one.
fn enter_folder(
    app: &mut App,
    config: &CliConfig,
    account: Option<&str>,
    folder: Option<&str>,
) -> Result<()> {
    let account = resolve_account(config, &app.session, account)?;
    let folder = resolve_folder(config, &app.session, folder);
    if app.session.account() != account || app.session.folder() != folder {
        app.session.set_account(account);
        app.session.set_folder(folder);
        app.session.set_selected_message(None);
    }
    Ok(())
}

fn report_restore(app: &App, outcome: RestoreOutcome) -> Result<()> {
    match outcome {
        RestoreOutcome::Unavailable(reason) => {
            output_ok(json!({ "restored": false, "reason": reason }))
        }
        RestoreOutcome::Failed(err) => output_error(&err),
        RestoreOutcome::Restored { list, message } => output_ok(json!({
            "restored": true,
            "account": app.session.account(),
            "folder": app.session.folder(),
            "selected_message": app.session.selected_message(),
            "list_surface": list.0,
            "message_surface": message.map(|m| m.0),
        })),
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use nvmail_core::SidebarPosition;

    use super::{enter_folder, run_cli};
    use crate::cli::{Cli, CliConfig, resolve_cli_command};
    use crate::test_support_mod::{TestHarness, harness};
    use crate::{App, RestorePolicy, SessionConfig};

    fn session_config() -> SessionConfig {
        SessionConfig {
            restore: RestorePolicy::Auto,
            file: None,
        }
    }

    fn run(app: &mut App, line: &str) -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(["nvmail", "-c", line])?;
        let command = resolve_cli_command(cli)?.ok_or_else(|| anyhow::anyhow!("no command"))?;
        run_cli(app, command, &CliConfig::default(), &session_config())
    }

    #[test]
    fn list_read_and_restore_share_one_session() -> anyhow::Result<()> {
        let TestHarness { mut app, path, .. } = harness("cli-roundtrip");
        run(&mut app, "messages list --account work --folder INBOX")?;
        run(&mut app, "message read 2")?;
        assert_eq!(app.session.selected_message(), Some("2"));
        assert_eq!(app.stack.depth(), 2);

        run(&mut app, "session restore --yes")?;
        assert_eq!(app.session.account(), "work");
        assert_eq!(app.session.selected_message(), Some("2"));
        let _ = std::fs::remove_file(&path);
        Ok(())
    }

    #[test]
    fn clear_leaves_nothing_to_restore() -> anyhow::Result<()> {
        let TestHarness { mut app, path, .. } = harness("cli-clear");
        run(&mut app, "messages list --account work")?;
        assert!(app.session.can_restore().0);
        assert!(path.exists());
        run(&mut app, "session clear")?;
        let (ok, reason) = app.session.can_restore();
        assert!(!ok);
        assert_eq!(reason, "No saved session");
        assert!(!path.exists());

        app.shutdown();
        assert!(!path.exists());
        let mut reloaded = nvmail_core::SessionStore::new(&path);
        assert!(!reloaded.load());
        assert_eq!(reloaded.can_restore().1, "No saved session");
        Ok(())
    }

    #[test]
    fn switching_folder_drops_selection() -> anyhow::Result<()> {
        let TestHarness { mut app, .. } = harness("cli-switch");
        app.open_list("work", "INBOX")?;
        app.open_message("1")?;
        enter_folder(&mut app, &CliConfig::default(), None, Some("INBOX"))?;
        assert_eq!(app.session.selected_message(), Some("1"));
        enter_folder(&mut app, &CliConfig::default(), None, Some("Archive"))?;
        assert_eq!(app.session.selected_message(), None);
        assert_eq!(app.session.folder(), "Archive");
        Ok(())
    }

    #[test]
    fn sync_waits_for_completion() -> anyhow::Result<()> {
        let TestHarness { mut app, .. } = harness("cli-sync");
        run(&mut app, "sync work --timeout-secs 5")?;
        assert_eq!(app.last_sync, None);
        Ok(())
    }

    #[test]
    fn sidebar_layout_is_clamped_and_saved() -> anyhow::Result<()> {
        let TestHarness { mut app, path, .. } = harness("cli-sidebar");
        let list = app.open_list("work", "INBOX")?;
        run(&mut app, "session sidebar --width 500 --position right")?;
        assert_eq!(app.session.sidebar_width(), 120);
        assert_eq!(app.session.sidebar_position(), SidebarPosition::Right);
        assert!(app.host.is_valid(list));

        run(&mut app, "session sidebar --width 10")?;
        assert_eq!(app.session.sidebar_width(), 20);
        assert_eq!(app.session.sidebar_position(), SidebarPosition::Right);

        run(&mut app, "session sidebar --position middle")?;
        assert_eq!(app.session.sidebar_position(), SidebarPosition::Right);

        let mut reloaded = nvmail_core::SessionStore::new(&path);
        assert!(reloaded.load());
        assert_eq!(reloaded.sidebar_width(), 20);
        assert_eq!(reloaded.sidebar_position(), SidebarPosition::Right);
        let _ = std::fs::remove_file(&path);
        Ok(())
    }
}
