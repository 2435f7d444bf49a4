use clap::{Args, Parser, Subcommand};

use super::{
    App, CLI_SCHEMA_VERSION, RestorePolicy, SessionConfig, UiConfig, load_config_text,
    shell_split,
};

#[path = "cli_command_handlers.rs"]
mod cli_command_handlers;
#[path = "cli_config.rs"]
mod cli_config;
#[path = "cli_runtime_helpers.rs"]
mod cli_runtime_helpers;
pub(crate) use cli_command_handlers::{run_cli, run_startup};
pub(crate) use cli_config::{
    load_cli_config, load_himalaya_config, load_session_config, load_ui_config,
};
pub(crate) use cli_runtime_helpers::{output_error, output_ok, resolve_cli_command};

#[derive(Parser, Debug)]
#[command(
    name = "nvmail",
    version,
    about = "Mail navigation with session restore, backed by himalaya"
)]
pub(crate) struct Cli {
    #[arg(short = 'c', long = "cmd")]
    cmd: Option<String>,
    #[command(subcommand)]
    pub(crate) command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub(crate) enum CliCommand {
    Session(SessionCmd),
    Messages(MessagesCmd),
    Message(MessageCmd),
    Sync(SyncCmd),
}

#[derive(Args, Debug)]
pub(crate) struct SessionCmd {
    #[command(subcommand)]
    command: SessionCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum SessionCommand {
    Show,
    Restore(SessionRestore),
    Clear,
    Sidebar(SessionSidebar),
}

#[derive(Args, Debug)]
pub(crate) struct SessionRestore {
    /// Reopen the saved message without asking.
    #[arg(long)]
    yes: bool,
    /// Only reopen the message list.
    #[arg(long = "no-message")]
    no_message: bool,
}

/// Changes the remembered sidebar layout. Omitted values are kept.
#[derive(Args, Debug)]
pub(crate) struct SessionSidebar {
    #[arg(long)]
    width: Option<i64>,
    /// `left` or `right`.
    #[arg(long)]
    position: Option<String>,
}

#[derive(Args, Debug)]
pub(crate) struct MessagesCmd {
    #[command(subcommand)]
    command: MessagesCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum MessagesCommand {
    List(MessagesList),
    Search(MessagesSearch),
}

#[derive(Args, Debug)]
pub(crate) struct MessagesList {
    #[arg(long)]
    account: Option<String>,
    #[arg(long)]
    folder: Option<String>,
}

#[derive(Args, Debug)]
pub(crate) struct MessagesSearch {
    query: String,
    #[arg(long)]
    account: Option<String>,
    #[arg(long)]
    folder: Option<String>,
}

#[derive(Args, Debug)]
pub(crate) struct MessageCmd {
    #[command(subcommand)]
    command: MessageCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum MessageCommand {
    Read(MessageRead),
    Move(MessageMove),
    Delete(MessageDelete),
}

#[derive(Args, Debug)]
pub(crate) struct MessageRead {
    id: String,
    #[arg(long)]
    account: Option<String>,
    #[arg(long)]
    folder: Option<String>,
}

#[derive(Args, Debug)]
pub(crate) struct MessageMove {
    id: String,
    target: String,
    #[arg(long)]
    account: Option<String>,
    #[arg(long)]
    folder: Option<String>,
}

#[derive(Args, Debug)]
pub(crate) struct MessageDelete {
    id: String,
    #[arg(long)]
    account: Option<String>,
    #[arg(long)]
    folder: Option<String>,
}

#[derive(Args, Debug)]
pub(crate) struct SyncCmd {
    /// `all`, `<account>` or `<account>/<folder>`.
    target: Option<String>,
    #[arg(long, default_value_t = 300)]
    timeout_secs: u64,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct CliConfig {
    pub(crate) default_account: Option<String>,
    pub(crate) default_folder: Option<String>,
    pub(crate) load_error: Option<String>,
}
