//! `himalaya` CLI backend.

use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use nvmail_core::log_debug;

use super::{BackendError, MailBackend, MessageBody, MessageMeta, SyncTarget};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HimalayaConfig {
    pub binary: String,
    pub config_path: Option<String>,
    /// Replaces the built-in `account sync`; `{target}` is substituted.
    pub sync_command: Option<String>,
    /// Run before retrying an authentication failure; `{account}` is
    /// substituted.
    pub refresh_command: Option<String>,
}

impl Default for HimalayaConfig {
    fn default() -> Self {
        Self {
            binary: "himalaya".to_string(),
            config_path: None,
            sync_command: None,
            refresh_command: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HimalayaBackend {
    config: HimalayaConfig,
}

impl HimalayaBackend {
    pub fn new(config: HimalayaConfig) -> Self {
        Self { config }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.config.binary);
        if let Some(path) = self.config.config_path.as_deref() {
            cmd.arg("--config").arg(path);
        }
        cmd.arg("--output").arg("json");
        cmd
    }

    fn scoped(&self, subcommand: &[&str], account: &str, folder: &str) -> Command {
        let mut cmd = self.command();
        cmd.args(subcommand)
            .arg("--account")
            .arg(account)
            .arg("--folder")
            .arg(folder);
        cmd
    }

    fn envelopes(&self, mut cmd: Command) -> Result<Vec<MessageMeta>, BackendError> {
        let stdout = run(&mut cmd)?;
        let value: JsonValue = serde_json::from_str(&stdout)
            .map_err(|e| BackendError::Transport(format!("unreadable envelope list: {}", e)))?;
        parse_envelopes(&value)
    }
}

impl MailBackend for HimalayaBackend {
    fn list(&self, account: &str, folder: &str) -> Result<Vec<MessageMeta>, BackendError> {
        self.envelopes(self.scoped(&["envelope", "list"], account, folder))
    }

    fn search(
        &self,
        account: &str,
        folder: &str,
        query: &str,
    ) -> Result<Vec<MessageMeta>, BackendError> {
        let terms = shell_words::split(query)
            .map_err(|e| BackendError::Transport(format!("invalid search query: {}", e)))?;
        let mut cmd = self.scoped(&["envelope", "list"], account, folder);
        cmd.args(terms);
        self.envelopes(cmd)
    }

    fn fetch(&self, account: &str, folder: &str, id: &str) -> Result<MessageBody, BackendError> {
        let mut cmd = self.scoped(&["message", "read"], account, folder);
        cmd.arg(id);
        let stdout = run(&mut cmd)?;
        // JSON output wraps the rendered message in a string.
        let text = match serde_json::from_str::<JsonValue>(&stdout) {
            Ok(JsonValue::String(text)) => text,
            _ => stdout,
        };
        if text.trim().is_empty() {
            return Err(BackendError::NotFound(format!("message {}", id)));
        }
        Ok(parse_message_text(id, &text))
    }

    fn move_message(
        &self,
        account: &str,
        folder: &str,
        id: &str,
        target: &str,
    ) -> Result<(), BackendError> {
        let mut cmd = self.scoped(&["message", "move"], account, folder);
        cmd.arg(target).arg(id);
        run(&mut cmd).map(|_| ())
    }

    fn delete(&self, account: &str, folder: &str, id: &str) -> Result<(), BackendError> {
        let mut cmd = self.scoped(&["message", "delete"], account, folder);
        cmd.arg(id);
        run(&mut cmd).map(|_| ())
    }

    fn sync(
        &self,
        target: &SyncTarget,
        progress: &mut dyn FnMut(&str),
    ) -> Result<(), BackendError> {
        let mut cmd = match self.config.sync_command.as_deref() {
            Some(template) => templated_command(template, "{target}", &target.label())?,
            None => {
                let mut cmd = Command::new(&self.config.binary);
                if let Some(path) = self.config.config_path.as_deref() {
                    cmd.arg("--config").arg(path);
                }
                cmd.arg("account").arg("sync");
                if let Some(account) = target.account() {
                    cmd.arg(account);
                }
                cmd
            }
        };
        stream(&mut cmd, progress)
    }

    fn refresh_credentials(&self, account: &str) -> Result<(), BackendError> {
        let Some(template) = self.config.refresh_command.as_deref() else {
            log_debug(&format!(
                "no refresh_command configured, retrying {} as is",
                account
            ));
            return Ok(());
        };
        let mut cmd = templated_command(template, "{account}", account)?;
        run(&mut cmd).map(|_| ())
    }
}

fn spawn_error(cmd: &Command, err: std::io::Error) -> BackendError {
    BackendError::Transport(format!("cannot run {:?}: {}", cmd.get_program(), err))
}

fn templated_command(
    template: &str,
    placeholder: &str,
    value: &str,
) -> Result<Command, BackendError> {
    let parts = shell_words::split(template).map_err(|e| {
        BackendError::Transport(format!("invalid command \"{}\": {}", template, e))
    })?;
    let mut parts = parts.into_iter().map(|part| part.replace(placeholder, value));
    let program = parts
        .next()
        .ok_or_else(|| BackendError::Transport("empty command".to_string()))?;
    let mut cmd = Command::new(program);
    cmd.args(parts);
    Ok(cmd)
}

fn run(cmd: &mut Command) -> Result<String, BackendError> {
    log_debug(&format!("exec {:?}", cmd));
    let output = cmd
        .stdin(Stdio::null())
        .output()
        .map_err(|e| spawn_error(cmd, e))?;
    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let detail = if stderr.trim().is_empty() {
        String::from_utf8_lossy(&output.stdout).into_owned()
    } else {
        stderr.into_owned()
    };
    Err(classify_failure(&detail))
}

fn stream(cmd: &mut Command, progress: &mut dyn FnMut(&str)) -> Result<(), BackendError> {
    log_debug(&format!("exec streaming {:?}", cmd));
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| spawn_error(cmd, e))?;
    // stderr is drained concurrently; a full pipe would stall the child.
    let stderr_reader = child.stderr.take().map(|mut stderr| {
        std::thread::spawn(move || {
            let mut text = String::new();
            let _ = stderr.read_to_string(&mut text);
            text
        })
    });
    if let Some(stdout) = child.stdout.take() {
        for line in BufReader::new(stdout).lines() {
            match line {
                Ok(line) if !line.trim().is_empty() => progress(line.trim_end()),
                Ok(_) => {}
                Err(err) => {
                    log_debug(&format!("sync output unreadable: {}", err));
                    break;
                }
            }
        }
    }
    let status = child
        .wait()
        .map_err(|e| BackendError::Transport(format!("sync did not finish: {}", e)))?;
    let stderr = stderr_reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();
    if status.success() {
        Ok(())
    } else if stderr.trim().is_empty() {
        Err(BackendError::Transport(format!("sync exited with {}", status)))
    } else {
        Err(classify_failure(&stderr))
    }
}

/// Maps CLI failure output onto the backend error taxonomy.
pub fn classify_failure(detail: &str) -> BackendError {
    let message = detail
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .unwrap_or("command failed")
        .to_string();
    let lower = detail.to_ascii_lowercase();
    let auth_markers = [
        "authentication",
        "authenticate",
        "invalid credentials",
        "password",
        "login failed",
        "oauth",
        "token expired",
    ];
    let missing_markers = ["not found", "cannot find", "no such", "does not exist"];
    if auth_markers.iter().any(|m| lower.contains(m)) {
        BackendError::Auth(message)
    } else if missing_markers.iter().any(|m| lower.contains(m)) {
        BackendError::NotFound(message)
    } else {
        BackendError::Transport(message)
    }
}

/// Reads the JSON envelope list. Fields beyond the ones the list view shows
/// are ignored, and loosely typed ids are accepted.
pub fn parse_envelopes(value: &JsonValue) -> Result<Vec<MessageMeta>, BackendError> {
    let items = value
        .as_array()
        .ok_or_else(|| BackendError::Transport("envelope list is not an array".to_string()))?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let id = match item.get("id") {
            Some(JsonValue::String(s)) => s.clone(),
            Some(JsonValue::Number(n)) => n.to_string(),
            _ => continue,
        };
        let subject = item
            .get("subject")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let from = item.get("from").map(format_address).unwrap_or_default();
        let date = item
            .get("date")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let seen = item
            .get("flags")
            .and_then(|v| v.as_array())
            .map(|flags| {
                flags
                    .iter()
                    .filter_map(|f| f.as_str())
                    .any(|f| f.eq_ignore_ascii_case("seen"))
            })
            .unwrap_or(false);
        out.push(MessageMeta {
            id,
            date,
            from,
            subject,
            unread: !seen,
        });
    }
    Ok(out)
}

fn format_address(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Object(obj) => {
            let addr = obj.get("addr").and_then(|v| v.as_str()).unwrap_or("");
            match obj.get("name").and_then(|v| v.as_str()) {
                Some(name) if !name.is_empty() => format!("{} <{}>", name, addr),
                _ => addr.to_string(),
            }
        }
        JsonValue::Array(list) => list
            .iter()
            .map(format_address)
            .collect::<Vec<_>>()
            .join(", "),
        _ => String::new(),
    }
}

fn parse_message_text(id: &str, text: &str) -> MessageBody {
    let mut headers = Vec::new();
    let mut consumed = 0usize;
    let mut body_start = None;
    for raw in text.split_inclusive('\n') {
        consumed += raw.len();
        let line = raw.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            body_start = Some(consumed);
            break;
        }
        match line.split_once(':') {
            Some((key, value)) if !key.is_empty() && !key.contains(' ') => {
                headers.push((key.to_string(), value.trim().to_string()));
            }
            _ => break,
        }
    }
    // Without a blank line after a well-formed header block the whole text
    // is body.
    let Some(start) = body_start else {
        return MessageBody {
            id: id.to_string(),
            headers: Vec::new(),
            text: text.to_string(),
        };
    };
    MessageBody {
        id: id.to_string(),
        headers,
        text: text[start..].to_string(),
    }
}
