//! Mail backend capability and the async engine that drives it.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use nvmail_core::log_debug;

mod himalaya;

pub use himalaya::{HimalayaBackend, HimalayaConfig, classify_failure, parse_envelopes};

const MAIL_CMD_QUEUE_CAPACITY: usize = 64;
const MAIL_EVENT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMeta {
    pub id: String,
    pub date: String,
    pub from: String,
    pub subject: String,
    pub unread: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBody {
    pub id: String,
    pub headers: Vec<(String, String)>,
    pub text: String,
}

impl MessageBody {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTarget {
    All,
    Account(String),
    Folder { account: String, folder: String },
}

impl SyncTarget {
    pub fn label(&self) -> String {
        match self {
            SyncTarget::All => "all".to_string(),
            SyncTarget::Account(account) => account.clone(),
            SyncTarget::Folder { account, folder } => format!("{}/{}", account, folder),
        }
    }

    pub fn account(&self) -> Option<&str> {
        match self {
            SyncTarget::All => None,
            SyncTarget::Account(account) => Some(account),
            SyncTarget::Folder { account, .. } => Some(account),
        }
    }
}

/// Blocking mail operations. Implementations shell out or talk to a server;
/// callers run them off the UI sequence.
pub trait MailBackend: Send + Sync {
    fn list(&self, account: &str, folder: &str) -> Result<Vec<MessageMeta>, BackendError>;
    fn search(
        &self,
        account: &str,
        folder: &str,
        query: &str,
    ) -> Result<Vec<MessageMeta>, BackendError>;
    fn fetch(&self, account: &str, folder: &str, id: &str) -> Result<MessageBody, BackendError>;
    fn move_message(
        &self,
        account: &str,
        folder: &str,
        id: &str,
        target: &str,
    ) -> Result<(), BackendError>;
    fn delete(&self, account: &str, folder: &str, id: &str) -> Result<(), BackendError>;
    fn sync(&self, target: &SyncTarget, progress: &mut dyn FnMut(&str))
    -> Result<(), BackendError>;
    fn refresh_credentials(&self, account: &str) -> Result<(), BackendError>;
}

/// Runs `op`; an authentication failure triggers one credential refresh and
/// one retry. The second failure, or a failed refresh, is returned as is.
pub fn with_auth_retry<T, F>(
    backend: &dyn MailBackend,
    account: &str,
    mut op: F,
) -> Result<T, BackendError>
where
    F: FnMut(&dyn MailBackend) -> Result<T, BackendError>,
{
    match op(backend) {
        Err(BackendError::Auth(reason)) => {
            log_debug(&format!(
                "auth failure for {}, refreshing credentials: {}",
                account, reason
            ));
            backend.refresh_credentials(account)?;
            op(backend)
        }
        other => other,
    }
}

/// Work queued on the engine. Interactive calls go through the backend
/// directly; only long-running sync is run in the background.
#[derive(Debug, Clone)]
pub enum MailCommand {
    Sync(SyncTarget),
}

#[derive(Debug, Clone)]
pub enum MailEvent {
    SyncProgress {
        target: SyncTarget,
        line: String,
    },
    SyncCompleted {
        target: SyncTarget,
        ok: bool,
        error: Option<String>,
    },
}

#[derive(Clone)]
pub struct MailEngine {
    tx: mpsc::Sender<MailCommand>,
}

impl MailEngine {
    /// Spawns the command loop on the current tokio runtime.
    pub fn start(backend: Arc<dyn MailBackend>) -> (Self, mpsc::Receiver<MailEvent>) {
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<MailCommand>(MAIL_CMD_QUEUE_CAPACITY);
        let (evt_tx, evt_rx) = mpsc::channel::<MailEvent>(MAIL_EVENT_QUEUE_CAPACITY);

        tokio::spawn(async move {
            while let Some(cmd) = cmd_rx.recv().await {
                let backend = backend.clone();
                let tx = evt_tx.clone();
                tokio::task::spawn_blocking(move || run_command(backend.as_ref(), cmd, &tx));
            }
        });

        (Self { tx: cmd_tx }, evt_rx)
    }

    pub fn send(&self, cmd: MailCommand) -> Result<()> {
        match self.tx.try_send(cmd) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(cmd)) => {
                log_debug(&format!("mail cmd queue full, dropping: {:?}", cmd));
                Err(anyhow!("mail command queue full"))
            }
            Err(TrySendError::Closed(_)) => Err(anyhow!("mail command queue closed")),
        }
    }
}

fn run_command(backend: &dyn MailBackend, cmd: MailCommand, tx: &mpsc::Sender<MailEvent>) {
    let event = match cmd {
        MailCommand::Sync(target) => {
            let mut report = |line: &str| {
                let _ = tx.blocking_send(MailEvent::SyncProgress {
                    target: target.clone(),
                    line: line.to_string(),
                });
            };
            let result = match target.account() {
                Some(account) => {
                    with_auth_retry(backend, account, |b| b.sync(&target, &mut report))
                }
                None => backend.sync(&target, &mut report),
            };
            match result {
                Ok(()) => MailEvent::SyncCompleted {
                    target,
                    ok: true,
                    error: None,
                },
                Err(err) => {
                    log_debug(&format!("sync of {} failed: {}", target.label(), err));
                    MailEvent::SyncCompleted {
                        target,
                        ok: false,
                        error: Some(err.to_string()),
                    }
                }
            }
        }
    };
    if tx.blocking_send(event).is_err() {
        log_debug("mail event receiver dropped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::time::Duration;

    use super::{
        BackendError, MailBackend, MailCommand, MailEngine, MailEvent, MessageBody, MessageMeta,
        SyncTarget, with_auth_retry,
    };

    /// Fails every call with `failure` until `heal_after` credential
    /// refreshes have happened.
    struct ScriptedBackend {
        failure: Option<BackendError>,
        heal_after: usize,
        refreshes: Mutex<usize>,
        calls: Mutex<usize>,
    }

    impl ScriptedBackend {
        fn new(failure: Option<BackendError>, heal_after: usize) -> Self {
            Self {
                failure,
                heal_after,
                refreshes: Mutex::new(0),
                calls: Mutex::new(0),
            }
        }

        fn gate(&self) -> Result<(), BackendError> {
            *self.calls.lock().unwrap() += 1;
            match &self.failure {
                Some(err) if *self.refreshes.lock().unwrap() < self.heal_after => Err(err.clone()),
                _ => Ok(()),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }

        fn refreshes(&self) -> usize {
            *self.refreshes.lock().unwrap()
        }
    }

    impl MailBackend for ScriptedBackend {
        fn list(&self, _account: &str, _folder: &str) -> Result<Vec<MessageMeta>, BackendError> {
            self.gate()?;
            Ok(vec![MessageMeta {
                id: "1".to_string(),
                date: "2026-01-01".to_string(),
                from: "alice@example.com".to_string(),
                subject: "hello".to_string(),
                unread: true,
            }])
        }

        fn search(
            &self,
            account: &str,
            folder: &str,
            _query: &str,
        ) -> Result<Vec<MessageMeta>, BackendError> {
            self.list(account, folder)
        }

        fn fetch(
            &self,
            _account: &str,
            _folder: &str,
            id: &str,
        ) -> Result<MessageBody, BackendError> {
            self.gate()?;
            Ok(MessageBody {
                id: id.to_string(),
                headers: vec![("Subject".to_string(), "hello".to_string())],
                text: "body".to_string(),
            })
        }

        fn move_message(
            &self,
            _account: &str,
            _folder: &str,
            _id: &str,
            _target: &str,
        ) -> Result<(), BackendError> {
            self.gate()
        }

        fn delete(&self, _account: &str, _folder: &str, _id: &str) -> Result<(), BackendError> {
            self.gate()
        }

        fn sync(
            &self,
            _target: &SyncTarget,
            progress: &mut dyn FnMut(&str),
        ) -> Result<(), BackendError> {
            self.gate()?;
            progress("fetching INBOX");
            progress("done");
            Ok(())
        }

        fn refresh_credentials(&self, _account: &str) -> Result<(), BackendError> {
            *self.refreshes.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[test]
    fn auth_failure_is_retried_once_after_refresh() {
        let backend = ScriptedBackend::new(Some(BackendError::Auth("expired".into())), 1);
        let result = with_auth_retry(&backend, "work", |b| b.list("work", "INBOX"));
        assert!(result.is_ok());
        assert_eq!(backend.refreshes(), 1);
        assert_eq!(backend.calls(), 2);
    }

    #[test]
    fn second_auth_failure_surfaces() {
        let backend = ScriptedBackend::new(Some(BackendError::Auth("revoked".into())), 5);
        let result = with_auth_retry(&backend, "work", |b| b.list("work", "INBOX"));
        assert_eq!(result, Err(BackendError::Auth("revoked".into())));
        assert_eq!(backend.refreshes(), 1);
        assert_eq!(backend.calls(), 2);
    }

    #[test]
    fn transport_failure_is_not_retried() {
        let backend = ScriptedBackend::new(Some(BackendError::Transport("offline".into())), 5);
        let result = with_auth_retry(&backend, "work", |b| b.delete("work", "INBOX", "1"));
        assert!(matches!(result, Err(BackendError::Transport(_))));
        assert_eq!(backend.refreshes(), 0);
        assert_eq!(backend.calls(), 1);
    }

    #[test]
    fn errors_render_human_readable() {
        assert_eq!(
            BackendError::NotFound("message 9".into()).to_string(),
            "not found: message 9"
        );
        assert_eq!(
            BackendError::Auth("bad password".into()).to_string(),
            "authentication failed: bad password"
        );
    }

    async fn next_event(rx: &mut tokio::sync::mpsc::Receiver<MailEvent>) -> MailEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event timeout")
            .expect("event channel closed")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn engine_streams_sync_progress_then_completion() {
        let backend = Arc::new(ScriptedBackend::new(None, 0));
        let (engine, mut events) = MailEngine::start(backend);
        engine
            .send(MailCommand::Sync(SyncTarget::Account("work".into())))
            .unwrap();

        let mut lines = Vec::new();
        loop {
            match next_event(&mut events).await {
                MailEvent::SyncProgress { line, .. } => lines.push(line),
                MailEvent::SyncCompleted { ok, error, target } => {
                    assert!(ok);
                    assert!(error.is_none());
                    assert_eq!(target, SyncTarget::Account("work".into()));
                    break;
                }
            }
        }
        assert_eq!(lines, vec!["fetching INBOX", "done"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn engine_sync_failure_completes_with_error() {
        let backend = Arc::new(ScriptedBackend::new(
            Some(BackendError::Transport("connection reset".into())),
            usize::MAX,
        ));
        let (engine, mut events) = MailEngine::start(backend);
        engine.send(MailCommand::Sync(SyncTarget::All)).unwrap();
        match next_event(&mut events).await {
            MailEvent::SyncCompleted { ok, error, .. } => {
                assert!(!ok);
                assert_eq!(
                    error.as_deref(),
                    Some("transport error: connection reset")
                );
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
