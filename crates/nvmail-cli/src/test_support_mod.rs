use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use nvmail_core::{HeadlessHost, Notifier, SessionStore};
use nvmail_mail::{BackendError, MailBackend, MessageBody, MessageMeta, SyncTarget};

use super::App;

pub(crate) struct RecordingNotifier(pub(crate) Rc<RefCell<Vec<String>>>);

impl Notifier for RecordingNotifier {
    fn info(&self, msg: &str) {
        self.0.borrow_mut().push(format!("info: {}", msg));
    }

    fn warn(&self, msg: &str) {
        self.0.borrow_mut().push(format!("warn: {}", msg));
    }

    fn error(&self, msg: &str) {
        self.0.borrow_mut().push(format!("error: {}", msg));
    }
}

/// Two-message mailbox. Message "404" does not exist, and every call fails
/// with an authentication error while `auth_failures` is non-zero.
#[derive(Default)]
pub(crate) struct FakeBackend {
    pub(crate) auth_failures: Mutex<usize>,
    pub(crate) refreshes: Mutex<usize>,
}

impl FakeBackend {
    fn gate(&self) -> Result<(), BackendError> {
        let mut remaining = self.auth_failures.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(BackendError::Auth("token expired".into()));
        }
        Ok(())
    }

    fn meta(id: &str, subject: &str) -> MessageMeta {
        MessageMeta {
            id: id.to_string(),
            date: "2026-03-01 10:00".to_string(),
            from: "Alice <alice@example.com>".to_string(),
            subject: subject.to_string(),
            unread: id == "1",
        }
    }
}

impl MailBackend for FakeBackend {
    fn list(&self, _account: &str, _folder: &str) -> Result<Vec<MessageMeta>, BackendError> {
        self.gate()?;
        Ok(vec![Self::meta("1", "Quarterly invoice"), Self::meta("2", "Lunch?")])
    }

    fn search(
        &self,
        account: &str,
        folder: &str,
        query: &str,
    ) -> Result<Vec<MessageMeta>, BackendError> {
        let needle = query.to_ascii_lowercase();
        Ok(self
            .list(account, folder)?
            .into_iter()
            .filter(|m| m.subject.to_ascii_lowercase().contains(&needle))
            .collect())
    }

    fn fetch(&self, _account: &str, _folder: &str, id: &str) -> Result<MessageBody, BackendError> {
        self.gate()?;
        if id == "404" {
            return Err(BackendError::NotFound(format!("message {}", id)));
        }
        Ok(MessageBody {
            id: id.to_string(),
            headers: vec![("Subject".to_string(), format!("Message {}", id))],
            text: format!("Body of message {}\n", id),
        })
    }

    fn move_message(
        &self,
        _account: &str,
        _folder: &str,
        id: &str,
        _target: &str,
    ) -> Result<(), BackendError> {
        self.gate()?;
        if id == "404" {
            return Err(BackendError::NotFound(format!("message {}", id)));
        }
        Ok(())
    }

    fn delete(&self, account: &str, folder: &str, id: &str) -> Result<(), BackendError> {
        self.move_message(account, folder, id, "Trash")
    }

    fn sync(
        &self,
        target: &SyncTarget,
        progress: &mut dyn FnMut(&str),
    ) -> Result<(), BackendError> {
        self.gate()?;
        progress(&format!("synced {}", target.label()));
        Ok(())
    }

    fn refresh_credentials(&self, _account: &str) -> Result<(), BackendError> {
        *self.refreshes.lock().unwrap() += 1;
        Ok(())
    }
}

pub(crate) struct TestHarness {
    pub(crate) app: App,
    pub(crate) notices: Rc<RefCell<Vec<String>>>,
    pub(crate) backend: Arc<FakeBackend>,
    pub(crate) path: PathBuf,
}

pub(crate) fn session_path(name: &str) -> PathBuf {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    std::env::temp_dir().join(format!(
        "nvmail-{}-{}-{}.json",
        name,
        std::process::id(),
        ts
    ))
}

pub(crate) fn harness(name: &str) -> TestHarness {
    harness_with(session_path(name), FakeBackend::default())
}

pub(crate) fn harness_with(path: PathBuf, backend: FakeBackend) -> TestHarness {
    let notices = Rc::new(RefCell::new(Vec::new()));
    let backend = Arc::new(backend);
    let runtime = Arc::new(tokio::runtime::Runtime::new().unwrap());
    let mut session = SessionStore::new(&path);
    session.load();
    let app = App::new(
        Box::new(HeadlessHost::new()),
        session,
        backend.clone(),
        runtime,
        Box::new(RecordingNotifier(notices.clone())),
    );
    TestHarness {
        app,
        notices,
        backend,
        path,
    }
}
