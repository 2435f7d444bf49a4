use std::io::{self, BufRead, IsTerminal, Write};

use nvmail_core::{SurfaceId, log_debug};

use super::App;

/// Asks whether the stored message should be reopened along with its list.
/// `None` means the question was abandoned.
pub(crate) trait RestorePrompt {
    fn confirm_open_message(&mut self, account: &str, folder: &str, id: &str) -> Option<bool>;
}

/// Non-interactive runs always reopen the message.
pub(crate) struct AutoAccept;

impl RestorePrompt for AutoAccept {
    fn confirm_open_message(&mut self, _account: &str, _folder: &str, _id: &str) -> Option<bool> {
        Some(true)
    }
}

pub(crate) struct StdinPrompt;

impl RestorePrompt for StdinPrompt {
    fn confirm_open_message(&mut self, account: &str, folder: &str, id: &str) -> Option<bool> {
        eprint!("Reopen message {} in {}/{}? [y/N] ", id, account, folder);
        let _ = io::stderr().flush();
        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(0) | Err(_) => None,
            Ok(_) => parse_answer(&answer),
        }
    }
}

fn parse_answer(answer: &str) -> Option<bool> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        "" => Some(false),
        _ => None,
    }
}

pub(crate) fn default_prompt() -> Box<dyn RestorePrompt> {
    if io::stdin().is_terminal() {
        Box::new(StdinPrompt)
    } else {
        Box::new(AutoAccept)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RestoreOutcome {
    Unavailable(String),
    Failed(String),
    Restored {
        list: SurfaceId,
        message: Option<SurfaceId>,
    },
}

impl App {
    /// Reopens the saved list and, when one was selected and `with_message`
    /// holds, the saved message on top of it.
    pub(crate) fn restore_session(
        &mut self,
        prompt: &mut dyn RestorePrompt,
        with_message: bool,
    ) -> RestoreOutcome {
        let (ok, reason) = self.session.can_restore();
        if !ok {
            self.notifier.info(&format!("Cannot restore: {}", reason));
            return RestoreOutcome::Unavailable(reason);
        }
        let account = self.session.account().to_string();
        let folder = self.session.folder().to_string();
        let selected = self.session.selected_message().map(str::to_string);

        let list = match self.reopen_list() {
            Ok(list) => list,
            Err(err) => {
                self.notifier.error(&err.to_string());
                return RestoreOutcome::Failed(err.to_string());
            }
        };
        self.notifier.info(&reason);

        let Some(id) = selected else {
            return RestoreOutcome::Restored {
                list,
                message: None,
            };
        };
        if !with_message {
            return RestoreOutcome::Restored {
                list,
                message: None,
            };
        }
        match prompt.confirm_open_message(&account, &folder, &id) {
            Some(true) => {}
            Some(false) => {
                return RestoreOutcome::Restored {
                    list,
                    message: None,
                };
            }
            None => {
                log_debug("restore prompt abandoned");
                return RestoreOutcome::Restored {
                    list,
                    message: None,
                };
            }
        }
        match self.open_message(&id) {
            Ok(message) => RestoreOutcome::Restored {
                list,
                message: Some(message),
            },
            Err(err) => {
                self.notifier.warn(&err.to_string());
                self.session.set_selected_message(None);
                self.save_session();
                RestoreOutcome::Restored {
                    list,
                    message: None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use nvmail_core::{SessionStore, SurfaceKind};

    use super::{AutoAccept, RestoreOutcome, RestorePrompt, parse_answer};
    use crate::test_support_mod::{FakeBackend, TestHarness, harness, harness_with, session_path};

    struct Scripted(Option<bool>, usize);

    impl RestorePrompt for Scripted {
        fn confirm_open_message(&mut self, _: &str, _: &str, _: &str) -> Option<bool> {
            self.1 += 1;
            self.0
        }
    }

    /// Answers no, after reading what the session file held while the
    /// question was open.
    struct PeekAtDisk {
        path: std::path::PathBuf,
        seen: Option<serde_json::Value>,
    }

    impl RestorePrompt for PeekAtDisk {
        fn confirm_open_message(&mut self, _: &str, _: &str, _: &str) -> Option<bool> {
            self.seen = std::fs::read_to_string(&self.path)
                .ok()
                .and_then(|text| serde_json::from_str(&text).ok());
            None
        }
    }

    fn seed(name: &str, account: &str, folder: &str, message: Option<&str>) -> std::path::PathBuf {
        let path = session_path(name);
        let mut store = SessionStore::new(&path);
        store.set_account(account);
        store.set_folder(folder);
        store.set_selected_message(message.map(str::to_string));
        store.save().unwrap();
        path
    }

    #[test]
    fn nothing_saved_reports_reason() {
        let TestHarness {
            mut app, notices, ..
        } = harness("restore-empty");
        let outcome = app.restore_session(&mut AutoAccept, true);
        assert_eq!(
            outcome,
            RestoreOutcome::Unavailable("No saved session".to_string())
        );
        assert_eq!(app.stack.depth(), 0);
        assert_eq!(
            notices.borrow().as_slice(),
            ["info: Cannot restore: No saved session"]
        );
    }

    #[test]
    fn restores_list_then_message_with_list_as_parent() -> anyhow::Result<()> {
        let path = seed("restore-full", "work", "INBOX", Some("2"));
        let TestHarness {
            mut app, notices, ..
        } = harness_with(path.clone(), FakeBackend::default());
        let outcome = app.restore_session(&mut AutoAccept, true);
        let RestoreOutcome::Restored {
            list,
            message: Some(message),
        } = outcome
        else {
            panic!("unexpected outcome: {:?}", outcome);
        };
        assert_eq!(app.stack.depth(), 2);
        assert_eq!(app.stack.top().map(|s| s.kind), Some(SurfaceKind::Reading));
        assert_eq!(app.stack.top().and_then(|s| s.parent), Some(list));
        assert_eq!(app.session.selected_message(), Some("2"));
        assert!(
            notices
                .borrow()
                .iter()
                .any(|n| n == "info: Session available: work/INBOX")
        );

        assert!(app.close_current());
        assert_eq!(app.host.focused(), Some(list));
        assert!(!app.host.is_valid(message));
        let _ = std::fs::remove_file(&path);
        Ok(())
    }

    #[test]
    fn declined_or_abandoned_prompt_opens_list_only() {
        for (answer, name) in [(Some(false), "restore-declined"), (None, "restore-abandoned")] {
            let path = seed(name, "work", "INBOX", Some("1"));
            let TestHarness { mut app, .. } = harness_with(path.clone(), FakeBackend::default());
            let mut prompt = Scripted(answer, 0);
            let outcome = app.restore_session(&mut prompt, true);
            assert!(matches!(
                outcome,
                RestoreOutcome::Restored { message: None, .. }
            ));
            assert_eq!(prompt.1, 1);
            assert_eq!(app.stack.depth(), 1);
            assert_eq!(app.session.selected_message(), Some("1"));
            let _ = std::fs::remove_file(&path);
        }
    }

    #[test]
    fn saved_selection_survives_while_the_prompt_is_open() {
        let path = seed("restore-on-disk", "work", "INBOX", Some("2"));
        let TestHarness { mut app, .. } = harness_with(path.clone(), FakeBackend::default());
        let mut prompt = PeekAtDisk {
            path: path.clone(),
            seen: None,
        };
        let outcome = app.restore_session(&mut prompt, true);
        assert!(matches!(
            outcome,
            RestoreOutcome::Restored { message: None, .. }
        ));
        let seen = prompt.seen.expect("session file readable during prompt");
        assert_eq!(seen["selected_message"], "2");
        assert_eq!(seen["account"], "work");
        assert_eq!(app.session.selected_message(), Some("2"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn skipping_message_never_prompts() {
        let path = seed("restore-skip", "work", "INBOX", Some("1"));
        let TestHarness { mut app, .. } = harness_with(path.clone(), FakeBackend::default());
        let mut prompt = Scripted(Some(true), 0);
        app.restore_session(&mut prompt, false);
        assert_eq!(prompt.1, 0);
        assert_eq!(app.stack.depth(), 1);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn vanished_message_is_dropped_from_the_session() {
        let path = seed("restore-vanished", "work", "INBOX", Some("404"));
        let TestHarness {
            mut app, notices, ..
        } = harness_with(path.clone(), FakeBackend::default());
        let outcome = app.restore_session(&mut AutoAccept, true);
        assert!(matches!(
            outcome,
            RestoreOutcome::Restored { message: None, .. }
        ));
        assert_eq!(app.session.selected_message(), None);
        assert!(
            notices
                .borrow()
                .iter()
                .any(|n| n.starts_with("warn: Cannot read message 404"))
        );
        let saved = std::fs::read_to_string(&path).unwrap();
        assert!(!saved.contains("\"404\""));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn incomplete_session_is_not_restored() {
        let path = seed("restore-incomplete", "work", "", None);
        let TestHarness { mut app, .. } = harness_with(path.clone(), FakeBackend::default());
        let outcome = app.restore_session(&mut AutoAccept, true);
        assert_eq!(
            outcome,
            RestoreOutcome::Unavailable("Saved session is missing an account or folder".to_string())
        );
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn answers_parse_leniently() {
        assert_eq!(parse_answer("Y\n"), Some(true));
        assert_eq!(parse_answer("no"), Some(false));
        assert_eq!(parse_answer("\n"), Some(false));
        assert_eq!(parse_answer("maybe"), None);
    }
}
