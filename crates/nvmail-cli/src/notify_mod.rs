use nvmail_core::{Notifier, log_debug};

/// Prints notices to stderr so stdout stays a single JSON envelope.
pub(crate) struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn info(&self, msg: &str) {
        log_debug(&format!("info: {}", msg));
        eprintln!("{}", msg);
    }

    fn warn(&self, msg: &str) {
        log_debug(&format!("warn: {}", msg));
        eprintln!("warning: {}", msg);
    }

    fn error(&self, msg: &str) {
        log_debug(&format!("error: {}", msg));
        eprintln!("error: {}", msg);
    }
}
