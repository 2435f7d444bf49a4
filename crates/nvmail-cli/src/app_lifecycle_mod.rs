use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use nvmail_core::{Notifier, SessionStore, SurfaceHost, SurfaceId, SurfaceStack, log_debug};
use nvmail_mail::{MailBackend, MailEngine, MailEvent};

use super::App;

/// Host and backend notifications, consumed one at a time on the main
/// sequence.
#[derive(Debug, Clone)]
pub(crate) enum AppEvent {
    SurfaceClosed { surface: SurfaceId },
    SyncCompleted { ok: bool, error: Option<String> },
    Mail(MailEvent),
}

impl App {
    pub(crate) fn new(
        host: Box<dyn SurfaceHost>,
        session: SessionStore,
        backend: Arc<dyn MailBackend>,
        runtime: Arc<tokio::runtime::Runtime>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        let (engine, events) = {
            let _guard = runtime.enter();
            MailEngine::start(backend.clone())
        };
        Self {
            host,
            stack: SurfaceStack::new(),
            session,
            backend,
            engine,
            events,
            runtime,
            notifier,
            list_surface: None,
            reading_surface: None,
            last_sync: None,
            save_on_exit: true,
        }
    }

    pub(crate) fn on_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::SurfaceClosed { surface } => {
                if self.stack.forget(surface) {
                    log_debug(&format!("surface {} closed by host", surface.0));
                }
                if self.list_surface.as_ref().map(|s| s.id) == Some(surface) {
                    self.list_surface = None;
                }
                if self.reading_surface.as_ref().map(|s| s.id) == Some(surface) {
                    self.reading_surface = None;
                }
            }
            AppEvent::SyncCompleted { ok, error } => {
                if ok {
                    self.notifier.info("Sync complete");
                } else {
                    let reason = error.clone().unwrap_or_else(|| "unknown error".to_string());
                    self.notifier.error(&format!("Sync failed: {}", reason));
                }
                self.last_sync = Some((ok, error));
            }
            AppEvent::Mail(event) => self.on_mail_event(event),
        }
    }

    fn on_mail_event(&mut self, event: MailEvent) {
        match event {
            MailEvent::SyncProgress { line, .. } => self.notifier.info(&line),
            MailEvent::SyncCompleted { ok, error, .. } => {
                self.on_event(AppEvent::SyncCompleted { ok, error });
            }
        }
    }

    /// Dispatches every backend event already queued without waiting.
    pub(crate) fn drain_mail_events(&mut self) -> usize {
        let mut count = 0;
        while let Ok(event) = self.events.try_recv() {
            self.on_event(AppEvent::Mail(event));
            count += 1;
        }
        count
    }

    /// Dispatches backend events until a sync completes or `timeout` runs
    /// out.
    pub(crate) fn wait_for_sync(&mut self, timeout: Duration) -> Result<(bool, Option<String>)> {
        self.last_sync = None;
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(anyhow!("Timed out waiting for sync"));
            }
            let runtime = self.runtime.clone();
            let next = runtime.block_on(tokio::time::timeout(remaining, self.events.recv()));
            match next {
                Ok(Some(event)) => self.on_event(AppEvent::Mail(event)),
                Ok(None) => return Err(anyhow!("mail engine stopped")),
                Err(_) => return Err(anyhow!("Timed out waiting for sync")),
            }
            if let Some(result) = self.last_sync.take() {
                return Ok(result);
            }
        }
    }

    pub(crate) fn save_session(&mut self) -> bool {
        match self.session.save() {
            Ok(()) => true,
            Err(err) => {
                log_debug(&format!(
                    "session save to {} failed: {}",
                    self.session.path().display(),
                    err
                ));
                self.notifier
                    .warn(&format!("Could not save session: {}", err));
                false
            }
        }
    }

    /// Closes every surface still open, then persists the session unless it
    /// was discarded during this run.
    pub(crate) fn shutdown(&mut self) {
        self.drain_mail_events();
        for surface in self.host.open_surfaces() {
            self.host.close(surface);
            self.on_event(AppEvent::SurfaceClosed { surface });
        }
        self.stack.clear();
        if self.save_on_exit {
            self.save_session();
        }
    }
}
