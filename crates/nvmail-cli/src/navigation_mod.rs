use anyhow::{Result, anyhow};
use nvmail_core::{SidebarPosition, Surface, SurfaceId, SurfaceKind, log_debug};
use nvmail_mail::{MessageBody, MessageMeta, with_auth_retry};

use super::App;

const LIST_SUBJECT_WIDTH: usize = 60;

fn format_list(account: &str, folder: &str, messages: &[MessageMeta]) -> String {
    let mut text = format!("{}/{} ({} messages)\n", account, folder, messages.len());
    for meta in messages {
        let marker = if meta.unread { '*' } else { ' ' };
        let subject: String = meta.subject.chars().take(LIST_SUBJECT_WIDTH).collect();
        text.push_str(&format!(
            "{} {:>6}  {:<16}  {:<28}  {}\n",
            marker, meta.id, meta.date, meta.from, subject
        ));
    }
    text
}

fn format_message(body: &MessageBody) -> String {
    let mut text = String::new();
    for (key, value) in &body.headers {
        text.push_str(&format!("{}: {}\n", key, value));
    }
    if !body.headers.is_empty() {
        text.push('\n');
    }
    text.push_str(&body.text);
    text
}

impl App {
    /// Opens (or refreshes) the sidebar list for `account/folder` and makes
    /// it the current navigation context.
    pub(crate) fn open_list(&mut self, account: &str, folder: &str) -> Result<SurfaceId> {
        self.show_list(account, folder).map(|(id, _)| id)
    }

    pub(crate) fn show_list(
        &mut self,
        account: &str,
        folder: &str,
    ) -> Result<(SurfaceId, Vec<MessageMeta>)> {
        self.load_list(account, folder, false)
    }

    /// Reopens the list for the session's own account and folder. The saved
    /// selection is left alone, on disk too.
    pub(crate) fn reopen_list(&mut self) -> Result<SurfaceId> {
        let account = self.session.account().to_string();
        let folder = self.session.folder().to_string();
        self.load_list(&account, &folder, true).map(|(id, _)| id)
    }

    fn load_list(
        &mut self,
        account: &str,
        folder: &str,
        keep_selection: bool,
    ) -> Result<(SurfaceId, Vec<MessageMeta>)> {
        let messages = with_auth_retry(self.backend.as_ref(), account, |b| b.list(account, folder))
            .map_err(|err| anyhow!("Cannot list {}/{}: {}", account, folder, err))?;
        self.session.set_account(account);
        self.session.set_folder(folder);
        if !keep_selection {
            self.session.set_selected_message(None);
        }
        let id = self.render_list(&messages)?;
        self.save_session();
        Ok((id, messages))
    }

    pub(crate) fn render_list(&mut self, messages: &[MessageMeta]) -> Result<SurfaceId> {
        let text = format_list(self.session.account(), self.session.folder(), messages);
        let surface = self.ensure_list_surface()?;
        self.host.write_buffer(surface.content, &text)?;
        Ok(surface.id)
    }

    fn ensure_list_surface(&mut self) -> Result<Surface> {
        if let Some(surface) = self.list_surface.clone() {
            if self.host.is_valid(surface.id) {
                self.host.focus(surface.id);
                return Ok(surface);
            }
            log_debug("list surface closed out of band, reopening");
            self.stack.forget(surface.id);
        }
        let previous = self.host.focused();
        let buffer = self.host.create_buffer();
        let id = self.host.open(SurfaceKind::List, buffer)?;
        self.host.resize(id, self.session.sidebar_width());
        let mut surface = Surface::new(id, SurfaceKind::List, buffer);
        self.stack.push(self.host.as_ref(), surface.clone(), previous)?;
        surface.parent = previous.filter(|p| *p != id);
        self.list_surface = Some(surface.clone());
        Ok(surface)
    }

    /// Reads `id` in a reading pane opened from the list.
    pub(crate) fn open_message(&mut self, id: &str) -> Result<SurfaceId> {
        self.read_message(id).map(|(surface, _)| surface)
    }

    pub(crate) fn read_message(&mut self, id: &str) -> Result<(SurfaceId, MessageBody)> {
        let account = self.session.account().to_string();
        let folder = self.session.folder().to_string();
        if account.is_empty() || folder.is_empty() {
            return Err(anyhow!("No folder selected"));
        }
        let body = with_auth_retry(self.backend.as_ref(), &account, |b| {
            b.fetch(&account, &folder, id)
        })
        .map_err(|err| anyhow!("Cannot read message {}: {}", id, err))?;

        let parent = self
            .list_surface
            .as_ref()
            .map(|s| s.id)
            .filter(|list| self.host.is_valid(*list))
            .or_else(|| self.host.focused());
        let buffer = self.host.create_buffer();
        self.host.write_buffer(buffer, &format_message(&body))?;
        let surface_id = self.host.open(SurfaceKind::Reading, buffer)?;
        let mut surface = Surface::new(surface_id, SurfaceKind::Reading, buffer);
        self.stack.push(self.host.as_ref(), surface.clone(), parent)?;
        surface.parent = parent;
        self.reading_surface = Some(surface);

        self.session.set_selected_message(Some(id.to_string()));
        self.save_session();
        Ok((surface_id, body))
    }

    /// Closes the focused surface through the stack. Surfaces the stack does
    /// not know about are simply closed.
    pub(crate) fn close_current(&mut self) -> bool {
        let focused = self.host.focused();
        let restored = self.stack.close_current(self.host.as_mut());
        if !restored {
            if let Some(id) = focused.filter(|id| self.host.is_valid(*id)) {
                self.host.close(id);
            }
        }
        if let Some(id) = focused {
            if self.list_surface.as_ref().map(|s| s.id) == Some(id) {
                self.list_surface = None;
            }
            if self.reading_surface.as_ref().map(|s| s.id) == Some(id) {
                self.reading_surface = None;
            }
        }
        restored
    }

    pub(crate) fn search(&mut self, query: &str) -> Result<Vec<MessageMeta>> {
        let account = self.session.account().to_string();
        let folder = self.session.folder().to_string();
        if account.is_empty() || folder.is_empty() {
            return Err(anyhow!("No folder selected"));
        }
        let results = with_auth_retry(self.backend.as_ref(), &account, |b| {
            b.search(&account, &folder, query)
        })
        .map_err(|err| anyhow!("Search failed: {}", err))?;
        self.session.set_last_search_query(query);
        self.session
            .set_last_search_results(Some(results.iter().map(|m| m.id.clone()).collect()));
        self.render_list(&results)?;
        self.save_session();
        Ok(results)
    }

    pub(crate) fn move_message(&mut self, id: &str, target: &str) -> Result<()> {
        let account = self.session.account().to_string();
        let folder = self.session.folder().to_string();
        with_auth_retry(self.backend.as_ref(), &account, |b| {
            b.move_message(&account, &folder, id, target)
        })
        .map_err(|err| anyhow!("Cannot move message {}: {}", id, err))?;
        self.forget_message(id);
        Ok(())
    }

    pub(crate) fn delete_message(&mut self, id: &str) -> Result<()> {
        let account = self.session.account().to_string();
        let folder = self.session.folder().to_string();
        with_auth_retry(self.backend.as_ref(), &account, |b| {
            b.delete(&account, &folder, id)
        })
        .map_err(|err| anyhow!("Cannot delete message {}: {}", id, err))?;
        self.forget_message(id);
        Ok(())
    }

    /// Drops `id` from the session once it left the folder, closing its
    /// reading pane if that is still open.
    fn forget_message(&mut self, id: &str) {
        if self.session.selected_message() != Some(id) {
            return;
        }
        self.session.set_selected_message(None);
        let reading = self.reading_surface.as_ref().map(|s| s.id);
        if let Some(reading) = reading.filter(|r| self.host.focus(*r)) {
            self.close_current();
            log_debug(&format!("closed reading pane {} for message {}", reading.0, id));
        }
        self.save_session();
    }

    pub(crate) fn resize_sidebar(&mut self, width: u16, position: SidebarPosition) {
        self.session.set_sidebar_width(width);
        self.session.set_sidebar_position(position);
        if let Some(surface) = self.list_surface.as_ref() {
            self.host.resize(surface.id, width);
        }
    }
}
