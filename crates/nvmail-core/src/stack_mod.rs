//! Parent/child bookkeeping for nested UI surfaces.
//!
//! The host's own "previous window" notion stops being reliable once a
//! reading pane opens a compose pane on top of it, so every surface is
//! registered here together with the surface it was opened from. Closing goes
//! through the stack, which then refocuses the recorded parent, or any other
//! open surface still showing the parent's buffer when the parent itself was
//! closed out of band.

use anyhow::{Result, bail};

use super::{BufferId, Surface, SurfaceHost, SurfaceId, log_debug};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StackHandle(u64);

#[derive(Debug, Clone)]
struct StackEntry {
    handle: StackHandle,
    surface: Surface,
    parent_content: Option<BufferId>,
}

#[derive(Debug, Default)]
pub struct SurfaceStack {
    entries: Vec<StackEntry>,
    next_handle: u64,
}

impl SurfaceStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `surface`. Without an explicit `parent` the host's focused
    /// surface at call time becomes the parent, unless that is the surface
    /// being registered. A surface can be registered only once; `forget` it
    /// first to register it again.
    pub fn push<H>(
        &mut self,
        host: &H,
        mut surface: Surface,
        parent: Option<SurfaceId>,
    ) -> Result<StackHandle>
    where
        H: SurfaceHost + ?Sized,
    {
        let parent = match parent {
            Some(parent) if parent == surface.id => {
                bail!("surface {} cannot be its own parent", surface.id.0);
            }
            Some(parent) => Some(parent),
            None => host.focused().filter(|focused| *focused != surface.id),
        };
        if let Some(parent) = parent {
            if self.is_ancestor(surface.id, parent) {
                bail!(
                    "surface {} is already an ancestor of surface {}",
                    surface.id.0,
                    parent.0
                );
            }
        }

        if self.contains(surface.id) {
            bail!("surface {} is already registered", surface.id.0);
        }

        surface.parent = parent;
        let parent_content = parent.and_then(|p| host.content_of(p));
        let handle = StackHandle(self.next_handle);
        self.next_handle += 1;
        self.entries.push(StackEntry {
            handle,
            surface,
            parent_content,
        });
        Ok(handle)
    }

    /// Closes the most recently pushed surface that is still open and
    /// refocuses its parent. Returns false when no focus could be restored.
    pub fn pop<H>(&mut self, host: &mut H) -> bool
    where
        H: SurfaceHost + ?Sized,
    {
        let Some(idx) = self
            .entries
            .iter()
            .rposition(|entry| host.is_valid(entry.surface.id))
        else {
            if !self.entries.is_empty() {
                log_debug("surface stack: pop found only closed surfaces");
            }
            return false;
        };
        let entry = self.entries.remove(idx);
        host.close(entry.surface.id);
        restore_parent(host, &entry)
    }

    /// Closes the focused surface wherever it sits in the stack, then
    /// refocuses its parent. Returns false when the focused surface is not
    /// tracked or no focus could be restored.
    pub fn close_current<H>(&mut self, host: &mut H) -> bool
    where
        H: SurfaceHost + ?Sized,
    {
        let Some(current) = host.focused() else {
            return false;
        };
        let Some(idx) = self.index_of(current) else {
            return false;
        };
        let entry = self.entries.remove(idx);
        host.close(entry.surface.id);
        restore_parent(host, &entry)
    }

    /// Drops the entry for a surface the host already closed. Focus is left
    /// to whoever closed it.
    pub fn forget(&mut self, surface: SurfaceId) -> bool {
        match self.index_of(surface) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, handle: StackHandle) -> Option<&Surface> {
        self.entries
            .iter()
            .find(|entry| entry.handle == handle)
            .map(|entry| &entry.surface)
    }

    pub fn top(&self) -> Option<&Surface> {
        self.entries.last().map(|entry| &entry.surface)
    }

    pub fn contains(&self, surface: SurfaceId) -> bool {
        self.index_of(surface).is_some()
    }

    fn index_of(&self, surface: SurfaceId) -> Option<usize> {
        self.entries
            .iter()
            .rposition(|entry| entry.surface.id == surface)
    }

    fn parent_of(&self, surface: SurfaceId) -> Option<SurfaceId> {
        self.index_of(surface)
            .and_then(|idx| self.entries[idx].surface.parent)
    }

    fn is_ancestor(&self, candidate: SurfaceId, of: SurfaceId) -> bool {
        let mut cursor = Some(of);
        // Parent chains are acyclic, so the walk can never exceed the stack.
        for _ in 0..=self.entries.len() {
            match cursor {
                Some(id) if id == candidate => return true,
                Some(id) => cursor = self.parent_of(id),
                None => return false,
            }
        }
        false
    }
}

fn restore_parent<H>(host: &mut H, entry: &StackEntry) -> bool
where
    H: SurfaceHost + ?Sized,
{
    let Some(parent) = entry.surface.parent else {
        return false;
    };
    if host.is_valid(parent) && host.focus(parent) {
        return true;
    }
    log_debug(&format!(
        "surface stack: parent {} of {} is gone, searching by content",
        parent.0, entry.surface.id.0
    ));
    let Some(content) = entry.parent_content else {
        return false;
    };
    for candidate in host.open_surfaces() {
        if candidate == entry.surface.id || !host.is_valid(candidate) {
            continue;
        }
        if host.content_of(candidate) == Some(content) && host.focus(candidate) {
            return true;
        }
    }
    false
}
