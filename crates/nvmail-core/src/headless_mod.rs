use std::collections::HashMap;

use anyhow::{Result, anyhow};

use super::{BufferId, SurfaceHost, SurfaceId, SurfaceKind};

#[derive(Debug, Clone)]
struct HeadlessSurface {
    id: SurfaceId,
    kind: SurfaceKind,
    content: BufferId,
    width: Option<u16>,
}

/// In-memory surface host for runs without an attached editor.
///
/// Opening a surface focuses it. Closing the focused surface hands focus to
/// the most recently opened surface that is still open, which is the
/// z-order guess an editor would make on its own.
#[derive(Debug, Default)]
pub struct HeadlessHost {
    surfaces: Vec<HeadlessSurface>,
    buffers: HashMap<BufferId, String>,
    focused: Option<SurfaceId>,
    next_surface: u64,
    next_buffer: u64,
}

impl HeadlessHost {
    pub fn new() -> Self {
        Self {
            next_surface: 1,
            next_buffer: 1,
            ..Self::default()
        }
    }

    pub fn kind_of(&self, surface: SurfaceId) -> Option<SurfaceKind> {
        self.find(surface).map(|s| s.kind)
    }

    pub fn width_of(&self, surface: SurfaceId) -> Option<u16> {
        self.find(surface).and_then(|s| s.width)
    }

    pub fn text_of(&self, surface: SurfaceId) -> Option<&str> {
        let content = self.find(surface)?.content;
        self.buffers.get(&content).map(String::as_str)
    }

    fn find(&self, surface: SurfaceId) -> Option<&HeadlessSurface> {
        self.surfaces.iter().find(|s| s.id == surface)
    }
}

impl SurfaceHost for HeadlessHost {
    fn create_buffer(&mut self) -> BufferId {
        let id = BufferId(self.next_buffer);
        self.next_buffer += 1;
        self.buffers.insert(id, String::new());
        id
    }

    fn open(&mut self, kind: SurfaceKind, content: BufferId) -> Result<SurfaceId> {
        if !self.buffers.contains_key(&content) {
            return Err(anyhow!("buffer {} does not exist", content.0));
        }
        let id = SurfaceId(self.next_surface);
        self.next_surface += 1;
        self.surfaces.push(HeadlessSurface {
            id,
            kind,
            content,
            width: None,
        });
        self.focused = Some(id);
        Ok(id)
    }

    fn close(&mut self, surface: SurfaceId) {
        self.surfaces.retain(|s| s.id != surface);
        if self.focused == Some(surface) {
            self.focused = self.surfaces.last().map(|s| s.id);
        }
    }

    fn focus(&mut self, surface: SurfaceId) -> bool {
        if self.is_valid(surface) {
            self.focused = Some(surface);
            true
        } else {
            false
        }
    }

    fn resize(&mut self, surface: SurfaceId, width: u16) -> bool {
        match self.surfaces.iter_mut().find(|s| s.id == surface) {
            Some(s) => {
                s.width = Some(width);
                true
            }
            None => false,
        }
    }

    fn is_valid(&self, surface: SurfaceId) -> bool {
        self.find(surface).is_some()
    }

    fn focused(&self) -> Option<SurfaceId> {
        self.focused
    }

    fn content_of(&self, surface: SurfaceId) -> Option<BufferId> {
        self.find(surface).map(|s| s.content)
    }

    fn open_surfaces(&self) -> Vec<SurfaceId> {
        self.surfaces.iter().map(|s| s.id).collect()
    }

    fn read_buffer(&self, buffer: BufferId) -> Option<String> {
        self.buffers.get(&buffer).cloned()
    }

    fn write_buffer(&mut self, buffer: BufferId, text: &str) -> Result<()> {
        let slot = self
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| anyhow!("buffer {} does not exist", buffer.0))?;
        *slot = text.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::HeadlessHost;
    use crate::{BufferId, SurfaceHost, SurfaceKind};

    #[test]
    fn closing_focused_surface_falls_back_to_latest_open() -> anyhow::Result<()> {
        let mut host = HeadlessHost::new();
        let buffer = host.create_buffer();
        let first = host.open(SurfaceKind::List, buffer)?;
        let second = host.open(SurfaceKind::Reading, buffer)?;
        let third = host.open(SurfaceKind::Compose, buffer)?;
        host.focus(second);
        host.close(second);
        assert_eq!(host.focused(), Some(third));
        host.close(third);
        assert_eq!(host.focused(), Some(first));
        host.close(first);
        assert_eq!(host.focused(), None);
        Ok(())
    }

    #[test]
    fn buffers_survive_their_surfaces() -> anyhow::Result<()> {
        let mut host = HeadlessHost::new();
        let buffer = host.create_buffer();
        host.write_buffer(buffer, "hello")?;
        let surface = host.open(SurfaceKind::Reading, buffer)?;
        assert_eq!(host.text_of(surface), Some("hello"));
        host.close(surface);
        assert_eq!(host.read_buffer(buffer).as_deref(), Some("hello"));
        assert!(host.open(SurfaceKind::Other, BufferId(4242)).is_err());
        Ok(())
    }

    #[test]
    fn resize_only_applies_to_open_surfaces() -> anyhow::Result<()> {
        let mut host = HeadlessHost::new();
        let buffer = host.create_buffer();
        let list = host.open(SurfaceKind::List, buffer)?;
        assert_eq!(host.width_of(list), None);
        assert!(host.resize(list, 48));
        assert_eq!(host.width_of(list), Some(48));
        assert_eq!(host.kind_of(list), Some(SurfaceKind::List));
        host.close(list);
        assert!(!host.resize(list, 60));
        assert_eq!(host.kind_of(list), None);
        Ok(())
    }
}
