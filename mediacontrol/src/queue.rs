//! Local mirror of a remote cast queue.
//!
//! The mirror only reflects requests the receiver acknowledged: the remote
//! coordinator mutates it when a queue request completes, never when it is
//! issued. It lives as long as the connected session and is cleared on
//! disconnect.

use crate::descriptor::MediaDescriptor;
use crate::errors::ControlError;

#[derive(Clone, Debug, Default)]
pub struct CastQueue {
    items: Vec<MediaDescriptor>,
    current_index: Option<usize>,
}

impl CastQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[MediaDescriptor] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn current(&self) -> Option<&MediaDescriptor> {
        self.current_index.and_then(|i| self.items.get(i))
    }

    pub fn position_of(&self, descriptor_id: &str) -> Option<usize> {
        self.items.iter().position(|d| d.id() == descriptor_id)
    }

    pub fn contains(&self, descriptor_id: &str) -> bool {
        self.position_of(descriptor_id).is_some()
    }

    /// Replaces the whole queue. An out-of-range index is dropped.
    pub fn replace(&mut self, items: Vec<MediaDescriptor>, current_index: Option<usize>) {
        self.items = items;
        self.current_index = current_index.filter(|&i| i < self.items.len());
    }

    /// Appends at the end, leaving the current index untouched.
    pub fn append(&mut self, descriptor: MediaDescriptor) {
        self.items.push(descriptor);
    }

    pub fn set_index(&mut self, index: Option<usize>) -> Result<(), ControlError> {
        match index {
            None => self.current_index = None,
            Some(i) if i < self.items.len() => self.current_index = Some(i),
            Some(i) => {
                return Err(ControlError::InvalidDescriptor(format!(
                    "Index out of bound {} >= {}",
                    i,
                    self.items.len()
                )));
            }
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.current_index = None;
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            items: self.items.clone(),
            current_index: self.current_index,
        }
    }
}

/// Read-only copy of the mirror, published with `QueueChanged`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueueSnapshot {
    pub items: Vec<MediaDescriptor>,
    pub current_index: Option<usize>,
}

impl QueueSnapshot {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Descriptor ids in queue order.
    pub fn ids(&self) -> Vec<&str> {
        self.items.iter().map(|d| d.id()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: &str) -> MediaDescriptor {
        MediaDescriptor::builder(id, format!("https://example.com/{}.m3u8", id))
            .build()
            .unwrap()
    }

    #[test]
    fn test_replace_drops_out_of_range_index() {
        let mut queue = CastQueue::new();
        queue.replace(vec![descriptor("a")], Some(3));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.current_index(), None);

        queue.replace(vec![descriptor("a"), descriptor("b")], Some(1));
        assert_eq!(queue.current().map(|d| d.id()), Some("b"));
    }

    #[test]
    fn test_append_keeps_current_item() {
        let mut queue = CastQueue::new();
        queue.replace(vec![descriptor("a")], Some(0));
        queue.append(descriptor("b"));
        queue.append(descriptor("c"));

        let snapshot = queue.snapshot();
        assert_eq!(snapshot.ids(), vec!["a", "b", "c"]);
        assert_eq!(snapshot.current_index, Some(0));
        assert_eq!(queue.position_of("c"), Some(2));
        assert!(queue.contains("b"));
    }

    #[test]
    fn test_set_index_bounds() {
        let mut queue = CastQueue::new();
        queue.replace(vec![descriptor("a"), descriptor("b")], None);
        assert!(queue.set_index(Some(1)).is_ok());
        assert!(queue.set_index(Some(2)).is_err());
        assert_eq!(queue.current_index(), Some(1));

        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.current_index(), None);
    }
}
