use std::collections::VecDeque;

use tracing::warn;

use crate::engine::types::DiffEvent;

/// Bounded FIFO of diff events received while the book is not synced.
#[derive(Debug)]
pub struct DiffBuffer {
    events: VecDeque<DiffEvent>,
    capacity: usize,
}

impl DiffBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { events: VecDeque::new(), capacity: capacity.max(1) }
    }

    /// Append an event. Returns how many of the oldest events were dropped to
    /// stay within capacity.
    pub fn push(&mut self, d: DiffEvent) -> usize {
        self.events.push_back(d);
        let mut dropped = 0;
        while self.events.len() > self.capacity {
            self.events.pop_front();
            dropped += 1;
        }
        if dropped > 0 {
            warn!(dropped, capacity = self.capacity, "Diff buffer overflow, dropped oldest events");
        }
        dropped
    }

    pub fn push_front(&mut self, d: DiffEvent) {
        self.events.push_front(d);
    }

    pub fn pop_front(&mut self) -> Option<DiffEvent> {
        self.events.pop_front()
    }

    /// Drop every event whose final id is below `last_update_id`.
    pub fn discard_stale(&mut self, last_update_id: u64) -> usize {
        let before = self.events.len();
        self.events.retain(|d| d.final_update_id >= last_update_id);
        before - self.events.len()
    }

    /// Position of the first event whose range covers `id`.
    pub fn find_straddling(&self, id: u64) -> Option<usize> {
        self.events.iter().position(|d| d.straddles(id))
    }

    /// Remove the event at `index` and everything before it, returning that event.
    pub fn take_through(&mut self, index: usize) -> Option<DiffEvent> {
        if index >= self.events.len() {
            return None;
        }
        self.events.drain(..index);
        self.events.pop_front()
    }

    /// True when some buffered event starts past `id`, meaning `id` can no
    /// longer be covered by anything the stream will deliver.
    pub fn has_event_after(&self, id: u64) -> bool {
        self.events.iter().any(|d| d.first_update_id > id)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(first: u64, last: u64) -> DiffEvent {
        DiffEvent {
            first_update_id: first,
            final_update_id: last,
            prev_final_update_id: first.saturating_sub(1),
            bid_updates: vec![],
            ask_updates: vec![],
        }
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mut buf = DiffBuffer::with_capacity(2);
        assert_eq!(buf.push(ev(1, 1)), 0);
        assert_eq!(buf.push(ev(2, 2)), 0);
        assert_eq!(buf.push(ev(3, 3)), 1);
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.pop_front().map(|d| d.first_update_id), Some(2));
    }

    #[test]
    fn test_discard_stale_keeps_boundary() {
        let mut buf = DiffBuffer::with_capacity(10);
        buf.push(ev(90, 95));
        buf.push(ev(96, 100));
        buf.push(ev(101, 104));
        assert_eq!(buf.discard_stale(100), 1);
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.pop_front().map(|d| d.final_update_id), Some(100));
    }

    #[test]
    fn test_take_through_removes_prefix() {
        let mut buf = DiffBuffer::with_capacity(10);
        buf.push(ev(90, 95));
        buf.push(ev(96, 101));
        buf.push(ev(102, 104));
        let idx = buf.find_straddling(101).unwrap();
        assert_eq!(idx, 1);
        let anchor = buf.take_through(idx).unwrap();
        assert_eq!(anchor.first_update_id, 96);
        assert_eq!(buf.len(), 1);
        assert!(buf.take_through(5).is_none());
    }

    #[test]
    fn test_has_event_after() {
        let mut buf = DiffBuffer::with_capacity(10);
        buf.push(ev(96, 100));
        assert!(!buf.has_event_after(101));
        buf.push(ev(105, 106));
        assert!(buf.has_event_after(101));
    }
}
