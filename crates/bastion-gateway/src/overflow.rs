// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded drop-oldest buffer for events that did not fit the stream.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bastion_core::Event;

#[derive(Debug)]
pub struct OverflowBuffer {
    capacity: usize,
    events: Mutex<VecDeque<Event>>,
}

impl OverflowBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Event>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append, evicting and returning the oldest event when full.
    pub fn push(&self, event: Event) -> Option<Event> {
        let mut events = self.lock();
        let evicted = if events.len() >= self.capacity {
            events.pop_front()
        } else {
            None
        };
        events.push_back(event);
        evicted
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest-first copy of the buffered events.
    pub fn snapshot(&self) -> Vec<Event> {
        self.lock().iter().cloned().collect()
    }

    /// Remove and return everything, oldest first.
    pub fn drain(&self) -> Vec<Event> {
        self.lock().drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str) -> Event {
        Event {
            event_id: id.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn evicts_oldest_when_full() {
        let buffer = OverflowBuffer::new(2);
        assert!(buffer.push(event("$1")).is_none());
        assert!(buffer.push(event("$2")).is_none());
        let evicted = buffer.push(event("$3")).unwrap();
        assert_eq!(evicted.event_id, "$1");

        let ids: Vec<_> = buffer.snapshot().into_iter().map(|e| e.event_id).collect();
        assert_eq!(ids, vec!["$2", "$3"]);
    }

    #[test]
    fn drain_empties_the_buffer() {
        let buffer = OverflowBuffer::new(4);
        buffer.push(event("$1"));
        buffer.push(event("$2"));
        assert_eq!(buffer.drain().len(), 2);
        assert!(buffer.is_empty());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let buffer = OverflowBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
        buffer.push(event("$1"));
        buffer.push(event("$2"));
        assert_eq!(buffer.len(), 1);
    }
}
