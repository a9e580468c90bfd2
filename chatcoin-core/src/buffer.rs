use crate::types::ChatEvent;
use parking_lot::RwLock;
use std::collections::VecDeque;

/// Ephemeral ring of recent chat events. Serves fast UI reads and the
/// spam filter's recent-history lookup before the durable path catches
/// up; never consulted for balance math.
pub struct EventBuffer {
    capacity: usize,
    events: RwLock<VecDeque<ChatEvent>>,
}

impl EventBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn push(&self, event: ChatEvent) {
        let mut events = self.events.write();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Most recent events first.
    pub fn recent(&self, limit: usize) -> Vec<ChatEvent> {
        let events = self.events.read();
        events.iter().rev().take(limit).cloned().collect()
    }

    pub fn recent_for_user(&self, user_id: &str, limit: usize) -> Vec<ChatEvent> {
        let events = self.events.read();
        events
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn recent_for_session(&self, stream_session_id: &str, limit: usize) -> Vec<ChatEvent> {
        let events = self.events.read();
        events
            .iter()
            .rev()
            .filter(|e| e.stream_session_id.as_deref() == Some(stream_session_id))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn contains_event(&self, event_id: &str) -> bool {
        let events = self.events.read();
        events.iter().any(|e| e.event_id == event_id)
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}
