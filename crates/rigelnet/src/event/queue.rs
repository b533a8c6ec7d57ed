use std::collections::VecDeque;

use super::types::Event;

pub const DEFAULT_EVENT_CAPACITY: usize = 256;

pub trait EventListener {
    fn on_event(&mut self, event: &Event);
}

impl<F: FnMut(&Event)> EventListener for F {
    fn on_event(&mut self, event: &Event) {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Fans node events out to listeners and keeps a bounded backlog for polling.
pub struct EventQueue {
    pending: VecDeque<Event>,
    max_pending: usize,
    listeners: Vec<(ListenerId, Box<dyn EventListener>)>,
    next_listener_id: u64,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventQueue {
    pub fn new(max_pending: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(max_pending),
            max_pending: max_pending.max(1),
            listeners: Vec::new(),
            next_listener_id: 0,
        }
    }

    pub fn add_listener(&mut self, listener: Box<dyn EventListener>) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.push((id, listener));
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    pub fn push(&mut self, event: Event) {
        for (_, listener) in &mut self.listeners {
            listener.on_event(&event);
        }

        if self.pending.len() >= self.max_pending {
            if let Some(dropped) = self.pending.pop_front() {
                log::warn!("Event backlog full, dropping {:?}", dropped);
            }
        }
        self.pending.push_back(event);
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = Event>) {
        for event in events {
            self.push(event);
        }
    }

    pub fn poll(&mut self) -> Option<Event> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
