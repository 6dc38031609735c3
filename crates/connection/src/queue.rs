//! Outbound event queue.

use eventline_protocol::Event;

/// FIFO buffer of outbound events, owned exclusively by its connection.
///
/// `flush` is the only removal operation: it takes the entire current
/// contents as one snapshot. Events enqueued during a flush land in the
/// next batch — the connection actor serializes the two operations.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: Vec<Event>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event at the tail.
    pub fn enqueue(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Takes the entire current contents, leaving the queue empty.
    /// Insertion order is preserved.
    pub fn flush(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
