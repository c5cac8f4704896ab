//! One-way invalidation messages for the geometry/rendering collaborator
//!
//! Requests fire these after mutating entities and never wait for them to be
//! handled. The receiving side drains the channel at its own pace.

use crossbeam_channel::{Receiver, Sender};
use hearth_core::EntityId;

/// A "cached derived data is stale" notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    /// Placement changed
    Position(EntityId),
    /// Shape changed
    Geometry(EntityId),
    /// Clipping against hosts needs recomputing
    ClipGeometry(EntityId),
    /// Child models need rebuilding
    ChildModels { entity: EntityId, recursive: bool },
}

impl Invalidation {
    /// The entity the message is about
    pub fn entity(&self) -> &EntityId {
        match self {
            Self::Position(id) | Self::Geometry(id) | Self::ClipGeometry(id) => id,
            Self::ChildModels { entity, .. } => entity,
        }
    }
}

/// Sending half held by the document. Unconnected queues drop messages.
#[derive(Debug, Clone, Default)]
pub struct InvalidationQueue {
    sender: Option<Sender<Invalidation>>,
}

impl InvalidationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a fresh unbounded channel, replacing any previous one
    pub fn connect(&mut self) -> Receiver<Invalidation> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.sender = Some(tx);
        rx
    }

    pub fn disconnect(&mut self) {
        self.sender = None;
    }

    pub fn is_connected(&self) -> bool {
        self.sender.is_some()
    }

    /// Fire and forget
    pub fn send(&self, message: Invalidation) {
        let Some(tx) = &self.sender else {
            return;
        };
        if tx.send(message).is_err() {
            log::trace!(target: "hearth::invalidate", "Invalidation receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_arrive_in_order() {
        let mut queue = InvalidationQueue::new();
        let rx = queue.connect();

        queue.send(Invalidation::Position(EntityId::new("a")));
        queue.send(Invalidation::Geometry(EntityId::new("b")));

        let got: Vec<_> = rx.try_iter().collect();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0], Invalidation::Position(EntityId::new("a")));
    }

    #[test]
    fn test_send_survives_dropped_receiver() {
        let mut queue = InvalidationQueue::new();
        drop(queue.connect());
        queue.send(Invalidation::ClipGeometry(EntityId::new("a")));

        let unconnected = InvalidationQueue::new();
        unconnected.send(Invalidation::Geometry(EntityId::new("a")));
    }
}
