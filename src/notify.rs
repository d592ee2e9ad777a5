//! Notification collaborator seam
//!
//! The engine hands a reservation identifier to an out-of-process consumer
//! (email, receipts) after a successful allocate or release. Delivery is
//! fire-and-forget: a failed or absent consumer never fails, blocks, or
//! rolls back the operation that triggered it.

use crossbeam::channel::{unbounded, Receiver, Sender};

/// Event emitted after a successful engine mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// A reservation was created (automatic or explicit-interval booking)
    Booked {
        /// The new reservation
        reservation_id: u64,
    },
    /// An open reservation was checked out
    Released {
        /// The closed reservation
        reservation_id: u64,
    },
}

/// Sink for post-commit notifications
pub trait Notifier: Send + Sync {
    /// Deliver an event; implementations must not block or fail the caller
    fn notify(&self, event: Notification);
}

/// Notifier that drops every event (tests, cacheless embedding)
#[derive(Debug, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _event: Notification) {}
}

/// Notifier backed by an unbounded crossbeam channel.
///
/// The receiving half is handed to the job-queue consumer; if it has hung
/// up, events are dropped with a warning.
pub struct ChannelNotifier {
    tx: Sender<Notification>,
}

impl ChannelNotifier {
    /// Create a notifier and the receiver its consumer drains
    pub fn new() -> (Self, Receiver<Notification>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, event: Notification) {
        if self.tx.send(event).is_err() {
            tracing::warn!(?event, "notification consumer hung up; event dropped");
        }
    }
}
