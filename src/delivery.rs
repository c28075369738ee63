//! Per-consumer delivery loop: the `IDLE -> HOLDING -> AWAIT_ACK` state
//! machine from spec.md §4.5, decoupled from the network so it can be
//! driven directly in tests and by the real connection handler in
//! `connection.rs`.

use std::sync::Arc;

use uuid::Uuid;

use crate::message::Message;
use crate::queue::Queue;

/// What the delivery loop wants the caller (the connection handler) to do
/// next. Decoupling "what was decided" from "how it's sent over the wire"
/// keeps this module testable without a socket.
pub enum DeliveryOutcome {
    /// A message was dequeued, assigned an id, and is now awaiting ack.
    /// The caller must send it and then call `ack`/`nack_disconnect`.
    Delivered(Message),
    /// The queue was closed and fully drained; the subscription ends.
    QueueClosed,
}

/// Drives one consumer's prefetch-1 subscription against `queue`.
///
/// Invariant (spec.md §4.5): at most one message is ever in `AWAIT_ACK` for
/// a given `Delivery` at a time — enforced structurally, since `next()`
/// can't be called again until the in-flight message from the previous call
/// has been resolved via `ack` or `nack_disconnect`.
pub struct Delivery {
    queue: Arc<Queue>,
    in_flight: Option<Message>,
}

impl Delivery {
    pub fn new(queue: Arc<Queue>) -> Self {
        Delivery {
            queue,
            in_flight: None,
        }
    }

    /// `IDLE --dequeue--> HOLDING --assign_id, inc delivery_count--> AWAIT_ACK`.
    ///
    /// Blocks (suspends the calling thread) until a message is available or
    /// the queue closes.
    pub fn next(&mut self) -> DeliveryOutcome {
        debug_assert!(
            self.in_flight.is_none(),
            "next() called while a previous delivery is still awaiting ack"
        );
        let Some(mut msg) = self.queue.dequeue() else {
            return DeliveryOutcome::QueueClosed;
        };
        // The broker assigns `id` only on this transition (spec.md §4.5);
        // an unpublished/buffered message has none.
        msg.begin_dispatch(Uuid::new_v4().to_string());
        self.queue.register_inflight(msg.clone());
        self.in_flight = Some(msg.clone());
        DeliveryOutcome::Delivered(msg)
    }

    /// `AWAIT_ACK --ack matches msg.id--> commit, back to IDLE`.
    ///
    /// Returns `false` if `ack_id` doesn't match the message currently
    /// awaiting ack (mismatched id or no delivery in flight) — the caller
    /// must treat that as a `ProtocolError` per spec.md §4.5 and call
    /// `abandon` to redeliver instead.
    pub fn ack(&mut self, ack_id: &str) -> bool {
        match self.in_flight.take() {
            Some(msg) if msg.id() == Some(ack_id) => {
                self.queue.commit(ack_id);
                true
            }
            Some(msg) => {
                // Put it back so `abandon`/the caller's error path still
                // has a well-defined message to requeue.
                self.in_flight = Some(msg);
                false
            }
            None => false,
        }
    }

    /// `AWAIT_ACK --ack mismatch/connection error--> re-enqueue msg`.
    ///
    /// Covers both termination paths out of `AWAIT_ACK` other than a
    /// successful commit: a malformed/mismatched ACK (ProtocolError) and a
    /// connection error or close. Either way the message is returned to the
    /// queue with `delivery_count` already incremented, per spec.md §4.5.
    pub fn abandon(&mut self) {
        if let Some(msg) = self.in_flight.take() {
            self.queue.nack_return(msg);
        }
    }

    /// Whether a message is currently awaiting ack on this subscription.
    pub fn has_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        // Connection dropped/panicked with a message still outstanding:
        // spec.md §4.5 requires it be returned to the queue regardless of
        // how the subscription ended.
        self.abandon();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn msg(body: &'static str) -> Message {
        Message::new(Bytes::from_static(body.as_bytes()), None)
    }

    #[test]
    fn delivers_with_incrementing_delivery_count_on_redelivery() {
        let queue = Arc::new(Queue::new("q"));
        queue.enqueue(msg("m"));

        let mut d1 = Delivery::new(Arc::clone(&queue));
        let first_id = match d1.next() {
            DeliveryOutcome::Delivered(m) => {
                assert_eq!(m.delivery_count(), 1);
                m.id().unwrap().to_string()
            }
            _ => panic!("expected delivery"),
        };
        // Consumer disconnects without acking.
        drop(d1);

        let mut d2 = Delivery::new(Arc::clone(&queue));
        match d2.next() {
            DeliveryOutcome::Delivered(m) => {
                assert_eq!(m.delivery_count(), 2);
                assert_ne!(m.id().unwrap(), first_id, "redelivery gets a fresh id");
            }
            _ => panic!("expected redelivery"),
        }
        assert!(d2.ack(d2_current_id(&d2)));
    }

    fn d2_current_id(d: &Delivery) -> &str {
        d.in_flight.as_ref().unwrap().id().unwrap()
    }

    #[test]
    fn ack_mismatch_does_not_commit() {
        let queue = Arc::new(Queue::new("q"));
        queue.enqueue(msg("m"));
        let mut d = Delivery::new(Arc::clone(&queue));
        d.next();
        assert!(!d.ack("not-the-right-id"));
        assert!(d.has_in_flight());
    }

    #[test]
    fn abandon_returns_message_to_head_of_queue() {
        let queue = Arc::new(Queue::new("q"));
        queue.enqueue(msg("first"));
        queue.enqueue(msg("second"));

        let mut d = Delivery::new(Arc::clone(&queue));
        d.next(); // dequeues "first"
        d.abandon();

        let mut d2 = Delivery::new(Arc::clone(&queue));
        match d2.next() {
            DeliveryOutcome::Delivered(m) => assert_eq!(m.body().as_ref(), b"first"),
            _ => panic!("expected redelivery of first"),
        }
    }

    #[test]
    fn queue_closed_yields_terminal_outcome() {
        let queue = Arc::new(Queue::new("q"));
        queue.close();
        let mut d = Delivery::new(queue);
        assert!(matches!(d.next(), DeliveryOutcome::QueueClosed));
    }
}
