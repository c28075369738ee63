//! Direct exchange: exact routing-key match against a multi-valued binding
//! table. Grounded on `server/direct_exchange.go` in `original_source/`.

use std::sync::{Arc, RwLock, Weak};

use indexmap::IndexMap;

use crate::message::Message;
use crate::queue::Queue;

pub(super) struct DirectExchange {
    // IndexMap preserves insertion order per routing key, so routing
    // delivers to bound queues in bind order (spec.md §4.3.1 tie-breaking).
    // Weak, not Arc: the broker's registry is the sole strong owner of a
    // queue (spec.md §3) — a binding must not keep a dropped queue alive.
    bindings: RwLock<IndexMap<String, Vec<Weak<Queue>>>>,
}

impl DirectExchange {
    pub(super) fn new() -> Self {
        DirectExchange {
            bindings: RwLock::new(IndexMap::new()),
        }
    }

    pub(super) fn bind(&self, queue: Arc<Queue>, routing_key: String) {
        let mut bindings = self.bindings.write().unwrap();
        bindings
            .entry(routing_key)
            .or_default()
            .push(Arc::downgrade(&queue));
    }

    pub(super) fn route(&self, msg: &Message, routing_key: &str) {
        let bindings = self.bindings.read().unwrap();
        if let Some(queues) = bindings.get(routing_key) {
            for q in queues {
                if let Some(q) = q.upgrade() {
                    q.enqueue(msg.clone());
                }
            }
        }
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
    fn exact_key_match_only() {
        let ex = DirectExchange::new();
        let q1 = Arc::new(Queue::new("q1"));
        let q2 = Arc::new(Queue::new("q2"));
        ex.bind(Arc::clone(&q1), "k1".to_string());
        ex.bind(Arc::clone(&q2), "k2".to_string());

        ex.route(&msg("hello"), "k1");
        assert_eq!(q1.len(), 1);
        assert_eq!(q2.len(), 0);
    }

    #[test]
    fn unmatched_route_is_silent() {
        let ex = DirectExchange::new();
        let q = Arc::new(Queue::new("q"));
        ex.bind(q, "k1".to_string());
        ex.route(&msg("hello"), "unbound-key");
        // no panic, no queues touched
    }

    #[test]
    fn multiple_bindings_deliver_in_insertion_order() {
        let ex = DirectExchange::new();
        let a = Arc::new(Queue::new("a"));
        let b = Arc::new(Queue::new("b"));
        ex.bind(Arc::clone(&a), "k".to_string());
        ex.bind(Arc::clone(&b), "k".to_string());

        ex.route(&msg("x"), "k");
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
    }
}
