//! Fanout exchange: routing key ignored, every bound queue gets a copy.
//! Grounded on `server/fanout_exchange.go` in `original_source/`.

use std::sync::{Arc, RwLock, Weak};

use crate::message::Message;
use crate::queue::Queue;

pub(super) struct FanoutExchange {
    // Weak: the broker's registry is the sole strong owner of a queue
    // (spec.md §3).
    queues: RwLock<Vec<Weak<Queue>>>,
}

impl FanoutExchange {
    pub(super) fn new() -> Self {
        FanoutExchange {
            queues: RwLock::new(Vec::new()),
        }
    }

    pub(super) fn bind(&self, queue: Arc<Queue>) {
        self.queues.write().unwrap().push(Arc::downgrade(&queue));
    }

    pub(super) fn route(&self, msg: &Message) {
        let queues = self.queues.read().unwrap();
        for q in queues.iter() {
            if let Some(q) = q.upgrade() {
                q.enqueue(msg.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn reaches_every_bound_queue_exactly_once() {
        let ex = FanoutExchange::new();
        let q1 = Arc::new(Queue::new("q1"));
        let q2 = Arc::new(Queue::new("q2"));
        ex.bind(Arc::clone(&q1));
        ex.bind(Arc::clone(&q2));

        ex.route(&Message::new(Bytes::from_static(b"hi"), None));

        assert_eq!(q1.len(), 1);
        assert_eq!(q2.len(), 1);
    }
}
