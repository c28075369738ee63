//! FIFO message buffer with blocking dequeue and head-insert redelivery.
//!
//! The teacher crate hands blocking receive off to `crossbeam_channel`, but a
//! channel has no way to push a message back onto the *front* of the queue,
//! which spec.md §4.2 requires for nacked messages ("re-insertion is at the
//! head ... so redelivery latency is minimized"). A `Mutex` guarding a
//! `VecDeque`, paired with a `Condvar` for the blocking wait, gives the same
//! race-free in-process hand-off the teacher gets from its channels while
//! still allowing head insertion.

use std::collections::{HashMap, VecDeque};
use std::sync::{Condvar, Mutex};

use crate::message::Message;

struct QueueState {
    buffer: VecDeque<Message>,
    in_flight: HashMap<String, Message>,
    closed: bool,
}

/// A named, in-memory FIFO queue.
///
/// Invariant (spec.md §3): a message is either in `buffer` xor in
/// `in_flight`, never both, never neither, while owned by the queue.
pub struct Queue {
    name: String,
    state: Mutex<QueueState>,
    not_empty: Condvar,
}

impl Queue {
    pub fn new(name: impl Into<String>) -> Self {
        Queue {
            name: name.into(),
            state: Mutex::new(QueueState {
                buffer: VecDeque::new(),
                in_flight: HashMap::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends to the buffer tail. Never blocks: the design treats queues as
    /// unbounded in memory (spec.md §5).
    pub fn enqueue(&self, msg: Message) {
        let mut state = self.state.lock().unwrap();
        state.buffer.push_back(msg);
        self.not_empty.notify_one();
    }

    /// Removes from the buffer head, suspending the caller while the buffer
    /// is empty. Returns `None` only once the queue has been closed and
    /// fully drained — the terminal sentinel spec.md §4.2 allows in lieu of
    /// raising a closed-queue error.
    pub fn dequeue(&self) -> Option<Message> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(msg) = state.buffer.pop_front() {
                return Some(msg);
            }
            if state.closed {
                return None;
            }
            state = self.not_empty.wait(state).unwrap();
        }
    }

    /// Moves a dequeued, id-assigned message into the in-flight map, keyed
    /// by its id, pending ack.
    pub fn register_inflight(&self, msg: Message) {
        let id = msg
            .id()
            .expect("register_inflight requires an id-assigned message")
            .to_string();
        let mut state = self.state.lock().unwrap();
        state.in_flight.insert(id, msg);
    }

    /// Removes a message from in-flight on successful ack. Returns `true` if
    /// a message with that id was actually in flight.
    pub fn commit(&self, msg_id: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        state.in_flight.remove(msg_id).is_some()
    }

    /// Re-inserts a previously dequeued message at the buffer head,
    /// clearing its id (spec.md §4.5: it is reassigned a new one on its
    /// next attempt) and removing any in-flight record for it.
    pub fn nack_return(&self, mut msg: Message) {
        let mut state = self.state.lock().unwrap();
        if let Some(id) = msg.id() {
            state.in_flight.remove(id);
        }
        msg.reset_for_redelivery();
        state.buffer.push_front(msg);
        self.not_empty.notify_one();
    }

    /// Marks the queue closed and wakes every blocked dequeuer. Used only at
    /// broker shutdown (spec.md §5 cancellation).
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        self.not_empty.notify_all();
    }

    pub fn len(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn msg(body: &'static str) -> Message {
        Message::new(Bytes::from_static(body.as_bytes()), None)
    }

    #[test]
    fn enqueue_dequeue_preserves_fifo_order() {
        let q = Queue::new("q");
        q.enqueue(msg("a"));
        q.enqueue(msg("b"));
        q.enqueue(msg("c"));

        assert_eq!(q.dequeue().unwrap().body().as_ref(), b"a");
        assert_eq!(q.dequeue().unwrap().body().as_ref(), b"b");
        assert_eq!(q.dequeue().unwrap().body().as_ref(), b"c");
    }

    #[test]
    fn dequeue_blocks_until_enqueue() {
        let q = Arc::new(Queue::new("q"));
        let q2 = Arc::clone(&q);

        let handle = thread::spawn(move || q2.dequeue().unwrap());

        thread::sleep(Duration::from_millis(50));
        q.enqueue(msg("late"));

        let received = handle.join().unwrap();
        assert_eq!(received.body().as_ref(), b"late");
    }

    #[test]
    fn nack_return_head_inserts_ahead_of_pending() {
        let q = Queue::new("q");
        q.enqueue(msg("m1"));
        q.enqueue(msg("m2"));
        q.enqueue(msg("m3"));

        let mut m1 = q.dequeue().unwrap();
        m1.begin_dispatch("id-1".to_string());
        q.register_inflight(m1.clone());
        assert_eq!(q.in_flight_count(), 1);

        q.nack_return(m1);
        assert_eq!(q.in_flight_count(), 0);

        // m1 redelivered before m2, per spec.md Testable Property 6.
        let redelivered = q.dequeue().unwrap();
        assert_eq!(redelivered.body().as_ref(), b"m1");
        assert!(redelivered.id().is_none());

        assert_eq!(q.dequeue().unwrap().body().as_ref(), b"m2");
        assert_eq!(q.dequeue().unwrap().body().as_ref(), b"m3");
    }

    #[test]
    fn commit_removes_from_in_flight() {
        let q = Queue::new("q");
        q.enqueue(msg("m"));
        let mut m = q.dequeue().unwrap();
        m.begin_dispatch("id-1".to_string());
        q.register_inflight(m);

        assert!(q.commit("id-1"));
        assert_eq!(q.in_flight_count(), 0);
        assert!(!q.commit("id-1"));
    }

    #[test]
    fn close_unblocks_dequeue_with_terminal_sentinel() {
        let q = Arc::new(Queue::new("q"));
        let q2 = Arc::clone(&q);
        let handle = thread::spawn(move || q2.dequeue());

        thread::sleep(Duration::from_millis(50));
        q.close();

        assert!(handle.join().unwrap().is_none());
    }
}
