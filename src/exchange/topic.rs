//! Topic exchange: dot-separated pattern matching with `*` (one token) and
//! `#` (zero or more tokens). Grounded on `server/topic_exchange.go` in
//! `original_source/`, whose `topicMatches` only handled equal-length
//! patterns; spec.md §4.3.3 requires the fuller AMQP semantics (trailing and
//! interior `#`, repeated `#` collapsing), implemented here as a small
//! backtracking matcher over token slices.

use std::sync::{Arc, RwLock, Weak};

use indexmap::IndexMap;

use crate::message::Message;
use crate::queue::Queue;

pub(super) struct TopicExchange {
    // Weak: the broker's registry is the sole strong owner of a queue
    // (spec.md §3).
    bindings: RwLock<IndexMap<String, Vec<Weak<Queue>>>>,
}

impl TopicExchange {
    pub(super) fn new() -> Self {
        TopicExchange {
            bindings: RwLock::new(IndexMap::new()),
        }
    }

    pub(super) fn bind(&self, queue: Arc<Queue>, pattern: String) {
        let mut bindings = self.bindings.write().unwrap();
        bindings
            .entry(pattern)
            .or_default()
            .push(Arc::downgrade(&queue));
    }

    pub(super) fn route(&self, msg: &Message, routing_key: &str) {
        let bindings = self.bindings.read().unwrap();
        for (pattern, queues) in bindings.iter() {
            if topic_matches(pattern, routing_key) {
                for q in queues {
                    // A queue bound under two matching patterns receives
                    // the message twice (spec.md §4.3.3) — we enqueue once
                    // per matching binding entry, not once per queue.
                    if let Some(q) = q.upgrade() {
                        q.enqueue(msg.clone());
                    }
                }
            }
        }
    }
}

fn tokenize(s: &str) -> Vec<&str> {
    if s.is_empty() {
        Vec::new()
    } else {
        s.split('.').collect()
    }
}

pub(super) fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern_tokens = tokenize(pattern);
    let key_tokens = tokenize(routing_key);
    matches_tokens(&pattern_tokens, &key_tokens)
}

fn matches_tokens(pattern: &[&str], key: &[&str]) -> bool {
    if pattern.is_empty() {
        return key.is_empty();
    }

    match pattern[0] {
        "#" => {
            // Repeated '#' tokens collapse to a single '#' (spec.md §4.3.3).
            let mut i = 0;
            while i < pattern.len() && pattern[i] == "#" {
                i += 1;
            }
            let rest = &pattern[i..];
            if rest.is_empty() {
                return true;
            }
            (0..=key.len()).any(|split| matches_tokens(rest, &key[split..]))
        }
        "*" => !key.is_empty() && matches_tokens(&pattern[1..], &key[1..]),
        token => !key.is_empty() && key[0] == token && matches_tokens(&pattern[1..], &key[1..]),
    }
}
