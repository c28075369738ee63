//! Headers exchange: match on header key/value requirements instead of a
//! routing key, combined via `all` or `any`.
//!
//! The Go original (`server/headers_exchange.go`) flattens `x-match` plus
//! the header requirements into a single string map key, which spec.md §9
//! calls out as a bug: it collapses two distinct bindings that share a
//! header set but differ only in match mode. This version keeps bindings as
//! a list of `(mode, requirements, queue)` triples instead, as spec.md §3
//! mandates.

use std::sync::RwLock;
use std::sync::{Arc, Weak};

use crate::message::Message;
use crate::queue::Queue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    All,
    Any,
}

impl MatchMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "all" => Some(MatchMode::All),
            "any" => Some(MatchMode::Any),
            _ => None,
        }
    }
}

struct Binding {
    mode: MatchMode,
    requirements: Vec<(String, String)>,
    // Weak: the broker's registry is the sole strong owner of a queue
    // (spec.md §3).
    queue: Weak<Queue>,
}

pub(super) struct HeadersExchange {
    bindings: RwLock<Vec<Binding>>,
}

impl HeadersExchange {
    pub(super) fn new() -> Self {
        HeadersExchange {
            bindings: RwLock::new(Vec::new()),
        }
    }

    pub(super) fn bind(
        &self,
        queue: Arc<Queue>,
        mode: MatchMode,
        requirements: Vec<(String, String)>,
    ) {
        self.bindings.write().unwrap().push(Binding {
            mode,
            requirements,
            queue: Arc::downgrade(&queue),
        });
    }

    pub(super) fn route(&self, msg: &Message) {
        let bindings = self.bindings.read().unwrap();
        for binding in bindings.iter() {
            if headers_match(binding.mode, &binding.requirements, msg.headers()) {
                if let Some(q) = binding.queue.upgrade() {
                    q.enqueue(msg.clone());
                }
            }
        }
    }
}

/// Pinned per spec.md §9's open question, following AMQP semantics: an
/// empty requirement set matches everything under `all`, nothing under
/// `any`.
fn headers_match(
    mode: MatchMode,
    requirements: &[(String, String)],
    msg_headers: &std::collections::HashMap<String, String>,
) -> bool {
    match mode {
        MatchMode::All => requirements
            .iter()
            .all(|(k, v)| msg_headers.get(k).map(|mv| mv == v).unwrap_or(false)),
        MatchMode::Any => {
            !requirements.is_empty()
                && requirements
                    .iter()
                    .any(|(k, v)| msg_headers.get(k).map(|mv| mv == v).unwrap_or(false))
        }
    }
}
