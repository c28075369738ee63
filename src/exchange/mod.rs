//! The four exchange algorithms and their binding tables.
//!
//! Grounded on `server/exchange.go`, `direct_exchange.go`, `fanout_exchange.go`,
//! `topic_exchange.go`, `headers_exchange.go` in `original_source/` — the Go
//! original's one-struct-per-type split, generalized here behind a single
//! `Exchange` enum (Rust idiom: closed set of variants rather than a trait
//! object, since the four kinds are fixed and never extended — spec.md §3
//! enumerates exactly four).

mod direct;
mod fanout;
mod headers;
mod topic;

pub use headers::MatchMode;

use std::sync::Arc;

use crate::error::{InvalidTypeSnafu, Result};
use crate::message::Message;
use crate::queue::Queue;

/// One of the four exchange kinds named in spec.md §1/§3. `ExchangeKind`
/// parses the CREATE command's type token; `Exchange` holds the live
/// binding table once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    Direct,
    Fanout,
    Topic,
    Headers,
}

impl ExchangeKind {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "direct" => Ok(ExchangeKind::Direct),
            "fanout" => Ok(ExchangeKind::Fanout),
            "topic" => Ok(ExchangeKind::Topic),
            "headers" => Ok(ExchangeKind::Headers),
            other => InvalidTypeSnafu { kind: other }.fail(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeKind::Direct => "direct",
            ExchangeKind::Fanout => "fanout",
            ExchangeKind::Topic => "topic",
            ExchangeKind::Headers => "headers",
        }
    }
}

/// A routing specification passed to `bind`. Each exchange kind interprets
/// it differently (spec.md §3 Binding):
/// - Direct/Topic: the routing key (exact string / pattern).
/// - Fanout: ignored.
/// - Headers: an `x-match` mode plus a set of required header key/values.
pub enum BindSpec {
    RoutingKey(String),
    Headers {
        mode: MatchMode,
        requirements: Vec<(String, String)>,
    },
}

enum Inner {
    Direct(direct::DirectExchange),
    Fanout(fanout::FanoutExchange),
    Topic(topic::TopicExchange),
    Headers(headers::HeadersExchange),
}

/// A named exchange with its binding table. Binding and routing are safe
/// under concurrent calls (spec.md §4.3): each variant guards its own table
/// independently of the broker registry's lock.
pub struct Exchange {
    name: String,
    kind: ExchangeKind,
    inner: Inner,
}

impl Exchange {
    pub fn new(name: impl Into<String>, kind: ExchangeKind) -> Self {
        let inner = match kind {
            ExchangeKind::Direct => Inner::Direct(direct::DirectExchange::new()),
            ExchangeKind::Fanout => Inner::Fanout(fanout::FanoutExchange::new()),
            ExchangeKind::Topic => Inner::Topic(topic::TopicExchange::new()),
            ExchangeKind::Headers => Inner::Headers(headers::HeadersExchange::new()),
        };
        Exchange {
            name: name.into(),
            kind,
            inner,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ExchangeKind {
        self.kind
    }

    /// Binds `queue` using `spec`. Rejects a spec that doesn't match this
    /// exchange's kind (e.g. headers-style spec on a direct exchange).
    pub fn bind(&self, queue: Arc<Queue>, spec: BindSpec) -> Result<()> {
        match (&self.inner, spec) {
            (Inner::Direct(ex), BindSpec::RoutingKey(rk)) => {
                ex.bind(queue, rk);
                Ok(())
            }
            (Inner::Fanout(ex), BindSpec::RoutingKey(_)) => {
                ex.bind(queue);
                Ok(())
            }
            (Inner::Topic(ex), BindSpec::RoutingKey(pattern)) => {
                ex.bind(queue, pattern);
                Ok(())
            }
            (
                Inner::Headers(ex),
                BindSpec::Headers {
                    mode,
                    requirements,
                },
            ) => {
                ex.bind(queue, mode, requirements);
                Ok(())
            }
            (_, spec) => crate::error::InvalidBindingSnafu {
                message: format!(
                    "binding spec {} does not match exchange kind {:?}",
                    describe_spec(&spec),
                    self.kind
                ),
            }
            .fail(),
        }
    }

    /// Produces the set of target queues for `(routing_key, headers)` and
    /// enqueues `msg` (cloned per target, since a queue bound under two
    /// matching topic patterns receives the message twice — spec.md
    /// §4.3.3) into each. Never raises on an unmatched route.
    pub fn route(&self, msg: &Message, routing_key: &str) {
        match &self.inner {
            Inner::Direct(ex) => ex.route(msg, routing_key),
            Inner::Fanout(ex) => ex.route(msg),
            Inner::Topic(ex) => ex.route(msg, routing_key),
            Inner::Headers(ex) => ex.route(msg),
        }
    }
}

fn describe_spec(spec: &BindSpec) -> &'static str {
    match spec {
        BindSpec::RoutingKey(_) => "routing-key",
        BindSpec::Headers { .. } => "headers",
    }
}
