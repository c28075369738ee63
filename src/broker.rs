//! The broker registry: owns every named exchange and queue.
//!
//! Grounded on `server/server.go` in `original_source/`, which guards
//! nothing (a data race on both maps, flagged as a bug in spec.md §9). Here
//! the two maps are each behind their own `RwLock<IndexMap<...>>` so lookups
//! during concurrent `create_*` calls see a consistent snapshot, matching
//! the teacher crate's habit of wrapping shared frame/method tables in
//! `indexmap` rather than a bare `HashMap`.

use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use log::{debug, info};
use snafu::OptionExt;

use crate::error::{BrokerError, ExchangeNotFoundSnafu, QueueNotFoundSnafu, Result, TypeConflictSnafu};
use crate::exchange::{BindSpec, Exchange, ExchangeKind};
use crate::message::Message;
use crate::queue::Queue;

pub struct Broker {
    exchanges: RwLock<IndexMap<String, Arc<Exchange>>>,
    queues: RwLock<IndexMap<String, Arc<Queue>>>,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl Broker {
    pub fn new() -> Self {
        Broker {
            exchanges: RwLock::new(IndexMap::new()),
            queues: RwLock::new(IndexMap::new()),
        }
    }

    /// Creates an exchange. Idempotent only when the existing exchange has
    /// the same type (spec.md §4.4); a mismatched redeclaration is a
    /// `TypeConflict`.
    pub fn create_exchange(&self, name: &str, kind: ExchangeKind) -> Result<()> {
        let mut exchanges = self.exchanges.write().unwrap();
        if let Some(existing) = exchanges.get(name) {
            if existing.kind() == kind {
                debug!("exchange {:?} already exists with matching type, idempotent", name);
                return Ok(());
            }
            return TypeConflictSnafu {
                name: name.to_string(),
                existing: existing.kind().as_str().to_string(),
                requested: kind.as_str().to_string(),
            }
            .fail();
        }
        info!("created exchange {:?} (type={})", name, kind.as_str());
        exchanges.insert(name.to_string(), Arc::new(Exchange::new(name, kind)));
        Ok(())
    }

    /// Creates a queue, idempotent on repeated names (spec.md §4.4 / §8
    /// Testable Property 8): returns the existing queue if present.
    pub fn create_queue(&self, name: &str) -> Arc<Queue> {
        let mut queues = self.queues.write().unwrap();
        if let Some(existing) = queues.get(name) {
            return Arc::clone(existing);
        }
        info!("created queue {:?}", name);
        let queue = Arc::new(Queue::new(name));
        queues.insert(name.to_string(), Arc::clone(&queue));
        queue
    }

    pub fn get_queue(&self, name: &str) -> Option<Arc<Queue>> {
        self.queues.read().unwrap().get(name).cloned()
    }

    pub fn get_exchange(&self, name: &str) -> Option<Arc<Exchange>> {
        self.exchanges.read().unwrap().get(name).cloned()
    }

    pub fn bind_queue(
        &self,
        queue_name: &str,
        exchange_name: &str,
        spec: BindSpec,
    ) -> Result<()> {
        let exchange = self
            .get_exchange(exchange_name)
            .context(ExchangeNotFoundSnafu {
                name: exchange_name.to_string(),
            })?;
        let queue = self.get_queue(queue_name).context(QueueNotFoundSnafu {
            name: queue_name.to_string(),
        })?;
        debug!(
            "binding queue {:?} to exchange {:?}",
            queue_name, exchange_name
        );
        exchange.bind(queue, spec)
    }

    /// Routes `msg` through `exchange_name`. Publishing to an exchange with
    /// no matching bindings succeeds silently (spec.md §4.4): the message is
    /// simply dropped.
    pub fn publish(
        &self,
        exchange_name: &str,
        routing_key: &str,
        msg: Message,
    ) -> Result<()> {
        let exchange = self
            .get_exchange(exchange_name)
            .context(ExchangeNotFoundSnafu {
                name: exchange_name.to_string(),
            })?;
        exchange.route(&msg, routing_key);
        Ok(())
    }

    pub fn exchange_names(&self) -> Vec<String> {
        self.exchanges.read().unwrap().keys().cloned().collect()
    }

    pub fn queue_names(&self) -> Vec<String> {
        self.queues.read().unwrap().keys().cloned().collect()
    }

    /// Closes every queue, unblocking any thread suspended in `dequeue`.
    /// Used at broker shutdown.
    pub fn shutdown(&self) {
        let queues = self.queues.read().unwrap();
        for queue in queues.values() {
            queue.close();
        }
    }
}
