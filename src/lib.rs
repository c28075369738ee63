//! In-process message broker with AMQP-0-9-1-style exchange routing.
//!
//! The core — [`Message`], [`queue::Queue`], the four [`exchange`] kinds,
//! and the [`broker::Broker`] registry — is transport-agnostic; [`protocol`],
//! [`connection`], and [`server`] wrap it in a line-oriented TCP service.

pub mod broker;
pub mod connection;
pub mod delivery;
pub mod error;
pub mod exchange;
pub mod message;
pub mod protocol;
pub mod queue;
pub mod server;

pub use broker::Broker;
pub use error::{BrokerError, Result};
pub use message::Message;
