//! Error taxonomy for the broker core and its ambient protocol/connection layers.
//!
//! Mirrors the teacher crate's single flat `ErrorKind`-style enum with
//! `snafu` context selectors, rather than one error type per concern.

use snafu::Snafu;

pub type Result<T, E = BrokerError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BrokerError {
    #[snafu(display("no exchange named {name:?}"))]
    ExchangeNotFound { name: String },

    #[snafu(display("no queue named {name:?}"))]
    QueueNotFound { name: String },

    #[snafu(display("invalid exchange type {kind:?}"))]
    InvalidType { kind: String },

    #[snafu(display(
        "exchange {name:?} already exists with type {existing:?}, cannot redeclare as {requested:?}"
    ))]
    TypeConflict {
        name: String,
        existing: String,
        requested: String,
    },

    #[snafu(display("protocol error: {message}"))]
    Protocol { message: String },

    #[snafu(display("transport error: {message}"))]
    Transport { message: String },

    #[snafu(display("invalid headers binding: {message}"))]
    InvalidBinding { message: String },
}

impl BrokerError {
    /// True for errors that spec.md §7 says are reported to the client as a
    /// single-line string while the connection stays open (validation /
    /// protocol errors), as opposed to transport errors that terminate it.
    pub fn is_client_reportable(&self) -> bool {
        !matches!(self, BrokerError::Transport { .. })
    }
}
