//! Line-oriented command grammar and JSON wire encoding (spec.md §6).
//!
//! Out of scope for the core per spec.md §1 ("the line-oriented text
//! command parser... specified only by its grammar"), but a runnable crate
//! still needs one; this module implements exactly the grammar and nothing
//! more.

mod command;
mod wire;

pub use command::{
    parse_line, parse_publish_headers, resolve_bind_spec, resolve_exchange_kind, Command,
};
pub use wire::WireMessage;
