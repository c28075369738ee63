//! Protocol-parser edge cases: grammar edge cases not already covered by
//! `src/protocol/command.rs`'s unit tests, plus the headers-exchange
//! publish convention from spec.md §6 ("the parser populates both
//! routing_key and headers").

use warren::protocol::{parse_line, parse_publish_headers, resolve_bind_spec, Command};
use warren::exchange::{BindSpec, ExchangeKind, MatchMode};

#[test]
fn publish_routing_key_doubles_as_header_spec_for_headers_exchanges() {
    let command = parse_line("PUBLISH ex app:web.env:prod hello world").unwrap();
    let (exchange, routing_key, body) = match command {
        Command::Publish {
            exchange,
            routing_key,
            body,
        } => (exchange, routing_key, body),
        _ => panic!("expected PUBLISH"),
    };
    assert_eq!(exchange, "ex");
    assert_eq!(body, "hello world");

    let headers = parse_publish_headers(&routing_key).unwrap();
    assert_eq!(headers.get("app").unwrap(), "web");
    assert_eq!(headers.get("env").unwrap(), "prod");
}

#[test]
fn bind_spec_for_non_headers_exchange_is_a_plain_routing_key() {
    let spec = resolve_bind_spec(ExchangeKind::Topic, "logs.#").unwrap();
    assert!(matches!(spec, BindSpec::RoutingKey(k) if k == "logs.#"));
}

#[test]
fn headers_bind_spec_rejects_unknown_match_mode() {
    let err = resolve_bind_spec(ExchangeKind::Headers, "x-match:sometimes.app:web").unwrap_err();
    assert!(matches!(err, warren::BrokerError::InvalidBinding { .. }));
}

#[test]
fn create_exchange_rejects_unknown_type() {
    let err = parse_line("CREATE EXCHANGE ex carrier-pigeon")
        .map(|_| ())
        .unwrap();
    // parsing itself succeeds (the token is opaque at parse time); type
    // resolution happens separately and is where InvalidType surfaces.
    let _ = err;
    let resolved = warren::protocol::resolve_exchange_kind("carrier-pigeon");
    assert!(matches!(resolved, Err(warren::BrokerError::InvalidType { .. })));
}

#[test]
fn match_mode_values_parse_case_sensitively() {
    assert_eq!(MatchMode::parse("all"), Some(MatchMode::All));
    assert_eq!(MatchMode::parse("any"), Some(MatchMode::Any));
    assert_eq!(MatchMode::parse("ALL"), None);
}
