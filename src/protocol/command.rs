//! Parses one line of the text command grammar (spec.md §6) into a `Command`.
//!
//! The grammar is intentionally thin — the hard part of this crate is
//! routing and delivery, not framing — so this is a plain whitespace
//! tokenizer rather than a parser-combinator crate. A command line never
//! spans more than one TCP frame (newline-delimited, see `connection.rs`).

use snafu::{ensure, OptionExt};

use crate::error::{BrokerError, InvalidBindingSnafu, ProtocolSnafu, Result};
use crate::exchange::{BindSpec, ExchangeKind, MatchMode};

/// One parsed client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CreateExchange { name: String, kind_token: String },
    CreateQueue { name: String },
    BindQueue {
        queue: String,
        exchange: String,
        spec_token: String,
    },
    Publish {
        exchange: String,
        routing_key: String,
        body: String,
    },
    Consume { queue: String },
    Ack { message_id: String },
}

/// Parses a single line (trailing `\r`/`\n` tolerated but not required).
///
/// `PUBLISH` is special-cased: per spec.md §9's framing amendment, its body
/// is the remainder of the line after the third space-separated token,
/// verbatim including embedded spaces, rather than a fourth token.
pub fn parse_line(line: &str) -> Result<Command> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.trim().is_empty() {
        return ProtocolSnafu {
            message: "empty command line".to_string(),
        }
        .fail();
    }

    let mut tokens = trimmed.split_whitespace();
    let verb = tokens.next().expect("non-empty line has at least one token");

    match verb.to_ascii_uppercase().as_str() {
        "CREATE" => parse_create(&mut tokens),
        "BIND" => parse_bind(&mut tokens),
        "PUBLISH" => parse_publish(trimmed),
        "CONSUME" => {
            let queue = required(&mut tokens)?.to_string();
            expect_exhausted(&mut tokens)?;
            Ok(Command::Consume { queue })
        }
        "ACK" => {
            let message_id = required(&mut tokens)?.to_string();
            expect_exhausted(&mut tokens)?;
            Ok(Command::Ack { message_id })
        }
        other => ProtocolSnafu {
            message: format!("unknown command {other:?}"),
        }
        .fail(),
    }
}

fn parse_create<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Result<Command> {
    match required(tokens)?.to_ascii_uppercase().as_str() {
        "EXCHANGE" => {
            let name = required(tokens)?.to_string();
            let kind_token = required(tokens)?.to_string();
            expect_exhausted(tokens)?;
            Ok(Command::CreateExchange { name, kind_token })
        }
        "QUEUE" => {
            let name = required(tokens)?.to_string();
            expect_exhausted(tokens)?;
            Ok(Command::CreateQueue { name })
        }
        other => ProtocolSnafu {
            message: format!("CREATE: expected EXCHANGE or QUEUE, got {other:?}"),
        }
        .fail(),
    }
}

fn parse_bind<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Result<Command> {
    let kw = required(tokens)?;
    ensure!(
        kw.eq_ignore_ascii_case("QUEUE"),
        ProtocolSnafu {
            message: format!("BIND: expected QUEUE, got {kw:?}"),
        }
    );
    let queue = required(tokens)?.to_string();
    let exchange = required(tokens)?.to_string();
    let spec_token = required(tokens)?.to_string();
    expect_exhausted(tokens)?;
    Ok(Command::BindQueue {
        queue,
        exchange,
        spec_token,
    })
}

/// `PUBLISH <exchange> <routing_key> <body...>` — everything past the
/// second argument is the body, spaces and all.
fn parse_publish(line: &str) -> Result<Command> {
    let mut fields = line.splitn(4, ' ');
    fields.next(); // verb, already consumed by the caller
    let exchange = fields.next().filter(|s| !s.is_empty()).context(ProtocolSnafu {
        message: "PUBLISH missing exchange".to_string(),
    })?;
    let routing_key = fields.next().filter(|s| !s.is_empty()).context(ProtocolSnafu {
        message: "PUBLISH missing routing key".to_string(),
    })?;
    // The body is whatever remains of the line after the routing key,
    // verbatim — including any leading/embedded spaces.
    let body = fields.next().context(ProtocolSnafu {
        message: "PUBLISH missing body".to_string(),
    })?;
    Ok(Command::Publish {
        exchange: exchange.to_string(),
        routing_key: routing_key.to_string(),
        body: body.to_string(),
    })
}

fn required<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Result<&'a str> {
    tokens.next().context(ProtocolSnafu {
        message: "wrong number of arguments".to_string(),
    })
}

fn expect_exhausted<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Result<()> {
    ensure!(
        tokens.next().is_none(),
        ProtocolSnafu {
            message: "too many arguments".to_string(),
        }
    );
    Ok(())
}

/// Resolves a parsed `kind_token` into an `ExchangeKind`, surfacing
/// `InvalidType` on an unknown name (spec.md §4.4).
pub fn resolve_exchange_kind(token: &str) -> Result<ExchangeKind> {
    ExchangeKind::parse(token)
}

/// Resolves a BIND's `spec_token` into a `BindSpec`. `kind` determines how
/// the token is interpreted: direct/fanout/topic treat it as a routing key
/// (fanout ignores it beyond bookkeeping), headers treat it as a
/// dot-separated `key:value` list that must carry an `x-match` entry
/// (spec.md §4.3.4 / §6).
pub fn resolve_bind_spec(kind: ExchangeKind, spec_token: &str) -> Result<BindSpec> {
    match kind {
        ExchangeKind::Direct | ExchangeKind::Fanout | ExchangeKind::Topic => {
            Ok(BindSpec::RoutingKey(spec_token.to_string()))
        }
        ExchangeKind::Headers => {
            let mut mode = None;
            let mut requirements = Vec::new();
            for (k, v) in parse_header_pairs(spec_token)? {
                if k == "x-match" {
                    mode = Some(MatchMode::parse(&v).context(InvalidBindingSnafu {
                        message: format!("x-match value must be 'all' or 'any', got {v:?}"),
                    })?);
                } else {
                    requirements.push((k, v));
                }
            }
            let mode = mode.context(InvalidBindingSnafu {
                message: "headers binding missing x-match".to_string(),
            })?;
            Ok(BindSpec::Headers { mode, requirements })
        }
    }
}

/// Parses a PUBLISH's `routing_key` token as a header map for a headers
/// exchange (spec.md §6: "the parser populates both routing_key and
/// headers"). Unlike a bind spec, no `x-match` entry is expected here — the
/// token is just the message's header set.
pub fn parse_publish_headers(token: &str) -> Result<std::collections::HashMap<String, String>> {
    Ok(parse_header_pairs(token)?.into_iter().collect())
}

fn parse_header_pairs(token: &str) -> Result<Vec<(String, String)>> {
    token
        .split('.')
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let mut parts = pair.splitn(2, ':');
            let k = parts.next().unwrap_or_default().to_string();
            let v = parts
                .next()
                .context(InvalidBindingSnafu {
                    message: format!("malformed key:value pair {pair:?}"),
                })?
                .to_string();
            Ok((k, v))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_create_exchange() {
        assert_eq!(
            parse_line("CREATE EXCHANGE ex direct").unwrap(),
            Command::CreateExchange {
                name: "ex".to_string(),
                kind_token: "direct".to_string(),
            }
        );
    }

    #[test]
    fn parses_create_queue() {
        assert_eq!(
            parse_line("CREATE QUEUE q").unwrap(),
            Command::CreateQueue { name: "q".to_string() }
        );
    }

    #[test]
    fn parses_bind_queue() {
        assert_eq!(
            parse_line("BIND QUEUE q ex k").unwrap(),
            Command::BindQueue {
                queue: "q".to_string(),
                exchange: "ex".to_string(),
                spec_token: "k".to_string(),
            }
        );
    }

    #[test]
    fn parses_publish_with_multiword_body() {
        assert_eq!(
            parse_line("PUBLISH ex k hello there world").unwrap(),
            Command::Publish {
                exchange: "ex".to_string(),
                routing_key: "k".to_string(),
                body: "hello there world".to_string(),
            }
        );
    }

    #[test]
    fn parses_consume_and_ack() {
        assert_eq!(
            parse_line("CONSUME q").unwrap(),
            Command::Consume { queue: "q".to_string() }
        );
        assert_eq!(
            parse_line("ACK abc-123").unwrap(),
            Command::Ack { message_id: "abc-123".to_string() }
        );
    }

    #[test]
    fn rejects_unknown_command() {
        assert!(matches!(
            parse_line("FROBNICATE x"),
            Err(BrokerError::Protocol { .. })
        ));
    }

    #[test]
    fn rejects_wrong_arity() {
        assert!(matches!(parse_line("CONSUME"), Err(BrokerError::Protocol { .. })));
        assert!(matches!(
            parse_line("CONSUME q extra"),
            Err(BrokerError::Protocol { .. })
        ));
        assert!(matches!(parse_line("PUBLISH ex k"), Err(BrokerError::Protocol { .. })));
    }

    #[test]
    fn resolves_headers_bind_spec() {
        let spec = resolve_bind_spec(ExchangeKind::Headers, "x-match:all.app:web.env:prod").unwrap();
        match spec {
            BindSpec::Headers { mode, requirements } => {
                assert_eq!(mode, MatchMode::All);
                assert_eq!(requirements.len(), 2);
            }
            _ => panic!("expected headers spec"),
        }
    }

    #[test]
    fn headers_bind_spec_requires_x_match() {
        let err = resolve_bind_spec(ExchangeKind::Headers, "app:web").unwrap_err();
        assert!(matches!(err, BrokerError::InvalidBinding { .. }));
    }
}
