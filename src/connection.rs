//! Per-connection command loop: reads newline-framed text commands, writes
//! newline-framed JSON messages, and owns the subscription (if any) that the
//! client's last `CONSUME` started.
//!
//! One OS thread per accepted connection (spec.md §5's "Parallel tasks"
//! model), matching the teacher crate's preference for dedicated threads
//! and blocking I/O over a reactor. A subscription itself runs on a second,
//! dedicated thread (same `Mutex` + `Condvar` hand-off idiom `queue.rs` uses
//! for blocking dequeue) so that the reader thread can keep accepting `ACK`
//! lines while the delivery thread blocks on the queue — this is what lets
//! `CONSUME` start a continuous push subscription (spec.md §4.5) rather than
//! a one-shot pull.
//!
//! Only one subscription is active per connection at a time; issuing a new
//! `CONSUME` cancels whatever subscription preceded it.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use log::{debug, info, warn};

use crate::broker::Broker;
use crate::delivery::{Delivery, DeliveryOutcome};
use crate::error::BrokerError;
use crate::exchange::ExchangeKind;
use crate::message::Message;
use crate::protocol::{
    parse_line, parse_publish_headers, resolve_bind_spec, resolve_exchange_kind, Command,
    WireMessage,
};
use crate::queue::Queue;

/// Hand-off state between a connection's reader thread and its delivery
/// thread: `proceed` means "the last delivery was acked, send the next
/// one"; `cancelled` means "stop, regardless of where you are in the loop".
struct SubscriptionState {
    proceed: bool,
    cancelled: bool,
}

/// A running `CONSUME` subscription: a dedicated thread looping
/// `Delivery::next` and writing each message to the socket, synchronized
/// with the connection's reader thread via `state`.
struct Subscription {
    delivery: Arc<Mutex<Delivery>>,
    state: Arc<(Mutex<SubscriptionState>, Condvar)>,
}

impl Subscription {
    fn start(queue: Arc<Queue>, writer: Arc<Mutex<TcpStream>>, peer: String) -> Self {
        let delivery = Arc::new(Mutex::new(Delivery::new(queue)));
        let state = Arc::new((
            Mutex::new(SubscriptionState {
                proceed: false,
                cancelled: false,
            }),
            Condvar::new(),
        ));
        let thread_delivery = Arc::clone(&delivery);
        let thread_state = Arc::clone(&state);
        thread::spawn(move || run_delivery_loop(thread_delivery, thread_state, writer, peer));
        Subscription { delivery, state }
    }

    /// Commits `message_id` against the in-flight delivery. On success,
    /// wakes the delivery thread to fetch the next message; on mismatch,
    /// the caller is responsible for abandoning and cancelling.
    fn ack(&self, message_id: &str) -> bool {
        let committed = self.delivery.lock().unwrap().ack(message_id);
        if committed {
            let (lock, cv) = &*self.state;
            lock.lock().unwrap().proceed = true;
            cv.notify_one();
        }
        committed
    }

    fn abandon(&self) {
        self.delivery.lock().unwrap().abandon();
    }

    /// Requests the delivery thread stop. Doesn't join: the thread may be
    /// blocked in `Queue::dequeue` with nothing to deliver, which only a
    /// future enqueue or broker shutdown unblocks (the same suspension
    /// spec.md §5 already describes for the single-threaded pull model this
    /// replaces). Its `Arc<Mutex<Delivery>>` clone keeps any in-flight
    /// message's re-enqueue-on-drop guarantee intact regardless of when it
    /// actually exits.
    fn cancel(&self) {
        let (lock, cv) = &*self.state;
        lock.lock().unwrap().cancelled = true;
        cv.notify_one();
    }
}

/// Runs on a subscription's dedicated thread: dequeue, assign id, write to
/// the client, wait for the ack (or cancellation) before dequeuing again.
fn run_delivery_loop(
    delivery: Arc<Mutex<Delivery>>,
    state: Arc<(Mutex<SubscriptionState>, Condvar)>,
    writer: Arc<Mutex<TcpStream>>,
    peer: String,
) {
    let (lock, cv) = &*state;
    loop {
        let outcome = delivery.lock().unwrap().next();
        let msg = match outcome {
            DeliveryOutcome::Delivered(msg) => msg,
            DeliveryOutcome::QueueClosed => break,
        };
        if lock.lock().unwrap().cancelled {
            // Cancelled while we were blocked waiting for this message —
            // return it rather than deliver to a subscription nobody owns.
            delivery.lock().unwrap().abandon();
            break;
        }
        let wire = WireMessage::from_delivered(&msg);
        let line = match wire.to_line() {
            Ok(line) => line,
            Err(e) => {
                warn!("connection {peer}: failed to encode delivery: {e}");
                break;
            }
        };
        let written = {
            let mut stream = writer.lock().unwrap();
            writeln!(stream, "{line}")
        };
        if written.is_err() {
            warn!("connection {peer}: delivery write failed, ending subscription");
            break;
        }
        let mut guard = lock.lock().unwrap();
        while !guard.proceed && !guard.cancelled {
            guard = cv.wait(guard).unwrap();
        }
        let cancelled = guard.cancelled;
        guard.proceed = false;
        drop(guard);
        if cancelled {
            break;
        }
    }
    debug!("connection {peer}: delivery thread ending");
}

/// Drives a single client connection until it disconnects or a transport
/// error occurs.
pub struct Connection {
    broker: Arc<Broker>,
    read_stream: TcpStream,
    writer: Arc<Mutex<TcpStream>>,
    peer: String,
    subscription: Option<Subscription>,
}

impl Connection {
    pub fn new(broker: Arc<Broker>, stream: TcpStream) -> Self {
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "<unknown>".to_string());
        let writer = Arc::new(Mutex::new(
            stream.try_clone().expect("clone TCP stream for writer"),
        ));
        Connection {
            broker,
            read_stream: stream,
            writer,
            peer,
            subscription: None,
        }
    }

    /// Runs the command loop to completion. Transport errors and clean EOF
    /// both end the loop; only transport errors are logged as such (spec.md
    /// §7: clean EOF is not user-visible as an error).
    pub fn run(mut self) {
        info!("connection from {} established", self.peer);
        let reader = BufReader::new(self.read_stream.try_clone().expect("clone TCP stream"));
        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("connection {}: transport error: {}", self.peer, e);
                    break;
                }
            };
            if line.is_empty() {
                continue;
            }
            if let Err(e) = self.handle_line(&line) {
                if !self.report_error(&e) {
                    break;
                }
            }
        }
        self.cancel_subscription();
        debug!("connection from {} closed", self.peer);
    }

    fn cancel_subscription(&mut self) {
        if let Some(sub) = self.subscription.take() {
            sub.cancel();
        }
    }

    fn handle_line(&mut self, line: &str) -> crate::error::Result<()> {
        let command = parse_line(line)?;
        match command {
            Command::CreateExchange { name, kind_token } => {
                let kind = resolve_exchange_kind(&kind_token)?;
                self.broker.create_exchange(&name, kind)?;
                self.send_ok()
            }
            Command::CreateQueue { name } => {
                self.broker.create_queue(&name);
                self.send_ok()
            }
            Command::BindQueue {
                queue,
                exchange,
                spec_token,
            } => {
                let kind = self
                    .broker
                    .get_exchange(&exchange)
                    .map(|ex| ex.kind())
                    .unwrap_or(ExchangeKind::Direct);
                let spec = resolve_bind_spec(kind, &spec_token)?;
                self.broker.bind_queue(&queue, &exchange, spec)?;
                self.send_ok()
            }
            Command::Publish {
                exchange,
                routing_key,
                body,
            } => {
                // For a headers exchange the routing_key token is a header
                // spec, not a key (spec.md §6: "the parser populates both
                // routing_key and headers").
                let is_headers_exchange = self
                    .broker
                    .get_exchange(&exchange)
                    .map(|ex| ex.kind() == ExchangeKind::Headers)
                    .unwrap_or(false);
                let headers = if is_headers_exchange {
                    Some(parse_publish_headers(&routing_key)?)
                } else {
                    None
                };
                let msg = Message::new(body.into_bytes(), headers);
                self.broker.publish(&exchange, &routing_key, msg)?;
                self.send_ok()
            }
            Command::Consume { queue } => {
                let queue = self.broker.get_queue(&queue).ok_or_else(|| {
                    crate::error::QueueNotFoundSnafu {
                        name: queue.clone(),
                    }
                    .build()
                })?;
                // A fresh CONSUME replaces any previous subscription; the
                // old one's in-flight message (if any) is returned to its
                // queue once its delivery thread notices the cancellation.
                self.cancel_subscription();
                self.subscription = Some(Subscription::start(
                    queue,
                    Arc::clone(&self.writer),
                    self.peer.clone(),
                ));
                Ok(())
            }
            Command::Ack { message_id } => self.handle_ack(&message_id),
        }
    }

    fn handle_ack(&mut self, message_id: &str) -> crate::error::Result<()> {
        let Some(subscription) = self.subscription.as_ref() else {
            return crate::error::ProtocolSnafu {
                message: "ACK received with no active subscription".to_string(),
            }
            .fail();
        };
        if subscription.ack(message_id) {
            self.send_ok()
        } else {
            subscription.abandon();
            self.cancel_subscription();
            crate::error::ProtocolSnafu {
                message: format!("ACK {message_id:?} does not match the delivered message"),
            }
            .fail()
        }
    }

    fn send_ok(&mut self) -> crate::error::Result<()> {
        self.write_line("OK")
    }

    fn write_line(&mut self, line: &str) -> crate::error::Result<()> {
        let mut stream = self.writer.lock().unwrap();
        writeln!(stream, "{line}").map_err(|e| {
            crate::error::TransportSnafu {
                message: e.to_string(),
            }
            .build()
        })
    }

    /// Reports a client-visible error per spec.md §7's propagation policy:
    /// protocol/validation errors get a single-line reply and the
    /// connection stays open; transport errors are unrecoverable. Returns
    /// whether the connection should continue.
    fn report_error(&mut self, err: &BrokerError) -> bool {
        if !err.is_client_reportable() {
            warn!("connection {}: {}", self.peer, err);
            return false;
        }
        debug!("connection {}: client error: {}", self.peer, err);
        self.write_line(&format!("ERROR {err}")).is_ok()
    }
}
