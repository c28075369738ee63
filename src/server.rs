//! TCP accept loop: binds a listening socket and spawns one `Connection`
//! thread per accepted client (spec.md §5 "Parallel tasks").

use std::net::{TcpListener, ToSocketAddrs};
use std::sync::Arc;
use std::thread;

use log::{error, info};

use crate::broker::Broker;
use crate::connection::Connection;

pub struct Server {
    broker: Arc<Broker>,
    listener: TcpListener,
}

impl Server {
    /// Binds `addr`. Failure here is the only non-zero-exit-code path
    /// documented in spec.md §6.
    pub fn bind(addr: impl ToSocketAddrs, broker: Arc<Broker>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        info!("listening on {}", listener.local_addr()?);
        Ok(Server { broker, listener })
    }

    /// The address actually bound, useful when `bind` was given port 0.
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.listener
            .local_addr()
            .expect("listener was successfully bound")
    }

    /// Accepts connections until the listener errors, spawning a detached
    /// thread per connection. Each thread owns an `Arc<Broker>` clone, so
    /// routing/queue state outlives any single connection.
    pub fn run(self) {
        for stream in self.listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    error!("accept failed: {e}");
                    continue;
                }
            };
            let broker = Arc::clone(&self.broker);
            thread::spawn(move || Connection::new(broker, stream).run());
        }
    }

    /// Unblocks every thread currently suspended in a queue's `dequeue`,
    /// used at shutdown so in-flight connection threads can unwind.
    pub fn shutdown_broker(&self) {
        self.broker.shutdown();
    }
}
