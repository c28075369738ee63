//! Process entry point: parses CLI args, initializes logging, and runs the
//! broker's TCP accept loop until the listener fails.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::error;

use warren::broker::Broker;
use warren::server::Server;

/// In-process message broker with AMQP-0-9-1-style exchange routing.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on.
    #[arg(short, long, default_value = "127.0.0.1:5050")]
    listen: String,

    /// Minimum log level, forwarded to `env_logger` via `RUST_LOG` if unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", &args.log_level);
    }
    env_logger::init();

    let broker = Arc::new(Broker::new());
    let server = match Server::bind(&args.listen, broker) {
        Ok(server) => server,
        Err(e) => {
            error!("failed to bind {}: {}", args.listen, e);
            return ExitCode::FAILURE;
        }
    };

    server.run();
    ExitCode::SUCCESS
}
