//! Echo worker: answers every request to `echo` with "<body> world!".
//!
//! Needs a Majordomo broker listening on the given endpoint:
//!
//! ```text
//! cargo run --example echo_worker -- tcp://localhost:5555
//! RUST_LOG=mdp_peer=debug cargo run --example echo_worker   # with frame dumps
//! ```

use mdp_peer::{Verbosity, Worker};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> mdp_peer::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let broker = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tcp://localhost:5555".to_string());

    let (worker, mut events) = Worker::builder(broker, "echo")
        .verbosity(Verbosity::Frames)
        .build()?;
    worker.start()?;

    loop {
        tokio::select! {
            request = events.requests.recv() => {
                let Some(request) = request else { break };
                let reply = format!("{} world!", request.body);
                request.responder.send(reply)?;
            }
            _ = tokio::signal::ctrl_c() => {
                worker.stop()?;
                break;
            }
        }
    }
    // Give the session a moment to flush DISCONNECT.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    Ok(())
}
