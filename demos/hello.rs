//! Send one request to the `echo` service and print the reply.
//!
//! ```text
//! cargo run --example hello -- tcp://localhost:5555 hello
//! ```

use std::time::Duration;

use mdp_peer::Client;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> mdp_peer::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let broker = args
        .next()
        .unwrap_or_else(|| "tcp://localhost:5555".to_string());
    let body = args.next().unwrap_or_else(|| "hello".to_string());

    let (client, mut responses) = Client::builder(broker).build()?;
    client.start()?;
    client.send("echo", body)?;

    match tokio::time::timeout(Duration::from_secs(5), responses.recv()).await {
        Ok(Some(response)) => println!("{}: {}", response.service, response.body),
        _ => eprintln!("no reply within 5s, is a broker and an echo worker running?"),
    }

    client.stop()?;
    Ok(())
}
