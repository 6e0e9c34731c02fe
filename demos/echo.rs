use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use ws_relay::{Event, Server, ServerConfig};

#[tokio::main]
async fn main() -> ws_relay::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let server = Server::bind("127.0.0.1:8080", ServerConfig::default()).await?;
    let (tx, mut events) = mpsc::unbounded_channel();
    server.add_observer(tx);

    while let Some(event) = events.recv().await {
        match event {
            Event::Connected(id) => println!("Client {} connected", id),
            Event::Disconnected(id) => println!("Client {} disconnected", id),
            Event::MessageReceived(id, text) => {
                println!("Received '{}' from {}", text, id);
                if let Err(err) = server.send(&id, &text).await {
                    eprintln!("echo to {} failed: {}", id, err);
                }
            }
            Event::MessageSent(id, text) => println!("Sent '{}' to {}", text, id),
        }
    }

    Ok(())
}
