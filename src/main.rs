use anyhow::Context;
use marlinx::core::config::StreamConfig;
use marlinx::core::types::StreamEvent;
use marlinx::kernel::WsTransportFactory;
use marlinx::SessionStream;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let host = std::env::var("ENGINE_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("ENGINE_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse::<u16>()
        .context("invalid ENGINE_PORT")?;

    let config = StreamConfig::from_env("ENGINE")?;
    let factory = WsTransportFactory::new(&config);
    let mut stream = SessionStream::new(config, factory);
    let mut events = stream.events().context("event receiver already taken")?;

    let version = stream.connect(&host, port, false).await?;
    println!("Connected, server version {}", version);

    if let Some(channel) = stream.channel() {
        channel.market_list()?;
        channel.state_subscribe("BTC/USD")?;
    }

    while let Some(event) = events.recv().await {
        match event {
            StreamEvent::Data(data) => {
                println!("{}: {}", data.method.as_deref().unwrap_or("?"), data.json);
            }
            StreamEvent::RemoteError(err) => {
                eprintln!("remote error {}: {}", err.code, err.message);
            }
            StreamEvent::ReplyTimeout { method, .. } => {
                eprintln!("no reply for {}", method);
            }
            StreamEvent::Disconnected | StreamEvent::Logout => break,
            StreamEvent::Connected { .. } | StreamEvent::TransportError(_) => {}
        }
    }

    Ok(())
}
