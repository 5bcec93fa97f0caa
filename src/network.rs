use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub enum ServerMessage {
    Text(String),
    Connected,
    Disconnected,
}

/// Read-only connection to a relay that streams transcript records
pub struct RelayConnection;

impl RelayConnection {
    pub async fn start(
        host: &str,
        port: u16,
        server_tx: mpsc::UnboundedSender<ServerMessage>,
    ) -> Result<()> {
        info!("Connecting to relay at {}:{}...", host, port);

        let stream = TcpStream::connect(format!("{}:{}", host, port))
            .await
            .context("Failed to connect to relay")?;

        info!("Connected successfully");
        let _ = server_tx.send(ServerMessage::Connected);

        let mut reader = BufReader::new(stream);
        loop {
            let mut line = String::new();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    info!("Connection closed by relay");
                    break;
                }
                Ok(_) => {
                    // Strip only the trailing newline, blank lines matter inside screens
                    let line = line.trim_end_matches(&['\r', '\n']);
                    if server_tx.send(ServerMessage::Text(line.to_string())).is_err() {
                        // Receiver is gone, nobody is listening any more
                        break;
                    }
                }
                Err(e) => {
                    error!("Error reading from relay: {}", e);
                    break;
                }
            }
        }

        let _ = server_tx.send(ServerMessage::Disconnected);
        Ok(())
    }
}
