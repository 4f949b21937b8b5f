//! Publisher module for IPC communication
//!
//! Forwards bus traffic to the fan-out process over a Unix socket. Frames
//! are a 4-byte big-endian length followed by a MessagePack `IpcFrame`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::bus::Bus;
use crate::error::{FeedError, Result};
use crate::market::MarketMeta;
use crate::messages::MessageEnvelope;

/// Unit written to the IPC socket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IpcFrame {
    /// Markets served, sent once every producer is ready
    Markets(Vec<MarketMeta>),
    /// Envelopes of one notification, in emission order
    Data(Vec<MessageEnvelope>),
}

/// Length-prefixed MessagePack encoding of a frame
pub fn encode_frame(frame: &IpcFrame) -> Result<Vec<u8>> {
    let data = rmp_serde::to_vec_named(frame)?;

    let len = u32::try_from(data.len())
        .map_err(|_| FeedError::SerializationError(format!("frame too large: {} bytes", data.len())))?;
    let mut message = Vec::with_capacity(4 + data.len());
    message.extend_from_slice(&len.to_be_bytes());
    message.extend_from_slice(&data);
    Ok(message)
}

/// Publisher for sending bus traffic via Unix socket
pub struct Publisher {
    socket_path: PathBuf,
    stream: Option<UnixStream>,
}

impl Publisher {
    /// Create a new publisher
    pub async fn new(socket_path: impl AsRef<Path>) -> Self {
        let mut publisher = Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            stream: None,
        };

        // the consumer may not be listening yet
        if let Err(e) = publisher.connect().await {
            warn!(error = %e, "Initial IPC connection failed, will retry on publish");
        }

        publisher
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn connect(&mut self) -> Result<()> {
        let path = self.socket_path.as_path();

        if !path.exists() {
            return Err(FeedError::IpcError(format!(
                "Socket path does not exist: {}",
                path.display()
            )));
        }

        let stream = UnixStream::connect(path).await.map_err(|e| {
            FeedError::IpcError(format!("Failed to connect to {}: {}", path.display(), e))
        })?;
        self.stream = Some(stream);

        info!(path = %path.display(), "Connected to IPC socket");
        Ok(())
    }

    /// Write one frame; transport failures drop the frame instead of failing
    pub async fn publish(&mut self, frame: &IpcFrame) -> Result<()> {
        let message = encode_frame(frame)?;

        if self.stream.is_none() {
            if let Err(e) = self.connect().await {
                debug!(error = %e, "Failed to reconnect to IPC socket");
                return Ok(());
            }
        }

        if let Some(stream) = self.stream.as_mut() {
            match stream.write_all(&message).await {
                Ok(()) => debug!(bytes = message.len(), "Published frame"),
                Err(e) => {
                    warn!(error = %e, "Failed to write to IPC socket");
                    self.stream = None;
                }
            }
        }

        Ok(())
    }

    /// Forward `Data` and `Markets` until `Cleanup` or the bus closes.
    ///
    /// Announces itself on `MinionReady` once subscribed.
    pub async fn run(mut self, bus: Bus) -> Result<()> {
        let mut data = bus.data.subscribe();
        let mut markets = bus.markets.subscribe();
        let mut cleanup = bus.cleanup.subscribe();

        bus.minion_ready.publish(());
        info!(path = %self.socket_path.display(), "Publisher ready");

        loop {
            let frame = tokio::select! {
                biased;
                _ = cleanup.recv() => break,
                received = markets.recv() => match received {
                    Ok(markets) => IpcFrame::Markets(markets.to_vec()),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, topic = bus.markets.name(), "Publisher lagging");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                received = data.recv() => match received {
                    Ok(batch) => IpcFrame::Data(batch.to_vec()),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, topic = bus.data.name(), "Publisher lagging");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };

            self.publish(&frame).await?;
        }

        info!("Publisher stopped");
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        Ok(())
    }
}
