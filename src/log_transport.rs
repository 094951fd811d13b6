//! Watch link stand-in that writes every outgoing frame to the log.
//!
//! Each packet is acknowledged straight away, as a watch that received it
//! would, so the engine sees a healthy link.

use sologyr_wearable::{Packet, Transport, TransportError, WearableEvent};
use tokio::sync::mpsc;

pub struct LogTransport {
    events: mpsc::Sender<WearableEvent>,
}

impl LogTransport {
    pub fn new(events: mpsc::Sender<WearableEvent>) -> Self {
        Self { events }
    }
}

impl Transport for LogTransport {
    fn send(&self, transaction_id: u8, packet: &Packet) -> Result<(), TransportError> {
        let frame = packet
            .encode()
            .map_err(|e| TransportError(e.to_string()))?;
        tracing::info!(
            transaction_id,
            tuples = packet.len(),
            "-> {}",
            hex::encode(frame)
        );

        match self.events.try_send(WearableEvent::Ack(transaction_id)) {
            Ok(()) => Ok(()),
            // A lost ack only delays the nack reset
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!("Event queue full, dropping ack {}", transaction_id);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(TransportError("watch event channel closed".to_string()))
            }
        }
    }

    fn send_ack(&self, transaction_id: u8) -> Result<(), TransportError> {
        tracing::debug!(transaction_id, "-> ack");
        Ok(())
    }
}
