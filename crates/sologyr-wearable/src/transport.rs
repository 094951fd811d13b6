//! Seams between the engine and the outside world.

use std::sync::Arc;

use sologyr_weather::{CurrentConditions, Location, RawInterval, SunTimes};

use crate::error::TransportError;
use crate::packet::Packet;

/// Outbound side of the watch link
pub trait Transport: Send + Sync {
    /// Queue one packet for delivery. Delivery is confirmed later by an
    /// ack or nack event carrying the same transaction id.
    fn send(&self, transaction_id: u8, packet: &Packet) -> Result<(), TransportError>;

    /// Acknowledge an inbound message
    fn send_ack(&self, transaction_id: u8) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, transaction_id: u8, packet: &Packet) -> Result<(), TransportError> {
        (**self).send(transaction_id, packet)
    }

    fn send_ack(&self, transaction_id: u8) -> Result<(), TransportError> {
        (**self).send_ack(transaction_id)
    }
}

/// Everything the engine mirrors to the watch, as of one moment
#[derive(Debug, Clone, Default)]
pub struct HostSnapshot {
    pub location: Option<Location>,
    pub current: Option<CurrentConditions>,
    pub sun_times: Option<SunTimes>,
    pub forecast: Arc<Vec<RawInterval>>,
    pub nowcast: Arc<Vec<RawInterval>>,
    pub update_frequency_minutes: u32,
}

/// The weather service as seen from the engine
pub trait SyncHost: Send + Sync {
    /// Ask for fresh data. Returns false when the data is already fresh and
    /// no fetch was started.
    fn request_refresh(&self) -> bool;

    fn snapshot(&self) -> HostSnapshot;

    /// Called on connection edges so the host can start or stop pushing updates.
    fn set_subscribed(&self, subscribed: bool);
}

impl<H: SyncHost + ?Sized> SyncHost for Arc<H> {
    fn request_refresh(&self) -> bool {
        (**self).request_refresh()
    }

    fn snapshot(&self) -> HostSnapshot {
        (**self).snapshot()
    }

    fn set_subscribed(&self, subscribed: bool) {
        (**self).set_subscribed(subscribed)
    }
}
