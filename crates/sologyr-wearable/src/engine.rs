//! Watch sync engine.
//!
//! Mirrors weather state to the watch as small dictionary packets. Single
//! packets (location, current conditions, sun times, preferences) are sent
//! as-is; series go out as bracketed bulk transactions, one item per packet
//! with a fixed pacing delay between them.
//!
//! Inbound events may arrive on another task while a bulk send is pacing.
//! The session lives behind a mutex that is never held across a send or an
//! await, and the pacing loop re-checks it before every item.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sologyr_core::WearableConfig;
use sologyr_weather::{CurrentConditions, Location, RawInterval, SunTimes};
use tokio::sync::mpsc;

use crate::error::SyncError;
use crate::keys;
use crate::packet::{Packet, Value};
use crate::series::{self, Clock, LocalClock, SeriesLimits};
use crate::session::{SyncSession, Transition};
use crate::transport::{SyncHost, Transport};

/// Event reported by the watch link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WearableEvent {
    Connected,
    Disconnected,
    Ack(u8),
    Nack(u8),
    Data { transaction_id: u8, payload: Vec<u8> },
}

/// What the caller should do after an event was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Followup {
    Nothing,
    FullResend,
}

/// Result of a bulk send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkOutcome {
    /// Begin marker, every item and end marker were handed to the transport
    Completed { items: usize },
    /// Another bulk send was in progress; nothing was sent
    Dropped,
    /// No watch connected; nothing was sent
    NotConnected,
    /// Connection lost mid-send; no end marker, the watch discards the partial update
    Aborted { sent: usize },
}

/// Engine tuning
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub pacing: Duration,
    pub nack_threshold: u32,
    pub limits: SeriesLimits,
    /// One bracket for precipitation and temperature series
    pub combined_forecast_bracket: bool,
}

impl EngineSettings {
    pub fn from_config(config: &WearableConfig) -> Self {
        Self {
            pacing: Duration::from_millis(config.pacing_ms),
            nack_threshold: config.nack_threshold,
            limits: SeriesLimits::from_config(config),
            combined_forecast_bracket: config.combined_forecast_bracket,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&WearableConfig::default())
    }
}

/// Releases the bulk-send slot when dropped
struct BulkGuard {
    session: Arc<Mutex<SyncSession>>,
}

impl Drop for BulkGuard {
    fn drop(&mut self) {
        self.session.lock().end_bulk();
    }
}

pub struct SyncEngine<T, H> {
    transport: T,
    host: H,
    session: Arc<Mutex<SyncSession>>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
}

impl<T: Transport, H: SyncHost> SyncEngine<T, H> {
    pub fn new(transport: T, host: H, settings: EngineSettings) -> Self {
        Self {
            transport,
            host,
            session: Arc::new(Mutex::new(SyncSession::new())),
            clock: Arc::new(LocalClock),
            settings,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Copy of the current session state
    pub fn session(&self) -> SyncSession {
        self.session.lock().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.session.lock().is_connected()
    }

    /// Apply one link event. Returns whether a full resend is due.
    pub fn handle_event(&self, event: WearableEvent) -> Result<Followup, SyncError> {
        match event {
            WearableEvent::Connected => {
                let transition = self.session.lock().on_connect();
                self.apply(transition);
                Ok(Followup::Nothing)
            }
            WearableEvent::Disconnected => {
                let transition = self.session.lock().on_disconnect();
                self.apply(transition);
                Ok(Followup::Nothing)
            }
            WearableEvent::Ack(_) => {
                let transition = self.session.lock().on_ack();
                self.apply(transition);
                Ok(Followup::Nothing)
            }
            WearableEvent::Nack(transaction_id) => {
                let (transition, count, sending, connected) = {
                    let mut session = self.session.lock();
                    let transition = session.on_nack(transaction_id, self.settings.nack_threshold);
                    (
                        transition,
                        session.nack_count(),
                        session.sending_transaction_id(),
                        session.is_connected(),
                    )
                };
                tracing::info!(
                    "Received nack {} for transaction {}, sending transaction {}, still connected: {}",
                    count,
                    transaction_id,
                    sending,
                    connected
                );
                self.apply(transition);
                Ok(Followup::Nothing)
            }
            WearableEvent::Data {
                transaction_id,
                payload,
            } => self.handle_data(transaction_id, &payload),
        }
    }

    fn handle_data(&self, transaction_id: u8, payload: &[u8]) -> Result<Followup, SyncError> {
        let packet = Packet::decode(payload)?;
        self.transport.send_ack(transaction_id)?;

        let transition = self.session.lock().on_data();
        self.apply(transition);

        if packet.contains_key(keys::HELLO) {
            tracing::info!("Watch says hello");
            self.host.request_refresh();
            return Ok(Followup::FullResend);
        }

        let issued = if let Some(level) = packet.get(keys::ACTIVE_INTERVAL) {
            tracing::info!("Watch predicts activity level {:?}", level.as_i64());
            self.host.request_refresh()
        } else if let Some(tap) = packet.get(keys::TAP) {
            let axis_direction = tap.as_i64().unwrap_or_default();
            tracing::info!(
                "Watch reports tap: axis {} direction {}",
                axis_direction & 0x0F,
                (axis_direction >> 4) & 0x0F
            );
            self.host.request_refresh()
        } else {
            tracing::debug!("Ignoring data message with {} tuples", packet.len());
            return Ok(Followup::Nothing);
        };

        // Make sure every connection gets at least one full update
        if !issued && !self.session.lock().updated_since_connect() {
            return Ok(Followup::FullResend);
        }
        Ok(Followup::Nothing)
    }

    fn apply(&self, transition: Transition) {
        match transition {
            Transition::Connected => {
                tracing::info!("Watch connected");
                self.host.set_subscribed(true);
            }
            Transition::Disconnected => {
                tracing::info!("Watch disconnected");
                self.host.set_subscribed(false);
            }
            Transition::Unchanged => {}
        }
    }

    /// Send one packet if connected. Returns whether it was sent.
    fn send_single(&self, packet: &Packet) -> Result<bool, SyncError> {
        let transaction_id = {
            let mut session = self.session.lock();
            if !session.is_connected() {
                return Ok(false);
            }
            session.mark_updated();
            session.next_transaction_id()
        };
        self.transport.send(transaction_id, packet)?;
        Ok(true)
    }

    pub fn send_location(&self, location: &Location) -> Result<bool, SyncError> {
        tracing::debug!(
            "Location {} {} ({:?}, {:?} m away)",
            location.latitude,
            location.longitude,
            location.locality,
            location.locality_distance_m
        );
        let mut packet = Packet::new()
            .with(keys::LAT, Value::Int32(scaled_coordinate(location.latitude)))
            .with(keys::LON, Value::Int32(scaled_coordinate(location.longitude)));
        if let Some(name) = &location.locality {
            packet.insert(keys::LOCATION_NAME, Value::CString(name.clone()));
        }
        self.send_single(&packet)
    }

    pub fn send_current(&self, current: &CurrentConditions) -> Result<bool, SyncError> {
        let mut packet = Packet::new();
        if let Some(text) = current.temperature_text() {
            packet.insert(keys::TEMPERATURE, Value::CString(text));
        }
        packet.insert(keys::CLOUD_COVER, Value::Uint8(current.cloud_cover_percent()));
        packet.insert(keys::WEATHER_ICON, Value::Uint8(current.icon.code()));
        self.send_single(&packet)
    }

    /// `None` (polar day or night) is sent as all zeros.
    pub fn send_sun_times(&self, sun: Option<SunTimes>) -> Result<bool, SyncError> {
        let sun = sun.unwrap_or_default();
        tracing::debug!(
            "Sun times {}:{:02} - {}:{:02}",
            sun.sunrise_hour,
            sun.sunrise_minute,
            sun.sunset_hour,
            sun.sunset_minute
        );
        let packet = Packet::new()
            .with(keys::SUNRISE_HOUR, Value::Int8(clock_field(sun.sunrise_hour)))
            .with(keys::SUNRISE_MINUTE, Value::Int8(clock_field(sun.sunrise_minute)))
            .with(keys::SUNSET_HOUR, Value::Int8(clock_field(sun.sunset_hour)))
            .with(keys::SUNSET_MINUTE, Value::Int8(clock_field(sun.sunset_minute)));
        self.send_single(&packet)
    }

    pub fn send_preferences(&self, update_frequency_minutes: u32) -> Result<bool, SyncError> {
        let frequency = i16::try_from(update_frequency_minutes).unwrap_or(i16::MAX);
        let packet = Packet::new().with(keys::PREF_UPDATE_FREQ, Value::Int16(frequency));
        self.send_single(&packet)
    }

    pub async fn send_precipitation_series(
        &self,
        intervals: &[RawInterval],
    ) -> Result<BulkOutcome, SyncError> {
        let packets = self.precipitation_packets(intervals);
        self.bulk_send("precipitation", packets).await
    }

    pub async fn send_forecast_series(
        &self,
        intervals: &[RawInterval],
    ) -> Result<BulkOutcome, SyncError> {
        let packets = self.forecast_packets(intervals);
        self.bulk_send("forecast", packets).await
    }

    /// Precipitation then temperature series, bracketed separately or
    /// together depending on `combined_forecast_bracket`.
    ///
    /// The watch clears both series whenever a begin marker arrives, so with
    /// separate brackets it only keeps the temperature series.
    pub async fn send_forecast_window(
        &self,
        intervals: &[RawInterval],
    ) -> Result<BulkOutcome, SyncError> {
        if !self.settings.combined_forecast_bracket {
            self.send_precipitation_series(intervals).await?;
            return self.send_forecast_series(intervals).await;
        }
        let mut packets = self.precipitation_packets(intervals);
        packets.extend(self.forecast_packets(intervals));
        self.bulk_send("precipitation and forecast", packets).await
    }

    fn precipitation_packets(&self, intervals: &[RawInterval]) -> Vec<Packet> {
        let clock = self.clock.series_clock();
        series::precipitation_series(intervals, &clock, &self.settings.limits)
            .into_iter()
            .map(|item| {
                Packet::new()
                    .with(keys::PRECIPITATION_MINUTES, Value::Int16(item.minutes))
                    .with(keys::FORECAST_PRECIPITATION, Value::Uint8(item.amount))
                    .with(keys::FORECAST_PRECIPITATION_MIN, Value::Uint8(item.min))
                    .with(keys::FORECAST_PRECIPITATION_MAX, Value::Uint8(item.max))
            })
            .collect()
    }

    fn forecast_packets(&self, intervals: &[RawInterval]) -> Vec<Packet> {
        let clock = self.clock.series_clock();
        series::forecast_series(intervals, &clock, &self.settings.limits)
            .into_iter()
            .map(|item| {
                Packet::new()
                    .with(keys::FORECAST_MINUTES, Value::Int16(item.minutes))
                    .with(keys::FORECAST_TEMPERATURE, Value::Int16(item.tenths))
            })
            .collect()
    }

    /// The nowcast fits in one packet of two parallel byte arrays.
    pub async fn send_nowcast_series(
        &self,
        intervals: &[RawInterval],
    ) -> Result<BulkOutcome, SyncError> {
        let clock = self.clock.series_clock();
        let nowcast = series::nowcast_series(intervals, &clock, &self.settings.limits);
        let packets = if nowcast.is_empty() {
            Vec::new()
        } else {
            vec![Packet::new()
                .with(keys::NOWCAST_MINUTES, Value::Bytes(nowcast.minutes))
                .with(keys::NOWCAST_PRECIPITATION, Value::Bytes(nowcast.amounts))]
        };
        self.bulk_send("nowcast", packets).await
    }

    /// Resend everything the host currently knows.
    pub async fn send_all(&self) -> Result<(), SyncError> {
        let snapshot = self.host.snapshot();
        if let Some(location) = &snapshot.location {
            self.send_location(location)?;
        }
        if let Some(current) = &snapshot.current {
            self.send_current(current)?;
        }
        self.send_sun_times(snapshot.sun_times)?;
        self.send_preferences(snapshot.update_frequency_minutes)?;

        self.send_nowcast_series(&snapshot.nowcast).await?;
        self.send_forecast_window(&snapshot.forecast).await?;
        Ok(())
    }

    async fn bulk_send(&self, name: &str, packets: Vec<Packet>) -> Result<BulkOutcome, SyncError> {
        let _guard = {
            let mut session = self.session.lock();
            if !session.is_connected() {
                return Ok(BulkOutcome::NotConnected);
            }
            if !session.try_begin_bulk() {
                tracing::debug!("Dropping {} send, another bulk send is in progress", name);
                return Ok(BulkOutcome::Dropped);
            }
            BulkGuard {
                session: Arc::clone(&self.session),
            }
        };

        self.send_marker(keys::TRANSACTION_BEGIN)?;

        let mut sent = 0;
        for packet in &packets {
            if self.link_lost() {
                tracing::warn!(
                    "Aborting {} send after {} of {} items",
                    name,
                    sent,
                    packets.len()
                );
                return Ok(BulkOutcome::Aborted { sent });
            }
            self.send_in_transaction(packet)?;
            sent += 1;
            tokio::time::sleep(self.settings.pacing).await;
        }

        if self.link_lost() {
            tracing::warn!("Aborting {} send before end marker", name);
            return Ok(BulkOutcome::Aborted { sent });
        }
        self.send_marker(keys::TRANSACTION_END)?;
        tracing::debug!("Sent {} series with {} items", name, sent);
        Ok(BulkOutcome::Completed { items: sent })
    }

    fn link_lost(&self) -> bool {
        let session = self.session.lock();
        !session.is_connected() || session.nack_exceeded(self.settings.nack_threshold)
    }

    fn send_marker(&self, marker: u8) -> Result<(), SyncError> {
        let packet = Packet::new().with(keys::FORECAST_TRANSACTION, Value::Uint8(marker));
        self.send_in_transaction(&packet)
    }

    fn send_in_transaction(&self, packet: &Packet) -> Result<(), SyncError> {
        let transaction_id = {
            let mut session = self.session.lock();
            session.mark_updated();
            session.next_transaction_id()
        };
        self.transport.send(transaction_id, packet)?;
        Ok(())
    }
}

impl<T, H> SyncEngine<T, H>
where
    T: Transport + 'static,
    H: SyncHost + 'static,
{
    /// Process link events until the channel closes. Full resends run on
    /// their own task so acks and nacks keep flowing while they pace.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<WearableEvent>) {
        while let Some(event) = events.recv().await {
            match self.handle_event(event) {
                Ok(Followup::FullResend) => {
                    let engine = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = engine.send_all().await {
                            tracing::warn!("Full resend failed: {}", e);
                        }
                    });
                }
                Ok(Followup::Nothing) => {}
                Err(e) => tracing::warn!("Failed to handle watch event: {}", e),
            }
        }
        tracing::debug!("Watch event channel closed");
    }
}

/// Degrees to thousandths, as the watch stores coordinates
fn scaled_coordinate(degrees: f64) -> i32 {
    (degrees * 1000.0).round() as i32
}

fn clock_field(value: u8) -> i8 {
    i8::try_from(value).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::transport::HostSnapshot;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(u8, Packet)>>,
        acks: Mutex<Vec<u8>>,
    }

    impl Transport for Recorder {
        fn send(&self, transaction_id: u8, packet: &Packet) -> Result<(), TransportError> {
            self.sent.lock().push((transaction_id, packet.clone()));
            Ok(())
        }

        fn send_ack(&self, transaction_id: u8) -> Result<(), TransportError> {
            self.acks.lock().push(transaction_id);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Host {
        fresh: AtomicBool,
        subscribed: AtomicBool,
    }

    impl SyncHost for Host {
        fn request_refresh(&self) -> bool {
            !self.fresh.load(Ordering::SeqCst)
        }

        fn snapshot(&self) -> HostSnapshot {
            HostSnapshot::default()
        }

        fn set_subscribed(&self, subscribed: bool) {
            self.subscribed.store(subscribed, Ordering::SeqCst);
        }
    }

    fn engine() -> SyncEngine<Arc<Recorder>, Arc<Host>> {
        SyncEngine::new(Arc::default(), Arc::default(), EngineSettings::default())
    }

    fn data(packet: Packet) -> WearableEvent {
        WearableEvent::Data {
            transaction_id: 7,
            payload: packet.encode().unwrap(),
        }
    }

    #[test]
    fn test_scaled_coordinate() {
        assert_eq!(scaled_coordinate(59.9132694), 59_913);
        assert_eq!(scaled_coordinate(-10.7396), -10_740);
    }

    #[test]
    fn test_single_send_needs_connection() {
        let engine = engine();
        assert!(!engine.send_preferences(180).unwrap());
        assert!(engine.transport.sent.lock().is_empty());

        engine.handle_event(WearableEvent::Connected).unwrap();
        assert!(engine.send_preferences(180).unwrap());
        let sent = engine.transport.sent.lock();
        assert_eq!(sent[0].1.get(keys::PREF_UPDATE_FREQ), Some(&Value::Int16(180)));
        assert!(engine.session().updated_since_connect());
    }

    #[test]
    fn test_location_packet() {
        let engine = engine();
        engine.handle_event(WearableEvent::Connected).unwrap();
        let mut location = Location::new(59.9132694, 10.7391112);
        location.locality = Some("Oslo".into());
        location.locality_distance_m = Some(420);
        engine.send_location(&location).unwrap();

        let sent = engine.transport.sent.lock();
        let packet = &sent[0].1;
        assert_eq!(packet.get(keys::LAT), Some(&Value::Int32(59_913)));
        assert_eq!(packet.get(keys::LON), Some(&Value::Int32(10_739)));
        assert_eq!(packet.get(keys::LOCATION_NAME), Some(&Value::CString("Oslo".into())));
    }

    #[test]
    fn test_polar_sun_times_are_zero() {
        let engine = engine();
        engine.handle_event(WearableEvent::Connected).unwrap();
        engine.send_sun_times(None).unwrap();
        let sent = engine.transport.sent.lock();
        assert_eq!(sent[0].1.get(keys::SUNRISE_HOUR), Some(&Value::Int8(0)));
        assert_eq!(sent[0].1.get(keys::SUNSET_MINUTE), Some(&Value::Int8(0)));
    }

    #[test]
    fn test_data_connects_and_acks() {
        let engine = engine();
        let followup = engine
            .handle_event(data(Packet::new().with(keys::HELLO, Value::Uint8(1))))
            .unwrap();
        assert_eq!(followup, Followup::FullResend);
        assert!(engine.is_connected());
        assert!(engine.host.subscribed.load(Ordering::SeqCst));
        assert_eq!(*engine.transport.acks.lock(), vec![7]);
    }

    #[test]
    fn test_tap_resends_when_nothing_sent_yet() {
        let engine = engine();
        engine.host.fresh.store(true, Ordering::SeqCst);
        engine.handle_event(WearableEvent::Connected).unwrap();

        let tap = data(Packet::new().with(keys::TAP, Value::Int32(0x12)));
        assert_eq!(engine.handle_event(tap.clone()).unwrap(), Followup::FullResend);

        engine.send_preferences(60).unwrap();
        assert_eq!(engine.handle_event(tap).unwrap(), Followup::Nothing);
    }

    #[test]
    fn test_tap_with_refresh_issued_waits_for_data() {
        let engine = engine();
        engine.handle_event(WearableEvent::Connected).unwrap();
        let tap = data(Packet::new().with(keys::TAP, Value::Int32(0x21)));
        assert_eq!(engine.handle_event(tap).unwrap(), Followup::Nothing);
    }

    #[test]
    fn test_garbage_data_is_not_acked() {
        let engine = engine();
        let result = engine.handle_event(WearableEvent::Data {
            transaction_id: 3,
            payload: vec![1, 2],
        });
        assert!(matches!(result, Err(SyncError::Packet(_))));
        assert!(engine.transport.acks.lock().is_empty());
        assert!(!engine.is_connected());
    }

    #[test]
    fn test_disconnect_unsubscribes() {
        let engine = engine();
        engine.handle_event(WearableEvent::Connected).unwrap();
        engine.handle_event(WearableEvent::Disconnected).unwrap();
        assert!(!engine.host.subscribed.load(Ordering::SeqCst));
    }
}
