//! Weather service: owns the fetched state, refreshes it on a schedule and
//! tells observers what changed.
//!
//! A failed refresh leaves the previous forecast in place. The watch keeps
//! showing stale data rather than nothing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, Offset, Utc};
use parking_lot::RwLock;
use sologyr_core::{AppError, Config};
use sologyr_weather::{
    sun_times, CurrentConditions, FeedClient, FeedError, ForecastRecord, Location, RawInterval,
    SunTimes, WindowAssembler,
};
use sologyr_wearable::{HostSnapshot, SyncEngine, SyncError, SyncHost, Transport};
use tokio::sync::{broadcast, mpsc};

/// Pending refresh requests beyond this are coalesced
const REFRESH_QUEUE: usize = 1;
const UPDATE_CHANNEL_CAPACITY: usize = 32;

/// Which part of the service state changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherUpdate {
    Location,
    Current,
    SunTimes,
    Forecast,
    Nowcast,
    Preferences(u32),
}

#[derive(Debug, Default)]
struct WeatherState {
    location: Option<Location>,
    current: Option<CurrentConditions>,
    sun_times: Option<SunTimes>,
    forecast: Arc<Vec<RawInterval>>,
    nowcast: Arc<Vec<RawInterval>>,
    window: Arc<Vec<ForecastRecord>>,
    update_frequency_minutes: u32,
    last_updated: Option<DateTime<Utc>>,
}

pub struct WeatherService {
    client: FeedClient,
    assembler: WindowAssembler,
    state: RwLock<WeatherState>,
    updates: broadcast::Sender<WeatherUpdate>,
    refresh_tx: mpsc::Sender<()>,
    subscribed: AtomicBool,
}

impl WeatherService {
    /// Build the service and the receiving end of its refresh queue, which
    /// [`WeatherService::run`] consumes.
    pub fn new(config: &Config) -> Result<(Self, mpsc::Receiver<()>), AppError> {
        let client = FeedClient::new(&config.feed).map_err(AppError::feed)?;
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        let (refresh_tx, refresh_rx) = mpsc::channel(REFRESH_QUEUE);

        let state = WeatherState {
            update_frequency_minutes: config.weather.update_frequency_minutes,
            ..WeatherState::default()
        };

        let service = Self {
            client,
            assembler: WindowAssembler::from_config(&config.forecast),
            state: RwLock::new(state),
            updates,
            refresh_tx,
            subscribed: AtomicBool::new(false),
        };
        Ok((service, refresh_rx))
    }

    /// Register an observer. Every state change is announced on the returned receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<WeatherUpdate> {
        self.updates.subscribe()
    }

    /// Whether a watch currently wants pushed updates
    pub fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::SeqCst)
    }

    pub fn location(&self) -> Option<Location> {
        self.state.read().location.clone()
    }

    /// The last successfully assembled forecast window
    pub fn window(&self) -> Arc<Vec<ForecastRecord>> {
        Arc::clone(&self.state.read().window)
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.state.read().last_updated
    }

    pub fn update_frequency(&self) -> Duration {
        let minutes = self.state.read().update_frequency_minutes.max(1);
        Duration::from_secs(u64::from(minutes) * 60)
    }

    pub fn set_location(&self, location: Location) {
        let today = Local::now();
        let offset = today.offset().fix().local_minus_utc();
        self.set_location_on(location, today.date_naive(), offset);
    }

    fn set_location_on(&self, location: Location, today: NaiveDate, utc_offset_secs: i32) {
        tracing::info!(
            "Location set to {:.4}, {:.4}",
            location.latitude,
            location.longitude
        );
        let sun = sun_times(today, location.latitude, location.longitude, utc_offset_secs);
        {
            let mut state = self.state.write();
            state.location = Some(location);
            state.sun_times = sun;
        }
        self.notify(WeatherUpdate::Location);
        self.notify(WeatherUpdate::SunTimes);
    }

    /// Change how often the feeds are polled. Takes effect after the current wait.
    pub fn set_update_frequency(&self, minutes: u32) {
        let previous = std::mem::replace(&mut self.state.write().update_frequency_minutes, minutes);
        if previous != minutes {
            tracing::info!("Update frequency changed from {} to {} minutes", previous, minutes);
        }
        self.notify(WeatherUpdate::Preferences(minutes));
    }

    /// Fetch every feed once for the configured location.
    ///
    /// Returns an error when the forecast window could not be refreshed. A
    /// failed nowcast or current-conditions fetch is only logged.
    pub async fn refresh(&self) -> Result<(), AppError> {
        self.refresh_on(Local::now().date_naive()).await
    }

    async fn refresh_on(&self, today: NaiveDate) -> Result<(), AppError> {
        let location = self
            .location()
            .ok_or_else(|| AppError::feed("no location set"))?;
        let (lat, lon) = (location.latitude, location.longitude);

        let forecast = self.fetch_window(lat, lon, today).await;

        match self.client.fetch_nowcast(lat, lon).await {
            Ok(nowcast) => {
                self.state.write().nowcast = Arc::new(nowcast);
                self.notify(WeatherUpdate::Nowcast);
            }
            Err(e) => tracing::warn!("Nowcast refresh failed: {}", e),
        }

        match self.client.fetch_current(lat, lon).await {
            Ok(Some(current)) => {
                self.state.write().current = Some(current);
                self.notify(WeatherUpdate::Current);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Current conditions refresh failed: {}", e),
        }

        match forecast {
            Ok((raw, window)) => {
                tracing::info!("Forecast window refreshed with {} days", window.len());
                {
                    let mut state = self.state.write();
                    state.forecast = Arc::new(raw);
                    state.window = Arc::new(window);
                    state.last_updated = Some(Utc::now());
                }
                self.notify(WeatherUpdate::Forecast);
                Ok(())
            }
            Err(e) => {
                let transient = matches!(&e, FeedError::Network(n) if n.is_transient());
                tracing::warn!(
                    transient,
                    "Forecast refresh failed, keeping the last window: {}",
                    e
                );
                Err(AppError::feed(e))
            }
        }
    }

    async fn fetch_window(
        &self,
        lat: f64,
        lon: f64,
        today: NaiveDate,
    ) -> Result<(Vec<RawInterval>, Vec<ForecastRecord>), FeedError> {
        let raw = self.client.fetch_forecast(lat, lon).await?;
        let window = self.assembler.assemble(&raw, today)?;
        Ok((raw, window))
    }

    /// Refresh now, then once per update period or whenever a refresh is
    /// requested. Runs for as long as the service lives.
    pub async fn run(self: Arc<Self>, mut requests: mpsc::Receiver<()>) {
        loop {
            if let Err(e) = self.refresh().await {
                tracing::debug!("Refresh cycle ended with: {}", e.user_message());
            }
            // Requests queued during the fetch are answered by it
            while requests.try_recv().is_ok() {}

            tokio::select! {
                _ = tokio::time::sleep(self.update_frequency()) => {}
                request = requests.recv() => {
                    if request.is_none() {
                        break;
                    }
                    tracing::debug!("Refresh requested");
                }
            }
        }
        tracing::debug!("Refresh loop stopped");
    }

    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        let state = self.state.read();
        let period = chrono::Duration::minutes(i64::from(state.update_frequency_minutes));
        state.last_updated.is_none_or(|updated| now - updated >= period)
    }

    fn notify(&self, update: WeatherUpdate) {
        // No receivers is fine
        let _ = self.updates.send(update);
    }
}

impl SyncHost for WeatherService {
    fn request_refresh(&self) -> bool {
        if !self.is_stale(Utc::now()) {
            return false;
        }
        match self.refresh_tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => true,
            Err(mpsc::error::TrySendError::Closed(())) => false,
        }
    }

    fn snapshot(&self) -> HostSnapshot {
        let state = self.state.read();
        HostSnapshot {
            location: state.location.clone(),
            current: state.current.clone(),
            sun_times: state.sun_times,
            forecast: Arc::clone(&state.forecast),
            nowcast: Arc::clone(&state.nowcast),
            update_frequency_minutes: state.update_frequency_minutes,
        }
    }

    fn set_subscribed(&self, subscribed: bool) {
        let was = self.subscribed.swap(subscribed, Ordering::SeqCst);
        if was != subscribed {
            tracing::info!(
                "Watch {} updates",
                if subscribed { "subscribed to" } else { "unsubscribed from" }
            );
        }
    }
}

/// Forward service updates to the watch while it is subscribed.
pub async fn mirror_updates<T, H>(
    engine: Arc<SyncEngine<T, H>>,
    service: Arc<WeatherService>,
    mut updates: broadcast::Receiver<WeatherUpdate>,
) where
    T: Transport,
    H: SyncHost,
{
    loop {
        match updates.recv().await {
            Ok(update) => {
                if !service.is_subscribed() {
                    continue;
                }
                if let Err(e) = push_update(&engine, &service, update).await {
                    tracing::warn!("Failed to push {:?} to the watch: {}", update, e);
                    tracing::debug!("{}", e.user_message());
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!("Missed {} updates, resending everything", missed);
                if service.is_subscribed() {
                    if let Err(e) = engine.send_all().await.map_err(AppError::wearable) {
                        tracing::warn!("Full resend failed: {}", e);
                        tracing::debug!("{}", e.user_message());
                    }
                }
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn push_update<T, H>(
    engine: &SyncEngine<T, H>,
    service: &WeatherService,
    update: WeatherUpdate,
) -> Result<(), AppError>
where
    T: Transport,
    H: SyncHost,
{
    send_update(engine, service, update)
        .await
        .map_err(AppError::wearable)
}

async fn send_update<T, H>(
    engine: &SyncEngine<T, H>,
    service: &WeatherService,
    update: WeatherUpdate,
) -> Result<(), SyncError>
where
    T: Transport,
    H: SyncHost,
{
    let snapshot = service.snapshot();
    match update {
        WeatherUpdate::Location => {
            if let Some(location) = &snapshot.location {
                engine.send_location(location)?;
            }
        }
        WeatherUpdate::Current => {
            if let Some(current) = &snapshot.current {
                engine.send_current(current)?;
            }
        }
        WeatherUpdate::SunTimes => {
            engine.send_sun_times(snapshot.sun_times)?;
        }
        WeatherUpdate::Forecast => {
            engine.send_forecast_window(&snapshot.forecast).await?;
        }
        WeatherUpdate::Nowcast => {
            engine.send_nowcast_series(&snapshot.nowcast).await?;
        }
        WeatherUpdate::Preferences(minutes) => {
            engine.send_preferences(minutes)?;
        }
    }
    Ok(())
}
