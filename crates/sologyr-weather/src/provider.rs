use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client, StatusCode};
use sologyr_core::{FeedConfig, ReqwestErrorExt};
use url::Url;

use crate::current::CurrentConditions;
use crate::parser;
use crate::types::{FeedError, RawInterval};

const USER_AGENT: &str = concat!("sologyr/", env!("CARGO_PKG_VERSION"));

/// HTTP client for the interval feeds and the current-conditions source
#[derive(Debug, Clone)]
pub struct FeedClient {
    client: Arc<Client>,
    forecast_url: Url,
    nowcast_url: Url,
    current_url: Option<Url>,
}

impl FeedClient {
    pub fn new(config: &FeedConfig) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FeedError::Network(e.into_network_error()))?;

        Ok(Self {
            client: Arc::new(client),
            forecast_url: Url::parse(&config.forecast_url)?,
            nowcast_url: Url::parse(&config.nowcast_url)?,
            current_url: config
                .current_url
                .as_deref()
                .map(Url::parse)
                .transpose()?,
        })
    }

    /// Fetch and parse the multi-day interval feed.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_forecast(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Vec<RawInterval>, FeedError> {
        self.fetch_intervals(&self.forecast_url, latitude, longitude).await
    }

    /// Fetch and parse the short-horizon precipitation feed.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_nowcast(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Vec<RawInterval>, FeedError> {
        self.fetch_intervals(&self.nowcast_url, latitude, longitude).await
    }

    /// Fetch current conditions. `Ok(None)` when no source is configured.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_current(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<CurrentConditions>, FeedError> {
        let Some(base) = &self.current_url else {
            return Ok(None);
        };

        let url = base.join(&format!("{},{}", latitude, longitude))?;
        let response = self
            .client
            .get(url)
            .query(&[("units", "si"), ("exclude", "hourly,minutely")])
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| FeedError::Network(e.into_network_error()))?;

        let body = Self::check_response(response)?
            .bytes()
            .await
            .map_err(|e| FeedError::Network(e.into_network_error()))?;
        let current = CurrentConditions::from_json(&body)?;
        tracing::debug!("Current conditions: {:?}", current.icon);
        Ok(Some(current))
    }

    async fn fetch_intervals(
        &self,
        url: &Url,
        latitude: f64,
        longitude: f64,
    ) -> Result<Vec<RawInterval>, FeedError> {
        let response = self
            .client
            .get(url.clone())
            .query(&[("lat", latitude), ("lon", longitude)])
            .send()
            .await
            .map_err(|e| FeedError::Network(e.into_network_error()))?;

        let body = Self::check_response(response)?
            .bytes()
            .await
            .map_err(|e| FeedError::Network(e.into_network_error()))?;
        let intervals = parser::parse(&body[..])?;
        tracing::info!("Fetched {} intervals from {}", intervals.len(), url);
        Ok(intervals)
    }

    /// Check the status; 203 is how the feed marks a deprecated-but-served product.
    fn check_response(response: reqwest::Response) -> Result<reqwest::Response, FeedError> {
        let status = response.status();
        if status == StatusCode::NON_AUTHORITATIVE_INFORMATION {
            tracing::warn!("Feed product is deprecated (203)");
        } else if status != StatusCode::OK {
            tracing::warn!("Feed returned status {}", status);
            return Err(FeedError::Status(status.as_u16()));
        }
        Ok(response)
    }
}
