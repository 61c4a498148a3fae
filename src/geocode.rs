//! Reverse geocoding of specimen coordinates

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::fetch::{Fetch, CLIENT_INFO};
use crate::specimen::{Coordinates, Location};

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    address: Option<Address>,
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Address {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    hamlet: Option<String>,
    county: Option<String>,
    state: Option<String>,
    region: Option<String>,
    country: Option<String>,
}

impl Address {
    fn into_location(self, coordinates: Coordinates) -> Location {
        Location {
            country: self.country.unwrap_or_default(),
            state: self.state.or(self.region).or(self.county).unwrap_or_default(),
            city: self
                .city
                .or(self.town)
                .or(self.village)
                .or(self.hamlet)
                .unwrap_or_default(),
            coordinates: Some(coordinates),
        }
    }
}

/// Client for a Nominatim-compatible `/reverse` endpoint
#[derive(Debug, Clone)]
pub struct Geocoder {
    base_url: String,
    client: Client,
    request_timeout: Option<Duration>,
}

impl Geocoder {
    pub fn new(base_url: &str, client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            request_timeout: None,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Fill in country, state and city for a map pin. The returned location
    /// keeps the input coordinates.
    pub async fn reverse(&self, coordinates: Coordinates) -> Result<Location> {
        if !coordinates.is_valid() {
            return Err(Error::geocode(format!(
                "Coordinates out of range: {}, {}",
                coordinates.lat, coordinates.lng
            )));
        }

        let url = format!("{}/reverse", self.base_url);
        let response: ReverseResponse = Fetch::get(&self.client, &url)
            .header("User-Agent", CLIENT_INFO)
            .query_param("format", "json")
            .query_param("lat", &coordinates.lat.to_string())
            .query_param("lon", &coordinates.lng.to_string())
            .timeout(self.request_timeout)
            .execute()
            .await
            .map_err(|e| {
                log::warn!("Reverse geocoding failed: {}", e);
                Error::geocode(format!("Could not look up location: {}", e))
            })?;

        if let Some(reason) = response.error {
            return Err(Error::geocode(reason));
        }
        let address = response
            .address
            .ok_or_else(|| Error::geocode("No address found for these coordinates"))?;
        Ok(address.into_location(coordinates))
    }
}
