use anyhow::Result;
use async_trait::async_trait;

use crate::models::Coordinate;

/// Address and display name resolved for a coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Placemark {
    pub address: Option<String>,
    pub location_name: Option<String>,
}

/// Reverse geocoding used to fill an event's derived address fields.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolves a coordinate. `Ok(None)` means nothing is known about the place.
    async fn reverse_geocode(&self, coordinate: Coordinate) -> Result<Option<Placemark>>;
}

/// Geocoder that never resolves anything; derived fields stay as they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopGeocoder;

#[async_trait]
impl Geocoder for NoopGeocoder {
    async fn reverse_geocode(&self, _coordinate: Coordinate) -> Result<Option<Placemark>> {
        Ok(None)
    }
}
