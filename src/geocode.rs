//! Reverse-geocoding contract.
//!
//! The engine never resolves addresses itself. A host plugs in a [`Geocoder`]; lookups run
//! detached and hand back an optional address, so a slow or failing service only ever shows up
//! as "no address" on the display.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::Coordinate;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeocodeError {
    #[error("no address found for coordinate")]
    NotFound,
    #[error("geocoding request timed out")]
    Timeout,
    #[error("geocoding service error: {0}")]
    Service(String),
}

pub type GeocodeFuture = Pin<Box<dyn Future<Output = Result<String, GeocodeError>> + Send + 'static>>;

/// Address lookup supplied by the host platform.
pub trait Geocoder: Send + Sync {
    fn reverse_geocode(&self, coordinate: Coordinate) -> GeocodeFuture;
}

/// Address components as a place-mark service reports them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AddressParts {
    pub country: Option<String>,
    pub administrative_area: Option<String>,
    pub locality: Option<String>,
    pub sub_locality: Option<String>,
    pub sub_thoroughfare: Option<String>,
}

impl AddressParts {
    /// One component per line, broadest first. Missing components leave an empty line so the
    /// detail view keeps a fixed layout.
    pub fn to_multiline(&self) -> String {
        [
            &self.country,
            &self.administrative_area,
            &self.locality,
            &self.sub_locality,
            &self.sub_thoroughfare,
        ]
        .iter()
        .map(|part| part.as_deref().unwrap_or(""))
        .collect::<Vec<_>>()
        .join("\n")
    }
}

#[cfg(feature = "runtime")]
pub use detached::{lookup_address, DEFAULT_GEOCODE_TIMEOUT};

#[cfg(feature = "runtime")]
mod detached {
    use super::*;
    use log::{debug, warn};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::oneshot;

    pub const DEFAULT_GEOCODE_TIMEOUT: Duration = Duration::from_secs(10);

    /// Start a lookup on the current tokio runtime and return at once.
    ///
    /// The receiver yields `Some(address)` on success and `None` on any failure, including a
    /// timeout. No retries are made.
    pub fn lookup_address(
        geocoder: Arc<dyn Geocoder>,
        coordinate: Coordinate,
        timeout: Duration,
    ) -> oneshot::Receiver<Option<String>> {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, geocoder.reverse_geocode(coordinate)).await {
                Ok(result) => result,
                Err(_) => Err(GeocodeError::Timeout),
            };
            let address = match result {
                Ok(address) => {
                    debug!("[Geocode] ({:.5}, {:.5}) -> {:?}", coordinate.latitude, coordinate.longitude, address);
                    Some(address)
                }
                Err(e) => {
                    warn!("[Geocode] ({:.5}, {:.5}) failed: {}", coordinate.latitude, coordinate.longitude, e);
                    None
                }
            };
            // The display may have gone away; nothing to do then.
            let _ = tx.send(address);
        });
        rx
    }
}
