// # Geo Lookup Trait
//
// Defines the interface for resolving an address to location data.
//
// ## Implementations
//
// - HTTP API: `clipgeo-geo-http` crate
//
// ## Usage
//
// ```rust,ignore
// use clipgeo_core::traits::{AddressFamily, GeoLookup, LookupRequest};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let lookup = /* GeoLookup implementation */;
//
//     let info = lookup
//         .lookup(&LookupRequest::new("203.0.113.5", AddressFamily::V4))
//         .await?;
//     println!("{} / {} / {}", info.country, info.region, info.city);
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Address family of a detected literal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressFamily {
    #[serde(rename = "IPv4")]
    V4,
    #[serde(rename = "IPv6")]
    V6,
}

impl AddressFamily {
    /// Display label, also used as the stored value
    pub fn label(&self) -> &'static str {
        match self {
            AddressFamily::V4 => "IPv4",
            AddressFamily::V6 => "IPv6",
        }
    }
}

impl std::fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A single lookup request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRequest {
    /// Address text as it was detected
    pub address: String,
    /// Address family
    pub family: AddressFamily,
}

impl LookupRequest {
    /// Create a new lookup request
    pub fn new(address: impl Into<String>, family: AddressFamily) -> Self {
        Self {
            address: address.into(),
            family,
        }
    }
}

/// Location data returned by a lookup
///
/// Text fields are empty strings when the API has nothing for them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoInfo {
    pub country: String,
    pub region: String,
    pub city: String,
    pub isp: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Query time reported by the API, or measured round trip
    pub latency_ms: Option<u64>,
}

impl GeoInfo {
    /// One-line location summary, e.g. "Japan Tokyo Tokyo"
    pub fn location_line(&self) -> String {
        [&self.country, &self.region, &self.city]
            .iter()
            .filter(|part| !part.is_empty())
            .map(|part| part.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Trait for geolocation lookup implementations
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS calls to the configured API only
/// - ✅ Parse API-specific responses
/// - ✅ Return success or a typed failure
///
/// ## Forbidden Capabilities
/// - ❌ Retry or back off (a failed lookup is reported, never retried)
/// - ❌ Write history or raise notifications (owned by `ClipboardMonitor`)
/// - ❌ Spawn tasks
///
/// Every failure is returned as [`crate::Error::Lookup`] with a
/// [`crate::error::LookupFailureKind`]; timeouts are ordinary failures.
#[async_trait]
pub trait GeoLookup: Send + Sync {
    /// Resolve one address
    ///
    /// # Returns
    ///
    /// - `Ok(GeoInfo)`: Location data for the address
    /// - `Err(Error::Lookup)`: Timeout, connection failure, bad status or bad body
    async fn lookup(&self, request: &LookupRequest) -> Result<GeoInfo, crate::Error>;

    /// Check whether the API is reachable
    ///
    /// Implementations without a meaningful probe may return `Ok(true)`.
    async fn check_health(&self) -> Result<bool, crate::Error> {
        Ok(true)
    }

    /// Get the lookup name (for logging/debugging)
    fn lookup_name(&self) -> &'static str;
}

/// Helper trait for constructing geo lookups from configuration
pub trait GeoLookupFactory: Send + Sync {
    /// Create a GeoLookup instance from configuration
    fn create(
        &self,
        config: &crate::config::LookupConfig,
    ) -> Result<Box<dyn GeoLookup>, crate::Error>;
}
