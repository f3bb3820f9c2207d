// # HTTP Geolocation Lookup
//
// Resolves detected addresses through the ipv4.ink style HTTP API.
//
// ## Implementation Status
//
// - ✅ One HTTP request per lookup
// - ✅ Request timeout taken from `LookupConfig`
// - ✅ Typed failures: timeout, connection, status code, malformed body
// - ✅ Both IPv4 and IPv6 endpoints
// - ✅ Field name variants used by the two endpoints (`country` / `country_name`, ...)
// - ✅ Health probe against the API root
// - ❌ NO retry logic (a failed lookup is reported once, by ClipboardMonitor)
// - ❌ NO caching (every detection is a fresh lookup)
// - ❌ NO background tasks
//
// ## API Reference
//
// - IPv4: GET `{base}/ipv4?ip=<addr>`
// - IPv6: GET `{base}/ipv6?ip=<addr>`
// - Health: GET `{base}/`
//
// Response body:
//
// ```json
// {
//   "data": {"country_name": "Japan", "province_name": "Tokyo", "city_name": "Tokyo",
//            "isp": "Example", "latitude": 35.6, "longitude": 139.7},
//   "query_time_ms": 12,
//   "msg": "ok"
// }
// ```

use async_trait::async_trait;
use clipgeo_core::config::LookupConfig;
use clipgeo_core::error::LookupFailureKind;
use clipgeo_core::registry::ComponentRegistry;
use clipgeo_core::traits::{AddressFamily, GeoInfo, GeoLookup, GeoLookupFactory, LookupRequest};
use clipgeo_core::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};

/// Name this lookup registers under
pub const LOOKUP_NAME: &str = "http";

/// Timeout for the health probe
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest slice of a non-JSON error body kept in the error message
const MAX_ERROR_BODY_CHARS: usize = 200;

const COUNTRY_KEYS: &[&str] = &["country", "country_name"];
const REGION_KEYS: &[&str] = &["province", "province_name", "region", "region_name"];
const CITY_KEYS: &[&str] = &["city", "city_name"];
const ISP_KEYS: &[&str] = &["isp", "isp_name"];

/// Top-level response envelope
///
/// `data` is kept as a raw value because the IPv4 and IPv6 endpoints name
/// their fields differently.
#[derive(Debug, Deserialize)]
struct LookupEnvelope {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    query_time_ms: Option<Value>,
    #[serde(default)]
    msg: Option<String>,
}

/// HTTP geolocation lookup
///
/// # Trust Level: Untrusted
///
/// Stateless and single-shot. Scheduling, staleness and persistence are
/// owned by `ClipboardMonitor`.
pub struct HttpGeoLookup {
    /// API base URL without trailing slash
    base_url: String,

    /// HTTP client for API requests
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpGeoLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGeoLookup")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl HttpGeoLookup {
    /// Create a lookup for the configured API
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the config is invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: &LookupConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("clipgeo/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Endpoint for an address family
    fn endpoint(&self, family: AddressFamily) -> String {
        match family {
            AddressFamily::V4 => format!("{}/ipv4", self.base_url),
            AddressFamily::V6 => format!("{}/ipv6", self.base_url),
        }
    }
}

#[async_trait]
impl GeoLookup for HttpGeoLookup {
    async fn lookup(&self, request: &LookupRequest) -> Result<GeoInfo> {
        let url = self.endpoint(request.family);
        tracing::debug!("Looking up {} via {}", request.address, url);

        let started = Instant::now();
        let response = self
            .client
            .get(&url)
            .query(&[("ip", request.address.as_str())])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_error)?;

        parse_response(status, &body, started.elapsed())
    }

    async fn check_health(&self) -> Result<bool> {
        let url = format!("{}/", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await
            .map_err(transport_error)?;

        let healthy = response.status().is_success();
        if !healthy {
            tracing::debug!("Health probe returned {}", response.status());
        }
        Ok(healthy)
    }

    fn lookup_name(&self) -> &'static str {
        LOOKUP_NAME
    }
}

/// Map a reqwest failure to a lookup error
fn transport_error(e: reqwest::Error) -> Error {
    let kind = if e.is_timeout() {
        LookupFailureKind::Timeout
    } else if e.is_decode() {
        LookupFailureKind::MalformedBody
    } else {
        LookupFailureKind::Connection
    };
    Error::lookup(kind, format!("HTTP request failed: {}", e))
}

/// Turn a raw HTTP response into location data
///
/// `elapsed` is used as the latency when the body has no `query_time_ms`.
pub fn parse_response(status: u16, body: &str, elapsed: Duration) -> Result<GeoInfo> {
    let envelope: std::result::Result<LookupEnvelope, _> = serde_json::from_str(body);

    if !(200..300).contains(&status) {
        let detail = match &envelope {
            Ok(LookupEnvelope { msg: Some(msg), .. }) if !msg.is_empty() => msg.clone(),
            _ => body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        };
        return Err(Error::lookup(
            LookupFailureKind::Status(status),
            format!("API returned {}: {}", status, detail),
        ));
    }

    let envelope = envelope.map_err(|e| {
        Error::lookup(
            LookupFailureKind::MalformedBody,
            format!("Failed to parse response: {}", e),
        )
    })?;

    let data = match envelope.data {
        Some(data @ Value::Object(_)) => data,
        _ => {
            let message = match envelope.msg {
                Some(msg) if !msg.is_empty() => format!("Response has no data object: {}", msg),
                _ => "Response has no data object".to_string(),
            };
            return Err(Error::lookup(LookupFailureKind::MalformedBody, message));
        }
    };

    let latency_ms = envelope
        .query_time_ms
        .as_ref()
        .and_then(number_value)
        .filter(|ms| ms.is_finite() && *ms >= 0.0)
        .map(|ms| ms.round() as u64)
        .or_else(|| u64::try_from(elapsed.as_millis()).ok());

    Ok(GeoInfo {
        country: text_field(&data, COUNTRY_KEYS),
        region: text_field(&data, REGION_KEYS),
        city: text_field(&data, CITY_KEYS),
        isp: text_field(&data, ISP_KEYS),
        latitude: data.get("latitude").and_then(number_value),
        longitude: data.get("longitude").and_then(number_value),
        latency_ms,
    })
}

/// First non-empty string among the candidate keys
fn text_field(data: &Value, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| data.get(*key))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Numbers may arrive as JSON numbers or numeric strings
fn number_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Factory for creating HTTP lookups
pub struct HttpGeoLookupFactory;

impl GeoLookupFactory for HttpGeoLookupFactory {
    fn create(&self, config: &LookupConfig) -> Result<Box<dyn GeoLookup>> {
        Ok(Box::new(HttpGeoLookup::new(config)?))
    }
}

/// Register the HTTP lookup with a registry
///
/// # Example
///
/// ```rust
/// use clipgeo_core::ComponentRegistry;
///
/// let registry = ComponentRegistry::new();
/// clipgeo_geo_http::register(&registry);
/// assert!(registry.list_geo_lookups().contains(&"http".to_string()));
/// ```
pub fn register(registry: &ComponentRegistry) {
    registry.register_geo_lookup(LOOKUP_NAME, Box::new(HttpGeoLookupFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    const ELAPSED: Duration = Duration::from_millis(42);

    fn kind_of(result: Result<GeoInfo>) -> Option<LookupFailureKind> {
        result.err().and_then(|e| e.lookup_kind())
    }

    /// Serve one canned response and report the request line
    async fn serve_once(status: &'static str, body: &'static str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let request = String::from_utf8_lossy(&request);
            let _ = tx.send(request.lines().next().unwrap_or_default().to_string());

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        (format!("http://{}", addr), rx)
    }

    fn lookup_for(base_url: String) -> HttpGeoLookup {
        HttpGeoLookup::new(&LookupConfig {
            base_url,
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_parse_ipv4_field_names() {
        let body = r#"{"data":{"country_name":"Japan","province_name":"Tokyo","city_name":"Shinjuku","isp":"Example Net","latitude":35.69,"longitude":"139.70"},"query_time_ms":12,"msg":"ok"}"#;
        let info = parse_response(200, body, ELAPSED).unwrap();

        assert_eq!(info.country, "Japan");
        assert_eq!(info.region, "Tokyo");
        assert_eq!(info.city, "Shinjuku");
        assert_eq!(info.isp, "Example Net");
        assert_eq!(info.latitude, Some(35.69));
        assert_eq!(info.longitude, Some(139.70));
        assert_eq!(info.latency_ms, Some(12));
    }

    #[test]
    fn test_parse_ipv6_field_names() {
        let body = r#"{"data":{"country":"Germany","province":"Hesse","city":"Frankfurt","isp":""}}"#;
        let info = parse_response(200, body, ELAPSED).unwrap();

        assert_eq!(info.location_line(), "Germany Hesse Frankfurt");
        assert_eq!(info.isp, "");
        assert_eq!(info.latitude, None);
        assert_eq!(info.latency_ms, Some(42), "falls back to measured time");
    }

    #[test]
    fn test_missing_data_is_malformed() {
        assert_eq!(
            kind_of(parse_response(200, r#"{"msg":"quota exceeded"}"#, ELAPSED)),
            Some(LookupFailureKind::MalformedBody)
        );
        assert_eq!(
            kind_of(parse_response(200, r#"{"data":null}"#, ELAPSED)),
            Some(LookupFailureKind::MalformedBody)
        );
        assert_eq!(
            kind_of(parse_response(200, "<html>", ELAPSED)),
            Some(LookupFailureKind::MalformedBody)
        );
    }

    #[test]
    fn test_status_error_carries_msg() {
        let err = parse_response(429, r#"{"msg":"rate limited"}"#, ELAPSED).unwrap_err();
        assert_eq!(err.lookup_kind(), Some(LookupFailureKind::Status(429)));
        assert!(err.to_string().contains("rate limited"));

        let err = parse_response(502, "Bad Gateway", ELAPSED).unwrap_err();
        assert_eq!(err.lookup_kind(), Some(LookupFailureKind::Status(502)));
        assert!(err.to_string().contains("Bad Gateway"));
    }

    #[test]
    fn test_factory_rejects_invalid_config() {
        let config = LookupConfig {
            base_url: "ftp://example.com".to_string(),
            timeout_secs: 10,
        };
        assert!(matches!(HttpGeoLookupFactory.create(&config), Err(Error::Config(_))));
        assert!(HttpGeoLookupFactory.create(&LookupConfig::default()).is_ok());
    }

    #[test]
    fn test_register() {
        let registry = ComponentRegistry::new();
        register(&registry);
        assert_eq!(registry.list_geo_lookups(), vec![LOOKUP_NAME.to_string()]);

        let lookup = registry
            .create_geo_lookup(LOOKUP_NAME, &LookupConfig::default())
            .unwrap();
        assert_eq!(lookup.lookup_name(), "http");
    }

    #[test]
    fn test_debug_and_endpoints() {
        let lookup = lookup_for("https://geo.example.com/".to_string());
        assert_eq!(lookup.endpoint(AddressFamily::V4), "https://geo.example.com/ipv4");
        assert_eq!(lookup.endpoint(AddressFamily::V6), "https://geo.example.com/ipv6");
        assert!(format!("{:?}", lookup).contains("geo.example.com"));
    }

    #[tokio::test]
    async fn test_lookup_against_local_server() {
        let (base, request_line) = serve_once(
            "200 OK",
            r#"{"data":{"country_name":"Testland","province_name":"North","city_name":"Port","isp":"ISP"},"query_time_ms":3}"#,
        )
        .await;

        let info = lookup_for(base)
            .lookup(&LookupRequest::new("203.0.113.5", AddressFamily::V4))
            .await
            .unwrap();

        assert_eq!(info.country, "Testland");
        assert_eq!(info.latency_ms, Some(3));
        assert_eq!(request_line.await.unwrap(), "GET /ipv4?ip=203.0.113.5 HTTP/1.1");
    }

    #[tokio::test]
    async fn test_lookup_status_from_local_server() {
        let (base, request_line) =
            serve_once("404 Not Found", r#"{"msg":"address not found"}"#).await;

        let result = lookup_for(base)
            .lookup(&LookupRequest::new("2001:db8::1", AddressFamily::V6))
            .await;

        assert_eq!(kind_of(result), Some(LookupFailureKind::Status(404)));
        assert!(request_line.await.unwrap().starts_with("GET /ipv6?ip="));
    }

    #[tokio::test]
    async fn test_connection_refused_is_connection_failure() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let lookup = lookup_for(format!("http://{}", addr));
        let result = lookup
            .lookup(&LookupRequest::new("198.51.100.7", AddressFamily::V4))
            .await;
        assert_eq!(kind_of(result), Some(LookupFailureKind::Connection));
    }

    #[tokio::test]
    async fn test_stalled_server_is_timeout_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Accept, then never answer within the client's timeout
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let lookup = HttpGeoLookup::new(&LookupConfig {
            base_url: format!("http://{}", addr),
            timeout_secs: 1,
        })
        .unwrap();

        let started = std::time::Instant::now();
        let result = lookup
            .lookup(&LookupRequest::new("192.0.2.10", AddressFamily::V4))
            .await;

        assert_eq!(kind_of(result), Some(LookupFailureKind::Timeout));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_health_check() {
        let (base, request_line) = serve_once("200 OK", "{}").await;
        assert!(lookup_for(base).check_health().await.unwrap());
        assert!(request_line.await.unwrap().starts_with("GET / "));

        let (base, _) = serve_once("503 Service Unavailable", "{}").await;
        assert!(!lookup_for(base).check_health().await.unwrap());
    }
}
