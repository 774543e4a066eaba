// # PowerDNS Backend
//
// This crate provides a PowerDNS authoritative-server backend for vmregistry.
//
// ## Behavior
//
// - One HTTP request per trait call; no retries, no caching
// - HTTP timeout configured (30 seconds)
// - Specific error mapping for HTTP status codes (401/403, 404, 422, 5xx)
// - Record sets are replaced wholesale (`changetype: REPLACE`) or deleted
//
// ## Security Requirements
//
// - API key NEVER appears in logs or `Debug` output
// - Backend MUST fail fast if the key is empty
//
// ## API Reference
//
// - PowerDNS HTTP API: https://doc.powerdns.com/authoritative/http-api/
// - Patch RRsets: PATCH `/api/v1/servers/:server_id/zones/:zone_id`
//
// ```http
// PATCH /api/v1/servers/localhost/zones/vms.example.com.
// X-API-Key: <key>
//
// {"rrsets":[{"name":"vm1.vms.example.com.","type":"A","ttl":300,
//   "changetype":"REPLACE","records":[{"content":"10.0.0.5","disabled":false}]}]}
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use vmregistry_core::config::DnsConfig;
use vmregistry_core::traits::dns::qualify_zone;
use vmregistry_core::traits::{DnsBackend, DnsBackendFactory, RecordType};
use vmregistry_core::{Error, Result};

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const BACKEND: &str = "powerdns";

/// PowerDNS DNS backend
///
/// # Security
///
/// The Debug implementation intentionally does NOT expose the API key.
pub struct PowerDnsBackend {
    /// API base URL without trailing slash
    api_url: String,

    /// Server id in the API path
    server: String,

    /// Fully qualified zone (trailing dot)
    zone: String,

    /// PowerDNS API key
    /// ⚠️ NEVER log this value
    api_key: String,

    /// HTTP client for API requests
    client: reqwest::Client,
}

// Custom Debug implementation that hides the API key
impl std::fmt::Debug for PowerDnsBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PowerDnsBackend")
            .field("api_url", &self.api_url)
            .field("server", &self.server)
            .field("zone", &self.zone)
            .field("api_key", &"<REDACTED>")
            .finish()
    }
}

impl PowerDnsBackend {
    /// Create a new PowerDNS backend
    ///
    /// # Parameters
    ///
    /// - `api_url`: API base URL (e.g., "http://127.0.0.1:8081")
    /// - `server`: Server id, usually "localhost"
    /// - `zone`: Zone hosting VM records (trailing dot optional)
    /// - `api_key`: API key
    ///
    /// # Errors
    ///
    /// `Config` if the key is empty or the HTTP client cannot be built.
    pub fn new(
        api_url: impl Into<String>,
        server: impl Into<String>,
        zone: &str,
        api_key: impl Into<String>,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(Error::config("PowerDNS API key cannot be empty"));
        }

        let mut server = server.into();
        if server.is_empty() {
            server = "localhost".to_string();
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            server,
            zone: qualify_zone(zone),
            api_key,
            client,
        })
    }

    /// Zone endpoint all record changes are patched onto
    fn zone_url(&self) -> String {
        format!(
            "{}/api/v1/servers/{}/zones/{}",
            self.api_url, self.server, self.zone
        )
    }

    async fn patch(&self, body: &RRsets<'_>) -> Result<()> {
        let response = self
            .client
            .patch(self.zone_url())
            .header("X-API-Key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::unavailable(BACKEND, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        Err(status_error(status.as_u16(), &status.to_string(), &text, &self.zone))
    }
}

/// Map a failed API response to an error
///
/// The server's `{"error": "..."}` message is appended to the status line
/// when present.
fn status_error(code: u16, status: &str, body: &str, zone: &str) -> Error {
    let message = serde_json::from_str::<ApiError>(body)
        .map(|e| e.error)
        .unwrap_or_else(|_| body.trim().to_string());
    let detail = if message.is_empty() {
        status.to_string()
    } else {
        format!("{} {}", status, message)
    };

    match code {
        401 | 403 => Error::auth(format!(
            "Invalid PowerDNS API key or insufficient permissions: {}",
            detail
        )),
        404 => Error::backend(BACKEND, format!("Zone {} not found: {}", zone, detail)),
        422 => Error::backend(BACKEND, format!("Record set rejected: {}", detail)),
        500..=599 => Error::unavailable(BACKEND, format!("PowerDNS server error: {}", detail)),
        _ => Error::backend(BACKEND, detail),
    }
}

#[derive(Debug, Serialize)]
struct RRsets<'a> {
    rrsets: Vec<RRset<'a>>,
}

#[derive(Debug, Serialize)]
struct RRset<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    record_type: RecordType,
    ttl: u32,
    changetype: ChangeType,
    records: Vec<Record<'a>>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "UPPERCASE")]
enum ChangeType {
    Replace,
    Delete,
}

#[derive(Debug, Serialize)]
struct Record<'a> {
    content: &'a str,
    disabled: bool,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: String,
}

fn rrsets<'a>(
    fqdn: &'a str,
    record_type: RecordType,
    ttl: u32,
    values: &'a [String],
    changetype: ChangeType,
) -> RRsets<'a> {
    RRsets {
        rrsets: vec![RRset {
            name: fqdn,
            record_type,
            ttl,
            changetype,
            records: values
                .iter()
                .map(|content| Record {
                    content,
                    disabled: false,
                })
                .collect(),
        }],
    }
}

#[async_trait]
impl DnsBackend for PowerDnsBackend {
    async fn upsert_record(
        &self,
        fqdn: &str,
        record_type: RecordType,
        ttl: u32,
        values: &[String],
    ) -> Result<()> {
        tracing::debug!(fqdn, record_type = %record_type, ttl, ?values, "Replacing record set");
        self.patch(&rrsets(fqdn, record_type, ttl, values, ChangeType::Replace))
            .await?;
        tracing::info!(fqdn, record_type = %record_type, "Record set replaced");
        Ok(())
    }

    async fn delete_record(
        &self,
        fqdn: &str,
        record_type: RecordType,
        ttl: u32,
        values: &[String],
    ) -> Result<()> {
        tracing::debug!(fqdn, record_type = %record_type, "Deleting record set");
        self.patch(&rrsets(fqdn, record_type, ttl, values, ChangeType::Delete))
            .await?;
        tracing::info!(fqdn, record_type = %record_type, "Record set deleted");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}

/// Factory for creating PowerDNS backends
pub struct PowerDnsFactory;

impl DnsBackendFactory for PowerDnsFactory {
    fn create(&self, config: &DnsConfig) -> Result<Box<dyn DnsBackend>> {
        match config {
            DnsConfig::PowerDns {
                api_url,
                server,
                zone,
                api_key,
            } => {
                if api_key.is_empty() {
                    return Err(Error::config("PowerDNS API key is required"));
                }
                Ok(Box::new(PowerDnsBackend::new(
                    api_url.clone(),
                    server.clone(),
                    zone,
                    api_key.clone(),
                )?))
            }
            _ => Err(Error::config("Invalid config for PowerDNS backend")),
        }
    }
}

/// Register the PowerDNS backend with a registry
///
/// # Example
///
/// ```rust
/// use vmregistry_core::BackendRegistry;
///
/// let registry = BackendRegistry::new();
/// vmregistry_dns_powerdns::register(&registry);
/// assert!(registry.has_dns("powerdns"));
/// ```
pub fn register(registry: &vmregistry_core::BackendRegistry) {
    registry.register_dns(BACKEND, Box::new(PowerDnsFactory));
}
