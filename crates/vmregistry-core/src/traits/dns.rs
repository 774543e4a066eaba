// # DNS Backend Trait
//
// Defines the record operations used to publish VM names.
//
// ## Implementations
//
// - PowerDNS: `vmregistry-dns-powerdns` crate
// - In-memory: `vmregistry_core::backends::MemoryDns`
//
// ## Usage
//
// ```rust,ignore
// use vmregistry_core::{DnsBackend, RecordType};
//
// let dns = /* DnsBackend implementation */;
// dns.upsert_record("vm1.example.com.", RecordType::A, 300, &["10.0.0.5".into()]).await?;
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// DNS record type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// IPv4 address record
    A,
    /// IPv6 address record
    #[serde(rename = "AAAA")]
    Aaaa,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for DNS backends
///
/// Both operations address a whole record set (`fqdn`, `record_type`).
/// Implementations issue one API call per invocation and never retry.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait DnsBackend: Send + Sync {
    /// Create or replace a record set
    ///
    /// # Parameters
    ///
    /// - `fqdn`: Fully qualified name with trailing dot (e.g., "vm1.example.com.")
    /// - `record_type`: Record type
    /// - `ttl`: Time-to-live in seconds
    /// - `values`: Record contents
    async fn upsert_record(
        &self,
        fqdn: &str,
        record_type: RecordType,
        ttl: u32,
        values: &[String],
    ) -> Result<(), crate::Error>;

    /// Delete a record set
    async fn delete_record(
        &self,
        fqdn: &str,
        record_type: RecordType,
        ttl: u32,
        values: &[String],
    ) -> Result<(), crate::Error>;

    /// Backend name (for logging)
    fn backend_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS backends from configuration
pub trait DnsBackendFactory: Send + Sync {
    /// Create a DnsBackend instance from configuration
    fn create(&self, config: &crate::config::DnsConfig) -> Result<Box<dyn DnsBackend>, crate::Error>;
}

/// Normalize a zone name to its fully qualified form
pub fn qualify_zone(zone: &str) -> String {
    if zone.ends_with('.') {
        zone.to_string()
    } else {
        format!("{}.", zone)
    }
}

/// Fully qualified record name for a VM in `zone`
pub fn record_fqdn(name: &str, zone: &str) -> String {
    format!("{}.{}", name, qualify_zone(zone))
}
