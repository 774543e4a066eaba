// # Memory Backends
//
// In-memory implementations of the three backend traits.
//
// ## Purpose
//
// Dry runs of the daemon and tests. Nothing is booted, written to disk, or
// published: all state lives in maps behind a `tokio::sync::RwLock` and is
// lost on restart.
//
// Clones share state, so a test can keep one handle for inspection and pass
// another to the orchestrator.
//
// ## Behavior
//
// The backends reject the same misuse a real host would (defining a domain
// without a name, starting a running domain, cloning onto a missing volume)
// so sequencing bugs surface in tests.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::codec;
use crate::config::{ComputeConfig, DnsConfig, StorageConfig};
use crate::traits::dns::qualify_zone;
use crate::traits::storage::volume_group_path;
use crate::traits::{
    ComputeBackend, ComputeBackendFactory, DnsBackend, DnsBackendFactory, DomainHandle,
    RecordType, StorageBackend, StorageBackendFactory,
};
use crate::Error;

const BACKEND: &str = "memory";

/// A domain held by [`MemoryCompute`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryDomain {
    pub name: String,
    pub xml: String,
    pub running: bool,
}

/// In-memory hypervisor
///
/// Handles are domain names. Enumeration order is definition order.
#[derive(Debug, Clone, Default)]
pub struct MemoryCompute {
    domains: Arc<RwLock<Vec<MemoryDomain>>>,
}

impl MemoryCompute {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a domain directly, bypassing XML name extraction
    pub async fn insert(&self, name: impl Into<String>, xml: impl Into<String>, running: bool) {
        let name = name.into();
        let mut domains = self.domains.write().await;
        domains.retain(|d| d.name != name);
        domains.push(MemoryDomain {
            name,
            xml: xml.into(),
            running,
        });
    }

    /// Snapshot a domain by name
    pub async fn domain(&self, name: &str) -> Option<MemoryDomain> {
        self.domains.read().await.iter().find(|d| d.name == name).cloned()
    }

    /// Number of defined domains
    pub async fn len(&self) -> usize {
        self.domains.read().await.len()
    }

    /// Check if no domain is defined
    pub async fn is_empty(&self) -> bool {
        self.domains.read().await.is_empty()
    }

    fn missing(handle: &DomainHandle) -> Error {
        Error::backend(BACKEND, format!("domain {} not found", handle))
    }
}

#[async_trait]
impl ComputeBackend for MemoryCompute {
    async fn list_domains(&self) -> Result<Vec<DomainHandle>, Error> {
        let domains = self.domains.read().await;
        Ok(domains.iter().map(|d| DomainHandle::new(d.name.clone())).collect())
    }

    async fn domain_name(&self, domain: &DomainHandle) -> Result<String, Error> {
        let domains = self.domains.read().await;
        domains
            .iter()
            .find(|d| d.name == domain.as_str())
            .map(|d| d.name.clone())
            .ok_or_else(|| Self::missing(domain))
    }

    async fn domain_xml(&self, domain: &DomainHandle) -> Result<String, Error> {
        let domains = self.domains.read().await;
        domains
            .iter()
            .find(|d| d.name == domain.as_str())
            .map(|d| d.xml.clone())
            .ok_or_else(|| Self::missing(domain))
    }

    async fn lookup_domain(&self, name: &str) -> Result<Option<DomainHandle>, Error> {
        let domains = self.domains.read().await;
        Ok(domains
            .iter()
            .find(|d| d.name == name)
            .map(|d| DomainHandle::new(d.name.clone())))
    }

    async fn define_domain(&self, xml: &str) -> Result<DomainHandle, Error> {
        let info = codec::parse(xml)?;
        if info.name.is_empty() {
            return Err(Error::backend(BACKEND, "domain description has no <name>"));
        }

        let mut domains = self.domains.write().await;
        match domains.iter_mut().find(|d| d.name == info.name) {
            // Redefinition replaces the stored description
            Some(existing) => existing.xml = xml.to_string(),
            None => domains.push(MemoryDomain {
                name: info.name.clone(),
                xml: xml.to_string(),
                running: false,
            }),
        }

        Ok(DomainHandle::new(info.name))
    }

    async fn start_domain(&self, domain: &DomainHandle) -> Result<(), Error> {
        let mut domains = self.domains.write().await;
        let entry = domains
            .iter_mut()
            .find(|d| d.name == domain.as_str())
            .ok_or_else(|| Self::missing(domain))?;
        if entry.running {
            return Err(Error::backend(BACKEND, format!("domain {} is already running", domain)));
        }
        entry.running = true;
        Ok(())
    }

    async fn stop_domain(&self, domain: &DomainHandle) -> Result<(), Error> {
        let mut domains = self.domains.write().await;
        let entry = domains
            .iter_mut()
            .find(|d| d.name == domain.as_str())
            .ok_or_else(|| Self::missing(domain))?;
        if !entry.running {
            return Err(Error::backend(BACKEND, format!("domain {} is not running", domain)));
        }
        entry.running = false;
        Ok(())
    }

    async fn undefine_domain(&self, domain: &DomainHandle) -> Result<(), Error> {
        let mut domains = self.domains.write().await;
        let before = domains.len();
        domains.retain(|d| d.name != domain.as_str());
        if domains.len() == before {
            return Err(Self::missing(domain));
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}

/// Factory for [`MemoryCompute`]
pub struct MemoryComputeFactory;

impl ComputeBackendFactory for MemoryComputeFactory {
    fn create(&self, config: &ComputeConfig) -> Result<Box<dyn ComputeBackend>, Error> {
        match config {
            ComputeConfig::Memory => Ok(Box::new(MemoryCompute::new())),
            _ => Err(Error::config("Invalid config type for MemoryCompute")),
        }
    }
}

/// A volume held by [`MemoryStorage`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryVolume {
    /// Size in bytes
    pub size: u64,
    /// Volume whose contents were last copied onto this one
    pub cloned_from: Option<String>,
}

/// In-memory volume group
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    volume_group: String,
    volumes: Arc<RwLock<BTreeMap<String, MemoryVolume>>>,
}

impl MemoryStorage {
    pub fn new(volume_group: impl Into<String>) -> Self {
        Self {
            volume_group: volume_group.into(),
            volumes: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Seed a volume, typically a source image
    pub async fn insert(&self, name: impl Into<String>, size: u64) {
        self.volumes.write().await.insert(
            name.into(),
            MemoryVolume {
                size,
                cloned_from: None,
            },
        );
    }

    /// Snapshot a volume by name
    pub async fn volume(&self, name: &str) -> Option<MemoryVolume> {
        self.volumes.read().await.get(name).cloned()
    }

    /// Names of all volumes, sorted
    pub async fn volume_names(&self) -> Vec<String> {
        self.volumes.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn create_volume(&self, name: &str, size: u64) -> Result<(), Error> {
        let mut volumes = self.volumes.write().await;
        if volumes.contains_key(name) {
            return Err(Error::backend(
                BACKEND,
                format!("volume {}/{} already exists", self.volume_group, name),
            ));
        }
        volumes.insert(
            name.to_string(),
            MemoryVolume {
                size,
                cloned_from: None,
            },
        );
        Ok(())
    }

    async fn clone_volume(&self, source: &str, dest: &str) -> Result<(), Error> {
        let mut volumes = self.volumes.write().await;
        if !volumes.contains_key(source) {
            return Err(Error::backend(
                BACKEND,
                format!("source volume {}/{} not found", self.volume_group, source),
            ));
        }
        let target = volumes.get_mut(dest).ok_or_else(|| {
            Error::backend(
                BACKEND,
                format!("destination volume {}/{} not found", self.volume_group, dest),
            )
        })?;
        target.cloned_from = Some(source.to_string());
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> Result<(), Error> {
        let mut volumes = self.volumes.write().await;
        volumes.remove(name).map(|_| ()).ok_or_else(|| {
            Error::backend(
                BACKEND,
                format!("volume {}/{} not found", self.volume_group, name),
            )
        })
    }

    fn block_device_path(&self, name: &str) -> String {
        volume_group_path(&self.volume_group, name)
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}

/// Factory for [`MemoryStorage`]
pub struct MemoryStorageFactory;

impl StorageBackendFactory for MemoryStorageFactory {
    fn create(&self, config: &StorageConfig) -> Result<Box<dyn StorageBackend>, Error> {
        match config {
            StorageConfig::Memory { volume_group } => {
                Ok(Box::new(MemoryStorage::new(volume_group.clone())))
            }
            _ => Err(Error::config("Invalid config type for MemoryStorage")),
        }
    }
}

/// A record set held by [`MemoryDns`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRecord {
    pub ttl: u32,
    pub values: Vec<String>,
}

/// In-memory authoritative zone
#[derive(Debug, Clone)]
pub struct MemoryDns {
    zone: String,
    records: Arc<RwLock<HashMap<(String, RecordType), MemoryRecord>>>,
}

impl MemoryDns {
    pub fn new(zone: &str) -> Self {
        Self {
            zone: qualify_zone(zone),
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Snapshot a record set
    pub async fn record(&self, fqdn: &str, record_type: RecordType) -> Option<MemoryRecord> {
        self.records
            .read()
            .await
            .get(&(fqdn.to_string(), record_type))
            .cloned()
    }

    /// Number of record sets in the zone
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Check if the zone holds no record sets
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn check_zone(&self, fqdn: &str) -> Result<(), Error> {
        if fqdn == self.zone || fqdn.ends_with(&format!(".{}", self.zone)) {
            Ok(())
        } else {
            Err(Error::backend(
                BACKEND,
                format!("record {} is outside zone {}", fqdn, self.zone),
            ))
        }
    }
}

#[async_trait]
impl DnsBackend for MemoryDns {
    async fn upsert_record(
        &self,
        fqdn: &str,
        record_type: RecordType,
        ttl: u32,
        values: &[String],
    ) -> Result<(), Error> {
        self.check_zone(fqdn)?;
        self.records.write().await.insert(
            (fqdn.to_string(), record_type),
            MemoryRecord {
                ttl,
                values: values.to_vec(),
            },
        );
        Ok(())
    }

    async fn delete_record(
        &self,
        fqdn: &str,
        record_type: RecordType,
        _ttl: u32,
        _values: &[String],
    ) -> Result<(), Error> {
        self.check_zone(fqdn)?;
        // Deleting an absent record set succeeds, as on an authoritative server
        self.records
            .write()
            .await
            .remove(&(fqdn.to_string(), record_type));
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}

/// Factory for [`MemoryDns`]
pub struct MemoryDnsFactory;

impl DnsBackendFactory for MemoryDnsFactory {
    fn create(&self, config: &DnsConfig) -> Result<Box<dyn DnsBackend>, Error> {
        match config {
            DnsConfig::Memory { zone } => Ok(Box::new(MemoryDns::new(zone))),
            _ => Err(Error::config("Invalid config type for MemoryDns")),
        }
    }
}
