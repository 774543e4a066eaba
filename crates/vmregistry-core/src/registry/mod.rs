//! Plugin-based backend registry
//!
//! The registry allows compute, storage and DNS backends to be registered
//! dynamically at runtime, avoiding hardcoded if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vmregistry_core::registry::BackendRegistry;
//!
//! let registry = BackendRegistry::new();
//! vmregistry_core::backends::register(&registry);
//! vmregistry_dns_powerdns::register(&registry);
//!
//! let dns = registry.create_dns(&config.dns)?;
//! ```
//!
//! ## Registration
//!
//! Backend crates register themselves during initialization:
//!
//! ```rust,ignore
//! // In vmregistry-dns-powerdns
//! pub fn register(registry: &BackendRegistry) {
//!     registry.register_dns("powerdns", Box::new(PowerDnsFactory));
//! }
//! ```

use crate::config::{ComputeConfig, DnsConfig, StorageConfig};
use crate::error::{Error, Result};
use crate::traits::{ComputeBackend, DnsBackend, StorageBackend};
use crate::traits::{ComputeBackendFactory, DnsBackendFactory, StorageBackendFactory};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Backend registry for plugin-based backend creation
///
/// Maps backend type names to factory objects; the type name of each
/// configuration section selects the factory.
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct BackendRegistry {
    compute: RwLock<HashMap<String, Box<dyn ComputeBackendFactory>>>,
    storage: RwLock<HashMap<String, Box<dyn StorageBackendFactory>>>,
    dns: RwLock<HashMap<String, Box<dyn DnsBackendFactory>>>,
}

impl BackendRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a compute backend factory
    ///
    /// # Parameters
    ///
    /// - `name`: Backend type name (e.g., "libvirt", "memory")
    /// - `factory`: Factory object for creating backend instances
    pub fn register_compute(&self, name: impl Into<String>, factory: Box<dyn ComputeBackendFactory>) {
        let mut compute = self.compute.write().unwrap_or_else(PoisonError::into_inner);
        compute.insert(name.into(), factory);
    }

    /// Register a storage backend factory
    pub fn register_storage(&self, name: impl Into<String>, factory: Box<dyn StorageBackendFactory>) {
        let mut storage = self.storage.write().unwrap_or_else(PoisonError::into_inner);
        storage.insert(name.into(), factory);
    }

    /// Register a DNS backend factory
    pub fn register_dns(&self, name: impl Into<String>, factory: Box<dyn DnsBackendFactory>) {
        let mut dns = self.dns.write().unwrap_or_else(PoisonError::into_inner);
        dns.insert(name.into(), factory);
    }

    /// Create a compute backend from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn ComputeBackend>)`: Created backend instance
    /// - `Err(Error)`: If the backend type is not registered or creation fails
    pub fn create_compute(&self, config: &ComputeConfig) -> Result<Box<dyn ComputeBackend>> {
        let backend_type = config.type_name();
        let compute = self.compute.read().unwrap_or_else(PoisonError::into_inner);

        let factory = compute
            .get(backend_type)
            .ok_or_else(|| Error::config(format!("Unknown compute backend type: {}", backend_type)))?;

        factory.create(config)
    }

    /// Create a storage backend from configuration
    pub fn create_storage(&self, config: &StorageConfig) -> Result<Box<dyn StorageBackend>> {
        let backend_type = config.type_name();
        let storage = self.storage.read().unwrap_or_else(PoisonError::into_inner);

        let factory = storage
            .get(backend_type)
            .ok_or_else(|| Error::config(format!("Unknown storage backend type: {}", backend_type)))?;

        factory.create(config)
    }

    /// Create a DNS backend from configuration
    pub fn create_dns(&self, config: &DnsConfig) -> Result<Box<dyn DnsBackend>> {
        let backend_type = config.type_name();
        let dns = self.dns.read().unwrap_or_else(PoisonError::into_inner);

        let factory = dns
            .get(backend_type)
            .ok_or_else(|| Error::config(format!("Unknown DNS backend type: {}", backend_type)))?;

        factory.create(config)
    }

    /// List all registered compute backend types
    pub fn list_compute(&self) -> Vec<String> {
        sorted_keys(&self.compute)
    }

    /// List all registered storage backend types
    pub fn list_storage(&self) -> Vec<String> {
        sorted_keys(&self.storage)
    }

    /// List all registered DNS backend types
    pub fn list_dns(&self) -> Vec<String> {
        sorted_keys(&self.dns)
    }

    /// Check if a compute backend type is registered
    pub fn has_compute(&self, name: &str) -> bool {
        self.compute
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Check if a storage backend type is registered
    pub fn has_storage(&self, name: &str) -> bool {
        self.storage
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Check if a DNS backend type is registered
    pub fn has_dns(&self, name: &str) -> bool {
        self.dns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }
}

fn sorted_keys<V>(map: &RwLock<HashMap<String, V>>) -> Vec<String> {
    let map = map.read().unwrap_or_else(PoisonError::into_inner);
    let mut keys: Vec<String> = map.keys().cloned().collect();
    keys.sort();
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingDnsFactory;

    impl DnsBackendFactory for FailingDnsFactory {
        fn create(&self, _config: &DnsConfig) -> Result<Box<dyn DnsBackend>> {
            Err(Error::not_found("Mock backend not implemented"))
        }
    }

    #[test]
    fn test_registry_registration() {
        let registry = BackendRegistry::new();

        assert!(!registry.has_dns("mock"));

        registry.register_dns("mock", Box::new(FailingDnsFactory));

        assert!(registry.has_dns("mock"));
        assert!(registry.list_dns().contains(&"mock".to_string()));
        assert!(!registry.has_compute("mock"));
    }

    #[test]
    fn unknown_type_is_config_error() {
        let registry = BackendRegistry::new();
        let result = registry.create_compute(&ComputeConfig::Memory);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn memory_backends_register_under_one_name() {
        let registry = BackendRegistry::new();
        crate::backends::register(&registry);

        assert_eq!(registry.list_compute(), vec!["memory".to_string()]);
        assert!(registry.has_storage("memory"));
        assert!(registry.create_compute(&ComputeConfig::Memory).is_ok());
        assert!(
            registry
                .create_storage(&StorageConfig::Memory {
                    volume_group: "vms".to_string()
                })
                .is_ok()
        );
        let dns = registry
            .create_dns(&DnsConfig::Memory {
                zone: "example.com".to_string(),
            })
            .unwrap();
        assert_eq!(dns.backend_name(), "memory");
    }
}
