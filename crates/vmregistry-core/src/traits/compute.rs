// # Compute Backend Trait
//
// Defines the hypervisor operations the orchestrator sequences.
//
// ## Implementations
//
// - libvirt: `vmregistry-compute-libvirt` crate
// - In-memory: `vmregistry_core::backends::MemoryCompute`
//
// ## Usage
//
// ```rust,ignore
// use vmregistry_core::ComputeBackend;
//
// let compute = /* ComputeBackend implementation */;
// for handle in compute.list_domains().await? {
//     let name = compute.domain_name(&handle).await?;
//     let xml = compute.domain_xml(&handle).await?;
// }
// ```

use async_trait::async_trait;
use std::fmt;

/// Opaque reference to a hypervisor domain
///
/// The contents are backend-specific (a UUID, a name, an index) and only
/// meaningful to the backend that issued the handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DomainHandle(String);

impl DomainHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DomainHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trait for hypervisor backends
///
/// Every method is a single remote call. Implementations must not retry,
/// cache domain state, or clean up after a failed call: the orchestrator
/// owns sequencing and reports failures verbatim.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait ComputeBackend: Send + Sync {
    /// Enumerate every domain known to the hypervisor, active or not
    ///
    /// The returned order is the hypervisor's enumeration order and is
    /// preserved by inventory listings.
    async fn list_domains(&self) -> Result<Vec<DomainHandle>, crate::Error>;

    /// Read a domain's name
    async fn domain_name(&self, domain: &DomainHandle) -> Result<String, crate::Error>;

    /// Read a domain's XML description
    async fn domain_xml(&self, domain: &DomainHandle) -> Result<String, crate::Error>;

    /// Locate a domain by name
    ///
    /// # Returns
    ///
    /// - `Ok(Some(handle))`: The domain exists
    /// - `Ok(None)`: No domain has that name
    /// - `Err(Error)`: The hypervisor could not be queried
    async fn lookup_domain(&self, name: &str) -> Result<Option<DomainHandle>, crate::Error>;

    /// Register a persistent domain from an XML description (does not start it)
    async fn define_domain(&self, xml: &str) -> Result<DomainHandle, crate::Error>;

    /// Boot a defined domain
    async fn start_domain(&self, domain: &DomainHandle) -> Result<(), crate::Error>;

    /// Power off a running domain
    async fn stop_domain(&self, domain: &DomainHandle) -> Result<(), crate::Error>;

    /// Remove a domain definition
    async fn undefine_domain(&self, domain: &DomainHandle) -> Result<(), crate::Error>;

    /// Backend name (for logging)
    fn backend_name(&self) -> &'static str;
}

/// Helper trait for constructing compute backends from configuration
pub trait ComputeBackendFactory: Send + Sync {
    /// Create a ComputeBackend instance from configuration
    fn create(
        &self,
        config: &crate::config::ComputeConfig,
    ) -> Result<Box<dyn ComputeBackend>, crate::Error>;
}
