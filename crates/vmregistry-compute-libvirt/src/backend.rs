//! libvirt connection and domain operations

use async_trait::async_trait;
use tracing::{debug, info};
use virt::connect::Connect;
use virt::domain::Domain;
use virt::sys;
use vmregistry_core::traits::{ComputeBackend, DomainHandle};
use vmregistry_core::{Error, Result};

use crate::BACKEND;

/// libvirt compute backend
pub struct LibvirtCompute {
    uri: String,
    connection: Connect,
}

impl LibvirtCompute {
    /// Connect to the hypervisor at `uri`
    ///
    /// Common URIs:
    /// - `qemu:///system` - System-wide QEMU/KVM
    /// - `qemu+ssh://user@host/system` - Remote via SSH
    pub fn connect(uri: &str) -> Result<Self> {
        info!(uri = %uri, "Connecting to libvirt");

        let connection = Connect::open(Some(uri))
            .map_err(|e| Error::unavailable(BACKEND, format!("{}: {}", uri, e)))?;

        info!(uri = %uri, "Connected to libvirt");
        Ok(Self {
            uri: uri.to_string(),
            connection,
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    fn domain(&self, handle: &DomainHandle) -> Result<Domain> {
        Domain::lookup_by_uuid_string(&self.connection, handle.as_str())
            .map_err(|e| Error::backend(BACKEND, format!("domain {}: {}", handle, e)))
    }

    fn all_domains(&self) -> Result<Vec<Domain>> {
        let flags = sys::VIR_CONNECT_LIST_DOMAINS_ACTIVE | sys::VIR_CONNECT_LIST_DOMAINS_INACTIVE;
        self.connection
            .list_all_domains(flags)
            .map_err(|e| Error::unavailable(BACKEND, e.to_string()))
    }

    fn handle_of(domain: &Domain) -> Result<DomainHandle> {
        domain
            .get_uuid_string()
            .map(DomainHandle::new)
            .map_err(|e| Error::backend(BACKEND, e.to_string()))
    }
}

impl std::fmt::Debug for LibvirtCompute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibvirtCompute").field("uri", &self.uri).finish()
    }
}

#[async_trait]
impl ComputeBackend for LibvirtCompute {
    async fn list_domains(&self) -> Result<Vec<DomainHandle>> {
        let domains = self.all_domains()?;
        let handles = domains
            .iter()
            .map(Self::handle_of)
            .collect::<Result<Vec<_>>>()?;
        debug!(count = handles.len(), "Listed domains");
        Ok(handles)
    }

    async fn domain_name(&self, domain: &DomainHandle) -> Result<String> {
        self.domain(domain)?
            .get_name()
            .map_err(|e| Error::backend(BACKEND, e.to_string()))
    }

    async fn domain_xml(&self, domain: &DomainHandle) -> Result<String> {
        // The persistent definition carries the metadata written at define time
        self.domain(domain)?
            .get_xml_desc(sys::VIR_DOMAIN_XML_INACTIVE)
            .map_err(|e| Error::backend(BACKEND, e.to_string()))
    }

    async fn lookup_domain(&self, name: &str) -> Result<Option<DomainHandle>> {
        // Scanning avoids treating every lookup error as "no such domain"
        for domain in self.all_domains()? {
            let domain_name = domain
                .get_name()
                .map_err(|e| Error::backend(BACKEND, e.to_string()))?;
            if domain_name == name {
                return Self::handle_of(&domain).map(Some);
            }
        }
        Ok(None)
    }

    async fn define_domain(&self, xml: &str) -> Result<DomainHandle> {
        let domain = Domain::define_xml(&self.connection, xml)
            .map_err(|e| Error::backend(BACKEND, format!("define failed: {}", e)))?;
        let handle = Self::handle_of(&domain)?;
        info!(domain = %handle, "Domain defined");
        Ok(handle)
    }

    async fn start_domain(&self, domain: &DomainHandle) -> Result<()> {
        self.domain(domain)?
            .create()
            .map_err(|e| Error::backend(BACKEND, format!("start failed: {}", e)))?;
        info!(domain = %domain, "Domain started");
        Ok(())
    }

    async fn stop_domain(&self, domain: &DomainHandle) -> Result<()> {
        self.domain(domain)?
            .destroy()
            .map_err(|e| Error::backend(BACKEND, format!("stop failed: {}", e)))?;
        info!(domain = %domain, "Domain stopped");
        Ok(())
    }

    async fn undefine_domain(&self, domain: &DomainHandle) -> Result<()> {
        self.domain(domain)?
            .undefine()
            .map_err(|e| Error::backend(BACKEND, format!("undefine failed: {}", e)))?;
        info!(domain = %domain, "Domain undefined");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}
