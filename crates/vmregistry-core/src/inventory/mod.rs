//! Inventory reader
//!
//! Rebuilds [`VmRecord`]s from hypervisor state on every call. Nothing is
//! cached: the hypervisor is the single source of truth.
//!
//! ## Failure semantics
//!
//! - [`Inventory::list_all`] is all-or-nothing. One unreadable domain fails
//!   the whole listing.
//! - [`Inventory::find`] skips unreadable domains and keeps scanning.

use crate::codec;
use crate::error::{Error, Result};
use crate::traits::{ComputeBackend, DomainHandle};
use crate::types::{FindBy, VmRecord};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Read-only view over a compute backend's domains
#[derive(Clone)]
pub struct Inventory {
    compute: Arc<dyn ComputeBackend>,
}

impl Inventory {
    pub fn new(compute: Arc<dyn ComputeBackend>) -> Self {
        Self { compute }
    }

    /// Every VM known to the hypervisor, in enumeration order
    ///
    /// # Errors
    ///
    /// - `BackendUnavailable` if domains cannot be enumerated
    /// - the per-domain error (read or `MalformedDomainXml`) if any domain
    ///   cannot be decoded; no partial listing is returned
    pub async fn list_all(&self) -> Result<Vec<VmRecord>> {
        let handles = self.enumerate().await?;
        let mut records = Vec::with_capacity(handles.len());

        for handle in &handles {
            match self.read_record(handle).await {
                Ok(record) => records.push(record),
                Err(e) => {
                    error!(domain = %handle, error = %e, "Failed to read domain, aborting listing");
                    return Err(e);
                }
            }
        }

        debug!(count = records.len(), "Listed VMs");
        Ok(records)
    }

    /// First VM whose `by` field equals `value`
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if no criterion or an empty value is given
    /// - `BackendUnavailable` if domains cannot be enumerated
    /// - `NotFound` if no readable domain matches
    pub async fn find(&self, by: FindBy, value: &str) -> Result<VmRecord> {
        if by == FindBy::Unspecified {
            return Err(Error::invalid_argument("search criterion not specified"));
        }
        if value.is_empty() {
            return Err(Error::invalid_argument(format!("{} not specified", by)));
        }

        let handles = self.enumerate().await?;

        for handle in &handles {
            let record = match self.read_record(handle).await {
                Ok(record) => record,
                Err(e) => {
                    warn!(domain = %handle, error = %e, "Skipping unreadable domain");
                    continue;
                }
            };

            if by.matches(&record, value) {
                debug!(vm = %record.name, by = %by, value, "Found VM");
                return Ok(record);
            }
        }

        Err(Error::not_found(format!("{} {} not found", by, value)))
    }

    async fn enumerate(&self) -> Result<Vec<DomainHandle>> {
        self.compute.list_domains().await.map_err(|e| match e {
            Error::BackendUnavailable { .. } => e,
            other => Error::unavailable(self.compute.backend_name(), other.to_string()),
        })
    }

    async fn read_record(&self, handle: &DomainHandle) -> Result<VmRecord> {
        let name = self.compute.domain_name(handle).await?;
        let xml = self.compute.domain_xml(handle).await?;
        let info = codec::parse(&xml)?;

        if info.mac_addresses.len() != 1 {
            warn!(
                vm = %name,
                interfaces = info.mac_addresses.len(),
                "Domain does not have exactly one interface, using the first MAC"
            );
        }
        if info.ip.is_empty() {
            warn!(vm = %name, "Domain carries no IP address in its metadata");
        }

        let mac = info.first_mac().unwrap_or_default().to_string();
        Ok(VmRecord::new(name, info.ip, mac))
    }
}

impl std::fmt::Debug for Inventory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inventory")
            .field("compute", &self.compute.backend_name())
            .finish()
    }
}
