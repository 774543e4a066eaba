//! VM lifecycle orchestrator
//!
//! The Orchestrator sequences compute, storage and DNS calls for the four
//! registry operations:
//!
//! ```text
//! create:  validate → create volume → clone image → allocate IP
//!          → render XML → define → start → upsert A record
//!
//! destroy: validate → lookup → read XML (IP) → delete A record
//!          → stop (best effort) → undefine → remove volume
//! ```
//!
//! ## Failure model
//!
//! The first failing step aborts the sequence. Nothing is rolled back: the
//! returned error names the step and carries every [`Commit`] made before
//! it, and the same information is logged at `error` level.
//!
//! ## Cancellation
//!
//! The `*_with_cancel` variants honour a [`CancellationToken`] between
//! steps. A step already running completes; the next one is not started
//! and [`Error::Cancelled`] is returned.

mod ledger;

pub use ledger::{Commit, Step};

use crate::codec::{self, DomainParams, DomainTemplate};
use crate::config::OrchestratorSettings;
use crate::error::{Error, Result};
use crate::inventory::Inventory;
use crate::network::{self, Subnet};
use crate::traits::dns::{qualify_zone, record_fqdn};
use crate::traits::{ComputeBackend, DnsBackend, RecordType, StorageBackend};
use crate::types::{CreateRequest, FindBy, PLACEHOLDER_MAC, VmRecord};
use ledger::Ledger;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Core lifecycle orchestrator
///
/// Holds no mutable state: every query is answered from the hypervisor, so
/// one instance can serve concurrent callers.
///
/// ## Concurrency
///
/// There is no cross-request locking. Two concurrent creations may pick the
/// same candidate address between the inventory check and domain
/// definition.
pub struct Orchestrator {
    compute: Arc<dyn ComputeBackend>,
    storage: Arc<dyn StorageBackend>,
    dns: Arc<dyn DnsBackend>,
    inventory: Inventory,
    template: DomainTemplate,
    subnet: Subnet,
    /// Fully qualified, with trailing dot
    zone: String,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    /// Create a new orchestrator
    ///
    /// # Parameters
    ///
    /// - `compute`: Hypervisor backend
    /// - `storage`: Volume backend
    /// - `dns`: DNS backend
    /// - `template`: Domain description template
    /// - `subnet`: Address pool
    /// - `zone`: DNS zone for VM records (trailing dot optional)
    /// - `settings`: TTL and allocation bounds
    pub fn new(
        compute: Arc<dyn ComputeBackend>,
        storage: Arc<dyn StorageBackend>,
        dns: Arc<dyn DnsBackend>,
        template: DomainTemplate,
        subnet: Subnet,
        zone: &str,
        settings: OrchestratorSettings,
    ) -> Result<Self> {
        subnet.validate()?;
        settings.validate()?;
        if zone.trim_end_matches('.').is_empty() {
            return Err(Error::config("DNS zone cannot be empty"));
        }

        Ok(Self {
            inventory: Inventory::new(compute.clone()),
            compute,
            storage,
            dns,
            template,
            subnet,
            zone: qualify_zone(zone),
            settings,
        })
    }

    /// The inventory reader backing `list` and `find`
    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    /// Zone VM records are published in (with trailing dot)
    pub fn zone(&self) -> &str {
        &self.zone
    }

    pub fn subnet(&self) -> &Subnet {
        &self.subnet
    }

    /// Create a VM
    ///
    /// See [`Orchestrator::create_with_cancel`].
    pub async fn create(&self, request: &CreateRequest) -> Result<VmRecord> {
        self.create_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Create a VM, stopping between steps once `cancel` fires
    ///
    /// The returned record carries the allocated IP and a placeholder MAC.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` before any backend call if a field is unset
    /// - `StorageProvisioningFailed`, `AddressPoolExhausted`, `Template`,
    ///   `DomainCreationFailed` or `DnsUpdateFailed` from the failing step
    /// - `BackendUnavailable` if the inventory cannot be scanned during
    ///   allocation
    /// - `Cancelled` if `cancel` fired before a step started
    pub async fn create_with_cancel(
        &self,
        request: &CreateRequest,
        cancel: &CancellationToken,
    ) -> Result<VmRecord> {
        request.validate()?;

        let name = request.name.as_str();
        let mut ledger = Ledger::new("create", name, cancel);
        info!(
            vm = name,
            memory = request.memory,
            cores = request.cores,
            size = request.size,
            source_image = %request.source_image,
            "Creating VM"
        );

        // Storage
        ledger.begin(Step::ProvisionStorage)?;
        self.storage
            .create_volume(name, request.size)
            .await
            .map_err(|e| ledger.fail(Step::ProvisionStorage, e))?;
        ledger.commit(Commit::VolumeCreated {
            volume: name.to_string(),
        });

        self.storage
            .clone_volume(&request.source_image, name)
            .await
            .map_err(|e| ledger.fail(Step::ProvisionStorage, e))?;
        ledger.commit(Commit::ImageCloned {
            source: request.source_image.clone(),
            volume: name.to_string(),
        });
        info!(vm = name, step = %Step::ProvisionStorage, "Volume provisioned");

        // Address
        ledger.begin(Step::AllocateAddress)?;
        let ip = self.allocate_address(&ledger).await?.to_string();
        info!(vm = name, ip = %ip, step = %Step::AllocateAddress, "Address allocated");

        // Domain
        ledger.begin(Step::RenderTemplate)?;
        let disk_path = self.storage.block_device_path(name);
        let xml = self
            .template
            .render(&DomainParams {
                name,
                memory: request.memory,
                cores: request.cores,
                disk_path: &disk_path,
                ip: &ip,
            })
            .map_err(|e| ledger.fail(Step::RenderTemplate, e))?;

        ledger.begin(Step::DefineDomain)?;
        let handle = self
            .compute
            .define_domain(&xml)
            .await
            .map_err(|e| ledger.fail(Step::DefineDomain, e))?;
        ledger.commit(Commit::DomainDefined {
            domain: name.to_string(),
        });

        ledger.begin(Step::StartDomain)?;
        self.compute
            .start_domain(&handle)
            .await
            .map_err(|e| ledger.fail(Step::StartDomain, e))?;
        ledger.commit(Commit::DomainStarted {
            domain: name.to_string(),
        });
        info!(vm = name, step = %Step::StartDomain, "Domain started");

        // DNS
        ledger.begin(Step::RegisterDns)?;
        let fqdn = record_fqdn(name, &self.zone);
        self.dns
            .upsert_record(&fqdn, RecordType::A, self.settings.dns_ttl, &[ip.clone()])
            .await
            .map_err(|e| ledger.fail(Step::RegisterDns, e))?;
        ledger.commit(Commit::RecordUpserted {
            fqdn: fqdn.clone(),
            ip: ip.clone(),
        });

        info!(vm = name, ip = %ip, fqdn = %fqdn, "VM created");
        Ok(VmRecord::new(name, ip, PLACEHOLDER_MAC))
    }

    /// Destroy a VM
    ///
    /// See [`Orchestrator::destroy_with_cancel`].
    pub async fn destroy(&self, name: &str) -> Result<()> {
        self.destroy_with_cancel(name, &CancellationToken::new())
            .await
    }

    /// Destroy a VM, stopping between steps once `cancel` fires
    ///
    /// The DNS record is removed before the domain is shut down. A failed
    /// shutdown is logged and the domain is undefined anyway.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `name` is empty
    /// - `LookupFailed` if the domain does not exist or cannot be looked up
    /// - `DomainDescriptionUnavailable` if the XML is unreadable or has no IP
    /// - `DnsUpdateFailed`, `DomainRemovalFailed` or `StorageRemovalFailed`
    ///   from the failing step
    /// - `Cancelled` if `cancel` fired before a step started
    pub async fn destroy_with_cancel(&self, name: &str, cancel: &CancellationToken) -> Result<()> {
        if name.is_empty() {
            return Err(Error::invalid_argument("name not specified"));
        }

        let mut ledger = Ledger::new("destroy", name, cancel);
        info!(vm = name, "Destroying VM");

        ledger.begin(Step::LookupDomain)?;
        let handle = match self.compute.lookup_domain(name).await {
            Ok(Some(handle)) => handle,
            Ok(None) => {
                let err = Error::lookup_failed(format!("domain {} not found", name));
                ledger.report(Step::LookupDomain, &err);
                return Err(err);
            }
            Err(e) => {
                let err = Error::lookup_failed(format!("domain {}: {}", name, e));
                ledger.report(Step::LookupDomain, &err);
                return Err(err);
            }
        };

        ledger.begin(Step::ReadDescription)?;
        let ip = match self.embedded_ip(name, &handle).await {
            Ok(ip) => ip,
            Err(err) => {
                ledger.report(Step::ReadDescription, &err);
                return Err(err);
            }
        };
        debug!(vm = name, ip = %ip, "Read embedded address");

        ledger.begin(Step::RemoveDns)?;
        let fqdn = record_fqdn(name, &self.zone);
        self.dns
            .delete_record(&fqdn, RecordType::A, self.settings.dns_ttl, &[ip.clone()])
            .await
            .map_err(|e| ledger.fail(Step::RemoveDns, e))?;
        ledger.commit(Commit::RecordDeleted { fqdn: fqdn.clone() });

        ledger.begin(Step::StopDomain)?;
        match self.compute.stop_domain(&handle).await {
            Ok(()) => ledger.commit(Commit::DomainStopped {
                domain: name.to_string(),
            }),
            Err(e) => warn!(vm = name, error = %e, "Failed to stop domain, undefining anyway"),
        }

        ledger.begin(Step::UndefineDomain)?;
        self.compute
            .undefine_domain(&handle)
            .await
            .map_err(|e| ledger.fail(Step::UndefineDomain, e))?;
        ledger.commit(Commit::DomainUndefined {
            domain: name.to_string(),
        });

        ledger.begin(Step::RemoveVolume)?;
        self.storage
            .remove_volume(name)
            .await
            .map_err(|e| ledger.fail(Step::RemoveVolume, e))?;
        ledger.commit(Commit::VolumeRemoved {
            volume: name.to_string(),
        });

        info!(vm = name, ip = %ip, "VM destroyed");
        Ok(())
    }

    /// Every VM on the hypervisor
    pub async fn list(&self) -> Result<Vec<VmRecord>> {
        self.list_with_cancel(&CancellationToken::new()).await
    }

    /// Every VM on the hypervisor, unless `cancel` has already fired
    pub async fn list_with_cancel(&self, cancel: &CancellationToken) -> Result<Vec<VmRecord>> {
        Ledger::new("list", "*", cancel).begin(Step::ListInventory)?;
        self.inventory.list_all().await
    }

    /// First VM matching `by` = `value`
    pub async fn find(&self, by: FindBy, value: &str) -> Result<VmRecord> {
        self.find_with_cancel(by, value, &CancellationToken::new())
            .await
    }

    /// First VM matching `by` = `value`, unless `cancel` has already fired
    pub async fn find_with_cancel(
        &self,
        by: FindBy,
        value: &str,
        cancel: &CancellationToken,
    ) -> Result<VmRecord> {
        Ledger::new("find", value, cancel).begin(Step::FindInventory)?;
        self.inventory.find(by, value).await
    }

    /// Draw candidates until one is unused
    ///
    /// A candidate counts as free only when the inventory reports
    /// `NotFound` for it. Any other lookup failure aborts allocation.
    async fn allocate_address(&self, ledger: &Ledger<'_>) -> Result<Ipv4Addr> {
        let attempts = self.settings.address_attempts;

        for attempt in 1..=attempts {
            let candidate = network::generate(&self.subnet);

            match self.inventory.find(FindBy::Ip, &candidate.to_string()).await {
                Err(Error::NotFound(_)) => return Ok(candidate),
                Ok(existing) => {
                    debug!(
                        candidate = %candidate,
                        attempt,
                        held_by = %existing.name,
                        "Candidate address in use"
                    );
                }
                Err(e) => {
                    ledger.report(Step::AllocateAddress, &e);
                    return Err(e);
                }
            }
        }

        let err = Error::AddressPoolExhausted {
            attempts,
            committed: ledger.committed().to_vec(),
        };
        ledger.report(Step::AllocateAddress, &err);
        Err(err)
    }

    async fn embedded_ip(&self, name: &str, handle: &crate::traits::DomainHandle) -> Result<String> {
        let unavailable = |reason: String| Error::DomainDescriptionUnavailable {
            name: name.to_string(),
            reason,
        };

        let xml = self
            .compute
            .domain_xml(handle)
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        let info = codec::parse(&xml).map_err(|e| unavailable(e.to_string()))?;

        if info.ip.is_empty() {
            return Err(unavailable("no IP address in domain metadata".to_string()));
        }
        Ok(info.ip)
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("compute", &self.compute.backend_name())
            .field("storage", &self.storage.backend_name())
            .field("dns", &self.dns.backend_name())
            .field("subnet", &self.subnet)
            .field("zone", &self.zone)
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{MemoryCompute, MemoryDns, MemoryStorage};

    const TEMPLATE: &str = r#"<domain type="kvm">
  <name>{{.Name}}</name>
  <memory unit="b">{{.Memory}}</memory>
  <vcpu>{{.Cores}}</vcpu>
  <metadata><vmregistry:vmregistry xmlns:vmregistry="https://github.com/vmregistry/vmregistry"><vmregistry:ip>{{.IP}}</vmregistry:ip></vmregistry:vmregistry></metadata>
  <devices>
    <disk type="block" device="disk"><source dev="{{.DiskPath}}"/></disk>
    <interface type="bridge"><mac address="52:54:00:00:00:01"/></interface>
  </devices>
</domain>"#;

    struct Harness {
        compute: MemoryCompute,
        storage: MemoryStorage,
        dns: MemoryDns,
        orchestrator: Orchestrator,
    }

    async fn harness() -> Harness {
        let compute = MemoryCompute::new();
        let storage = MemoryStorage::new("vms");
        let dns = MemoryDns::new("example.com");
        storage.insert("ubuntu", 2 << 30).await;

        let orchestrator = Orchestrator::new(
            Arc::new(compute.clone()),
            Arc::new(storage.clone()),
            Arc::new(dns.clone()),
            DomainTemplate::new(TEMPLATE).unwrap(),
            "10.0.0.0/24".parse().unwrap(),
            "example.com",
            OrchestratorSettings::default(),
        )
        .unwrap();

        Harness {
            compute,
            storage,
            dns,
            orchestrator,
        }
    }

    fn request(name: &str) -> CreateRequest {
        CreateRequest::new(name, 1 << 30, 2, 3 << 30, "ubuntu")
    }

    #[tokio::test]
    async fn create_then_destroy_round_trip() {
        let h = harness().await;

        let record = h.orchestrator.create(&request("vm1")).await.unwrap();
        assert_eq!(record.name, "vm1");
        assert_eq!(record.mac, PLACEHOLDER_MAC);

        let domain = h.compute.domain("vm1").await.unwrap();
        assert!(domain.running);
        assert!(domain.xml.contains(r#"<source dev="/dev/vms/vm1"/>"#));

        let volume = h.storage.volume("vm1").await.unwrap();
        assert_eq!(volume.size, 3 << 30);
        assert_eq!(volume.cloned_from.as_deref(), Some("ubuntu"));

        let a = h.dns.record("vm1.example.com.", RecordType::A).await.unwrap();
        assert_eq!(a.ttl, 300);
        assert_eq!(a.values, vec![record.ip.clone()]);

        let found = h.orchestrator.find(FindBy::Ip, &record.ip).await.unwrap();
        assert_eq!(found.name, "vm1");
        assert_eq!(found.mac, "52:54:00:00:00:01");

        h.orchestrator.destroy("vm1").await.unwrap();
        assert!(h.compute.is_empty().await);
        assert!(h.dns.is_empty().await);
        assert_eq!(h.storage.volume_names().await, vec!["ubuntu".to_string()]);
    }

    #[tokio::test]
    async fn zone_is_qualified() {
        let h = harness().await;
        assert_eq!(h.orchestrator.zone(), "example.com.");
    }

    #[tokio::test]
    async fn missing_source_image_reports_created_volume() {
        let h = harness().await;
        let mut req = request("vm1");
        req.source_image = "missing".to_string();

        let err = h.orchestrator.create(&req).await.unwrap_err();
        assert!(matches!(err, Error::StorageProvisioningFailed { .. }));
        assert_eq!(
            err.committed(),
            &[Commit::VolumeCreated {
                volume: "vm1".to_string()
            }]
        );
        assert!(h.compute.is_empty().await);
    }

    #[tokio::test]
    async fn destroy_unknown_domain_is_lookup_failure() {
        let h = harness().await;
        assert!(matches!(
            h.orchestrator.destroy("ghost").await,
            Err(Error::LookupFailed(_))
        ));
        assert!(matches!(
            h.orchestrator.destroy("").await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn destroy_continues_when_domain_already_stopped() {
        let h = harness().await;
        let record = h.orchestrator.create(&request("vm1")).await.unwrap();
        h.compute
            .stop_domain(&crate::traits::DomainHandle::new("vm1"))
            .await
            .unwrap();

        h.orchestrator.destroy(&record.name).await.unwrap();
        assert!(h.compute.is_empty().await);
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_first_step() {
        let h = harness().await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = h
            .orchestrator
            .create_with_cancel(&request("vm1"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Cancelled {
                step: Step::ProvisionStorage,
                ..
            }
        ));
        assert!(h.storage.volume("vm1").await.is_none());

        assert!(matches!(
            h.orchestrator.list_with_cancel(&cancel).await,
            Err(Error::Cancelled { .. })
        ));
    }

    #[tokio::test]
    async fn rejects_unusable_subnet() {
        let result = Orchestrator::new(
            Arc::new(MemoryCompute::new()),
            Arc::new(MemoryStorage::new("vms")),
            Arc::new(MemoryDns::new("example.com")),
            DomainTemplate::new(TEMPLATE).unwrap(),
            "10.0.0.0/31".parse().unwrap(),
            "example.com",
            OrchestratorSettings::default(),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
