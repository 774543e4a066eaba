//! Test doubles and common utilities for lifecycle contract tests
//!
//! The recording backends share one [`Journal`] so tests can assert the
//! exact order of calls across compute, storage and DNS. [`Faults`] injects
//! failures (or a cancellation) at a named operation.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use vmregistry_core::traits::{
    ComputeBackend, DnsBackend, DomainHandle, RecordType, StorageBackend,
};
use vmregistry_core::{
    CancellationToken, DomainTemplate, Error, Orchestrator, OrchestratorSettings, Result, codec,
};

pub const ZONE: &str = "example.com";
pub const VOLUME_GROUP: &str = "vms";
pub const SOURCE_IMAGE: &str = "ubuntu-20.04";

pub const TEMPLATE: &str = r#"<domain type="kvm">
  <name>{{.Name}}</name>
  <memory unit="b">{{.Memory}}</memory>
  <vcpu>{{.Cores}}</vcpu>
  <metadata>
    <vmregistry:vmregistry xmlns:vmregistry="https://github.com/vmregistry/vmregistry">
      <vmregistry:ip>{{.IP}}</vmregistry:ip>
    </vmregistry:vmregistry>
  </metadata>
  <devices>
    <disk type="block" device="disk"><source dev="{{.DiskPath}}"/></disk>
    <interface type="bridge"><mac address="52:54:00:00:00:01"/><source bridge="br0"/></interface>
  </devices>
</domain>"#;

/// One backend call, with its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListDomains,
    DomainName(String),
    DomainXml(String),
    LookupDomain(String),
    DefineDomain(String),
    StartDomain(String),
    StopDomain(String),
    UndefineDomain(String),
    CreateVolume { name: String, size: u64 },
    CloneVolume { source: String, dest: String },
    RemoveVolume(String),
    UpsertRecord { fqdn: String, record_type: RecordType, ttl: u32, values: Vec<String> },
    DeleteRecord { fqdn: String, record_type: RecordType, ttl: u32, values: Vec<String> },
}

impl Call {
    pub fn op(&self) -> &'static str {
        match self {
            Call::ListDomains => "list_domains",
            Call::DomainName(_) => "domain_name",
            Call::DomainXml(_) => "domain_xml",
            Call::LookupDomain(_) => "lookup_domain",
            Call::DefineDomain(_) => "define_domain",
            Call::StartDomain(_) => "start_domain",
            Call::StopDomain(_) => "stop_domain",
            Call::UndefineDomain(_) => "undefine_domain",
            Call::CreateVolume { .. } => "create_volume",
            Call::CloneVolume { .. } => "clone_volume",
            Call::RemoveVolume(_) => "remove_volume",
            Call::UpsertRecord { .. } => "upsert_record",
            Call::DeleteRecord { .. } => "delete_record",
        }
    }

    /// Whether the call changes backend state
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Call::ListDomains | Call::DomainName(_) | Call::DomainXml(_) | Call::LookupDomain(_)
        )
    }
}

/// Ordered record of every backend call
#[derive(Clone, Default)]
pub struct Journal {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Journal {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.lock().unwrap().is_empty()
    }

    /// Operation names of state-changing calls, in order
    pub fn mutations(&self) -> Vec<&'static str> {
        self.calls()
            .iter()
            .filter(|c| c.is_mutation())
            .map(Call::op)
            .collect()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls().iter().filter(|c| c.op() == op).count()
    }

    pub fn contains(&self, op: &str) -> bool {
        self.count(op) > 0
    }
}

/// Failure and cancellation injection keyed by operation name
#[derive(Clone, Default)]
pub struct Faults {
    failing: Arc<Mutex<HashSet<&'static str>>>,
    cancel_on: Arc<Mutex<HashMap<&'static str, CancellationToken>>>,
}

impl Faults {
    /// Make every call to `op` fail
    pub fn fail(&self, op: &'static str) {
        self.failing.lock().unwrap().insert(op);
    }

    /// Cancel `token` while `op` is in flight; the call itself succeeds
    pub fn cancel_during(&self, op: &'static str, token: CancellationToken) {
        self.cancel_on.lock().unwrap().insert(op, token);
    }

    fn check(&self, op: &'static str) -> Result<()> {
        if let Some(token) = self.cancel_on.lock().unwrap().get(op) {
            token.cancel();
        }
        if self.failing.lock().unwrap().contains(op) {
            return Err(match op {
                "list_domains" => Error::unavailable("mock", "hypervisor connection refused"),
                _ => Error::backend("mock", format!("injected {} failure", op)),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct MockDomain {
    name: String,
    xml: String,
    running: bool,
}

/// A compute backend that records calls and holds domains in memory
#[derive(Clone)]
pub struct RecordingCompute {
    journal: Journal,
    faults: Faults,
    domains: Arc<Mutex<Vec<MockDomain>>>,
}

impl RecordingCompute {
    pub fn new(journal: Journal, faults: Faults) -> Self {
        Self {
            journal,
            faults,
            domains: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Seed a running domain without journaling
    pub fn seed(&self, name: &str, xml: String) {
        self.domains.lock().unwrap().push(MockDomain {
            name: name.to_string(),
            xml,
            running: true,
        });
    }

    pub fn has_domain(&self, name: &str) -> bool {
        self.domains.lock().unwrap().iter().any(|d| d.name == name)
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.domains
            .lock()
            .unwrap()
            .iter()
            .any(|d| d.name == name && d.running)
    }

    pub fn xml_of(&self, name: &str) -> Option<String> {
        self.domains
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.xml.clone())
    }

    fn with_domain<T>(&self, handle: &DomainHandle, f: impl FnOnce(&mut MockDomain) -> T) -> Result<T> {
        let mut domains = self.domains.lock().unwrap();
        domains
            .iter_mut()
            .find(|d| d.name == handle.as_str())
            .map(f)
            .ok_or_else(|| Error::backend("mock", format!("no domain {}", handle)))
    }
}

#[async_trait]
impl ComputeBackend for RecordingCompute {
    async fn list_domains(&self) -> Result<Vec<DomainHandle>> {
        self.journal.record(Call::ListDomains);
        self.faults.check("list_domains")?;
        Ok(self
            .domains
            .lock()
            .unwrap()
            .iter()
            .map(|d| DomainHandle::new(d.name.clone()))
            .collect())
    }

    async fn domain_name(&self, domain: &DomainHandle) -> Result<String> {
        self.journal.record(Call::DomainName(domain.to_string()));
        self.faults.check("domain_name")?;
        self.with_domain(domain, |d| d.name.clone())
    }

    async fn domain_xml(&self, domain: &DomainHandle) -> Result<String> {
        self.journal.record(Call::DomainXml(domain.to_string()));
        self.faults.check("domain_xml")?;
        self.with_domain(domain, |d| d.xml.clone())
    }

    async fn lookup_domain(&self, name: &str) -> Result<Option<DomainHandle>> {
        self.journal.record(Call::LookupDomain(name.to_string()));
        self.faults.check("lookup_domain")?;
        Ok(self
            .domains
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.name == name)
            .map(|d| DomainHandle::new(d.name.clone())))
    }

    async fn define_domain(&self, xml: &str) -> Result<DomainHandle> {
        self.journal.record(Call::DefineDomain(xml.to_string()));
        self.faults.check("define_domain")?;
        let name = codec::parse(xml)?.name;
        self.domains.lock().unwrap().push(MockDomain {
            name: name.clone(),
            xml: xml.to_string(),
            running: false,
        });
        Ok(DomainHandle::new(name))
    }

    async fn start_domain(&self, domain: &DomainHandle) -> Result<()> {
        self.journal.record(Call::StartDomain(domain.to_string()));
        self.faults.check("start_domain")?;
        self.with_domain(domain, |d| d.running = true)
    }

    async fn stop_domain(&self, domain: &DomainHandle) -> Result<()> {
        self.journal.record(Call::StopDomain(domain.to_string()));
        self.faults.check("stop_domain")?;
        self.with_domain(domain, |d| d.running = false)
    }

    async fn undefine_domain(&self, domain: &DomainHandle) -> Result<()> {
        self.journal.record(Call::UndefineDomain(domain.to_string()));
        self.faults.check("undefine_domain")?;
        self.domains
            .lock()
            .unwrap()
            .retain(|d| d.name != domain.as_str());
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }
}

/// A storage backend that records calls
#[derive(Clone)]
pub struct RecordingStorage {
    journal: Journal,
    faults: Faults,
}

impl RecordingStorage {
    pub fn new(journal: Journal, faults: Faults) -> Self {
        Self { journal, faults }
    }
}

#[async_trait]
impl StorageBackend for RecordingStorage {
    async fn create_volume(&self, name: &str, size: u64) -> Result<()> {
        self.journal.record(Call::CreateVolume {
            name: name.to_string(),
            size,
        });
        self.faults.check("create_volume")
    }

    async fn clone_volume(&self, source: &str, dest: &str) -> Result<()> {
        self.journal.record(Call::CloneVolume {
            source: source.to_string(),
            dest: dest.to_string(),
        });
        self.faults.check("clone_volume")
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        self.journal.record(Call::RemoveVolume(name.to_string()));
        self.faults.check("remove_volume")
    }

    fn block_device_path(&self, name: &str) -> String {
        format!("/dev/{}/{}", VOLUME_GROUP, name)
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }
}

/// A DNS backend that records calls
#[derive(Clone)]
pub struct RecordingDns {
    journal: Journal,
    faults: Faults,
}

impl RecordingDns {
    pub fn new(journal: Journal, faults: Faults) -> Self {
        Self { journal, faults }
    }
}

#[async_trait]
impl DnsBackend for RecordingDns {
    async fn upsert_record(
        &self,
        fqdn: &str,
        record_type: RecordType,
        ttl: u32,
        values: &[String],
    ) -> Result<()> {
        self.journal.record(Call::UpsertRecord {
            fqdn: fqdn.to_string(),
            record_type,
            ttl,
            values: values.to_vec(),
        });
        self.faults.check("upsert_record")
    }

    async fn delete_record(
        &self,
        fqdn: &str,
        record_type: RecordType,
        ttl: u32,
        values: &[String],
    ) -> Result<()> {
        self.journal.record(Call::DeleteRecord {
            fqdn: fqdn.to_string(),
            record_type,
            ttl,
            values: values.to_vec(),
        });
        self.faults.check("delete_record")
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }
}

/// Domain description as the hypervisor would report it
pub fn domain_xml(name: &str, ip: Option<&str>, macs: &[&str]) -> String {
    let metadata = ip
        .map(|ip| {
            format!(
                r#"<metadata><vmregistry:vmregistry xmlns:vmregistry="https://github.com/vmregistry/vmregistry"><vmregistry:ip>{}</vmregistry:ip></vmregistry:vmregistry></metadata>"#,
                ip
            )
        })
        .unwrap_or_default();
    let interfaces: String = macs
        .iter()
        .map(|mac| format!(r#"<interface type="bridge"><mac address="{}"/></interface>"#, mac))
        .collect();

    format!(
        "<domain type=\"kvm\"><name>{}</name>{}<devices>{}</devices></domain>",
        name, metadata, interfaces
    )
}

/// Orchestrator wired to recording backends
pub struct Fixture {
    pub journal: Journal,
    pub faults: Faults,
    pub compute: RecordingCompute,
    pub orchestrator: Orchestrator,
}

impl Fixture {
    pub fn new(subnet: &str) -> Self {
        Self::with_settings(subnet, OrchestratorSettings::default())
    }

    pub fn with_settings(subnet: &str, settings: OrchestratorSettings) -> Self {
        let journal = Journal::default();
        let faults = Faults::default();
        let compute = RecordingCompute::new(journal.clone(), faults.clone());

        let orchestrator = Orchestrator::new(
            Arc::new(compute.clone()),
            Arc::new(RecordingStorage::new(journal.clone(), faults.clone())),
            Arc::new(RecordingDns::new(journal.clone(), faults.clone())),
            DomainTemplate::new(TEMPLATE).expect("template is valid"),
            subnet.parse().expect("subnet is valid"),
            ZONE,
            settings,
        )
        .expect("orchestrator construction succeeds");

        Self {
            journal,
            faults,
            compute,
            orchestrator,
        }
    }

    /// Seed a running VM with one interface
    pub fn with_vm(self, name: &str, ip: &str, mac: &str) -> Self {
        self.compute.seed(name, domain_xml(name, Some(ip), &[mac]));
        self
    }
}
