//! Backend traits consumed by the orchestrator
//!
//! - [`ComputeBackend`]: hypervisor domain lifecycle and enumeration
//! - [`StorageBackend`]: logical volumes backing VM disks
//! - [`DnsBackend`]: A records for VM names

pub mod compute;
pub mod dns;
pub mod storage;

pub use compute::{ComputeBackend, ComputeBackendFactory, DomainHandle};
pub use dns::{DnsBackend, DnsBackendFactory, RecordType};
pub use storage::{StorageBackend, StorageBackendFactory};
