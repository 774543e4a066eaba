// # vmregistry-core
//
// Core library for the vmregistry VM lifecycle service.
//
// ## Architecture Overview
//
// This library provides the lifecycle logic behind the registry's RPC
// surface:
// - **ComputeBackend**: Trait for hypervisor domain operations
// - **StorageBackend**: Trait for logical volumes backing VM disks
// - **DnsBackend**: Trait for publishing VM A records
// - **Orchestrator**: Sequences create/destroy and answers list/find
// - **Inventory**: Rebuilds VM records from hypervisor state
// - **BackendRegistry**: Plugin-based registry for backend factories
//
// ## Design Principles
//
// 1. **Hypervisor as source of truth**: No registry database; every query
//    re-reads domain descriptions
// 2. **No rollback**: Aborted sequences report the resources they committed
// 3. **Plugin-Based**: Backends are registered dynamically, no hard-coded if-else
// 4. **Library-First**: All core functionality can be used as a library

pub mod backends;
pub mod codec;
pub mod config;
pub mod error;
pub mod inventory;
pub mod network;
pub mod orchestrator;
pub mod registry;
pub mod traits;
pub mod types;

// Re-export core types for convenience
pub use codec::{DomainInfo, DomainTemplate};
pub use config::{
    ComputeConfig, DnsConfig, NetworkConfig, OrchestratorSettings, RegistryConfig, StorageConfig,
    TemplateConfig,
};
pub use error::{Error, Result};
pub use inventory::Inventory;
pub use network::Subnet;
pub use orchestrator::{Commit, Orchestrator, Step};
pub use registry::BackendRegistry;
pub use traits::{ComputeBackend, DnsBackend, DomainHandle, RecordType, StorageBackend};
pub use types::{CreateRequest, FindBy, PLACEHOLDER_MAC, VmRecord};

// Cancellation tokens accepted by the `*_with_cancel` operations
pub use tokio_util::sync::CancellationToken;
