// # Built-in Backends
//
// Backends that ship with the core crate. External hypervisor, storage and
// DNS integrations live in their own crates and register themselves the
// same way.

pub mod memory;

pub use memory::{
    MemoryCompute, MemoryComputeFactory, MemoryDns, MemoryDnsFactory, MemoryStorage,
    MemoryStorageFactory,
};

use crate::registry::BackendRegistry;

/// Register the in-memory backends under the `"memory"` type name
pub fn register(registry: &BackendRegistry) {
    registry.register_compute("memory", Box::new(MemoryComputeFactory));
    registry.register_storage("memory", Box::new(MemoryStorageFactory));
    registry.register_dns("memory", Box::new(MemoryDnsFactory));
}
