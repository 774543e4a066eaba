// # libvirt Compute Backend
//
// This crate provides a libvirt-based compute backend for vmregistry.
//
// ## Build Requirements
//
// The backend links against the system libvirt library through the `virt`
// crate, so it is only compiled with the `libvirt` feature. Without the
// feature the factory still registers and reports a configuration error,
// so a daemon built without libvirt fails at startup instead of silently
// falling back to another backend.
//
// ## Domain Handles
//
// Handles are domain UUIDs. Names can be reused after a domain is
// undefined; UUIDs cannot, so a handle never silently points at a
// different domain.
//
// ## Blocking
//
// libvirt calls are synchronous and run on the calling task. Each call is
// a single round trip to the local daemon.

use vmregistry_core::config::ComputeConfig;
use vmregistry_core::traits::{ComputeBackend, ComputeBackendFactory};
use vmregistry_core::{Error, Result};

#[cfg(feature = "libvirt")]
mod backend;

#[cfg(feature = "libvirt")]
pub use backend::LibvirtCompute;

const BACKEND: &str = "libvirt";

/// Factory for creating libvirt compute backends
///
/// Opens the connection eagerly so configuration mistakes surface at
/// startup.
pub struct LibvirtComputeFactory;

impl ComputeBackendFactory for LibvirtComputeFactory {
    fn create(&self, config: &ComputeConfig) -> Result<Box<dyn ComputeBackend>> {
        match config {
            ComputeConfig::Libvirt { uri } => {
                if uri.is_empty() {
                    return Err(Error::config("libvirt URI is required"));
                }
                connect(uri)
            }
            _ => Err(Error::config("Invalid config for libvirt compute backend")),
        }
    }
}

#[cfg(feature = "libvirt")]
fn connect(uri: &str) -> Result<Box<dyn ComputeBackend>> {
    Ok(Box::new(LibvirtCompute::connect(uri)?))
}

#[cfg(not(feature = "libvirt"))]
fn connect(uri: &str) -> Result<Box<dyn ComputeBackend>> {
    Err(Error::config(format!(
        "cannot connect to {}: vmregistry was built without libvirt support (enable the `libvirt` feature)",
        uri
    )))
}

/// Register the libvirt backend with a registry
pub fn register(registry: &vmregistry_core::BackendRegistry) {
    registry.register_compute(BACKEND, Box::new(LibvirtComputeFactory));
}
