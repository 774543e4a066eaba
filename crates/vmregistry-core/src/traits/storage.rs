// # Storage Backend Trait
//
// Defines the logical-volume operations backing VM disks.
//
// ## Implementations
//
// - LVM: `vmregistry-storage-lvm` crate
// - In-memory: `vmregistry_core::backends::MemoryStorage`
//
// Volumes live in a single volume group fixed by configuration. A VM's
// volume carries the VM's name, and its block-device path is a pure
// function of group and name.

use async_trait::async_trait;

/// Trait for storage backends
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Create an empty volume of `size` bytes
    async fn create_volume(&self, name: &str, size: u64) -> Result<(), crate::Error>;

    /// Copy the contents of volume `source` onto volume `dest`
    ///
    /// Both volumes must already exist in the configured group.
    async fn clone_volume(&self, source: &str, dest: &str) -> Result<(), crate::Error>;

    /// Remove a volume
    async fn remove_volume(&self, name: &str) -> Result<(), crate::Error>;

    /// Block-device path of a volume (`/dev/<group>/<name>`)
    ///
    /// Must not perform I/O.
    fn block_device_path(&self, name: &str) -> String;

    /// Backend name (for logging)
    fn backend_name(&self) -> &'static str;
}

/// Helper trait for constructing storage backends from configuration
pub trait StorageBackendFactory: Send + Sync {
    /// Create a StorageBackend instance from configuration
    fn create(
        &self,
        config: &crate::config::StorageConfig,
    ) -> Result<Box<dyn StorageBackend>, crate::Error>;
}

/// Block-device path convention shared by volume-group backends
pub fn volume_group_path(volume_group: &str, name: &str) -> String {
    format!("/dev/{}/{}", volume_group, name)
}
