// # LVM Storage Backend
//
// Provides VM disks as logical volumes in one volume group, driven through
// the LVM command-line tools.
//
// ## Commands
//
// | Operation       | Command                                                        |
// |-----------------|----------------------------------------------------------------|
// | create_volume   | `lvcreate --yes --name <n> --size <bytes>b --addtag vm [--mirrors N] <vg>` |
// | clone_volume    | `dd if=/dev/<vg>/<src> of=/dev/<vg>/<dest> bs=4M conv=fsync`   |
// | remove_volume   | `lvremove --force <vg>/<n>`                                    |
//
// The process needs the privileges the LVM tools require (usually root).
// Commands run once; a non-zero exit status becomes a backend error
// carrying stderr.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info};
use vmregistry_core::config::StorageConfig;
use vmregistry_core::traits::storage::volume_group_path;
use vmregistry_core::traits::{StorageBackend, StorageBackendFactory};
use vmregistry_core::{Error, Result};

const BACKEND: &str = "lvm";

/// Tag attached to every volume created for a VM
pub const VM_TAG: &str = "vm";

/// LVM storage backend
#[derive(Debug, Clone)]
pub struct LvmStorage {
    /// Volume group holding VM disks and source images
    volume_group: String,

    /// Mirror count for new volumes, 0 to disable
    mirrors: u32,
}

impl LvmStorage {
    /// Create a new LVM backend
    ///
    /// # Errors
    ///
    /// `Config` if the volume group name is empty or contains a path separator.
    pub fn new(volume_group: impl Into<String>, mirrors: u32) -> Result<Self> {
        let volume_group = volume_group.into();
        if volume_group.is_empty() || volume_group.contains('/') {
            return Err(Error::config(format!(
                "invalid LVM volume group name: {:?}",
                volume_group
            )));
        }
        Ok(Self {
            volume_group,
            mirrors,
        })
    }

    pub fn volume_group(&self) -> &str {
        &self.volume_group
    }

    fn create_args(&self, name: &str, size: u64) -> Vec<String> {
        let mut args = vec![
            "--yes".to_string(),
            "--name".to_string(),
            name.to_string(),
            "--size".to_string(),
            format!("{}b", size),
            "--addtag".to_string(),
            VM_TAG.to_string(),
        ];
        if self.mirrors > 0 {
            args.push("--mirrors".to_string());
            args.push(self.mirrors.to_string());
        }
        args.push(self.volume_group.clone());
        args
    }

    fn clone_args(&self, source: &str, dest: &str) -> Vec<String> {
        vec![
            format!("if={}", self.block_device_path(source)),
            format!("of={}", self.block_device_path(dest)),
            "bs=4M".to_string(),
            "conv=fsync".to_string(),
        ]
    }

    fn remove_args(&self, name: &str) -> Vec<String> {
        vec![
            "--force".to_string(),
            format!("{}/{}", self.volume_group, name),
        ]
    }
}

/// Reject names LVM would misread as options or paths
fn check_volume_name(name: &str) -> Result<()> {
    if name.is_empty() || name.starts_with('-') || name.contains('/') || name == "." || name == ".." {
        return Err(Error::invalid_argument(format!(
            "invalid logical volume name: {:?}",
            name
        )));
    }
    Ok(())
}

/// Run a command and return its stdout
async fn run_cmd(cmd: &str, args: &[String]) -> Result<String> {
    debug!(command = %cmd, args = ?args, "Executing command");

    let output = Command::new(cmd)
        .args(args)
        .output()
        .await
        .map_err(|e| Error::unavailable(BACKEND, format!("Failed to execute {}: {}", cmd, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!(command = %cmd, status = %output.status, stderr = %stderr.trim(), "Command failed");
        return Err(Error::backend(
            BACKEND,
            format!("{} failed ({}): {}", cmd, output.status, stderr.trim()),
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[async_trait]
impl StorageBackend for LvmStorage {
    async fn create_volume(&self, name: &str, size: u64) -> Result<()> {
        check_volume_name(name)?;
        run_cmd("lvcreate", &self.create_args(name, size)).await?;
        info!(volume_group = %self.volume_group, volume = name, size, "Logical volume created");
        Ok(())
    }

    async fn clone_volume(&self, source: &str, dest: &str) -> Result<()> {
        check_volume_name(source)?;
        check_volume_name(dest)?;
        run_cmd("dd", &self.clone_args(source, dest)).await?;
        info!(volume_group = %self.volume_group, source, dest, "Logical volume cloned");
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        check_volume_name(name)?;
        run_cmd("lvremove", &self.remove_args(name)).await?;
        info!(volume_group = %self.volume_group, volume = name, "Logical volume removed");
        Ok(())
    }

    fn block_device_path(&self, name: &str) -> String {
        volume_group_path(&self.volume_group, name)
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}

/// Factory for creating LVM storage backends
pub struct LvmStorageFactory;

impl StorageBackendFactory for LvmStorageFactory {
    fn create(&self, config: &StorageConfig) -> Result<Box<dyn StorageBackend>> {
        match config {
            StorageConfig::Lvm {
                volume_group,
                mirrors,
            } => Ok(Box::new(LvmStorage::new(volume_group.clone(), *mirrors)?)),
            _ => Err(Error::config("Invalid config for LVM storage backend")),
        }
    }
}

/// Register the LVM backend with a registry
pub fn register(registry: &vmregistry_core::BackendRegistry) {
    registry.register_storage(BACKEND, Box::new(LvmStorageFactory));
}
