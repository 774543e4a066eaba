//! Configuration types for vmregistry
//!
//! Every value is supplied at process start and stays fixed for the
//! lifetime of the orchestrator.

use crate::network::Subnet;
use serde::{Deserialize, Serialize};

/// Main vmregistry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Compute backend configuration
    pub compute: ComputeConfig,

    /// Storage backend configuration
    pub storage: StorageConfig,

    /// DNS backend configuration
    pub dns: DnsConfig,

    /// VM address pool
    pub network: NetworkConfig,

    /// Domain description template
    pub template: TemplateConfig,

    /// Optional orchestrator settings
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,
}

impl RegistryConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.compute.validate()?;
        self.storage.validate()?;
        self.dns.validate()?;
        self.network.validate()?;
        self.template.validate()?;
        self.orchestrator.validate()?;
        Ok(())
    }
}

/// Compute backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComputeConfig {
    /// libvirt connection
    Libvirt {
        /// Connection URI (e.g., "qemu:///system")
        uri: String,
    },

    /// In-memory hypervisor (nothing is booted)
    Memory,

    /// Custom compute backend
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ComputeConfig {
    /// Validate the compute configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ComputeConfig::Libvirt { uri } => {
                if uri.is_empty() {
                    return Err(crate::Error::config("libvirt URI cannot be empty"));
                }
                Ok(())
            }
            ComputeConfig::Custom { factory, .. } => validate_factory("compute", factory),
            ComputeConfig::Memory => Ok(()),
        }
    }

    /// Get the backend type name
    pub fn type_name(&self) -> &str {
        match self {
            ComputeConfig::Libvirt { .. } => "libvirt",
            ComputeConfig::Memory => "memory",
            ComputeConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageConfig {
    /// LVM volume group driven through the LVM command-line tools
    Lvm {
        /// Volume group holding VM disks and source images
        volume_group: String,
        /// Mirror count for new volumes, 0 to disable
        #[serde(default)]
        mirrors: u32,
    },

    /// In-memory volumes (nothing is written)
    Memory {
        /// Volume group used for block-device paths
        volume_group: String,
    },

    /// Custom storage backend
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl StorageConfig {
    /// Validate the storage configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StorageConfig::Lvm { volume_group, .. } | StorageConfig::Memory { volume_group } => {
                if volume_group.is_empty() {
                    return Err(crate::Error::config("volume group cannot be empty"));
                }
                if volume_group.contains('/') {
                    return Err(crate::Error::config(format!(
                        "volume group must be a bare name, got {:?}",
                        volume_group
                    )));
                }
                Ok(())
            }
            StorageConfig::Custom { factory, .. } => validate_factory("storage", factory),
        }
    }

    /// Get the backend type name
    pub fn type_name(&self) -> &str {
        match self {
            StorageConfig::Lvm { .. } => "lvm",
            StorageConfig::Memory { .. } => "memory",
            StorageConfig::Custom { factory, .. } => factory,
        }
    }
}

/// DNS backend configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DnsConfig {
    /// PowerDNS authoritative server HTTP API
    #[serde(rename = "powerdns")]
    PowerDns {
        /// API base URL (e.g., "http://127.0.0.1:8081")
        api_url: String,
        /// Server id in the API path
        #[serde(default = "default_powerdns_server")]
        server: String,
        /// Zone hosting VM records
        zone: String,
        /// API key
        /// ⚠️ NEVER log this value
        api_key: String,
    },

    /// In-memory zone
    Memory {
        /// Zone hosting VM records
        zone: String,
    },

    /// Custom DNS backend
    Custom {
        /// Factory name to use
        factory: String,
        /// Zone hosting VM records
        zone: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl DnsConfig {
    /// Validate the DNS configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.zone().trim_end_matches('.').is_empty() {
            return Err(crate::Error::config("DNS zone cannot be empty"));
        }

        match self {
            DnsConfig::PowerDns {
                api_url, api_key, ..
            } => {
                if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
                    return Err(crate::Error::config(format!(
                        "PowerDNS API URL must use HTTP or HTTPS scheme. Got: {}",
                        api_url
                    )));
                }
                if api_key.is_empty() {
                    return Err(crate::Error::config("PowerDNS API key cannot be empty"));
                }
                Ok(())
            }
            DnsConfig::Custom { factory, .. } => validate_factory("DNS", factory),
            DnsConfig::Memory { .. } => Ok(()),
        }
    }

    /// Zone hosting VM records, as configured
    pub fn zone(&self) -> &str {
        match self {
            DnsConfig::PowerDns { zone, .. }
            | DnsConfig::Memory { zone }
            | DnsConfig::Custom { zone, .. } => zone,
        }
    }

    /// Get the backend type name
    pub fn type_name(&self) -> &str {
        match self {
            DnsConfig::PowerDns { .. } => "powerdns",
            DnsConfig::Memory { .. } => "memory",
            DnsConfig::Custom { factory, .. } => factory,
        }
    }
}

// Custom Debug implementation that hides the API key
impl std::fmt::Debug for DnsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DnsConfig::PowerDns {
                api_url,
                server,
                zone,
                ..
            } => f
                .debug_struct("PowerDns")
                .field("api_url", api_url)
                .field("server", server)
                .field("zone", zone)
                .field("api_key", &"<REDACTED>")
                .finish(),
            DnsConfig::Memory { zone } => f.debug_struct("Memory").field("zone", zone).finish(),
            DnsConfig::Custom {
                factory,
                zone,
                config,
            } => f
                .debug_struct("Custom")
                .field("factory", factory)
                .field("zone", zone)
                .field("config", config)
                .finish(),
        }
    }
}

/// VM address pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Subnet VM addresses are drawn from
    pub subnet: Subnet,
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.subnet.validate()
    }
}

/// Domain template configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Path to the domain XML template file
    pub path: String,
}

impl TemplateConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.path.is_empty() {
            return Err(crate::Error::config("VM template path cannot be empty"));
        }
        Ok(())
    }
}

/// Orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    /// TTL for VM A records (in seconds)
    #[serde(default = "default_dns_ttl")]
    pub dns_ttl: u32,

    /// Candidate addresses tried before giving up on allocation
    #[serde(default = "default_address_attempts")]
    pub address_attempts: usize,
}

impl OrchestratorSettings {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.dns_ttl == 0 {
            return Err(crate::Error::config("DNS TTL must be > 0"));
        }
        if self.address_attempts == 0 {
            return Err(crate::Error::config("address attempts must be > 0"));
        }
        Ok(())
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            dns_ttl: default_dns_ttl(),
            address_attempts: default_address_attempts(),
        }
    }
}

fn validate_factory(kind: &str, factory: &str) -> Result<(), crate::Error> {
    if factory.is_empty() {
        return Err(crate::Error::config(format!(
            "Custom {} backend factory cannot be empty",
            kind
        )));
    }
    Ok(())
}

fn default_powerdns_server() -> String {
    "localhost".to_string()
}

fn default_dns_ttl() -> u32 {
    300
}

fn default_address_attempts() -> usize {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RegistryConfig {
        RegistryConfig {
            compute: ComputeConfig::Libvirt {
                uri: "qemu:///system".to_string(),
            },
            storage: StorageConfig::Lvm {
                volume_group: "vms".to_string(),
                mirrors: 0,
            },
            dns: DnsConfig::PowerDns {
                api_url: "http://127.0.0.1:8081".to_string(),
                server: default_powerdns_server(),
                zone: "vms.example.com".to_string(),
                api_key: "secret-key".to_string(),
            },
            network: NetworkConfig {
                subnet: "10.0.0.0/24".parse().unwrap(),
            },
            template: TemplateConfig {
                path: "/etc/vmregistry/vm.xml".to_string(),
            },
            orchestrator: OrchestratorSettings::default(),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn defaults() {
        let settings = OrchestratorSettings::default();
        assert_eq!(settings.dns_ttl, 300);
        assert_eq!(settings.address_attempts, 10);
    }

    #[test]
    fn rejects_empty_fields() {
        let mut cfg = config();
        cfg.compute = ComputeConfig::Libvirt { uri: String::new() };
        assert!(cfg.validate().is_err());

        let mut cfg = config();
        cfg.storage = StorageConfig::Lvm {
            volume_group: String::new(),
            mirrors: 0,
        };
        assert!(cfg.validate().is_err());

        let mut cfg = config();
        cfg.dns = DnsConfig::Memory {
            zone: ".".to_string(),
        };
        assert!(cfg.validate().is_err());

        let mut cfg = config();
        cfg.network.subnet = "10.0.0.0/31".parse().unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_bad_powerdns_url() {
        let mut cfg = config();
        cfg.dns = DnsConfig::PowerDns {
            api_url: "ftp://dns".to_string(),
            server: default_powerdns_server(),
            zone: "example.com".to_string(),
            api_key: "k".to_string(),
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn deserializes_tagged_backends() {
        let json = serde_json::json!({
            "compute": { "type": "memory" },
            "storage": { "type": "lvm", "volume_group": "vms" },
            "dns": {
                "type": "powerdns",
                "api_url": "http://127.0.0.1:8081",
                "zone": "example.com",
                "api_key": "k"
            },
            "network": { "subnet": "10.0.0.0/24" },
            "template": { "path": "/etc/vmregistry/vm.xml" }
        });

        let cfg: RegistryConfig = serde_json::from_value(json).unwrap();
        assert_eq!(cfg.compute.type_name(), "memory");
        assert_eq!(cfg.storage.type_name(), "lvm");
        assert_eq!(cfg.dns.type_name(), "powerdns");
        assert_eq!(cfg.dns.zone(), "example.com");
        assert_eq!(cfg.orchestrator.dns_ttl, 300);
        match cfg.dns {
            DnsConfig::PowerDns { server, .. } => assert_eq!(server, "localhost"),
            _ => panic!("expected powerdns"),
        }
    }

    #[test]
    fn api_key_not_exposed_in_debug() {
        let cfg = config();
        let debug_str = format!("{:?}", cfg);
        assert!(!debug_str.contains("secret-key"));
        assert!(debug_str.contains("vms.example.com"));
    }
}
