// # vmregistryd - VM Registry Daemon
//
// The daemon is a thin integration layer. All lifecycle logic lives in
// vmregistry-core; this binary is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Registering backends and building the orchestrator
// 4. Reporting the current inventory and waiting for shutdown
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Compute
// - `VMREGISTRY_COMPUTE_TYPE`: Backend type (libvirt, memory)
// - `VMREGISTRY_LIBVIRT_URI`: Hypervisor URI (default: qemu:///system)
//
// ### Storage
// - `VMREGISTRY_STORAGE_TYPE`: Backend type (lvm, memory)
// - `VMREGISTRY_VM_VG`: Volume group holding VM disks and source images
// - `VMREGISTRY_LVM_MIRRORS`: Mirror count for new volumes (default: 0)
//
// ### DNS
// - `VMREGISTRY_DNS_TYPE`: Backend type (powerdns, memory)
// - `VMREGISTRY_PDNS_API_URL`: PowerDNS API base URL
// - `VMREGISTRY_PDNS_SERVER`: PowerDNS server id (default: localhost)
// - `VMREGISTRY_PDNS_ZONE`: Zone hosting VM records
// - `VMREGISTRY_PDNS_API_KEY`: PowerDNS API key
//
// ### Orchestrator
// - `VMREGISTRY_VM_NET`: Subnet VM addresses are drawn from (CIDR)
// - `VMREGISTRY_VM_TEMPLATE_FILE`: Domain XML template
// - `VMREGISTRY_DNS_TTL`: TTL for VM records (default: 300)
// - `VMREGISTRY_ADDRESS_ATTEMPTS`: Allocation attempts (default: 10)
//
// ## Example
//
// ```bash
// export VMREGISTRY_LIBVIRT_URI=qemu:///system
// export VMREGISTRY_VM_VG=vms
// export VMREGISTRY_VM_NET=10.0.0.0/24
// export VMREGISTRY_VM_TEMPLATE_FILE=/etc/vmregistry/domain.xml
// export VMREGISTRY_PDNS_API_URL=http://127.0.0.1:8081
// export VMREGISTRY_PDNS_ZONE=vm.example.com
// export VMREGISTRY_PDNS_API_KEY=secret
//
// vmregistryd
// ```

use anyhow::{Context, Result};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;
use vmregistry_core::{
    BackendRegistry, ComputeConfig, DnsConfig, DomainTemplate, NetworkConfig, Orchestrator,
    OrchestratorSettings, RegistryConfig, StorageConfig, Subnet, TemplateConfig,
};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum VmRegistryExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<VmRegistryExitCode> for ExitCode {
    fn from(code: VmRegistryExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    registry: RegistryConfig,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from a variable lookup
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let required = |key: &str| {
            var(key).with_context(|| format!("{} is required. Set it via: export {}=...", key, key))
        };

        let compute = match var("VMREGISTRY_COMPUTE_TYPE").as_deref().unwrap_or("libvirt") {
            "libvirt" => ComputeConfig::Libvirt {
                uri: var("VMREGISTRY_LIBVIRT_URI").unwrap_or_else(|| "qemu:///system".to_string()),
            },
            "memory" => ComputeConfig::Memory,
            other => anyhow::bail!(
                "VMREGISTRY_COMPUTE_TYPE '{}' is not supported. Supported types: libvirt, memory",
                other
            ),
        };

        let volume_group = required("VMREGISTRY_VM_VG")?;
        let storage = match var("VMREGISTRY_STORAGE_TYPE").as_deref().unwrap_or("lvm") {
            "lvm" => StorageConfig::Lvm {
                volume_group,
                mirrors: parse_or("VMREGISTRY_LVM_MIRRORS", var("VMREGISTRY_LVM_MIRRORS"), 0)?,
            },
            "memory" => StorageConfig::Memory { volume_group },
            other => anyhow::bail!(
                "VMREGISTRY_STORAGE_TYPE '{}' is not supported. Supported types: lvm, memory",
                other
            ),
        };

        let zone = required("VMREGISTRY_PDNS_ZONE")?;
        let dns = match var("VMREGISTRY_DNS_TYPE").as_deref().unwrap_or("powerdns") {
            "powerdns" => DnsConfig::PowerDns {
                api_url: required("VMREGISTRY_PDNS_API_URL")?,
                server: var("VMREGISTRY_PDNS_SERVER").unwrap_or_else(|| "localhost".to_string()),
                zone,
                api_key: required("VMREGISTRY_PDNS_API_KEY")?,
            },
            "memory" => DnsConfig::Memory { zone },
            other => anyhow::bail!(
                "VMREGISTRY_DNS_TYPE '{}' is not supported. Supported types: powerdns, memory",
                other
            ),
        };

        let subnet: Subnet = required("VMREGISTRY_VM_NET")?
            .parse()
            .context("VMREGISTRY_VM_NET must be an IPv4 CIDR such as 10.0.0.0/24")?;

        let defaults = OrchestratorSettings::default();
        let orchestrator = OrchestratorSettings {
            dns_ttl: parse_or("VMREGISTRY_DNS_TTL", var("VMREGISTRY_DNS_TTL"), defaults.dns_ttl)?,
            address_attempts: parse_or(
                "VMREGISTRY_ADDRESS_ATTEMPTS",
                var("VMREGISTRY_ADDRESS_ATTEMPTS"),
                defaults.address_attempts,
            )?,
        };

        Ok(Self {
            registry: RegistryConfig {
                compute,
                storage,
                dns,
                network: NetworkConfig { subnet },
                template: TemplateConfig {
                    path: required("VMREGISTRY_VM_TEMPLATE_FILE")?,
                },
                orchestrator,
            },
            log_level: var("VMREGISTRY_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        self.registry.validate()?;

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "VMREGISTRY_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }
}

/// Parse an optional numeric variable, falling back to `default` when unset
fn parse_or<T: std::str::FromStr>(key: &str, value: Option<String>, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} must be a non-negative integer. Got {:?}: {}", key, raw, e)),
        None => Ok(default),
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return VmRegistryExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return VmRegistryExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return VmRegistryExitCode::ConfigError.into();
    }

    info!("Starting vmregistryd daemon");

    let orchestrator = match build_orchestrator(&config.registry) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!("Startup failed: {:#}", e);
            return VmRegistryExitCode::ConfigError.into();
        }
    };

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return VmRegistryExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(orchestrator).await {
            error!("Daemon error: {:#}", e);
            VmRegistryExitCode::RuntimeError
        } else {
            VmRegistryExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Register every backend compiled into this binary
fn backend_registry() -> BackendRegistry {
    let registry = BackendRegistry::new();
    vmregistry_core::backends::register(&registry);

    info!("Registering libvirt compute backend");
    vmregistry_compute_libvirt::register(&registry);

    #[cfg(feature = "lvm")]
    {
        info!("Registering LVM storage backend");
        vmregistry_storage_lvm::register(&registry);
    }

    #[cfg(feature = "powerdns")]
    {
        info!("Registering PowerDNS backend");
        vmregistry_dns_powerdns::register(&registry);
    }

    registry
}

/// Create backends from configuration and wire them into an orchestrator
fn build_orchestrator(config: &RegistryConfig) -> Result<Orchestrator> {
    let registry = backend_registry();

    info!("Compute backend: {}", config.compute.type_name());
    info!("Storage backend: {}", config.storage.type_name());
    info!("DNS backend: {}", config.dns.type_name());

    let compute = registry
        .create_compute(&config.compute)
        .context("failed to create compute backend")?;
    let storage = registry
        .create_storage(&config.storage)
        .context("failed to create storage backend")?;
    let dns = registry
        .create_dns(&config.dns)
        .context("failed to create DNS backend")?;
    let template = DomainTemplate::from_file(&config.template.path)?;

    let orchestrator = Orchestrator::new(
        Arc::from(compute),
        Arc::from(storage),
        Arc::from(dns),
        template,
        config.network.subnet,
        config.dns.zone(),
        config.orchestrator.clone(),
    )?;

    info!(
        subnet = %orchestrator.subnet(),
        zone = %orchestrator.zone(),
        "Orchestrator initialized"
    );
    Ok(orchestrator)
}

/// Run the daemon
async fn run_daemon(orchestrator: Orchestrator) -> Result<()> {
    let records = orchestrator
        .list()
        .await
        .context("failed to read startup inventory")?;

    info!("Managing {} VM(s)", records.len());
    for record in &records {
        info!(name = %record.name, ip = %record.ip, mac = %record.mac, "VM");
    }

    info!("Daemon initialized successfully");

    let signal = wait_for_shutdown().await?;
    info!("Received shutdown signal: {}", signal);
    info!("Shutting down daemon");

    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let signal = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(signal)
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
