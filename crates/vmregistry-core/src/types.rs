//! Request and record types exchanged with the RPC layer

use serde::{Deserialize, Serialize};

/// MAC value returned by `create` until interface metadata can be queried
pub const PLACEHOLDER_MAC: &str = "FIXME";

/// The registry's view of a VM
///
/// Records are rebuilt from hypervisor state on every query and are only
/// as fresh as the listing that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmRecord {
    /// Hypervisor-assigned domain name
    pub name: String,
    /// Dotted-decimal IPv4 address, empty if the domain carries none
    pub ip: String,
    /// First interface MAC address, empty if the domain has no interface
    pub mac: String,
}

impl VmRecord {
    pub fn new(name: impl Into<String>, ip: impl Into<String>, mac: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ip: ip.into(),
            mac: mac.into(),
        }
    }
}

/// Parameters for creating a VM
///
/// Zero or empty values mean "not specified" and are rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRequest {
    /// Domain and volume name
    pub name: String,
    /// Memory in bytes
    pub memory: u64,
    /// Virtual CPU count
    pub cores: u32,
    /// Disk size in bytes
    pub size: u64,
    /// Source image volume to clone
    pub source_image: String,
}

impl CreateRequest {
    pub fn new(
        name: impl Into<String>,
        memory: u64,
        cores: u32,
        size: u64,
        source_image: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            memory,
            cores,
            size,
            source_image: source_image.into(),
        }
    }

    /// Reject requests with any unset field
    pub fn validate(&self) -> crate::Result<()> {
        if self.name.is_empty() {
            return Err(crate::Error::invalid_argument("name not specified"));
        }
        if self.memory == 0 {
            return Err(crate::Error::invalid_argument("memory not specified"));
        }
        if self.cores == 0 {
            return Err(crate::Error::invalid_argument("cores not specified"));
        }
        if self.size == 0 {
            return Err(crate::Error::invalid_argument("size not specified"));
        }
        if self.source_image.is_empty() {
            return Err(crate::Error::invalid_argument("source image not specified"));
        }
        Ok(())
    }
}

/// Search criterion for point lookups
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindBy {
    /// No criterion given; always rejected
    #[default]
    Unspecified,
    /// Match on the metadata IP
    Ip,
    /// Match on the first interface MAC
    Mac,
}

impl FindBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindBy::Unspecified => "unspecified",
            FindBy::Ip => "ip",
            FindBy::Mac => "mac",
        }
    }

    /// Whether `record` matches `value` under this criterion
    pub fn matches(self, record: &VmRecord, value: &str) -> bool {
        match self {
            FindBy::Unspecified => false,
            FindBy::Ip => record.ip == value,
            FindBy::Mac => record.mac.eq_ignore_ascii_case(value),
        }
    }
}

impl std::fmt::Display for FindBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_each_missing_field() {
        let valid = CreateRequest::new("vm1", 1 << 30, 2, 3 << 30, "ubuntu-20.04");
        assert!(valid.validate().is_ok());

        let cases = [
            CreateRequest { name: String::new(), ..valid.clone() },
            CreateRequest { memory: 0, ..valid.clone() },
            CreateRequest { cores: 0, ..valid.clone() },
            CreateRequest { size: 0, ..valid.clone() },
            CreateRequest { source_image: String::new(), ..valid.clone() },
        ];

        for request in cases {
            assert!(matches!(
                request.validate(),
                Err(crate::Error::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn find_by_matching() {
        let record = VmRecord::new("vm1", "10.0.0.5", "52:54:00:aa:bb:cc");
        assert!(FindBy::Ip.matches(&record, "10.0.0.5"));
        assert!(!FindBy::Ip.matches(&record, "10.0.0.6"));
        assert!(FindBy::Mac.matches(&record, "52:54:00:AA:BB:CC"));
        assert!(!FindBy::Unspecified.matches(&record, "10.0.0.5"));
    }
}
