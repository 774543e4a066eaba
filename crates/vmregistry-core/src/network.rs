//! Subnet address generation
//!
//! Candidates are drawn uniformly at random from the subnet's host range.
//! Generation does not reserve anything: the orchestrator confirms each
//! candidate against live inventory, and two concurrent creations can still
//! pick the same address between that check and domain definition.

use crate::error::{Error, Result};
use ipnetwork::Ipv4Network;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Largest prefix that still leaves two usable host addresses
pub const MAX_PREFIX: u8 = 30;

/// The IPv4 address pool VMs are allocated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Subnet(Ipv4Network);

impl Subnet {
    /// Build a subnet from a network address and prefix length
    ///
    /// Host bits in `addr` are cleared.
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Result<Self> {
        let network = Ipv4Network::new(addr, prefix)
            .map_err(|e| Error::config(format!("invalid subnet {}/{}: {}", addr, prefix, e)))?;
        let network = Ipv4Network::new(network.network(), prefix)
            .map_err(|e| Error::config(format!("invalid subnet {}/{}: {}", addr, prefix, e)))?;
        Ok(Self(network))
    }

    pub fn network(&self) -> Ipv4Addr {
        self.0.network()
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        self.0.broadcast()
    }

    pub fn prefix(&self) -> u8 {
        self.0.prefix()
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.0.contains(ip)
    }

    /// Bits of an address that belong to the host part
    fn host_mask(&self) -> u32 {
        u32::MAX.checked_shr(u32::from(self.prefix())).unwrap_or(0)
    }

    /// Reject subnets without room for at least two hosts
    pub fn validate(&self) -> Result<()> {
        if self.prefix() > MAX_PREFIX {
            return Err(Error::config(format!(
                "subnet {} is too small for allocation (prefix must be /{} or shorter)",
                self, MAX_PREFIX
            )));
        }
        Ok(())
    }
}

impl FromStr for Subnet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let network: Ipv4Network = s
            .trim()
            .parse()
            .map_err(|e| Error::config(format!("invalid subnet {:?}: {}", s, e)))?;
        Self::new(network.ip(), network.prefix())
    }
}

impl TryFrom<String> for Subnet {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Subnet> for String {
    fn from(subnet: Subnet) -> Self {
        subnet.to_string()
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network(), self.prefix())
    }
}

/// Draw a random host address from `subnet`
pub fn generate(subnet: &Subnet) -> Ipv4Addr {
    generate_with(subnet, &mut rand::thread_rng())
}

/// Draw a host address from `subnet` using `rng`
///
/// A draw that lands on the network address (or any `.0` address) moves up
/// by one; a draw on the broadcast address (or any `.255` address) moves
/// down by one. For prefixes up to /30 the result is always a usable host
/// inside the subnet. /31 and /32 subnets have no usable host and yield an
/// address from the subnet without that guarantee.
pub fn generate_with<R: Rng + ?Sized>(subnet: &Subnet, rng: &mut R) -> Ipv4Addr {
    let mask = subnet.host_mask();
    let network = u32::from(subnet.network());
    let mut ip = (rng.r#gen::<u32>() & mask) | network;

    let host = ip & mask;
    if host == 0 || (ip & 0xff) == 0 {
        ip = ip.wrapping_add(1);
    } else if host == mask || (ip & 0xff) == 0xff {
        ip = ip.wrapping_sub(1);
    }

    // Keep degenerate subnets inside their range
    if !subnet.contains(Ipv4Addr::from(ip)) {
        ip = network;
    }

    Ipv4Addr::from(ip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand::rngs::mock::StepRng;

    /// Rng whose every draw is `value`, to steer generation onto edge addresses
    fn fixed(value: u32) -> StepRng {
        StepRng::new(u64::from(value), 0)
    }

    #[test]
    fn parses_and_normalizes() {
        let subnet: Subnet = "10.0.0.77/24".parse().unwrap();
        assert_eq!(subnet.network(), Ipv4Addr::new(10, 0, 0, 0));
        assert_eq!(subnet.broadcast(), Ipv4Addr::new(10, 0, 0, 255));
        assert_eq!(subnet.to_string(), "10.0.0.0/24");
    }

    #[test]
    fn rejects_garbage() {
        assert!("10.0.0.0/33".parse::<Subnet>().is_err());
        assert!("not-a-subnet".parse::<Subnet>().is_err());
    }

    #[test]
    fn validate_rejects_tiny_subnets() {
        assert!("10.0.0.0/30".parse::<Subnet>().unwrap().validate().is_ok());
        assert!("10.0.0.0/31".parse::<Subnet>().unwrap().validate().is_err());
        assert!("10.0.0.0/32".parse::<Subnet>().unwrap().validate().is_err());
    }

    #[test]
    fn network_address_moves_up() {
        let subnet: Subnet = "10.0.0.0/24".parse().unwrap();
        assert_eq!(generate_with(&subnet, &mut fixed(0)), Ipv4Addr::new(10, 0, 0, 1));
    }

    #[test]
    fn broadcast_address_moves_down() {
        let subnet: Subnet = "10.0.0.0/24".parse().unwrap();
        assert_eq!(
            generate_with(&subnet, &mut fixed(u32::MAX)),
            Ipv4Addr::new(10, 0, 0, 254)
        );
    }

    #[test]
    fn small_subnet_broadcast_is_avoided() {
        let subnet: Subnet = "192.168.1.4/30".parse().unwrap();
        assert_eq!(
            generate_with(&subnet, &mut fixed(u32::MAX)),
            Ipv4Addr::new(192, 168, 1, 6)
        );
        assert_eq!(generate_with(&subnet, &mut fixed(0)), Ipv4Addr::new(192, 168, 1, 5));
    }

    #[test]
    fn dot_zero_and_dot_255_avoided_in_wide_subnets() {
        let subnet: Subnet = "10.8.0.0/16".parse().unwrap();
        // host part 0x0500 lands on 10.8.5.0
        assert_eq!(generate_with(&subnet, &mut fixed(0x0500)), Ipv4Addr::new(10, 8, 5, 1));
        assert_eq!(generate_with(&subnet, &mut fixed(0x05ff)), Ipv4Addr::new(10, 8, 5, 254));
    }

    #[test]
    fn generated_addresses_are_usable_hosts() {
        let mut rng = StdRng::seed_from_u64(7);

        for cidr in ["10.0.0.0/24", "10.8.0.0/16", "172.16.4.0/22", "192.168.1.4/30", "10.0.0.128/25", "0.0.0.0/0"] {
            let subnet: Subnet = cidr.parse().unwrap();
            for _ in 0..2000 {
                let ip = generate_with(&subnet, &mut rng);
                assert!(subnet.contains(ip), "{} outside {}", ip, cidr);
                assert_ne!(ip, subnet.network(), "network address from {}", cidr);
                assert_ne!(ip, subnet.broadcast(), "broadcast address from {}", cidr);
            }
        }
    }

    #[test]
    fn serde_as_cidr_string() {
        let subnet: Subnet = serde_json::from_str("\"10.0.0.0/24\"").unwrap();
        assert_eq!(subnet.prefix(), 24);
        assert_eq!(serde_json::to_string(&subnet).unwrap(), "\"10.0.0.0/24\"");
    }
}
