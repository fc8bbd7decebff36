//! IPv4 address blocks and subnet carving

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::net::Ipv4Addr;
use std::str::FromStr;

/// IPv4 CIDR block, normalized to its network address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    /// Network address
    #[must_use]
    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// Prefix length
    #[must_use]
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Number of `/mask` subnets that fit in this block
    #[must_use]
    pub fn capacity(&self, mask: u8) -> u64 {
        if mask < self.prefix || mask > 32 {
            return 0;
        }
        1u64 << (mask - self.prefix)
    }

    /// The `index`-th `/mask` subnet of this block
    #[must_use]
    pub fn subnet(&self, mask: u8, index: u32) -> Option<Ipv4Cidr> {
        if u64::from(index) >= self.capacity(mask) {
            return None;
        }
        let step = 1u64 << (32 - u32::from(mask));
        let base = u64::from(u32::from(self.network)) + u64::from(index) * step;
        Some(Ipv4Cidr {
            network: Ipv4Addr::from(u32::try_from(base).ok()?),
            prefix: mask,
        })
    }
}

impl FromStr for Ipv4Cidr {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| ValidationError::InvalidCidr {
            cidr: s.to_string(),
            reason,
        };
        let (addr, prefix) = s.split_once('/').ok_or_else(|| invalid("missing prefix length"))?;
        let addr: Ipv4Addr = addr.parse().map_err(|_| invalid("bad address"))?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid("bad prefix length"))?;
        if prefix > 32 {
            return Err(invalid("prefix length above 32"));
        }
        let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
        Ok(Self {
            network: Ipv4Addr::from(u32::from(addr) & mask),
            prefix,
        })
    }
}

impl TryFrom<String> for Ipv4Cidr {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Ipv4Cidr> for String {
    fn from(cidr: Ipv4Cidr) -> Self {
        cidr.to_string()
    }
}

impl Display for Ipv4Cidr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}
