use std::fmt::{self, Display};
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CidrError {
    #[error("CIDR is missing the prefix length")]
    MissingPrefix,
    #[error("invalid network address")]
    InvalidAddress,
    #[error("invalid prefix length")]
    InvalidPrefix,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IpRangeError {
    #[error("start address is greater than end address")]
    StartGreaterThanEnd,
    #[error("invalid IP range format")]
    InvalidFormat,
}

/// An IPv4 block in `address/prefix` notation.
///
/// The address is kept as entered, host bits included, so that a parsed CIDR prints back exactly
/// as it was written. Use [`Ipv4Cidr::canonical`] to get the masked form.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, DeserializeFromStr, SerializeDisplay,
)]
pub struct Ipv4Cidr {
    address: Ipv4Addr,
    mask: u8,
}

impl Ipv4Cidr {
    pub fn new(address: impl Into<Ipv4Addr>, mask: u8) -> Result<Self, CidrError> {
        if mask > 32 {
            return Err(CidrError::InvalidPrefix);
        }

        Ok(Self {
            address: address.into(),
            mask,
        })
    }

    pub fn address(&self) -> &Ipv4Addr {
        &self.address
    }

    pub fn mask(&self) -> u8 {
        self.mask
    }

    fn netmask(&self) -> u32 {
        match self.mask {
            0 => 0,
            mask => u32::MAX << (32 - mask),
        }
    }

    /// The CIDR with all host bits cleared.
    pub fn canonical(&self) -> Self {
        Self {
            address: self.network_address(),
            mask: self.mask,
        }
    }

    pub fn network_address(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.address) & self.netmask())
    }

    pub fn broadcast_address(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.address) | !self.netmask())
    }

    /// Number of addresses in the block, network and broadcast address included.
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.mask))
    }

    /// First address that can be handed out to a host.
    ///
    /// Blocks with two addresses or less have no dedicated network address, so the first address
    /// is usable in that case.
    pub fn first_usable(&self) -> Ipv4Addr {
        let network = u32::from(self.network_address());

        if self.size() <= 2 {
            return Ipv4Addr::from(network);
        }

        Ipv4Addr::from(network + 1)
    }

    /// Last address that can be handed out to a host, see [`Ipv4Cidr::first_usable`].
    pub fn last_usable(&self) -> Ipv4Addr {
        let broadcast = u32::from(self.broadcast_address());

        if self.size() <= 2 {
            return Ipv4Addr::from(broadcast);
        }

        Ipv4Addr::from(broadcast - 1)
    }

    /// Returns true if the address lies between the first and last usable address (inclusive).
    pub fn contains_address(&self, address: &Ipv4Addr) -> bool {
        (self.first_usable()..=self.last_usable()).contains(address)
    }

    /// Returns true if both endpoints of the range are usable addresses of this block.
    pub fn contains_range(&self, range: &IpRange) -> bool {
        self.contains_address(range.start()) && self.contains_address(range.end())
    }
}

impl FromStr for Ipv4Cidr {
    type Err = CidrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, mask) = s.split_once('/').ok_or(CidrError::MissingPrefix)?;

        let address: Ipv4Addr = address.parse().map_err(|_| CidrError::InvalidAddress)?;

        // u8::from_str accepts a leading '+', which is not valid CIDR notation
        if mask.is_empty() || !mask.bytes().all(|c| c.is_ascii_digit()) {
            return Err(CidrError::InvalidPrefix);
        }

        let mask: u8 = mask.parse().map_err(|_| CidrError::InvalidPrefix)?;

        Self::new(address, mask)
    }
}

impl Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.mask)
    }
}

/// A closed interval of IPv4 addresses.
///
/// # Invariants
/// * `start <= end`
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, DeserializeFromStr, SerializeDisplay,
)]
pub struct IpRange {
    start: Ipv4Addr,
    end: Ipv4Addr,
}

impl IpRange {
    pub fn new(start: impl Into<Ipv4Addr>, end: impl Into<Ipv4Addr>) -> Result<Self, IpRangeError> {
        let start = start.into();
        let end = end.into();

        if start > end {
            return Err(IpRangeError::StartGreaterThanEnd);
        }

        Ok(Self { start, end })
    }

    pub fn start(&self) -> &Ipv4Addr {
        &self.start
    }

    pub fn end(&self) -> &Ipv4Addr {
        &self.end
    }

    pub fn contains_address(&self, address: &Ipv4Addr) -> bool {
        (self.start..=self.end).contains(address)
    }

    /// Closed-interval overlap on the 32-bit address space.
    pub fn overlaps(&self, other: &IpRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl FromStr for IpRange {
    type Err = IpRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s.split_once('-').ok_or(IpRangeError::InvalidFormat)?;

        let start: Ipv4Addr = start.parse().map_err(|_| IpRangeError::InvalidFormat)?;
        let end: Ipv4Addr = end.parse().map_err(|_| IpRangeError::InvalidFormat)?;

        Self::new(start, end)
    }
}

impl Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Parses a CIDR string into its address and prefix length.
pub fn parse_cidr(s: &str) -> Result<(Ipv4Addr, u8), CidrError> {
    let cidr: Ipv4Cidr = s.parse()?;
    Ok((cidr.address, cidr.mask))
}

/// Returns true if `s` is a dotted-quad IPv4 address.
pub fn validate_ip(s: &str) -> bool {
    s.parse::<Ipv4Addr>().is_ok()
}

/// Returns true if `ip` is a usable address of `cidr`.
pub fn ip_in_cidr(ip: &Ipv4Addr, cidr: &Ipv4Cidr) -> bool {
    cidr.contains_address(ip)
}

/// Returns true if both `start` and `end` are usable addresses of `cidr`.
pub fn range_within_cidr(start: &Ipv4Addr, end: &Ipv4Addr, cidr: &Ipv4Cidr) -> bool {
    start <= end && cidr.contains_address(start) && cidr.contains_address(end)
}

pub fn ranges_overlap(a: &IpRange, b: &IpRange) -> bool {
    a.overlaps(b)
}
