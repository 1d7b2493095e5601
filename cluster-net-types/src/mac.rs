use std::fmt::{self, Display};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;

pub const MAC_ADDRESS_REGEX_STR: &str = r"^(?:[0-9a-fA-F]{2}:){5}[0-9a-fA-F]{2}$";

static MAC_ADDRESS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(MAC_ADDRESS_REGEX_STR).expect("MAC address regex is valid")
});

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MacAddressError {
    #[error("invalid MAC address")]
    InvalidFormat,
}

/// A MAC address in the canonical colon-separated form, e.g. `fa:16:3e:00:00:00`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, DeserializeFromStr, SerializeDisplay,
)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for MacAddress {
    type Err = MacAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !MAC_ADDRESS_REGEX.is_match(s) {
            return Err(MacAddressError::InvalidFormat);
        }

        let mut octets = [0u8; 6];

        for (octet, part) in octets.iter_mut().zip(s.split(':')) {
            *octet = u8::from_str_radix(part, 16).map_err(|_| MacAddressError::InvalidFormat)?;
        }

        Ok(Self(octets))
    }
}

impl Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}
