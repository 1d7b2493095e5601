pub mod address;
pub mod mac;
pub mod vlan;

pub use address::{Ipv4Cidr, IpRange};
pub use mac::MacAddress;
