use std::collections::BTreeSet;
use std::fmt::{self, Display};
use std::str::FromStr;

use anyhow::{Context, Error};
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;

use cluster_net_types::vlan::{TUNNEL_ID_MAX, VLAN_ID_MAX};

/// Name of the network that hosts the global baremetal pool.
pub const BAREMETAL_NETWORK_NAME: &str = "baremetal";

#[derive(Error, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConfigValueError {
    #[error("invalid network manager: {0}")]
    InvalidNetManager(String),
    #[error("invalid segmentation type: {0}")]
    InvalidSegmentationType(String),
    #[error("invalid notation: {0}")]
    InvalidNotation(String),
}

/// Identity of a node network group.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct GroupId(u64);

impl GroupId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl From<u64> for GroupId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity of a logical network.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct NetworkId(u64);

impl NetworkId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl From<u64> for NetworkId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A named partition of the node fleet sharing one set of network CIDRs and VLANs.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct NodeNetworkGroup {
    pub id: GroupId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<u64>,
}

impl NodeNetworkGroup {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id: GroupId::new(id),
            name: name.into(),
            cluster_id: None,
        }
    }
}

/// All node network groups of one deployment.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct NodeNetworkGroups(Vec<NodeNetworkGroup>);

impl NodeNetworkGroups {
    pub fn new(groups: impl IntoIterator<Item = NodeNetworkGroup>) -> Self {
        Self(groups.into_iter().collect())
    }

    pub fn from_json(input: &str) -> Result<Self, Error> {
        log::trace!("parsing node network groups");
        serde_json::from_str(input).context("invalid node network group list")
    }

    /// The default group is the one with the lowest id.
    pub fn default_group(&self) -> Option<&NodeNetworkGroup> {
        self.0.iter().min_by_key(|group| group.id)
    }

    pub fn get(&self, id: GroupId) -> Option<&NodeNetworkGroup> {
        self.0.iter().find(|group| group.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeNetworkGroup> + '_ {
        self.0.iter()
    }
}

impl FromIterator<NodeNetworkGroup> for NodeNetworkGroups {
    fn from_iter<T: IntoIterator<Item = NodeNetworkGroup>>(iter: T) -> Self {
        Self::new(iter)
    }
}

/// How the address space of a network is given.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, DeserializeFromStr, SerializeDisplay)]
pub enum Notation {
    /// The whole CIDR is handed out, no explicit ranges.
    WholeCidr,
    /// Only the listed IP ranges are handed out.
    IpRanges,
}

impl FromStr for Notation {
    type Err = ConfigValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cidr" | "whole_cidr" => Ok(Notation::WholeCidr),
            "ip_ranges" => Ok(Notation::IpRanges),
            _ => Err(ConfigValueError::InvalidNotation(s.to_owned())),
        }
    }
}

impl Display for Notation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Notation::WholeCidr => "cidr",
            Notation::IpRanges => "ip_ranges",
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct NetworkMeta {
    #[serde(default)]
    pub configurable: bool,
    #[serde(default)]
    pub notation: Option<Notation>,
    #[serde(default)]
    pub use_gateway: bool,
    #[serde(default)]
    pub unmovable: bool,
    /// Name of the networking parameter whose pool must live inside this network.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floating_range_var: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext_net_data: Option<Vec<String>>,
}

/// One row of an IP range table, `[start, end]`.
///
/// Both endpoints are kept as entered so that malformed input can be reported instead of being
/// rejected while loading the document.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RawIpRange(pub Option<String>, pub Option<String>);

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

impl RawIpRange {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self(Some(start.into()), Some(end.into()))
    }

    pub fn start(&self) -> Option<&str> {
        non_blank(&self.0)
    }

    pub fn end(&self) -> Option<&str> {
        non_blank(&self.1)
    }

    /// Rows without any endpoint are left over from editing and get ignored.
    pub fn is_blank(&self) -> bool {
        self.start().is_none() && self.end().is_none()
    }
}

impl<S: Into<String>> From<(S, S)> for RawIpRange {
    fn from((start, end): (S, S)) -> Self {
        Self::new(start, end)
    }
}

/// A logical network inside a node network group.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Network {
    pub id: NetworkId,
    pub group_id: GroupId,
    pub name: String,
    #[serde(default)]
    pub cidr: Option<String>,
    #[serde(default)]
    pub ip_ranges: Vec<RawIpRange>,
    /// `None` means untagged.
    #[serde(default)]
    pub vlan_start: Option<i64>,
    #[serde(default)]
    pub gateway: Option<String>,
    #[serde(default)]
    pub meta: NetworkMeta,
}

impl Network {
    pub fn new(id: u64, group_id: u64, name: impl Into<String>) -> Self {
        Self {
            id: NetworkId::new(id),
            group_id: GroupId::new(group_id),
            name: name.into(),
            cidr: None,
            ip_ranges: Vec::new(),
            vlan_start: None,
            gateway: None,
            meta: NetworkMeta::default(),
        }
    }

    pub fn is_configurable(&self) -> bool {
        self.meta.configurable
    }

    pub fn is_baremetal(&self) -> bool {
        self.name == BAREMETAL_NETWORK_NAME
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, DeserializeFromStr, SerializeDisplay, Default)]
pub enum NetManager {
    /// nova-network, flat networks with DHCP
    FlatDhcp,
    /// nova-network, one VLAN per fixed network
    Vlan,
    #[default]
    Neutron,
}

impl NetManager {
    pub fn is_nova(&self) -> bool {
        matches!(self, NetManager::FlatDhcp | NetManager::Vlan)
    }
}

impl FromStr for NetManager {
    type Err = ConfigValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FlatDHCPManager" => Ok(NetManager::FlatDhcp),
            "VlanManager" => Ok(NetManager::Vlan),
            "neutron" => Ok(NetManager::Neutron),
            _ => Err(ConfigValueError::InvalidNetManager(s.to_owned())),
        }
    }
}

impl Display for NetManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NetManager::FlatDhcp => "FlatDHCPManager",
            NetManager::Vlan => "VlanManager",
            NetManager::Neutron => "neutron",
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, DeserializeFromStr, SerializeDisplay, Default)]
pub enum SegmentationType {
    #[default]
    Vlan,
    Gre,
    Vxlan,
}

impl SegmentationType {
    /// Tunnel types share one id space that is larger than the 802.1Q tag space.
    pub fn is_tunnel(&self) -> bool {
        !matches!(self, SegmentationType::Vlan)
    }
}

impl FromStr for SegmentationType {
    type Err = ConfigValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vlan" => Ok(SegmentationType::Vlan),
            "gre" => Ok(SegmentationType::Gre),
            "vxlan" | "tun" => Ok(SegmentationType::Vxlan),
            _ => Err(ConfigValueError::InvalidSegmentationType(s.to_owned())),
        }
    }
}

impl Display for SegmentationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SegmentationType::Vlan => "vlan",
            SegmentationType::Gre => "gre",
            SegmentationType::Vxlan => "vxlan",
        })
    }
}

/// An id window as entered, `[start, end]`.
pub type RawIdRange = [Option<i64>; 2];

/// Global networking settings of a deployment.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct NetworkingParameters {
    #[serde(default)]
    pub net_manager: NetManager,
    #[serde(default)]
    pub segmentation_type: SegmentationType,
    #[serde(default)]
    pub vlan_range: Option<RawIdRange>,
    #[serde(default)]
    pub gre_id_range: Option<RawIdRange>,
    #[serde(default)]
    pub base_mac: Option<String>,
    #[serde(default)]
    pub internal_cidr: Option<String>,
    #[serde(default)]
    pub internal_gateway: Option<String>,
    #[serde(default)]
    pub internal_name: Option<String>,
    #[serde(default)]
    pub floating_ranges: Vec<RawIpRange>,
    #[serde(default)]
    pub floating_name: Option<String>,
    #[serde(default)]
    pub dns_nameservers: Vec<String>,
    #[serde(default)]
    pub fixed_networks_cidr: Option<String>,
    #[serde(default)]
    pub fixed_networks_amount: Option<i64>,
    #[serde(default)]
    pub fixed_networks_vlan_start: Option<i64>,
    #[serde(default)]
    pub baremetal_gateway: Option<String>,
    #[serde(default)]
    pub baremetal_range: Option<RawIpRange>,
}

/// The serialized network configuration document of a deployment.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct NetworkConfiguration {
    #[serde(default)]
    pub networks: Vec<Network>,
    pub networking_parameters: NetworkingParameters,
}

impl NetworkConfiguration {
    pub fn new(networks: Vec<Network>, networking_parameters: NetworkingParameters) -> Self {
        Self {
            networks,
            networking_parameters,
        }
    }

    pub fn from_json(input: &str) -> Result<Self, Error> {
        log::trace!("parsing network configuration document");
        serde_json::from_str(input).context("invalid network configuration document")
    }

    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string(self).context("failed to serialize network configuration")
    }

    pub fn network(&self, id: NetworkId) -> Option<&Network> {
        self.networks.iter().find(|network| network.id == id)
    }

    /// Networks of a group, in declaration order.
    pub fn networks_in_group(&self, group_id: GroupId) -> impl Iterator<Item = &Network> + '_ {
        self.networks
            .iter()
            .filter(move |network| network.group_id == group_id)
    }

    /// Every non-null VLAN tag of the configurable networks of the deployment.
    pub fn vlan_tags(&self) -> BTreeSet<i64> {
        self.networks
            .iter()
            .filter(|network| network.is_configurable())
            .filter_map(|network| network.vlan_start)
            .collect()
    }
}

/// Numeric policy applied by the validators.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ValidationSettings {
    /// Shortest prefix accepted for a network CIDR, shorter ones are "too large".
    pub cidr_min_prefix: u8,
    /// Longest prefix accepted for a network CIDR, longer ones are "too small".
    pub cidr_max_prefix: u8,
    pub vlan_id_max: i64,
    pub tunnel_id_max: i64,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            cidr_min_prefix: 2,
            cidr_max_prefix: 30,
            vlan_id_max: VLAN_ID_MAX,
            tunnel_id_max: TUNNEL_ID_MAX,
        }
    }
}

impl ValidationSettings {
    /// Ceiling of the id window for the given segmentation type.
    pub fn segmentation_id_max(&self, segmentation_type: SegmentationType) -> i64 {
        if segmentation_type.is_tunnel() {
            self.tunnel_id_max
        } else {
            self.vlan_id_max
        }
    }
}
