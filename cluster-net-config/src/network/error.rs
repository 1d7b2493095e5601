use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::Serialize;
use serde_with::SerializeDisplay;
use thiserror::Error;

use cluster_net_types::IpRange;

use crate::network::config::{GroupId, NetworkId};

/// Coarse classification of a [`ValidationError`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed CIDR, IP, MAC or name.
    Syntax,
    /// Inverted endpoints, or a value outside its CIDR or id ceiling.
    Range,
    /// Two ranges or ids overlap when they must not.
    Intersection,
    /// Not enough room for the requested amount of ids or nodes.
    Capacity,
    /// A structurally required value is missing or empty.
    Configuration,
}

/// A problem with a single field of the network configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq, SerializeDisplay)]
pub enum ValidationError {
    #[error("invalid CIDR")]
    InvalidCidr,
    #[error("invalid IP address")]
    InvalidIp,
    #[error("invalid gateway")]
    InvalidGateway,
    #[error("invalid MAC address")]
    InvalidMac,
    #[error("invalid name, it has to start with a letter followed by letters, digits, '_' or '-'")]
    InvalidName,
    #[error("invalid nameserver")]
    InvalidNameserver,

    #[error("network is too large, the prefix length must be at least {0}")]
    NetworkTooLarge(u8),
    #[error("network is too small, the prefix length must be at most {0}")]
    NetworkTooSmall(u8),
    #[error("IP address does not match the network CIDR")]
    IpOutsideCidr,
    #[error("IP range is outside of the CIDR {cidr} of network '{network}' in node network group '{group}'")]
    IpOutsideReferenceCidr {
        cidr: String,
        network: String,
        group: String,
    },
    #[error("start IP address must not be greater than end IP address")]
    InvertedIpRange,
    #[error("gateway is outside of the network CIDR")]
    GatewayOutsideCidr,
    #[error("VLAN id must be between {min} and {max}")]
    VlanOutOfRange { min: i64, max: i64 },
    #[error("id range start must be between {min} and {max}")]
    InvalidIdStart { min: i64, max: i64 },
    #[error("id range end must be between {min} and {max}")]
    InvalidIdEnd { min: i64, max: i64 },
    #[error("id range start must not be greater than its end")]
    InvertedIdRange,
    #[error("amount has to be a positive integer")]
    InvalidAmount,

    #[error("IP range intersects with {0}")]
    IpRangesIntersect(IpRange),
    #[error("IP range intersects with {range} of network '{network}' in node network group '{group}'")]
    ReferenceRangesIntersect {
        range: IpRange,
        network: String,
        group: String,
    },
    #[error("VLAN id {0} is already used by another network")]
    VlanInUse(i64),
    #[error("id range intersects with VLAN id {0} of another network")]
    VlanRangeIntersection(i64),

    #[error("need more VLAN ids: {requested} requested, {available} available")]
    NotEnoughVlanIds { requested: i64, available: i64 },

    #[error("{0} is required")]
    Required(&'static str),
    #[error("at least one IP range is required")]
    EmptyIpRanges,
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ValidationError::InvalidCidr
            | ValidationError::InvalidIp
            | ValidationError::InvalidGateway
            | ValidationError::InvalidMac
            | ValidationError::InvalidName
            | ValidationError::InvalidNameserver => ErrorKind::Syntax,
            ValidationError::NetworkTooLarge(_)
            | ValidationError::NetworkTooSmall(_)
            | ValidationError::IpOutsideCidr
            | ValidationError::IpOutsideReferenceCidr { .. }
            | ValidationError::InvertedIpRange
            | ValidationError::GatewayOutsideCidr
            | ValidationError::VlanOutOfRange { .. }
            | ValidationError::InvalidIdStart { .. }
            | ValidationError::InvalidIdEnd { .. }
            | ValidationError::InvertedIdRange
            | ValidationError::InvalidAmount => ErrorKind::Range,
            ValidationError::IpRangesIntersect(_)
            | ValidationError::ReferenceRangesIntersect { .. }
            | ValidationError::VlanInUse(_)
            | ValidationError::VlanRangeIntersection(_) => ErrorKind::Intersection,
            ValidationError::NotEnoughVlanIds { .. } => ErrorKind::Capacity,
            ValidationError::Required(_) | ValidationError::EmptyIpRanges => {
                ErrorKind::Configuration
            }
        }
    }
}

/// Errors of one row of an IP range table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IpRangeFieldError {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<ValidationError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<ValidationError>,
}

impl IpRangeFieldError {
    /// The same error on both endpoints, used for problems of the range as a whole.
    pub fn whole_range(index: usize, error: ValidationError) -> Self {
        Self {
            index,
            start: Some(error.clone()),
            end: Some(error),
        }
    }
}

/// The error payload stored for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldError {
    Message(ValidationError),
    /// One entry per offending row of an IP range table.
    Ranges(Vec<IpRangeFieldError>),
    /// One slot per element of a list field, `None` for elements that passed.
    Positional(Vec<Option<ValidationError>>),
}

impl FieldError {
    /// All messages contained in this field error.
    pub fn errors(&self) -> Box<dyn Iterator<Item = &ValidationError> + '_> {
        match self {
            FieldError::Message(error) => Box::new(std::iter::once(error)),
            FieldError::Ranges(rows) => Box::new(
                rows.iter()
                    .flat_map(|row| row.start.iter().chain(row.end.iter())),
            ),
            FieldError::Positional(slots) => Box::new(slots.iter().flatten()),
        }
    }
}

impl From<ValidationError> for FieldError {
    fn from(value: ValidationError) -> Self {
        FieldError::Message(value)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkField {
    Cidr,
    IpRanges,
    Gateway,
    VlanStart,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterField {
    FixedNetworksCidr,
    FixedNetworksAmount,
    FixedNetworksVlanStart,
    VlanRange,
    GreIdRange,
    BaseMac,
    InternalCidr,
    InternalGateway,
    InternalName,
    FloatingName,
    FloatingRanges,
    DnsNameservers,
    BaremetalGateway,
    BaremetalRange,
}

/// Address of a single field inside the configuration document.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldPath {
    Network {
        group: GroupId,
        network: NetworkId,
        field: NetworkField,
    },
    Parameter(ParameterField),
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldPath::Network {
                group,
                network,
                field,
            } => write!(f, "networks.{group}.{network}.{}", field.as_str()),
            FieldPath::Parameter(field) => {
                write!(f, "networking_parameters.{}", field.as_str())
            }
        }
    }
}

impl NetworkField {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkField::Cidr => "cidr",
            NetworkField::IpRanges => "ip_ranges",
            NetworkField::Gateway => "gateway",
            NetworkField::VlanStart => "vlan_start",
        }
    }
}

impl ParameterField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterField::FixedNetworksCidr => "fixed_networks_cidr",
            ParameterField::FixedNetworksAmount => "fixed_networks_amount",
            ParameterField::FixedNetworksVlanStart => "fixed_networks_vlan_start",
            ParameterField::VlanRange => "vlan_range",
            ParameterField::GreIdRange => "gre_id_range",
            ParameterField::BaseMac => "base_mac",
            ParameterField::InternalCidr => "internal_cidr",
            ParameterField::InternalGateway => "internal_gateway",
            ParameterField::InternalName => "internal_name",
            ParameterField::FloatingName => "floating_name",
            ParameterField::FloatingRanges => "floating_ranges",
            ParameterField::DnsNameservers => "dns_nameservers",
            ParameterField::BaremetalGateway => "baremetal_gateway",
            ParameterField::BaremetalRange => "baremetal_range",
        }
    }
}

pub type NetworkErrors = BTreeMap<NetworkField, FieldError>;
pub type ParameterErrors = BTreeMap<ParameterField, FieldError>;
pub type GroupErrors = BTreeMap<NetworkId, NetworkErrors>;

/// All problems found in a network configuration, addressed by field.
///
/// Networks without entries passed every check. An empty map is the only signal that the
/// configuration is valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorMap {
    networks: BTreeMap<GroupId, GroupErrors>,
    networking_parameters: ParameterErrors,
}

impl Display for ErrorMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;

        for (path, error) in self.iter() {
            for message in error.errors() {
                if !first {
                    f.write_str("; ")?;
                }
                first = false;

                write!(f, "{path}: {message}")?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for ErrorMap {}

impl ErrorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty() && self.networking_parameters.is_empty()
    }

    /// Stores the errors of a network, dropping empty error sets.
    pub fn insert_network(&mut self, group: GroupId, network: NetworkId, errors: NetworkErrors) {
        if errors.is_empty() {
            return;
        }

        self.networks
            .entry(group)
            .or_default()
            .entry(network)
            .or_default()
            .extend(errors);
    }

    /// Merges parameter errors, keeping an already recorded error for the same field.
    pub fn extend_parameters(&mut self, errors: ParameterErrors) {
        for (field, error) in errors {
            self.networking_parameters.entry(field).or_insert(error);
        }
    }

    pub fn group(&self, group: GroupId) -> Option<&GroupErrors> {
        self.networks.get(&group)
    }

    pub fn network(&self, group: GroupId, network: NetworkId) -> Option<&NetworkErrors> {
        self.networks.get(&group)?.get(&network)
    }

    pub fn networks(&self) -> &BTreeMap<GroupId, GroupErrors> {
        &self.networks
    }

    pub fn networking_parameters(&self) -> &ParameterErrors {
        &self.networking_parameters
    }

    pub fn get(&self, path: &FieldPath) -> Option<&FieldError> {
        match path {
            FieldPath::Network {
                group,
                network,
                field,
            } => self.network(*group, *network)?.get(field),
            FieldPath::Parameter(field) => self.networking_parameters.get(field),
        }
    }

    /// Iterates over every recorded field, networks first, in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = (FieldPath, &FieldError)> + '_ {
        let networks = self.networks.iter().flat_map(|(group, networks)| {
            networks.iter().flat_map(move |(network, fields)| {
                fields.iter().map(move |(field, error)| {
                    (
                        FieldPath::Network {
                            group: *group,
                            network: *network,
                            field: *field,
                        },
                        error,
                    )
                })
            })
        });

        let parameters = self
            .networking_parameters
            .iter()
            .map(|(field, error)| (FieldPath::Parameter(*field), error));

        networks.chain(parameters)
    }

    /// Number of individual messages per [`ErrorKind`].
    pub fn count_by_kind(&self) -> BTreeMap<ErrorKind, usize> {
        let mut counts = BTreeMap::new();

        for (_path, error) in self.iter() {
            for message in error.errors() {
                *counts.entry(message.kind()).or_insert(0) += 1;
            }
        }

        counts
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(ValidationError::InvalidCidr.kind(), ErrorKind::Syntax);
        assert_eq!(ValidationError::GatewayOutsideCidr.kind(), ErrorKind::Range);
        assert_eq!(ValidationError::VlanInUse(101).kind(), ErrorKind::Intersection);
        assert_eq!(
            ValidationError::NotEnoughVlanIds {
                requested: 10,
                available: 5
            }
            .kind(),
            ErrorKind::Capacity
        );
        assert_eq!(ValidationError::EmptyIpRanges.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut errors = ErrorMap::new();
        assert!(errors.is_empty());

        errors.insert_network(GroupId::new(1), NetworkId::new(2), NetworkErrors::new());
        assert!(errors.is_empty());

        errors.insert_network(
            GroupId::new(1),
            NetworkId::new(2),
            NetworkErrors::from([(NetworkField::Gateway, ValidationError::InvalidGateway.into())]),
        );

        let path = FieldPath::Network {
            group: GroupId::new(1),
            network: NetworkId::new(2),
            field: NetworkField::Gateway,
        };

        assert_eq!(
            errors.get(&path),
            Some(&FieldError::Message(ValidationError::InvalidGateway))
        );
        assert_eq!(path.to_string(), "networks.1.2.gateway");
        assert_eq!(errors.to_string(), "networks.1.2.gateway: invalid gateway");
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_parameters_keep_first_error() {
        let mut errors = ErrorMap::new();

        errors.extend_parameters(ParameterErrors::from([(
            ParameterField::BaremetalGateway,
            ValidationError::GatewayOutsideCidr.into(),
        )]));
        errors.extend_parameters(ParameterErrors::from([(
            ParameterField::BaremetalGateway,
            ValidationError::InvalidGateway.into(),
        )]));

        assert_eq!(
            errors.get(&FieldPath::Parameter(ParameterField::BaremetalGateway)),
            Some(&FieldError::Message(ValidationError::GatewayOutsideCidr))
        );
    }

    #[test]
    fn test_count_by_kind() {
        let mut errors = ErrorMap::new();

        errors.extend_parameters(ParameterErrors::from([
            (
                ParameterField::DnsNameservers,
                FieldError::Positional(vec![
                    Some(ValidationError::InvalidNameserver),
                    None,
                    Some(ValidationError::InvalidNameserver),
                ]),
            ),
            (
                ParameterField::FloatingRanges,
                FieldError::Ranges(vec![IpRangeFieldError::whole_range(
                    0,
                    ValidationError::InvertedIpRange,
                )]),
            ),
        ]));

        let counts = errors.count_by_kind();
        assert_eq!(counts.get(&ErrorKind::Syntax), Some(&2));
        assert_eq!(counts.get(&ErrorKind::Range), Some(&2));
    }
}
