//! Consistency checks for the network configuration of a deployment.
//!
//! [`validate`] runs the per-group checks once for every node network group and the global
//! parameter checks once, and merges both into one [`ErrorMap`]. The checks never mutate their
//! input and keep no state between calls.

pub mod config;
pub mod error;
pub mod group;
pub mod parameters;
pub mod ranges;

use std::net::Ipv4Addr;

use anyhow::Error;
use serde::{Deserialize, Serialize};

use cluster_net_types::Ipv4Cidr;

use crate::common::valid::{Valid, Validatable};

pub use config::{
    GroupId, NetManager, Network, NetworkConfiguration, NetworkId, NetworkMeta,
    NetworkingParameters, NodeNetworkGroup, NodeNetworkGroups, Notation, RawIpRange,
    SegmentationType, ValidationSettings,
};
pub use error::{
    ErrorKind, ErrorMap, FieldError, FieldPath, IpRangeFieldError, NetworkField, ParameterField,
    ValidationError,
};

/// Parses a network CIDR and applies the prefix length policy of `settings`.
pub(crate) fn validate_cidr(
    value: Option<&str>,
    settings: &ValidationSettings,
) -> Result<Ipv4Cidr, ValidationError> {
    let value = value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(ValidationError::Required("CIDR"))?;

    let cidr: Ipv4Cidr = value.parse().map_err(|_| ValidationError::InvalidCidr)?;

    if cidr.mask() < settings.cidr_min_prefix {
        return Err(ValidationError::NetworkTooLarge(settings.cidr_min_prefix));
    }

    if cidr.mask() > settings.cidr_max_prefix {
        return Err(ValidationError::NetworkTooSmall(settings.cidr_max_prefix));
    }

    Ok(cidr)
}

/// A gateway has to be an address, and inside `cidr` if that is known to be valid.
pub(crate) fn validate_gateway(
    value: Option<&str>,
    cidr: Option<&Ipv4Cidr>,
) -> Result<Ipv4Addr, ValidationError> {
    let gateway: Ipv4Addr = value
        .and_then(|value| value.trim().parse().ok())
        .ok_or(ValidationError::InvalidGateway)?;

    match cidr {
        Some(cidr) if !cidr.contains_address(&gateway) => Err(ValidationError::GatewayOutsideCidr),
        _ => Ok(gateway),
    }
}

/// Validates a configuration snapshot with the default [`ValidationSettings`].
pub fn validate(configuration: &NetworkConfiguration, groups: &NodeNetworkGroups) -> ErrorMap {
    validate_with(configuration, groups, &ValidationSettings::default())
}

pub fn validate_with(
    configuration: &NetworkConfiguration,
    groups: &NodeNetworkGroups,
    settings: &ValidationSettings,
) -> ErrorMap {
    let mut errors = ErrorMap::new();

    for network in &configuration.networks {
        if groups.get(network.group_id).is_none() {
            tracing::warn!(
                "network '{}' ({}) belongs to unknown node network group {}",
                network.name,
                network.id,
                network.group_id
            );
        }
    }

    for group in groups.iter() {
        let result = group::validate_group(
            group,
            &configuration.networks,
            &configuration.networking_parameters,
            settings,
        );

        tracing::debug!(
            "node network group '{}' ({}): {} network(s) with errors",
            group.name,
            group.id,
            result.networks.len()
        );

        for (network, fields) in result.networks {
            errors.insert_network(group.id, network, fields);
        }

        errors.extend_parameters(result.parameters);
    }

    let parameters =
        parameters::validate_parameters(configuration, groups, errors.networks(), settings);

    tracing::debug!("networking parameters: {} field(s) with errors", parameters.len());

    errors.extend_parameters(parameters);
    errors
}

/// Everything needed to decide whether a network configuration may be saved.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkCheck {
    pub configuration: NetworkConfiguration,
    pub groups: NodeNetworkGroups,
    #[serde(default)]
    pub settings: ValidationSettings,
}

impl NetworkCheck {
    pub fn new(configuration: NetworkConfiguration, groups: NodeNetworkGroups) -> Self {
        Self {
            configuration,
            groups,
            settings: ValidationSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ValidationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn errors(&self) -> ErrorMap {
        validate_with(&self.configuration, &self.groups, &self.settings)
    }
}

impl Validatable for NetworkCheck {
    type Error = ErrorMap;

    fn validate(&self) -> Result<(), Self::Error> {
        let errors = self.errors();

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(())
    }
}

impl Valid<NetworkCheck> {
    /// Serializes the validated configuration document for saving.
    pub fn to_json(&self) -> Result<String, Error> {
        self.configuration.to_json()
    }
}
