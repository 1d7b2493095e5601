use std::collections::BTreeSet;

use cluster_net_types::vlan::{validate_vlan_id, VlanIdError, VlanPolicy};
use cluster_net_types::Ipv4Cidr;

use crate::network::config::{
    Network, NetworkingParameters, NodeNetworkGroup, Notation, ValidationSettings,
};
use crate::network::error::{
    FieldError, GroupErrors, NetworkErrors, NetworkField, ParameterErrors, ParameterField,
    ValidationError,
};
use crate::network::ranges::{valid_ip_ranges, validate_ip_ranges, RangeRules};
use crate::network::{validate_cidr, validate_gateway};

/// Outcome of validating one node network group.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupValidation {
    pub networks: GroupErrors,
    /// Errors on global parameters that are checked against a network of this group.
    pub parameters: ParameterErrors,
}

impl GroupValidation {
    pub fn is_empty(&self) -> bool {
        self.networks.is_empty() && self.parameters.is_empty()
    }
}

/// Validates every configurable network of `group`.
///
/// `networks` may contain networks of other groups, they are skipped. Networks are checked in
/// declaration order, which decides which of two networks sharing a VLAN tag gets flagged.
pub fn validate_group<'a>(
    group: &NodeNetworkGroup,
    networks: impl IntoIterator<Item = &'a Network>,
    parameters: &NetworkingParameters,
    settings: &ValidationSettings,
) -> GroupValidation {
    let mut result = GroupValidation::default();
    let mut used_tags = BTreeSet::new();

    for network in networks {
        if network.group_id != group.id {
            continue;
        }

        if !network.is_configurable() {
            tracing::trace!(
                "skipping network '{}' ({}) in group '{}', not configurable",
                network.name,
                network.id,
                group.name
            );
            continue;
        }

        let errors = validate_network(
            network,
            &used_tags,
            parameters,
            settings,
            &mut result.parameters,
        );

        if let Some(tag) = network.vlan_start {
            used_tags.insert(tag);
        }

        if !errors.is_empty() {
            result.networks.insert(network.id, errors);
        }
    }

    result
}

fn validate_network(
    network: &Network,
    used_tags: &BTreeSet<i64>,
    parameters: &NetworkingParameters,
    settings: &ValidationSettings,
    parameter_errors: &mut ParameterErrors,
) -> NetworkErrors {
    let mut errors = NetworkErrors::new();

    // networks without notation (e.g. private) carry no address space of their own
    let check_cidr = network.meta.notation.is_some() || network.cidr.is_some();

    let cidr = if check_cidr {
        match validate_cidr(network.cidr.as_deref(), settings) {
            Ok(cidr) => Some(cidr),
            Err(err) => {
                errors.insert(NetworkField::Cidr, err.into());
                None
            }
        }
    } else {
        None
    };

    let mut range_errors = Vec::new();

    if let (Some(Notation::IpRanges), Some(cidr)) = (network.meta.notation, &cidr) {
        range_errors = validate_ip_ranges(&network.ip_ranges, RangeRules::within(cidr));

        if !range_errors.is_empty() {
            errors.insert(
                NetworkField::IpRanges,
                FieldError::Ranges(range_errors.clone()),
            );
        }
    }

    if network.meta.use_gateway {
        if let Err(err) = validate_gateway(network.gateway.as_deref(), cidr.as_ref()) {
            errors.insert(NetworkField::Gateway, err.into());
        }
    }

    let policy = VlanPolicy::new(settings.vlan_id_max);

    if let Err(err) = validate_vlan_id(network.vlan_start, used_tags, policy) {
        errors.insert(NetworkField::VlanStart, vlan_error(err).into());
    }

    if network.is_baremetal() {
        let own_ranges = valid_ip_ranges(&network.ip_ranges, &range_errors);

        for (field, error) in validate_baremetal(parameters, cidr.as_ref(), &own_ranges) {
            parameter_errors.entry(field).or_insert(error);
        }
    }

    errors
}

pub(crate) fn vlan_error(error: VlanIdError) -> ValidationError {
    match error {
        VlanIdError::Missing => ValidationError::Required("VLAN id"),
        VlanIdError::OutOfRange { min, max } => ValidationError::VlanOutOfRange { min, max },
        VlanIdError::Forbidden(id) => ValidationError::VlanInUse(id),
    }
}

/// The baremetal pool is declared globally but has to live inside the baremetal network.
fn validate_baremetal(
    parameters: &NetworkingParameters,
    cidr: Option<&Ipv4Cidr>,
    own_ranges: &[cluster_net_types::IpRange],
) -> ParameterErrors {
    let mut errors = ParameterErrors::new();

    if let Err(err) = validate_gateway(parameters.baremetal_gateway.as_deref(), cidr) {
        errors.insert(ParameterField::BaremetalGateway, err.into());
    }

    let range = parameters.baremetal_range.clone().unwrap_or_default();
    let rules = RangeRules {
        cidr,
        existing: own_ranges,
        reference: None,
    };

    let range_errors = validate_ip_ranges(std::slice::from_ref(&range), rules);

    if !range_errors.is_empty() {
        errors.insert(ParameterField::BaremetalRange, FieldError::Ranges(range_errors));
    }

    errors
}
