use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use const_format::concatcp;
use regex::Regex;

use cluster_net_types::address::validate_ip;
use cluster_net_types::vlan::{ranges_intersect, validate_vlan_id, VlanPolicy, VLAN_ID_MIN};
use cluster_net_types::MacAddress;

use crate::network::config::{
    GroupId, NetManager, Network, NetworkConfiguration, NetworkingParameters, NodeNetworkGroups,
    RawIdRange, SegmentationType, ValidationSettings,
};
use crate::network::error::{
    FieldError, GroupErrors, IpRangeFieldError, NetworkField, ParameterErrors, ParameterField,
    ValidationError,
};
use crate::network::group::vlan_error;
use crate::network::ranges::{valid_ip_ranges, validate_ip_ranges, RangeRules, ReferenceNetwork};
use crate::network::{validate_cidr, validate_gateway};

/// Parameter whose pool has to live inside the network that names it in `floating_range_var`.
pub const FLOATING_RANGES_VAR: &str = "floating_ranges";

pub const NETWORK_NAME_REGEX_STR: &str = r"[a-zA-Z][a-zA-Z0-9_\-]*";

static NETWORK_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concatcp!(r"^", NETWORK_NAME_REGEX_STR, r"$")).expect("name regex is valid")
});

/// Validates the global networking parameters of a deployment.
///
/// `network_errors` are the results of the per-group validation, they decide which IP ranges of
/// the floating reference network count as valid.
pub fn validate_parameters(
    configuration: &NetworkConfiguration,
    groups: &NodeNetworkGroups,
    network_errors: &BTreeMap<GroupId, GroupErrors>,
    settings: &ValidationSettings,
) -> ParameterErrors {
    let parameters = &configuration.networking_parameters;
    let tags = configuration.vlan_tags();

    let mut errors = if parameters.net_manager.is_nova() {
        validate_nova(parameters, &tags, settings)
    } else {
        validate_neutron(configuration, groups, network_errors, &tags, settings)
    };

    let nameservers: Vec<Option<ValidationError>> = parameters
        .dns_nameservers
        .iter()
        .map(|server| (!validate_ip(server.trim())).then_some(ValidationError::InvalidNameserver))
        .collect();

    if nameservers.iter().any(Option::is_some) {
        errors.insert(
            ParameterField::DnsNameservers,
            FieldError::Positional(nameservers),
        );
    }

    errors
}

fn validate_nova(
    parameters: &NetworkingParameters,
    tags: &BTreeSet<i64>,
    settings: &ValidationSettings,
) -> ParameterErrors {
    let mut errors = ParameterErrors::new();

    if let Err(err) = validate_cidr(parameters.fixed_networks_cidr.as_deref(), settings) {
        errors.insert(ParameterField::FixedNetworksCidr, err.into());
    }

    let amount = parameters.fixed_networks_amount.filter(|amount| *amount >= 1);

    if amount.is_none() {
        errors.insert(
            ParameterField::FixedNetworksAmount,
            ValidationError::InvalidAmount.into(),
        );
    }

    // FlatDHCP may leave the fixed networks untagged
    let vlan_manager = parameters.net_manager == NetManager::Vlan;
    let policy = VlanPolicy::new(settings.vlan_id_max).allow_untagged(!vlan_manager);

    let start = parameters.fixed_networks_vlan_start;

    if let Err(err) = validate_vlan_id(start, tags, policy) {
        errors.insert(ParameterField::FixedNetworksVlanStart, vlan_error(err).into());
    } else if let (Some(start), Some(amount)) = (start, amount) {
        let end = start.saturating_add(amount - 1);

        if end > policy.max {
            errors.insert(
                ParameterField::FixedNetworksAmount,
                ValidationError::NotEnoughVlanIds {
                    requested: amount,
                    available: policy.max - start + 1,
                }
                .into(),
            );
        } else if let Some(tag) = tags.iter().find(|tag| ranges_intersect(start, end, **tag)) {
            errors.insert(
                ParameterField::FixedNetworksVlanStart,
                ValidationError::VlanRangeIntersection(*tag).into(),
            );
        }
    }

    let floating = validate_ip_ranges(&parameters.floating_ranges, RangeRules::default());

    if !floating.is_empty() {
        errors.insert(ParameterField::FloatingRanges, FieldError::Ranges(floating));
    }

    errors
}

fn validate_neutron(
    configuration: &NetworkConfiguration,
    groups: &NodeNetworkGroups,
    network_errors: &BTreeMap<GroupId, GroupErrors>,
    tags: &BTreeSet<i64>,
    settings: &ValidationSettings,
) -> ParameterErrors {
    let parameters = &configuration.networking_parameters;
    let mut errors = ParameterErrors::new();

    let segmentation = parameters.segmentation_type;
    let (field, range) = match segmentation {
        SegmentationType::Vlan => (ParameterField::VlanRange, parameters.vlan_range),
        SegmentationType::Gre | SegmentationType::Vxlan => {
            (ParameterField::GreIdRange, parameters.gre_id_range)
        }
    };

    if let Some(error) = validate_id_range(
        range.unwrap_or_default(),
        settings.segmentation_id_max(segmentation),
        tags,
    ) {
        errors.insert(field, error);
    }

    match parameters.base_mac.as_deref().map(str::trim) {
        None | Some("") => {
            errors.insert(
                ParameterField::BaseMac,
                ValidationError::Required("base MAC address").into(),
            );
        }
        Some(mac) => {
            if mac.parse::<MacAddress>().is_err() {
                errors.insert(ParameterField::BaseMac, ValidationError::InvalidMac.into());
            }
        }
    }

    let internal_cidr = match validate_cidr(parameters.internal_cidr.as_deref(), settings) {
        Ok(cidr) => Some(cidr),
        Err(err) => {
            errors.insert(ParameterField::InternalCidr, err.into());
            None
        }
    };

    if let Err(err) = validate_gateway(parameters.internal_gateway.as_deref(), internal_cidr.as_ref())
    {
        errors.insert(ParameterField::InternalGateway, err.into());
    }

    for (field, name) in [
        (ParameterField::InternalName, &parameters.internal_name),
        (ParameterField::FloatingName, &parameters.floating_name),
    ] {
        if let Err(err) = validate_name(name.as_deref()) {
            errors.insert(field, err.into());
        }
    }

    let floating = validate_floating_ranges(configuration, groups, network_errors, settings);

    if !floating.is_empty() {
        errors.insert(ParameterField::FloatingRanges, FieldError::Ranges(floating));
    }

    errors
}

/// Checks a segmentation id window, reporting `[start, end]` positionally.
fn validate_id_range(range: RawIdRange, max: i64, tags: &BTreeSet<i64>) -> Option<FieldError> {
    let [start, end] = range;
    let bounds = VLAN_ID_MIN..=max;

    let start_error = start
        .filter(|start| bounds.contains(start))
        .is_none()
        .then_some(ValidationError::InvalidIdStart {
            min: VLAN_ID_MIN,
            max,
        });
    let end_error = end
        .filter(|end| bounds.contains(end))
        .is_none()
        .then_some(ValidationError::InvalidIdEnd {
            min: VLAN_ID_MIN,
            max,
        });

    if start_error.is_some() || end_error.is_some() {
        return Some(FieldError::Positional(vec![start_error, end_error]));
    }

    let (Some(start), Some(end)) = (start, end) else {
        return None;
    };

    if start > end {
        return Some(FieldError::Positional(vec![
            Some(ValidationError::InvertedIdRange),
            None,
        ]));
    }

    tags.iter()
        .find(|tag| ranges_intersect(start, end, **tag))
        .map(|tag| {
            FieldError::Positional(vec![Some(ValidationError::VlanRangeIntersection(*tag)), None])
        })
}

fn validate_name(name: Option<&str>) -> Result<(), ValidationError> {
    let name = name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or(ValidationError::Required("name"))?;

    if !NETWORK_NAME_REGEX.is_match(name) {
        return Err(ValidationError::InvalidName);
    }

    Ok(())
}

/// The network hosting the floating pool, looked up in the default group first.
fn floating_reference_network<'a>(
    configuration: &'a NetworkConfiguration,
    groups: &NodeNetworkGroups,
) -> Option<&'a Network> {
    let is_reference = |network: &&Network| {
        network.meta.floating_range_var.as_deref() == Some(FLOATING_RANGES_VAR)
    };

    groups
        .default_group()
        .and_then(|group| {
            configuration
                .networks_in_group(group.id)
                .find(is_reference)
        })
        .or_else(|| configuration.networks.iter().find(is_reference))
}

fn validate_floating_ranges(
    configuration: &NetworkConfiguration,
    groups: &NodeNetworkGroups,
    network_errors: &BTreeMap<GroupId, GroupErrors>,
    settings: &ValidationSettings,
) -> Vec<IpRangeFieldError> {
    let floating_ranges = &configuration.networking_parameters.floating_ranges;

    let Some(network) = floating_reference_network(configuration, groups) else {
        tracing::debug!("no floating reference network, checking floating ranges on their own");
        return validate_ip_ranges(floating_ranges, RangeRules::default());
    };

    // an invalid reference CIDR was already reported on the network itself
    let Ok(cidr) = validate_cidr(network.cidr.as_deref(), settings) else {
        return validate_ip_ranges(floating_ranges, RangeRules::default());
    };

    let own_errors = network_errors
        .get(&network.group_id)
        .and_then(|networks| networks.get(&network.id))
        .and_then(|fields| fields.get(&NetworkField::IpRanges));

    let existing = match own_errors {
        Some(FieldError::Ranges(rows)) => valid_ip_ranges(&network.ip_ranges, rows),
        _ => valid_ip_ranges(&network.ip_ranges, &[]),
    };

    let reference = ReferenceNetwork {
        name: network.name.clone(),
        group: groups
            .get(network.group_id)
            .map(|group| group.name.clone())
            .unwrap_or_else(|| network.group_id.to_string()),
        cidr,
    };

    validate_ip_ranges(floating_ranges, RangeRules::reference(&reference, &existing))
}
