use cluster_net_types::IpRange;

use cluster_net_config::common::valid::Validatable;
use cluster_net_config::network::{
    validate, ErrorKind, FieldError, FieldPath, GroupId, NetworkCheck, NetworkField, NetworkId,
    NodeNetworkGroups, ParameterField, ValidationError,
};

mod helper;

fn groups() -> NodeNetworkGroups {
    NodeNetworkGroups::from_json(include_str!("resources/groups.json")).unwrap()
}

fn network_field(group: u64, network: u64, field: NetworkField) -> FieldPath {
    FieldPath::Network {
        group: GroupId::new(group),
        network: NetworkId::new(network),
        field,
    }
}

#[test]
fn valid_neutron_deployment() {
    let config = helper::get_network_config!();

    let errors = validate(&config, &groups());
    assert!(errors.is_empty(), "unexpected errors: {errors}");

    let check = NetworkCheck::new(config, groups())
        .into_valid()
        .expect("configuration is valid");

    let saved = check.to_json().unwrap();
    let reloaded =
        cluster_net_config::network::NetworkConfiguration::from_json(&saved).unwrap();
    assert_eq!(reloaded, check.configuration);
}

#[test]
fn gateway_outside_cidr() {
    let config = helper::get_network_config!();

    let errors = validate(&config, &groups());

    assert_eq!(errors.iter().count(), 1);
    assert_eq!(
        errors.get(&network_field(1, 1, NetworkField::Gateway)),
        Some(&FieldError::Message(ValidationError::GatewayOutsideCidr))
    );
}

#[test]
fn duplicate_vlan_tags() {
    let config = helper::get_network_config!();

    let errors = validate(&config, &groups());

    // only the later declared network is flagged
    assert_eq!(errors.iter().count(), 1);
    assert_eq!(
        errors.get(&network_field(1, 3, NetworkField::VlanStart)),
        Some(&FieldError::Message(ValidationError::VlanInUse(101)))
    );
    assert_eq!(
        errors.count_by_kind().get(&ErrorKind::Intersection),
        Some(&1)
    );

    insta::assert_snapshot!(errors.to_json().unwrap(), @r###"
    {
      "networks": {
        "1": {
          "3": {
            "vlan_start": "VLAN id 101 is already used by another network"
          }
        }
      },
      "networking_parameters": {}
    }
    "###);
}

#[test]
fn nova_vlan_manager() {
    let config = helper::get_network_config!();

    let errors = validate(&config, &groups());

    assert_eq!(
        errors.get(&FieldPath::Parameter(ParameterField::FixedNetworksAmount)),
        Some(&FieldError::Message(ValidationError::NotEnoughVlanIds {
            requested: 10,
            available: 5,
        }))
    );
    assert_eq!(errors.count_by_kind().get(&ErrorKind::Capacity), Some(&1));

    insta::assert_snapshot!(errors.to_json().unwrap(), @r###"
    {
      "networks": {
        "1": {
          "1": {
            "gateway": "gateway is outside of the network CIDR"
          },
          "3": {
            "vlan_start": "VLAN id 101 is already used by another network"
          }
        }
      },
      "networking_parameters": {
        "fixed_networks_amount": "need more VLAN ids: 10 requested, 5 available",
        "dns_nameservers": [
          null,
          "invalid nameserver"
        ]
      }
    }
    "###);
}

#[test]
fn multiple_groups() {
    let config = helper::get_network_config!();
    let groups = NodeNetworkGroups::from_json(
        r#"[{"id": 2, "name": "rack-2"}, {"id": 1, "name": "default"}]"#,
    )
    .unwrap();

    let errors = validate(&config, &groups);

    // the same tag in two groups is fine, floating ranges are checked against the default group
    assert_eq!(errors.networks().len(), 1);
    assert_eq!(
        errors.get(&network_field(2, 5, NetworkField::VlanStart)),
        Some(&FieldError::Message(ValidationError::VlanInUse(101)))
    );
    assert!(errors.networking_parameters().is_empty());
    assert_eq!(
        errors.to_string(),
        "networks.2.5.vlan_start: VLAN id 101 is already used by another network"
    );
}

#[test]
fn floating_ranges_skip_invalid_public_ranges() {
    let config = helper::get_network_config!();

    let errors = validate(&config, &groups());

    let public_range = IpRange::new([172, 16, 0, 2], [172, 16, 0, 126]).unwrap();
    assert_eq!(
        errors
            .network(GroupId::new(1), NetworkId::new(1))
            .map(|fields| fields.len()),
        Some(1)
    );

    let floating = errors
        .networking_parameters()
        .get(&ParameterField::FloatingRanges)
        .expect("floating range errors");
    assert!(floating.errors().all(|error| matches!(
        error,
        ValidationError::ReferenceRangesIntersect { range, .. } if *range == public_range
    )));

    insta::assert_snapshot!(errors.to_json().unwrap(), @r###"
    {
      "networks": {
        "1": {
          "1": {
            "ip_ranges": [
              {
                "index": 1,
                "start": "IP range intersects with 172.16.0.2-172.16.0.126",
                "end": "IP range intersects with 172.16.0.2-172.16.0.126"
              }
            ]
          }
        }
      },
      "networking_parameters": {
        "floating_ranges": [
          {
            "index": 1,
            "start": "IP range intersects with 172.16.0.2-172.16.0.126 of network 'public' in node network group 'default'",
            "end": "IP range intersects with 172.16.0.2-172.16.0.126 of network 'public' in node network group 'default'"
          }
        ]
      }
    }
    "###);
}

#[test]
fn revalidation_is_deterministic() {
    let config = cluster_net_config::network::NetworkConfiguration::from_json(include_str!(
        "resources/nova_vlan_manager.json"
    ))
    .unwrap();
    let before = config.clone();

    let first = validate(&config, &groups()).to_json().unwrap();
    let second = validate(&config, &groups()).to_json().unwrap();

    assert_eq!(first, second);
    assert_eq!(config, before);
}

#[test]
fn rejected_edit_keeps_snapshot() {
    let config = cluster_net_config::network::NetworkConfiguration::from_json(include_str!(
        "resources/valid_neutron_deployment.json"
    ))
    .unwrap();

    let check = NetworkCheck::new(config, groups()).into_valid().unwrap();

    let (check, errors) = check
        .edit(|check| check.configuration.networks[0].cidr = Some("172.16.0.0/33".to_string()))
        .unwrap_err();

    assert_eq!(
        check.configuration.networks[0].cidr.as_deref(),
        Some("172.16.0.0/24")
    );
    assert_eq!(
        errors.get(&network_field(1, 1, NetworkField::Cidr)),
        Some(&FieldError::Message(ValidationError::InvalidCidr))
    );

    let check = check
        .edit(|check| check.configuration.networks[1].vlan_start = Some(200))
        .unwrap();
    assert_eq!(check.configuration.networks[1].vlan_start, Some(200));
}
