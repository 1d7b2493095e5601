use serde_json::json;

use cluster_net_config::roles::{
    check_readiness, LimitType, ModelContext, Node, RoleConflict, RoleMetadata, Roster,
};

fn metadata() -> RoleMetadata {
    RoleMetadata::from_json(include_str!("resources/roles.json")).unwrap()
}

fn context() -> ModelContext {
    ModelContext::from_json(include_str!("resources/context.json")).unwrap()
}

fn roster() -> Roster {
    Roster::from_json(include_str!("resources/roster.json")).unwrap()
}

#[test]
fn controller_minimum_not_met() {
    let metadata = metadata();
    let controller = metadata.get("controller").unwrap();

    let result = controller.check_limits(&context(), &roster(), true, &LimitType::DEFAULT);

    // node-1 is about to be removed
    assert_eq!(result.count, 0);
    assert!(!result.valid);
    assert_eq!(result.limits.min, Some(1));
    assert_eq!(
        result.message.as_deref(),
        Some("At least 1 Controller node(s) required")
    );
}

#[test]
fn override_applies_in_ha_mode() {
    let metadata = metadata();
    let controller = metadata.get("controller").unwrap();

    let context = context().with_model("cluster", json!({"mode": "ha_compact"}));
    let roster = Roster::new([Node::new(7).with_roles(["controller"])]);

    let result = controller.check_limits(&context, &roster, true, &LimitType::DEFAULT);

    assert!(!result.valid);
    assert_eq!(result.limits.min, Some(3));
    assert_eq!(
        result.message.as_deref(),
        Some("High availability mode requires at least three controllers.")
    );
}

#[test]
fn unresolved_and_overridden_limits() {
    let metadata = metadata();
    let context = context();
    let roster = roster();

    let mongo = metadata
        .get("mongo")
        .unwrap()
        .check_limits(&context, &roster, true, &LimitType::DEFAULT);
    assert!(mongo.valid);
    assert_eq!(mongo.limits.min, Some(0));

    // the pool size is a string, so the limit does not resolve
    let ceph = metadata
        .get("ceph-osd")
        .unwrap()
        .check_limits(&context, &roster, true, &LimitType::DEFAULT);
    assert!(ceph.valid);
    assert_eq!(ceph.count, 1);
    assert_eq!(ceph.limits.min, None);

    let compute = metadata.get("compute").unwrap().check_limits(
        &context,
        &roster,
        true,
        &[LimitType::Min, LimitType::Max, LimitType::Recommended],
    );
    assert!(compute.valid);
    assert_eq!(compute.count, 2);
    assert_eq!(compute.message, None);
}

#[test]
fn readiness_report() {
    let report = check_readiness(&metadata(), &context(), &roster());

    assert!(!report.is_ready());
    assert!(report.conflicts.is_empty());
    assert_eq!(
        report.messages(),
        vec!["At least 1 Controller node(s) required".to_string()]
    );

    let roster = Roster::new([
        Node::new(2)
            .with_roles(["compute"])
            .with_pending_roles(["controller"]),
        Node::new(3).with_roles(["compute"]),
    ]);
    let report = check_readiness(&metadata(), &context(), &roster);

    assert!(!report.is_ready());
    assert!(report.roles.values().all(|check| check.valid));
    assert_eq!(
        report.conflicts,
        vec![RoleConflict {
            node: 2,
            node_name: "node-2".to_string(),
            roles: ("compute".to_string(), "controller".to_string()),
        }]
    );
}
