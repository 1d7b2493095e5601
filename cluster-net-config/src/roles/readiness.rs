use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display};

use serde::Serialize;

use crate::roles::{LimitType, ModelContext, RoleLimitCheck, RoleMetadata, Roster};

/// A node that would carry two mutually exclusive roles after deployment.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct RoleConflict {
    pub node: u64,
    pub node_name: String,
    pub roles: (String, String),
}

impl Display for RoleConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} cannot have both the '{}' and the '{}' role",
            self.node_name, self.roles.0, self.roles.1
        )
    }
}

/// Whether the planned roster may be deployed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReadinessReport {
    pub roles: BTreeMap<String, RoleLimitCheck>,
    pub conflicts: Vec<RoleConflict>,
}

impl ReadinessReport {
    pub fn is_ready(&self) -> bool {
        self.conflicts.is_empty() && self.roles.values().all(|check| check.valid)
    }

    /// Every limit message and conflict, roles in name order.
    pub fn messages(&self) -> Vec<String> {
        self.roles
            .values()
            .filter_map(|check| check.message.clone())
            .chain(self.conflicts.iter().map(ToString::to_string))
            .collect()
    }
}

/// Checks the `min` and `max` limits of every role against the roster as it stands, and looks
/// for nodes with conflicting roles.
pub fn check_readiness(
    metadata: &RoleMetadata,
    context: &ModelContext,
    roster: &Roster,
) -> ReadinessReport {
    let roles = metadata
        .iter()
        .map(|role| {
            let check = role.check_limits(context, roster, true, &LimitType::DEFAULT);
            (role.name.clone(), check)
        })
        .collect();

    let mut conflicts = BTreeSet::new();

    for node in roster.iter() {
        let assigned = node.roles_after_deployment();

        for name in &assigned {
            let Some(role) = metadata.get(name) else {
                continue;
            };

            for other in role.conflicts.iter().filter(|other| assigned.contains(other.as_str())) {
                let (first, second) = if name <= &other.as_str() {
                    (name.to_string(), other.to_string())
                } else {
                    (other.to_string(), name.to_string())
                };

                conflicts.insert(RoleConflict {
                    node: node.id,
                    node_name: node.display_name(),
                    roles: (first, second),
                });
            }
        }
    }

    let report = ReadinessReport {
        roles,
        conflicts: conflicts.into_iter().collect(),
    };

    tracing::debug!(
        "deployment readiness: {} role(s) checked, {} conflict(s), ready: {}",
        report.roles.len(),
        report.conflicts.len(),
        report.is_ready()
    );

    report
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::roles::{LimitValue, Node, Role, RoleLimits};

    fn metadata() -> RoleMetadata {
        let mut controller = Role::new("controller");
        controller.label = Some("Controller".to_string());
        controller.limits = RoleLimits {
            min: Some(LimitValue::Literal(1)),
            ..Default::default()
        };
        controller.conflicts = BTreeSet::from(["compute".to_string()]);

        let mut compute = Role::new("compute");
        compute.label = Some("Compute".to_string());

        RoleMetadata::new([controller, compute, Role::new("cinder")])
    }

    #[test]
    fn test_ready() {
        let roster = Roster::new([
            Node::new(1).with_roles(["controller"]),
            Node::new(2).with_pending_roles(["compute", "cinder"]),
        ]);

        let report = check_readiness(&metadata(), &ModelContext::new(), &roster);

        assert!(report.is_ready());
        assert!(report.messages().is_empty());
        assert_eq!(report.roles["compute"].count, 1);
    }

    #[test]
    fn test_not_ready() {
        let roster = Roster::new([
            Node::new(1)
                .with_roles(["controller"])
                .pending_deletion(true),
            Node::new(2)
                .with_roles(["compute"])
                .with_pending_roles(["controller"]),
        ]);

        let report = check_readiness(
            &metadata(),
            &ModelContext::new().with_model("cluster", json!({})),
            &roster,
        );

        assert!(!report.is_ready());
        assert!(report.roles["controller"].valid);
        assert_eq!(
            report.conflicts,
            vec![RoleConflict {
                node: 2,
                node_name: "node-2".to_string(),
                roles: ("compute".to_string(), "controller".to_string()),
            }]
        );
        assert_eq!(
            report.messages(),
            vec!["node-2 cannot have both the 'compute' and the 'controller' role".to_string()]
        );

        let empty = check_readiness(&metadata(), &ModelContext::new(), &Roster::default());
        assert_eq!(
            empty.messages(),
            vec!["At least 1 Controller node(s) required".to_string()]
        );
    }
}
