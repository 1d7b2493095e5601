use std::collections::BTreeSet;

use anyhow::{Context, Error};
use serde::{Deserialize, Serialize};

/// A node of the deployment, with its current and planned roles.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Node {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Roles the node is deployed with.
    #[serde(default)]
    pub roles: BTreeSet<String>,
    /// Roles that get applied by the next deployment.
    #[serde(default)]
    pub pending_roles: BTreeSet<String>,
    #[serde(default)]
    pub pending_deletion: bool,
}

impl Node {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn with_pending_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pending_roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn pending_deletion(mut self, pending_deletion: bool) -> Self {
        self.pending_deletion = pending_deletion;
        self
    }

    /// Roles the node has once the pending changes are deployed, empty for nodes being removed.
    pub fn roles_after_deployment(&self) -> BTreeSet<&str> {
        if self.pending_deletion {
            return BTreeSet::new();
        }

        self.roles
            .iter()
            .chain(self.pending_roles.iter())
            .map(String::as_str)
            .collect()
    }

    pub fn has_role_after_deployment(&self, role: &str) -> bool {
        !self.pending_deletion && (self.roles.contains(role) || self.pending_roles.contains(role))
    }

    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| format!("node-{}", self.id))
    }
}

/// The nodes of one deployment.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct Roster(Vec<Node>);

impl Roster {
    pub fn new(nodes: impl IntoIterator<Item = Node>) -> Self {
        Self(nodes.into_iter().collect())
    }

    pub fn from_json(input: &str) -> Result<Self, Error> {
        log::trace!("parsing node roster");
        serde_json::from_str(input).context("invalid node roster")
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> + '_ {
        self.0.iter()
    }

    /// Number of nodes that carry `role` once the pending changes are deployed.
    pub fn count_after_deployment(&self, role: &str) -> usize {
        self.0
            .iter()
            .filter(|node| node.has_role_after_deployment(role))
            .count()
    }
}

impl FromIterator<Node> for Roster {
    fn from_iter<T: IntoIterator<Item = Node>>(iter: T) -> Self {
        Self::new(iter)
    }
}
