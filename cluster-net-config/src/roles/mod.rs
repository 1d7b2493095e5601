//! Node count limits of deployment roles.
//!
//! A role declares `min`, `max` and `recommended` node counts, each a literal or an
//! [`Expression`] over the supplied [`ModelContext`]. Overrides whose condition holds replace the
//! role's own value for the limit types they set.

pub mod expression;
pub mod readiness;
pub mod roster;

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Error};
use serde::{Deserialize, Serialize};

use crate::network::error::ErrorKind;

pub use expression::{CompareOp, Expression, ExpressionError, ModelContext, ModelPath};
pub use readiness::{check_readiness, ReadinessReport, RoleConflict};
pub use roster::{Node, Roster};

/// A node count limit, either fixed or computed from the models.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LimitValue {
    Literal(i64),
    Expression(Expression),
}

impl LimitValue {
    pub fn resolve(&self, context: &ModelContext) -> Result<i64, ExpressionError> {
        match self {
            LimitValue::Literal(value) => Ok(*value),
            LimitValue::Expression(expression) => expression.integer(context),
        }
    }
}

impl From<i64> for LimitValue {
    fn from(value: i64) -> Self {
        LimitValue::Literal(value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitType {
    Min,
    Max,
    Recommended,
}

impl LimitType {
    /// Limit types checked unless the caller asks for others.
    pub const DEFAULT: [LimitType; 2] = [LimitType::Min, LimitType::Max];

    /// Whether `count` nodes violate `limit`.
    ///
    /// With `check_limit_is_reached` the question is whether the roster is valid as it stands.
    /// Without it, a limit that is exactly met counts as violated, which answers whether one
    /// more node can still be removed (`min`) or added (`max`).
    pub fn is_violated(self, count: i64, limit: i64, check_limit_is_reached: bool) -> bool {
        match (self, check_limit_is_reached) {
            (LimitType::Min, true) => count < limit,
            (LimitType::Min, false) => count <= limit,
            (LimitType::Max, true) => count > limit,
            (LimitType::Max, false) => count >= limit,
            (LimitType::Recommended, _) => count < limit,
        }
    }

    /// The stricter of two limits of this type.
    fn most_restrictive(self, a: i64, b: i64) -> i64 {
        match self {
            LimitType::Max => a.min(b),
            LimitType::Min | LimitType::Recommended => a.max(b),
        }
    }

    fn default_message(self, limit: i64, label: &str) -> String {
        match self {
            LimitType::Min => format!("At least {limit} {label} node(s) required"),
            LimitType::Max => format!("At most {limit} {label} node(s) allowed"),
            LimitType::Recommended => format!("{limit} or more {label} node(s) recommended"),
        }
    }
}

/// Replaces limits of a role while `condition` holds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LimitOverride {
    pub condition: Expression,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<LimitValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<LimitValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended: Option<LimitValue>,
    /// Replaces the generated message of every limit this override sets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl LimitOverride {
    pub fn value(&self, limit_type: LimitType) -> Option<&LimitValue> {
        match limit_type {
            LimitType::Min => self.min.as_ref(),
            LimitType::Max => self.max.as_ref(),
            LimitType::Recommended => self.recommended.as_ref(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct RoleLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<LimitValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<LimitValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended: Option<LimitValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<LimitOverride>,
}

impl RoleLimits {
    pub fn value(&self, limit_type: LimitType) -> Option<&LimitValue> {
        match limit_type {
            LimitType::Min => self.min.as_ref(),
            LimitType::Max => self.max.as_ref(),
            LimitType::Recommended => self.recommended.as_ref(),
        }
    }
}

/// Limits after overrides and expressions were applied, `None` where no constraint applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Default)]
pub struct ResolvedLimits {
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub recommended: Option<i64>,
}

impl ResolvedLimits {
    pub fn get(&self, limit_type: LimitType) -> Option<i64> {
        match limit_type {
            LimitType::Min => self.min,
            LimitType::Max => self.max,
            LimitType::Recommended => self.recommended,
        }
    }

    fn slot(&mut self, limit_type: LimitType) -> &mut Option<i64> {
        match limit_type {
            LimitType::Min => &mut self.min,
            LimitType::Max => &mut self.max,
            LimitType::Recommended => &mut self.recommended,
        }
    }

    fn tighten(&mut self, limit_type: LimitType, limit: i64) {
        let slot = self.slot(limit_type);
        *slot = Some(match *slot {
            Some(current) => limit_type.most_restrictive(current, limit),
            None => limit,
        });
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LimitViolation {
    pub limit_type: LimitType,
    pub limit: i64,
    pub message: String,
}

impl LimitViolation {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Capacity
    }
}

/// Outcome of [`Role::check_limits`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RoleLimitCheck {
    pub count: usize,
    pub limits: ResolvedLimits,
    /// Messages of all violations, joined by a space.
    pub message: Option<String>,
    /// `false` if a `min` or `max` limit is violated, `recommended` is advisory.
    pub valid: bool,
    /// At most one violation per limit type, the most restrictive one.
    pub violations: Vec<LimitViolation>,
}

/// A deployment role.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub limits: RoleLimits,
    /// Roles that must not be assigned to the same node.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub conflicts: BTreeSet<String>,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            limits: RoleLimits::default(),
            conflicts: BTreeSet::new(),
        }
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    fn resolve(
        &self,
        value: &LimitValue,
        limit_type: LimitType,
        context: &ModelContext,
    ) -> Option<i64> {
        value
            .resolve(context)
            .inspect_err(|err| {
                tracing::debug!(
                    "role '{}': {limit_type:?} limit does not resolve, ignoring it: {err}",
                    self.name
                )
            })
            .ok()
    }

    /// Checks the node count of this role in `roster` against its limits.
    ///
    /// Only the types in `limit_types` are checked. A limit that does not resolve is treated as
    /// absent, an override whose condition does not evaluate as not applying.
    pub fn check_limits(
        &self,
        context: &ModelContext,
        roster: &Roster,
        check_limit_is_reached: bool,
        limit_types: &[LimitType],
    ) -> RoleLimitCheck {
        let count = roster.count_after_deployment(&self.name);
        let node_count = i64::try_from(count).unwrap_or(i64::MAX);
        let limit_types: BTreeSet<LimitType> = limit_types.iter().copied().collect();

        let mut limits = ResolvedLimits::default();
        let mut overridden = BTreeSet::new();
        let mut candidates: BTreeMap<LimitType, Vec<LimitViolation>> = BTreeMap::new();

        let mut check = |limit_type: LimitType, limit: i64, message: Option<&String>| {
            if limit_type.is_violated(node_count, limit, check_limit_is_reached) {
                candidates.entry(limit_type).or_default().push(LimitViolation {
                    limit_type,
                    limit,
                    message: message
                        .cloned()
                        .unwrap_or_else(|| limit_type.default_message(limit, self.label())),
                });
            }
        };

        for limit_override in &self.limits.overrides {
            match limit_override.condition.is_true(context) {
                Ok(true) => (),
                Ok(false) => continue,
                Err(err) => {
                    tracing::debug!(
                        "role '{}': override condition does not evaluate, skipping it: {err}",
                        self.name
                    );
                    continue;
                }
            }

            for &limit_type in &limit_types {
                let Some(value) = limit_override.value(limit_type) else {
                    continue;
                };

                overridden.insert(limit_type);

                if let Some(limit) = self.resolve(value, limit_type, context) {
                    limits.tighten(limit_type, limit);
                    check(limit_type, limit, limit_override.message.as_ref());
                }
            }
        }

        for &limit_type in &limit_types {
            if overridden.contains(&limit_type) {
                continue;
            }

            let Some(value) = self.limits.value(limit_type) else {
                continue;
            };

            if let Some(limit) = self.resolve(value, limit_type, context) {
                limits.tighten(limit_type, limit);
                check(limit_type, limit, None);
            }
        }

        let violations: Vec<LimitViolation> = candidates
            .into_iter()
            .filter_map(|(limit_type, violations)| match limit_type {
                LimitType::Max => violations.into_iter().min_by_key(|v| v.limit),
                LimitType::Min | LimitType::Recommended => {
                    violations.into_iter().max_by_key(|v| v.limit)
                }
            })
            .collect();

        let message = (!violations.is_empty()).then(|| {
            violations
                .iter()
                .map(|violation| violation.message.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        });

        let valid = !violations
            .iter()
            .any(|violation| violation.limit_type != LimitType::Recommended);

        RoleLimitCheck {
            count,
            limits,
            message,
            valid,
            violations,
        }
    }
}

/// The roles of a release.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct RoleMetadata(Vec<Role>);

impl RoleMetadata {
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Self {
        Self(roles.into_iter().collect())
    }

    pub fn from_json(input: &str) -> Result<Self, Error> {
        log::trace!("parsing role metadata");
        serde_json::from_str(input).context("invalid role metadata")
    }

    pub fn get(&self, name: &str) -> Option<&Role> {
        self.0.iter().find(|role| role.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Role> + '_ {
        self.0.iter()
    }
}
