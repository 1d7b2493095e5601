use std::collections::BTreeSet;
use std::fmt::{self, Display};

use thiserror::Error;

/// Lowest VLAN tag or segmentation id that can be assigned.
pub const VLAN_ID_MIN: i64 = 2;
/// Highest assignable 802.1Q VLAN tag.
pub const VLAN_ID_MAX: i64 = 4094;
/// Highest assignable tunnel (GRE/VXLAN) segmentation id.
pub const TUNNEL_ID_MAX: i64 = 65535;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VlanIdError {
    #[error("an id is required")]
    Missing,
    #[error("id must be between {min} and {max}")]
    OutOfRange { min: i64, max: i64 },
    #[error("id {0} is already in use")]
    Forbidden(i64),
}

/// Either a single id or a closed range of ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdSpan {
    Single(i64),
    Range(i64, i64),
}

impl IdSpan {
    fn bounds(&self) -> (i64, i64) {
        match *self {
            IdSpan::Single(id) => (id, id),
            IdSpan::Range(start, end) => (start, end),
        }
    }
}

impl From<i64> for IdSpan {
    fn from(value: i64) -> Self {
        IdSpan::Single(value)
    }
}

impl From<(i64, i64)> for IdSpan {
    fn from((start, end): (i64, i64)) -> Self {
        IdSpan::Range(start, end)
    }
}

impl Display for IdSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdSpan::Single(id) => write!(f, "{id}"),
            IdSpan::Range(start, end) => write!(f, "{start}-{end}"),
        }
    }
}

/// Returns true if the window `[start, end]` shares at least one id with `candidate`.
///
/// Serves both "does this tag fall inside that window" and "do these two windows overlap".
pub fn ranges_intersect(start: i64, end: i64, candidate: impl Into<IdSpan>) -> bool {
    let (candidate_start, candidate_end) = candidate.into().bounds();
    start <= candidate_end && candidate_start <= end
}

/// Rules applied by [`validate_vlan_id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VlanPolicy {
    pub min: i64,
    pub max: i64,
    /// `None` (untagged) passes instead of being reported as missing.
    pub allow_untagged: bool,
    /// Collisions with the forbidden set are reported; otherwise they are tolerated.
    pub strict: bool,
}

impl VlanPolicy {
    pub const fn new(max: i64) -> Self {
        Self {
            min: VLAN_ID_MIN,
            max,
            allow_untagged: true,
            strict: true,
        }
    }

    pub const fn allow_untagged(mut self, allow_untagged: bool) -> Self {
        self.allow_untagged = allow_untagged;
        self
    }

    pub const fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

impl Default for VlanPolicy {
    fn default() -> Self {
        Self::new(VLAN_ID_MAX)
    }
}

/// Validates a single VLAN tag against its numeric window and the set of ids already in use.
pub fn validate_vlan_id(
    value: Option<i64>,
    forbidden: &BTreeSet<i64>,
    policy: VlanPolicy,
) -> Result<(), VlanIdError> {
    let Some(value) = value else {
        if policy.allow_untagged {
            return Ok(());
        }

        return Err(VlanIdError::Missing);
    };

    if !(policy.min..=policy.max).contains(&value) {
        return Err(VlanIdError::OutOfRange {
            min: policy.min,
            max: policy.max,
        });
    }

    if policy.strict && forbidden.contains(&value) {
        return Err(VlanIdError::Forbidden(value));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_vlan_id() {
        let forbidden = BTreeSet::from([100, 200]);
        let policy = VlanPolicy::default();

        assert_eq!(validate_vlan_id(None, &forbidden, policy), Ok(()));
        assert_eq!(validate_vlan_id(Some(2), &forbidden, policy), Ok(()));
        assert_eq!(validate_vlan_id(Some(4094), &forbidden, policy), Ok(()));

        assert_eq!(
            validate_vlan_id(Some(1), &forbidden, policy),
            Err(VlanIdError::OutOfRange { min: 2, max: 4094 })
        );
        assert_eq!(
            validate_vlan_id(Some(4095), &forbidden, policy),
            Err(VlanIdError::OutOfRange { min: 2, max: 4094 })
        );
        assert_eq!(
            validate_vlan_id(Some(100), &forbidden, policy),
            Err(VlanIdError::Forbidden(100))
        );

        assert_eq!(
            validate_vlan_id(Some(100), &forbidden, policy.strict(false)),
            Ok(())
        );
        assert_eq!(
            validate_vlan_id(None, &forbidden, policy.allow_untagged(false)),
            Err(VlanIdError::Missing)
        );
    }

    #[test]
    fn test_tunnel_window() {
        let policy = VlanPolicy::new(TUNNEL_ID_MAX);

        assert_eq!(validate_vlan_id(Some(65535), &BTreeSet::new(), policy), Ok(()));
        assert_eq!(
            validate_vlan_id(Some(65536), &BTreeSet::new(), policy),
            Err(VlanIdError::OutOfRange {
                min: 2,
                max: 65535
            })
        );
    }

    #[test]
    fn test_ranges_intersect() {
        assert!(ranges_intersect(1000, 1030, 1000));
        assert!(ranges_intersect(1000, 1030, 1030));
        assert!(!ranges_intersect(1000, 1030, 999));
        assert!(!ranges_intersect(1000, 1030, 1031));

        assert!(ranges_intersect(1000, 1030, (1030, 1040)));
        assert!(ranges_intersect(1000, 1030, (900, 2000)));
        assert!(!ranges_intersect(1000, 1030, (1031, 1040)));
    }

    #[test]
    fn test_id_span_display() {
        assert_eq!(IdSpan::from(101).to_string(), "101");
        assert_eq!(IdSpan::from((1000, 1030)).to_string(), "1000-1030");
    }
}
