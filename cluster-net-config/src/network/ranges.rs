use std::net::Ipv4Addr;

use cluster_net_types::{IpRange, Ipv4Cidr};

use crate::network::config::RawIpRange;
use crate::network::error::{IpRangeFieldError, ValidationError};

/// A network whose block must contain a globally declared pool.
///
/// Errors against it name the network and its group, so they can be told apart from errors
/// against the pool's own network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferenceNetwork {
    pub name: String,
    pub group: String,
    pub cidr: Ipv4Cidr,
}

/// What a list of IP ranges is checked against.
#[derive(Clone, Copy, Debug, Default)]
pub struct RangeRules<'a> {
    /// Block both endpoints of every range have to be in, if any.
    pub cidr: Option<&'a Ipv4Cidr>,
    /// Ranges that must not be overlapped.
    pub existing: &'a [IpRange],
    /// Set when `cidr` and `existing` belong to another network.
    pub reference: Option<&'a ReferenceNetwork>,
}

impl<'a> RangeRules<'a> {
    pub fn within(cidr: &'a Ipv4Cidr) -> Self {
        Self {
            cidr: Some(cidr),
            ..Default::default()
        }
    }

    pub fn reference(reference: &'a ReferenceNetwork, existing: &'a [IpRange]) -> Self {
        Self {
            cidr: Some(&reference.cidr),
            existing,
            reference: Some(reference),
        }
    }

    fn check_endpoint(&self, value: Option<&str>) -> Result<Ipv4Addr, ValidationError> {
        let address: Ipv4Addr = value
            .and_then(|value| value.parse().ok())
            .ok_or(ValidationError::InvalidIp)?;

        if let Some(cidr) = self.cidr {
            if !cidr.contains_address(&address) {
                return Err(match self.reference {
                    Some(reference) => ValidationError::IpOutsideReferenceCidr {
                        cidr: reference.cidr.to_string(),
                        network: reference.name.clone(),
                        group: reference.group.clone(),
                    },
                    None => ValidationError::IpOutsideCidr,
                });
            }
        }

        Ok(address)
    }

    fn intersection_error(&self, range: IpRange) -> ValidationError {
        match self.reference {
            Some(reference) => ValidationError::ReferenceRangesIntersect {
                range,
                network: reference.name.clone(),
                group: reference.group.clone(),
            },
            None => ValidationError::IpRangesIntersect(range),
        }
    }
}

/// Checks a table of IP ranges row by row.
///
/// Blank rows are skipped, but a table without any non-blank row is an error on row 0. Overlaps
/// between rows are only looked for once every row is well-formed; the later row of an
/// overlapping pair is flagged.
pub fn validate_ip_ranges(ranges: &[RawIpRange], rules: RangeRules<'_>) -> Vec<IpRangeFieldError> {
    let mut errors = Vec::new();

    if ranges.iter().all(RawIpRange::is_blank) {
        errors.push(IpRangeFieldError::whole_range(
            0,
            ValidationError::EmptyIpRanges,
        ));
        return errors;
    }

    let mut valid: Vec<(usize, IpRange)> = Vec::new();

    for (index, range) in ranges.iter().enumerate() {
        if range.is_blank() {
            continue;
        }

        let start = rules.check_endpoint(range.start());
        let end = rules.check_endpoint(range.end());

        let (start, end) = match (start, end) {
            (Ok(start), Ok(end)) => (start, end),
            (start, end) => {
                errors.push(IpRangeFieldError {
                    index,
                    start: start.err(),
                    end: end.err(),
                });
                continue;
            }
        };

        let Ok(range) = IpRange::new(start, end) else {
            errors.push(IpRangeFieldError::whole_range(
                index,
                ValidationError::InvertedIpRange,
            ));
            continue;
        };

        if let Some(existing) = rules.existing.iter().find(|other| other.overlaps(&range)) {
            errors.push(IpRangeFieldError::whole_range(
                index,
                rules.intersection_error(*existing),
            ));
            continue;
        }

        valid.push((index, range));
    }

    if errors.is_empty() {
        for (position, (index, range)) in valid.iter().enumerate() {
            if let Some((_, earlier)) = valid[..position]
                .iter()
                .find(|(_, earlier)| earlier.overlaps(range))
            {
                errors.push(IpRangeFieldError::whole_range(
                    *index,
                    ValidationError::IpRangesIntersect(*earlier),
                ));
            }
        }
    }

    errors
}

/// Parses the rows of a table that did not produce an error.
pub fn valid_ip_ranges(ranges: &[RawIpRange], errors: &[IpRangeFieldError]) -> Vec<IpRange> {
    ranges
        .iter()
        .enumerate()
        .filter(|(index, _)| !errors.iter().any(|error| error.index == *index))
        .filter_map(|(_, range)| {
            let start: Ipv4Addr = range.start()?.parse().ok()?;
            let end: Ipv4Addr = range.end()?.parse().ok()?;
            IpRange::new(start, end).ok()
        })
        .collect()
}
