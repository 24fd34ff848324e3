//! Voice region inference and region-group tagging.
//!
//! Ref: spec §6 "Voice-region inference" and "Region-group configuration".

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A coarse geographic grouping for a Discord voice region.
///
/// Nodes are tagged with one of these at configuration time (§3 NodeConfig);
/// the [region penalty provider][crate::balancer::RegionPenaltyProvider]
/// prefers nodes whose group matches the guild's current voice region.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum RegionGroup {
    Africa,
    Asia,
    Europe,
    MiddleEast,
    SouthAmerica,
    Us,
    /// No group could be determined, either because the input was absent or
    /// unrecognized.
    Unknown,
}

impl RegionGroup {
    /// Parse a case-insensitive literal as named in spec §6.
    ///
    /// Any value other than the six named literals yields [`Unknown`].
    ///
    /// [`Unknown`]: Self::Unknown
    pub fn from_raw(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "AFRICA" => Self::Africa,
            "ASIA" => Self::Asia,
            "EUROPE" => Self::Europe,
            "MIDDLE_EAST" => Self::MiddleEast,
            "SOUTH_AMERICA" => Self::SouthAmerica,
            "US" => Self::Us,
            _ => Self::Unknown,
        }
    }

    /// The canonical uppercase literal for this group.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Africa => "AFRICA",
            Self::Asia => "ASIA",
            Self::Europe => "EUROPE",
            Self::MiddleEast => "MIDDLE_EAST",
            Self::SouthAmerica => "SOUTH_AMERICA",
            Self::Us => "US",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Known Discord voice-region identifiers mapped onto a [`RegionGroup`].
///
/// This list is intentionally small: it covers the region ids that have
/// historically appeared in Discord voice server endpoints. Anything absent
/// from it falls back to [`RegionGroup::Unknown`], which is the designed
/// behavior for region ids we've never seen (§6, §8 property 7).
const KNOWN_REGIONS: &[(&str, RegionGroup)] = &[
    ("rotterdam", RegionGroup::Europe),
    ("amsterdam", RegionGroup::Europe),
    ("frankfurt", RegionGroup::Europe),
    ("london", RegionGroup::Europe),
    ("milan", RegionGroup::Europe),
    ("russia", RegionGroup::Europe),
    ("south-korea", RegionGroup::Asia),
    ("southkorea", RegionGroup::Asia),
    ("singapore", RegionGroup::Asia),
    ("india", RegionGroup::Asia),
    ("hongkong", RegionGroup::Asia),
    ("japan", RegionGroup::Asia),
    ("sydney", RegionGroup::Asia),
    ("south-africa", RegionGroup::Africa),
    ("southafrica", RegionGroup::Africa),
    ("dubai", RegionGroup::MiddleEast),
    ("brazil", RegionGroup::SouthAmerica),
    ("santa-clara", RegionGroup::Us),
    ("us-central", RegionGroup::Us),
    ("us-east", RegionGroup::Us),
    ("us-south", RegionGroup::Us),
    ("us-west", RegionGroup::Us),
    ("newark", RegionGroup::Us),
    ("atlanta", RegionGroup::Us),
];

fn endpoint_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^([a-z\-]+)[0-9]+.*:443$").expect("valid regex"))
}

/// Infer a [`RegionGroup`] from a Discord voice-server `endpoint`, e.g.
/// `"rotterdam1234.discord.media:443"`.
///
/// Returns [`RegionGroup::Unknown`] if the endpoint doesn't match the
/// expected shape or names a region id we don't recognize.
pub fn from_endpoint(endpoint: &str) -> RegionGroup {
    let Some(captures) = endpoint_pattern().captures(endpoint) else {
        return RegionGroup::Unknown;
    };

    let region_id = &captures[1];

    KNOWN_REGIONS
        .iter()
        .find(|(id, _)| *id == region_id)
        .map_or(RegionGroup::Unknown, |(_, group)| *group)
}

#[cfg(test)]
mod tests {
    use super::{from_endpoint, RegionGroup, KNOWN_REGIONS};

    #[test]
    fn region_group_round_trips_by_name() {
        for group in [
            RegionGroup::Africa,
            RegionGroup::Asia,
            RegionGroup::Europe,
            RegionGroup::MiddleEast,
            RegionGroup::SouthAmerica,
            RegionGroup::Us,
            RegionGroup::Unknown,
        ] {
            assert_eq!(RegionGroup::from_raw(group.name()), group);
        }
    }

    #[test]
    fn from_raw_is_case_insensitive() {
        assert_eq!(RegionGroup::from_raw("europe"), RegionGroup::Europe);
        assert_eq!(RegionGroup::from_raw("Europe"), RegionGroup::Europe);
    }

    #[test]
    fn from_raw_falls_back_to_unknown() {
        assert_eq!(RegionGroup::from_raw("atlantis"), RegionGroup::Unknown);
    }

    #[test]
    fn every_known_region_resolves_from_its_endpoint() {
        for (id, group) in KNOWN_REGIONS {
            let endpoint = format!("{id}1234.discord.media:443");
            assert_eq!(from_endpoint(&endpoint), *group, "endpoint: {endpoint}");
        }
    }

    #[test]
    fn unmatched_endpoints_are_unknown() {
        assert_eq!(from_endpoint("not-an-endpoint"), RegionGroup::Unknown);
        assert_eq!(from_endpoint("rotterdam1234.discord.media:80"), RegionGroup::Unknown);
    }
}
