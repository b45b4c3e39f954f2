use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Category of an address part, derived from its address rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressType {
    House,
    Street,
    Locality,
    District,
    City,
    County,
    State,
    Country,
    /// Ranks outside every interval: continents, seas and similar.
    Other,
}

struct RankBand {
    kind: AddressType,
    ranks: RangeInclusive<u8>,
    weight: f32,
}

/// Disjoint rank intervals, most specific first. Together they cover 4..=30.
static RANK_BANDS: [RankBand; 8] = [
    RankBand { kind: AddressType::House, ranks: 29..=30, weight: 0.9 },
    RankBand { kind: AddressType::Street, ranks: 26..=28, weight: 1.0 },
    RankBand { kind: AddressType::Locality, ranks: 22..=25, weight: 1.0 },
    RankBand { kind: AddressType::District, ranks: 17..=21, weight: 1.1 },
    RankBand { kind: AddressType::City, ranks: 13..=16, weight: 1.4 },
    RankBand { kind: AddressType::County, ranks: 10..=12, weight: 1.2 },
    RankBand { kind: AddressType::State, ranks: 5..=9, weight: 1.3 },
    RankBand { kind: AddressType::Country, ranks: 4..=4, weight: 1.5 },
];

const OTHER_WEIGHT: f32 = 0.5;

impl AddressType {
    /// Every type that owns a rank interval.
    pub const RANKED: [Self; 8] = [
        Self::House,
        Self::Street,
        Self::Locality,
        Self::District,
        Self::City,
        Self::County,
        Self::State,
        Self::Country,
    ];

    fn band(self) -> Option<&'static RankBand> {
        RANK_BANDS.iter().find(|band| band.kind == self)
    }

    /// The type whose interval covers `rank`, if any.
    pub fn covering(rank: u8) -> Option<Self> {
        RANK_BANDS
            .iter()
            .find(|band| band.ranks.contains(&rank))
            .map(|band| band.kind)
    }

    /// Like [`covering`](Self::covering) but total: uncovered ranks map to
    /// [`AddressType::Other`].
    pub fn from_rank(rank: u8) -> Self {
        Self::covering(rank).unwrap_or_else(|| {
            debug!(rank, "Address rank outside the known intervals, using 'other'");
            Self::Other
        })
    }

    pub fn covers_rank(self, rank: u8) -> bool {
        self.band().is_some_and(|band| band.ranks.contains(&rank))
    }

    pub fn rank_range(self) -> Option<RangeInclusive<u8>> {
        self.band().map(|band| band.ranks.clone())
    }

    /// Weight applied to search scores of documents of this type.
    pub fn priority_weight(self) -> f32 {
        self.band().map_or(OTHER_WEIGHT, |band| band.weight)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::House => "house",
            Self::Street => "street",
            Self::Locality => "locality",
            Self::District => "district",
            Self::City => "city",
            Self::County => "county",
            Self::State => "state",
            Self::Country => "country",
            Self::Other => "other",
        }
    }

    /// The ranked type with the given layer name. `other` is not a layer.
    pub fn from_layer(name: &str) -> Option<Self> {
        Self::RANKED.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_address_rank_is_covered() {
        for rank in 4..=30 {
            assert!(
                AddressType::covering(rank).is_some(),
                "rank {rank} should be covered"
            );
            assert_ne!(AddressType::from_rank(rank), AddressType::Other);
        }
    }

    #[test]
    fn test_intervals_are_disjoint() {
        for rank in 0..=u8::MAX {
            let owners = AddressType::RANKED
                .iter()
                .filter(|t| t.covers_rank(rank))
                .count();
            assert!(owners <= 1, "rank {rank} is covered by {owners} types");
        }
    }

    #[test]
    fn test_out_of_range_ranks_are_other() {
        for rank in [0, 1, 2, 3, 31, 40] {
            assert_eq!(AddressType::covering(rank), None);
            assert_eq!(AddressType::from_rank(rank), AddressType::Other);
        }
    }

    #[test]
    fn test_boundaries() {
        assert_eq!(AddressType::from_rank(4), AddressType::Country);
        assert_eq!(AddressType::from_rank(9), AddressType::State);
        assert_eq!(AddressType::from_rank(16), AddressType::City);
        assert_eq!(AddressType::from_rank(17), AddressType::District);
        assert_eq!(AddressType::from_rank(28), AddressType::Street);
        assert_eq!(AddressType::from_rank(29), AddressType::House);
        assert_eq!(AddressType::City.rank_range(), Some(13..=16));
        assert_eq!(AddressType::Other.rank_range(), None);
    }

    #[test]
    fn test_priority_weights() {
        assert!(AddressType::City.priority_weight() > AddressType::Street.priority_weight());
        assert!((AddressType::Other.priority_weight() - OTHER_WEIGHT).abs() < f32::EPSILON);
    }

    #[test]
    fn test_serializes_lowercase() {
        let json = serde_json::to_string(&AddressType::County).unwrap();
        assert_eq!(json, "\"county\"");
    }

    #[test]
    fn test_layer_names() {
        assert_eq!(AddressType::from_layer("city"), Some(AddressType::City));
        assert_eq!(AddressType::from_layer("house"), Some(AddressType::House));
        assert_eq!(AddressType::from_layer("other"), None);
        assert_eq!(AddressType::from_layer("City"), None);
    }
}
