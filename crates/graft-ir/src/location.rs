//! Abstract memory locations and kill sets.

use indexmap::IndexSet;

use crate::constant::ValueKind;
use crate::meta::FieldId;

/// An abstract memory location a node may read or overwrite.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LocationIdentity {
    /// Every location. Killing it invalidates all memory facts.
    Any,
    /// Memory of freshly allocated objects, before publication.
    Init,
    Field(FieldId),
    ArrayElement(ValueKind),
    /// A location registered by a runtime component, e.g. a counter or a
    /// thread-local slot.
    Named(u32),
}

impl LocationIdentity {
    pub fn is_any(&self) -> bool {
        matches!(self, LocationIdentity::Any)
    }

    /// Whether a write to `self` may be observed by a read of `other`.
    pub fn overlaps(&self, other: &LocationIdentity) -> bool {
        self.is_any() || other.is_any() || self == other
    }
}

impl std::fmt::Display for LocationIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocationIdentity::Any => write!(f, "ANY"),
            LocationIdentity::Init => write!(f, "INIT"),
            LocationIdentity::Field(field) => write!(f, "{field}"),
            LocationIdentity::ArrayElement(kind) => write!(f, "[{kind:?}]"),
            LocationIdentity::Named(id) => write!(f, "loc{id}"),
        }
    }
}

pub type LocationSet = IndexSet<LocationIdentity>;

/// The locations a memory-writing node kills.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Kills {
    Single(LocationIdentity),
    Multi(LocationSet),
}

impl Kills {
    pub fn any() -> Self {
        Kills::Single(LocationIdentity::Any)
    }

    pub fn contains(&self, location: &LocationIdentity) -> bool {
        match self {
            Kills::Single(kill) => kill.overlaps(location),
            Kills::Multi(set) => {
                set.contains(&LocationIdentity::Any)
                    || location.is_any()
                    || set.contains(location)
            }
        }
    }

    pub fn is_any(&self) -> bool {
        match self {
            Kills::Single(kill) => kill.is_any(),
            Kills::Multi(set) => set.contains(&LocationIdentity::Any),
        }
    }

    pub fn locations(&self) -> impl Iterator<Item = &LocationIdentity> {
        let (single, multi) = match self {
            Kills::Single(kill) => (Some(kill), None),
            Kills::Multi(set) => (None, Some(set.iter())),
        };
        single.into_iter().chain(multi.into_iter().flatten())
    }
}

impl FromIterator<LocationIdentity> for Kills {
    fn from_iter<T: IntoIterator<Item = LocationIdentity>>(iter: T) -> Self {
        let set: LocationSet = iter.into_iter().collect();
        if set.len() == 1 {
            Kills::Single(set[0])
        } else {
            Kills::Multi(set)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_overlaps_everything() {
        let field = LocationIdentity::Field(FieldId(1));
        assert!(Kills::any().contains(&field));
        assert!(Kills::Single(field).contains(&LocationIdentity::Any));
        assert!(!Kills::Single(field).contains(&LocationIdentity::Init));
    }

    #[test]
    fn collecting_one_location_yields_single() {
        let kills: Kills = [LocationIdentity::Init, LocationIdentity::Init]
            .into_iter()
            .collect();
        assert_eq!(kills, Kills::Single(LocationIdentity::Init));
        let kills: Kills = [LocationIdentity::Init, LocationIdentity::Named(2)]
            .into_iter()
            .collect();
        assert_eq!(kills.locations().count(), 2);
    }
}
