use std::hash::Hash;

/// Arena slot index.
///
/// An `Id` is only handed out by `Arena::alloc` and is never reused, so a
/// stale handle keeps pointing at a tombstoned slot instead of a new node.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Id(pub(crate) usize);

impl Id {
    /// return raw ID as usize
    pub fn raw(self) -> usize {
        self.0
    }
}

pub trait Identifier:
    Sized + Clone + Copy + Hash + Ord + std::fmt::Debug + PartialEq + Eq + From<Id> + Into<Id>
{
}

#[macro_export(local_inner_macros)]
macro_rules! identifier {
    ($(#[$attr:meta])* struct $name:ident) => {
        $(#[$attr])*
        #[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub struct $name(pub(crate) $crate::arena::Id);

        impl From<$crate::arena::Id> for $name {
            fn from(value: $crate::arena::Id) -> Self {
                Self(value)
            }
        }

        impl From<$name> for $crate::arena::Id {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl $crate::arena::Identifier for $name {}
    };
}
