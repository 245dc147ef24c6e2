//! Handles into the host runtime's metadata and the query interface over them.

use crate::stamp::Stamp;

macro_rules! meta_handle {
    ($(#[$attr:meta])* $name:ident, $prefix:literal) => {
        $(#[$attr])*
        #[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub struct $name(pub u32);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

meta_handle!(
    /// A resolved method of the guest program.
    MethodId,
    "m"
);
meta_handle!(
    /// A guest type.
    TypeId,
    "t"
);
meta_handle!(
    /// A field of a guest type.
    FieldId,
    "f"
);

/// Parameter and return stamps of a method. The receiver, if any, is
/// parameter 0.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub params: Vec<Stamp>,
    pub ret: Stamp,
}

/// Read-only metadata queries the rewriting passes need.
pub trait MetaAccess: Send + Sync {
    fn method_name(&self, method: MethodId) -> String;

    fn is_static(&self, method: MethodId) -> bool;

    fn signature(&self, method: MethodId) -> Signature;

    /// Whether `ty` can have no subtypes.
    fn is_leaf_type(&self, ty: TypeId) -> bool;

    /// The implementation `method` dispatches to for a receiver of exactly
    /// type `receiver`, or `None` when it cannot be resolved statically.
    fn resolve_concrete(&self, method: MethodId, receiver: TypeId) -> Option<MethodId>;
}
