use crate::meta::TypeId;

/// Primitive category of a value.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValueKind {
    Void,
    Int,
    Bool,
    Object,
}

/// Opaque reference to a heap object of the guest program.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObjectRef {
    pub ty: TypeId,
    pub handle: u64,
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Constant {
    Int(i64),
    Bool(bool),
    Null,
    Object(ObjectRef),
    /// A type mirror, used by templates specialized on a class.
    Type(TypeId),
}

impl Constant {
    pub fn kind(&self) -> ValueKind {
        match self {
            Constant::Int(_) => ValueKind::Int,
            Constant::Bool(_) => ValueKind::Bool,
            Constant::Null | Constant::Object(_) | Constant::Type(_) => ValueKind::Object,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Constant::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Constant::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Constant::Null)
    }
}

impl std::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "{v}"),
            Constant::Bool(v) => write!(f, "{v}"),
            Constant::Null => write!(f, "null"),
            Constant::Object(obj) => write!(f, "obj#{}:{}", obj.handle, obj.ty),
            Constant::Type(ty) => write!(f, "type {ty}"),
        }
    }
}
