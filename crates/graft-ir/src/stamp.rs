use crate::constant::{Constant, ValueKind};
use crate::lattice::{FiniteLattice, Lattice};
use crate::meta::TypeId;

/// Facts about an object value.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObjectStamp {
    /// Declared or inferred type, `None` for an unknown type.
    pub ty: Option<TypeId>,
    /// The value is of exactly `ty`, not a subtype.
    pub exact: bool,
    pub non_null: bool,
    pub always_null: bool,
}

impl ObjectStamp {
    pub fn unrestricted() -> Self {
        Self {
            ty: None,
            exact: false,
            non_null: false,
            always_null: false,
        }
    }

    pub fn of(ty: TypeId) -> Self {
        Self {
            ty: Some(ty),
            ..Self::unrestricted()
        }
    }

    pub fn exact(ty: TypeId) -> Self {
        Self {
            ty: Some(ty),
            exact: true,
            non_null: true,
            always_null: false,
        }
    }

    pub fn null() -> Self {
        Self {
            always_null: true,
            ..Self::unrestricted()
        }
    }
}

/// Static value facts attached to a node.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Stamp {
    /// No value. Lattice bottom.
    #[default]
    Void,
    /// Inclusive integer range.
    Int { lo: i64, hi: i64 },
    Bool,
    Object(ObjectStamp),
    /// Nothing is known. Lattice top.
    Any,
    /// Replaced by the stamp of the replacee when a template is instantiated.
    Placeholder,
}

impl Stamp {
    pub fn int() -> Self {
        Stamp::Int {
            lo: i64::MIN,
            hi: i64::MAX,
        }
    }

    pub fn int_range(lo: i64, hi: i64) -> Self {
        Stamp::Int { lo, hi }
    }

    pub fn object() -> Self {
        Stamp::Object(ObjectStamp::unrestricted())
    }

    pub fn for_constant(value: &Constant) -> Self {
        match value {
            Constant::Int(v) => Stamp::Int { lo: *v, hi: *v },
            Constant::Bool(_) => Stamp::Bool,
            Constant::Null => Stamp::Object(ObjectStamp::null()),
            Constant::Object(obj) => Stamp::Object(ObjectStamp::exact(obj.ty)),
            Constant::Type(_) => Stamp::Object(ObjectStamp {
                non_null: true,
                ..ObjectStamp::unrestricted()
            }),
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Stamp::Void => ValueKind::Void,
            Stamp::Int { .. } => ValueKind::Int,
            Stamp::Bool => ValueKind::Bool,
            Stamp::Object(_) | Stamp::Any | Stamp::Placeholder => ValueKind::Object,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Stamp::Void)
    }

    pub fn is_always_null(&self) -> bool {
        matches!(self, Stamp::Object(obj) if obj.always_null)
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, Stamp::Object(obj) if obj.non_null)
    }

    /// The exact type of an object stamp, when known.
    pub fn exact_type(&self) -> Option<TypeId> {
        match self {
            Stamp::Object(ObjectStamp {
                ty: Some(ty),
                exact: true,
                ..
            }) => Some(*ty),
            _ => None,
        }
    }

    pub fn declared_type(&self) -> Option<TypeId> {
        match self {
            Stamp::Object(obj) => obj.ty,
            _ => None,
        }
    }
}

impl Lattice for Stamp {
    fn join(&self, other: &Self) -> Self {
        match (self, other) {
            (Stamp::Void, s) | (s, Stamp::Void) => *s,
            (Stamp::Placeholder, Stamp::Placeholder) => Stamp::Placeholder,
            (Stamp::Int { lo: a, hi: b }, Stamp::Int { lo: c, hi: d }) => Stamp::Int {
                lo: (*a).min(*c),
                hi: (*b).max(*d),
            },
            (Stamp::Bool, Stamp::Bool) => Stamp::Bool,
            (Stamp::Object(a), Stamp::Object(b)) => {
                if a.always_null {
                    return Stamp::Object(ObjectStamp {
                        non_null: false,
                        ..*b
                    });
                }
                if b.always_null {
                    return Stamp::Object(ObjectStamp {
                        non_null: false,
                        ..*a
                    });
                }
                let ty = if a.ty == b.ty { a.ty } else { None };
                Stamp::Object(ObjectStamp {
                    ty,
                    exact: ty.is_some() && a.exact && b.exact,
                    non_null: a.non_null && b.non_null,
                    always_null: false,
                })
            }
            _ => Stamp::Any,
        }
    }

    fn meet(&self, other: &Self) -> Self {
        match (self, other) {
            (Stamp::Any, s) | (s, Stamp::Any) => *s,
            (Stamp::Int { lo: a, hi: b }, Stamp::Int { lo: c, hi: d }) => {
                let lo = (*a).max(*c);
                let hi = (*b).min(*d);
                if lo > hi {
                    Stamp::Void
                } else {
                    Stamp::Int { lo, hi }
                }
            }
            (Stamp::Bool, Stamp::Bool) => Stamp::Bool,
            (Stamp::Placeholder, Stamp::Placeholder) => Stamp::Placeholder,
            (Stamp::Object(a), Stamp::Object(b)) => {
                let ty = match (a.ty, b.ty) {
                    (Some(x), Some(y)) if x != y => return Stamp::Void,
                    (x, y) => x.or(y),
                };
                let non_null = a.non_null || b.non_null;
                let always_null = a.always_null || b.always_null;
                if non_null && always_null {
                    return Stamp::Void;
                }
                Stamp::Object(ObjectStamp {
                    ty,
                    exact: a.exact || b.exact,
                    non_null,
                    always_null,
                })
            }
            _ => Stamp::Void,
        }
    }

    fn is_subseteq(&self, other: &Self) -> bool {
        match (self, other) {
            (Stamp::Void, _) | (_, Stamp::Any) => true,
            (Stamp::Int { lo: a, hi: b }, Stamp::Int { lo: c, hi: d }) => c <= a && b <= d,
            (Stamp::Bool, Stamp::Bool) | (Stamp::Placeholder, Stamp::Placeholder) => true,
            (Stamp::Object(a), Stamp::Object(b)) => {
                if a.always_null {
                    return !b.non_null;
                }
                (b.ty.is_none() || a.ty == b.ty)
                    && (!b.exact || a.exact)
                    && (!b.non_null || a.non_null)
                    && !b.always_null
            }
            _ => false,
        }
    }
}

impl FiniteLattice for Stamp {
    fn bottom() -> Self {
        Stamp::Void
    }

    fn top() -> Self {
        Stamp::Any
    }
}

impl std::fmt::Display for Stamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stamp::Void => write!(f, "void"),
            Stamp::Int { lo, hi } if *lo == i64::MIN && *hi == i64::MAX => write!(f, "int"),
            Stamp::Int { lo, hi } if lo == hi => write!(f, "int[{lo}]"),
            Stamp::Int { lo, hi } => write!(f, "int[{lo}..{hi}]"),
            Stamp::Bool => write!(f, "bool"),
            Stamp::Object(obj) => {
                write!(f, "obj")?;
                if let Some(ty) = obj.ty {
                    write!(f, "<{}{}>", if obj.exact { "=" } else { "" }, ty)?;
                }
                if obj.always_null {
                    write!(f, " null")?;
                } else if obj.non_null {
                    write!(f, " !null")?;
                }
                Ok(())
            }
            Stamp::Any => write!(f, "any"),
            Stamp::Placeholder => write!(f, "?"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_join_and_meet() {
        let a = Stamp::int_range(0, 4);
        let b = Stamp::int_range(2, 9);
        assert_eq!(a.join(&b), Stamp::int_range(0, 9));
        assert_eq!(a.meet(&b), Stamp::int_range(2, 4));
        assert_eq!(a.meet(&Stamp::int_range(5, 6)), Stamp::Void);
        assert!(a.is_subseteq(&a.join(&b)));
    }

    #[test]
    fn null_joins_into_nullable() {
        let exact = Stamp::Object(ObjectStamp::exact(TypeId(3)));
        let null = Stamp::for_constant(&Constant::Null);
        let joined = exact.join(&null);
        assert!(!joined.is_non_null());
        assert_eq!(joined.declared_type(), Some(TypeId(3)));
        assert!(null.is_subseteq(&joined));
        assert!(exact.is_subseteq(&joined));
    }

    #[test]
    fn mixed_kinds_go_to_top() {
        assert_eq!(Stamp::Bool.join(&Stamp::int()), Stamp::Any);
        assert_eq!(Stamp::Void.join(&Stamp::Bool), Stamp::Bool);
        assert_eq!(Stamp::Any.meet(&Stamp::Bool), Stamp::Bool);
    }
}
