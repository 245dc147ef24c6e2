use graft_ir::{Graph, InvokeKind, MetaAccess, MethodId, NodeId, Stamp};
use smallvec::SmallVec;

/// A call being decoded, with its arguments already in the target graph.
#[derive(Clone, Debug, PartialEq)]
pub struct CallSite {
    pub method: MethodId,
    pub kind: InvokeKind,
    /// Receiver first for calls that have one.
    pub arguments: SmallVec<[NodeId; 4]>,
    pub bci: i32,
    /// Stamp of the call's result, [`Stamp::Void`] for no result.
    pub stamp: Stamp,
    pub with_exception: bool,
}

impl CallSite {
    pub fn receiver(&self) -> Option<NodeId> {
        if self.kind.has_receiver() {
            self.arguments.first().copied()
        } else {
            None
        }
    }
}

/// Turns an indirect call into a direct one when the receiver's type is
/// known exactly, or is a type without subtypes, and the runtime resolves
/// the implementation for it. Returns whether `site` changed.
///
/// Direct calls are left alone, so applying this twice is a no-op.
pub fn devirtualize(meta: &dyn MetaAccess, graph: &Graph, site: &mut CallSite) -> bool {
    if !site.kind.is_indirect() {
        return false;
    }
    let Some(receiver) = site.receiver() else {
        return false;
    };
    let stamp = graph.stamp(receiver);
    let ty = stamp.exact_type().or_else(|| {
        stamp
            .declared_type()
            .filter(|ty| meta.is_leaf_type(*ty))
    });
    let Some(target) = ty.and_then(|ty| meta.resolve_concrete(site.method, ty)) else {
        return false;
    };
    tracing::trace!(from = %site.method, to = %target, "devirtualized call");
    site.method = target;
    site.kind = InvokeKind::Special;
    true
}

#[cfg(test)]
mod tests {
    use graft_ir::{Constant, ObjectRef, ObjectStamp, Op, TypeId};
    use graft_test_utils::{TestMeta, m};

    use super::*;

    fn site(receiver: NodeId) -> CallSite {
        CallSite {
            method: m(1),
            kind: InvokeKind::Virtual,
            arguments: smallvec::smallvec![receiver],
            bci: 3,
            stamp: Stamp::int(),
            with_exception: false,
        }
    }

    #[test]
    fn exact_receiver_resolves_and_is_idempotent() {
        let mut meta = TestMeta::default();
        meta.dispatch(m(1), TypeId(7), m(2));
        let mut graph = Graph::new("caller");
        let receiver = graph.constant(Constant::Object(ObjectRef {
            ty: TypeId(7),
            handle: 1,
        }));
        let mut call = site(receiver);
        assert!(devirtualize(&meta, &graph, &mut call));
        assert_eq!((call.method, call.kind), (m(2), InvokeKind::Special));
        let once = call.clone();
        assert!(!devirtualize(&meta, &graph, &mut call));
        assert_eq!(call, once);
    }

    #[test]
    fn declared_type_needs_a_leaf() {
        let mut meta = TestMeta::default();
        meta.dispatch(m(1), TypeId(7), m(2));
        let mut graph = Graph::new("caller");
        let receiver = graph
            .add_node()
            .op(Op::Parameter(0))
            .stamp(Stamp::Object(ObjectStamp::of(TypeId(7))))
            .new();
        let mut call = site(receiver);
        assert!(!devirtualize(&meta, &graph, &mut call));
        meta.leaf_type(TypeId(7));
        assert!(devirtualize(&meta, &graph, &mut call));
        assert_eq!(call.method, m(2));
    }
}
