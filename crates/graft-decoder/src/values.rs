//! On-demand decoding of floating nodes and frame states.

use graft_ir::canonical::{Simplified, simplify_floating};
use graft_ir::encode::OrderId;
use graft_ir::{NodeId, Op};
use smallvec::SmallVec;

use crate::decoder::Session;
use crate::scope::InvokeData;

impl Session<'_, '_> {
    /// The target node of `id`, decoding it first if it is a floating node
    /// not seen yet in `scope`.
    ///
    /// Arithmetic, comparisons and array accesses are simplified as they
    /// are decoded, so a constant argument folds whatever depends on it.
    pub(crate) fn ensure(&mut self, scope: usize, id: OrderId) -> NodeId {
        if let Some(node) = self.loops[scope].created(id) {
            return node;
        }
        let method = self.loops[scope].method;
        let encoded = self.encoded(scope);
        let node = encoded.node(id);
        assert!(
            node.op.is_floating(),
            "{id} ({}) of {} is used before it was decoded",
            node.op.mnemonic(),
            encoded.name()
        );
        let value = match &node.op {
            Op::Parameter(index) if !self.methods[method].is_root() => {
                *self.methods[method]
                    .arguments
                    .get(*index as usize)
                    .unwrap_or_else(|| {
                        panic!("{} reads parameter {index} it was not given", encoded.name())
                    })
            }
            Op::Phi => panic!(
                "phi {id} of {} is used before its merge was decoded",
                encoded.name()
            ),
            Op::Binary(_) | Op::Compare(_) | Op::IsNull | Op::ArrayLength | Op::LoadIndexed => {
                let inputs: SmallVec<[NodeId; 4]> =
                    node.inputs.iter().map(|i| self.ensure(scope, *i)).collect();
                match simplify_floating(&self.graph, &node.op, &inputs) {
                    Some(Simplified::Constant(value)) => self.graph.constant(value),
                    Some(Simplified::Node(same)) => same,
                    None => self
                        .graph
                        .add_node()
                        .op(node.op.clone())
                        .inputs(&inputs)
                        .stamp(node.stamp)
                        .new(),
                }
            }
            _ => return self.copy_node(scope, id),
        };
        self.loops[scope].set_created(id, Some(value));
        value
    }

    /// Copies `id` with all of its edges into the target graph.
    ///
    /// The copy is registered before its memory and state edges are
    /// decoded, since the state after a node may hold the node's own value.
    pub(crate) fn copy_node(&mut self, scope: usize, id: OrderId) -> NodeId {
        let encoded = self.encoded(scope);
        let node = encoded.node(id);
        let inputs: SmallVec<[NodeId; 8]> =
            node.inputs.iter().map(|i| self.ensure(scope, *i)).collect();
        let new = self
            .graph
            .add_node()
            .op(node.op.clone())
            .inputs(&inputs)
            .stamp(node.stamp)
            .new();
        self.loops[scope].set_created(id, Some(new));

        if let Some(memory) = node.memory {
            let memory = self.ensure(scope, memory);
            self.graph.set_memory(new, Some(memory));
        }
        if let Some(state) = node.state_before {
            let state = self.ensure(scope, state);
            self.graph.set_state_before(new, Some(state));
        }
        if let Some(state) = node.state_during {
            let state = self.ensure(scope, state);
            self.graph.set_state_during(new, Some(state));
        }
        if let Some(state) = node.state_after {
            let state = self.ensure(scope, state);
            self.graph.set_state_after(new, Some(state));
        }
        let outer = match node.outer {
            Some(outer) => Some(self.ensure(scope, outer)),
            None => self.implicit_outer(scope, &node.op),
        };
        if outer.is_some() {
            self.graph.set_outer(new, outer);
        }
        new
    }

    /// Frame states of an inlined method have no caller frame in their own
    /// graph; they get the state of the caller at the call.
    fn implicit_outer(&mut self, scope: usize, op: &Op) -> Option<NodeId> {
        let method = self.loops[scope].method;
        let is_real_state = op.frame_state().is_some_and(|data| !data.is_invalid());
        if !is_real_state || self.methods[method].is_root() {
            return None;
        }
        self.outer_state(method)
    }

    /// The state of the frame in `scope` in the middle of the call described
    /// by `data`: the state after the call without its result, re-targeted
    /// to the call's bci.
    pub(crate) fn call_state(&mut self, scope: usize, data: &InvokeData) -> Option<NodeId> {
        let encoded = self.encoded(scope);
        let node = encoded.node(data.state_after?);
        let mut state = node
            .op
            .frame_state()
            .unwrap_or_else(|| panic!("state after {} is not a frame state", data.invoke))
            .clone();
        let mut inputs: &[OrderId] = &node.inputs;
        if state.stack > 0 && inputs.last() == Some(&data.invoke) {
            inputs = &inputs[..inputs.len() - 1];
            state.stack -= 1;
        }
        let values: SmallVec<[NodeId; 8]> =
            inputs.iter().map(|i| self.ensure(scope, *i)).collect();
        state.bci = data.bci;
        state.during_call = true;
        let outer = match node.outer {
            Some(outer) => Some(self.ensure(scope, outer)),
            None => self.implicit_outer(scope, &node.op),
        };
        Some(self.graph.add_frame_state(state, &values, outer))
    }

    /// The caller's state for inlined method `method`, built on first use.
    pub(crate) fn outer_state(&mut self, method: usize) -> Option<NodeId> {
        let cached = self.methods[method].outer_state;
        if let Some(state) = cached.filter(|s| self.graph.is_alive(*s)) {
            return Some(state);
        }
        let scope = &self.methods[method];
        let (Some(caller_loop), Some(data)) = (scope.caller_loop, scope.invoke.clone()) else {
            return None;
        };
        let state = self.call_state(caller_loop, &data)?;
        self.methods[method].outer_state = Some(state);
        self.stats.outer_states_built += 1;
        Some(state)
    }

    /// The state to rethrow `exception` from in the caller of `method`.
    pub(crate) fn exception_state(&mut self, method: usize, exception: NodeId) -> Option<NodeId> {
        let cached = self.methods[method].exception_state;
        if let Some(state) = cached.filter(|s| self.graph.is_alive(*s)) {
            return Some(state);
        }
        let outer = self.outer_state(method)?;
        let state = self.graph.state_with_exception(outer, exception);
        self.methods[method].exception_state = Some(state);
        self.stats.exception_states_built += 1;
        Some(state)
    }

    /// Forgets every decoded node that no longer exists, after a rollback.
    pub(crate) fn forget_dead(&mut self) {
        let graph = &self.graph;
        for scope in &mut self.loops {
            for slot in &mut scope.created {
                if slot.is_some_and(|node| !graph.is_alive(node)) {
                    *slot = None;
                }
            }
        }
    }
}
