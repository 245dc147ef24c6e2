//! Deoptimization frame states.
//!
//! A frame state node lists the locals and then the expression stack of one
//! interpreter frame; `outer` links it to the frame state of its caller.

use crate::constant::ValueKind;
use crate::graph::Graph;
use crate::meta::MethodId;
use crate::node::NodeId;
use crate::op::Op;

/// Special bytecode indices.
pub mod bci {
    /// Before the first bytecode of a method.
    pub const BEFORE: i32 = -1;
    /// After the method has returned.
    pub const AFTER: i32 = -2;
    /// After the method has thrown.
    pub const AFTER_EXCEPTION: i32 = -3;
    pub const UNKNOWN: i32 = -4;
    /// Marks a state that must be replaced before the graph is used.
    pub const INVALID: i32 = -6;
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrameStateData {
    pub method: Option<MethodId>,
    pub bci: i32,
    pub locals: u16,
    pub stack: u16,
    /// Resume by rethrowing the exception on top of the stack.
    pub rethrow: bool,
    /// Describes a frame in the middle of a call.
    pub during_call: bool,
}

impl FrameStateData {
    pub fn new(method: MethodId, bci: i32, locals: u16, stack: u16) -> Self {
        Self {
            method: Some(method),
            bci,
            locals,
            stack,
            rethrow: false,
            during_call: false,
        }
    }

    pub fn invalid() -> Self {
        Self {
            method: None,
            bci: bci::INVALID,
            locals: 0,
            stack: 0,
            rethrow: false,
            during_call: false,
        }
    }

    pub fn is_invalid(&self) -> bool {
        self.bci == bci::INVALID
    }
}

impl Graph {
    pub fn add_frame_state(
        &mut self,
        data: FrameStateData,
        values: &[NodeId],
        outer: Option<NodeId>,
    ) -> NodeId {
        assert_eq!(
            values.len(),
            data.locals as usize + data.stack as usize,
            "frame state value count does not match its layout"
        );
        let state = self.add(Op::FrameState(data), values);
        self.set_outer(state, outer);
        state
    }

    /// A fresh sentinel state for nodes whose real state is supplied later.
    pub fn invalid_frame_state(&mut self) -> NodeId {
        self.add(Op::FrameState(FrameStateData::invalid()), &[])
    }

    pub fn is_invalid_frame_state(&self, state: NodeId) -> bool {
        self.op(state)
            .frame_state()
            .is_some_and(FrameStateData::is_invalid)
    }

    fn frame_state_data(&self, state: NodeId) -> &FrameStateData {
        self.op(state)
            .frame_state()
            .unwrap_or_else(|| panic!("{state} is not a frame state"))
    }

    /// Derives the state in the middle of a call from the state after it:
    /// the pushed return value is popped again and the frame is flagged as
    /// being inside the call.
    pub fn state_during_from_after(&mut self, after: NodeId, return_kind: ValueKind) -> NodeId {
        let mut data = self.frame_state_data(after).clone();
        let mut values: Vec<NodeId> = self.inputs(after).to_vec();
        if return_kind != ValueKind::Void && data.stack > 0 {
            values.pop();
            data.stack -= 1;
        }
        data.during_call = true;
        let outer = self.node(after).outer();
        self.add_frame_state(data, &values, outer)
    }

    /// The state for rethrowing `exception`: locals of `state` with the
    /// exception as the only stack value.
    pub fn state_with_exception(&mut self, state: NodeId, exception: NodeId) -> NodeId {
        let mut data = self.frame_state_data(state).clone();
        let mut values: Vec<NodeId> = self.inputs(state)[..data.locals as usize].to_vec();
        values.push(exception);
        data.stack = 1;
        data.rethrow = true;
        data.during_call = false;
        let outer = self.node(state).outer();
        self.add_frame_state(data, &values, outer)
    }
}
