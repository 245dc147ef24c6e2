//! Node operations.
//!
//! Every node carries exactly one [`Op`]. The op decides whether a node is
//! fixed (part of the control-flow skeleton) or floating, how many successor
//! slots it owns, and which memory locations it kills.

use crate::constant::{Constant, ValueKind};
use crate::frame_state::FrameStateData;
use crate::location::{Kills, LocationIdentity};
use crate::meta::MethodId;

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

impl BinaryOp {
    pub fn eval(self, lhs: i64, rhs: i64) -> i64 {
        match self {
            BinaryOp::Add => lhs.wrapping_add(rhs),
            BinaryOp::Sub => lhs.wrapping_sub(rhs),
            BinaryOp::Mul => lhs.wrapping_mul(rhs),
            BinaryOp::And => lhs & rhs,
            BinaryOp::Or => lhs | rhs,
            BinaryOp::Xor => lhs ^ rhs,
            BinaryOp::Shl => lhs.wrapping_shl(rhs as u32),
            BinaryOp::Shr => lhs.wrapping_shr(rhs as u32),
        }
    }

    /// The value `x` such that `op(v, x) == v` for every `v`.
    pub fn right_identity(self) -> Option<i64> {
        match self {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Or | BinaryOp::Xor => Some(0),
            BinaryOp::Shl | BinaryOp::Shr => Some(0),
            BinaryOp::Mul => Some(1),
            BinaryOp::And => Some(-1),
        }
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Condition {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Condition {
    pub fn eval(self, lhs: &Constant, rhs: &Constant) -> Option<bool> {
        match (lhs.as_int(), rhs.as_int()) {
            (Some(a), Some(b)) => Some(match self {
                Condition::Eq => a == b,
                Condition::Ne => a != b,
                Condition::Lt => a < b,
                Condition::Le => a <= b,
                Condition::Gt => a > b,
                Condition::Ge => a >= b,
            }),
            _ => match self {
                Condition::Eq => Some(lhs == rhs),
                Condition::Ne => Some(lhs != rhs),
                _ => None,
            },
        }
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InvokeKind {
    Static,
    /// Non-virtual call with a receiver.
    Special,
    Virtual,
    Interface,
}

impl InvokeKind {
    pub fn is_indirect(self) -> bool {
        matches!(self, InvokeKind::Virtual | InvokeKind::Interface)
    }

    pub fn has_receiver(self) -> bool {
        !matches!(self, InvokeKind::Static)
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeoptReason {
    NullCheck,
    NotCompiledExceptionHandler,
    TransferToInterpreter,
    Unreached,
    GuardFailed,
}

/// Which frame state a deoptimizing node resumes from.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum DeoptMode {
    Before,
    During,
    After,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Op {
    /// Graph entry. Acts as the initial writer of every location.
    Start,
    Parameter(u32),
    /// Stand-in for one element of a varargs template argument.
    Placeholder { param: u32, slot: u32 },
    Constant(Constant),
    /// `[lhs, rhs]`
    Binary(BinaryOp),
    /// `[lhs, rhs]`
    Compare(Condition),
    /// `[value]`
    IsNull,
    /// `[merge, values...]`, one value per merge end.
    Phi,
    /// `[loop_exit, value]`
    ValueProxy,
    /// `[locals..., stack...]`
    FrameState(FrameStateData),
    /// `[arguments...]`, receiver first.
    CallTarget { method: MethodId, kind: InvokeKind },
    /// Fixed-length array built from its inputs.
    VarargsArray { length: u32 },
    /// `[array]`
    ArrayLength,
    /// `[array, index]`
    LoadIndexed,

    Begin,
    /// `[condition]`; successors `[true, false]`.
    If,
    End,
    LoopEnd,
    /// `[ends...]`
    Merge,
    /// `[forward ends..., loop ends...]`
    LoopBegin { explode: bool },
    /// `[loop_begin]`
    LoopExit,
    ExceptionObject,
    /// `[call_target]`; successors `[next]` or `[next, exception]`.
    Invoke { bci: i32, with_exception: bool },
    /// `[object]`
    Read { location: LocationIdentity },
    /// `[object, value]`
    Write { location: LocationIdentity },
    /// `[arguments...]`
    ForeignCall {
        target: MethodId,
        kills: Option<Kills>,
        side_effect: bool,
    },
    /// A node lowered later by instantiating a template. `[arguments...]`
    Macro {
        target: MethodId,
        kills: Option<Kills>,
    },
    /// `[condition]`; deoptimizes when `condition == negated`.
    FixedGuard { reason: DeoptReason, negated: bool },
    /// `[value?]`
    Return,
    /// `[exception]`
    Unwind,
    Deoptimize { reason: DeoptReason },
}

impl Op {
    pub fn is_fixed(&self) -> bool {
        !self.is_floating()
    }

    pub fn is_floating(&self) -> bool {
        matches!(
            self,
            Op::Parameter(_)
                | Op::Placeholder { .. }
                | Op::Constant(_)
                | Op::Binary(_)
                | Op::Compare(_)
                | Op::IsNull
                | Op::Phi
                | Op::ValueProxy
                | Op::FrameState(_)
                | Op::CallTarget { .. }
                | Op::VarargsArray { .. }
                | Op::ArrayLength
                | Op::LoadIndexed
        )
    }

    /// Number of successor slots the node owns.
    pub fn successor_count(&self) -> usize {
        match self {
            Op::If => 2,
            Op::Invoke {
                with_exception: true,
                ..
            } => 2,
            Op::End
            | Op::LoopEnd
            | Op::Return
            | Op::Unwind
            | Op::Deoptimize { .. } => 0,
            op if op.is_floating() => 0,
            _ => 1,
        }
    }

    pub fn is_merge(&self) -> bool {
        matches!(self, Op::Merge | Op::LoopBegin { .. })
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Op::End | Op::LoopEnd)
    }

    pub fn is_control_sink(&self) -> bool {
        matches!(self, Op::Return | Op::Unwind | Op::Deoptimize { .. })
    }

    pub fn is_control_split(&self) -> bool {
        self.successor_count() > 1
    }

    pub fn has_side_effect(&self) -> bool {
        match self {
            Op::Write { .. } | Op::Invoke { .. } | Op::Macro { .. } => true,
            Op::ForeignCall { side_effect, .. } => *side_effect,
            _ => false,
        }
    }

    /// The locations this node overwrites, if it writes memory at all.
    pub fn kills(&self) -> Option<Kills> {
        match self {
            Op::Start | Op::Invoke { .. } => Some(Kills::any()),
            Op::Write { location } => Some(Kills::Single(*location)),
            Op::ForeignCall { kills, .. } | Op::Macro { kills, .. } => kills.clone(),
            _ => None,
        }
    }

    /// The single location this node reads or writes.
    pub fn location(&self) -> Option<LocationIdentity> {
        match self {
            Op::Read { location } | Op::Write { location } => Some(*location),
            _ => None,
        }
    }

    /// Whether the node's `memory` edge is meaningful.
    pub fn accesses_memory(&self) -> bool {
        matches!(
            self,
            Op::Read { .. } | Op::Write { .. } | Op::ForeignCall { .. } | Op::Macro { .. }
        )
    }

    pub fn deopt_mode(&self) -> Option<DeoptMode> {
        match self {
            Op::FixedGuard { .. } | Op::Deoptimize { .. } => Some(DeoptMode::Before),
            Op::ForeignCall { .. } => Some(DeoptMode::During),
            _ => None,
        }
    }

    pub fn constant(&self) -> Option<&Constant> {
        match self {
            Op::Constant(c) => Some(c),
            _ => None,
        }
    }

    pub fn frame_state(&self) -> Option<&FrameStateData> {
        match self {
            Op::FrameState(data) => Some(data),
            _ => None,
        }
    }

    pub fn value_kind_hint(&self) -> Option<ValueKind> {
        match self {
            Op::Constant(c) => Some(c.kind()),
            Op::Binary(_) | Op::ArrayLength => Some(ValueKind::Int),
            Op::Compare(_) | Op::IsNull => Some(ValueKind::Bool),
            _ => None,
        }
    }

    /// Short mnemonic used in graph dumps.
    pub fn mnemonic(&self) -> String {
        match self {
            Op::Start => "Start".into(),
            Op::Parameter(i) => format!("Parameter({i})"),
            Op::Placeholder { param, slot } => format!("Placeholder({param}.{slot})"),
            Op::Constant(c) => format!("Constant({c})"),
            Op::Binary(op) => format!("{op:?}"),
            Op::Compare(cond) => format!("Compare({cond:?})"),
            Op::IsNull => "IsNull".into(),
            Op::Phi => "Phi".into(),
            Op::ValueProxy => "ValueProxy".into(),
            Op::FrameState(data) => format!("FrameState(bci={})", data.bci),
            Op::CallTarget { method, kind } => format!("CallTarget({kind:?} {method})"),
            Op::VarargsArray { length } => format!("VarargsArray({length})"),
            Op::ArrayLength => "ArrayLength".into(),
            Op::LoadIndexed => "LoadIndexed".into(),
            Op::Begin => "Begin".into(),
            Op::If => "If".into(),
            Op::End => "End".into(),
            Op::LoopEnd => "LoopEnd".into(),
            Op::Merge => "Merge".into(),
            Op::LoopBegin { explode: false } => "LoopBegin".into(),
            Op::LoopBegin { explode: true } => "LoopBegin(explode)".into(),
            Op::LoopExit => "LoopExit".into(),
            Op::ExceptionObject => "ExceptionObject".into(),
            Op::Invoke { bci, .. } => format!("Invoke(bci={bci})"),
            Op::Read { location } => format!("Read({location})"),
            Op::Write { location } => format!("Write({location})"),
            Op::ForeignCall { target, .. } => format!("ForeignCall({target})"),
            Op::Macro { target, .. } => format!("Macro({target})"),
            Op::FixedGuard { reason, negated } => {
                format!("FixedGuard({reason:?}{})", if *negated { ", negated" } else { "" })
            }
            Op::Return => "Return".into(),
            Op::Unwind => "Unwind".into(),
            Op::Deoptimize { reason } => format!("Deoptimize({reason:?})"),
        }
    }
}
