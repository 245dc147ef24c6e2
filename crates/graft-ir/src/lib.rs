//! Node graph intermediate representation.
//!
//! Nodes live in an arena owned by a [`Graph`] and refer to each other by
//! [`NodeId`]. Fixed nodes form the control-flow skeleton through successor
//! slots; floating nodes hang off them through input edges only.

mod arena;
mod constant;
mod frame_state;
mod graph;
mod lattice;
mod location;
mod meta;
mod node;
mod op;
mod stamp;

pub mod canonical;
pub mod encode;
pub mod loops;

pub use arena::{Arena, Id, IdMap, Identifier};
pub use constant::{Constant, ObjectRef, ValueKind};
pub use frame_state::{FrameStateData, bci};
pub use graph::{Graph, GraphMark, VerifyError};
pub use lattice::{FiniteLattice, Lattice};
pub use location::{Kills, LocationIdentity, LocationSet};
pub use meta::{FieldId, MetaAccess, MethodId, Signature, TypeId};
pub use node::{Edge, NodeId, NodeInfo};
pub use op::{BinaryOp, Condition, DeoptMode, DeoptReason, InvokeKind, Op};
pub use stamp::{ObjectStamp, Stamp};

/// Mapping from nodes of one graph to nodes of another.
pub type NodeMap = IdMap<NodeId, NodeId>;
