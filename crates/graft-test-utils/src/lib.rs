//! Shared fixtures for the graft test suites.

mod chain;
mod fixtures;
mod meta;

#[cfg(feature = "decoder")]
mod graphs;

pub use chain::Chain;
pub use fixtures::{
    CountedLoop, add_parameters, call_and_return, counted_loop, return_constant,
    simple_state,
};
pub use meta::TestMeta;

#[cfg(feature = "decoder")]
pub use graphs::MethodGraphs;

use graft_ir::MethodId;

/// Shorthand for a method handle.
pub fn m(id: u32) -> MethodId {
    MethodId(id)
}
