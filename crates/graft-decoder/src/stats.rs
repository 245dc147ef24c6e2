/// Counters collected during one decode.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodeStats {
    pub inlined_calls: usize,
    pub plugin_expansions: usize,
    pub exploded_iterations: usize,
    pub materialized_invokes: usize,
    pub outer_states_built: usize,
    pub exception_states_built: usize,
    pub lowered_macros: usize,
}
