//! Splicing a template into a target graph.

use graft_ir::{DeoptMode, Edge, Graph, Kills, LocationIdentity, LocationSet, NodeId, NodeMap};
use smallvec::SmallVec;

use crate::args::{ArgValue, Arguments};
use crate::template::{ParamSlot, Template};

impl Template {
    /// Replaces `replacee` in `graph` by a copy of the fragment bound to
    /// `args` and deletes `replacee`. Returns the mapping from fragment
    /// nodes to their copies.
    ///
    /// A fixed replacee is replaced in the control flow: the fragment is
    /// entered from the predecessor of `replacee` and continues at its
    /// successor. A fragment that never returns kills that successor. A
    /// floating replacee can only be replaced by a fragment without fixed
    /// nodes.
    ///
    /// Panics if `args` do not match the template, if the fragment returns
    /// no value while `replacee` has value usages, or if `replacee` kills
    /// several locations at once.
    pub fn instantiate(&self, graph: &mut Graph, replacee: NodeId, args: &Arguments) -> NodeMap {
        assert_eq!(
            args.cache_key(),
            self.key,
            "arguments do not match template {}",
            self.name
        );
        self.check_kills(graph, replacee);

        let floating = graph.op(replacee).is_floating();
        let anchor = if floating {
            graph.start()
        } else {
            graph
                .predecessor(replacee)
                .unwrap_or_else(|| panic!("{replacee} is not linked into the control flow"))
        };

        let mut replacements = NodeMap::default();
        replacements.insert(self.graph.start(), anchor);
        self.bind(graph, args, &mut replacements);
        // Side effects resume after the replacee; without a state after it
        // they get a placeholder that is cleared below.
        let mut placeholder_state = None;
        if let Some(invalid) = self.invalid_state {
            let state = match graph.node(replacee).state_after() {
                Some(after) => after,
                None => *placeholder_state.insert(graph.invalid_frame_state()),
            };
            replacements.insert(invalid, state);
        }

        let copies = graph.add_duplicates_from(&self.graph, &self.nodes, &replacements);
        for &node in &self.nodes {
            if self.graph.node(node).memory() == Some(self.graph.start()) {
                let copy = copies[node];
                let location = graph.op(copy).location().unwrap_or(LocationIdentity::Any);
                let writer = graph.last_writer_before(anchor, location);
                graph.set_memory(copy, Some(writer));
            }
        }

        self.splice_control(graph, replacee, floating, &copies);
        self.assign_states(graph, replacee, &copies);
        let stamp = *graph.stamp(replacee);
        for &node in &self.stamp_nodes {
            if let Some(copy) = copies.get_copied(node) {
                graph.set_stamp(copy, stamp);
            }
        }
        self.rewire_memory(graph, replacee, anchor, &copies);
        self.replace_value(graph, replacee, &copies, &replacements);

        let mut dead: Vec<NodeId> = graph.clear_inputs(replacee).to_vec();
        graph.safe_delete(replacee);
        dead.extend(placeholder_state);
        graph.kill_unused_floating(dead);

        tracing::trace!(template = %self.name, %replacee, nodes = copies.len(), "instantiated template");
        copies
    }

    fn bind(&self, graph: &mut Graph, args: &Arguments, replacements: &mut NodeMap) {
        for (slot, value) in self.params.iter().zip(args.values()) {
            match (slot, value) {
                (ParamSlot::Open(Some(param)), ArgValue::Node(node)) => {
                    replacements.insert(*param, *node);
                }
                (ParamSlot::Open(Some(param)), ArgValue::Value(value)) => {
                    let node = graph.constant(*value);
                    replacements.insert(*param, node);
                }
                (ParamSlot::Varargs(placeholders), ArgValue::Varargs(nodes)) => {
                    assert_eq!(placeholders.len(), nodes.len());
                    for (placeholder, node) in placeholders.iter().zip(nodes) {
                        if let Some(placeholder) = placeholder {
                            replacements.insert(*placeholder, *node);
                        }
                    }
                }
                (ParamSlot::Open(None) | ParamSlot::Folded, _) => {}
                (slot, value) => {
                    panic!("cannot bind {value:?} to {slot:?} of template {}", self.name)
                }
            }
        }
    }

    fn splice_control(&self, graph: &mut Graph, replacee: NodeId, floating: bool, copies: &NodeMap) {
        let entry = self
            .graph
            .next(self.graph.start())
            .filter(|first| Some(*first) != self.return_node)
            .map(|first| copies[first]);
        if floating {
            assert!(
                entry.is_none(),
                "template {} has fixed nodes and cannot replace floating {replacee}",
                self.name
            );
            return;
        }
        assert!(
            graph.successors(replacee).len() <= 1,
            "{replacee} has several successors"
        );
        let Some(entry) = entry else {
            graph.unlink_fixed(replacee);
            return;
        };

        let next = graph.take_next(replacee);
        graph.replace_at_predecessor(replacee, Some(entry));
        match self.return_node {
            Some(ret) => {
                let exit = self
                    .graph
                    .predecessor(ret)
                    .unwrap_or_else(|| panic!("return of template {} is unreachable", self.name));
                let slot = self.graph.successor_index(exit, ret).unwrap_or_default();
                graph.set_successor(copies[exit], slot, next);
            }
            None => {
                if let Some(next) = next {
                    graph.kill_cfg(next);
                }
            }
        }
    }

    fn assign_states(&self, graph: &mut Graph, replacee: NodeId, copies: &NodeMap) {
        let info = graph.node(replacee);
        let (before, during, after) = (info.state_before(), info.state_during(), info.state_after());
        for &node in &self.side_effect_nodes {
            graph.set_state_after(copies[node], after);
        }

        let side_effect = graph.op(replacee).has_side_effect();
        let kind = graph.stamp(replacee).kind();
        let mut during_from_after = None;
        for &(node, mode) in &self.deopt_nodes {
            let copy = copies[node];
            match mode {
                DeoptMode::Before => {
                    graph.set_state_before(copy, before.or(during).or(after));
                }
                DeoptMode::During => {
                    let state = match (during, after) {
                        (Some(during), _) => Some(during),
                        (None, Some(after)) => Some(match during_from_after {
                            Some(state) => state,
                            None => {
                                let state = graph.state_during_from_after(after, kind);
                                during_from_after = Some(state);
                                state
                            }
                        }),
                        (None, None) if !side_effect => before,
                        (None, None) => None,
                    };
                    graph.set_state_during(copy, state);
                }
                DeoptMode::After => graph.set_state_after(copy, after),
            }
        }
    }

    /// Points memory users of `replacee` at the last writer of their
    /// location inside the fragment, or above it when the fragment does not
    /// write that location.
    fn rewire_memory(&self, graph: &mut Graph, replacee: NodeId, anchor: NodeId, copies: &NodeMap) {
        let mut users: SmallVec<[NodeId; 4]> = graph
            .usages(replacee)
            .iter()
            .copied()
            .filter(|u| graph.node(*u).memory() == Some(replacee))
            .collect();
        users.sort();
        users.dedup();
        for user in users {
            let location = graph.op(user).location().unwrap_or(LocationIdentity::Any);
            let writer = match self.last_writer(location) {
                Some(writer) => copies[writer],
                None => graph.last_writer_before(anchor, location),
            };
            graph.set_memory(user, Some(writer));
        }
    }

    fn replace_value(&self, graph: &mut Graph, replacee: NodeId, copies: &NodeMap, replacements: &NodeMap) {
        let is_value_use = |edge: Edge| matches!(edge, Edge::Input(_));
        match self.return_value() {
            Some(value) => {
                let value = copies
                    .get_copied(value)
                    .or_else(|| replacements.get_copied(value))
                    .unwrap_or_else(|| panic!("return value {value} of template {} is unbound", self.name));
                if graph.has_usages(replacee) {
                    graph.replace_at_usages_where(replacee, value, |_, edge| is_value_use(edge));
                }
            }
            None => {
                let used = graph.usages(replacee).iter().any(|user| {
                    graph
                        .node(*user)
                        .edges()
                        .any(|(edge, target)| target == replacee && is_value_use(edge))
                });
                assert!(
                    !used,
                    "template {} returns no value but {replacee} is used",
                    self.name
                );
            }
        }
    }

    /// Compares the locations the fragment writes with what `replacee`
    /// declares. Mismatches are reported, except for a replacee that kills
    /// several locations, which no template can stand in for.
    fn check_kills(&self, graph: &Graph, replacee: NodeId) {
        if self.return_node.is_none() {
            return;
        }
        let Some(kills) = &self.kills else {
            return;
        };
        let mut remaining: LocationSet = kills.locations().copied().collect();
        match graph.op(replacee).kills() {
            Some(Kills::Multi(locations)) => {
                panic!("{replacee} kills {locations:?}; templates cannot replace multi-location kills")
            }
            Some(Kills::Single(location)) if location.is_any() => {
                if self.last_writer(LocationIdentity::Any).is_none() {
                    tracing::warn!(%replacee, template = %self.name, "replacee kills ANY but the template does not");
                }
                return;
            }
            Some(Kills::Single(location)) => {
                if !remaining.shift_remove(&location) {
                    tracing::warn!(
                        %replacee,
                        template = %self.name,
                        %location,
                        "replacee kills a location the template does not"
                    );
                }
            }
            None => {}
        }
        if remaining.shift_remove(&LocationIdentity::Any) {
            tracing::warn!(%replacee, template = %self.name, "template kills ANY but the replacee does not");
        }
        for private in &self.private_locations {
            remaining.shift_remove(private);
        }
        if !remaining.is_empty() {
            tracing::warn!(
                %replacee,
                template = %self.name,
                locations = ?remaining,
                "template kills non-private locations the replacee does not"
            );
        }
    }
}
