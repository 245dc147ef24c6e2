//! Decoding of calls: invocation plugins first, then inlining, and a real
//! invoke when neither applies.

use std::sync::Arc;

use graft_ir::encode::{EncodedGraph, OrderId};
use graft_ir::{DeoptReason, GraphMark, LocationIdentity, MethodId, NodeId, Op};
use rustc_hash::FxHashMap;

use crate::decoder::Session;
use crate::error::{BailoutReason, CompileError};
use crate::plugins::{InlineInfo, PluginContext, PluginError};
use crate::scope::{FinishAction, InvokeData, LoopScope, MethodScope};
use crate::site::{CallSite, devirtualize};

impl Session<'_, '_> {
    pub(crate) fn decode_invoke(
        &mut self,
        scope: usize,
        id: OrderId,
        at: (NodeId, usize),
    ) -> Result<(), CompileError> {
        let encoded = self.encoded(scope);
        let node = encoded.node(id);
        let Op::Invoke {
            bci,
            with_exception,
        } = node.op
        else {
            panic!("{id} is not an invoke")
        };
        let target = encoded.node(node.inputs[0]);
        let Op::CallTarget { method, kind } = target.op else {
            panic!("invoke {id} does not call through a call target")
        };
        let arguments = target.inputs.iter().map(|a| self.ensure(scope, *a)).collect();
        let mut site = CallSite {
            method,
            kind,
            arguments,
            bci,
            stamp: node.stamp,
            with_exception,
        };
        let data = InvokeData {
            invoke: id,
            bci,
            stamp: node.stamp,
            state_after: node.state_after,
            next: node.next(),
            exception: node.successors.get(1).copied().flatten(),
        };

        devirtualize(self.decoder.meta(), &self.graph, &mut site);
        if self.expand_plugin(scope, &site, &data, at)? {
            return Ok(());
        }
        if self.try_inline(scope, &site, &data, at)? {
            return Ok(());
        }
        self.materialize(scope, &site, &data, at);
        Ok(())
    }

    /// Runs the invocation plugin registered for the callee, if any. The
    /// graph is rolled back unless the plugin both claims the call and
    /// produces a result for a call that has one.
    fn expand_plugin(
        &mut self,
        scope: usize,
        site: &CallSite,
        data: &InvokeData,
        (pred, slot): (NodeId, usize),
    ) -> Result<bool, CompileError> {
        let Some(plugin) = self
            .decoder
            .invocation_plugins()
            .and_then(|plugins| plugins.get(site.method))
        else {
            return Ok(false);
        };
        let mark = self.graph.mark();
        let mut cx = PluginContext::new(&mut self.graph, site, pred, slot);
        let outcome = plugin.apply(&mut cx);
        let expansion = cx.finish();
        match outcome {
            Ok(true) if expansion.result.is_some() || site.stamp.is_void() => {}
            Ok(claimed) => {
                if claimed {
                    tracing::debug!(method = %site.method, "invocation plugin produced no value");
                }
                self.rollback(mark);
                return Ok(false);
            }
            Err(PluginError::Unsupported(message)) => {
                self.rollback(mark);
                return Err(CompileError::bailout(BailoutReason::Unsupported, message));
            }
        }

        self.loops[scope].set_created(data.invoke, expansion.result);
        for &node in &expansion.appended {
            let info = self.graph.node(node);
            if info.op().has_side_effect() && info.state_after().is_none() {
                let state = data.state_after.map(|s| self.ensure(scope, s));
                self.graph.set_state_after(node, state);
            }
        }
        if let Some(next) = data.next {
            self.loops[scope].link(next, expansion.tail, expansion.slot);
        }
        self.stats.plugin_expansions += 1;
        Ok(true)
    }

    fn rollback(&mut self, mark: GraphMark) {
        self.graph.rollback(mark);
        self.forget_dead();
    }

    fn not_inlined(&self, site: &CallSite) -> bool {
        for plugin in self.decoder.inline_plugins() {
            plugin.notify_not_inlined(site);
        }
        false
    }

    fn try_inline(
        &mut self,
        scope: usize,
        site: &CallSite,
        data: &InvokeData,
        at: (NodeId, usize),
    ) -> Result<bool, CompileError> {
        let decision = self
            .decoder
            .inline_plugins()
            .iter()
            .find_map(|plugin| plugin.should_inline(site));
        let target = match decision {
            Some(InlineInfo::Inline) => site.method,
            Some(InlineInfo::InlineWithReplacement(replacement)) => replacement,
            Some(InlineInfo::DoNotInline) | None => return Ok(self.not_inlined(site)),
        };
        if site.kind.is_indirect() {
            return Ok(self.not_inlined(site));
        }
        let Some(encoded) = self.decoder.cache().get(target) else {
            return Ok(self.not_inlined(site));
        };

        let caller = self.loops[scope].method;
        let depth = self.methods[caller].depth + 1;
        if depth > self.decoder.options().max_inlining_depth {
            return Err(self.too_deep(caller, target, site.bci));
        }

        let null_receiver = site.receiver().is_some_and(|receiver| {
            !self.decoder.meta().is_static(target) && self.graph.stamp(receiver).is_always_null()
        });
        if null_receiver {
            let state = self.call_state(scope, data);
            let deopt = self
                .graph
                .add_node()
                .op(Op::Deoptimize {
                    reason: DeoptReason::NullCheck,
                })
                .maybe_state_before(state)
                .new();
            self.graph.set_successor(at.0, at.1, Some(deopt));
            tracing::debug!(method = %target, "call on a null receiver deoptimizes");
            return Ok(true);
        }

        self.inline(scope, site, data, target, encoded, at)?;
        Ok(true)
    }

    fn inline(
        &mut self,
        scope: usize,
        site: &CallSite,
        data: &InvokeData,
        target: MethodId,
        encoded: Arc<EncodedGraph>,
        (pred, slot): (NodeId, usize),
    ) -> Result<(), CompileError> {
        let caller = self.loops[scope].method;
        let depth = self.methods[caller].depth + 1;
        let method_index = self.methods.len();
        let mut callee = MethodScope::new(
            target,
            encoded.clone(),
            depth,
            self.decoder.explosion_kind(target),
        );
        callee.caller_loop = Some(scope);
        callee.arguments = site.arguments.clone();
        callee.invoke = Some(data.clone());
        callee.finish = vec![
            FinishAction::Inline,
            FinishAction::NotifyAfterInline(target),
        ];
        self.methods.push(callee);
        for plugin in self.decoder.inline_plugins() {
            plugin.notify_before_inline(target);
        }
        self.stats.inlined_calls += 1;
        let name = self.decoder.meta().method_name(target);
        let _span = tracing::debug_span!("inline", method = %name, depth).entered();

        let loop_index = self.loops.len();
        let mut body = LoopScope::new(method_index, encoded.len());
        let memory = self.graph.last_writer_before(pred, LocationIdentity::Any);
        body.set_created(encoded.start(), Some(memory));
        if let Some(first) = encoded.node(encoded.start()).next() {
            body.link(first, pred, slot);
        }
        self.loops.push(body);
        self.run_scope(loop_index)?;

        for action in std::mem::take(&mut self.methods[method_index].finish) {
            match action {
                FinishAction::Inline => self.finish_inlining(method_index),
                FinishAction::NotifyAfterInline(method) => {
                    for plugin in self.decoder.inline_plugins() {
                        plugin.notify_after_inline(method);
                    }
                }
            }
        }
        self.loops.truncate(loop_index);
        self.methods.truncate(method_index);
        Ok(())
    }

    /// Keeps the call as a real invoke.
    fn materialize(
        &mut self,
        scope: usize,
        site: &CallSite,
        data: &InvokeData,
        (pred, slot): (NodeId, usize),
    ) {
        let target = self.graph.add(
            Op::CallTarget {
                method: site.method,
                kind: site.kind,
            },
            &site.arguments,
        );
        let invoke = self
            .graph
            .add_node()
            .op(Op::Invoke {
                bci: site.bci,
                with_exception: site.with_exception,
            })
            .inputs(&[target])
            .stamp(site.stamp)
            .new();
        self.graph.set_successor(pred, slot, Some(invoke));
        self.loops[scope].set_created(data.invoke, Some(invoke));
        if let Some(state) = data.state_after {
            let state = self.ensure(scope, state);
            self.graph.set_state_after(invoke, Some(state));
        }
        if let Some(next) = data.next {
            self.loops[scope].link(next, invoke, 0);
        }
        if let Some(handler) = data.exception {
            self.loops[scope].link(handler, invoke, 1);
        }
        self.stats.materialized_invokes += 1;
    }

    /// The bailout for exceeding the inlining depth, listing the methods on
    /// the inlining stack by how often they appear.
    fn too_deep(&self, caller: usize, target: MethodId, bci: i32) -> CompileError {
        let meta = self.decoder.meta();
        let mut frames = vec![(target, 0)];
        let mut bci = bci;
        for scope in self.methods[..=caller].iter().rev() {
            frames.push((scope.method, bci));
            bci = scope.invoke.as_ref().map_or(0, |data| data.bci);
        }

        let mut counts: FxHashMap<MethodId, usize> = FxHashMap::default();
        for (method, _) in &frames {
            *counts.entry(*method).or_default() += 1;
        }
        let mut counts: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(method, count)| (meta.method_name(method), count))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let mut message = String::from(
            "Too deep inlining, probably caused by recursive inlining.\n\
             == Inlined methods ordered by inlining frequency:",
        );
        for (name, count) in counts {
            message.push_str(&format!("\n{name} [{count}]"));
        }
        message.push_str("\n== Complete stack trace of inlined methods:");
        for (method, bci) in frames {
            message.push_str(&format!("\n{} @ {bci}", meta.method_name(method)));
        }
        tracing::warn!(depth = self.methods[caller].depth + 1, "inlining too deep");
        CompileError::bailout(BailoutReason::InliningTooDeep, message)
    }
}
