use graft_ir::{DeoptReason, Op, Stamp};
use smallvec::SmallVec;

use crate::decoder::Session;
use crate::scope::{Exit, Incoming};

fn incoming(exits: &[Exit]) -> Vec<Incoming> {
    exits
        .iter()
        .map(|exit| Incoming {
            pred: exit.pred,
            slot: exit.slot,
            values: exit.value.into_iter().collect(),
        })
        .collect()
}

impl Session<'_, '_> {
    /// Connects the returns and unwinds of inlined method `method` to its
    /// caller.
    ///
    /// A single return continues directly into the code after the call;
    /// several returns meet at a merge whose phi becomes the call's value.
    /// Unwinds go to the call's exception handler or, when it has none,
    /// into a deoptimization that rethrows in the interpreter.
    pub(crate) fn finish_inlining(&mut self, method: usize) {
        let scope = &mut self.methods[method];
        let returns = std::mem::take(&mut scope.returns);
        let unwinds = std::mem::take(&mut scope.unwinds);
        let (Some(caller_loop), Some(data)) = (scope.caller_loop, scope.invoke.clone()) else {
            panic!("finishing the inlining of the root method")
        };

        if !returns.is_empty() {
            let stamps: SmallVec<[Stamp; 1]> = if returns.iter().all(|r| r.value.is_some()) {
                SmallVec::from_slice(&[data.stamp])
            } else {
                SmallVec::new()
            };
            let (pred, slot, values) = self.join(incoming(&returns), &stamps);
            let caller = &mut self.loops[caller_loop];
            caller.set_created(data.invoke, values.first().copied());
            if let Some(next) = data.next {
                caller.link(next, pred, slot);
            }
        }

        if unwinds.is_empty() {
            return;
        }
        match data.exception {
            Some(handler) => {
                for path in incoming(&unwinds) {
                    self.loops[caller_loop].add_incoming(handler, path);
                }
            }
            None => {
                let (pred, slot, values) = self.join(incoming(&unwinds), &[Stamp::object()]);
                let state = values
                    .first()
                    .and_then(|exception| self.exception_state(method, *exception));
                let deopt = self
                    .graph
                    .add_node()
                    .op(Op::Deoptimize {
                        reason: DeoptReason::NotCompiledExceptionHandler,
                    })
                    .maybe_state_before(state)
                    .new();
                self.graph.set_successor(pred, slot, Some(deopt));
            }
        }
    }
}
