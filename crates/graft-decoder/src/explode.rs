//! Loop explosion: every iteration of a loop is decoded as straight-line
//! code until the loop exits on all paths.

use std::collections::BTreeMap;

use graft_ir::encode::OrderId;
use graft_ir::Stamp;
use smallvec::SmallVec;

use crate::decoder::Session;
use crate::error::{BailoutReason, CompileError};
use crate::plugins::LoopExplosionKind;
use crate::scope::{Incoming, LoopScope};

impl Session<'_, '_> {
    /// Decodes the loop of `begin` once per iteration. Each iteration starts
    /// from the values its predecessor sent through the back edges; exits
    /// of all iterations are merged in the enclosing scope.
    pub(crate) fn explode_loop(
        &mut self,
        scope: usize,
        begin: OrderId,
        entry: Vec<Incoming>,
    ) -> Result<(), CompileError> {
        let encoded = self.encoded(scope);
        let phis: SmallVec<[OrderId; 4]> = encoded.phis(begin).into();
        let stamps: SmallVec<[Stamp; 4]> = phis.iter().map(|p| encoded.node(*p).stamp).collect();
        let first = encoded.node(begin).next();
        let bound = self.explosion_bound(scope);

        let (mut pred, mut slot, mut values) = self.join(entry, &stamps);
        let mut iteration = 0;
        loop {
            let mut body = LoopScope {
                method: self.loops[scope].method,
                parent: Some(scope),
                loop_begin: Some(begin),
                created: self.loops[scope].created.clone(),
                pending: BTreeMap::new(),
                back_edges: Vec::new(),
            };
            body.set_created(begin, Some(pred));
            for (phi, value) in phis.iter().zip(&values) {
                body.set_created(*phi, Some(*value));
            }
            if let Some(first) = first {
                body.link(first, pred, slot);
            }

            let index = self.loops.len();
            self.loops.push(body);
            self.stats.exploded_iterations += 1;
            tracing::trace!(%begin, iteration, "exploding loop iteration");
            self.run_scope(index)?;
            let back_edges = std::mem::take(&mut self.loops[index].back_edges);
            self.loops.truncate(index);

            if back_edges.is_empty() {
                return Ok(());
            }
            iteration += 1;
            if iteration > bound {
                return Err(self.explosion_failure(scope, iteration));
            }
            (pred, slot, values) = self.join(back_edges, &stamps);
        }
    }

    fn explosion_bound(&self, scope: usize) -> usize {
        let max = self.decoder.options().max_loop_explosion_count;
        match self.methods[self.loops[scope].method].explosion {
            LoopExplosionKind::Bounded(bound) => bound.min(max),
            LoopExplosionKind::None | LoopExplosionKind::Full => max,
        }
    }

    fn explosion_failure(&self, scope: usize, iterations: usize) -> CompileError {
        let method = self.methods[self.loops[scope].method].method;
        let name = self.decoder.meta().method_name(method);
        let message = format!(
            "too many loop explosion iterations - does the explosion not terminate for method {name}?"
        );
        tracing::warn!(%method, iterations, "{message}");
        if self.decoder.options().failed_loop_explosion_is_fatal {
            CompileError::Fatal(message)
        } else {
            CompileError::bailout(BailoutReason::LoopExplosion, message)
        }
    }
}
