use std::sync::atomic::{AtomicUsize, Ordering};

use graft_decoder::GraphProvider;
use graft_ir::{Graph, MethodId};
use rustc_hash::FxHashMap;

/// A [`GraphProvider`] over prebuilt graphs that counts how often it is
/// asked to build one.
#[derive(Default)]
pub struct MethodGraphs {
    graphs: FxHashMap<MethodId, Graph>,
    builds: AtomicUsize,
}

impl MethodGraphs {
    pub fn insert(&mut self, graph: Graph) -> &mut Self {
        let method = graph
            .method()
            .unwrap_or_else(|| panic!("graph {} has no method", graph.name()));
        self.graphs.insert(method, graph);
        self
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl GraphProvider for MethodGraphs {
    fn build(&self, method: MethodId) -> Option<Graph> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        self.graphs.get(&method).cloned()
    }
}
