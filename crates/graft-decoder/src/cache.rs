use std::sync::Arc;

use dashmap::DashMap;
use graft_ir::canonical::canonicalize;
use graft_ir::encode::EncodedGraph;
use graft_ir::{Graph, MethodId};

/// Source of method graphs, typically a bytecode parser.
pub trait GraphProvider: Send + Sync {
    /// Builds the graph of `method`, or `None` when it has no body that can
    /// be compiled.
    fn build(&self, method: MethodId) -> Option<Graph>;
}

/// Encoded method graphs shared between decodes and threads.
///
/// A miss builds, canonicalizes and encodes the graph outside of any lock.
/// Two threads missing on the same method may both build it; the last one
/// stored wins and both results are equivalent.
pub struct GraphCache {
    graphs: DashMap<MethodId, Arc<EncodedGraph>>,
    provider: Arc<dyn GraphProvider>,
}

impl GraphCache {
    pub fn new(provider: Arc<dyn GraphProvider>) -> Self {
        Self {
            graphs: DashMap::new(),
            provider,
        }
    }

    /// The encoded graph of `method`, building it on a miss.
    pub fn get(&self, method: MethodId) -> Option<Arc<EncodedGraph>> {
        if let Some(hit) = self.graphs.get(&method).map(|r| r.value().clone()) {
            tracing::trace!(%method, "graph cache hit");
            return Some(hit);
        }
        let mut graph = self.provider.build(method)?;
        canonicalize(&mut graph);
        let encoded = Arc::new(EncodedGraph::encode(&graph));
        tracing::debug!(%method, nodes = encoded.len(), "encoded method graph");
        self.graphs.insert(method, encoded.clone());
        Some(encoded)
    }

    pub fn contains(&self, method: MethodId) -> bool {
        self.graphs.contains_key(&method)
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    /// Drops the graph of `method`, e.g. after its code was redefined.
    pub fn invalidate(&self, method: MethodId) -> bool {
        self.graphs.remove(&method).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counting(std::sync::atomic::AtomicUsize);

    impl GraphProvider for Counting {
        fn build(&self, method: MethodId) -> Option<Graph> {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            (method.0 != 0).then(|| Graph::for_method(method, "empty"))
        }
    }

    #[test]
    fn misses_build_once_and_failures_are_not_stored() {
        let provider = Arc::new(Counting(Default::default()));
        let cache = GraphCache::new(provider.clone());
        let first = cache.get(MethodId(1)).unwrap();
        let second = cache.get(MethodId(1)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(cache.get(MethodId(0)).is_none());
        assert!(cache.get(MethodId(0)).is_none());
        assert_eq!(cache.len(), 1);
        assert_eq!(provider.0.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert!(cache.invalidate(MethodId(1)));
        assert!(!cache.contains(MethodId(1)));
    }
}
