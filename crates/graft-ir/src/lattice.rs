//! Lattice operations used to combine value stamps.

/// A partial order with least upper and greatest lower bounds.
pub trait Lattice {
    /// Least upper bound: what is known after control flow meets.
    fn join(&self, other: &Self) -> Self;
    /// Greatest lower bound: what is known when both facts hold.
    fn meet(&self, other: &Self) -> Self;
    fn is_subseteq(&self, other: &Self) -> bool;
}

/// A lattice with distinct bottom and top elements.
pub trait FiniteLattice: Lattice {
    /// The empty element, e.g. a value that never exists.
    fn bottom() -> Self;
    /// The element that says nothing.
    fn top() -> Self;
}
