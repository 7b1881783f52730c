//! Dataflow analysis and optimisation over control-flow graphs in SSA form.

mod copy_propagation;
mod dead_store;
mod destruct;
mod liveness;
mod ssa;

pub use copy_propagation::propagate_copies;
pub use dead_store::eliminate_dead_stores;
pub use destruct::destruct as destruct_ssa;
pub use liveness::Liveness;
pub use ssa::construct as construct_ssa;
