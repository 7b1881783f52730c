//! Control-flow graphs over three-address code.

mod builder;
mod graph;
mod linearize;
mod optimiser;

pub use builder::build;
pub use graph::*;
pub use linearize::linearize;
pub use optimiser::optimise;
