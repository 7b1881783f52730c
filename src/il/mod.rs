//! Intermediate code generation.

mod generator;
pub mod interpreter;
mod label_generator;
mod name_generator;
mod program;
pub mod record;
mod tac;

pub use generator::{generate, Munch};
pub use label_generator::LabelGenerator;
pub use program::*;
pub use tac::*;
