//! Abstract Syntax Tree definitions.
//!
//! The tree is produced and validated by the front end; the back end receives it
//! deserialized from JSON and trusts its scoping and typing.
#[cfg(test)]
pub mod build;
mod type_spec;
pub mod typed;

pub use type_spec::*;
