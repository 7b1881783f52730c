//! Source-language type specifications.
use std::fmt::{self, Display, Formatter};

use serde::Deserialize;

/// A source-language type, as resolved by the type checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeSpec {
    Int,
    Bool,
    Void,
}
impl Display for TypeSpec {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(match self {
            TypeSpec::Int => "int",
            TypeSpec::Bool => "bool",
            TypeSpec::Void => "void",
        })
    }
}
