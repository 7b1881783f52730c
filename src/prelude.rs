//! Items used throughout the compiler.

#[allow(unused_imports)]
pub use log::{debug, error, info, trace, warn};

pub use crate::error::CompileResult;
