//! Target code generation.
mod amd64;

use crate::{il::TacProgram, prelude::*};

/// Lower a program without phis to NASM assembly for x86-64 Linux.
pub fn generate_assembly(prog: &TacProgram) -> CompileResult<String> {
    let assembly = amd64::linux::compile(prog)?;
    Ok(assembly.to_string())
}
